//! The event model: an immutable, chain-structured record combining
//! log-entry and error semantics.
//!
//! Events are produced by [`EventBuilder`] and frozen into [`Event`]; the
//! [`query`] module walks arbitrary error chains outermost-first, and
//! [`serialize`] renders events in the machine-log and human block modes.

pub mod builder;
pub mod event;
pub mod query;
pub mod serialize;

pub use builder::EventBuilder;
pub use event::{ErrorRef, Event};
