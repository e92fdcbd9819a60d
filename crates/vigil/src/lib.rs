//! vigil: application-observability toolkit.
//!
//! One crate to pull in the whole stack:
//!
//! - chained, self-describing events ([`event`]),
//! - the hub routing them to loggers and notification sinks ([`hub`]),
//! - the notifier pipeline with cooldown/dedup and artifact offload
//!   ([`notify`]),
//! - the HTTP observation layer and response writer ([`http`]),
//! - the TTL cache and lock-free building blocks underneath ([`cache`],
//!   [`utils`]).
//!
//! Smaller consumers can depend on the member crates directly; this crate
//! only re-exports.

pub use vigil_cache as cache;
pub use vigil_event as event;
pub use vigil_http as http;
pub use vigil_hub as hub;
pub use vigil_notify as notify;
pub use vigil_types as types;
pub use vigil_utils as utils;

// The everyday names, at the root.
pub use vigil_event::{Event, EventBuilder};
pub use vigil_hub::{global, set_global, EventExt, Hub, NotifyOption};
pub use vigil_types::{Caller, Context, Level, Service};
