//! Process-local coordination: the hub owns the service identity, a logger
//! and the notifier sink registry, and routes events to both.
//!
//! A process-default hub lives behind [`global`]; services that need
//! isolation (tests, embedded use) construct their own [`Hub`].

pub mod global;
pub mod hub;
pub mod logger;
pub mod logging;
pub mod options;
pub mod sink;

pub use global::{global, set_global, EventExt};
pub use hub::{Hub, MultiError};
pub use logger::{Logger, TestLogger, TracingLogger};
pub use logging::{init_logging, LogConfig};
pub use options::NotifyOption;
pub use sink::{MessageContext, Sink};
