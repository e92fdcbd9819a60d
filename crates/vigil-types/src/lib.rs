pub mod caller;
pub mod context;
pub mod level;
pub mod service;

pub use caller::Caller;
pub use context::{Context, ContextError};
pub use level::Level;
pub use service::Service;
