use async_trait::async_trait;
use parking_lot::Mutex;

use vigil_event::Event;
use vigil_types::{Context, Level};

/// Destination for events routed through [`crate::Hub::log`].
///
/// `log` and `log_error` both accept any event; the split lets adapters
/// route error-level traffic differently. Failures are reported to the hub,
/// which swallows them.
#[async_trait]
pub trait Logger: Send + Sync {
    async fn log(&self, ctx: &Context, event: &Event) -> Result<(), Event>;

    async fn log_error(&self, ctx: &Context, event: &Event) -> Result<(), Event>;
}

/// Adapter that emits events through `tracing` in machine-log mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl TracingLogger {
    fn emit(&self, event: &Event) {
        let record = event.to_log_value().to_string();
        match event.level() {
            Level::Debug => tracing::debug!(target: "vigil", %record),
            Level::Info => tracing::info!(target: "vigil", %record),
            Level::Warn => tracing::warn!(target: "vigil", %record),
            Level::Error | Level::Fatal | Level::Panic => {
                tracing::error!(target: "vigil", %record)
            }
        }
    }
}

#[async_trait]
impl Logger for TracingLogger {
    async fn log(&self, _ctx: &Context, event: &Event) -> Result<(), Event> {
        self.emit(event);
        Ok(())
    }

    async fn log_error(&self, _ctx: &Context, event: &Event) -> Result<(), Event> {
        self.emit(event);
        Ok(())
    }
}

/// In-memory logger for assertions in tests.
#[derive(Debug, Default)]
pub struct TestLogger {
    buffer: Mutex<Vec<u8>>,
}

impl TestLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn string(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock()).into_owned()
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.buffer.lock().clone()
    }

    pub fn reset(&self) {
        self.buffer.lock().clear();
    }

    fn append(&self, event: &Event) {
        let mut buffer = self.buffer.lock();
        buffer.extend_from_slice(event.to_log_value().to_string().as_bytes());
        buffer.push(b'\n');
    }
}

#[async_trait]
impl Logger for TestLogger {
    async fn log(&self, _ctx: &Context, event: &Event) -> Result<(), Event> {
        self.append(event);
        Ok(())
    }

    async fn log_error(&self, _ctx: &Context, event: &Event) -> Result<(), Event> {
        self.append(event);
        Ok(())
    }
}
