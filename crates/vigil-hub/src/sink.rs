use std::time::Duration;

use async_trait::async_trait;

use vigil_event::Event;
use vigil_types::Context;

/// An event together with the per-call delivery policy the hub resolved
/// for it.
#[derive(Clone)]
pub struct MessageContext {
    pub event: Event,
    /// Bypass the sink's dedup check for this delivery.
    pub skip_cooldown: bool,
    /// Per-call override of the sink's cooldown TTL.
    pub cooldown: Option<Duration>,
}

impl MessageContext {
    pub fn new(event: Event) -> Self {
        Self {
            event,
            skip_cooldown: false,
            cooldown: None,
        }
    }
}

/// A notification consumer registered with a [`crate::Hub`].
///
/// `send_message` must not block the caller: implementations enqueue and
/// return. Delivery failures are surfaced later through `wait`.
#[async_trait]
pub trait Sink: Send + Sync {
    fn name(&self) -> &str;

    /// Accept one message for asynchronous delivery.
    fn send_message(&self, ctx: &Context, message: MessageContext);

    /// Resolve once every accepted message is delivered or `ctx` fires.
    /// Returns the failures captured since the previous wait.
    async fn wait(&self, ctx: &Context) -> Result<(), Event>;
}
