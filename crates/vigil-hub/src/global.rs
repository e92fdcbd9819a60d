use std::error::Error;
use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use once_cell::sync::Lazy;

use vigil_event::{Event, EventBuilder};
use vigil_types::{Context, Service};

use crate::hub::{Hub, MultiError};
use crate::options::NotifyOption;

static GLOBAL: Lazy<ArcSwap<Hub>> =
    Lazy::new(|| ArcSwap::from_pointee(Hub::new(Service::default())));

/// The process-default hub.
pub fn global() -> Arc<Hub> {
    GLOBAL.load_full()
}

/// Replace the process-default hub. Only safe before concurrent use;
/// in-flight readers keep the snapshot they loaded.
pub fn set_global(hub: Hub) {
    GLOBAL.store(Arc::new(hub));
}

// ----- free entry points against the global hub -----

#[track_caller]
pub fn new_entry(message: impl Into<String>) -> EventBuilder {
    EventBuilder::new_entry(message).service(global().service().clone())
}

#[track_caller]
pub fn wrap<E: Error + Send + Sync + 'static>(err: E) -> EventBuilder {
    EventBuilder::wrap(err).service(global().service().clone())
}

#[track_caller]
pub fn wrap_freeze<E: Error + Send + Sync + 'static>(
    err: E,
    message: impl Into<String>,
) -> Event {
    EventBuilder::wrap(err)
        .service(global().service().clone())
        .message(message)
        .freeze()
}

#[track_caller]
pub fn bail(message: impl Into<String>) -> EventBuilder {
    EventBuilder::bail(message).service(global().service().clone())
}

#[track_caller]
pub fn bail_freeze(message: impl Into<String>) -> Event {
    EventBuilder::bail(message)
        .service(global().service().clone())
        .freeze()
}

pub async fn log(ctx: &Context, event: &Event) {
    global().log(ctx, event).await
}

pub fn notify(ctx: &Context, event: &Event, options: &[NotifyOption]) {
    global().notify(ctx, event, options)
}

pub async fn wait(ctx: &Context) -> Result<(), MultiError> {
    global().wait(ctx).await
}

/// Convenience delivery methods on [`Event`] against the global hub.
#[async_trait]
pub trait EventExt {
    async fn log(&self, ctx: &Context);

    fn notify(&self, ctx: &Context, options: &[NotifyOption]);
}

#[async_trait]
impl EventExt for Event {
    async fn log(&self, ctx: &Context) {
        log(ctx, self).await
    }

    fn notify(&self, ctx: &Context, options: &[NotifyOption]) {
        notify(ctx, self, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_hub_is_replaceable() {
        let before = global();
        assert!(before.service().is_nil());

        set_global(Hub::new(Service::new("global-test")));
        assert_eq!(global().service().name, "global-test");

        // Earlier snapshots are unaffected by the swap.
        assert!(before.service().is_nil());
        set_global(Hub::new(Service::default()));
    }
}
