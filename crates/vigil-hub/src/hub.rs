use std::error::Error;
use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;

use vigil_event::{Event, EventBuilder};
use vigil_types::{Context, Service};

use crate::logger::{Logger, TracingLogger};
use crate::options::{self, Filter, NotifyOption};
use crate::sink::{MessageContext, Sink};

/// Ordered aggregate of per-sink failures from [`Hub::wait`].
///
/// Each entry keeps the index of the failing sink in the registration
/// order the wait observed.
#[derive(Debug, Default)]
pub struct MultiError {
    entries: Vec<(usize, Event)>,
}

impl MultiError {
    pub fn push(&mut self, index: usize, event: Event) {
        self.entries.push((index, event));
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[(usize, Event)] {
        &self.entries
    }

    pub fn into_result(self) -> Result<(), MultiError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} sink(s) failed", self.entries.len())?;
        for (index, event) in &self.entries {
            write!(f, "; [{index}] {event}")?;
        }
        Ok(())
    }
}

impl Error for MultiError {}

/// Process-scoped coordinator owning the service identity, the logger and
/// the notifier sink registry.
///
/// The registry is read-mostly: reads load a lock-free snapshot, while
/// register/unregister swap in a new vector. Callers are expected to
/// sequence mutation before traffic.
pub struct Hub {
    service: Service,
    logger: Arc<dyn Logger>,
    sinks: ArcSwap<Vec<Arc<dyn Sink>>>,
    defaults: Vec<NotifyOption>,
}

impl Hub {
    pub fn new(service: Service) -> Self {
        Self {
            service,
            logger: Arc::new(TracingLogger),
            sinks: ArcSwap::from_pointee(Vec::new()),
            defaults: Vec::new(),
        }
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Options applied before the per-call options of every `notify`.
    pub fn with_defaults(mut self, defaults: Vec<NotifyOption>) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn service(&self) -> &Service {
        &self.service
    }

    // ----- builder entries -----

    /// Start an info event stamped with this hub's service identity.
    #[track_caller]
    pub fn new_entry(&self, message: impl Into<String>) -> EventBuilder {
        EventBuilder::new_entry(message).service(self.service.clone())
    }

    #[track_caller]
    pub fn wrap<E: Error + Send + Sync + 'static>(&self, err: E) -> EventBuilder {
        EventBuilder::wrap(err).service(self.service.clone())
    }

    #[track_caller]
    pub fn wrap_freeze<E: Error + Send + Sync + 'static>(
        &self,
        err: E,
        message: impl Into<String>,
    ) -> Event {
        EventBuilder::wrap(err)
            .service(self.service.clone())
            .message(message)
            .freeze()
    }

    #[track_caller]
    pub fn bail(&self, message: impl Into<String>) -> EventBuilder {
        EventBuilder::bail(message).service(self.service.clone())
    }

    #[track_caller]
    pub fn bail_freeze(&self, message: impl Into<String>) -> Event {
        EventBuilder::bail(message)
            .service(self.service.clone())
            .freeze()
    }

    // ----- registry -----

    /// Register a sink. A sink with the same name is replaced in place;
    /// otherwise the sink is appended.
    pub fn register(&self, sink: Arc<dyn Sink>) {
        let current = self.sinks.load();
        let mut next = Vec::with_capacity(current.len() + 1);
        let mut replaced = false;
        for existing in current.iter() {
            if existing.name() == sink.name() {
                next.push(sink.clone());
                replaced = true;
            } else {
                next.push(existing.clone());
            }
        }
        if !replaced {
            next.push(sink);
        }
        self.sinks.store(Arc::new(next));
    }

    pub fn unregister(&self, name: &str) {
        let current = self.sinks.load();
        let next: Vec<Arc<dyn Sink>> = current
            .iter()
            .filter(|s| s.name() != name)
            .cloned()
            .collect();
        self.sinks.store(Arc::new(next));
    }

    pub fn get_by_name(&self, name: &str) -> Option<Arc<dyn Sink>> {
        self.sinks.load().iter().find(|s| s.name() == name).cloned()
    }

    /// Snapshot of the registry in insertion order.
    pub fn sinks(&self) -> Vec<Arc<dyn Sink>> {
        self.sinks.load().as_ref().clone()
    }

    // ----- delivery -----

    /// Forward one event to the logger. Never fails the caller; logger
    /// failures are self-logged and dropped.
    pub async fn log(&self, ctx: &Context, event: &Event) {
        let result = if event.level().is_error() {
            self.logger.log_error(ctx, event).await
        } else {
            self.logger.log(ctx, event).await
        };
        if let Err(err) = result {
            tracing::error!(target: "vigil", error = %err, "logger failed");
        }
    }

    /// Route one event to the filtered sink subset. Non-blocking: each
    /// selected sink only enqueues.
    pub fn notify(&self, ctx: &Context, event: &Event, options: &[NotifyOption]) {
        let mut combined = self.defaults.clone();
        combined.extend_from_slice(options);
        let resolved = options::resolve(&combined);

        let mut selected: Vec<Arc<dyn Sink>> = match &resolved.filter {
            Filter::Instances(instances) => instances.clone(),
            filter => self
                .sinks
                .load()
                .iter()
                .filter(|s| filter.matches(s.name()))
                .cloned()
                .collect(),
        };
        for extra in &resolved.also {
            if !selected.iter().any(|s| Arc::ptr_eq(s, extra)) {
                selected.push(extra.clone());
            }
        }

        for sink in selected {
            sink.send_message(
                ctx,
                MessageContext {
                    event: event.clone(),
                    skip_cooldown: resolved.skip_cooldown,
                    cooldown: resolved.cooldown,
                },
            );
        }
    }

    /// Drain every registered sink, aggregating failures in registration
    /// order.
    pub async fn wait(&self, ctx: &Context) -> Result<(), MultiError> {
        let snapshot = self.sinks.load_full();
        let mut failures = MultiError::default();
        for (index, sink) in snapshot.iter().enumerate() {
            if let Err(event) = sink.wait(ctx).await {
                failures.push(index, event);
            }
        }
        failures.into_result()
    }
}
