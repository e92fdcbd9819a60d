//! The shared delivery mechanism behind every notifier sink.
//!
//! A sink owns an unbounded job queue, a bounded worker set, and a TTL
//! cache used for a process-wide delivery lock and per-key dedup. Only the
//! final post step differs per wire protocol; it is injected as a
//! [`Poster`].

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::Semaphore;

use vigil_cache::TtlCache;
use vigil_event::{Event, EventBuilder};
use vigil_hub::{MessageContext, Sink};
use vigil_types::Context;
use vigil_utils::MpmcQueue;

use crate::artifact::{ArtifactFile, ArtifactStore, UploadedArtifact};
use crate::config::NotifierConfig;
use crate::hooks::{NoopHooks, NotifyHooks};

/// Ceiling for the backed-off cooldown.
const MAX_COOLDOWN: Duration = Duration::from_secs(24 * 60 * 60);

/// Drain-poll interval of [`NotifierCore::wait`].
const WAIT_POLL: Duration = Duration::from_millis(50);

/// The wire-protocol-specific post step.
#[async_trait]
pub trait Poster: Send + Sync {
    /// Deliver the primary message. Returns the artifact candidates that
    /// did not fit the wire protocol's size limit.
    async fn post(
        &self,
        ctx: &Context,
        message: &MessageContext,
    ) -> Result<Vec<ArtifactFile>, Event>;

    /// Deliver references to the uploaded artifacts, typically as a
    /// follow-up to the primary message.
    async fn post_artifacts(
        &self,
        ctx: &Context,
        message: &MessageContext,
        uploads: &[UploadedArtifact],
    ) -> Result<(), Event>;
}

struct Job {
    ctx: Context,
    message: MessageContext,
    key: String,
}

struct CoreState {
    config: NotifierConfig,
    queue: MpmcQueue<Job>,
    /// Queued plus in-flight jobs; `wait` drains on this reaching zero.
    pending: AtomicUsize,
    /// Whether a dispatch loop currently owns the queue.
    running: AtomicBool,
    semaphore: Arc<Semaphore>,
    cache: Arc<dyn TtlCache>,
    store: Option<Arc<dyn ArtifactStore>>,
    poster: Arc<dyn Poster>,
    hooks: Arc<dyn NotifyHooks>,
    failures: Mutex<Vec<Event>>,
}

/// Cheap handle to one notifier sink's delivery machinery.
#[derive(Clone)]
pub struct NotifierCore {
    state: Arc<CoreState>,
}

impl NotifierCore {
    pub fn new(
        config: NotifierConfig,
        cache: Arc<dyn TtlCache>,
        poster: Arc<dyn Poster>,
    ) -> Self {
        let workers = config.workers();
        Self {
            state: Arc::new(CoreState {
                config,
                queue: MpmcQueue::new(),
                pending: AtomicUsize::new(0),
                running: AtomicBool::new(false),
                semaphore: Arc::new(Semaphore::new(workers)),
                cache,
                store: None,
                poster,
                hooks: Arc::new(NoopHooks),
                failures: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn with_artifact_store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        let state = Arc::get_mut(&mut self.state)
            .expect("configure the notifier before sharing it");
        state.store = Some(store);
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn NotifyHooks>) -> Self {
        let state = Arc::get_mut(&mut self.state)
            .expect("configure the notifier before sharing it");
        state.hooks = hooks;
        self
    }

    /// Dedup key: `name ∥ env ∥ service ∥ type ∥ (event key or caller key)`,
    /// joined with the cache's separator.
    fn dedup_key(&self, event: &Event) -> String {
        let sep = self.state.cache.separator();
        let event_key = if event.key().is_empty() {
            event.caller().key()
        } else {
            event.key().to_string()
        };
        let service = event.service();
        [
            self.state.config.name.as_str(),
            service.environment.as_str(),
            service.name.as_str(),
            service.kind.as_str(),
            event_key.as_str(),
        ]
        .join(sep)
    }

    /// Start a dispatch loop unless one is already running.
    fn kick(&self) {
        if self
            .state
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let state = Arc::clone(&self.state);
            tokio::spawn(async move { CoreState::run_loop(state).await });
        }
    }
}

impl CoreState {
    async fn run_loop(state: Arc<CoreState>) {
        loop {
            while let Some(job) = state.queue.dequeue() {
                let Ok(permit) = Arc::clone(&state.semaphore).acquire_owned().await else {
                    return;
                };
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    state.process(job).await;
                    drop(permit);
                });
            }
            state.running.store(false, Ordering::Release);
            // A producer may have enqueued between the last dequeue and the
            // store above; re-take the flag or leave the queue to whoever did.
            if state.queue.is_empty()
                || state
                    .running
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
            {
                return;
            }
        }
    }

    async fn process(&self, job: Job) {
        // The caller canceling its context must not abort delivery; the
        // sink owns the per-job timeout.
        let ctx = job.ctx.detach();
        let outcome =
            tokio::time::timeout(self.config.job_timeout(), self.deliver(&ctx, &job)).await;
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(event)) => self.failures.lock().push(event),
            Err(_) => self.failures.lock().push(
                EventBuilder::bail("notification timed out")
                    .key(job.key.clone())
                    .freeze(),
            ),
        }
        self.pending.fetch_sub(1, Ordering::AcqRel);
    }

    async fn deliver(&self, ctx: &Context, job: &Job) -> Result<(), Event> {
        self.wait_for_lock().await;
        self.cache_set(&self.lock_key(), b"1", self.config.lock_ttl())
            .await;
        let result = self.deliver_locked(ctx, job).await;
        if let Err(err) = self.cache.delete(&self.lock_key()).await {
            tracing::warn!(target: "vigil", error = %err, "cooldown cache delete failed");
        }
        result
    }

    /// The lock is taken before the dedup check so that concurrent jobs
    /// with the same key cannot both observe the entry as absent.
    async fn deliver_locked(&self, ctx: &Context, job: &Job) -> Result<(), Event> {
        let message = &job.message;
        if !message.skip_cooldown && self.dedup_hit(&job.key).await {
            return Ok(());
        }

        let base = message.cooldown.unwrap_or_else(|| self.config.cooldown());
        let iteration = self.next_iteration(&job.key, base).await;
        let effective = effective_cooldown(base, iteration);

        let ctx = match self.hooks.pre_message(ctx, message).await {
            Some(overridden) => overridden,
            None => ctx.clone(),
        };
        let candidates = self.poster.post(&ctx, message).await?;
        self.hooks.post_message(&ctx, message).await;

        self.cache_set(&job.key, message.event.summary(": ").as_bytes(), effective)
            .await;

        if let Some(store) = &self.store {
            if !candidates.is_empty() {
                let upload_ctx = match self.hooks.pre_artifact_upload(&ctx, &candidates).await {
                    Some(overridden) => overridden,
                    None => ctx.clone(),
                };
                let results = store.upload(&upload_ctx, candidates).await;
                let mut uploads: Vec<UploadedArtifact> = Vec::new();
                for result in &results {
                    match &result.outcome {
                        Ok(uploaded) => uploads.push(uploaded.clone()),
                        Err(err) => tracing::warn!(
                            target: "vigil",
                            file = %result.file.filename,
                            error = %err,
                            "artifact upload failed"
                        ),
                    }
                }
                self.hooks.post_artifact_upload(&upload_ctx, &results).await;
                if !uploads.is_empty() {
                    self.poster
                        .post_artifacts(&upload_ctx, message, &uploads)
                        .await?;
                }
            }
        }
        Ok(())
    }

    fn lock_key(&self) -> String {
        format!(
            "{}{}{}",
            self.config.name,
            self.cache.separator(),
            self.config.global_lock_key
        )
    }

    async fn wait_for_lock(&self) {
        loop {
            match self.cache.exist(&self.lock_key()).await {
                Ok(true) => tokio::time::sleep(self.config.lock_poll()).await,
                Ok(false) => return,
                Err(err) => {
                    tracing::warn!(target: "vigil", error = %err, "cooldown cache probe failed");
                    return;
                }
            }
        }
    }

    async fn dedup_hit(&self, key: &str) -> bool {
        match self.cache.exist(key).await {
            Ok(hit) => hit,
            Err(err) => {
                tracing::warn!(target: "vigil", error = %err, "cooldown cache probe failed");
                false
            }
        }
    }

    /// Read-and-increment the per-key iteration counter. The counter's TTL
    /// grows with the iteration so bursts keep backing off.
    async fn next_iteration(&self, key: &str, base: Duration) -> u64 {
        let iter_key = format!("{}{}iter", key, self.cache.separator());
        let current = match self.cache.get(&iter_key).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).parse::<u64>().unwrap_or(0),
            Err(err) if err.is_not_found() => 0,
            Err(err) => {
                tracing::warn!(target: "vigil", error = %err, "cooldown cache read failed");
                0
            }
        };
        let next = current + 1;
        let ttl = base
            .checked_mul((next + 1).min(u32::MAX as u64) as u32)
            .unwrap_or(MAX_COOLDOWN)
            .min(MAX_COOLDOWN);
        self.cache_set(&iter_key, next.to_string().as_bytes(), ttl)
            .await;
        next
    }

    /// Cache writes never fail a job.
    async fn cache_set(&self, key: &str, value: &[u8], ttl: Duration) {
        if let Err(err) = self.cache.set(key, value, ttl).await {
            tracing::warn!(target: "vigil", error = %err, "cooldown cache set failed");
        }
    }
}

/// `base · max(1, iter²/2)`, clamped to 24 h.
fn effective_cooldown(base: Duration, iteration: u64) -> Duration {
    let factor = (iteration.saturating_mul(iteration) / 2).max(1);
    base.checked_mul(factor.min(u32::MAX as u64) as u32)
        .unwrap_or(MAX_COOLDOWN)
        .min(MAX_COOLDOWN)
}

#[async_trait]
impl Sink for NotifierCore {
    fn name(&self) -> &str {
        &self.state.config.name
    }

    /// Enqueue and return; must be called from within a tokio runtime, as
    /// an idle sink lazily spawns its dispatch loop.
    fn send_message(&self, ctx: &Context, message: MessageContext) {
        let key = self.dedup_key(&message.event);
        self.state.pending.fetch_add(1, Ordering::AcqRel);
        self.state.queue.enqueue(Job {
            ctx: ctx.clone(),
            message,
            key,
        });
        self.kick();
    }

    async fn wait(&self, ctx: &Context) -> Result<(), Event> {
        while self.state.pending.load(Ordering::Acquire) != 0 {
            if let Some(err) = ctx.err() {
                return Err(EventBuilder::wrap(err)
                    .key(self.state.config.name.clone())
                    .freeze());
            }
            tokio::time::sleep(WAIT_POLL).await;
        }
        let failures: Vec<Event> = std::mem::take(&mut *self.state.failures.lock());
        if failures.is_empty() {
            return Ok(());
        }
        Err(EventBuilder::bail(format!(
            "{} notification post(s) failed",
            failures.len()
        ))
        .key(self.state.config.name.clone())
        .context_value(Value::Array(
            failures.iter().map(|f| f.to_log_value()).collect(),
        ))
        .freeze())
    }
}
