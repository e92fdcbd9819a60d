use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

type ValueMap = HashMap<TypeId, Arc<dyn Any + Send + Sync>>;

/// Request-scoped context carrying typed values, a cancellation token and an
/// optional deadline.
///
/// The notifier pipeline relies on [`Context::detach`]: the detached context
/// shares the value map (trace identifiers keep propagating) but gets a fresh
/// token and no deadline, so canceling the caller's context does not abort
/// in-flight work.
#[derive(Clone)]
pub struct Context {
    values: Arc<ValueMap>,
    token: CancellationToken,
    deadline: Option<Instant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    #[error("context canceled")]
    Canceled,
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

impl Context {
    /// A root context: no values, never-canceled token, no deadline.
    pub fn background() -> Self {
        Self {
            values: Arc::new(HashMap::new()),
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Derive a context with `value` attached, keyed by its type.
    pub fn with_value<T: Send + Sync + 'static>(&self, value: T) -> Self {
        let mut values = (*self.values).clone();
        values.insert(TypeId::of::<T>(), Arc::new(value));
        Self {
            values: Arc::new(values),
            token: self.token.clone(),
            deadline: self.deadline,
        }
    }

    /// Look up a value by type.
    pub fn value<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.values
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>())
    }

    /// Derive a child context whose token is canceled when this one is.
    pub fn child(&self) -> Self {
        Self {
            values: Arc::clone(&self.values),
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Derive a context that keeps the values but drops cancellation and
    /// deadline. `Value` delegates to the original; `Done`/`Err` do not.
    pub fn detach(&self) -> Self {
        Self {
            values: Arc::clone(&self.values),
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    pub fn with_deadline(&self, deadline: Instant) -> Self {
        Self {
            values: Arc::clone(&self.values),
            token: self.token.clone(),
            deadline: Some(deadline),
        }
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_canceled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves when the context is canceled.
    pub async fn canceled(&self) {
        self.token.cancelled().await;
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// The reason this context is done, if it is.
    pub fn err(&self) -> Option<ContextError> {
        if self.token.is_cancelled() {
            return Some(ContextError::Canceled);
        }
        match self.deadline {
            Some(d) if Instant::now() >= d => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("values", &self.values.len())
            .field("canceled", &self.token.is_cancelled())
            .field("deadline", &self.deadline)
            .finish()
    }
}
