use std::error::Error;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use vigil_types::{Caller, Level, Service};

use crate::query;

/// Shared reference to any error forming part of a chain.
pub type ErrorRef = Arc<dyn Error + Send + Sync + 'static>;

/// Default separator used by `Display`.
pub const DISPLAY_SEPARATOR: &str = ": ";

/// An immutable, structured record of an event or error.
///
/// Frozen by [`crate::EventBuilder`]; every accessor reads the frozen fields
/// only. The `origin` forms a single-linked, acyclic chain: each freeze
/// produces a new node whose origin is an already-frozen value.
#[derive(Clone)]
pub struct Event {
    inner: Arc<EventInner>,
}

pub(crate) struct EventInner {
    pub(crate) service: Service,
    pub(crate) caller: Caller,
    pub(crate) level: Level,
    pub(crate) time: DateTime<Utc>,
    pub(crate) code: i64,
    pub(crate) message: String,
    pub(crate) key: String,
    pub(crate) context: Vec<Value>,
    pub(crate) origin: Option<ErrorRef>,
}

impl Event {
    pub(crate) fn from_inner(inner: EventInner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn service(&self) -> &Service {
        &self.inner.service
    }

    pub fn caller(&self) -> Caller {
        self.inner.caller
    }

    pub fn level(&self) -> Level {
        self.inner.level
    }

    pub fn time(&self) -> DateTime<Utc> {
        self.inner.time
    }

    pub fn code(&self) -> i64 {
        self.inner.code
    }

    pub fn message(&self) -> &str {
        &self.inner.message
    }

    /// Explicit dedup key; empty when the caller key should be used instead.
    pub fn key(&self) -> &str {
        &self.inner.key
    }

    pub fn context(&self) -> &[Value] {
        &self.inner.context
    }

    /// The prior error this event wraps, if any.
    pub fn origin(&self) -> Option<&(dyn Error + 'static)> {
        self.inner
            .origin
            .as_ref()
            .map(|e| e.as_ref() as &(dyn Error + 'static))
    }

    pub(crate) fn origin_ref(&self) -> Option<&ErrorRef> {
        self.inner.origin.as_ref()
    }

    /// HTTP-status view of `code`.
    ///
    /// In-range codes pass through; codes above 999 contribute their last
    /// three digits when those are in range; anything else falls back to 500
    /// for error-level events and 200 otherwise.
    pub fn http_status(&self) -> u16 {
        let code = self.inner.code;
        if (200..=599).contains(&code) {
            return code as u16;
        }
        if code > 999 {
            let r = code % 1000;
            if (200..=599).contains(&r) {
                return r as u16;
            }
        }
        if self.inner.level.is_error() {
            500
        } else {
            200
        }
    }

    /// Write the separator-joined chain text, eliding wrappers whose message
    /// repeats their origin's.
    pub fn write_error<W: fmt::Write>(&self, w: &mut W, separator: &str) -> fmt::Result {
        let mut first = true;
        let mut last: Option<String> = None;
        let mut node: Option<&(dyn Error + 'static)> = Some(self as &(dyn Error + 'static));
        while let Some(err) = node {
            let message = match query::as_event(err) {
                Some(event) => event.message().to_string(),
                None => err.to_string(),
            };
            if !message.is_empty() && last.as_deref() != Some(message.as_str()) {
                if !first {
                    w.write_str(separator)?;
                }
                w.write_str(&message)?;
                first = false;
                last = Some(message);
            }
            node = err.source();
        }
        Ok(())
    }

    /// The joined chain text as a string.
    pub fn summary(&self, separator: &str) -> String {
        let mut out = String::new();
        // Writing to a String cannot fail.
        let _ = self.write_error(&mut out, separator);
        out
    }

    /// Machine-log mode serialization (one dense record per event).
    pub fn to_log_value(&self) -> Value {
        crate::serialize::to_log_value(self)
    }

    /// Human block mode serialization (indented, reader-oriented).
    pub fn to_pretty_string(&self) -> String {
        crate::serialize::to_pretty_string(self)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_error(f, DISPLAY_SEPARATOR)
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("level", &self.inner.level)
            .field("code", &self.inner.code)
            .field("message", &self.inner.message)
            .field("caller", &self.inner.caller)
            .field("key", &self.inner.key)
            .field("origin", &self.inner.origin.as_ref().map(|e| e.to_string()))
            .finish()
    }
}

impl Error for Event {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.origin()
    }
}

impl serde::Serialize for Event {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_log_value().serialize(serializer)
    }
}
