use std::error::Error;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use vigil_types::{Caller, Level, Service};

use crate::event::{ErrorRef, Event, EventInner};
use crate::query;

/// Default code assigned to bail events and to wraps of chains that carry
/// no code of their own.
pub const DEFAULT_ERROR_CODE: i64 = 500;

/// Mutable pre-commit stage of an [`Event`].
///
/// Every entry point is `#[track_caller]`, so the frozen event's caller is
/// the user-visible call site. `freeze` cannot fail.
#[must_use]
pub struct EventBuilder {
    service: Service,
    caller: Caller,
    level: Level,
    time: Option<DateTime<Utc>>,
    code: i64,
    message: String,
    key: String,
    context: Vec<Value>,
    origin: Option<ErrorRef>,
}

impl EventBuilder {
    /// Start a fresh info-level event with no origin.
    #[track_caller]
    pub fn new_entry(message: impl Into<String>) -> Self {
        Self {
            service: Service::default(),
            caller: Caller::capture(),
            level: Level::Info,
            time: None,
            code: 0,
            message: message.into(),
            key: String::new(),
            context: Vec::new(),
            origin: None,
        }
    }

    /// Start a new node wrapping `err`.
    ///
    /// Message, code and level are prefilled from the chain; when the chain
    /// carries no message the origin's surface error text is used.
    #[track_caller]
    pub fn wrap<E: Error + Send + Sync + 'static>(err: E) -> Self {
        Self::wrap_arc(Arc::new(err))
    }

    /// `wrap` for errors already behind a shared reference.
    #[track_caller]
    pub fn wrap_arc(err: ErrorRef) -> Self {
        let (message, code, level) = {
            let chain_head = err.as_ref() as &(dyn Error + 'static);
            let mut message = query::message(chain_head);
            if message.is_empty() {
                message = chain_head.to_string();
            }
            let code = query::code(chain_head);
            let level = query::top_event(chain_head)
                .map(|e| e.level())
                .unwrap_or(Level::Error);
            (message, code, level)
        };
        Self {
            service: Service::default(),
            caller: Caller::capture(),
            level,
            time: None,
            code,
            message,
            key: String::new(),
            context: Vec::new(),
            origin: Some(err),
        }
    }

    /// `wrap(err).message(text).freeze()`.
    #[track_caller]
    pub fn wrap_freeze<E: Error + Send + Sync + 'static>(
        err: E,
        message: impl Into<String>,
    ) -> Event {
        Self::wrap(err).message(message).freeze()
    }

    /// An error event with no origin; `message` doubles as the error text.
    #[track_caller]
    pub fn bail(message: impl Into<String>) -> Self {
        Self {
            service: Service::default(),
            caller: Caller::capture(),
            level: Level::Error,
            time: None,
            code: DEFAULT_ERROR_CODE,
            message: message.into(),
            key: String::new(),
            context: Vec::new(),
            origin: None,
        }
    }

    /// `bail(message).freeze()`.
    #[track_caller]
    pub fn bail_freeze(message: impl Into<String>) -> Event {
        Self::bail(message).freeze()
    }

    pub fn service(mut self, service: Service) -> Self {
        self.service = service;
        self
    }

    pub fn code(mut self, code: i64) -> Self {
        self.code = code;
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn time(mut self, time: DateTime<Utc>) -> Self {
        self.time = Some(time);
        self
    }

    pub fn caller(mut self, caller: Caller) -> Self {
        self.caller = caller;
        self
    }

    /// Append one context payload. Values that fail to serialize are
    /// recorded as null rather than dropped.
    pub fn context<T: serde::Serialize>(mut self, payload: T) -> Self {
        self.context
            .push(serde_json::to_value(payload).unwrap_or(Value::Null));
        self
    }

    /// Append an already-built JSON payload.
    pub fn context_value(mut self, payload: Value) -> Self {
        self.context.push(payload);
        self
    }

    /// Commit the event. Time defaults to now when not supplied.
    pub fn freeze(self) -> Event {
        Event::from_inner(EventInner {
            service: self.service,
            caller: self.caller,
            level: self.level,
            time: self.time.unwrap_or_else(Utc::now),
            code: self.code,
            message: self.message,
            key: self.key,
            context: self.context,
            origin: self.origin,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("disk full")]
    struct DiskFull;

    #[test]
    fn test_new_entry_defaults() {
        let e = EventBuilder::new_entry("hello").freeze();
        assert_eq!(e.level(), Level::Info);
        assert_eq!(e.code(), 0);
        assert_eq!(e.message(), "hello");
        assert!(e.origin().is_none());
        assert!(e.key().is_empty());
    }

    #[test]
    fn test_bail_defaults() {
        let e = EventBuilder::bail("boom").freeze();
        assert_eq!(e.level(), Level::Error);
        assert_eq!(e.code(), DEFAULT_ERROR_CODE);
        assert_eq!(e.message(), "boom");
    }

    #[test]
    fn test_wrap_prefills_from_foreign_error() {
        let e = EventBuilder::wrap(DiskFull).freeze();
        assert_eq!(e.message(), "disk full");
        assert_eq!(e.code(), DEFAULT_ERROR_CODE);
        assert_eq!(e.level(), Level::Error);
        assert!(e.origin().is_some());
    }

    #[test]
    fn test_wrap_prefills_from_event_chain() {
        let base = EventBuilder::bail("root cause").code(404).freeze();
        let wrapped = EventBuilder::wrap(base).freeze();
        assert_eq!(wrapped.message(), "root cause");
        assert_eq!(wrapped.code(), 404);
        assert_eq!(wrapped.level(), Level::Error);
    }

    #[test]
    fn test_wrap_freeze_overrides_message() {
        let base = EventBuilder::bail_freeze("inner");
        let e = EventBuilder::wrap_freeze(base, "outer");
        assert_eq!(e.message(), "outer");
        assert_eq!(e.summary(" => "), "outer => inner");
    }

    #[test]
    fn test_caller_points_at_user_call_site() {
        let before = Caller::capture();
        let e = EventBuilder::new_entry("here").freeze();
        let after = Caller::capture();
        assert_eq!(e.caller().file(), before.file());
        assert!(e.caller().line() > before.line());
        assert!(e.caller().line() < after.line());
    }

    #[test]
    fn test_explicit_fields_survive_freeze() {
        let time = Utc::now();
        let e = EventBuilder::new_entry("x")
            .code(429)
            .key("rate-limit")
            .level(Level::Warn)
            .time(time)
            .context(serde_json::json!({"tries": 3}))
            .freeze();
        assert_eq!(e.code(), 429);
        assert_eq!(e.key(), "rate-limit");
        assert_eq!(e.level(), Level::Warn);
        assert_eq!(e.time(), time);
        assert_eq!(e.context().len(), 1);
        assert_eq!(e.context()[0]["tries"], 3);
    }

    #[test]
    fn test_freeze_sets_time_when_absent() {
        let before = Utc::now();
        let e = EventBuilder::new_entry("x").freeze();
        let after = Utc::now();
        assert!(e.time() >= before && e.time() <= after);
    }
}
