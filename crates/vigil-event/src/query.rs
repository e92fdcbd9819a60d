//! Pure traversal functions over arbitrary error chains.
//!
//! Chains are walked outermost-first via `Error::source`; event-specific
//! capabilities (code, http-code, message, caller) are probed by downcasting
//! each node to [`Event`]. Traversal always terminates because chains are
//! acyclic and finite by construction.

use std::error::Error;

use vigil_types::Caller;

use crate::event::Event;

/// Code returned when no node in the chain carries one.
pub const DEFAULT_CODE: i64 = 500;

/// HTTP status returned when no node in the chain derives one.
pub const DEFAULT_HTTP_CODE: u16 = 500;

/// Iterator over a chain, outermost node first.
pub fn chain<'a>(err: &'a (dyn Error + 'static)) -> Chain<'a> {
    Chain { next: Some(err) }
}

pub struct Chain<'a> {
    next: Option<&'a (dyn Error + 'static)>,
}

impl<'a> Iterator for Chain<'a> {
    type Item = &'a (dyn Error + 'static);

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        self.next = current.source();
        Some(current)
    }
}

/// Downcast a chain node to an [`Event`].
pub fn as_event<'a>(err: &'a (dyn Error + 'static)) -> Option<&'a Event> {
    err.downcast_ref::<Event>()
}

/// HTTP-status of the first node that derives one, else 500.
pub fn http_code(err: &(dyn Error + 'static)) -> u16 {
    chain(err)
        .find_map(as_event)
        .map(|e| e.http_status())
        .unwrap_or(DEFAULT_HTTP_CODE)
}

/// Code of the first node that carries one, else 500.
pub fn code(err: &(dyn Error + 'static)) -> i64 {
    chain(err)
        .find_map(as_event)
        .map(|e| e.code())
        .unwrap_or(DEFAULT_CODE)
}

/// Message of the first node that carries one, else "".
pub fn message(err: &(dyn Error + 'static)) -> String {
    chain(err)
        .find_map(as_event)
        .map(|e| e.message().to_string())
        .unwrap_or_default()
}

/// First event whose code or HTTP-status equals `wanted`.
pub fn search_code(err: &(dyn Error + 'static), wanted: i64) -> Option<Event> {
    chain(err).find_map(|node| {
        as_event(node)
            .filter(|e| e.code() == wanted || i64::from(e.http_status()) == wanted)
            .cloned()
    })
}

/// All events in the chain, outermost first.
pub fn collect_events(err: &(dyn Error + 'static)) -> Vec<Event> {
    chain(err).filter_map(|n| as_event(n).cloned()).collect()
}

/// One stack frame per node exposing a caller.
#[derive(Debug, Clone)]
pub struct StackEntry {
    pub caller: Caller,
    pub event: Event,
}

pub fn get_stack(err: &(dyn Error + 'static)) -> Vec<StackEntry> {
    chain(err)
        .filter_map(as_event)
        .map(|e| StackEntry {
            caller: e.caller(),
            event: e.clone(),
        })
        .collect()
}

/// Outermost event in the chain.
pub fn top_event(err: &(dyn Error + 'static)) -> Option<Event> {
    chain(err).find_map(|n| as_event(n).cloned())
}

/// Innermost event in the chain.
pub fn bottom_event(err: &(dyn Error + 'static)) -> Option<Event> {
    chain(err).filter_map(|n| as_event(n).cloned()).last()
}

/// Innermost node of any kind.
pub fn cause<'a>(err: &'a (dyn Error + 'static)) -> &'a (dyn Error + 'static) {
    let mut last = err;
    for node in chain(err) {
        last = node;
    }
    last
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EventBuilder;

    #[derive(Debug, thiserror::Error)]
    #[error("io failure")]
    struct IoFailure;

    fn sample_chain() -> Event {
        // IoFailure -> event(404, "not found") -> event("gateway", 502) -> wrapper
        let inner = EventBuilder::wrap(IoFailure)
            .code(404)
            .message("not found")
            .freeze();
        let mid = EventBuilder::wrap(inner)
            .code(502)
            .message("gateway")
            .freeze();
        EventBuilder::wrap(mid).freeze()
    }

    #[test]
    fn test_http_code_takes_outermost_event() {
        let e = sample_chain();
        assert_eq!(http_code(&e), 502);
    }

    #[test]
    fn test_http_code_default_for_foreign_chain() {
        assert_eq!(http_code(&IoFailure), DEFAULT_HTTP_CODE);
    }

    #[test]
    fn test_code_and_message() {
        let e = sample_chain();
        assert_eq!(code(&e), 502);
        assert_eq!(message(&e), "gateway");
        assert_eq!(message(&IoFailure), "");
    }

    #[test]
    fn test_search_code_finds_inner_node() {
        let e = sample_chain();
        let found = search_code(&e, 404).expect("404 node present");
        assert_eq!(found.message(), "not found");
        assert!(search_code(&e, 999).is_none());
    }

    #[test]
    fn test_search_code_matches_http_view() {
        let e = EventBuilder::new_entry("redirect").code(1301).freeze();
        let found = search_code(&e, 301).expect("http view matches");
        assert_eq!(found.code(), 1301);
    }

    #[test]
    fn test_collect_events_outer_to_inner() {
        let e = sample_chain();
        let events = collect_events(&e);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].message(), "gateway");
        assert_eq!(events[1].message(), "gateway");
        assert_eq!(events[2].message(), "not found");
    }

    #[test]
    fn test_get_stack_has_one_frame_per_event() {
        let e = sample_chain();
        let stack = get_stack(&e);
        assert_eq!(stack.len(), 3);
        assert!(stack.iter().all(|f| !f.caller.is_zero()));
    }

    #[test]
    fn test_top_and_bottom_event() {
        let e = sample_chain();
        assert_eq!(top_event(&e).unwrap().message(), "gateway");
        assert_eq!(bottom_event(&e).unwrap().message(), "not found");
        assert!(top_event(&IoFailure).is_none());
    }

    #[test]
    fn test_cause_is_innermost_node() {
        let e = sample_chain();
        let root = cause(&e);
        assert!(root.downcast_ref::<IoFailure>().is_some());
    }

    #[test]
    fn test_chain_iterator_counts_nodes() {
        let e = sample_chain();
        assert_eq!(chain(&e).count(), 4);
    }
}
