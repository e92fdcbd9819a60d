//! Event serialization: the dense machine-log mode and the indented human
//! block mode.
//!
//! Both modes compare a wrapper against the event it wraps and omit the
//! fields the nested node already states, so the full record lives near the
//! innermost error and wrappers only add what changed.

use chrono::SecondsFormat;
use serde_json::{json, Map, Value};

use crate::event::Event;
use crate::query;

/// Wrapper time deltas under this threshold are elided.
const TIME_DELTA_MS: i64 = 1000;

struct Skips {
    code: bool,
    message: bool,
    level: bool,
    time: bool,
    service: bool,
    context: bool,
}

fn skips_against(e: &Event, child: Option<&Event>) -> Skips {
    match child {
        Some(c) => Skips {
            code: e.code() == c.code(),
            message: e.message() == c.message(),
            level: e.level() == c.level(),
            time: (e.time() - c.time()).num_milliseconds().abs() < TIME_DELTA_MS,
            service: e.service() == c.service() || e.service().is_nil(),
            context: e.context().is_empty(),
        },
        None => Skips {
            code: false,
            message: false,
            level: false,
            time: false,
            service: e.service().is_nil(),
            context: e.context().is_empty(),
        },
    }
}

fn time_value(e: &Event) -> Value {
    json!(e.time().to_rfc3339_opts(SecondsFormat::Millis, true))
}

fn context_value(e: &Event) -> Value {
    let ctx = e.context();
    if ctx.len() == 1 {
        ctx[0].clone()
    } else {
        Value::Array(ctx.to_vec())
    }
}

/// Machine-log mode: one dense, self-describing record per event.
///
/// Key order is fixed (`time, code, message, caller, key, level, service,
/// context, error`), so serializing the same frozen event twice yields
/// byte-equal output. `message` and `caller` are never omitted. A non-event
/// origin serializes as `{"summary": <text>}` so consumers never see an
/// empty error object.
pub fn to_log_value(event: &Event) -> Value {
    log_node(event)
}

fn log_node(e: &Event) -> Value {
    let child = e.origin().and_then(query::as_event);
    let skips = skips_against(e, child);

    let mut m = Map::new();
    if !skips.time {
        m.insert("time".into(), time_value(e));
    }
    if !skips.code {
        m.insert("code".into(), json!(e.code()));
    }
    m.insert("message".into(), json!(e.message()));
    m.insert("caller".into(), json!(e.caller().label()));
    if !e.key().is_empty() {
        m.insert("key".into(), json!(e.key()));
    }
    if !skips.level {
        m.insert("level".into(), json!(e.level().as_str()));
    }
    if !skips.service {
        if let Ok(service) = serde_json::to_value(e.service()) {
            m.insert("service".into(), service);
        }
    }
    if !skips.context {
        m.insert("context".into(), context_value(e));
    }

    match child {
        Some(c) => {
            m.insert("error".into(), log_node(c));
        }
        None => {
            if let Some(foreign) = e.origin() {
                m.insert("error".into(), json!({ "summary": foreign.to_string() }));
            }
        }
    }
    Value::Object(m)
}

/// Human block mode: an indented, reader-oriented rendering.
///
/// Same skip policy as the machine mode, with two extra rules: when code,
/// message, level and context are all skipped the caller line is skipped
/// too, and a node with nothing left to say is elided in favor of its
/// origin.
pub fn to_pretty_string(event: &Event) -> String {
    let mut out = String::new();
    pretty_node(event, 0, &mut out);
    out
}

fn pretty_node(e: &Event, depth: usize, out: &mut String) {
    let child = e.origin().and_then(query::as_event);
    let skips = skips_against(e, child);
    let skip_caller = skips.code && skips.message && skips.level && skips.context;
    let nothing_to_say = skip_caller && skips.time && skips.service;

    if nothing_to_say {
        if let Some(c) = child {
            pretty_node(c, depth, out);
            return;
        }
    }

    let indent = "  ".repeat(depth);
    if !nothing_to_say {
        out.push_str(&indent);
        if skips.message && skips.code && skips.level {
            // Only metadata differs; keep the head line minimal.
            out.push_str("...");
        } else {
            out.push_str(e.level().as_str());
            if !skips.code {
                out.push_str(&format!("[{}]", e.code()));
            }
            out.push(' ');
            out.push_str(e.message());
        }
        out.push('\n');
        if !skip_caller {
            out.push_str(&format!("{indent}  at {}\n", e.caller().label()));
        }
        if !skips.time {
            out.push_str(&format!(
                "{indent}  time {}\n",
                e.time().to_rfc3339_opts(SecondsFormat::Secs, true)
            ));
        }
        if !skips.service {
            let svc = e.service();
            out.push_str(&format!("{indent}  service {}", svc.name));
            if !svc.environment.is_empty() {
                out.push_str(&format!(" ({})", svc.environment));
            }
            out.push('\n');
        }
        if !skips.context {
            out.push_str(&format!("{indent}  context {}\n", context_value(e)));
        }
    }

    match child {
        Some(c) => {
            out.push_str(&format!("{indent}caused by:\n"));
            pretty_node(c, depth + 1, out);
        }
        None => {
            if let Some(foreign) = e.origin() {
                out.push_str(&format!("{indent}caused by: {foreign}\n"));
            }
        }
    }
}
