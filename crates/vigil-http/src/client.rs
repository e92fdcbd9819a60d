//! Observed HTTP client: a decorator around `reqwest::Client` that records
//! each round-trip and reports it through a hook exactly once.

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use serde_json::{json, Value};

use vigil_event::{Event, EventBuilder};
use vigil_hub::EventExt;
use vigil_types::{Caller, Context, Level};

use crate::body::{BodyLimit, BodyRecord};

/// Clone cap for human-readable bodies.
pub const MAX_READABLE_CLONE: usize = 1024 * 1024;

/// Per-request clone limits resolved by the hook before dispatch.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub request: BodyLimit,
    pub response: BodyLimit,
}

/// Everything observed about one round-trip.
#[derive(Debug)]
pub struct RoundTrip {
    pub caller: Caller,
    pub method: http::Method,
    pub url: String,
    pub request_content_type: String,
    pub request_body: Option<BodyRecord>,
    pub status: Option<http::StatusCode>,
    pub headers: Option<http::HeaderMap>,
    pub response_body: Option<BodyRecord>,
    /// Transport error text, when the request never produced a response.
    pub error: Option<String>,
}

impl RoundTrip {
    pub fn response_content_type(&self) -> String {
        header_str(self.headers.as_ref(), http::header::CONTENT_TYPE)
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some() || self.status.map_or(false, |s| s.as_u16() >= 400)
    }
}

/// Observation seam of [`ObservedClient`].
pub trait ClientHook: Send + Sync {
    /// Clone limits for this request; consulted before dispatch.
    fn limits(&self, request: &reqwest::Request) -> Limits;

    /// Fired exactly once per round-trip: when the caller finishes reading
    /// the response body, or when the wrapped response is dropped.
    fn on_result(&self, ctx: &Context, round_trip: &RoundTrip);
}

// ----- content heuristics -----

/// Whether a body with this content-type is worth embedding as text.
/// An empty content-type falls back to sniffing the body for JSON.
pub fn is_human_readable(content_type: &str, body: &[u8]) -> bool {
    let ct = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if ct.is_empty() {
        return looks_like_json(body);
    }
    ct.starts_with("text/")
        || ct.starts_with("application/json")
        || ct.starts_with("application/xml")
        || ct.starts_with("application/x-www-form-urlencoded")
}

fn looks_like_json(body: &[u8]) -> bool {
    let first = body.iter().find(|b| !b.is_ascii_whitespace());
    let last = body.iter().rev().find(|b| !b.is_ascii_whitespace());
    matches!(
        (first, last),
        (Some(b'{'), Some(b'}')) | (Some(b'['), Some(b']'))
    )
}

/// Header map as JSON: each name, in canonical casing, maps to the array
/// of values sent under it.
pub fn headers_value(headers: &http::HeaderMap) -> Value {
    let mut map = serde_json::Map::new();
    for name in headers.keys() {
        let values: Vec<Value> = headers
            .get_all(name)
            .iter()
            .map(|v| Value::String(String::from_utf8_lossy(v.as_bytes()).into_owned()))
            .collect();
        map.insert(canonical_header_name(name.as_str()), Value::Array(values));
    }
    Value::Object(map)
}

// `http` lowercases header names; restore the wire-canonical form
// ("content-type" -> "Content-Type") for the event context.
fn canonical_header_name(name: &str) -> String {
    name.split('-')
        .map(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// Render a cloned body for event context: parsed JSON when it is JSON and
/// complete, text (marked truncated) when readable, `"(binary)"` otherwise.
pub fn embed_body(content_type: &str, record: &BodyRecord) -> Value {
    if record.is_empty() {
        return Value::Null;
    }
    if !is_human_readable(content_type, &record.bytes) {
        return json!("(binary)");
    }
    if !record.truncated {
        if let Ok(parsed) = serde_json::from_slice::<Value>(&record.bytes) {
            return parsed;
        }
    }
    let text = record.text();
    if record.truncated {
        json!(format!("{text} (truncated)"))
    } else {
        json!(text)
    }
}

/// Default hook: bounded clones of human-readable bodies, one hub event
/// per round-trip (error level on status ≥ 400 or transport failure).
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultClientHook;

impl ClientHook for DefaultClientHook {
    fn limits(&self, request: &reqwest::Request) -> Limits {
        let content_type = header_str(Some(request.headers()), http::header::CONTENT_TYPE);
        let body = request
            .body()
            .and_then(|b| b.as_bytes())
            .unwrap_or_default();
        let request_limit = if is_human_readable(&content_type, body) {
            BodyLimit::Max(MAX_READABLE_CLONE)
        } else {
            BodyLimit::Skip
        };
        Limits {
            request: request_limit,
            // Response readability is only known after the fact; clone
            // bounded and decide at embed time.
            response: BodyLimit::Max(MAX_READABLE_CLONE),
        }
    }

    fn on_result(&self, ctx: &Context, round_trip: &RoundTrip) {
        let level = if round_trip.is_failure() {
            Level::Error
        } else {
            Level::Info
        };
        let status = round_trip
            .status
            .map(|s| i64::from(s.as_u16()))
            .unwrap_or_default();
        let mut request = json!({
            "method": round_trip.method.as_str(),
            "url": round_trip.url,
        });
        if let Some(record) = &round_trip.request_body {
            request["body"] = embed_body(&round_trip.request_content_type, record);
        }
        let mut response = json!({ "status": status });
        if let Some(headers) = &round_trip.headers {
            response["headers"] = headers_value(headers);
        }
        if let Some(record) = &round_trip.response_body {
            response["body"] = embed_body(&round_trip.response_content_type(), record);
        }
        let context = json!({ "request": request, "response": response });

        let mut builder = EventBuilder::new_entry(format!(
            "HTTP {} {}",
            round_trip.method, round_trip.url
        ))
        .level(level)
        .caller(round_trip.caller)
        .context_value(context);
        if status != 0 {
            builder = builder.code(status);
        }
        if let Some(error) = &round_trip.error {
            builder = builder.message(format!(
                "HTTP {} {}: {}",
                round_trip.method, round_trip.url, error
            ));
        }
        let event = builder.freeze();

        // `on_result` is synchronous; hand the event to the hub off-path.
        let ctx = ctx.detach();
        tokio::spawn(async move { event.log(&ctx).await });
    }
}

fn header_str(headers: Option<&http::HeaderMap>, name: http::header::HeaderName) -> String {
    headers
        .and_then(|h| h.get(name))
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

// ----- the client -----

/// Decorator around `reqwest::Client` that observes every round-trip.
#[derive(Clone)]
pub struct ObservedClient {
    client: reqwest::Client,
    hook: Arc<dyn ClientHook>,
}

impl ObservedClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            hook: Arc::new(DefaultClientHook),
        }
    }

    pub fn with_hook(mut self, hook: Arc<dyn ClientHook>) -> Self {
        self.hook = hook;
        self
    }

    pub fn inner(&self) -> &reqwest::Client {
        &self.client
    }

    /// Dispatch a request. The hook fires when the returned response's body
    /// is consumed or the response is dropped; on transport error it fires
    /// before this future resolves.
    #[track_caller]
    pub fn execute(
        &self,
        ctx: &Context,
        request: reqwest::Request,
    ) -> impl Future<Output = Result<ObservedResponse, Event>> + Send {
        let caller = Caller::capture();
        let client = self.client.clone();
        let hook = Arc::clone(&self.hook);
        let ctx = ctx.clone();
        async move {
            let limits = hook.limits(&request);
            let request_body = clone_request_body(&request, limits.request);
            let mut round_trip = RoundTrip {
                caller,
                method: request.method().clone(),
                url: request.url().to_string(),
                request_content_type: header_str(
                    Some(request.headers()),
                    http::header::CONTENT_TYPE,
                ),
                request_body,
                status: None,
                headers: None,
                response_body: None,
                error: None,
            };

            match client.execute(request).await {
                Ok(response) => {
                    round_trip.status = Some(response.status());
                    round_trip.headers = Some(response.headers().clone());
                    Ok(ObservedResponse {
                        inner: Some(response),
                        pending: Some(PendingDispatch {
                            hook,
                            ctx,
                            round_trip,
                            limit: limits.response,
                        }),
                    })
                }
                Err(err) => {
                    round_trip.error = Some(err.to_string());
                    hook.on_result(&ctx, &round_trip);
                    Err(EventBuilder::wrap(err)
                        .caller(caller)
                        .message(format!(
                            "HTTP {} {} failed",
                            round_trip.method, round_trip.url
                        ))
                        .freeze())
                }
            }
        }
    }
}

fn clone_request_body(request: &reqwest::Request, limit: BodyLimit) -> Option<BodyRecord> {
    let bytes = request.body()?.as_bytes()?;
    let size = bytes.len() as u64;
    if limit.is_skip() {
        return Some(BodyRecord {
            bytes: Bytes::new(),
            truncated: false,
            size,
        });
    }
    let room = match limit {
        BodyLimit::Max(max) => max.min(bytes.len()),
        _ => bytes.len(),
    };
    Some(BodyRecord {
        bytes: Bytes::copy_from_slice(&bytes[..room]),
        truncated: room < bytes.len(),
        size,
    })
}

struct PendingDispatch {
    hook: Arc<dyn ClientHook>,
    ctx: Context,
    round_trip: RoundTrip,
    limit: BodyLimit,
}

impl PendingDispatch {
    fn fire(mut self, body: Option<BodyRecord>) {
        self.round_trip.response_body = body;
        self.hook.on_result(&self.ctx, &self.round_trip);
    }
}

/// Response wrapper that guarantees exactly one hook dispatch.
pub struct ObservedResponse {
    inner: Option<reqwest::Response>,
    pending: Option<PendingDispatch>,
}

impl ObservedResponse {
    pub fn status(&self) -> http::StatusCode {
        self.inner
            .as_ref()
            .map(|r| r.status())
            .unwrap_or(http::StatusCode::OK)
    }

    pub fn headers(&self) -> Option<&http::HeaderMap> {
        self.inner.as_ref().map(|r| r.headers())
    }

    /// Read the full body; fires the hook with the (bounded) clone.
    pub async fn bytes(mut self) -> Result<Bytes, Event> {
        let response = self
            .inner
            .take()
            .ok_or_else(|| EventBuilder::bail_freeze("response body already consumed"))?;
        let pending = self.pending.take();
        match response.bytes().await {
            Ok(bytes) => {
                if let Some(pending) = pending {
                    let limit = pending.limit;
                    let record = bounded_record(&bytes, limit);
                    pending.fire(Some(record));
                }
                Ok(bytes)
            }
            Err(err) => {
                if let Some(mut pending) = pending {
                    pending.round_trip.error = Some(err.to_string());
                    pending.fire(None);
                }
                Err(EventBuilder::wrap(err)
                    .message("reading response body failed")
                    .freeze())
            }
        }
    }

    pub async fn text(self) -> Result<String, Event> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub async fn json<T: serde::de::DeserializeOwned>(self) -> Result<T, Event> {
        let bytes = self.bytes().await?;
        serde_json::from_slice(&bytes)
            .map_err(|err| EventBuilder::wrap(err).message("decoding response failed").freeze())
    }
}

impl Drop for ObservedResponse {
    fn drop(&mut self) {
        // Body never read: report the round-trip without a body clone.
        if let Some(pending) = self.pending.take() {
            pending.fire(None);
        }
    }
}

fn bounded_record(bytes: &Bytes, limit: BodyLimit) -> BodyRecord {
    let size = bytes.len() as u64;
    if limit.is_skip() {
        return BodyRecord {
            bytes: Bytes::new(),
            truncated: false,
            size,
        };
    }
    let room = match limit {
        BodyLimit::Max(max) => max.min(bytes.len()),
        _ => bytes.len(),
    };
    BodyRecord {
        bytes: bytes.slice(..room),
        truncated: room < bytes.len(),
        size,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_readable_content_types() {
        assert!(is_human_readable("text/plain; charset=utf-8", b""));
        assert!(is_human_readable("application/json", b""));
        assert!(is_human_readable("application/xml", b""));
        assert!(is_human_readable("application/x-www-form-urlencoded", b""));
        assert!(!is_human_readable("application/octet-stream", b""));
        assert!(!is_human_readable("image/png", b""));
    }

    #[test]
    fn test_empty_content_type_sniffs_json() {
        assert!(is_human_readable("", b"  {\"a\": 1}  "));
        assert!(is_human_readable("", b"[1, 2]"));
        assert!(!is_human_readable("", b"\x89PNG"));
    }

    #[test]
    fn test_embed_parsed_json_when_complete() {
        let record = BodyRecord {
            bytes: Bytes::from_static(b"{\"ok\": true}"),
            truncated: false,
            size: 12,
        };
        let embedded = embed_body("application/json", &record);
        assert_eq!(embedded["ok"], true);
    }

    #[test]
    fn test_embed_truncated_as_marked_text() {
        let record = BodyRecord {
            bytes: Bytes::from_static(b"{\"ok\": tr"),
            truncated: true,
            size: 12,
        };
        let embedded = embed_body("application/json", &record);
        assert_eq!(embedded, "{\"ok\": tr (truncated)");
    }

    #[test]
    fn test_embed_binary_marker() {
        let record = BodyRecord {
            bytes: Bytes::from_static(b"\x00\x01\x02"),
            truncated: false,
            size: 3,
        };
        assert_eq!(embed_body("application/octet-stream", &record), "(binary)");
    }

    #[test]
    fn test_embed_empty_body_is_null() {
        let record = BodyRecord::default();
        assert_eq!(embed_body("application/json", &record), Value::Null);
    }

    #[test]
    fn test_default_limits_skip_binary_request() {
        let hook = DefaultClientHook;
        let client = reqwest::Client::new();
        let request = client
            .post("http://example.test/upload")
            .header(http::header::CONTENT_TYPE, "application/octet-stream")
            .body(vec![0u8, 1, 2])
            .build()
            .unwrap();
        let limits = hook.limits(&request);
        assert!(limits.request.is_skip());
        assert_eq!(limits.response, BodyLimit::Max(MAX_READABLE_CLONE));
    }

    #[test]
    fn test_headers_value_canonical_names() {
        let mut headers = http::HeaderMap::new();
        headers.insert(
            http::header::CONTENT_TYPE,
            "text/plain; charset=utf-8".parse().unwrap(),
        );
        headers.append(http::header::SET_COOKIE, "a=1".parse().unwrap());
        headers.append(http::header::SET_COOKIE, "b=2".parse().unwrap());

        let value = headers_value(&headers);
        assert!(value["Content-Type"][0]
            .as_str()
            .unwrap()
            .starts_with("text/plain"));
        assert_eq!(value["Set-Cookie"].as_array().unwrap().len(), 2);
        assert_eq!(value["Set-Cookie"][1], "b=2");
    }

    #[test]
    fn test_bounded_record_slices_and_marks() {
        let bytes = Bytes::from_static(b"0123456789");
        let record = bounded_record(&bytes, BodyLimit::Max(4));
        assert_eq!(&record.bytes[..], b"0123");
        assert!(record.truncated);
        assert_eq!(record.size, 10);
    }
}
