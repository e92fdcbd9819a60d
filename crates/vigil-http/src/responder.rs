//! Uniform response writing: transform, encode, optionally compress.

use std::any::Any;
use std::error::Error;
use std::io::Write;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use http::header::{CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE};
use http::{Response, StatusCode};
use http_body::Frame;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use serde_json::{json, Value};
use std::sync::Arc;

use vigil_event::{query, Event, EventBuilder};
use vigil_types::Context;

/// Body type produced by every respond path.
pub type ResponderBody = UnsyncBoxBody<Bytes, Event>;

/// Code space reserved for custom error-body transformers that want to
/// carry a machine code distinct from the HTTP status.
pub const DEFAULT_BODY_CODE: i64 = 5500;

const ENCODING_ERROR_TEXT: &str = "ENCODING ERROR";

/// Sentinel: respond with a status line and no body.
pub struct NoBody;

// `respond` requires Serialize; the sentinel is detected before encoding,
// so its serialized form is never produced.
impl serde::Serialize for NoBody {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_unit()
    }
}

/// Per-call options.
#[derive(Debug, Default, Clone, Copy)]
pub struct RespondOptions {
    pub status: Option<StatusCode>,
}

impl RespondOptions {
    pub fn status(status: StatusCode) -> Self {
        Self {
            status: Some(status),
        }
    }
}

// ----- seams -----

pub trait Encoder: Send + Sync {
    fn content_type(&self) -> &'static str;

    fn encode(&self, value: &Value) -> Result<Vec<u8>, Event>;
}

/// Default encoder: compact JSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonEncoder;

impl Encoder for JsonEncoder {
    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>, Event> {
        serde_json::to_vec(value)
            .map_err(|err| EventBuilder::wrap(err).message("json encoding failed").freeze())
    }
}

/// Pre-encode rewrite of the response value. Default is identity.
pub trait BodyTransformer: Send + Sync {
    fn transform(&self, value: Value) -> Value;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityTransformer;

impl BodyTransformer for IdentityTransformer {
    fn transform(&self, value: Value) -> Value {
        value
    }
}

/// Renders an error into a response body.
pub trait ErrorBodyTransformer: Send + Sync {
    fn body(&self, err: &(dyn Error + 'static)) -> Value;
}

/// Default error body: `{"error": message-or-Display}`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultErrorBody;

impl ErrorBodyTransformer for DefaultErrorBody {
    fn body(&self, err: &(dyn Error + 'static)) -> Value {
        let message = query::message(err);
        let message = if message.is_empty() {
            err.to_string()
        } else {
            message
        };
        json!({ "error": message })
    }
}

/// Whole-buffer and streaming compression.
pub trait Compressor: Send + Sync {
    fn encoding(&self) -> &'static str;

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, Event>;

    fn stream(&self) -> Box<dyn StreamCompressor>;
}

/// Stateful per-response compression stream.
pub trait StreamCompressor: Send {
    /// Feed one chunk; returns the compressed bytes ready so far.
    fn push(&mut self, chunk: &[u8]) -> Result<Vec<u8>, Event>;

    /// Flush the epilogue.
    fn finish(&mut self) -> Result<Vec<u8>, Event>;
}

/// zstd-backed [`Compressor`].
#[derive(Debug, Clone, Copy)]
pub struct ZstdCompressor {
    pub level: i32,
}

impl Default for ZstdCompressor {
    fn default() -> Self {
        Self { level: 3 }
    }
}

impl Compressor for ZstdCompressor {
    fn encoding(&self) -> &'static str {
        "zstd"
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, Event> {
        zstd::encode_all(data, self.level)
            .map_err(|err| EventBuilder::wrap(err).message("zstd compression failed").freeze())
    }

    fn stream(&self) -> Box<dyn StreamCompressor> {
        Box::new(ZstdStream {
            encoder: zstd::stream::write::Encoder::new(Vec::new(), self.level).ok(),
        })
    }
}

struct ZstdStream {
    encoder: Option<zstd::stream::write::Encoder<'static, Vec<u8>>>,
}

impl StreamCompressor for ZstdStream {
    fn push(&mut self, chunk: &[u8]) -> Result<Vec<u8>, Event> {
        let encoder = self
            .encoder
            .as_mut()
            .ok_or_else(|| EventBuilder::bail_freeze("compression stream already finished"))?;
        encoder
            .write_all(chunk)
            .and_then(|_| encoder.flush())
            .map_err(|err| EventBuilder::wrap(err).message("zstd compression failed").freeze())?;
        Ok(std::mem::take(encoder.get_mut()))
    }

    fn finish(&mut self) -> Result<Vec<u8>, Event> {
        let encoder = self
            .encoder
            .take()
            .ok_or_else(|| EventBuilder::bail_freeze("compression stream already finished"))?;
        encoder
            .finish()
            .map_err(|err| EventBuilder::wrap(err).message("zstd compression failed").freeze())
    }
}

/// Observation points around encoding and compression.
pub trait RespondHook: Send + Sync {
    fn pre_encoded(&self, _value: &Value) {}

    fn post_encoded(&self, _bytes: &[u8]) {}

    fn post_compressed(&self, _bytes: &[u8]) {}
}

// ----- the responder -----

/// Writes response bodies uniformly across handlers.
#[derive(Clone)]
pub struct Responder {
    encoder: Arc<dyn Encoder>,
    transformer: Arc<dyn BodyTransformer>,
    error_transformer: Arc<dyn ErrorBodyTransformer>,
    compressor: Option<Arc<dyn Compressor>>,
    hooks: Vec<Arc<dyn RespondHook>>,
}

impl Default for Responder {
    fn default() -> Self {
        Self {
            encoder: Arc::new(JsonEncoder),
            transformer: Arc::new(IdentityTransformer),
            error_transformer: Arc::new(DefaultErrorBody),
            compressor: None,
            hooks: Vec::new(),
        }
    }
}

impl Responder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_encoder(mut self, encoder: Arc<dyn Encoder>) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn with_transformer(mut self, transformer: Arc<dyn BodyTransformer>) -> Self {
        self.transformer = transformer;
        self
    }

    pub fn with_error_transformer(
        mut self,
        transformer: Arc<dyn ErrorBodyTransformer>,
    ) -> Self {
        self.error_transformer = transformer;
        self
    }

    pub fn with_compressor(mut self, compressor: Arc<dyn Compressor>) -> Self {
        self.compressor = Some(compressor);
        self
    }

    pub fn with_hook(mut self, hook: Arc<dyn RespondHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Encode `body` and build the response.
    ///
    /// Status precedence: explicit option, then the body's http-code hint
    /// (when the body is an [`Event`]), then 200. [`NoBody`] short-circuits
    /// to a status-only response.
    pub fn respond<T: serde::Serialize + 'static>(
        &self,
        _ctx: &Context,
        body: T,
        opts: &RespondOptions,
    ) -> Response<ResponderBody> {
        let any = &body as &dyn Any;
        if any.is::<NoBody>() {
            let status = opts.status.unwrap_or(StatusCode::OK);
            return status_only(status);
        }
        let hint = any
            .downcast_ref::<Event>()
            .map(|e| e.http_status())
            .and_then(|code| StatusCode::from_u16(code).ok());
        let status = opts.status.or(hint).unwrap_or(StatusCode::OK);

        let value = match serde_json::to_value(&body) {
            Ok(value) => value,
            Err(_) => return encoding_error(),
        };
        self.write(status, value)
    }

    /// Encode an error response.
    ///
    /// `None` stands in for a missing error and yields the internal-error
    /// sentinel. Status comes from the explicit option, else the chain's
    /// http-code (500 for foreign chains).
    pub fn respond_error(
        &self,
        _ctx: &Context,
        err: Option<&(dyn Error + 'static)>,
        opts: &RespondOptions,
    ) -> Response<ResponderBody> {
        let sentinel;
        let err = match err {
            Some(err) => err,
            None => {
                sentinel = EventBuilder::bail_freeze("Internal Server Error");
                &sentinel as &(dyn Error + 'static)
            }
        };
        let status = opts
            .status
            .or_else(|| StatusCode::from_u16(query::http_code(err)).ok())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let value = self.error_transformer.body(err);
        self.write(status, value)
    }

    /// Chunked response; compression is applied per chunk when configured.
    pub fn respond_stream<S>(
        &self,
        _ctx: &Context,
        content_type: &str,
        stream: S,
        opts: &RespondOptions,
    ) -> Response<ResponderBody>
    where
        S: Stream<Item = Result<Bytes, Event>> + Send + 'static,
    {
        let status = opts.status.unwrap_or(StatusCode::OK);
        let mut builder = Response::builder()
            .status(status)
            .header(CONTENT_TYPE, content_type);

        let mut compressor = self.compressor.as_ref().map(|c| c.stream());
        if let Some(c) = &self.compressor {
            builder = builder.header(CONTENT_ENCODING, c.encoding());
        }

        // `None` is appended as the end-of-stream marker so the compressor
        // epilogue can be flushed as a final frame.
        let framed = stream
            .map(Some)
            .chain(futures::stream::once(async { None }))
            .filter_map(move |item| {
                let out: Option<Result<Frame<Bytes>, Event>> = match item {
                    Some(Ok(chunk)) => match &mut compressor {
                        Some(stream_compressor) => match stream_compressor.push(&chunk) {
                            Ok(compressed) if compressed.is_empty() => None,
                            Ok(compressed) => Some(Ok(Frame::data(Bytes::from(compressed)))),
                            Err(err) => Some(Err(err)),
                        },
                        None => Some(Ok(Frame::data(chunk))),
                    },
                    Some(Err(err)) => Some(Err(err)),
                    None => match compressor.take() {
                        Some(mut stream_compressor) => match stream_compressor.finish() {
                            Ok(tail) if tail.is_empty() => None,
                            Ok(tail) => Some(Ok(Frame::data(Bytes::from(tail)))),
                            Err(err) => Some(Err(err)),
                        },
                        None => None,
                    },
                };
                async move { out }
            });

        let body = StreamBody::new(framed).boxed_unsync();
        match builder.body(body) {
            Ok(response) => response,
            Err(_) => encoding_error(),
        }
    }

    fn write(&self, status: StatusCode, value: Value) -> Response<ResponderBody> {
        let value = self.transformer.transform(value);
        for hook in &self.hooks {
            hook.pre_encoded(&value);
        }

        let encoded = match self.encoder.encode(&value) {
            Ok(bytes) => bytes,
            Err(_) => return encoding_error(),
        };
        for hook in &self.hooks {
            hook.post_encoded(&encoded);
        }

        let mut builder = Response::builder()
            .status(status)
            .header(CONTENT_TYPE, self.encoder.content_type());

        let payload = match &self.compressor {
            Some(compressor) => match compressor.compress(&encoded) {
                Ok(compressed) => {
                    builder = builder.header(CONTENT_ENCODING, compressor.encoding());
                    for hook in &self.hooks {
                        hook.post_compressed(&compressed);
                    }
                    compressed
                }
                Err(err) => {
                    tracing::warn!(target: "vigil", error = %err, "response compression failed");
                    encoded
                }
            },
            None => encoded,
        };

        builder = builder.header(CONTENT_LENGTH, payload.len());
        match builder.body(full(payload)) {
            Ok(response) => response,
            Err(_) => encoding_error(),
        }
    }
}

fn full(bytes: Vec<u8>) -> ResponderBody {
    Full::new(Bytes::from(bytes))
        .map_err(|never| match never {})
        .boxed_unsync()
}

fn status_only(status: StatusCode) -> Response<ResponderBody> {
    let mut response = Response::new(full(Vec::new()));
    *response.status_mut() = status;
    response
}

fn encoding_error() -> Response<ResponderBody> {
    let mut response = Response::new(full(ENCODING_ERROR_TEXT.as_bytes().to_vec()));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, http::HeaderValue::from_static("text/plain"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use parking_lot::Mutex;

    async fn body_bytes(response: Response<ResponderBody>) -> Vec<u8> {
        response
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes()
            .to_vec()
    }

    #[tokio::test]
    async fn test_respond_json_defaults() {
        let responder = Responder::new();
        let ctx = Context::background();
        let response = responder.respond(
            &ctx,
            serde_json::json!({"name": "thing"}),
            &RespondOptions::default(),
        );
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
        let length: usize = response
            .headers()
            .get(CONTENT_LENGTH)
            .unwrap()
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        let body = body_bytes(response).await;
        assert_eq!(body.len(), length);
        assert_eq!(body, b"{\"name\":\"thing\"}");
    }

    #[tokio::test]
    async fn test_event_body_drives_status() {
        let responder = Responder::new();
        let ctx = Context::background();
        let event = EventBuilder::bail("missing").code(404).freeze();
        let response = responder.respond(&ctx, event, &RespondOptions::default());
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_explicit_status_wins_over_hint() {
        let responder = Responder::new();
        let ctx = Context::background();
        let event = EventBuilder::bail("missing").code(404).freeze();
        let response = responder.respond(
            &ctx,
            event,
            &RespondOptions::status(StatusCode::BAD_GATEWAY),
        );
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_no_body_short_circuits() {
        let responder = Responder::new();
        let ctx = Context::background();
        let response = responder.respond(
            &ctx,
            NoBody,
            &RespondOptions::status(StatusCode::NO_CONTENT),
        );
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(body_bytes(response).await.is_empty());
    }

    #[tokio::test]
    async fn test_respond_error_default_body() {
        let responder = Responder::new();
        let ctx = Context::background();
        let err = EventBuilder::bail("not found").code(404).freeze();
        let response = responder.respond_error(&ctx, Some(&err), &RespondOptions::default());
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(body["error"], "not found");
    }

    #[tokio::test]
    async fn test_respond_error_nil_sentinel() {
        let responder = Responder::new();
        let ctx = Context::background();
        let response = responder.respond_error(&ctx, None, &RespondOptions::default());
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(body["error"], "Internal Server Error");
    }

    #[tokio::test]
    async fn test_encoder_failure_falls_back_to_plain_text() {
        struct BrokenEncoder;

        impl Encoder for BrokenEncoder {
            fn content_type(&self) -> &'static str {
                "application/json"
            }

            fn encode(&self, _value: &Value) -> Result<Vec<u8>, Event> {
                Err(EventBuilder::bail_freeze("no encoding today"))
            }
        }

        let responder = Responder::new().with_encoder(Arc::new(BrokenEncoder));
        let ctx = Context::background();
        let response = responder.respond(&ctx, serde_json::json!(1), &RespondOptions::default());
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers().get(CONTENT_TYPE).unwrap(), "text/plain");
        assert_eq!(body_bytes(response).await, ENCODING_ERROR_TEXT.as_bytes());
    }

    #[tokio::test]
    async fn test_compressed_respond_roundtrips() {
        let responder = Responder::new().with_compressor(Arc::new(ZstdCompressor::default()));
        let ctx = Context::background();
        let payload = serde_json::json!({"data": "x".repeat(512)});
        let expected = serde_json::to_vec(&payload).unwrap();

        let response = responder.respond(&ctx, payload, &RespondOptions::default());
        assert_eq!(
            response.headers().get(CONTENT_ENCODING).unwrap(),
            "zstd"
        );
        let compressed = body_bytes(response).await;
        let decompressed = zstd::decode_all(&compressed[..]).unwrap();
        assert_eq!(decompressed, expected);
    }

    #[tokio::test]
    async fn test_respond_stream_passthrough() {
        let responder = Responder::new();
        let ctx = Context::background();
        let chunks = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"alpha ")),
            Ok(Bytes::from_static(b"beta")),
        ]);
        let response =
            responder.respond_stream(&ctx, "text/plain", chunks, &RespondOptions::default());
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, b"alpha beta");
    }

    #[tokio::test]
    async fn test_respond_stream_compresses() {
        let responder = Responder::new().with_compressor(Arc::new(ZstdCompressor::default()));
        let ctx = Context::background();
        let chunks = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"streaming ")),
            Ok(Bytes::from_static(b"compression")),
        ]);
        let response =
            responder.respond_stream(&ctx, "text/plain", chunks, &RespondOptions::default());
        assert_eq!(
            response.headers().get(CONTENT_ENCODING).unwrap(),
            "zstd"
        );
        let compressed = body_bytes(response).await;
        let decompressed = zstd::decode_all(&compressed[..]).unwrap();
        assert_eq!(decompressed, b"streaming compression");
    }

    #[tokio::test]
    async fn test_hooks_observe_each_stage() {
        #[derive(Default)]
        struct Stages {
            seen: Mutex<Vec<&'static str>>,
        }

        impl RespondHook for Stages {
            fn pre_encoded(&self, _value: &Value) {
                self.seen.lock().push("pre");
            }
            fn post_encoded(&self, _bytes: &[u8]) {
                self.seen.lock().push("encoded");
            }
            fn post_compressed(&self, _bytes: &[u8]) {
                self.seen.lock().push("compressed");
            }
        }

        let stages = Arc::new(Stages::default());
        let responder = Responder::new()
            .with_compressor(Arc::new(ZstdCompressor::default()))
            .with_hook(stages.clone());
        let ctx = Context::background();
        responder.respond(&ctx, serde_json::json!({"s": 1}), &RespondOptions::default());
        assert_eq!(*stages.seen.lock(), vec!["pre", "encoded", "compressed"]);
    }
}
