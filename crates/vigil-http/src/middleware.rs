//! Tower middleware that observes server requests and responses.
//!
//! The service tees the request body and the response body through
//! [`ObservedBody`] so streaming is preserved, and fires the [`ServerHook`]
//! exactly once per exchange, after the response body completes (or is
//! dropped). The wrapped handler is never failed by observation.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};

use bytes::Bytes;
use http::{Request, Response};
use http_body::Body;
use parking_lot::Mutex;
use serde_json::json;
use tower::{Layer, Service};

use vigil_event::EventBuilder;
use vigil_hub::EventExt;
use vigil_types::{Context, Level};

use crate::body::{BodyLimit, BodyRecord, ObservedBody};
use crate::client::{embed_body, headers_value, is_human_readable, Limits, MAX_READABLE_CLONE};

/// One observed request/response exchange.
#[derive(Debug)]
pub struct ExchangeRecord {
    pub method: http::Method,
    pub uri: http::Uri,
    pub request_content_type: String,
    pub request_body: Option<BodyRecord>,
    pub status: http::StatusCode,
    pub headers: http::HeaderMap,
    pub response_body: Option<BodyRecord>,
}

impl ExchangeRecord {
    pub fn response_content_type(&self) -> String {
        self.headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    }
}

/// Observation seam of [`ObserveService`].
pub trait ServerHook: Send + Sync {
    /// Clone limits for this exchange; consulted before the handler runs.
    fn limits(&self, parts: &http::request::Parts) -> Limits;

    /// Fired exactly once, after the response body completes or is dropped.
    fn on_complete(&self, record: ExchangeRecord);
}

/// Default hook: bounded clones of human-readable request bodies, one hub
/// event per exchange (error level on status ≥ 400).
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultServerHook;

impl ServerHook for DefaultServerHook {
    fn limits(&self, parts: &http::request::Parts) -> Limits {
        let content_type = parts
            .headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        let request = if content_type.is_empty() || is_human_readable(content_type, b"{}") {
            BodyLimit::Max(MAX_READABLE_CLONE)
        } else {
            BodyLimit::Skip
        };
        Limits {
            request,
            response: BodyLimit::Max(MAX_READABLE_CLONE),
        }
    }

    fn on_complete(&self, record: ExchangeRecord) {
        let level = if record.status.as_u16() >= 400 {
            Level::Error
        } else {
            Level::Info
        };
        let mut request = json!({
            "method": record.method.as_str(),
            "uri": record.uri.to_string(),
        });
        if let Some(body) = &record.request_body {
            request["body"] = embed_body(&record.request_content_type, body);
        }
        let mut response = json!({
            "status": record.status.as_u16(),
            "headers": headers_value(&record.headers),
        });
        if let Some(body) = &record.response_body {
            response["body"] = embed_body(&record.response_content_type(), body);
        }
        let context = json!({ "request": request, "response": response });
        let event = EventBuilder::new_entry(format!(
            "HTTP {} {} -> {}",
            record.method,
            record.uri,
            record.status.as_u16()
        ))
        .level(level)
        .code(i64::from(record.status.as_u16()))
        .context_value(context)
        .freeze();

        let ctx = Context::background();
        tokio::spawn(async move { event.log(&ctx).await });
    }
}

/// Layer producing [`ObserveService`].
#[derive(Clone)]
pub struct ObserveLayer {
    hook: Arc<dyn ServerHook>,
}

impl ObserveLayer {
    pub fn new(hook: Arc<dyn ServerHook>) -> Self {
        Self { hook }
    }
}

impl Default for ObserveLayer {
    fn default() -> Self {
        Self::new(Arc::new(DefaultServerHook))
    }
}

impl<S> Layer<S> for ObserveLayer {
    type Service = ObserveService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ObserveService {
            inner,
            hook: Arc::clone(&self.hook),
        }
    }
}

/// Service wrapper created by [`ObserveLayer`].
#[derive(Clone)]
pub struct ObserveService<S> {
    inner: S,
    hook: Arc<dyn ServerHook>,
}

type BoxedFuture<T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send>>;

impl<S, ReqB, ResB> Service<Request<ReqB>> for ObserveService<S>
where
    S: Service<Request<ObservedBody<ReqB>>, Response = Response<ResB>> + Clone + Send + 'static,
    S::Future: Send,
    ReqB: Body<Data = Bytes> + Send + 'static,
    ResB: Body<Data = Bytes> + Send + 'static,
{
    type Response = Response<ObservedBody<ResB>>;
    type Error = S::Error;
    type Future = BoxedFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqB>) -> Self::Future {
        // The clone takes over; `self.inner` keeps the instance that
        // reported readiness.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let hook = Arc::clone(&self.hook);

        let (parts, body) = request.into_parts();
        let limits = hook.limits(&parts);
        let method = parts.method.clone();
        let uri = parts.uri.clone();
        let request_content_type = parts
            .headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        // The request body may complete (or be dropped) at any point while
        // the handler runs; park its record for the final dispatch.
        let request_record: Arc<Mutex<Option<BodyRecord>>> = Arc::new(Mutex::new(None));
        let request_slot = Arc::clone(&request_record);
        let observed_request = ObservedBody::new(body, limits.request, move |record| {
            *request_slot.lock() = Some(record);
        });
        let request = Request::from_parts(parts, observed_request);

        Box::pin(async move {
            let response = inner.call(request).await?;
            let status = response.status();
            let headers = response.headers().clone();
            let response = response.map(|body| {
                ObservedBody::new(body, limits.response, move |record| {
                    hook.on_complete(ExchangeRecord {
                        method,
                        uri,
                        request_content_type,
                        request_body: request_record.lock().take(),
                        status,
                        headers,
                        response_body: Some(record),
                    });
                })
            });
            Ok(response)
        })
    }
}
