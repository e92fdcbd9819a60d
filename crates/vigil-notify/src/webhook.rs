//! A generic JSON webhook notifier built on the shared delivery core.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use vigil_event::{Event, EventBuilder};
use vigil_hub::MessageContext;
use vigil_types::Context;

use crate::artifact::{ArtifactFile, UploadedArtifact};
use crate::core::Poster;

/// Payload cap before the full record is offloaded as an artifact.
pub const DEFAULT_SIZE_LIMIT: usize = 8 * 1024;

/// Renders events into wire payloads.
///
/// `build` returns the primary payload together with artifact candidates
/// for content that exceeded the wire protocol's size limit.
pub trait MessageBuilder: Send + Sync {
    fn build(&self, message: &MessageContext) -> (Value, Vec<ArtifactFile>);

    /// The follow-up payload referencing uploaded artifacts.
    fn build_artifacts(&self, message: &MessageContext, uploads: &[UploadedArtifact]) -> Value;
}

/// Default builder: the machine-log record inline when it fits, otherwise
/// a compact summary with the full record as an artifact candidate.
pub struct JsonMessageBuilder {
    pub size_limit: usize,
}

impl Default for JsonMessageBuilder {
    fn default() -> Self {
        Self {
            size_limit: DEFAULT_SIZE_LIMIT,
        }
    }
}

impl MessageBuilder for JsonMessageBuilder {
    fn build(&self, message: &MessageContext) -> (Value, Vec<ArtifactFile>) {
        let event = &message.event;
        let record = event.to_log_value();
        let serialized = record.to_string();
        if serialized.len() <= self.size_limit {
            return (json!({ "text": event.summary(": "), "event": record }), Vec::new());
        }
        let candidate = ArtifactFile::new(serialized.into_bytes(), "event.json")
            .mimetype("application/json")
            .pretext(event.summary(": "));
        (
            json!({
                "text": event.summary(": "),
                "truncated": true,
            }),
            vec![candidate],
        )
    }

    fn build_artifacts(&self, message: &MessageContext, uploads: &[UploadedArtifact]) -> Value {
        json!({
            "text": format!("artifacts for: {}", message.event.summary(": ")),
            "attachments": uploads
                .iter()
                .map(|u| {
                    json!({
                        "url": u.url,
                        "filename": u.filename,
                        "mimetype": u.mimetype,
                        "size": u.size,
                    })
                })
                .collect::<Vec<_>>(),
        })
    }
}

/// [`Poster`] that delivers payloads to a webhook URL as JSON.
pub struct WebhookPoster {
    client: reqwest::Client,
    url: String,
    builder: Arc<dyn MessageBuilder>,
}

impl WebhookPoster {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            builder: Arc::new(JsonMessageBuilder::default()),
        }
    }

    pub fn with_builder(mut self, builder: Arc<dyn MessageBuilder>) -> Self {
        self.builder = builder;
        self
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    async fn dispatch(&self, payload: &Value) -> Result<(), Event> {
        let response = self
            .client
            .post(&self.url)
            .json(payload)
            .send()
            .await
            .map_err(|err| EventBuilder::wrap(err).message("webhook post failed").freeze())?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EventBuilder::bail(format!("webhook returned {status}"))
                .code(i64::from(status.as_u16()))
                .context_value(json!({ "body": body }))
                .freeze());
        }
        Ok(())
    }
}

#[async_trait]
impl Poster for WebhookPoster {
    async fn post(
        &self,
        _ctx: &Context,
        message: &MessageContext,
    ) -> Result<Vec<ArtifactFile>, Event> {
        let (payload, candidates) = self.builder.build(message);
        self.dispatch(&payload).await?;
        Ok(candidates)
    }

    async fn post_artifacts(
        &self,
        _ctx: &Context,
        message: &MessageContext,
        uploads: &[UploadedArtifact],
    ) -> Result<(), Event> {
        let payload = self.builder.build_artifacts(message, uploads);
        self.dispatch(&payload).await
    }
}
