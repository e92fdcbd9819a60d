//! Observation points around the delivery path.

use async_trait::async_trait;

use vigil_hub::MessageContext;
use vigil_types::Context;

use crate::artifact::{ArtifactFile, UploadResult};

/// Hooks invoked around message delivery and artifact offload.
///
/// All methods default to no-ops. A context returned by a `pre_*` hook
/// supersedes the one passed downstream, letting hooks attach values
/// (trace identifiers, auth material) for the rest of the job.
#[async_trait]
pub trait NotifyHooks: Send + Sync {
    async fn pre_message(&self, _ctx: &Context, _message: &MessageContext) -> Option<Context> {
        None
    }

    async fn post_message(&self, _ctx: &Context, _message: &MessageContext) {}

    async fn pre_artifact_upload(
        &self,
        _ctx: &Context,
        _files: &[ArtifactFile],
    ) -> Option<Context> {
        None
    }

    async fn post_artifact_upload(&self, _ctx: &Context, _results: &[UploadResult]) {}
}

/// The default hook set: every method is a no-op.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl NotifyHooks for NoopHooks {}
