//! Artifact offload seam: oversized payloads are pushed to an external
//! object store and the posted message carries a compact reference.

use async_trait::async_trait;
use bytes::Bytes;

use vigil_event::Event;
use vigil_types::Context;

/// One file queued for offload.
#[derive(Debug, Clone)]
pub struct ArtifactFile {
    pub content: Bytes,
    pub filename: String,
    pub mimetype: String,
    /// Short text shown alongside the reference in the posted message.
    pub pretext: String,
}

impl ArtifactFile {
    pub fn new(content: impl Into<Bytes>, filename: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            filename: filename.into(),
            mimetype: String::new(),
            pretext: String::new(),
        }
    }

    pub fn mimetype(mut self, mimetype: impl Into<String>) -> Self {
        self.mimetype = mimetype.into();
        self
    }

    pub fn pretext(mut self, pretext: impl Into<String>) -> Self {
        self.pretext = pretext.into();
        self
    }

    pub fn size(&self) -> usize {
        self.content.len()
    }
}

/// A successfully stored artifact.
#[derive(Debug, Clone)]
pub struct UploadedArtifact {
    pub url: String,
    pub filename: String,
    pub mimetype: String,
    pub size: usize,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Per-file outcome of an upload batch.
#[derive(Debug)]
pub struct UploadResult {
    pub file: ArtifactFile,
    pub outcome: Result<UploadedArtifact, Event>,
}

/// External object store. On success every file has a URL; per-file
/// failures are reported in the matching [`UploadResult`].
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn upload(&self, ctx: &Context, files: Vec<ArtifactFile>) -> Vec<UploadResult>;
}
