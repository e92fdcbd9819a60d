//! The notifier pipeline: a per-sink asynchronous queue with a bounded
//! worker pool, keyed cooldown/dedup with exponential back-off, and an
//! artifact-offload step for oversized payloads.
//!
//! [`NotifierCore`] carries the shared mechanism; only the wire-protocol
//! [`Poster`] differs between sinks. [`WebhookPoster`] is the bundled JSON
//! webhook implementation.

pub mod artifact;
pub mod config;
pub mod core;
pub mod hooks;
pub mod webhook;

pub use artifact::{ArtifactFile, ArtifactStore, UploadResult, UploadedArtifact};
pub use config::NotifierConfig;
pub use core::{NotifierCore, Poster};
pub use hooks::{NoopHooks, NotifyHooks};
pub use webhook::{JsonMessageBuilder, MessageBuilder, WebhookPoster};
