//! HTTP observation layer: an instrumented client, tower server
//! middleware, and a uniform response writer.
//!
//! Bodies are teed through bounded, pooled mirrors so observation never
//! changes what flows over the wire, and every exchange produces at most
//! one hub event.

pub mod body;
pub mod client;
pub mod middleware;
pub mod responder;

pub use body::{BodyLimit, BodyRecord, CloneReader, ObservedBody, ResponseRecord};
pub use client::{
    embed_body, headers_value, is_human_readable, ClientHook, DefaultClientHook, Limits,
    ObservedClient, ObservedResponse, RoundTrip, MAX_READABLE_CLONE,
};
pub use middleware::{
    DefaultServerHook, ExchangeRecord, ObserveLayer, ObserveService, ServerHook,
};
pub use responder::{
    BodyTransformer, Compressor, DefaultErrorBody, Encoder, ErrorBodyTransformer, JsonEncoder,
    NoBody, RespondHook, RespondOptions, Responder, ResponderBody, StreamCompressor,
    ZstdCompressor, DEFAULT_BODY_CODE,
};
