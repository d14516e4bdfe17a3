// Public modules
pub mod chat;
pub mod client;
pub mod conversation;
pub mod documents;
pub mod error;
pub mod observability;
pub mod render;
pub mod responder;
pub mod service;
pub mod sse;
pub mod types;

// Re-exports
pub use client::{API_KEY_ENV, Gemini, ResponseStream};
pub use conversation::{ConversationStore, ModelRequest, Turn};
pub use documents::{
    CONTEXT_HEADER, DocumentContext, DocumentExtractor, PlainTextExtractor, QUERY_MARKER,
    display_query,
};
pub use error::{Error, Result};
pub use observability::register_biometrics;
pub use render::{CallbackSink, PlainTextRenderer, RecordingSink, RenderSink};
pub use responder::{FailureStage, Outcome, ProgressMarker, RequestOptions, StreamingResponder};
pub use service::ModelService;
pub use types::*;
