//! The seam between the chat core and the remote model.
//!
//! [`ModelService`] is the only thing the responder knows about the model: one
//! call that returns a complete response and one that returns a lazy stream
//! of chunks.  [`Gemini`] is the production implementation.

use std::sync::Arc;

use crate::client::{Gemini, ResponseStream};
use crate::error::Result;
use crate::types::{GenerateContentParams, GenerateContentResponse};

/// A remote model that can answer a conversation.
#[async_trait::async_trait]
pub trait ModelService: Send + Sync {
    /// Issue one blocking request and return the whole response.
    async fn generate(&self, params: GenerateContentParams) -> Result<GenerateContentResponse>;

    /// Open a streaming channel.
    ///
    /// An `Err` here means the channel could not be opened.  `Err` items on
    /// the returned stream are failures while reading it.
    async fn generate_stream(&self, params: GenerateContentParams) -> Result<ResponseStream>;
}

#[async_trait::async_trait]
impl ModelService for Gemini {
    async fn generate(&self, params: GenerateContentParams) -> Result<GenerateContentResponse> {
        self.send(params).await
    }

    async fn generate_stream(&self, params: GenerateContentParams) -> Result<ResponseStream> {
        self.stream(params).await
    }
}

#[async_trait::async_trait]
impl<S: ModelService + ?Sized> ModelService for Arc<S> {
    async fn generate(&self, params: GenerateContentParams) -> Result<GenerateContentResponse> {
        (**self).generate(params).await
    }

    async fn generate_stream(&self, params: GenerateContentParams) -> Result<ResponseStream> {
        (**self).generate_stream(params).await
    }
}
