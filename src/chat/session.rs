//! Core chat session management.
//!
//! This module provides the `ChatSession` struct which owns the conversation,
//! the pending document context and the responder that talks to the model.

use std::path::Path;
use std::time::Duration;

use crate::chat::config::ChatConfig;
use crate::client::Gemini;
use crate::conversation::{ConversationStore, Turn};
use crate::documents::{Document, DocumentContext, DocumentExtractor};
use crate::error::Result;
use crate::render::RenderSink;
use crate::responder::StreamingResponder;
use crate::service::ModelService;
use crate::types::Model;

/// A chat session that manages conversation state and API interactions.
///
/// Every call to [`ChatSession::send_streaming`] or [`ChatSession::send`]
/// appends exactly two turns: the user's message and the model's reply (or an
/// error turn standing in for it).
pub struct ChatSession<S: ModelService = Gemini> {
    responder: StreamingResponder<S>,
    store: ConversationStore,
    documents: DocumentContext,
    streaming: bool,
    round_trips: u64,
}

/// Aggregated stats for a chat session.
#[derive(Debug, Clone)]
pub struct SessionStats {
    /// The model used for the session.
    pub model: Model,
    /// The number of turns in the conversation.
    pub message_count: usize,
    /// The number of completed round trips.
    pub round_trips: u64,
    /// The maximum output tokens per response, if set.
    pub max_tokens: Option<u32>,
    /// The system prompt, if any.
    pub system_prompt: Option<String>,
    /// The sampling temperature, if set.
    pub temperature: Option<f32>,
    /// The top-p value, if set.
    pub top_p: Option<f32>,
    /// The top-k value, if set.
    pub top_k: Option<u32>,
    /// Whether responses are streamed.
    pub streaming: bool,
    /// Delay between partial renders.
    pub pacing: Duration,
    /// Documents waiting for the next message.
    pub pending_documents: usize,
    /// Cap on document context, in characters.
    pub max_context_chars: usize,
}

impl ChatSession<Gemini> {
    /// Creates a new chat session with the given client and configuration.
    pub fn new(client: Gemini, config: ChatConfig) -> Self {
        Self::with_service(client, config)
    }
}

impl<S: ModelService> ChatSession<S> {
    /// Creates a new chat session on an arbitrary model service.
    pub fn with_service(service: S, config: ChatConfig) -> Self {
        let responder = StreamingResponder::new(service)
            .with_options(config.request_options())
            .with_pacing(config.pacing);
        Self {
            responder,
            store: ConversationStore::new(),
            documents: DocumentContext::new(config.max_context_chars),
            streaming: config.streaming,
            round_trips: 0,
        }
    }

    /// Sends a user message and streams the response into `sink`.
    ///
    /// Pending documents are placed ahead of `input` and then dropped.
    /// Returns the model turn, which is an error turn if the request failed.
    pub async fn send_streaming(&mut self, input: &str, sink: &mut dyn RenderSink) -> &Turn {
        self.push_user(input);
        let reply = self.responder.respond_streaming(&self.store, sink).await;
        self.push_reply(reply)
    }

    /// Sends a user message with a single blocking request.
    ///
    /// `sink.render_final` is called once with the whole reply.
    pub async fn send(&mut self, input: &str, sink: &mut dyn RenderSink) -> &Turn {
        self.push_user(input);
        let reply = self.responder.respond(&self.store).await;
        sink.render_final(reply.content());
        self.push_reply(reply)
    }

    /// Sends a user message the way the session is configured to: streamed
    /// or blocking.
    pub async fn submit(&mut self, input: &str, sink: &mut dyn RenderSink) -> &Turn {
        if self.streaming {
            self.send_streaming(input, sink).await
        } else {
            self.send(input, sink).await
        }
    }

    fn push_user(&mut self, input: &str) {
        let content = self.documents.compose(input);
        if !self.documents.is_empty() {
            tracing::debug!(
                documents = self.documents.documents().len(),
                chars = content.chars().count(),
                "attached document context"
            );
            self.documents.clear();
        }
        // The composed message always ends with the query.
        let query_start = content.len() - input.len();
        self.store.append(Turn::user_with_context(content, query_start));
    }

    fn push_reply(&mut self, reply: Turn) -> &Turn {
        self.round_trips += 1;
        tracing::debug!(
            round_trips = self.round_trips,
            turns = self.store.len() + 1,
            "round trip complete"
        );
        self.store.append(reply)
    }

    /// Queues a document for the next message.
    pub fn attach_document(&mut self, name: impl Into<String>, text: impl Into<String>) {
        self.documents.push(name, text);
    }

    /// Extracts `path` and queues it for the next message.
    ///
    /// Returns false when the file yields no text.
    ///
    /// # Errors
    ///
    /// Returns an error if the extractor cannot read the file.
    pub fn attach_file(&mut self, path: &Path, extractor: &dyn DocumentExtractor) -> Result<bool> {
        self.documents.attach_file(path, extractor)
    }

    /// Drops every pending document.
    pub fn clear_documents(&mut self) {
        self.documents.clear();
    }

    /// Documents waiting for the next message.
    pub fn pending_documents(&self) -> &[Document] {
        self.documents.documents()
    }

    /// Sets the cap on document context.
    pub fn set_max_context_chars(&mut self, max_chars: usize) {
        self.documents.set_max_chars(max_chars);
    }

    /// Clears the conversation history and pending documents.
    pub fn clear(&mut self) {
        self.store.clear();
        self.documents.clear();
    }

    /// Returns the number of turns in the conversation.
    pub fn message_count(&self) -> usize {
        self.store.len()
    }

    /// Returns every turn, oldest first.
    pub fn history(&self) -> &[Turn] {
        self.store.snapshot()
    }

    /// Changes the model used for responses.
    pub fn set_model(&mut self, model: Model) {
        self.responder.options_mut().model = model;
    }

    /// Returns the current model.
    pub fn model(&self) -> &Model {
        &self.responder.options().model
    }

    /// Sets or clears the system prompt.
    pub fn set_system_prompt(&mut self, prompt: Option<String>) {
        self.responder.options_mut().system_instruction = prompt;
    }

    /// Returns the current system prompt, if any.
    pub fn system_prompt(&self) -> Option<&str> {
        self.responder.options().system_instruction.as_deref()
    }

    /// Sets the maximum output tokens per response.
    pub fn set_max_tokens(&mut self, max_tokens: u32) {
        self.responder
            .options_mut()
            .generation_config
            .max_output_tokens = Some(max_tokens);
    }

    /// Returns the maximum output tokens per response, if set.
    pub fn max_tokens(&self) -> Option<u32> {
        self.responder.options().generation_config.max_output_tokens
    }

    /// Sets the sampling temperature.
    pub fn set_temperature(&mut self, temperature: Option<f32>) {
        self.responder.options_mut().generation_config.temperature = temperature;
    }

    /// Returns the sampling temperature, if set.
    pub fn temperature(&self) -> Option<f32> {
        self.responder.options().generation_config.temperature
    }

    /// Sets the top-p value.
    pub fn set_top_p(&mut self, top_p: Option<f32>) {
        self.responder.options_mut().generation_config.top_p = top_p;
    }

    /// Returns the top-p value, if set.
    pub fn top_p(&self) -> Option<f32> {
        self.responder.options().generation_config.top_p
    }

    /// Sets the top-k value.
    pub fn set_top_k(&mut self, top_k: Option<u32>) {
        self.responder.options_mut().generation_config.top_k = top_k;
    }

    /// Returns the top-k value, if set.
    pub fn top_k(&self) -> Option<u32> {
        self.responder.options().generation_config.top_k
    }

    /// Sets the delay between partial renders.  Zero disables pacing.
    pub fn set_pacing(&mut self, pacing: Duration) {
        self.responder.set_pacing(pacing);
    }

    /// Returns the delay between partial renders.
    pub fn pacing(&self) -> Duration {
        self.responder.pacing()
    }

    /// Enables or disables streaming for [`ChatSession::submit`].
    pub fn set_streaming(&mut self, streaming: bool) {
        self.streaming = streaming;
    }

    /// Returns whether [`ChatSession::submit`] streams.
    pub fn streaming(&self) -> bool {
        self.streaming
    }

    /// Returns the current session statistics snapshot.
    pub fn stats(&self) -> SessionStats {
        let options = self.responder.options();
        SessionStats {
            model: options.model.clone(),
            message_count: self.message_count(),
            round_trips: self.round_trips,
            max_tokens: options.generation_config.max_output_tokens,
            system_prompt: options.system_instruction.clone(),
            temperature: options.generation_config.temperature,
            top_p: options.generation_config.top_p,
            top_k: options.generation_config.top_k,
            streaming: self.streaming,
            pacing: self.pacing(),
            pending_documents: self.documents.documents().len(),
            max_context_chars: self.documents.max_chars(),
        }
    }
}
