//! Turning a conversation into a streamed, incrementally rendered reply.
//!
//! [`StreamingResponder`] builds a request from a [`ConversationStore`], opens
//! a stream on a [`ModelService`], and pushes a snapshot to a [`RenderSink`]
//! after every character it receives.  Failures never escape: they become a
//! model turn whose text starts with `Error:`.

use std::time::{Duration, Instant};

use futures::StreamExt;

use crate::conversation::{ConversationStore, ModelRequest, Turn};
use crate::error::Error;
use crate::observability::{
    RESPONDER_FAILURES, RESPONDER_TURNS, STREAM_CHUNKS, STREAM_DURATION, STREAM_ERRORS,
    STREAM_MALFORMED_CHUNKS,
};
use crate::render::RenderSink;
use crate::service::ModelService;
use crate::types::{
    Content, GenerateContentParams, GenerateContentRequest, GenerationConfig, Model,
};

/// Default delay between partial renders.
pub const DEFAULT_PACING: Duration = Duration::from_millis(5);

/// Braille spinner frames.
pub const DEFAULT_PALETTE: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

///////////////////////////////////////////// Outcome ////////////////////////////////////////////

/// Where a response attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    /// The conversation had no turn to send.
    NoMessage,
    /// The request could not be initiated.
    ChannelOpen,
    /// The stream failed after it opened.
    ChannelRead,
}

/// The result of one response attempt.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// The model answered with this text.
    Completed(String),
    /// The attempt failed.
    Failed {
        /// Where it failed.
        stage: FailureStage,
        /// Why it failed.
        error: Error,
    },
}

impl Outcome {
    /// True for [`Outcome::Failed`].
    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed { .. })
    }

    /// The text a human should see: the answer, or `Error: <message>`.
    pub fn into_text(self) -> String {
        match self {
            Outcome::Completed(text) => text,
            Outcome::Failed { error, .. } => format!("Error: {}", error.message()),
        }
    }

    /// The model turn to append to the conversation.
    pub fn into_turn(self) -> Turn {
        Turn::model(self.into_text())
    }
}

////////////////////////////////////////// ProgressMarker ////////////////////////////////////////

/// Cosmetic glyph appended to partial renders.
#[derive(Debug, Clone, Copy)]
pub struct ProgressMarker {
    palette: &'static [&'static str],
}

impl Default for ProgressMarker {
    fn default() -> Self {
        Self::new(DEFAULT_PALETTE)
    }
}

impl ProgressMarker {
    /// A marker cycling through `palette`.
    pub fn new(palette: &'static [&'static str]) -> Self {
        Self { palette }
    }

    /// The glyph for frame `counter`.  An empty palette yields `""`.
    pub fn frame(&self, counter: usize) -> &'static str {
        if self.palette.is_empty() {
            return "";
        }
        self.palette[counter % self.palette.len()]
    }
}

/////////////////////////////////////////// StreamSession ////////////////////////////////////////

/// Accumulation state for one in-flight streamed response.
#[derive(Debug, Default)]
struct StreamSession {
    buffer: String,
    snapshot: String,
    chunks_consumed: usize,
    frames: usize,
}

impl StreamSession {
    /// Append `ch` and return the snapshot to render.
    fn push(&mut self, ch: char, marker: &ProgressMarker) -> &str {
        self.buffer.push(ch);
        self.snapshot.clear();
        self.snapshot.push_str(&self.buffer);
        self.snapshot.push_str(marker.frame(self.frames));
        self.frames += 1;
        &self.snapshot
    }
}

////////////////////////////////////////// RequestOptions ////////////////////////////////////////

/// Per-request settings layered on top of the conversation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    /// Model to call.
    pub model: Model,
    /// Optional system instruction.
    pub system_instruction: Option<String>,
    /// Sampling and length controls.
    pub generation_config: GenerationConfig,
}

impl RequestOptions {
    /// Bind a conversation request to these options.
    pub fn params(&self, request: ModelRequest) -> GenerateContentParams {
        let generation_config = if self.generation_config.is_empty() {
            None
        } else {
            Some(self.generation_config.clone())
        };
        GenerateContentParams::new(
            self.model.clone(),
            GenerateContentRequest {
                contents: request.into_contents(),
                system_instruction: self.system_instruction.clone().map(Content::instruction),
                generation_config,
            },
        )
    }
}

/////////////////////////////////////////// Responder ////////////////////////////////////////////

/// Produces model turns from a conversation.
pub struct StreamingResponder<S: ModelService> {
    service: S,
    options: RequestOptions,
    marker: ProgressMarker,
    pacing: Duration,
}

impl<S: ModelService> StreamingResponder<S> {
    /// A responder with default options, marker and pacing.
    pub fn new(service: S) -> Self {
        Self {
            service,
            options: RequestOptions::default(),
            marker: ProgressMarker::default(),
            pacing: DEFAULT_PACING,
        }
    }

    /// Replace the request options.
    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    /// Replace the progress marker.
    pub fn with_marker(mut self, marker: ProgressMarker) -> Self {
        self.marker = marker;
        self
    }

    /// Set the delay between partial renders.  Zero disables pacing.
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    /// The request options.
    pub fn options(&self) -> &RequestOptions {
        &self.options
    }

    /// The request options, for mutation.
    pub fn options_mut(&mut self) -> &mut RequestOptions {
        &mut self.options
    }

    /// The delay between partial renders.
    pub fn pacing(&self) -> Duration {
        self.pacing
    }

    /// Set the delay between partial renders.
    pub fn set_pacing(&mut self, pacing: Duration) {
        self.pacing = pacing;
    }

    /// The underlying service.
    pub fn service(&self) -> &S {
        &self.service
    }

    /// Stream a reply to the newest turn of `store`.
    ///
    /// Calls `sink.render_partial` once per received character and
    /// `sink.render_final` exactly once, then returns the model turn.  The
    /// store is not modified.
    pub async fn respond_streaming(
        &self,
        store: &ConversationStore,
        sink: &mut dyn RenderSink,
    ) -> Turn {
        let outcome = self.stream_outcome(store, sink).await;
        let text = self.finish(outcome);
        sink.render_final(&text);
        Turn::model(text)
    }

    /// Reply to the newest turn of `store` with a single blocking request.
    pub async fn respond(&self, store: &ConversationStore) -> Turn {
        let outcome = self.outcome(store).await;
        Turn::model(self.finish(outcome))
    }

    /// Like [`Self::respond_streaming`], but returns the tagged outcome and
    /// leaves `render_final` to the caller.
    pub async fn stream_outcome(
        &self,
        store: &ConversationStore,
        sink: &mut dyn RenderSink,
    ) -> Outcome {
        let params = match self.params(store) {
            Ok(params) => params,
            Err(outcome) => return outcome,
        };

        let start = Instant::now();
        let mut stream = match self.service.generate_stream(params).await {
            Ok(stream) => stream,
            Err(error) => {
                return Outcome::Failed {
                    stage: FailureStage::ChannelOpen,
                    error,
                };
            }
        };

        let mut session = StreamSession::default();
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(error) => {
                    STREAM_ERRORS.click();
                    STREAM_DURATION.add(start.elapsed().as_secs_f64());
                    tracing::debug!(
                        chunks = session.chunks_consumed,
                        chars = session.frames,
                        "stream failed; discarding partial response"
                    );
                    return Outcome::Failed {
                        stage: FailureStage::ChannelRead,
                        error,
                    };
                }
            };
            let Some(text) = chunk.text() else {
                if let Some(error) = chunk.block_error() {
                    STREAM_ERRORS.click();
                    STREAM_DURATION.add(start.elapsed().as_secs_f64());
                    tracing::debug!(chunks = session.chunks_consumed, "prompt blocked mid-stream");
                    return Outcome::Failed {
                        stage: FailureStage::ChannelRead,
                        error,
                    };
                }
                STREAM_MALFORMED_CHUNKS.click();
                tracing::trace!(?chunk, "skipping chunk without text");
                continue;
            };
            STREAM_CHUNKS.click();
            session.chunks_consumed += 1;
            for ch in text.chars() {
                sink.render_partial(session.push(ch, &self.marker));
                if !self.pacing.is_zero() {
                    tokio::time::sleep(self.pacing).await;
                }
            }
        }

        STREAM_DURATION.add(start.elapsed().as_secs_f64());
        tracing::debug!(
            chunks = session.chunks_consumed,
            chars = session.frames,
            "stream complete"
        );
        Outcome::Completed(session.buffer)
    }

    /// Like [`Self::respond`], but returns the tagged outcome.
    pub async fn outcome(&self, store: &ConversationStore) -> Outcome {
        let params = match self.params(store) {
            Ok(params) => params,
            Err(outcome) => return outcome,
        };
        match self.service.generate(params).await {
            Ok(response) => match response.into_text() {
                Ok(text) => Outcome::Completed(text),
                Err(error) => Outcome::Failed {
                    stage: FailureStage::ChannelRead,
                    error,
                },
            },
            Err(error) => Outcome::Failed {
                stage: FailureStage::ChannelOpen,
                error,
            },
        }
    }

    fn params(&self, store: &ConversationStore) -> Result<GenerateContentParams, Outcome> {
        match store.to_model_request() {
            Some(request) => Ok(self.options.params(request)),
            None => Err(Outcome::Failed {
                stage: FailureStage::NoMessage,
                error: Error::validation("conversation has no turn to send", None),
            }),
        }
    }

    fn finish(&self, outcome: Outcome) -> String {
        RESPONDER_TURNS.click();
        if let Outcome::Failed { stage, error } = &outcome {
            RESPONDER_FAILURES.click();
            let retryable = error.is_retryable();
            tracing::warn!(?stage, retryable, %error, "model response failed");
        }
        outcome.into_text()
    }
}
