use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{Content, Model};

/// Sampling and length controls sent with every request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    /// Maximum number of tokens in a candidate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,

    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Nucleus sampling probability mass.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    /// Top-k sampling limit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,

    /// Sequences that stop generation.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub stop_sequences: Vec<String>,
}

impl GenerationConfig {
    /// True when no field is set, in which case the config is left off the wire.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Body of a `generateContent` / `streamGenerateContent` call.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    /// The conversation, oldest first, ending with the outgoing message.
    pub contents: Vec<Content>,

    /// Optional system instruction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,

    /// Optional generation controls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

/// A request bound to the model that should serve it.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateContentParams {
    /// The model to call.
    pub model: Model,

    /// The request body.
    pub request: GenerateContentRequest,
}

impl GenerateContentParams {
    /// Create params for the given model and request body.
    pub fn new(model: Model, request: GenerateContentRequest) -> Self {
        Self { model, request }
    }
}

/// One response candidate.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    /// Generated content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,

    /// Why generation stopped, e.g. `STOP` or `SAFETY`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,

    /// Index of this candidate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
}

/// Feedback about the prompt, present when the prompt was blocked.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    /// Reason the prompt was blocked.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_reason: Option<String>,
}

/// Token accounting.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    /// Tokens in the prompt.
    #[serde(default)]
    pub prompt_token_count: u32,

    /// Tokens across all candidates.
    #[serde(default)]
    pub candidates_token_count: u32,

    /// Prompt plus candidates.
    #[serde(default)]
    pub total_token_count: u32,
}

/// A complete response, or one chunk of a streamed response.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    /// Response candidates.  Only the first is used.
    #[serde(default)]
    pub candidates: Vec<Candidate>,

    /// Set when the prompt was blocked.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_feedback: Option<PromptFeedback>,

    /// Token accounting, typically on the final chunk.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage_metadata: Option<UsageMetadata>,

    /// The model version that produced the response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
}

impl GenerateContentResponse {
    /// A single-candidate response carrying `text`.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            candidates: vec![Candidate {
                content: Some(Content::model(text)),
                finish_reason: None,
                index: Some(0),
            }],
            ..Self::default()
        }
    }

    /// The text of the first candidate, or `None` if it carries no text.
    pub fn text(&self) -> Option<String> {
        self.candidates.first()?.content.as_ref()?.text()
    }

    /// The error for a blocked prompt, if the response reports a block reason.
    pub fn block_error(&self) -> Option<Error> {
        let reason = self.prompt_feedback.as_ref()?.block_reason.as_deref()?;
        Some(Error::bad_request(format!("prompt blocked: {reason}")))
    }

    /// The text of the first candidate, or an error describing why there is none.
    pub fn into_text(self) -> Result<String> {
        if let Some(text) = self.text() {
            return Ok(text);
        }
        if let Some(err) = self.block_error() {
            return Err(err);
        }
        match self.candidates.first().and_then(|c| c.finish_reason.clone()) {
            Some(reason) => Err(Error::unknown(format!(
                "response contained no text (finish reason: {reason})"
            ))),
            None => Err(Error::unknown("response contained no text")),
        }
    }
}
