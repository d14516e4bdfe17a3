//! Configuration types for the chat application.
//!
//! This module provides CLI argument parsing via `arrrg` and configuration
//! structures for controlling chat behavior.

use std::time::Duration;

use arrrg_derive::CommandLine;

use crate::documents::DEFAULT_MAX_CONTEXT_CHARS;
use crate::responder::{DEFAULT_PACING, RequestOptions};
use crate::types::{GenerationConfig, Model};

/// Default maximum output tokens per response.
const DEFAULT_MAX_TOKENS: u32 = 8192;

/// Command-line arguments for the parley-chat tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Model to use for chat.
    #[arrrg(optional, "Model to use (default: gemini-2.0-flash)", "MODEL")]
    pub model: Option<String>,

    /// System instruction to set context for the conversation.
    #[arrrg(optional, "System instruction for the conversation", "PROMPT")]
    pub system: Option<String>,

    /// Maximum output tokens per response.
    #[arrrg(optional, "Max output tokens per response (default: 8192)", "TOKENS")]
    pub max_tokens: Option<u32>,

    /// Delay between rendered characters.
    #[arrrg(optional, "Milliseconds between rendered characters (default: 5, 0 disables)", "MS")]
    pub pacing_ms: Option<u64>,

    /// Cap on attached document text.
    #[arrrg(optional, "Max characters of document context (default: 30000)", "CHARS")]
    pub context_limit: Option<usize>,

    /// Extra dotenv file to load before reading the API key.
    #[arrrg(optional, "Env file to load (default: .env.local, then .env)", "PATH")]
    pub env_file: Option<String>,

    /// Use single blocking requests instead of streaming.
    #[arrrg(flag, "Disable streaming responses")]
    pub no_stream: bool,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

/// Configuration for a chat session.
///
/// This struct holds the resolved configuration values after processing
/// command-line arguments with appropriate defaults.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// The model to use for generating responses.
    pub model: Model,

    /// Optional system instruction.
    pub system_prompt: Option<String>,

    /// Maximum output tokens per response.
    pub max_tokens: u32,

    /// Optional sampling temperature.
    pub temperature: Option<f32>,

    /// Optional top-p nucleus sampling value.
    pub top_p: Option<f32>,

    /// Optional top-k sampling limit.
    pub top_k: Option<u32>,

    /// Custom stop sequences supplied on every request.
    pub stop_sequences: Vec<String>,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,

    /// Whether to stream responses.
    pub streaming: bool,

    /// Delay between partial renders.
    pub pacing: Duration,

    /// Cap on document context, in characters.
    pub max_context_chars: usize,
}

impl ChatConfig {
    /// Creates a new ChatConfig with default values.
    ///
    /// Defaults:
    /// - Model: gemini-2.0-flash
    /// - Max tokens: 8192
    /// - Color: enabled
    /// - Streaming: enabled, 5ms pacing
    /// - Document context: 30000 characters
    pub fn new() -> Self {
        Self {
            model: Model::default(),
            system_prompt: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: None,
            top_p: None,
            top_k: None,
            stop_sequences: Vec::new(),
            use_color: true,
            streaming: true,
            pacing: DEFAULT_PACING,
            max_context_chars: DEFAULT_MAX_CONTEXT_CHARS,
        }
    }

    /// Sets the model to use.
    pub fn with_model(mut self, model: Model) -> Self {
        self.model = model;
        self
    }

    /// Sets the system prompt.
    pub fn with_system_prompt(mut self, prompt: String) -> Self {
        self.system_prompt = Some(prompt);
        self
    }

    /// Sets the maximum tokens per response.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }

    /// Sets the sampling temperature.
    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    /// Sets the top-p value.
    pub fn with_top_p(mut self, top_p: Option<f32>) -> Self {
        self.top_p = top_p;
        self
    }

    /// Sets the top-k value.
    pub fn with_top_k(mut self, top_k: Option<u32>) -> Self {
        self.top_k = top_k;
        self
    }

    /// Sets the stop sequences.
    pub fn with_stop_sequences(mut self, stop_sequences: Vec<String>) -> Self {
        self.stop_sequences = stop_sequences;
        self
    }

    /// Enables or disables streaming.
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    /// Sets the delay between partial renders.
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    /// Sets the document context cap.
    pub fn with_max_context_chars(mut self, max_context_chars: usize) -> Self {
        self.max_context_chars = max_context_chars;
        self
    }

    /// The request options this configuration implies.
    pub fn request_options(&self) -> RequestOptions {
        RequestOptions {
            model: self.model.clone(),
            system_instruction: self.system_prompt.clone(),
            generation_config: GenerationConfig {
                max_output_tokens: Some(self.max_tokens),
                temperature: self.temperature,
                top_p: self.top_p,
                top_k: self.top_k,
                stop_sequences: self.stop_sequences.clone(),
            },
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl From<ChatArgs> for ChatConfig {
    fn from(args: ChatArgs) -> Self {
        let model = args.model.map(Model::from).unwrap_or_default();

        ChatConfig {
            model,
            system_prompt: args.system,
            max_tokens: args
                .max_tokens
                .filter(|&n| n > 0)
                .unwrap_or(DEFAULT_MAX_TOKENS),
            use_color: !args.no_color,
            streaming: !args.no_stream,
            pacing: args
                .pacing_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_PACING),
            max_context_chars: args.context_limit.unwrap_or(DEFAULT_MAX_CONTEXT_CHARS),
            ..ChatConfig::new()
        }
    }
}
