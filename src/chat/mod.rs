//! Chat application module for interactive conversations with Gemini.
//!
//! This module provides a streaming REPL chat interface built on top of the
//! parley client library. It supports:
//!
//! - Streaming responses rendered character by character with a spinner
//! - Document context attached to the next message
//! - Slash commands for session control
//! - Configurable model, system prompt, and sampling parameters
//!
//! # Architecture
//!
//! The module is organized into several components:
//!
//! - [`config`]: CLI argument parsing and configuration
//! - [`session`]: Core chat session management and API interaction
//! - [`commands`]: Slash command parsing and handling

mod commands;
mod config;
mod session;

pub use crate::render::{PlainTextRenderer, RenderSink};
pub use commands::{ChatCommand, help_text, parse_command};
pub use config::{ChatArgs, ChatConfig};
pub use session::{ChatSession, SessionStats};
