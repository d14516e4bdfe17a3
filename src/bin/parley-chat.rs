//! Interactive chat application for conversing with Gemini.
//!
//! This binary provides a streaming REPL interface for chatting with Gemini
//! models, optionally grounding the first message in local documents.
//!
//! # Usage
//!
//! ```bash
//! # Basic usage with default settings
//! parley-chat
//!
//! # Specify a model
//! parley-chat --model gemini-2.5-flash
//!
//! # Attach documents to the first message
//! parley-chat notes.txt report.md
//!
//! # Render instantly, without the per-character delay
//! parley-chat --pacing-ms 0
//! ```
//!
//! The API key is read from `GEMINI_API_KEY`, after loading `.env.local` and
//! `.env` (or `--env-file`).  Logging goes to stderr and is controlled by
//! `RUST_LOG`.
//!
//! # Commands
//!
//! While chatting, you can use slash commands:
//! - `/help` - Show available commands
//! - `/attach <path>` - Attach a document to the next message
//! - `/clear` - Clear conversation history
//! - `/model <name>` - Change the model
//! - `/stats` - Show session statistics
//! - `/quit` - Exit the application

use std::path::Path;

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing_subscriber::EnvFilter;

use parley::chat::{
    ChatArgs, ChatCommand, ChatConfig, ChatSession, PlainTextRenderer, help_text, parse_command,
};
use parley::{Gemini, Model, PlainTextExtractor, Role};

/// Main entry point for the parley-chat application.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (args, documents) =
        ChatArgs::from_command_line_relaxed("parley-chat [OPTIONS] [DOCUMENT ...]");
    let env_error = load_env(args.env_file.as_deref());
    init_tracing();
    if let Some(err) = env_error {
        tracing::warn!("{err}");
    }

    let config = ChatConfig::from(args);
    let use_color = config.use_color;

    let client = Gemini::new(None)?;
    if !client.has_api_key() {
        tracing::warn!("GEMINI_API_KEY is not set; requests will fail until it is");
    }
    let mut session = ChatSession::new(client, config);
    let mut renderer = PlainTextRenderer::with_color(use_color);
    let mut rl = DefaultEditor::new()?;

    for document in &documents {
        attach(&mut session, &mut renderer, document);
    }

    println!("Gemini Chat (model: {})", session.model());
    println!("Type /help for commands, /quit to exit\n");

    loop {
        let readline = rl.readline("You: ");

        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                if let Some(cmd) = parse_command(line) {
                    match cmd {
                        ChatCommand::Quit => {
                            println!("Goodbye!");
                            break;
                        }
                        ChatCommand::Clear => {
                            session.clear();
                            renderer.print_info("Conversation cleared.");
                        }
                        ChatCommand::Help => {
                            for line in help_text().lines() {
                                println!("    {}", line);
                            }
                        }
                        ChatCommand::Model(model_name) => {
                            session.set_model(Model::from(model_name.as_str()));
                            renderer.print_info(&format!("Model changed to: {}", session.model()));
                        }
                        ChatCommand::System(prompt) => {
                            session.set_system_prompt(prompt.clone());
                            match prompt {
                                Some(p) => {
                                    renderer.print_info(&format!("System prompt set to: {}", p))
                                }
                                None => renderer.print_info("System prompt cleared."),
                            }
                        }
                        ChatCommand::MaxTokens(value) => {
                            session.set_max_tokens(value);
                            renderer.print_info(&format!("max output tokens set to {value}"));
                        }
                        ChatCommand::Temperature(value) => {
                            session.set_temperature(Some(value));
                            renderer.print_info(&format!("temperature set to {:.2}", value));
                        }
                        ChatCommand::ClearTemperature => {
                            session.set_temperature(None);
                            renderer.print_info("temperature reset to model default");
                        }
                        ChatCommand::TopP(value) => {
                            session.set_top_p(Some(value));
                            renderer.print_info(&format!("top_p set to {:.2}", value));
                        }
                        ChatCommand::ClearTopP => {
                            session.set_top_p(None);
                            renderer.print_info("top_p reset to model default");
                        }
                        ChatCommand::TopK(value) => {
                            session.set_top_k(Some(value));
                            renderer.print_info(&format!("top_k set to {value}"));
                        }
                        ChatCommand::ClearTopK => {
                            session.set_top_k(None);
                            renderer.print_info("top_k reset to model default");
                        }
                        ChatCommand::Attach(path) => {
                            attach(&mut session, &mut renderer, &path);
                        }
                        ChatCommand::Detach => {
                            session.clear_documents();
                            renderer.print_info("Pending documents dropped.");
                        }
                        ChatCommand::Documents => {
                            print_documents(&session);
                        }
                        ChatCommand::History => {
                            for turn in session.history() {
                                renderer.print_turn(turn);
                            }
                        }
                        ChatCommand::Stream(on) => {
                            session.set_streaming(on);
                            if on {
                                renderer.print_info("Streaming enabled.");
                            } else {
                                renderer.print_info("Streaming disabled.");
                            }
                        }
                        ChatCommand::Stats => {
                            print_stats(&session);
                        }
                        ChatCommand::Invalid(message) => {
                            renderer.print_error(&message);
                        }
                    }
                    continue;
                }

                // Regular message - send to API
                renderer.print_label(Role::Model);
                session.submit(line, &mut renderer).await;
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl+C at prompt - soft interrupt
                println!();
                continue;
            }
            Err(ReadlineError::Eof) => {
                // Ctrl+D - exit
                println!("\nGoodbye!");
                break;
            }
            Err(err) => {
                renderer.print_error(&format!("Input error: {}", err));
                break;
            }
        }
    }

    Ok(())
}

/// Load `.env.local`, then `.env` or the explicit env file.
///
/// Missing default files are fine; a missing explicit file is reported.
fn load_env(env_file: Option<&str>) -> Option<String> {
    let _ = dotenvy::from_filename(".env.local");
    match env_file {
        Some(path) => dotenvy::from_path(path)
            .err()
            .map(|err| format!("could not load {path}: {err}")),
        None => {
            let _ = dotenvy::dotenv();
            None
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn attach(session: &mut ChatSession, renderer: &mut PlainTextRenderer, path: &str) {
    match session.attach_file(Path::new(path), &PlainTextExtractor) {
        Ok(true) => renderer.print_info(&format!("Attached {path} to the next message.")),
        Ok(false) => renderer.print_error(&format!("{path} has no readable text")),
        Err(err) => renderer.print_error(&format!("Failed to attach {path}: {}", err.message())),
    }
}

fn print_documents(session: &ChatSession) {
    let documents = session.pending_documents();
    if documents.is_empty() {
        println!("    Pending documents: (none)");
        return;
    }
    println!("    Pending documents:");
    for document in documents {
        println!(
            "      - {} ({} chars)",
            document.name,
            document.text.chars().count()
        );
    }
}

fn print_stats(session: &ChatSession) {
    let stats = session.stats();
    println!("    Session Statistics:");
    println!("      Model: {}", stats.model);
    println!("      Messages: {}", stats.message_count);
    println!("      Round trips: {}", stats.round_trips);
    println!("      Max tokens: {}", describe(stats.max_tokens));
    println!("      Temperature: {}", describe_float(stats.temperature));
    println!("      Top-p: {}", describe_float(stats.top_p));
    println!("      Top-k: {}", describe(stats.top_k));
    if let Some(prompt) = stats.system_prompt.as_deref() {
        println!("      System prompt: {}", prompt);
    } else {
        println!("      System prompt: (none)");
    }
    println!(
        "      Streaming: {} ({} ms pacing)",
        if stats.streaming { "on" } else { "off" },
        stats.pacing.as_millis()
    );
    println!(
        "      Documents: {} pending (context limit {} chars)",
        stats.pending_documents, stats.max_context_chars
    );
}

fn describe_float(value: Option<f32>) -> String {
    value
        .map(|v| format!("{v:.2}"))
        .unwrap_or_else(|| "default".to_string())
}

fn describe(value: Option<u32>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| "default".to_string())
}
