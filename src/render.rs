//! Output rendering for streamed responses.
//!
//! A [`RenderSink`] receives growing snapshots of a response while it streams
//! and the finished text once it is done.  Snapshots may end in a transient
//! progress marker; the final text never does.

use std::io::{self, Stdout, Write};

use crate::conversation::Turn;
use crate::types::Role;

/// ANSI escape code for dim text (used for info lines).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code for bold text (used for speaker labels).
const ANSI_BOLD: &str = "\x1b[1m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for cyan text (used for the model label).
const ANSI_CYAN: &str = "\x1b[36m";

/// ANSI escape code for green text (used for the user label).
const ANSI_GREEN: &str = "\x1b[32m";

/// ANSI escape code for red text (used for errors).
const ANSI_RED: &str = "\x1b[31m";

/// ANSI escape code to clear from the cursor to the end of the line.
const ANSI_CLEAR_EOL: &str = "\x1b[K";

/// Receives response snapshots for display.
///
/// `render_partial` may be called once per character of the response, so
/// implementations should be cheap.  `render_final` is called exactly once per
/// response and replaces whatever the last partial showed.
pub trait RenderSink: Send {
    /// Show a partial response, possibly ending in a progress marker.
    fn render_partial(&mut self, snapshot: &str);

    /// Show the finished response.
    fn render_final(&mut self, text: &str);
}

/// A [`RenderSink`] built from two closures.
pub struct CallbackSink<P, F> {
    partial: P,
    finish: F,
}

impl<P, F> CallbackSink<P, F>
where
    P: FnMut(&str) + Send,
    F: FnMut(&str) + Send,
{
    /// Create a sink that forwards to `partial` and `finish`.
    pub fn new(partial: P, finish: F) -> Self {
        Self { partial, finish }
    }
}

impl<P, F> RenderSink for CallbackSink<P, F>
where
    P: FnMut(&str) + Send,
    F: FnMut(&str) + Send,
{
    fn render_partial(&mut self, snapshot: &str) {
        (self.partial)(snapshot);
    }

    fn render_final(&mut self, text: &str) {
        (self.finish)(text);
    }
}

/// Records every snapshot.  Useful for headless callers and tests.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    /// Partial snapshots in call order.
    pub partials: Vec<String>,
    /// Final texts in call order.
    pub finals: Vec<String>,
}

impl RenderSink for RecordingSink {
    fn render_partial(&mut self, snapshot: &str) {
        self.partials.push(snapshot.to_string());
    }

    fn render_final(&mut self, text: &str) {
        self.finals.push(text.to_string());
    }
}

/// Plain text renderer with optional ANSI styling.
///
/// Redraws in place: each snapshot erases only the part of the previous one it
/// does not share (normally just the progress marker) and prints the new tail.
pub struct PlainTextRenderer<W: Write + Send = Stdout> {
    out: W,
    use_color: bool,
    shown: String,
}

impl PlainTextRenderer {
    /// Creates a new PlainTextRenderer on stdout with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new PlainTextRenderer on stdout with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self::with_writer(io::stdout(), use_color)
    }
}

impl Default for PlainTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write + Send> PlainTextRenderer<W> {
    /// Creates a renderer on an arbitrary writer.
    pub fn with_writer(out: W, use_color: bool) -> Self {
        Self {
            out,
            use_color,
            shown: String::new(),
        }
    }

    /// Consumes the renderer and returns its writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    /// Print the speaker label that precedes a turn.
    pub fn print_label(&mut self, role: Role) {
        let (label, color) = match role {
            Role::User => ("You", ANSI_GREEN),
            Role::Model => ("Gemini", ANSI_CYAN),
        };
        if self.use_color {
            self.emit(&format!("{ANSI_BOLD}{color}{label}:{ANSI_RESET}\n"));
        } else {
            self.emit(&format!("{label}:\n"));
        }
    }

    /// Print a past turn the way a human should see it.
    pub fn print_turn(&mut self, turn: &Turn) {
        self.print_label(turn.role());
        self.emit(&format!("{}\n", turn.display_text()));
    }

    /// Print an informational message.
    pub fn print_info(&mut self, info: &str) {
        if self.use_color {
            self.emit(&format!("{ANSI_DIM}{info}{ANSI_RESET}\n"));
        } else {
            self.emit(&format!("{info}\n"));
        }
    }

    /// Print an error message.
    pub fn print_error(&mut self, error: &str) {
        if self.use_color {
            self.emit(&format!("{ANSI_RED}Error: {error}{ANSI_RESET}\n"));
        } else {
            self.emit(&format!("Error: {error}\n"));
        }
    }

    fn emit(&mut self, text: &str) {
        // Terminal write failures have nowhere better to go.
        let _ = self.out.write_all(text.as_bytes());
        let _ = self.out.flush();
    }

    /// Redraw from the previously shown snapshot to `next`.
    fn redraw(&mut self, next: &str) {
        let common = common_prefix(&self.shown, next);
        if let Some(newline) = self.shown[common..].rfind('\n') {
            // Backspace cannot cross a line break.  Clear the current line
            // and write `next` in full from there.
            let current = self.shown[common + newline + 1..].chars().count();
            let mut patch = String::with_capacity(current + ANSI_CLEAR_EOL.len() + next.len());
            patch.extend(std::iter::repeat_n('\x08', current));
            patch.push_str(ANSI_CLEAR_EOL);
            patch.push_str(next);
            self.emit(&patch);
            self.shown = next.to_string();
            return;
        }
        let stale = self.shown[common..].chars().count();
        let mut patch = String::with_capacity(stale + ANSI_CLEAR_EOL.len() + next.len() - common);
        if stale > 0 {
            patch.extend(std::iter::repeat_n('\x08', stale));
            patch.push_str(ANSI_CLEAR_EOL);
        }
        patch.push_str(&next[common..]);
        self.emit(&patch);
        self.shown.truncate(common);
        self.shown.push_str(&next[common..]);
    }
}

impl<W: Write + Send> RenderSink for PlainTextRenderer<W> {
    fn render_partial(&mut self, snapshot: &str) {
        self.redraw(snapshot);
    }

    fn render_final(&mut self, text: &str) {
        self.redraw(text);
        self.emit("\n");
        self.shown.clear();
    }
}

/// Length in bytes of the longest common prefix that ends on a char boundary.
fn common_prefix(a: &str, b: &str) -> usize {
    let mut n = a
        .bytes()
        .zip(b.bytes())
        .take_while(|(x, y)| x == y)
        .count();
    while !a.is_char_boundary(n) {
        n -= 1;
    }
    n
}
