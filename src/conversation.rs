//! The conversation log.
//!
//! [`ConversationStore`] is an append-only list of [`Turn`]s.  It is what the
//! user sees and, in full, what the model receives on every request.

use crate::documents::display_query;
use crate::types::{Content, Role};

/// One message in the conversation.
///
/// Turns are immutable.  A user turn's content may carry document context
/// ahead of the query; [`Turn::display_text`] hides it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    role: Role,
    content: String,
    query_start: Option<usize>,
}

impl Turn {
    /// Create a turn.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            query_start: None,
        }
    }

    /// Create a user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create a user turn whose query begins at byte `query_start`, after
    /// prepended document context.
    pub fn user_with_context(content: impl Into<String>, query_start: usize) -> Self {
        Self {
            query_start: Some(query_start),
            ..Self::user(content)
        }
    }

    /// Create a model turn.
    pub fn model(content: impl Into<String>) -> Self {
        Self::new(Role::Model, content)
    }

    /// Who produced this turn.
    pub fn role(&self) -> Role {
        self.role
    }

    /// The full content, as sent to the model.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// The content a human should see.
    pub fn display_text(&self) -> &str {
        match (self.role, self.query_start) {
            (Role::Model, _) => &self.content,
            (Role::User, Some(start)) => self
                .content
                .get(start..)
                .unwrap_or_else(|| display_query(&self.content)),
            (Role::User, None) => display_query(&self.content),
        }
    }

    /// The turn as wire content.
    pub fn to_content(&self) -> Content {
        Content::new(self.role, self.content.clone())
    }
}

/// The outgoing request derived from a conversation.
///
/// The remote protocol distinguishes earlier turns (context) from the turn
/// being sent now.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    /// Every turn before the newest, oldest first.
    pub history: Vec<Content>,
    /// The newest turn.
    pub message: Content,
}

impl ModelRequest {
    /// History followed by the message, the order the wire expects.
    pub fn into_contents(self) -> Vec<Content> {
        let mut contents = self.history;
        contents.push(self.message);
        contents
    }
}

/// Ordered, append-only log of turns.
#[derive(Debug, Clone, Default)]
pub struct ConversationStore {
    turns: Vec<Turn>,
}

impl ConversationStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn and return it.  Alternation is not checked.
    pub fn append(&mut self, turn: Turn) -> &Turn {
        self.turns.push(turn);
        &self.turns[self.turns.len() - 1]
    }

    /// All turns, oldest first.
    pub fn snapshot(&self) -> &[Turn] {
        &self.turns
    }

    /// The newest turn.
    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Number of turns.
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// True when no turn has been appended.
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Drop every turn.
    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Split the log into history and the outgoing message.
    ///
    /// Returns `None` for an empty store.
    pub fn to_model_request(&self) -> Option<ModelRequest> {
        let (newest, earlier) = self.turns.split_last()?;
        Some(ModelRequest {
            history: earlier.iter().map(Turn::to_content).collect(),
            message: newest.to_content(),
        })
    }
}
