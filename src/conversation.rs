//! Append-only conversation store.
//!
//! One session owns one `Conversation`. Turns are appended, never edited
//! or removed; their order is the conversation timeline.

use serde::{Deserialize, Serialize};

use crate::error::{Result, WorkflowError};

/// Sender of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// Parse a role from its storage form.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

/// One message in the conversation. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

/// Ordered, append-only sequence of turns.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a conversation from previously stored turns.
    pub fn from_turns(turns: Vec<Turn>) -> Self {
        Self { turns }
    }

    /// Append a turn to the end of the timeline.
    ///
    /// The only validation is that the text is non-empty.
    pub fn append(&mut self, turn: Turn) -> Result<()> {
        if turn.text.trim().is_empty() {
            return Err(WorkflowError::EmptyTurn);
        }
        self.turns.push(turn);
        Ok(())
    }

    /// The most recent turn, optionally filtered by role.
    #[allow(dead_code)]
    pub fn latest(&self, role: Option<Role>) -> Result<&Turn> {
        self.turns
            .iter()
            .rev()
            .find(|t| role.is_none_or(|r| t.role == r))
            .ok_or(WorkflowError::EmptyHistory)
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
