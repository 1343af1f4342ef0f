use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{QuoteStatus, UserId};

/// Administrative action recorded alongside a note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "status", rename_all = "snake_case")]
pub enum NoteAction {
    QuoteSubmitted,
    PolicySubmitted,
    StatusUpdated(QuoteStatus),
}

impl NoteAction {
    pub fn label(self) -> String {
        match self {
            NoteAction::QuoteSubmitted => "Quote Submitted".to_string(),
            NoteAction::PolicySubmitted => "Policy Submitted".to_string(),
            NoteAction::StatusUpdated(status) => format!("Status Updated to {}", status.title()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub text: Option<String>,
    pub action: NoteAction,
    pub actor: UserId,
    pub created_at: DateTime<Utc>,
}

impl Note {
    /// Blank or whitespace-only text is stored as no text.
    pub fn new(
        action: NoteAction,
        text: Option<String>,
        actor: UserId,
        created_at: DateTime<Utc>,
    ) -> Self {
        let text = text
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        Self {
            text,
            action,
            actor,
            created_at,
        }
    }
}

/// Append-only audit trail. Entries are never reordered, edited, or removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotesLedger(Vec<Note>);

impl NotesLedger {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_appended_note(mut self, note: Note) -> Self {
        self.0.push(note);
        self
    }

    pub fn entries(&self) -> &[Note] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&Note> {
        self.0.last()
    }
}
