use serde::{Deserialize, Serialize};

use crate::session::Session;

/// Events emitted by the session controller.
/// UI subscribes to these for reactive updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SessionEvent {
    /// The authoritative session was replaced (None after reset)
    SessionChanged { session: Option<Session> },

    /// The synchronizer delivered a snapshot at this time (RFC 3339)
    LastCheck { at: String },

    /// A user-visible status line
    Message { message: StatusMessage },

    /// A user operation started or finished
    Loading { active: bool },

    /// A background fetch failed; polling continues
    PollFailure { failures: u32, message: String },

    /// Transient status was cleared
    Cleared,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    pub kind: MessageKind,
    pub text: String,
}

impl StatusMessage {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Info,
            text: text.into(),
        }
    }

    pub fn success(text: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Success,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Error,
            text: text.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind == MessageKind::Error
    }
}
