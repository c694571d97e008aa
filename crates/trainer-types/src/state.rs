use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle stage of a training session.
///
/// The wire representation is the backend's snake_case name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Created,
    ReadyToStart,
    Running,
    AudioUploaded,
    SurveyPending,
    Completed,
}

impl SessionState {
    pub fn all() -> &'static [SessionState] {
        &[
            SessionState::Created,
            SessionState::ReadyToStart,
            SessionState::Running,
            SessionState::AudioUploaded,
            SessionState::SurveyPending,
            SessionState::Completed,
        ]
    }

    /// Name used on the wire
    pub fn as_wire(&self) -> &'static str {
        match self {
            SessionState::Created => "created",
            SessionState::ReadyToStart => "ready_to_start",
            SessionState::Running => "running",
            SessionState::AudioUploaded => "audio_uploaded",
            SessionState::SurveyPending => "survey_pending",
            SessionState::Completed => "completed",
        }
    }

    pub fn from_wire(raw: &str) -> Option<SessionState> {
        Self::all().iter().copied().find(|s| s.as_wire() == raw)
    }

    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Created => "Created",
            SessionState::ReadyToStart => "Ready to start",
            SessionState::Running => "Running",
            SessionState::AudioUploaded => "Audio uploaded",
            SessionState::SurveyPending => "Survey pending",
            SessionState::Completed => "Completed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// State value as reported by the backend.
///
/// A value outside the closed enumeration is kept verbatim in `Unknown`
/// so it can be displayed instead of being rejected or coerced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReportedState {
    Known(SessionState),
    Unknown(String),
}

impl ReportedState {
    pub fn known(&self) -> Option<SessionState> {
        match self {
            ReportedState::Known(s) => Some(*s),
            ReportedState::Unknown(_) => None,
        }
    }

    pub fn is(&self, state: SessionState) -> bool {
        self.known() == Some(state)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, ReportedState::Unknown(_))
    }

    pub fn label(&self) -> String {
        match self {
            ReportedState::Known(s) => s.label().to_string(),
            ReportedState::Unknown(raw) => format!("Unrecognized ({})", raw),
        }
    }
}

impl From<SessionState> for ReportedState {
    fn from(state: SessionState) -> Self {
        ReportedState::Known(state)
    }
}

impl From<&str> for ReportedState {
    fn from(raw: &str) -> Self {
        match SessionState::from_wire(raw) {
            Some(s) => ReportedState::Known(s),
            None => ReportedState::Unknown(raw.to_string()),
        }
    }
}

impl fmt::Display for ReportedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportedState::Known(s) => write!(f, "{}", s),
            ReportedState::Unknown(raw) => f.write_str(raw),
        }
    }
}
