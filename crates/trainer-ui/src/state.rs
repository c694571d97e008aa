//! UI-level state that drives rendering.
//! This is a read-only projection of the session controller,
//! updated each frame by draining the EventBus, plus the form buffers
//! the panels edit.

use std::collections::BTreeMap;

use chrono::{DateTime, Local};
use serde_json::Value;
use trainer_core::state_machine;
use trainer_types::{
    Result, SessionError,
    event::{MessageKind, SessionEvent, StatusMessage},
    session::{CreateSessionPayload, Participant, Session, SurveyAnswers},
    state::{ReportedState, SessionState},
};

/// State visible to UI panels
pub struct UiState {
    /// Last session published by the controller
    pub session: Option<Session>,
    /// Status line
    pub status: Option<StatusMessage>,
    /// A user operation is in flight
    pub loading: bool,
    /// When the synchronizer last delivered a snapshot (RFC 3339)
    pub last_check: Option<String>,
    /// Consecutive failed polls and the latest failure
    pub poll_failures: u32,
    pub poll_error: Option<String>,
    /// Whether settings panel is open
    pub show_settings: bool,
    pub create_form: CreateForm,
    pub survey_form: SurveyForm,
}

/// Which view the session panel should show
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionView {
    NoSession,
    Created,
    ReadyToStart,
    Running,
    AudioUploaded,
    SurveyPending,
    Completed,
    Unknown(String),
}

impl UiState {
    pub fn new() -> Self {
        Self {
            session: None,
            status: None,
            loading: false,
            last_check: None,
            poll_failures: 0,
            poll_error: None,
            show_settings: false,
            create_form: CreateForm::default(),
            survey_form: SurveyForm::default(),
        }
    }

    /// Process events from the EventBus and update UI state
    pub fn process_events(&mut self, events: Vec<SessionEvent>) {
        for event in events {
            match event {
                SessionEvent::SessionChanged { session } => {
                    let entered_survey = session
                        .as_ref()
                        .map_or(false, |s| s.state.is(SessionState::SurveyPending))
                        && !self.current_state().map_or(false, |s| s.is(SessionState::SurveyPending));
                    if session.is_none() || entered_survey {
                        self.survey_form.clear();
                    }
                    self.session = session;
                }
                SessionEvent::LastCheck { at } => {
                    self.last_check = Some(at);
                    self.poll_failures = 0;
                    self.poll_error = None;
                }
                SessionEvent::Message { message } => {
                    self.status = Some(message);
                }
                SessionEvent::Loading { active } => {
                    self.loading = active;
                }
                SessionEvent::PollFailure { failures, message } => {
                    self.poll_failures = failures;
                    self.poll_error = Some(message);
                }
                SessionEvent::Cleared => {
                    self.status = None;
                    self.last_check = None;
                    self.poll_failures = 0;
                    self.poll_error = None;
                }
            }
        }
    }

    pub fn current_state(&self) -> Option<&ReportedState> {
        self.session.as_ref().map(|s| &s.state)
    }

    pub fn view(&self) -> SessionView {
        let Some(state) = self.current_state() else {
            return SessionView::NoSession;
        };
        match state {
            ReportedState::Known(SessionState::Created) => SessionView::Created,
            ReportedState::Known(SessionState::ReadyToStart) => SessionView::ReadyToStart,
            ReportedState::Known(SessionState::Running) => SessionView::Running,
            ReportedState::Known(SessionState::AudioUploaded) => SessionView::AudioUploaded,
            ReportedState::Known(SessionState::SurveyPending) => SessionView::SurveyPending,
            ReportedState::Known(SessionState::Completed) => SessionView::Completed,
            ReportedState::Unknown(raw) => SessionView::Unknown(raw.clone()),
        }
    }

    /// The audio upload is awaited; the app keeps repainting meanwhile
    pub fn is_waiting_for_audio(&self) -> bool {
        self.current_state()
            .map_or(false, state_machine::is_awaiting_external_actor)
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    pub fn is_busy(&self) -> bool {
        self.loading
    }

    /// Last check as local wall-clock time
    pub fn last_check_label(&self) -> Option<String> {
        let at = self.last_check.as_deref()?;
        match DateTime::parse_from_rfc3339(at) {
            Ok(t) => Some(t.with_timezone(&Local).format("%H:%M:%S").to_string()),
            Err(_) => Some(at.to_string()),
        }
    }

    /// Show a locally produced error without going through the controller
    pub fn show_error(&mut self, error: &SessionError) {
        log::debug!("Form rejected: {}", error);
        self.status = Some(StatusMessage::error(error.user_message()));
    }

    /// The code is not offered for copying while the recording is underway
    pub fn can_copy_code(&self) -> bool {
        self.current_state()
            .map_or(false, |s| !s.is(SessionState::Running))
    }

    pub fn mark_code_copied(&mut self) {
        self.status = Some(StatusMessage::success("Session code copied to clipboard."));
    }

    pub fn status_is_error(&self) -> bool {
        self.status
            .as_ref()
            .map_or(false, |m| m.kind == MessageKind::Error)
    }
}

impl Default for UiState {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Creation form ───────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateForm {
    pub name: String,
    /// Free text; parsed on submit
    pub age: String,
    pub email: String,
    pub text_id: String,
}

impl CreateForm {
    pub fn to_payload(&self) -> Result<CreateSessionPayload> {
        let age = match self.age.trim() {
            "" => None,
            raw => Some(raw.parse::<u8>().map_err(|_| {
                SessionError::Validation(format!("age must be a whole number between 1 and 120, got '{}'", raw))
            })?),
        };
        let email = Some(self.email.trim().to_string()).filter(|e| !e.is_empty());

        let participant = Participant {
            name: self.name.trim().to_string(),
            age,
            email,
        };
        let payload = CreateSessionPayload::new(participant, self.text_id.trim());
        payload.validate()?;
        Ok(payload)
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

// ─── Survey form ─────────────────────────────────────────────

pub struct SurveyQuestion {
    pub key: &'static str,
    pub label: &'static str,
    /// `(wire value, label)`
    pub options: &'static [(&'static str, &'static str)],
}

pub const SURVEY_QUESTIONS: [SurveyQuestion; 4] = [
    SurveyQuestion {
        key: "experiencia_general",
        label: "Overall experience",
        options: &[
            ("excelente", "Excellent"),
            ("buena", "Good"),
            ("regular", "Regular"),
            ("mala", "Bad"),
        ],
    },
    SurveyQuestion {
        key: "facilidad_uso",
        label: "Ease of use",
        options: &[
            ("muy_facil", "Very easy"),
            ("facil", "Easy"),
            ("dificil", "Difficult"),
            ("muy_dificil", "Very difficult"),
        ],
    },
    SurveyQuestion {
        key: "utilidad_entrenamiento",
        label: "Training usefulness",
        options: &[
            ("muy_util", "Very useful"),
            ("util", "Useful"),
            ("poco_util", "Somewhat useful"),
            ("no_util", "Not useful"),
        ],
    },
    SurveyQuestion {
        key: "volveria_usar",
        label: "Would you use it again?",
        options: &[("si", "Yes"), ("no", "No"), ("tal_vez", "Maybe")],
    },
];

pub const SUGGESTIONS_KEY: &str = "mejoras_sugeridas";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SurveyForm {
    /// Chosen wire value per question key
    pub choices: BTreeMap<&'static str, String>,
    pub suggestions: String,
}

impl SurveyForm {
    /// Every choice question has an answer
    pub fn is_complete(&self) -> bool {
        SURVEY_QUESTIONS
            .iter()
            .all(|q| self.choices.get(q.key).map_or(false, |v| !v.is_empty()))
    }

    pub fn to_answers(&self) -> Result<SurveyAnswers> {
        if let Some(missing) = SURVEY_QUESTIONS
            .iter()
            .find(|q| self.choices.get(q.key).map_or(true, |v| v.is_empty()))
        {
            return Err(SessionError::Validation(format!("please answer \"{}\"", missing.label)));
        }

        let mut answers = SurveyAnswers::new();
        for q in &SURVEY_QUESTIONS {
            let value = self.choices.get(q.key).cloned().unwrap_or_default();
            answers.insert(q.key.to_string(), Value::String(value));
        }
        answers.insert(
            SUGGESTIONS_KEY.to_string(),
            Value::String(self.suggestions.trim().to_string()),
        );
        Ok(answers)
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
