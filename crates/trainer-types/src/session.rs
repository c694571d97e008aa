use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::SessionError;
use crate::state::ReportedState;
use crate::Result;

/// Backend-assigned session identifier.
///
/// The backend may send a number or a string; either way it is kept as an
/// opaque string and never interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for SessionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Number(u64),
            Text(String),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Number(n) => SessionId(n.to_string()),
            RawId::Text(s) => SessionId(s),
        })
    }
}

/// Participant details captured when the session is created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "edad_aproximada", default)]
    pub age: Option<u8>,
    #[serde(rename = "email_opcional", default)]
    pub email: Option<String>,
}

impl Participant {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            age: None,
            email: None,
        }
    }
}

/// Reference to the training text chosen for a session.
///
/// Older backends send only the text itself as a bare string; that string
/// then doubles as id and title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextRef {
    pub id: String,
    pub title: String,
}

impl<'de> Deserialize<'de> for TextRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawText {
            Bare(String),
            Object {
                #[serde(alias = "Id")]
                id: String,
                #[serde(alias = "Title", default)]
                title: Option<String>,
            },
        }

        Ok(match RawText::deserialize(deserializer)? {
            RawText::Bare(text) => TextRef {
                id: text.clone(),
                title: text,
            },
            RawText::Object { id, title } => TextRef {
                title: title.unwrap_or_else(|| id.clone()),
                id,
            },
        })
    }
}

/// A training session as confirmed by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    #[serde(rename = "session_code")]
    pub code: String,
    #[serde(rename = "estado")]
    pub state: ReportedState,
    #[serde(rename = "datos_participante")]
    pub participant: Participant,
    #[serde(rename = "texto_seleccionado")]
    pub selected_text: TextRef,
    #[serde(default)]
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub recordings_count: u32,
    #[serde(default)]
    pub surveys_count: u32,
}

impl Session {
    /// Copy of this session with a different state; everything else is kept
    pub fn with_state(&self, state: impl Into<ReportedState>) -> Self {
        Self {
            state: state.into(),
            ..self.clone()
        }
    }
}

/// Body of the create-session call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSessionPayload {
    #[serde(rename = "datos_participante")]
    pub participant: Participant,
    /// Id of the chosen training text
    #[serde(rename = "texto_seleccionado")]
    pub text_id: String,
}

impl CreateSessionPayload {
    pub fn new(participant: Participant, text_id: impl Into<String>) -> Self {
        Self {
            participant,
            text_id: text_id.into(),
        }
    }

    /// Same bounds the backend enforces, checked before anything is sent
    pub fn validate(&self) -> Result<()> {
        let name = self.participant.name.trim();
        if name.is_empty() {
            return Err(SessionError::Validation("participant name is required".to_string()));
        }
        if name.chars().count() > 100 {
            return Err(SessionError::Validation(
                "participant name must be at most 100 characters".to_string(),
            ));
        }
        if let Some(age) = self.participant.age {
            if !(1..=120).contains(&age) {
                return Err(SessionError::Validation(format!(
                    "age must be between 1 and 120, got {}",
                    age
                )));
            }
        }
        if self.text_id.trim().is_empty() {
            return Err(SessionError::Validation("a training text must be selected".to_string()));
        }
        Ok(())
    }
}

/// Survey answers keyed by question id. Content is opaque to the client.
pub type SurveyAnswers = serde_json::Map<String, serde_json::Value>;
