use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Local precondition on the current state was violated; never sent to the network
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// An edge was rejected, locally by the state machine or remotely by the backend
    #[error("Illegal transition: {0}")]
    IllegalTransition(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unknown session state: {0}")]
    UnknownState(String),

    #[error("Synchronizer already started")]
    AlreadyStarted,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SessionError {
    /// Message suitable for showing to the operator
    pub fn user_message(&self) -> String {
        match self {
            SessionError::InvalidState(m) => format!("Action not available: {}", m),
            SessionError::IllegalTransition(m) => {
                format!("The server rejected this step ({}). Refresh and try again.", m)
            }
            SessionError::NotFound(m) => format!("Session not found: {}", m),
            SessionError::Validation(m) => m.clone(),
            SessionError::Network(m) => format!("Could not reach the server: {}", m),
            SessionError::UnknownState(raw) => format!("The session is in an unrecognized state: {}", raw),
            other => other.to_string(),
        }
    }

    pub fn is_network(&self) -> bool {
        matches!(self, SessionError::Network(_))
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(e: serde_json::Error) -> Self {
        SessionError::Serialization(e.to_string())
    }
}
