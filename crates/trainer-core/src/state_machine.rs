//! Session state machine.
//!
//! The lifecycle is a single chain:
//! `Created → ReadyToStart → Running → AudioUploaded → SurveyPending → Completed`.
//! Each non-terminal state has exactly one successor and one actor expected
//! to cause that edge. Nothing here mutates; the controller commits.

use trainer_types::{
    Result, SessionError,
    state::{ReportedState, SessionState},
};

/// Who is expected to drive the next transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    /// The operator of this client
    LocalUser,
    /// A system outside the client, observed only through polling
    External,
}

/// The single defined successor of `state`
pub fn successor(state: SessionState) -> Option<SessionState> {
    match state {
        SessionState::Created => Some(SessionState::ReadyToStart),
        SessionState::ReadyToStart => Some(SessionState::Running),
        SessionState::Running => Some(SessionState::AudioUploaded),
        SessionState::AudioUploaded => Some(SessionState::SurveyPending),
        SessionState::SurveyPending => Some(SessionState::Completed),
        SessionState::Completed => None,
    }
}

/// Actor responsible for leaving `state`; `None` for the terminal state
pub fn can_advance(state: SessionState) -> Option<Actor> {
    match state {
        SessionState::Running => Some(Actor::External),
        SessionState::Completed => None,
        SessionState::Created
        | SessionState::ReadyToStart
        | SessionState::AudioUploaded
        | SessionState::SurveyPending => Some(Actor::LocalUser),
    }
}

/// True only for the state that arms the polling synchronizer
pub fn is_awaiting_external_actor(state: &ReportedState) -> bool {
    state.is(SessionState::Running)
}

/// Validate a user-driven edge without performing it.
pub fn apply_user_transition(current: &ReportedState, requested: SessionState) -> Result<()> {
    let current = match current {
        ReportedState::Known(s) => *s,
        ReportedState::Unknown(raw) => return Err(SessionError::UnknownState(raw.clone())),
    };

    if successor(current) != Some(requested) {
        return Err(SessionError::IllegalTransition(format!(
            "{} is not the successor of {}",
            requested, current
        )));
    }

    match can_advance(current) {
        Some(Actor::LocalUser) => Ok(()),
        _ => Err(SessionError::IllegalTransition(format!(
            "{} -> {} is not driven by the local user",
            current, requested
        ))),
    }
}
