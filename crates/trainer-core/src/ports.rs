//! Port traits: the hexagonal architecture boundary.
//!
//! These traits are defined here in `trainer-core` (pure Rust).
//! Implementations live in `trainer-platform` (browser adapters).
//! The core never imports platform code; it only depends on these traits.

use async_trait::async_trait;
use futures::future::LocalBoxFuture;
use trainer_types::{
    Result,
    session::{CreateSessionPayload, Session, SessionId, SurveyAnswers},
    state::SessionState,
};

// ─── Session Gateway Port ────────────────────────────────────

/// Remote session resource. Every returned `Session` is authoritative.
#[async_trait(?Send)]
pub trait SessionGateway {
    /// Fails with `Validation` on a malformed payload, `Network` on transport failure
    async fn create_session(&self, payload: &CreateSessionPayload) -> Result<Session>;

    /// Fails with `NotFound` for an unknown id
    async fn get_session(&self, id: &SessionId) -> Result<Session>;

    /// Fails with `IllegalTransition` when the backend rejects the edge.
    /// Returns the backend's post-transition session.
    async fn set_session_state(&self, id: &SessionId, target: SessionState) -> Result<Session>;

    async fn submit_survey(&self, id: &SessionId, answers: &SurveyAnswers) -> Result<()>;
}

// ─── Timer Port ──────────────────────────────────────────────

#[async_trait(?Send)]
pub trait TimerPort {
    /// Resolve after `ms` milliseconds
    async fn sleep(&self, ms: u64);
}

// ─── Task Spawner Port ───────────────────────────────────────

/// Runs a detached task on the current (single) thread.
pub trait TaskSpawner {
    fn spawn_local(&self, task: LocalBoxFuture<'static, ()>);
}
