//! Session lifecycle controller, the single owner of the current session.
//!
//! Every change to the authoritative session goes through one commit point
//! (`ControllerCore::apply_snapshot`), whether it comes from a user operation
//! or from the polling synchronizer. After every commit, and after every
//! failure, the synchronizer is reconciled so that it is armed if and only if
//! the current session is `Running`.
//!
//! Results are fenced by an epoch that `create` and `reset` bump, plus the
//! session id; a gateway reply for a session the controller no longer holds
//! is dropped rather than committed.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use chrono::{DateTime, Utc};
use trainer_types::{
    Result, SessionError,
    config::PollingConfig,
    event::{SessionEvent, StatusMessage},
    session::{CreateSessionPayload, Session, SurveyAnswers},
    state::{ReportedState, SessionState},
};

use crate::event_bus::EventBus;
use crate::ports::{SessionGateway, TaskSpawner, TimerPort};
use crate::state_machine;
use crate::synchronizer::{BackoffPolicy, PollingSynchronizer};

const OP_CREATE: &str = "Creating session";
const OP_START: &str = "Starting session";
const OP_CONTINUE: &str = "Continuing to survey";
const OP_SURVEY: &str = "Submitting survey";

/// Presentation-facing controller. Dropping it stops the synchronizer.
pub struct SessionController {
    core: Rc<ControllerCore>,
}

#[derive(Default)]
struct ViewState {
    session: Option<Session>,
    last_check: Option<DateTime<Utc>>,
    message: Option<StatusMessage>,
    loading: bool,
    poll_failures: u32,
    epoch: u64,
}

struct ControllerCore {
    gateway: Rc<dyn SessionGateway>,
    synchronizer: PollingSynchronizer,
    bus: EventBus,
    alive: Cell<bool>,
    view: RefCell<ViewState>,
}

impl SessionController {
    pub fn new(
        gateway: Rc<dyn SessionGateway>,
        timer: Rc<dyn TimerPort>,
        spawner: Rc<dyn TaskSpawner>,
        polling: &PollingConfig,
        bus: EventBus,
    ) -> Self {
        let synchronizer = PollingSynchronizer::new(
            gateway.clone(),
            timer,
            spawner,
            BackoffPolicy::from_config(polling),
        );
        Self {
            core: Rc::new(ControllerCore {
                gateway,
                synchronizer,
                bus,
                alive: Cell::new(true),
                view: RefCell::new(ViewState::default()),
            }),
        }
    }

    // ─── Observables ─────────────────────────────────────────

    pub fn session(&self) -> Option<Session> {
        self.core.view.borrow().session.clone()
    }

    pub fn state(&self) -> Option<ReportedState> {
        self.core.view.borrow().session.as_ref().map(|s| s.state.clone())
    }

    /// When the synchronizer last delivered a snapshot
    pub fn last_check(&self) -> Option<DateTime<Utc>> {
        self.core.view.borrow().last_check
    }

    pub fn message(&self) -> Option<StatusMessage> {
        self.core.view.borrow().message.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.core.view.borrow().loading
    }

    pub fn poll_failures(&self) -> u32 {
        self.core.view.borrow().poll_failures
    }

    pub fn is_synchronizer_armed(&self) -> bool {
        self.core.synchronizer.is_active()
    }

    pub fn next_poll_delay_ms(&self) -> Option<u64> {
        self.core.synchronizer.next_delay_ms()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.core.bus
    }

    pub fn is_alive(&self) -> bool {
        self.core.alive.get()
    }

    // ─── Operations ──────────────────────────────────────────

    /// Create a session and make it the current one, replacing any other.
    pub async fn create(&self, payload: CreateSessionPayload) -> Result<Session> {
        let core = &self.core;
        if let Err(e) = payload.validate() {
            return Err(core.fail(OP_CREATE, e));
        }

        let epoch = core.begin();
        match core.gateway.create_session(&payload).await {
            Ok(session) => {
                if !core.is_current(epoch) {
                    log::debug!("Session {} created after reset; not adopting it", session.id);
                    core.end_loading();
                    return Ok(session);
                }
                core.replace(session.clone());
                core.set_message(StatusMessage::success(format!(
                    "Session created successfully! Session Code: {}",
                    session.code
                )));
                core.end_loading();
                log::info!("Session {} created ({})", session.id, session.code);
                Ok(session)
            }
            Err(e) => Err(core.fail(OP_CREATE, e)),
        }
    }

    /// Drive `Created → ReadyToStart → Running` as one operation.
    ///
    /// A session left in `ReadyToStart` by an earlier partial failure is
    /// resumed with the second edge only.
    pub async fn request_start(&self) -> Result<Session> {
        let core = &self.core;
        let current = core.require_session(OP_START)?;
        let from = match current.state.known() {
            Some(s @ (SessionState::Created | SessionState::ReadyToStart)) => s,
            _ => {
                return Err(core.fail(
                    OP_START,
                    SessionError::InvalidState(format!(
                        "a session in state {} cannot be started",
                        current.state
                    )),
                ))
            }
        };

        let id = current.id.clone();
        let epoch = core.begin();

        if from == SessionState::Created {
            if let Err(e) = state_machine::apply_user_transition(&current.state, SessionState::ReadyToStart) {
                return Err(core.fail(OP_START, e));
            }
            match core.gateway.set_session_state(&id, SessionState::ReadyToStart).await {
                Ok(ready) => {
                    let already_running = ready.state.is(SessionState::Running);
                    if !core.commit(epoch, ready.clone()) {
                        return Err(core.fail(
                            OP_START,
                            SessionError::InvalidState(
                                "the session was replaced while it was being started".to_string(),
                            ),
                        ));
                    }
                    if already_running {
                        return Ok(core.finish_start(ready));
                    }
                }
                Err(e) => return Err(core.fail(OP_START, e)),
            }
        }

        match core.gateway.set_session_state(&id, SessionState::Running).await {
            Ok(running) => {
                if core.commit(epoch, running.clone()) {
                    Ok(core.finish_start(running))
                } else {
                    core.end_loading();
                    Ok(running)
                }
            }
            Err(e) => {
                if from == SessionState::Created {
                    // The first edge was confirmed; ask the backend where it landed.
                    match core.gateway.get_session(&id).await {
                        Ok(actual) => {
                            log::info!("Session {} is {} after a partial start", id, actual.state);
                            core.commit(epoch, actual);
                        }
                        Err(read_err) => {
                            log::warn!("Could not re-read session {} after a partial start: {}", id, read_err);
                        }
                    }
                }
                Err(core.fail(OP_START, e))
            }
        }
    }

    /// `AudioUploaded → SurveyPending`
    pub async fn request_continue_to_survey(&self) -> Result<Session> {
        let core = &self.core;
        let current = core.require_session(OP_CONTINUE)?;
        if !current.state.is(SessionState::AudioUploaded) {
            return Err(core.fail(
                OP_CONTINUE,
                SessionError::InvalidState(format!(
                    "the survey is only available after the audio upload (state is {})",
                    current.state
                )),
            ));
        }
        if let Err(e) = state_machine::apply_user_transition(&current.state, SessionState::SurveyPending) {
            return Err(core.fail(OP_CONTINUE, e));
        }

        let epoch = core.begin();
        match core.gateway.set_session_state(&current.id, SessionState::SurveyPending).await {
            Ok(session) => {
                if core.commit(epoch, session.clone()) {
                    core.set_message(StatusMessage::info("Please fill out the survey."));
                }
                core.end_loading();
                Ok(session)
            }
            Err(e) => Err(core.fail(OP_CONTINUE, e)),
        }
    }

    /// Send the survey answers, then complete the session locally.
    pub async fn submit_survey(&self, answers: SurveyAnswers) -> Result<Session> {
        let core = &self.core;
        let current = core.require_session(OP_SURVEY)?;
        if !current.state.is(SessionState::SurveyPending) {
            return Err(core.fail(
                OP_SURVEY,
                SessionError::InvalidState(format!("no survey is pending (state is {})", current.state)),
            ));
        }

        let epoch = core.begin();
        match core.gateway.submit_survey(&current.id, &answers).await {
            Ok(()) => {
                if !core.is_current(epoch) {
                    core.end_loading();
                    return Err(SessionError::InvalidState(
                        "the session was reset while the survey was being sent".to_string(),
                    ));
                }
                self.on_survey_submitted()
            }
            Err(e) => Err(core.fail(OP_SURVEY, e)),
        }
    }

    /// Mark the session `Completed` without another gateway call; the survey
    /// submission already completed it on the backend.
    pub fn on_survey_submitted(&self) -> Result<Session> {
        let core = &self.core;
        let current = core.require_session(OP_SURVEY)?;
        if !current.state.is(SessionState::SurveyPending) {
            return Err(core.fail(
                OP_SURVEY,
                SessionError::InvalidState(format!("no survey is pending (state is {})", current.state)),
            ));
        }
        if let Err(e) = state_machine::apply_user_transition(&current.state, SessionState::Completed) {
            return Err(core.fail(OP_SURVEY, e));
        }

        let completed = current.with_state(SessionState::Completed);
        core.apply_snapshot(completed.clone());
        core.set_message(StatusMessage::success("Session completed successfully"));
        core.end_loading();
        Ok(completed)
    }

    /// Entry point for snapshots observed by the synchronizer
    pub fn on_synchronizer_update(&self, snapshot: Session) {
        self.core.on_synchronizer_update(snapshot);
    }

    /// Forget the current session and all transient status.
    pub fn reset(&self) {
        self.core.reset();
    }

    /// Tear down: no callback may reach this controller afterwards.
    pub fn dispose(&self) {
        if self.core.alive.replace(false) {
            log::debug!("Session controller disposed");
        }
        self.core.synchronizer.stop();
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl ControllerCore {
    fn emit(&self, event: SessionEvent) {
        self.bus.emit(event);
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.alive.get() && self.view.borrow().epoch == epoch
    }

    fn begin(&self) -> u64 {
        let epoch = {
            let mut view = self.view.borrow_mut();
            view.loading = true;
            view.epoch
        };
        self.emit(SessionEvent::Loading { active: true });
        epoch
    }

    fn end_loading(&self) {
        let was_loading = std::mem::replace(&mut self.view.borrow_mut().loading, false);
        if was_loading {
            self.emit(SessionEvent::Loading { active: false });
        }
    }

    fn set_message(&self, message: StatusMessage) {
        self.view.borrow_mut().message = Some(message.clone());
        self.emit(SessionEvent::Message { message });
    }

    fn require_session(self: &Rc<Self>, op: &str) -> Result<Session> {
        let current = self.view.borrow().session.clone();
        current.ok_or_else(|| self.fail(op, SessionError::InvalidState("there is no active session".to_string())))
    }

    /// Surface a failure: clear loading, publish one message, keep the
    /// synchronizer consistent. The session itself is left as it was.
    fn fail(self: &Rc<Self>, op: &str, error: SessionError) -> SessionError {
        match &error {
            SessionError::InvalidState(_) => log::error!("{} rejected locally: {}", op, error),
            _ => log::warn!("{} failed: {}", op, error),
        }
        self.end_loading();
        self.set_message(StatusMessage::error(format!("{} failed: {}", op, error.user_message())));
        self.reconcile();
        error
    }

    fn finish_start(&self, session: Session) -> Session {
        if session.state.is(SessionState::Running) {
            self.set_message(StatusMessage::info(
                "Session started! Waiting for the audio upload...",
            ));
        }
        self.end_loading();
        session
    }

    /// Commit a user-operation result, unless it belongs to a session the
    /// controller has since let go of.
    fn commit(self: &Rc<Self>, epoch: u64, snapshot: Session) -> bool {
        if !self.is_current(epoch) {
            log::debug!("Discarding stale result for session {}", snapshot.id);
            return false;
        }
        let same_session = self
            .view
            .borrow()
            .session
            .as_ref()
            .map_or(false, |s| s.id == snapshot.id);
        if !same_session {
            log::debug!("Discarding result for session {}; it is no longer current", snapshot.id);
            return false;
        }
        self.apply_snapshot(snapshot);
        true
    }

    /// Wholesale replacement for a newly created session.
    fn replace(self: &Rc<Self>, session: Session) {
        {
            let mut view = self.view.borrow_mut();
            view.epoch += 1;
            view.session = None;
            view.message = None;
            view.last_check = None;
            view.poll_failures = 0;
        }
        self.emit(SessionEvent::Cleared);
        self.apply_snapshot(session);
    }

    /// The single commit point for the authoritative session.
    fn apply_snapshot(self: &Rc<Self>, snapshot: Session) {
        if !self.alive.get() {
            return;
        }
        if let ReportedState::Unknown(raw) = &snapshot.state {
            log::warn!("Session {} reported unrecognized state '{}'", snapshot.id, raw);
            self.set_message(StatusMessage::error(
                SessionError::UnknownState(raw.clone()).user_message(),
            ));
        }

        let changed = {
            let mut view = self.view.borrow_mut();
            let changed = view.session.as_ref() != Some(&snapshot);
            view.session = Some(snapshot.clone());
            changed
        };
        if changed {
            self.emit(SessionEvent::SessionChanged {
                session: Some(snapshot),
            });
        }
        self.reconcile();
    }

    fn on_synchronizer_update(self: &Rc<Self>, snapshot: Session) {
        if !self.alive.get() {
            return;
        }
        let previous = self
            .view
            .borrow()
            .session
            .as_ref()
            .filter(|current| current.id == snapshot.id)
            .map(|current| current.state.clone());
        let Some(previous) = previous else {
            log::debug!("Ignoring snapshot for session {}; it is not current", snapshot.id);
            self.reconcile();
            return;
        };

        let now = Utc::now();
        {
            let mut view = self.view.borrow_mut();
            view.last_check = Some(now);
            view.poll_failures = 0;
        }
        self.emit(SessionEvent::LastCheck { at: now.to_rfc3339() });

        if previous.is(SessionState::Running) && snapshot.state.is(SessionState::AudioUploaded) {
            log::info!("Audio received for session {}", snapshot.id);
            self.set_message(StatusMessage::success("Audio received successfully"));
        }
        self.apply_snapshot(snapshot);
    }

    fn on_poll_failure(&self, error: SessionError, failures: u32) {
        if !self.alive.get() {
            return;
        }
        self.view.borrow_mut().poll_failures = failures;
        self.emit(SessionEvent::PollFailure {
            failures,
            message: error.to_string(),
        });
    }

    fn reset(&self) {
        self.synchronizer.stop();
        {
            let mut view = self.view.borrow_mut();
            let epoch = view.epoch + 1;
            *view = ViewState {
                epoch,
                ..ViewState::default()
            };
        }
        self.emit(SessionEvent::SessionChanged { session: None });
        self.emit(SessionEvent::Loading { active: false });
        self.emit(SessionEvent::Cleared);
        log::info!("Session controller reset");
    }

    /// Arm the synchronizer iff the current session is `Running`.
    fn reconcile(self: &Rc<Self>) {
        let target = {
            let view = self.view.borrow();
            view.session
                .as_ref()
                .filter(|s| self.alive.get() && state_machine::is_awaiting_external_actor(&s.state))
                .map(|s| s.id.clone())
        };
        let armed = self.synchronizer.active_session();
        if armed == target {
            return;
        }
        if armed.is_some() {
            self.synchronizer.stop();
        }
        let Some(id) = target else {
            return;
        };

        let weak = Rc::downgrade(self);
        let on_update = move |snapshot: Session| {
            if let Some(core) = weak.upgrade() {
                core.on_synchronizer_update(snapshot);
            }
        };
        let weak = Rc::downgrade(self);
        let on_failure = move |error: SessionError, failures: u32| {
            if let Some(core) = weak.upgrade() {
                core.on_poll_failure(error, failures);
            }
        };
        if let Err(e) = self.synchronizer.start(id, on_update, on_failure) {
            log::error!("Could not arm the synchronizer: {}", e);
        }
    }
}
