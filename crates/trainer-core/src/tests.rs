#[cfg(test)]
mod tests {
    use crate::controller::SessionController;
    use crate::event_bus::EventBus;
    use crate::ports::*;
    use crate::state_machine::{self, Actor};
    use crate::synchronizer::{BackoffPolicy, PollingSynchronizer};
    use trainer_types::config::PollingConfig;
    use trainer_types::event::{MessageKind, SessionEvent};
    use trainer_types::session::*;
    use trainer_types::state::*;
    use trainer_types::SessionError;

    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::rc::Rc;
    use async_trait::async_trait;
    use futures::channel::oneshot;
    use futures::executor::{LocalPool, LocalSpawner};
    use futures::future::LocalBoxFuture;
    use futures::task::LocalSpawnExt;

    // ─── Test doubles ────────────────────────────────────────

    /// Timer whose sleeps only end when the test fires them, oldest first.
    struct ManualTimer {
        requested: RefCell<Vec<u64>>,
        pending: RefCell<VecDeque<oneshot::Sender<()>>>,
    }

    impl ManualTimer {
        fn new() -> Rc<Self> {
            Rc::new(Self {
                requested: RefCell::new(Vec::new()),
                pending: RefCell::new(VecDeque::new()),
            })
        }

        fn fire(&self) -> bool {
            match self.pending.borrow_mut().pop_front() {
                Some(tx) => tx.send(()).is_ok(),
                None => false,
            }
        }

        fn requested(&self) -> Vec<u64> {
            self.requested.borrow().clone()
        }
    }

    #[async_trait(?Send)]
    impl TimerPort for ManualTimer {
        async fn sleep(&self, ms: u64) {
            let (tx, rx) = oneshot::channel();
            self.requested.borrow_mut().push(ms);
            self.pending.borrow_mut().push_back(tx);
            let _ = rx.await;
        }
    }

    struct PoolSpawner(LocalSpawner);

    impl TaskSpawner for PoolSpawner {
        fn spawn_local(&self, task: LocalBoxFuture<'static, ()>) {
            self.0.spawn_local(task).expect("pool accepts tasks");
        }
    }

    /// What the backend does with the next state-change request
    enum Outcome {
        Apply,
        Fail(SessionError),
        /// The edge is committed but the reply is lost
        ApplyThenFail(SessionError),
    }

    /// In-memory stand-in for the REST backend
    struct MockBackend {
        session: RefCell<Option<Session>>,
        next_id: Cell<u32>,
        calls: RefCell<Vec<String>>,
        outcomes: RefCell<VecDeque<Outcome>>,
        get_failures: RefCell<VecDeque<SessionError>>,
        get_gate: RefCell<Option<oneshot::Receiver<()>>>,
        transition_gate: RefCell<Option<oneshot::Receiver<()>>>,
        survey_failure: RefCell<Option<SessionError>>,
    }

    impl MockBackend {
        fn new() -> Rc<Self> {
            Rc::new(Self {
                session: RefCell::new(None),
                next_id: Cell::new(1),
                calls: RefCell::new(Vec::new()),
                outcomes: RefCell::new(VecDeque::new()),
                get_failures: RefCell::new(VecDeque::new()),
                get_gate: RefCell::new(None),
                transition_gate: RefCell::new(None),
                survey_failure: RefCell::new(None),
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }

        fn set_remote_state(&self, state: impl Into<ReportedState>) {
            let state = state.into();
            if let Some(s) = self.session.borrow_mut().as_mut() {
                s.state = state;
            }
        }

        fn remote_state(&self) -> Option<ReportedState> {
            self.session.borrow().as_ref().map(|s| s.state.clone())
        }

        fn queue_outcome(&self, outcome: Outcome) {
            self.outcomes.borrow_mut().push_back(outcome);
        }

        fn fail_gets(&self, count: usize) {
            for i in 0..count {
                self.get_failures
                    .borrow_mut()
                    .push_back(SessionError::Network(format!("timeout #{}", i + 1)));
            }
        }

        /// Hold the next fetch until the returned sender fires
        fn hold_next_get(&self) -> oneshot::Sender<()> {
            let (tx, rx) = oneshot::channel();
            *self.get_gate.borrow_mut() = Some(rx);
            tx
        }

        fn hold_next_transition(&self) -> oneshot::Sender<()> {
            let (tx, rx) = oneshot::channel();
            *self.transition_gate.borrow_mut() = Some(rx);
            tx
        }
    }

    #[async_trait(?Send)]
    impl SessionGateway for MockBackend {
        async fn create_session(&self, payload: &CreateSessionPayload) -> trainer_types::Result<Session> {
            self.calls.borrow_mut().push("create".to_string());
            let id = self.next_id.get();
            self.next_id.set(id + 1);
            let session = sample_session(&id.to_string(), SessionState::Created, &payload.participant.name);
            *self.session.borrow_mut() = Some(session.clone());
            Ok(session)
        }

        async fn get_session(&self, id: &SessionId) -> trainer_types::Result<Session> {
            self.calls.borrow_mut().push("get".to_string());
            let gate = self.get_gate.borrow_mut().take();
            if let Some(rx) = gate {
                let _ = rx.await;
            }
            if let Some(e) = self.get_failures.borrow_mut().pop_front() {
                return Err(e);
            }
            self.session
                .borrow()
                .clone()
                .filter(|s| &s.id == id)
                .ok_or_else(|| SessionError::NotFound(id.to_string()))
        }

        async fn set_session_state(&self, id: &SessionId, target: SessionState) -> trainer_types::Result<Session> {
            self.calls.borrow_mut().push(format!("set:{}", target));
            let gate = self.transition_gate.borrow_mut().take();
            if let Some(rx) = gate {
                let _ = rx.await;
            }
            let outcome = self.outcomes.borrow_mut().pop_front().unwrap_or(Outcome::Apply);
            if let Outcome::Fail(e) = outcome {
                return Err(e);
            }

            let mut guard = self.session.borrow_mut();
            let session = guard
                .as_mut()
                .filter(|s| &s.id == id)
                .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
            let current = session.state.known();
            if current.and_then(state_machine::successor) != Some(target) {
                return Err(SessionError::IllegalTransition(format!(
                    "Invalid state transition from {} to {}",
                    session.state, target
                )));
            }
            session.state = target.into();
            let updated = session.clone();
            drop(guard);

            match outcome {
                Outcome::ApplyThenFail(e) => Err(e),
                _ => Ok(updated),
            }
        }

        async fn submit_survey(&self, id: &SessionId, _answers: &SurveyAnswers) -> trainer_types::Result<()> {
            self.calls.borrow_mut().push("survey".to_string());
            if let Some(e) = self.survey_failure.borrow_mut().take() {
                return Err(e);
            }
            let mut guard = self.session.borrow_mut();
            match guard.as_mut().filter(|s| &s.id == id) {
                Some(s) => {
                    if s.state.is(SessionState::SurveyPending) {
                        s.state = SessionState::Completed.into();
                    }
                    Ok(())
                }
                None => Err(SessionError::NotFound(id.to_string())),
            }
        }
    }

    fn sample_session(id: &str, state: SessionState, name: &str) -> Session {
        Session {
            id: SessionId::new(id),
            code: format!("CODE{}", id),
            state: state.into(),
            participant: Participant::new(name),
            selected_text: TextRef {
                id: "t-1".to_string(),
                title: "Brindis de bodas".to_string(),
            },
            created_at: "2026-01-05T10:00:00Z".to_string(),
            updated_at: None,
            started_at: None,
            completed_at: None,
            recordings_count: 0,
            surveys_count: 0,
        }
    }

    fn payload() -> CreateSessionPayload {
        CreateSessionPayload::new(Participant::new("Ana"), "t-1")
    }

    fn answers() -> SurveyAnswers {
        let value = serde_json::json!({
            "experiencia_general": "buena",
            "volveria_usar": "si"
        });
        value.as_object().cloned().unwrap()
    }

    struct Harness {
        pool: LocalPool,
        backend: Rc<MockBackend>,
        timer: Rc<ManualTimer>,
        bus: EventBus,
        controller: SessionController,
    }

    fn harness() -> Harness {
        let pool = LocalPool::new();
        let backend = MockBackend::new();
        let timer = ManualTimer::new();
        let bus = EventBus::new();
        let controller = SessionController::new(
            backend.clone(),
            timer.clone(),
            Rc::new(PoolSpawner(pool.spawner())),
            &PollingConfig::default(),
            bus.clone(),
        );
        Harness { pool, backend, timer, bus, controller }
    }

    impl Harness {
        fn create(&mut self) -> Session {
            self.pool.run_until(self.controller.create(payload())).unwrap()
        }

        fn start(&mut self) -> Session {
            let s = self.pool.run_until(self.controller.request_start()).unwrap();
            self.pool.run_until_stalled();
            s
        }

        /// Let one scheduled poll happen
        fn tick(&mut self) {
            assert!(self.timer.fire(), "no poll was scheduled");
            self.pool.run_until_stalled();
        }

        fn state(&self) -> Option<ReportedState> {
            self.controller.state()
        }

        /// The invariant that must hold after every operation
        fn assert_armed_iff_running(&self) {
            let running = self.state().map_or(false, |s| s.is(SessionState::Running));
            assert_eq!(
                self.controller.is_synchronizer_armed(),
                running,
                "synchronizer arming out of sync with state {:?}",
                self.state()
            );
        }

        fn to_audio_uploaded(&mut self) {
            self.create();
            self.start();
            self.backend.set_remote_state(SessionState::AudioUploaded);
            self.tick();
        }
    }

    // ─── State machine Tests ─────────────────────────────────

    #[test]
    fn test_successor_chain() {
        assert_eq!(state_machine::successor(SessionState::Created), Some(SessionState::ReadyToStart));
        assert_eq!(state_machine::successor(SessionState::ReadyToStart), Some(SessionState::Running));
        assert_eq!(state_machine::successor(SessionState::Running), Some(SessionState::AudioUploaded));
        assert_eq!(state_machine::successor(SessionState::AudioUploaded), Some(SessionState::SurveyPending));
        assert_eq!(state_machine::successor(SessionState::SurveyPending), Some(SessionState::Completed));
        assert_eq!(state_machine::successor(SessionState::Completed), None);
    }

    #[test]
    fn test_can_advance_table() {
        let expected = [
            (SessionState::Created, Some(Actor::LocalUser)),
            (SessionState::ReadyToStart, Some(Actor::LocalUser)),
            (SessionState::Running, Some(Actor::External)),
            (SessionState::AudioUploaded, Some(Actor::LocalUser)),
            (SessionState::SurveyPending, Some(Actor::LocalUser)),
            (SessionState::Completed, None),
        ];
        for (state, actor) in expected {
            assert_eq!(state_machine::can_advance(state), actor, "actor for {}", state);
        }
    }

    #[test]
    fn test_only_running_awaits_external_actor() {
        for s in SessionState::all() {
            let awaiting = state_machine::is_awaiting_external_actor(&(*s).into());
            assert_eq!(awaiting, *s == SessionState::Running, "state {}", s);
        }
        assert!(!state_machine::is_awaiting_external_actor(&ReportedState::from("paused")));
    }

    #[test]
    fn test_apply_user_transition_accepts_user_edges() {
        let ok = [
            (SessionState::Created, SessionState::ReadyToStart),
            (SessionState::ReadyToStart, SessionState::Running),
            (SessionState::AudioUploaded, SessionState::SurveyPending),
            (SessionState::SurveyPending, SessionState::Completed),
        ];
        for (from, to) in ok {
            assert!(state_machine::apply_user_transition(&from.into(), to).is_ok(), "{} -> {}", from, to);
        }
    }

    #[test]
    fn test_apply_user_transition_rejects_skips_and_external_edges() {
        let r = state_machine::apply_user_transition(&SessionState::Created.into(), SessionState::Running);
        assert!(matches!(r, Err(SessionError::IllegalTransition(_))));

        let r = state_machine::apply_user_transition(&SessionState::Running.into(), SessionState::AudioUploaded);
        assert!(matches!(r, Err(SessionError::IllegalTransition(_))));

        let r = state_machine::apply_user_transition(&SessionState::Completed.into(), SessionState::Created);
        assert!(matches!(r, Err(SessionError::IllegalTransition(_))));
    }

    #[test]
    fn test_apply_user_transition_from_unknown_state() {
        let r = state_machine::apply_user_transition(&ReportedState::from("archived"), SessionState::Completed);
        assert_eq!(r, Err(SessionError::UnknownState("archived".to_string())));
    }

    // ─── Backoff Tests ───────────────────────────────────────

    #[test]
    fn test_backoff_schedule() {
        let policy = BackoffPolicy::default();
        let delays: Vec<u64> = (0..=7).map(|f| policy.delay_for(f)).collect();
        assert_eq!(delays, vec![2500, 4000, 5500, 7000, 8500, 10_000, 10_000, 10_000]);
    }

    #[test]
    fn test_backoff_formula_matches_bound() {
        let policy = BackoffPolicy::default();
        for failures in 0..50u32 {
            let expected = std::cmp::min(10_000, 2500 + failures as u64 * 1500);
            assert_eq!(policy.delay_for(failures), expected);
        }
        assert_eq!(policy.delay_for(u32::MAX), 10_000);
    }

    #[test]
    fn test_backoff_from_config() {
        let config = PollingConfig { base_delay_ms: 1000, step_ms: 500, max_delay_ms: 2000 };
        let policy = BackoffPolicy::from_config(&config);
        assert_eq!(policy.delay_for(0), 1000);
        assert_eq!(policy.delay_for(1), 1500);
        assert_eq!(policy.delay_for(3), 2000);
    }

    // ─── EventBus Tests ──────────────────────────────────────

    #[test]
    fn test_event_bus_emit_and_drain() {
        let bus = EventBus::new();
        assert!(!bus.has_pending());
        bus.emit(SessionEvent::Loading { active: true });
        bus.emit(SessionEvent::Cleared);
        assert_eq!(bus.pending(), 2);

        let events = bus.drain();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], SessionEvent::Loading { active: true }));
        assert!(!bus.has_pending());
    }

    #[test]
    fn test_event_bus_clone_shares_queue() {
        let bus1 = EventBus::new();
        let bus2 = bus1.clone();
        bus1.emit(SessionEvent::Cleared);
        assert!(bus2.has_pending());
        assert_eq!(bus2.drain().len(), 1);
        assert!(!bus1.has_pending());
    }

    // ─── Synchronizer Tests ──────────────────────────────────

    fn synchronizer(pool: &LocalPool, backend: &Rc<MockBackend>, timer: &Rc<ManualTimer>) -> PollingSynchronizer {
        PollingSynchronizer::new(
            backend.clone(),
            timer.clone(),
            Rc::new(PoolSpawner(pool.spawner())),
            BackoffPolicy::default(),
        )
    }

    fn running_backend() -> (Rc<MockBackend>, SessionId) {
        let backend = MockBackend::new();
        let session = sample_session("9", SessionState::Running, "Ana");
        let id = session.id.clone();
        *backend.session.borrow_mut() = Some(session);
        (backend, id)
    }

    #[test]
    fn test_synchronizer_delivers_every_snapshot() {
        let mut pool = LocalPool::new();
        let (backend, id) = running_backend();
        let timer = ManualTimer::new();
        let sync = synchronizer(&pool, &backend, &timer);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        sync.start(id, move |s| sink.borrow_mut().push(s.state), |_, _| {}).unwrap();
        pool.run_until_stalled();
        assert_eq!(timer.requested(), vec![2500]);

        timer.fire();
        pool.run_until_stalled();
        timer.fire();
        pool.run_until_stalled();

        // Unchanged snapshots are still delivered
        assert_eq!(seen.borrow().len(), 2);
        assert!(seen.borrow().iter().all(|s| s.is(SessionState::Running)));
        assert_eq!(timer.requested(), vec![2500, 2500, 2500]);
        assert!(sync.is_active());
    }

    #[test]
    fn test_synchronizer_rejects_double_start() {
        let pool = LocalPool::new();
        let (backend, id) = running_backend();
        let timer = ManualTimer::new();
        let sync = synchronizer(&pool, &backend, &timer);

        sync.start(id.clone(), |_| {}, |_, _| {}).unwrap();
        let second = sync.start(id.clone(), |_| {}, |_, _| {});
        assert_eq!(second, Err(SessionError::AlreadyStarted));

        sync.stop();
        assert!(sync.start(id, |_| {}, |_, _| {}).is_ok());
    }

    #[test]
    fn test_synchronizer_stop_is_idempotent() {
        let mut pool = LocalPool::new();
        let (backend, id) = running_backend();
        let timer = ManualTimer::new();
        let sync = synchronizer(&pool, &backend, &timer);

        // Stopping before any start is fine
        sync.stop();

        sync.start(id, |_| {}, |_, _| {}).unwrap();
        pool.run_until_stalled();
        sync.stop();
        sync.stop();
        pool.run_until_stalled();

        assert!(!sync.is_active());
        assert_eq!(sync.active_session(), None);
        // The cancelled sleep never turns into a fetch or a new timer
        timer.fire();
        pool.run_until_stalled();
        assert_eq!(timer.requested(), vec![2500]);
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_synchronizer_discards_fetch_resolving_after_stop() {
        let mut pool = LocalPool::new();
        let (backend, id) = running_backend();
        let timer = ManualTimer::new();
        let sync = synchronizer(&pool, &backend, &timer);

        let delivered = Rc::new(Cell::new(0u32));
        let counter = delivered.clone();
        let release = backend.hold_next_get();
        sync.start(id, move |_| counter.set(counter.get() + 1), |_, _| {}).unwrap();
        pool.run_until_stalled();

        timer.fire();
        pool.run_until_stalled();
        assert_eq!(backend.calls(), vec!["get"], "fetch should be in flight");

        sync.stop();
        let _ = release.send(());
        pool.run_until_stalled();

        assert_eq!(delivered.get(), 0);
    }

    #[test]
    fn test_synchronizer_backoff_and_recovery() {
        let mut pool = LocalPool::new();
        let (backend, id) = running_backend();
        let timer = ManualTimer::new();
        let sync = synchronizer(&pool, &backend, &timer);

        let failures = Rc::new(RefCell::new(Vec::new()));
        let sink = failures.clone();
        backend.fail_gets(3);
        sync.start(id, |_| {}, move |_, n| sink.borrow_mut().push(n)).unwrap();
        pool.run_until_stalled();

        for _ in 0..3 {
            timer.fire();
            pool.run_until_stalled();
        }
        assert_eq!(timer.requested(), vec![2500, 4000, 5500, 7000]);
        assert_eq!(*failures.borrow(), vec![1, 2, 3]);
        assert_eq!(sync.failures(), 3);
        assert!(sync.is_active(), "failures must not end the loop");

        timer.fire();
        pool.run_until_stalled();
        assert_eq!(sync.failures(), 0);
        assert_eq!(timer.requested().last(), Some(&2500));
        assert_eq!(sync.next_delay_ms(), Some(2500));
    }

    #[test]
    fn test_synchronizer_drop_cancels_loop() {
        let mut pool = LocalPool::new();
        let (backend, id) = running_backend();
        let timer = ManualTimer::new();
        let sync = synchronizer(&pool, &backend, &timer);
        sync.start(id, |_| {}, |_, _| {}).unwrap();
        pool.run_until_stalled();

        drop(sync);
        timer.fire();
        pool.run_until_stalled();
        assert!(backend.calls().is_empty());
    }

    // ─── Controller Tests ────────────────────────────────────

    #[test]
    fn test_full_lifecycle_scenario() {
        let mut h = harness();

        let created = h.create();
        assert!(created.state.is(SessionState::Created));
        assert!(!h.controller.is_synchronizer_armed());

        let running = h.start();
        assert!(running.state.is(SessionState::Running));
        assert!(h.controller.is_synchronizer_armed());
        assert_eq!(h.timer.requested(), vec![2500]);
        assert_eq!(h.backend.calls(), vec!["create", "set:ready_to_start", "set:running"]);

        h.backend.set_remote_state(SessionState::AudioUploaded);
        h.tick();
        assert_eq!(h.state(), Some(SessionState::AudioUploaded.into()));
        assert!(!h.controller.is_synchronizer_armed());
        assert!(h.controller.last_check().is_some());
        assert_eq!(h.controller.message().unwrap().text, "Audio received successfully");

        let pending = h.pool.run_until(h.controller.request_continue_to_survey()).unwrap();
        assert!(pending.state.is(SessionState::SurveyPending));
        h.assert_armed_iff_running();

        let calls_before = h.backend.calls().len();
        let done = h.controller.on_survey_submitted().unwrap();
        assert!(done.state.is(SessionState::Completed));
        assert_eq!(h.backend.calls().len(), calls_before, "completion must not call the gateway");
        h.assert_armed_iff_running();

        h.controller.reset();
        assert!(h.controller.session().is_none());
        assert!(!h.controller.is_synchronizer_armed());
        assert!(h.controller.message().is_none());
        assert!(h.controller.last_check().is_none());
    }

    #[test]
    fn test_running_snapshot_only_refreshes_last_check() {
        let mut h = harness();
        h.create();
        h.start();
        h.bus.drain();

        h.tick();
        assert!(h.controller.last_check().is_some());
        assert_eq!(h.state(), Some(SessionState::Running.into()));
        assert!(h.controller.is_synchronizer_armed());

        let events = h.bus.drain();
        assert!(events.iter().any(|e| matches!(e, SessionEvent::LastCheck { .. })));
        assert!(!events.iter().any(|e| matches!(e, SessionEvent::SessionChanged { .. })));
        assert_eq!(h.timer.requested(), vec![2500, 2500]);
    }

    #[test]
    fn test_poll_failures_back_off_without_changing_state() {
        let mut h = harness();
        h.create();
        h.start();
        h.backend.fail_gets(3);

        for _ in 0..3 {
            h.tick();
        }
        assert_eq!(h.timer.requested(), vec![2500, 4000, 5500, 7000]);
        assert_eq!(h.state(), Some(SessionState::Running.into()));
        assert!(h.controller.is_synchronizer_armed());
        assert_eq!(h.controller.poll_failures(), 3);
        assert_eq!(h.controller.next_poll_delay_ms(), Some(7000));

        let failures: Vec<u32> = h
            .bus
            .drain()
            .into_iter()
            .filter_map(|e| match e {
                SessionEvent::PollFailure { failures, .. } => Some(failures),
                _ => None,
            })
            .collect();
        assert_eq!(failures, vec![1, 2, 3]);

        h.tick();
        assert_eq!(h.controller.poll_failures(), 0);
        assert_eq!(h.timer.requested().last(), Some(&2500));
    }

    #[test]
    fn test_start_while_running_is_invalid_state() {
        let mut h = harness();
        h.create();
        let before = h.start();
        let calls_before = h.backend.calls();

        let err = h.pool.run_until(h.controller.request_start()).unwrap_err();
        assert!(matches!(err, SessionError::InvalidState(_)));
        assert_eq!(h.controller.session(), Some(before));
        assert!(h.controller.is_synchronizer_armed());
        assert_eq!(h.backend.calls(), calls_before, "InvalidState must never reach the network");
        assert!(!h.controller.is_loading());
    }

    #[test]
    fn test_operations_without_session_are_invalid_state() {
        let mut h = harness();
        let err = h.pool.run_until(h.controller.request_start()).unwrap_err();
        assert!(matches!(err, SessionError::InvalidState(_)));
        let err = h.pool.run_until(h.controller.request_continue_to_survey()).unwrap_err();
        assert!(matches!(err, SessionError::InvalidState(_)));
        assert!(matches!(h.controller.on_survey_submitted(), Err(SessionError::InvalidState(_))));
        assert!(h.backend.calls().is_empty());
        assert_eq!(h.controller.message().unwrap().kind, MessageKind::Error);
    }

    #[test]
    fn test_continue_requires_audio_uploaded() {
        let mut h = harness();
        h.create();
        let err = h.pool.run_until(h.controller.request_continue_to_survey()).unwrap_err();
        assert!(matches!(err, SessionError::InvalidState(_)));
        assert_eq!(h.backend.calls(), vec!["create"]);
        h.assert_armed_iff_running();
    }

    #[test]
    fn test_survey_submitted_requires_survey_pending() {
        let mut h = harness();
        h.to_audio_uploaded();
        let err = h.controller.on_survey_submitted().unwrap_err();
        assert!(matches!(err, SessionError::InvalidState(_)));
        assert_eq!(h.state(), Some(SessionState::AudioUploaded.into()));
    }

    #[test]
    fn test_create_validates_locally() {
        let mut h = harness();
        let bad = CreateSessionPayload::new(Participant::new(""), "t-1");
        let err = h.pool.run_until(h.controller.create(bad)).unwrap_err();
        assert!(matches!(err, SessionError::Validation(_)));
        assert!(h.backend.calls().is_empty());
        assert!(h.controller.session().is_none());
        assert!(!h.controller.is_loading());
    }

    #[test]
    fn test_create_replaces_current_session() {
        let mut h = harness();
        h.create();
        h.start();
        assert!(h.controller.is_synchronizer_armed());

        let second = h.create();
        assert_eq!(second.id, SessionId::new("2"));
        assert_eq!(h.controller.session(), Some(second));
        assert!(!h.controller.is_synchronizer_armed());
        assert!(h.controller.last_check().is_none());
        let message = h.controller.message().unwrap();
        assert!(message.text.contains("CODE2"), "got {:?}", message);
    }

    #[test]
    fn test_network_error_on_continue_leaves_session_unchanged() {
        let mut h = harness();
        h.to_audio_uploaded();
        let before = h.controller.session();

        h.backend.queue_outcome(Outcome::Fail(SessionError::Network("offline".to_string())));
        let err = h.pool.run_until(h.controller.request_continue_to_survey()).unwrap_err();
        assert!(err.is_network());
        assert_eq!(h.controller.session(), before);
        assert!(!h.controller.is_loading());

        let message = h.controller.message().unwrap();
        assert!(message.is_error());
        assert!(message.text.contains("offline"));
        h.assert_armed_iff_running();
    }

    #[test]
    fn test_backend_rejection_surfaces_illegal_transition() {
        let mut h = harness();
        h.to_audio_uploaded();
        // Someone else already moved the session on
        h.backend.set_remote_state(SessionState::Completed);

        let err = h.pool.run_until(h.controller.request_continue_to_survey()).unwrap_err();
        assert!(matches!(err, SessionError::IllegalTransition(_)));
        assert_eq!(h.state(), Some(SessionState::AudioUploaded.into()));
    }

    #[test]
    fn test_partial_start_rereads_and_can_resume() {
        let mut h = harness();
        h.create();
        h.backend.queue_outcome(Outcome::Apply);
        h.backend.queue_outcome(Outcome::Fail(SessionError::Network("reset by peer".to_string())));

        let err = h.pool.run_until(h.controller.request_start()).unwrap_err();
        h.pool.run_until_stalled();
        assert!(err.is_network());
        assert_eq!(h.backend.calls(), vec!["create", "set:ready_to_start", "set:running", "get"]);
        assert_eq!(h.state(), Some(SessionState::ReadyToStart.into()));
        h.assert_armed_iff_running();

        let running = h.start();
        assert!(running.state.is(SessionState::Running));
        assert_eq!(h.backend.calls().last().map(String::as_str), Some("set:running"));
        h.assert_armed_iff_running();
    }

    #[test]
    fn test_partial_start_trusts_backend_read() {
        let mut h = harness();
        h.create();
        h.backend.queue_outcome(Outcome::Apply);
        h.backend
            .queue_outcome(Outcome::ApplyThenFail(SessionError::Network("reply lost".to_string())));

        let err = h.pool.run_until(h.controller.request_start()).unwrap_err();
        h.pool.run_until_stalled();
        assert!(err.is_network());
        assert_eq!(h.state(), Some(SessionState::Running.into()));
        h.assert_armed_iff_running();
        assert!(h.controller.message().unwrap().is_error());
    }

    #[test]
    fn test_reset_during_start_is_reported() {
        let mut h = harness();
        h.create();
        let release = h.backend.hold_next_transition();

        let controller = &h.controller;
        let (result, ()) = h.pool.run_until(async {
            futures::join!(controller.request_start(), async {
                controller.reset();
                let _ = release.send(());
            })
        });

        let err = result.unwrap_err();
        assert!(matches!(&err, SessionError::InvalidState(m) if m.contains("replaced")));
        assert!(h.controller.session().is_none());
        assert!(!h.controller.is_loading());
        assert!(!h.controller.is_synchronizer_armed());
        let message = h.controller.message().unwrap();
        assert!(message.is_error());
        assert!(message.text.contains("replaced"));
        assert_eq!(h.backend.calls(), vec!["create", "set:ready_to_start"]);
    }

    #[test]
    fn test_first_start_edge_failure_changes_nothing() {
        let mut h = harness();
        h.create();
        h.backend.queue_outcome(Outcome::Fail(SessionError::Network("offline".to_string())));

        let err = h.pool.run_until(h.controller.request_start()).unwrap_err();
        assert!(err.is_network());
        assert_eq!(h.state(), Some(SessionState::Created.into()));
        assert_eq!(h.backend.calls(), vec!["create", "set:ready_to_start"]);
        h.assert_armed_iff_running();
    }

    #[test]
    fn test_unknown_state_disarms_and_shows_raw_value() {
        let mut h = harness();
        h.create();
        h.start();

        h.backend.set_remote_state("archived");
        h.tick();

        assert_eq!(h.state(), Some(ReportedState::Unknown("archived".to_string())));
        assert!(!h.controller.is_synchronizer_armed());
        let message = h.controller.message().unwrap();
        assert!(message.text.contains("archived"));

        let calls_before = h.backend.calls().len();
        let err = h.pool.run_until(h.controller.request_start()).unwrap_err();
        assert!(matches!(err, SessionError::InvalidState(_)));
        let err = h.pool.run_until(h.controller.request_continue_to_survey()).unwrap_err();
        assert!(matches!(err, SessionError::InvalidState(_)));
        let err = h.pool.run_until(h.controller.submit_survey(answers())).unwrap_err();
        assert!(matches!(err, SessionError::InvalidState(_)));
        let err = h.controller.on_survey_submitted().unwrap_err();
        assert!(matches!(err, SessionError::InvalidState(_)));

        assert_eq!(h.backend.calls().len(), calls_before);
        assert_eq!(h.state(), Some(ReportedState::Unknown("archived".to_string())));
        assert!(!h.controller.is_synchronizer_armed());
    }

    #[test]
    fn test_snapshot_for_other_session_is_ignored() {
        let mut h = harness();
        let current = h.create();
        h.controller
            .on_synchronizer_update(sample_session("77", SessionState::Completed, "Otro"));
        assert_eq!(h.controller.session(), Some(current));
        assert!(h.controller.last_check().is_none());
    }

    #[test]
    fn test_direct_synchronizer_update_disarms() {
        let mut h = harness();
        let created = h.create();
        h.start();
        h.controller
            .on_synchronizer_update(created.with_state(SessionState::AudioUploaded));
        assert!(!h.controller.is_synchronizer_armed());
        assert_eq!(h.state(), Some(SessionState::AudioUploaded.into()));
    }

    #[test]
    fn test_submit_survey_completes_session() {
        let mut h = harness();
        h.to_audio_uploaded();
        h.pool.run_until(h.controller.request_continue_to_survey()).unwrap();

        let done = h.pool.run_until(h.controller.submit_survey(answers())).unwrap();
        assert!(done.state.is(SessionState::Completed));
        assert_eq!(h.backend.calls().last().map(String::as_str), Some("survey"));
        assert_eq!(h.backend.remote_state(), Some(SessionState::Completed.into()));
        assert_eq!(h.controller.message().unwrap().text, "Session completed successfully");
        h.assert_armed_iff_running();
    }

    #[test]
    fn test_submit_survey_failure_keeps_survey_pending() {
        let mut h = harness();
        h.to_audio_uploaded();
        h.pool.run_until(h.controller.request_continue_to_survey()).unwrap();
        *h.backend.survey_failure.borrow_mut() = Some(SessionError::Validation("missing answers".to_string()));

        let err = h.pool.run_until(h.controller.submit_survey(answers())).unwrap_err();
        assert!(matches!(err, SessionError::Validation(_)));
        assert_eq!(h.state(), Some(SessionState::SurveyPending.into()));
        assert!(!h.controller.is_loading());
    }

    #[test]
    fn test_reset_stops_polling() {
        let mut h = harness();
        h.create();
        h.start();
        h.controller.reset();
        assert!(!h.controller.is_synchronizer_armed());

        let calls_before = h.backend.calls().len();
        h.timer.fire();
        h.pool.run_until_stalled();
        assert_eq!(h.backend.calls().len(), calls_before);
        assert!(h.controller.session().is_none());
    }

    #[test]
    fn test_dispose_blocks_late_updates() {
        let mut h = harness();
        let created = h.create();
        h.start();
        h.controller.dispose();

        assert!(!h.controller.is_alive());
        assert!(!h.controller.is_synchronizer_armed());
        h.controller
            .on_synchronizer_update(created.with_state(SessionState::AudioUploaded));
        assert_eq!(h.state(), Some(SessionState::Running.into()));
    }

    #[test]
    fn test_drop_stops_synchronizer() {
        let Harness { mut pool, backend, timer, controller, .. } = harness();
        pool.run_until(controller.create(payload())).unwrap();
        pool.run_until(controller.request_start()).unwrap();
        pool.run_until_stalled();

        drop(controller);
        let calls_before = backend.calls().len();
        timer.fire();
        pool.run_until_stalled();
        assert_eq!(backend.calls().len(), calls_before);
    }

    #[test]
    fn test_loading_events_bracket_operations() {
        let mut h = harness();
        h.create();
        let events = h.bus.drain();
        let loading: Vec<bool> = events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::Loading { active } => Some(*active),
                _ => None,
            })
            .collect();
        assert_eq!(loading, vec![true, false]);
        assert!(events.iter().any(|e| matches!(e, SessionEvent::SessionChanged { session: Some(_) })));
        assert!(!h.controller.is_loading());
    }
}
