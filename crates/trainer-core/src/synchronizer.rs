//! Polling synchronizer.
//!
//! While a session waits on the external actor, this loop re-reads it from
//! the gateway and hands every snapshot to the owner:
//!
//! 1. Sleep for the current backoff delay
//! 2. Fetch the session (one request in flight, never more)
//! 3. Deliver the snapshot or the failure
//! 4. Loop back to step 1
//!
//! Cancellation is two-layered. `stop()` bumps a generation counter, which
//! every step re-checks before touching the owner, and aborts the spawned
//! task so a pending sleep or fetch is dropped at its next poll.

use std::cell::RefCell;
use std::rc::Rc;

use futures::future::{abortable, AbortHandle};
use trainer_types::{
    Result, SessionError,
    config::PollingConfig,
    session::{Session, SessionId},
};

use crate::ports::{SessionGateway, TaskSpawner, TimerPort};

/// Delay schedule: `min(max, base + failures * step)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base_ms: u64,
    pub step_ms: u64,
    pub max_ms: u64,
}

impl BackoffPolicy {
    pub fn from_config(config: &PollingConfig) -> Self {
        Self {
            base_ms: config.base_delay_ms,
            step_ms: config.step_ms,
            max_ms: config.max_delay_ms,
        }
    }

    /// Delay before the next fetch after `failures` consecutive failures
    pub fn delay_for(&self, failures: u32) -> u64 {
        self.step_ms
            .saturating_mul(u64::from(failures))
            .saturating_add(self.base_ms)
            .min(self.max_ms)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&PollingConfig::default())
    }
}

pub type UpdateHandler = Box<dyn Fn(Session)>;
pub type FailureHandler = Box<dyn Fn(SessionError, u32)>;

#[derive(Default)]
struct LoopState {
    generation: u64,
    session: Option<SessionId>,
    failures: u32,
    next_delay_ms: Option<u64>,
    abort: Option<AbortHandle>,
}

pub struct PollingSynchronizer {
    gateway: Rc<dyn SessionGateway>,
    timer: Rc<dyn TimerPort>,
    spawner: Rc<dyn TaskSpawner>,
    policy: BackoffPolicy,
    state: Rc<RefCell<LoopState>>,
}

impl PollingSynchronizer {
    pub fn new(
        gateway: Rc<dyn SessionGateway>,
        timer: Rc<dyn TimerPort>,
        spawner: Rc<dyn TaskSpawner>,
        policy: BackoffPolicy,
    ) -> Self {
        Self {
            gateway,
            timer,
            spawner,
            policy,
            state: Rc::new(RefCell::new(LoopState::default())),
        }
    }

    /// Begin polling `session_id`. Callers must `stop()` before starting again.
    pub fn start<U, F>(&self, session_id: SessionId, on_update: U, on_failure: F) -> Result<()>
    where
        U: Fn(Session) + 'static,
        F: Fn(SessionError, u32) + 'static,
    {
        let generation = {
            let mut st = self.state.borrow_mut();
            if st.session.is_some() {
                return Err(SessionError::AlreadyStarted);
            }
            st.generation += 1;
            st.session = Some(session_id.clone());
            st.failures = 0;
            st.next_delay_ms = None;
            st.generation
        };

        let ctx = LoopContext {
            gateway: self.gateway.clone(),
            timer: self.timer.clone(),
            policy: self.policy,
            state: self.state.clone(),
            generation,
        };
        let (task, handle) = abortable(ctx.run(
            session_id.clone(),
            Box::new(on_update),
            Box::new(on_failure),
        ));
        self.state.borrow_mut().abort = Some(handle);

        log::info!("Polling session {} every {}ms", session_id, self.policy.base_ms);
        self.spawner.spawn_local(Box::pin(async move {
            let _ = task.await;
        }));
        Ok(())
    }

    /// Cancel the loop. Idempotent; a no-op when not started.
    pub fn stop(&self) {
        let handle = {
            let mut st = self.state.borrow_mut();
            if st.session.is_none() && st.abort.is_none() {
                return;
            }
            st.generation += 1;
            st.session = None;
            st.failures = 0;
            st.next_delay_ms = None;
            st.abort.take()
        };
        if let Some(handle) = handle {
            handle.abort();
        }
        log::debug!("Polling stopped");
    }

    pub fn is_active(&self) -> bool {
        self.state.borrow().session.is_some()
    }

    /// Session currently being polled
    pub fn active_session(&self) -> Option<SessionId> {
        self.state.borrow().session.clone()
    }

    /// Consecutive failed fetches since the last success
    pub fn failures(&self) -> u32 {
        self.state.borrow().failures
    }

    /// Delay of the most recently scheduled wait, if the loop is running
    pub fn next_delay_ms(&self) -> Option<u64> {
        self.state.borrow().next_delay_ms
    }
}

impl Drop for PollingSynchronizer {
    fn drop(&mut self) {
        self.stop();
    }
}

struct LoopContext {
    gateway: Rc<dyn SessionGateway>,
    timer: Rc<dyn TimerPort>,
    policy: BackoffPolicy,
    state: Rc<RefCell<LoopState>>,
    generation: u64,
}

impl LoopContext {
    fn is_live(&self) -> bool {
        self.state.borrow().generation == self.generation
    }

    async fn run(self, id: SessionId, on_update: UpdateHandler, on_failure: FailureHandler) {
        loop {
            let delay = {
                let mut st = self.state.borrow_mut();
                if st.generation != self.generation {
                    return;
                }
                let delay = self.policy.delay_for(st.failures);
                st.next_delay_ms = Some(delay);
                delay
            };

            self.timer.sleep(delay).await;
            if !self.is_live() {
                return;
            }

            let result = self.gateway.get_session(&id).await;
            if !self.is_live() {
                log::debug!("Discarding poll result for session {} after stop", id);
                return;
            }

            match result {
                Ok(snapshot) => {
                    self.state.borrow_mut().failures = 0;
                    on_update(snapshot);
                }
                Err(e) => {
                    let failures = {
                        let mut st = self.state.borrow_mut();
                        st.failures = st.failures.saturating_add(1);
                        st.failures
                    };
                    log::warn!("Polling session {} failed ({} in a row): {}", id, failures, e);
                    on_failure(e, failures);
                }
            }
        }
    }
}
