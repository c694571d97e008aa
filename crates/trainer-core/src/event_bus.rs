//! Event bus between the session controller and the UI.
//!
//! Single-threaded (WASM); the queue lives behind `Rc<RefCell<..>>`.
//! The controller pushes, the UI drains once per frame.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use trainer_types::event::SessionEvent;

/// Shared event queue, clone-cheap via Rc.
#[derive(Clone, Default)]
pub struct EventBus {
    queue: Rc<RefCell<VecDeque<SessionEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: SessionEvent) {
        self.queue.borrow_mut().push_back(event);
    }

    /// Take every pending event, oldest first.
    pub fn drain(&self) -> Vec<SessionEvent> {
        self.queue.borrow_mut().drain(..).collect()
    }

    pub fn has_pending(&self) -> bool {
        !self.queue.borrow().is_empty()
    }

    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }
}
