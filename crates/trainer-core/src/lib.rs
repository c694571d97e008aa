//! Session lifecycle core: state machine, polling synchronizer, controller.
//!
//! Pure Rust. Network, timers and task spawning come in through the
//! traits in [`ports`]; browser implementations live in `trainer-platform`.

pub mod controller;
pub mod event_bus;
pub mod ports;
pub mod state_machine;
pub mod synchronizer;

#[cfg(test)]
mod tests;

pub use controller::SessionController;
pub use synchronizer::{BackoffPolicy, PollingSynchronizer};
