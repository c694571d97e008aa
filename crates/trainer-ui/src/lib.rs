//! egui panels for the speech trainer client.
//!
//! Panels render from `UiState` and hand user intent back to the app as
//! action values; they never call the controller themselves.

pub mod panels;
pub mod state;
pub mod theme;
