//! Browser adapters for the trainer-core ports.

pub mod gateway;
pub mod spawner;
pub mod timer;

pub use gateway::HttpSessionGateway;
pub use spawner::BrowserSpawner;
pub use timer::GlooTimer;
