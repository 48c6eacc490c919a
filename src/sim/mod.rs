/// Simulated seconds clock.
pub mod clock;
pub mod engine;
/// Report log summary.
pub mod summary;
pub mod types;
