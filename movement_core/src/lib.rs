//! Shared foundation for the movement crates: logging facade and tunables.
#![forbid(unsafe_code)]

pub mod logging;
pub mod tunables;

pub use tunables::{MovementTunables, TunablesValidation};
