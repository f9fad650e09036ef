pub mod keyboard_input;

mod orchestrator;
mod runtime;
mod shutdown;
mod startup;
mod types;


pub use orchestrator::KioskApp;
pub use types::{ComponentState, ShutdownReason};
