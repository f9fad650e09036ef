mod mock;
mod orchestrator;
mod service;
#[cfg(test)]
mod tests;

pub use mock::MockAvatarService;
pub use orchestrator::{GenerationAttempt, GenerationOrchestrator, GenerationOutcome};
pub use service::{AvatarRequest, AvatarService, HttpAvatarService};
