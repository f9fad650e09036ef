mod builder;
mod controller;
mod state;

pub use builder::SessionControllerBuilder;
pub use controller::{SessionCommand, SessionController, SessionParts};
pub use state::{Session, SessionView, Step};
