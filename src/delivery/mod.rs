mod dispatcher;
mod gateway;
mod mock;
mod print;

pub use dispatcher::{DeliveryDispatcher, DeliveryReport};
pub use gateway::{HttpMessagingGateway, MessageRequest, MessagingGateway};
pub use mock::{MockMessagingGateway, MockPrintSurface};
pub use print::{PrintSurface, SpoolPrintSurface};
