pub mod batch_publisher;
pub mod broker;

pub use batch_publisher::BatchPublisher;
pub use broker::{ContextBroker, OrionClient, ServiceScope};
