//! Facilities to publish JSON messages to a RabbitMq exchange. Check out
//! [`JsonPublisher`] as a starting point.
mod envelope;
mod publisher;

pub use envelope::EnvelopeOptions;
pub use publisher::{JsonPublisher, PublishError};
