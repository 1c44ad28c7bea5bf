//! Facilities to consume JSON messages from a RabbitMq queue. Check out
//! [`JsonConsumer`] as a starting point.

pub use consumer::{
    ConsumerConfig, JsonConsumer, QueueOverrides, Subscription, TEMPORARY_QUEUE_EXPIRY_MS,
};
pub use handler::Handler;
pub use incoming_message::JsonDelivery;

mod consumer;
mod handler;
mod incoming_message;
