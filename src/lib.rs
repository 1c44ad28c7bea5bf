//! `amqp-json` is a thin convenience layer on top of [`lapin`] for services that
//! exchange JSON messages over RabbitMQ topic exchanges.
//!
//! It takes care of three things:
//!
//! - deriving the routing key of an outgoing message by rendering a
//!   `{{dot.path}}` template against the payload itself (see [`routing`]);
//! - declaring the queue/exchange/binding topology a consumer or publisher
//!   needs, with sensible defaults for temporary queues;
//! - encoding outgoing payloads as `application/json` bodies and decoding
//!   incoming ones, best-effort, before your handler runs.
//!
//! [`JsonPublisher`](crate::publishers::JsonPublisher) and
//! [`JsonConsumer`](crate::consumers::JsonConsumer) are the best starting
//! points. Everything else - connection management, acknowledgements, retries -
//! is left to [`lapin`] and to the surrounding application.

pub mod consumers;
pub mod publishers;

pub mod amqp;
pub mod codec;
pub mod routing;
