//! Helpers for connecting to a RabbitMq broker.

pub mod configuration;
mod factory;

mod channel;
pub use channel::{
    Channel, Connection, Exchange, HealthStatus, RabbitMqPublishError,
    WITHOUT_PUBLISHER_CONFIRMATION, WITH_PUBLISHER_CONFIRMATION,
};
pub use factory::ConnectionFactory;

pub use lapin::{options, types, BasicProperties, ExchangeKind};
