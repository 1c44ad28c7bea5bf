//! Abstractions on top of [`lapin`]'s `Channel` and `Connection`.
//!
//! The confirmation behaviour of a channel is tracked at the type level:
//! [`JsonPublisher`](crate::publishers::JsonPublisher) only accepts a
//! [`Channel<WITH_PUBLISHER_CONFIRMATION>`], so forgetting to enable publisher
//! confirms is a compile-time error rather than a silent message drop.

use lapin::{
    message::BasicReturnMessage,
    options::{
        BasicPublishOptions, ConfirmSelectOptions, ExchangeDeclareOptions, ExchangeDeleteOptions,
        QueueBindOptions, QueueDeclareOptions, QueueDeleteOptions,
    },
    publisher_confirm::Confirmation,
    types::FieldTable,
    BasicProperties, ExchangeKind, Queue,
};

pub const WITH_PUBLISHER_CONFIRMATION: bool = true;
pub const WITHOUT_PUBLISHER_CONFIRMATION: bool = false;

/// A connection to a RabbitMq broker.
///
/// Connections should be re-used across multiple channels given the initial setup cost.
pub struct Connection(lapin::Connection);

/// A RabbitMq channel, parametrised via a type to distinguish its confirmation settings.
pub struct Channel<const CONFIRMATION: bool>(lapin::Channel);

impl<const CONFIRMATION: bool> Clone for Channel<{ CONFIRMATION }> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// The exchange a consumer binds to or a publisher publishes to.
///
/// Topic is the default kind, matching the dot-delimited routing keys produced
/// by [`routing::render`](crate::routing::render).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Exchange {
    pub name: String,
    pub kind: ExchangeKind,
}

impl Exchange {
    /// A topic exchange with the given name.
    pub fn topic(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ExchangeKind::Topic,
        }
    }

    /// An exchange with an explicit kind.
    pub fn new(name: impl Into<String>, kind: ExchangeKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

impl Connection {
    pub(crate) fn new(connection: lapin::Connection) -> Self {
        Self(connection)
    }

    #[tracing::instrument(name = "rabbitmq_create_channel", skip(self))]
    pub async fn create_channel<const CONFIRMATION: bool>(
        &self,
    ) -> Result<Channel<CONFIRMATION>, lapin::Error> {
        let channel = self.0.create_channel().await?;

        if CONFIRMATION {
            // Enable publish confirms on the channel
            // See https://www.rabbitmq.com/amqp-0-9-1-reference.html#confirm.select.nowait
            channel
                .confirm_select(ConfirmSelectOptions { nowait: false })
                .await?;
        }

        Ok(Channel(channel))
    }

    pub fn status(&self) -> HealthStatus {
        if self.0.status().connected() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        }
    }

    pub fn raw(self) -> lapin::Connection {
        self.0
    }
}

impl AsRef<lapin::Connection> for Connection {
    fn as_ref(&self) -> &lapin::Connection {
        &self.0
    }
}

/// Error returned when trying to publish a message via RabbitMq.
#[derive(thiserror::Error, Debug)]
pub enum RabbitMqPublishError {
    #[error("Generic error encountered when interacting with the RabbitMq broker")]
    GenericError(#[source] lapin::Error),
    #[error("The message could not be routed: {0:?}")]
    UnroutableMessage(Box<BasicReturnMessage>),
    #[error("The RabbitMq broker nacked the publishing of the message: {0:?}")]
    NegativeAck(Option<Box<BasicReturnMessage>>),
}

/// Shared methods whose behaviour does not depend on having publisher confirms enabled or disabled.
impl<const CONFIRMATION: bool> Channel<{ CONFIRMATION }> {
    /// Get access to the underlying raw channel.
    pub fn raw(&self) -> &lapin::Channel {
        &self.0
    }

    /// Declare a RabbitMq exchange. Durable, so it survives broker restarts.
    #[tracing::instrument(name = "rabbitmq_declare_exchange", skip(self))]
    pub async fn declare_exchange(&self, exchange: &Exchange) -> Result<(), lapin::Error> {
        let options = ExchangeDeclareOptions {
            passive: false,
            durable: true,
            auto_delete: false,
            internal: false,
            nowait: false,
        };
        self.0
            .exchange_declare(
                &exchange.name,
                exchange.kind.clone(),
                options,
                FieldTable::default(),
            )
            .await
    }

    /// Declare a RabbitMq queue.
    ///
    /// An empty `queue` name asks the broker to generate one; the assigned name
    /// is available on the returned [`Queue`].
    #[tracing::instrument(name = "rabbitmq_declare_queue", skip(self, arguments))]
    pub async fn declare_queue(
        &self,
        queue: &str,
        options: QueueDeclareOptions,
        arguments: FieldTable,
    ) -> Result<Queue, lapin::Error> {
        self.0.queue_declare(queue, options, arguments).await
    }

    /// Bind a queue to an exchange.
    #[tracing::instrument(name = "rabbitmq_bind_queue", skip(self))]
    pub async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), lapin::Error> {
        let options = QueueBindOptions { nowait: false };
        self.0
            .queue_bind(queue, exchange, routing_key, options, FieldTable::default())
            .await?;
        Ok(())
    }

    /// Unbind a queue from an exchange.
    #[tracing::instrument(name = "rabbitmq_unbind_queue", skip(self))]
    pub async fn unbind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), lapin::Error> {
        self.0
            .queue_unbind(queue, exchange, routing_key, FieldTable::default())
            .await?;
        Ok(())
    }

    /// Delete a queue.
    #[tracing::instrument(name = "rabbitmq_delete_queue", skip(self))]
    pub async fn delete_queue(&self, queue: &str) -> Result<(), lapin::Error> {
        self.0
            .queue_delete(queue, QueueDeleteOptions::default())
            .await?;
        Ok(())
    }

    /// Delete an exchange.
    #[tracing::instrument(name = "rabbitmq_delete_exchange", skip(self))]
    pub async fn delete_exchange(&self, exchange: &str) -> Result<(), lapin::Error> {
        self.0
            .exchange_delete(exchange, ExchangeDeleteOptions::default())
            .await?;
        Ok(())
    }

    pub fn status(&self) -> HealthStatus {
        if self.0.status().connected() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        }
    }
}

impl<const PUBLISHER_CONFIRMATION: bool> Channel<{ PUBLISHER_CONFIRMATION }> {
    /// Publish a payload on a RabbitMq exchange, waiting for publisher
    /// confirmation from the broker when the channel has confirms enabled.
    #[tracing::instrument(level = "debug", skip(self, payload, properties))]
    pub async fn publish(
        &self,
        payload: Vec<u8>,
        exchange: &str,
        routing_key: &str,
        properties: BasicProperties,
    ) -> Result<(), RabbitMqPublishError> {
        let options = BasicPublishOptions {
            // This flag tells the server how to react if the message cannot be routed to a queue.
            // If this flag is `true`, the server will return an unroutable message with a Return method.
            // If this flag is `false`, the server silently drops the message.
            mandatory: PUBLISHER_CONFIRMATION,
            // The immediate flag was dropped in RabbitMQ 3.0 - see https://www.rabbitmq.com/blog/2012/11/19/breaking-things-with-rabbitmq-3-0/
            // Setting `true` will cause a not-supported error
            immediate: false,
        };
        // Delivery mode: Non-persistent (1) or persistent (2).
        let properties = properties.with_delivery_mode(2);
        let confirm = self
            .0
            .basic_publish(exchange, routing_key, options, &payload, properties)
            .await
            .map_err(RabbitMqPublishError::GenericError)?
            .await
            .map_err(RabbitMqPublishError::GenericError)?;

        if !PUBLISHER_CONFIRMATION {
            return Ok(());
        }
        match confirm {
            Confirmation::Ack(ack) => {
                if let Some(return_message) = ack {
                    // Reply Code 312 - NO_ROUTE
                    // See https://www.rabbitmq.com/amqp-0-9-1-reference.html
                    if return_message.reply_code == 312 {
                        return Err(RabbitMqPublishError::UnroutableMessage(return_message));
                    }
                }
                Ok(())
            }
            Confirmation::Nack(nack) => Err(RabbitMqPublishError::NegativeAck(nack)),
            Confirmation::NotRequested => {
                unreachable!("A confirm-mode channel requires ack/nack on publish.")
            }
        }
    }
}

impl Channel<WITHOUT_PUBLISHER_CONFIRMATION> {
    /// Enable publisher confirmation on the underlying AMQP channel.
    #[tracing::instrument(skip(self))]
    pub async fn enable_publisher_confirmation(
        self,
    ) -> Result<Channel<WITH_PUBLISHER_CONFIRMATION>, lapin::Error> {
        self.0
            .confirm_select(ConfirmSelectOptions { nowait: false })
            .await?;
        Ok(Channel(self.0))
    }
}
