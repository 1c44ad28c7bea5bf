use crate::codec::JsonValue;
use lapin::{
    acker::Acker,
    options::{BasicAckOptions, BasicNackOptions},
    types::{DeliveryTag, ShortString},
    BasicProperties,
};

/// A dequeued message, with its body decoded as JSON when the envelope allows.
///
/// `JsonDelivery` is the input type of message handlers (see
/// [`Handler`](crate::consumers::Handler)).
///
/// Acknowledgement stays with the caller: the library never acks or nacks on
/// your behalf, mirroring a plain AMQP consumer.
#[derive(Debug)]
pub struct JsonDelivery {
    /// The delivery tag of the message.
    pub delivery_tag: DeliveryTag,

    /// The exchange of the message. May be an empty string
    /// if the default exchange is used.
    pub exchange: ShortString,

    /// The routing key of the message. May be an empty string
    /// if no routing key is specified.
    pub routing_key: ShortString,

    /// Whether this message was redelivered.
    pub redelivered: bool,

    /// Contains the properties and the headers of the message.
    pub properties: BasicProperties,

    /// The payload of the message in binary format.
    pub data: Vec<u8>,

    /// The decoded payload.
    ///
    /// `Some` only if the message declared an `application/json` content type
    /// and its body parsed as JSON. `None` means the raw bytes in `data` are
    /// all you get - by design, a decode failure is not an error.
    pub json: Option<JsonValue>,

    // Hidden so a message cannot be acked through the raw acker *and* through
    // the `ack`/`nack` methods below. AMQP forbids acknowledging a delivery
    // tag twice: https://www.rabbitmq.com/amqp-0-9-1-reference.html#basic.ack.delivery-tag
    acker: Acker,
}

impl JsonDelivery {
    pub(crate) fn new(delivery: lapin::message::Delivery, json: Option<JsonValue>) -> Self {
        Self {
            delivery_tag: delivery.delivery_tag,
            exchange: delivery.exchange,
            routing_key: delivery.routing_key,
            redelivered: delivery.redelivered,
            properties: delivery.properties,
            data: delivery.data,
            json,
            acker: delivery.acker,
        }
    }

    /// Acknowledge the message with the broker.
    pub async fn ack(&self) -> Result<(), lapin::Error> {
        self.acker.ack(BasicAckOptions::default()).await
    }

    /// Negatively acknowledge the message, optionally asking the broker to
    /// requeue it.
    pub async fn nack(&self, requeue: bool) -> Result<(), lapin::Error> {
        self.acker
            .nack(BasicNackOptions {
                requeue,
                ..BasicNackOptions::default()
            })
            .await
    }
}
