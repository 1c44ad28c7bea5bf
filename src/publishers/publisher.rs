use crate::amqp::{Channel, Exchange, RabbitMqPublishError, WITH_PUBLISHER_CONFIRMATION};
use crate::publishers::EnvelopeOptions;
use crate::routing;
use anyhow::Context;
use serde::Serialize;

/// A publisher-side handle: a confirm-mode channel, the exchange declared on
/// it and the routing-key template applied to every outgoing payload.
///
/// # Routing
///
/// The routing key of each message is derived from the message itself by
/// rendering the configured template against the payload - see
/// [`routing::render`]. A payload `{"b": {"c": "bee"}}` published with the
/// template `a.{{b.c}}.d` goes out with the routing key `a.bee.d`.
///
/// # Fault tolerance
///
/// Publish failures (closed channel, broker nack, unroutable message) are
/// reported to the caller as-is; the library performs no internal retries.
pub struct JsonPublisher {
    channel: Channel<WITH_PUBLISHER_CONFIRMATION>,
    exchange: String,
    template: String,
    defaults: EnvelopeOptions,
}

impl JsonPublisher {
    /// Declare `exchange` on `channel` and return the ready-to-publish handle.
    ///
    /// `options` become the default envelope properties for every publish;
    /// per-call overrides can be supplied via
    /// [`publish_object_with_options`](Self::publish_object_with_options).
    #[tracing::instrument(name = "publisher_setup", skip(channel, template, options))]
    pub async fn setup(
        channel: Channel<WITH_PUBLISHER_CONFIRMATION>,
        exchange: Exchange,
        template: impl Into<String>,
        options: EnvelopeOptions,
    ) -> Result<JsonPublisher, anyhow::Error> {
        channel
            .declare_exchange(&exchange)
            .await
            .with_context(|| format!("Failed to declare exchange '{}'.", exchange.name))?;
        Ok(JsonPublisher {
            channel,
            exchange: exchange.name,
            template: template.into(),
            defaults: options,
        })
    }

    /// The exchange messages are published to.
    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    /// The routing-key template rendered against each payload.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Get access to the underlying channel.
    pub fn channel(&self) -> &Channel<WITH_PUBLISHER_CONFIRMATION> {
        &self.channel
    }

    /// Publish `payload` as a JSON message, waiting for the broker's
    /// confirmation.
    pub async fn publish_object<T: Serialize>(&self, payload: &T) -> Result<(), PublishError> {
        self.publish_object_with_options(payload, EnvelopeOptions::default())
            .await
    }

    /// Publish `payload` as a JSON message with per-call property overrides.
    ///
    /// The routing key is rendered from the payload, the body is the UTF-8
    /// JSON serialization of the payload, and `overrides` win over the
    /// configured envelope defaults field by field.
    #[tracing::instrument(
        name = "publish_object",
        skip(self, payload, overrides),
        fields(exchange = %self.exchange)
    )]
    pub async fn publish_object_with_options<T: Serialize>(
        &self,
        payload: &T,
        overrides: EnvelopeOptions,
    ) -> Result<(), PublishError> {
        let (routing_key, body) = encode_payload(&self.template, payload)?;
        let properties = self.defaults.clone().merge(overrides).into_properties();
        self.channel
            .publish(body, &self.exchange, &routing_key, properties)
            .await
            .map_err(Into::into)
    }
}

/// Derive the routing key and wire body for a payload.
fn encode_payload<T: Serialize>(
    template: &str,
    payload: &T,
) -> Result<(String, Vec<u8>), PublishError> {
    let value = serde_json::to_value(payload).map_err(PublishError::Serialization)?;
    let routing_key = routing::render(template, &value);
    let body = serde_json::to_vec(&value).map_err(PublishError::Serialization)?;
    Ok((routing_key, body))
}

/// Error returned when trying to publish a message via [`JsonPublisher`].
#[derive(thiserror::Error, Debug)]
pub enum PublishError {
    #[error("Failed to serialize the payload as JSON")]
    Serialization(#[source] serde_json::Error),
    #[error(transparent)]
    Broker(#[from] RabbitMqPublishError),
}

#[cfg(test)]
mod tests {
    use super::encode_payload;
    use serde::Serialize;
    use serde_json::json;

    #[test]
    fn the_routing_key_is_rendered_from_the_payload() {
        let payload = json!({"b": {"c": "bee"}, "c": "sea", "d": "die"});

        let (routing_key, body) = encode_payload("a.{{b.c}}.d", &payload).unwrap();

        assert_eq!(routing_key, "a.bee.d");
        assert_eq!(
            serde_json::from_slice::<serde_json::Value>(&body).unwrap(),
            payload
        );
    }

    #[test]
    fn typed_payloads_serialize_like_their_json_form() {
        #[derive(Serialize)]
        struct Event {
            kind: String,
            amount: u32,
        }

        let event = Event {
            kind: "payment".into(),
            amount: 12,
        };

        let (routing_key, body) = encode_payload("events.{{kind}}", &event).unwrap();

        assert_eq!(routing_key, "events.payment");
        assert_eq!(
            serde_json::from_slice::<serde_json::Value>(&body).unwrap(),
            serde_json::json!({"kind": "payment", "amount": 12})
        );
    }
}
