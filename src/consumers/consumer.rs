use crate::amqp::{Channel, Exchange, WITHOUT_PUBLISHER_CONFIRMATION};
use crate::codec;
use crate::consumers::{Handler, JsonDelivery};
use anyhow::Context;
use futures_util::{future::try_join_all, StreamExt};
use lapin::options::{BasicConsumeOptions, QueueDeclareOptions};
use lapin::types::{AMQPValue, FieldTable, ShortString};
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Idle expiry applied to temporary queues, in milliseconds.
///
/// A server-named queue with no consumer attached for this long is deleted by
/// the broker.
pub const TEMPORARY_QUEUE_EXPIRY_MS: u32 = 60_000;

/// Caller overrides for the computed queue declaration defaults.
///
/// Each field that is left as `None` falls back to the value derived from the
/// queue name (see [`ConsumerConfig`]); a `Some` always wins.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueueOverrides {
    /// Should the queue survive a broker restart?
    pub durable: Option<bool>,
    /// Should the broker delete the queue once its last consumer disconnects?
    pub auto_delete: Option<bool>,
    /// Idle expiry in milliseconds (`x-expires`).
    pub expires: Option<u32>,
}

/// The topology a [`JsonConsumer`] declares on setup.
///
/// A named queue is declared durable and long-lived; an unnamed one is
/// server-named, auto-deleting and expires after
/// [`TEMPORARY_QUEUE_EXPIRY_MS`] of inactivity. [`QueueOverrides`] can
/// override any of the computed values.
#[derive(Clone, Debug, Default)]
pub struct ConsumerConfig {
    queue_name: Option<String>,
    exchange: Option<Exchange>,
    binding_keys: Vec<String>,
    parse_dates: bool,
    overrides: QueueOverrides,
}

impl ConsumerConfig {
    /// Consume from a temporary, server-named queue.
    pub fn temporary() -> Self {
        Self::default()
    }

    /// Consume from the named queue, declaring it if needed.
    pub fn named(queue_name: impl Into<String>) -> Self {
        let queue_name: String = queue_name.into();
        Self {
            // An empty name means "let the server pick one", same as `temporary`.
            queue_name: (!queue_name.is_empty()).then_some(queue_name),
            ..Self::default()
        }
    }

    /// Declare `exchange` during setup and bind the queue to it.
    #[must_use]
    pub fn with_exchange(mut self, exchange: Exchange) -> Self {
        self.exchange = Some(exchange);
        self
    }

    /// Add a single binding key. Keys accumulate in the order they are added.
    #[must_use]
    pub fn with_binding_key(self, key: impl Into<String>) -> Self {
        self.with_binding_keys([key.into()])
    }

    /// Add a batch of binding keys, preserving their order.
    #[must_use]
    pub fn with_binding_keys<I>(mut self, keys: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.binding_keys.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Promote ISO-8601-looking strings to dates while decoding bodies.
    /// See [`codec::JsonValue`](crate::codec::JsonValue). Off by default.
    #[must_use]
    pub fn parse_dates(mut self, parse_dates: bool) -> Self {
        self.parse_dates = parse_dates;
        self
    }

    /// Override the computed queue declaration values.
    #[must_use]
    pub fn with_queue_overrides(mut self, overrides: QueueOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Resolve declaration defaults against caller overrides.
    fn queue_settings(&self) -> QueueSettings {
        let named = self.queue_name.is_some();
        QueueSettings {
            durable: self.overrides.durable.unwrap_or(named),
            auto_delete: self.overrides.auto_delete.unwrap_or(!named),
            expires: self
                .overrides
                .expires
                .or((!named).then_some(TEMPORARY_QUEUE_EXPIRY_MS)),
        }
    }
}

/// The fully resolved queue declaration.
#[derive(Debug, PartialEq, Eq)]
struct QueueSettings {
    durable: bool,
    auto_delete: bool,
    expires: Option<u32>,
}

impl QueueSettings {
    fn declare_options(&self) -> QueueDeclareOptions {
        QueueDeclareOptions {
            passive: false,
            durable: self.durable,
            exclusive: false,
            auto_delete: self.auto_delete,
            nowait: false,
        }
    }

    fn arguments(&self) -> FieldTable {
        let mut arguments = FieldTable::default();
        if let Some(expires) = self.expires {
            arguments.insert("x-expires".into(), AMQPValue::LongUInt(expires));
        }
        arguments
    }
}

/// A consumer-side handle: an owned channel plus the topology declared on it.
///
/// `JsonConsumer` is the replacement for decorating the raw channel with extra
/// methods - it wraps the channel and carries the derived metadata (assigned
/// queue name, exchange, binding keys) alongside it.
pub struct JsonConsumer {
    channel: Channel<WITHOUT_PUBLISHER_CONFIRMATION>,
    queue_name: String,
    exchange: Option<String>,
    binding_keys: Vec<String>,
    parse_dates: bool,
    consumer_tag: Option<ShortString>,
}

impl JsonConsumer {
    /// Declare the topology described by `config` on `channel` and return the
    /// ready-to-consume handle.
    ///
    /// Declaration order: queue first (recording the server-assigned name),
    /// then the exchange if one was requested, then one binding per key -
    /// bindings are issued concurrently, but the key order is preserved in the
    /// recorded metadata. Any broker failure aborts setup; nothing is retried.
    #[tracing::instrument(name = "consumer_setup", skip(channel, config))]
    pub async fn setup(
        channel: Channel<WITHOUT_PUBLISHER_CONFIRMATION>,
        config: ConsumerConfig,
    ) -> Result<JsonConsumer, anyhow::Error> {
        let settings = config.queue_settings();
        let queue = channel
            .declare_queue(
                config.queue_name.as_deref().unwrap_or(""),
                settings.declare_options(),
                settings.arguments(),
            )
            .await
            .context("Failed to declare the consumer queue.")?;
        let queue_name = queue.name().as_str().to_owned();

        let exchange = match &config.exchange {
            Some(exchange) => {
                channel
                    .declare_exchange(exchange)
                    .await
                    .with_context(|| format!("Failed to declare exchange '{}'.", exchange.name))?;
                Some(exchange.name.clone())
            }
            None => None,
        };

        let binding_keys = match &exchange {
            Some(exchange_name) if !config.binding_keys.is_empty() => {
                try_join_all(
                    config
                        .binding_keys
                        .iter()
                        .map(|key| channel.bind_queue(&queue_name, exchange_name, key)),
                )
                .await
                .with_context(|| {
                    format!("Failed to bind queue '{queue_name}' to exchange '{exchange_name}'.")
                })?;
                config.binding_keys
            }
            _ => Vec::new(),
        };

        Ok(JsonConsumer {
            channel,
            queue_name,
            exchange,
            binding_keys,
            parse_dates: config.parse_dates,
            consumer_tag: None,
        })
    }

    /// The queue this consumer reads from - server-assigned if the
    /// configuration did not name one.
    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// The exchange declared during setup, if any.
    pub fn exchange(&self) -> Option<&str> {
        self.exchange.as_deref()
    }

    /// Every binding key the queue was bound with, in declaration order.
    pub fn binding_keys(&self) -> &[String] {
        &self.binding_keys
    }

    /// The first binding key.
    ///
    /// Kept for callers ported from single-binding setups; prefer
    /// [`binding_keys`](Self::binding_keys).
    pub fn binding_key(&self) -> Option<&str> {
        self.binding_keys.first().map(String::as_str)
    }

    /// The tag assigned by the broker once consumption has started.
    pub fn consumer_tag(&self) -> Option<&ShortString> {
        self.consumer_tag.as_ref()
    }

    /// Get access to the underlying channel, e.g. to tear down the topology.
    pub fn channel(&self) -> &Channel<WITHOUT_PUBLISHER_CONFIRMATION> {
        &self.channel
    }

    /// Begin consumption with default consume options.
    pub async fn start_consuming<H: Handler>(
        &mut self,
        handler: H,
    ) -> Result<Subscription, lapin::Error> {
        self.start_consuming_with_options(handler, BasicConsumeOptions::default())
            .await
    }

    /// Begin consumption.
    ///
    /// Every delivery goes through the JSON decoding wrapper before reaching
    /// `handler`: bodies with an `application/json` content type are parsed
    /// (dates recognized if the configuration asked for it) and attached as
    /// [`JsonDelivery::json`]; anything else - including malformed JSON - is
    /// passed through undecoded.
    ///
    /// Each message is handled on its own task, so one slow or panicking
    /// handler invocation does not stall the delivery stream.
    #[tracing::instrument(name = "start_consuming", skip(self, handler, options), fields(queue_name = %self.queue_name))]
    pub async fn start_consuming_with_options<H: Handler>(
        &mut self,
        handler: H,
        options: BasicConsumeOptions,
    ) -> Result<Subscription, lapin::Error> {
        let mut consumer = self
            .channel
            .raw()
            .basic_consume(
                &self.queue_name,
                &Uuid::new_v4().to_string(),
                options,
                FieldTable::default(),
            )
            .await?;
        let consumer_tag = consumer.tag();
        self.consumer_tag = Some(consumer_tag.clone());

        let parse_dates = self.parse_dates;
        let handler: Arc<dyn Handler> = Arc::new(handler);
        let task = tokio::spawn(async move {
            while let Some(event) = consumer.next().await {
                match event {
                    Ok(delivery) => {
                        let json = codec::decode_body(&delivery.properties, &delivery.data, parse_dates);
                        let message = JsonDelivery::new(delivery, json);
                        let handler = handler.clone();
                        tokio::spawn(async move {
                            handler.handle(message).await;
                        });
                    }
                    Err(e) => {
                        tracing::error!("Consumer error: {}", e);
                        break;
                    }
                }
            }
        });

        Ok(Subscription { consumer_tag, task })
    }
}

/// A live subscription returned by [`JsonConsumer::start_consuming`].
pub struct Subscription {
    consumer_tag: ShortString,
    task: JoinHandle<()>,
}

impl Subscription {
    /// The consumer tag assigned by the broker.
    pub fn consumer_tag(&self) -> &ShortString {
        &self.consumer_tag
    }

    /// Wait for the delivery stream to end - i.e. for the consumer to be
    /// cancelled or the channel to close.
    pub async fn join(self) -> Result<(), tokio::task::JoinError> {
        self.task.await
    }
}

#[cfg(test)]
mod tests {
    use super::{ConsumerConfig, QueueOverrides, QueueSettings, TEMPORARY_QUEUE_EXPIRY_MS};
    use fake::{Fake, Faker};
    use lapin::types::{AMQPValue, ShortString};

    #[test]
    fn temporary_queues_are_transient_and_expire() {
        let settings = ConsumerConfig::temporary().queue_settings();

        assert_eq!(
            settings,
            QueueSettings {
                durable: false,
                auto_delete: true,
                expires: Some(TEMPORARY_QUEUE_EXPIRY_MS),
            }
        );
    }

    #[test]
    fn named_queues_are_durable_without_expiry() {
        let queue_name: String = Faker.fake();
        let settings = ConsumerConfig::named(queue_name).queue_settings();

        assert_eq!(
            settings,
            QueueSettings {
                durable: true,
                auto_delete: false,
                expires: None,
            }
        );
    }

    #[test]
    fn an_empty_queue_name_means_temporary() {
        let named = ConsumerConfig::named("").queue_settings();
        let temporary = ConsumerConfig::temporary().queue_settings();

        assert_eq!(named, temporary);
    }

    #[test]
    fn explicit_overrides_always_win() {
        let settings = ConsumerConfig::named("test-queue")
            .with_queue_overrides(QueueOverrides {
                durable: Some(false),
                auto_delete: Some(true),
                expires: Some(5000),
            })
            .queue_settings();

        assert_eq!(
            settings,
            QueueSettings {
                durable: false,
                auto_delete: true,
                expires: Some(5000),
            }
        );
    }

    #[test]
    fn partial_overrides_keep_the_remaining_defaults() {
        let settings = ConsumerConfig::temporary()
            .with_queue_overrides(QueueOverrides {
                expires: Some(1000),
                ..QueueOverrides::default()
            })
            .queue_settings();

        assert_eq!(
            settings,
            QueueSettings {
                durable: false,
                auto_delete: true,
                expires: Some(1000),
            }
        );
    }

    #[test]
    fn expiry_is_declared_via_the_x_expires_argument() {
        let settings = ConsumerConfig::temporary().queue_settings();
        let arguments = settings.arguments();

        let key: ShortString = "x-expires".into();
        assert_eq!(
            arguments.inner().get(&key),
            Some(&AMQPValue::LongUInt(TEMPORARY_QUEUE_EXPIRY_MS))
        );

        let options = settings.declare_options();
        assert!(!options.durable);
        assert!(options.auto_delete);
    }

    #[test]
    fn named_queues_declare_no_arguments() {
        let settings = ConsumerConfig::named("orders").queue_settings();

        assert!(settings.arguments().inner().is_empty());
    }

    #[test]
    fn binding_keys_accumulate_in_order() {
        let config = ConsumerConfig::temporary()
            .with_binding_key("foo")
            .with_binding_keys(["bar", "baz"]);

        assert_eq!(config.binding_keys, vec!["foo", "bar", "baz"]);
    }
}
