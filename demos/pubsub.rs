//! Publish a JSON payload and watch it come back through a temporary queue.
//!
//! Requires a RabbitMq broker on localhost (e.g. the official Docker image).
use amqp_json::amqp::configuration::RabbitMqSettings;
use amqp_json::amqp::{
    ConnectionFactory, Exchange, WITHOUT_PUBLISHER_CONFIRMATION, WITH_PUBLISHER_CONFIRMATION,
};
use amqp_json::consumers::{ConsumerConfig, JsonConsumer, JsonDelivery};
use amqp_json::publishers::{EnvelopeOptions, JsonPublisher};
use serde_json::json;

const EXCHANGE: &str = "amqp-json-demo";

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let factory = ConnectionFactory::new_from_config(&RabbitMqSettings::default())?;
    let connection = factory.new_connection().await?;

    let mut consumer = JsonConsumer::setup(
        connection
            .create_channel::<WITHOUT_PUBLISHER_CONFIRMATION>()
            .await?,
        ConsumerConfig::temporary()
            .with_exchange(Exchange::topic(EXCHANGE))
            .with_binding_key("*.bee.*")
            .parse_dates(true),
    )
    .await?;
    println!("consuming from temporary queue '{}'", consumer.queue_name());

    let subscription = consumer
        .start_consuming(|message: JsonDelivery| async move {
            match &message.json {
                Some(json) => println!("[{}] decoded: {json:?}", message.routing_key),
                None => println!("[{}] no JSON payload attached", message.routing_key),
            }
            if let Err(e) = message.ack().await {
                eprintln!("failed to ack: {e}");
            }
        })
        .await?;
    println!("consumer tag: {}", subscription.consumer_tag());

    let publisher = JsonPublisher::setup(
        connection
            .create_channel::<WITH_PUBLISHER_CONFIRMATION>()
            .await?,
        Exchange::topic(EXCHANGE),
        "a.{{b.c}}.d",
        EnvelopeOptions::default(),
    )
    .await?;

    // Routed as `a.bee.d`, which the `*.bee.*` binding matches.
    publisher
        .publish_object(&json!({"b": {"c": "bee"}, "c": "sea", "d": "die"}))
        .await?;

    tokio::time::sleep(std::time::Duration::from_millis(500)).await;

    let channel = consumer.channel().clone();
    channel.delete_queue(consumer.queue_name()).await?;
    channel.delete_exchange(EXCHANGE).await?;
    Ok(())
}
