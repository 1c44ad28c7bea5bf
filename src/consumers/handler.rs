use crate::consumers::JsonDelivery;
use std::future::Future;

/// Implementers of `Handler` process messages delivered by a
/// [`JsonConsumer`](crate::consumers::JsonConsumer).
///
/// # Scope
///
/// The handler receives the full [`JsonDelivery`], decoded payload included
/// when the envelope allowed it, and is responsible for acking or nacking the
/// message. The library does not impose a retry policy.
///
/// # Implementers
///
/// While you can implement `Handler` for a struct or enum, most of the time
/// you will rely on the blanket implementation for async functions with a
/// matching signature - `Fn(JsonDelivery) -> Fut`.
#[async_trait::async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, message: JsonDelivery);
}

// Implement the Handler trait for all async functions that match our expected signature.
#[async_trait::async_trait]
impl<F, Fut> Handler for F
where
    F: Fn(JsonDelivery) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn handle(&self, message: JsonDelivery) {
        (self)(message).await
    }
}
