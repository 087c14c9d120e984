//! Notification publishing/subscription abstraction (mechanics only).
//!
//! The identity provider pushes lifecycle notifications; the session manager
//! consumes them. This module keeps that hand-off explicit: a [`Subscription`]
//! is an owned object with a receive side and an explicit `unsubscribe()`,
//! rather than an ambient listener registered somewhere global.
//!
//! ## Delivery
//!
//! - **Ordered per subscription**: messages arrive in publish order.
//! - **Unbounded**: publishing never blocks the provider.
//! - **No persistence**: a subscriber only sees messages published after it
//!   subscribed.

use std::sync::Arc;

use tokio::sync::mpsc;

/// A subscription to a notification stream.
///
/// ## Usage Pattern
///
/// ```ignore
/// let mut subscription = bus.subscribe();
///
/// while let Some(event) = subscription.recv().await {
///     consumer.dispatch(event).await;
/// }
/// ```
///
/// Dropping a subscription also detaches it; `unsubscribe()` makes the
/// teardown explicit at the call site.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: mpsc::UnboundedReceiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: mpsc::UnboundedReceiver<M>) -> Self {
        Self { receiver }
    }

    /// Wait for the next message. `None` once the publisher side is gone or
    /// the subscription was closed.
    pub async fn recv(&mut self) -> Option<M> {
        self.receiver.recv().await
    }

    /// Try to receive a message without waiting.
    pub fn try_recv(&mut self) -> Result<M, mpsc::error::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Stop receiving. Publishers observe the closed channel and drop this
    /// subscriber on their next publish.
    pub fn unsubscribe(mut self) {
        self.receiver.close();
    }
}

/// Pub/sub abstraction for lifecycle notifications.
///
/// Broadcast semantics: every live subscription gets its own copy of each
/// published message.
pub trait NotificationBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> NotificationBus<M> for Arc<B>
where
    B: NotificationBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}
