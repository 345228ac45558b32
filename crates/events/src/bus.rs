//! Event publishing/subscription abstraction (mechanics only).
//!
//! The authorization engine publishes a small set of state-change messages
//! (principal changed, permissions replaced, notifications changed). Consumers
//! either register a callback or take a channel [`Subscription`] and drain it
//! at their own pace.
//!
//! ## Delivery
//!
//! - **Synchronous**: every registered observer has seen the message before
//!   `publish` returns.
//! - **Ordered**: observers are invoked in registration order.
//! - **Best effort**: channel subscribers whose receiver was dropped are pruned
//!   on the next publish.

use std::sync::mpsc::Receiver;

/// A channel subscription to an event stream.
///
/// ## Usage Pattern
///
/// ```ignore
/// let subscription = observers.channel();
/// ctx.logout();
///
/// while let Ok(event) = subscription.try_recv() {
///     handle(event);
/// }
/// ```
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Block until the next message is available.
    pub fn recv(&self) -> Result<M, std::sync::mpsc::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a message without blocking.
    pub fn try_recv(&self) -> Result<M, std::sync::mpsc::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Drain everything currently queued.
    pub fn drain(&self) -> Vec<M> {
        self.receiver.try_iter().collect()
    }
}
