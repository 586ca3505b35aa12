//! Readiness notifications from the sink to its writers.
//!
//! Edge-triggered: one `ReadyToReceive` per transition into the accepting
//! phase, delivered to every live subscription. A subscription ends when
//! it is cancelled or when the sink shuts down.

use tokio::sync::mpsc;
use tracing::debug;

/// "You may attempt a flush now."
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadyToReceive;

/// Sender side, owned by the sink.
#[derive(Debug, Default)]
pub(crate) struct ReadinessHub {
    subscribers: Vec<mpsc::UnboundedSender<ReadyToReceive>>,
}

impl ReadinessHub {
    pub(crate) fn subscribe(&mut self) -> ReadinessSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        ReadinessSubscription { rx: Some(rx) }
    }

    /// Notify every live subscription, pruning cancelled ones.
    ///
    /// Returns the number of subscriptions notified.
    pub(crate) fn notify(&mut self) -> usize {
        self.subscribers.retain(|tx| tx.send(ReadyToReceive).is_ok());
        self.subscribers.len()
    }

    /// Drop every sender; subscribers see the end of the stream.
    pub(crate) fn close(&mut self) {
        self.subscribers.clear();
    }

    pub(crate) fn live(&self) -> usize {
        self.subscribers.iter().filter(|tx| !tx.is_closed()).count()
    }
}

/// Receiver side, held by a writer.
#[derive(Debug)]
pub struct ReadinessSubscription {
    rx: Option<mpsc::UnboundedReceiver<ReadyToReceive>>,
}

impl ReadinessSubscription {
    /// Wait for the next notification.
    ///
    /// Returns `None` once the subscription is cancelled or the sink has
    /// shut down. Cancel-safe.
    pub async fn recv(&mut self) -> Option<ReadyToReceive> {
        match self.rx.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<ReadyToReceive> {
        self.rx.as_mut()?.try_recv().ok()
    }

    /// Stop receiving. Notifications already queued are discarded.
    pub fn cancel(&mut self) {
        if self.rx.take().is_some() {
            debug!("readiness subscription cancelled");
        }
    }

    pub fn is_active(&self) -> bool {
        self.rx.is_some()
    }
}
