//! Subscriber handle returned by [`super::Transport::subscribe`].

use super::envelope::Envelope;
use crate::error::{Error, Result};
use tokio::sync::broadcast;
use tracing::warn;

/// A live attachment to one subject's broadcast channel.
///
/// `next()` suspends cooperatively until a message arrives or the
/// transport closes the channel. A subscriber that falls more than 1024
/// messages behind on its subject loses the intervening messages — this is
/// NOT surfaced as an error to the producer; `next()` transparently skips
/// past the gap and returns the next still-buffered message.
pub struct Subscription {
    pub(super) subject: String,
    pub(super) receiver: broadcast::Receiver<Envelope>,
}

impl Subscription {
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Suspends until a message is available or the transport closes.
    pub async fn next(&mut self) -> Result<Envelope> {
        loop {
            match self.receiver.recv().await {
                Ok(envelope) => return Ok(envelope),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        subject = %self.subject,
                        skipped,
                        "subscriber fell behind, intervening messages dropped"
                    );
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(Error::transport_publish("transport closed"));
                }
            }
        }
    }

    /// No-op for the in-memory transport; durable transports use this to
    /// advance delivery state.
    pub fn ack(&self, _sequence: u64) {}

    /// Detaches from the subject. Dropping the `Subscription` has the same
    /// effect.
    pub fn unsubscribe(self) {}
}
