//! # Fragment Channel
//!
//! Bounded single-producer/single-consumer FIFO between the producer task
//! and the HTTP body. The producer parks on `send` while the channel is
//! full, so a slow client throttles cursor reads instead of growing a
//! buffer.
//!
//! The sender is not `Clone`: the producer owns the only one, and the
//! stream ends exactly once, when that sender is dropped.

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Consumer half. Yields fragments in send order and ends after the
/// producer drops its [`FragmentSender`].
pub type FragmentStream = ReceiverStream<String>;

/// The consuming side hung up (client disconnected).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("fragment consumer went away")]
pub struct ConsumerGone;

/// Producer half of the fragment channel.
#[derive(Debug)]
pub struct FragmentSender {
    tx: mpsc::Sender<String>,
}

/// Create a channel holding at most `capacity` in-flight fragments.
/// A capacity of zero is raised to one.
pub fn fragment_channel(capacity: usize) -> (FragmentSender, FragmentStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (FragmentSender { tx }, ReceiverStream::new(rx))
}

impl FragmentSender {
    /// Send one fragment, waiting for room if the channel is full.
    pub async fn send(&self, fragment: String) -> Result<(), ConsumerGone> {
        self.tx.send(fragment).await.map_err(|_| ConsumerGone)
    }

    /// Send fragments in order, stopping at the first failure.
    pub async fn send_all(&self, fragments: Vec<String>) -> Result<(), ConsumerGone> {
        for fragment in fragments {
            self.send(fragment).await?;
        }
        Ok(())
    }

    /// Returns `true` once the consumer has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio_stream::StreamExt;

    #[tokio::test]
    async fn test_fragments_arrive_in_order_then_stream_ends() {
        let (tx, mut rx) = fragment_channel(4);
        tx.send_all(vec!["a".into(), "b".into(), "c".into()])
            .await
            .unwrap();
        drop(tx);

        let got: Vec<String> = (&mut rx).collect().await;
        assert_eq!(got, vec!["a", "b", "c"]);
        assert!(rx.next().await.is_none());
    }

    #[tokio::test]
    async fn test_send_blocks_while_full() {
        let (tx, mut rx) = fragment_channel(1);
        tx.send("first".into()).await.unwrap();

        let blocked = tokio::time::timeout(Duration::from_millis(50), tx.send("second".into())).await;
        assert!(blocked.is_err(), "send must wait for the consumer");

        assert_eq!(rx.next().await.as_deref(), Some("first"));
        tx.send("third".into()).await.unwrap();
        assert_eq!(rx.next().await.as_deref(), Some("third"));
    }

    #[tokio::test]
    async fn test_send_fails_once_consumer_is_gone() {
        let (tx, rx) = fragment_channel(2);
        drop(rx);
        assert!(tx.is_closed());
        assert_eq!(tx.send("x".into()).await, Err(ConsumerGone));
    }

    #[tokio::test]
    async fn test_zero_capacity_is_usable() {
        let (tx, mut rx) = fragment_channel(0);
        tx.send("x".into()).await.unwrap();
        assert_eq!(rx.next().await.as_deref(), Some("x"));
    }
}
