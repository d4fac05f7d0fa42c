//! Bounded buffer ports between adjacent filters.
//!
//! Buffer hand-off is push-based with a bounded queue per edge: a producer
//! blocks when the downstream queue is full (backpressure, never a silent
//! drop) and a consumer blocks when empty. Both sides offer non-blocking
//! and bounded-wait variants, and [`PortSender::close`]/[`PortReceiver::close`]
//! unblock all waiters promptly with [`Error::Cancelled`] so a stop or
//! reset never leaves a thread hanging on a queue.

use crate::buffer::Buffer;
use crate::error::{Error, Result};
use kanal::{bounded_async, AsyncReceiver, AsyncSender};
use std::time::Duration;

/// Message passed through a port.
#[derive(Debug)]
pub enum PortMsg {
    /// A data buffer.
    Buffer(Buffer),
    /// End of stream signal.
    Eos,
}

/// Create a connected port with the given queue capacity.
pub fn port(capacity: usize) -> (PortSender, PortReceiver) {
    let (tx, rx) = bounded_async::<PortMsg>(capacity);
    (PortSender { tx }, PortReceiver { rx })
}

/// Producer side of a port.
#[derive(Clone)]
pub struct PortSender {
    tx: AsyncSender<PortMsg>,
}

impl PortSender {
    /// Send a message, waiting while the queue is full.
    ///
    /// Fails with [`Error::Cancelled`] if the port is closed.
    pub async fn send(&self, msg: PortMsg) -> Result<()> {
        self.tx.send(msg).await.map_err(|_| Error::Cancelled)
    }

    /// Try to send without waiting.
    ///
    /// Returns `Ok(None)` when the message was accepted, or gives the
    /// message back as `Ok(Some(msg))` when the queue is full.
    pub fn try_send(&self, msg: PortMsg) -> Result<Option<PortMsg>> {
        let mut slot = Some(msg);
        match self.tx.as_sync().try_send_option(&mut slot) {
            Ok(true) => Ok(None),
            Ok(false) => Ok(slot),
            Err(_) => Err(Error::Cancelled),
        }
    }

    /// Send with a wait bound. Fails with [`Error::Timeout`] when the
    /// queue stays full past the deadline.
    pub async fn send_timeout(&self, msg: PortMsg, timeout: Duration) -> Result<()> {
        match tokio::time::timeout(timeout, self.tx.send(msg)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(Error::Cancelled),
            Err(_) => Err(Error::Timeout),
        }
    }

    /// Close the port, unblocking all waiters with [`Error::Cancelled`].
    pub fn close(&self) {
        self.tx.close();
    }
}

/// Consumer side of a port.
pub struct PortReceiver {
    rx: AsyncReceiver<PortMsg>,
}

impl PortReceiver {
    /// Receive a message, waiting while the queue is empty.
    ///
    /// Fails with [`Error::Cancelled`] if the port is closed.
    pub async fn recv(&self) -> Result<PortMsg> {
        self.rx.recv().await.map_err(|_| Error::Cancelled)
    }

    /// Try to receive without waiting. `Ok(None)` means the queue is
    /// currently empty.
    pub fn try_recv(&self) -> Result<Option<PortMsg>> {
        self.rx.as_sync().try_recv().map_err(|_| Error::Cancelled)
    }

    /// Receive with a wait bound. Fails with [`Error::Timeout`] when the
    /// queue stays empty past the deadline.
    pub async fn recv_timeout(&self, timeout: Duration) -> Result<PortMsg> {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Ok(msg)) => Ok(msg),
            Ok(Err(_)) => Err(Error::Cancelled),
            Err(_) => Err(Error::Timeout),
        }
    }

    /// Close the port, unblocking all waiters with [`Error::Cancelled`].
    pub fn close(&self) {
        self.rx.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn buf(pts: i64) -> PortMsg {
        PortMsg::Buffer(Buffer::empty().with_pts(pts))
    }

    #[tokio::test]
    async fn test_send_recv() {
        let (tx, rx) = port(4);
        tx.send(buf(1)).await.unwrap();
        tx.send(PortMsg::Eos).await.unwrap();

        assert!(matches!(rx.recv().await.unwrap(), PortMsg::Buffer(_)));
        assert!(matches!(rx.recv().await.unwrap(), PortMsg::Eos));
    }

    #[tokio::test]
    async fn test_try_send_full_returns_message() {
        let (tx, _rx) = port(1);
        assert!(tx.try_send(buf(1)).unwrap().is_none());
        // Queue depth 1: second message bounces back instead of dropping.
        let bounced = tx.try_send(buf(2)).unwrap();
        match bounced {
            Some(PortMsg::Buffer(b)) => assert_eq!(b.pts(), Some(2)),
            other => panic!("expected bounced buffer, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_try_recv_empty() {
        let (tx, rx) = port(1);
        assert!(rx.try_recv().unwrap().is_none());
        tx.send(buf(7)).await.unwrap();
        assert!(rx.try_recv().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_backpressure_blocks_until_drained() {
        let (tx, rx) = port(1);
        tx.send(buf(1)).await.unwrap();

        let sent_second = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&sent_second);
        let producer = tokio::spawn(async move {
            tx.send(buf(2)).await.unwrap();
            flag.store(true, Ordering::SeqCst);
        });

        // Producer must be blocked on the full queue.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!sent_second.load(Ordering::SeqCst));

        // Draining one slot lets it proceed.
        rx.recv().await.unwrap();
        producer.await.unwrap();
        assert!(sent_second.load(Ordering::SeqCst));
        assert!(matches!(rx.recv().await.unwrap(), PortMsg::Buffer(_)));
    }

    #[tokio::test]
    async fn test_recv_timeout() {
        let (_tx, rx) = port(1);
        let err = rx.recv_timeout(Duration::from_millis(10)).await.unwrap_err();
        assert!(matches!(err, Error::Timeout));
    }

    #[tokio::test]
    async fn test_send_timeout_on_full_queue() {
        let (tx, _rx) = port(1);
        tx.send(buf(1)).await.unwrap();
        let err = tx
            .send_timeout(buf(2), Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout));
    }

    #[tokio::test]
    async fn test_close_unblocks_receiver() {
        let (tx, rx) = port(1);

        let waiter = tokio::spawn(async move { rx.recv().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        tx.close();

        let result = tokio::time::timeout(Duration::from_millis(100), waiter)
            .await
            .expect("receiver did not unblock")
            .unwrap();
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_close_unblocks_sender() {
        let (tx, rx) = port(1);
        tx.send(buf(1)).await.unwrap();

        let blocked_tx = tx.clone();
        let waiter = tokio::spawn(async move { blocked_tx.send(buf(2)).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        rx.close();

        let result = tokio::time::timeout(Duration::from_millis(100), waiter)
            .await
            .expect("sender did not unblock")
            .unwrap();
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
