//! Transport seams consumed by the session driver

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{ProtocolError, Result};

/// Source of raw notifications from the device.
///
/// The driver races `next_notification` against queued commands, so
/// implementations must be cancel-safe: dropping the future before it
/// completes must not lose a notification.
#[async_trait]
pub trait NotificationSource: Send + 'static {
    /// Get the next raw notification
    ///
    /// Returns:
    /// - `Ok(Some(bytes))` - Notification received
    /// - `Ok(None)` - Stream ended (normal termination)
    /// - `Err(e)` - Transport failure
    async fn next_notification(&mut self) -> Result<Option<Vec<u8>>>;
}

/// Destination for serialized command frames.
#[async_trait]
pub trait CommandSink: Send + 'static {
    async fn write_frame(&mut self, frame: Vec<u8>) -> Result<()>;
}

/// Notifications fed through a tokio channel.
#[derive(Debug)]
pub struct ChannelSource {
    rx: mpsc::Receiver<Vec<u8>>,
}

impl ChannelSource {
    pub fn new(rx: mpsc::Receiver<Vec<u8>>) -> Self {
        Self { rx }
    }

    /// Create a source and the sender that feeds it.
    pub fn channel(capacity: usize) -> (mpsc::Sender<Vec<u8>>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self::new(rx))
    }
}

#[async_trait]
impl NotificationSource for ChannelSource {
    async fn next_notification(&mut self) -> Result<Option<Vec<u8>>> {
        Ok(self.rx.recv().await)
    }
}

/// Command frames written into a tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<Vec<u8>>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<Vec<u8>>) -> Self {
        Self { tx }
    }

    /// Create a sink and the receiver that observes written frames.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl CommandSink for ChannelSink {
    async fn write_frame(&mut self, frame: Vec<u8>) -> Result<()> {
        self.tx.send(frame).await.map_err(|_| ProtocolError::transport_failed("command receiver dropped"))
    }
}
