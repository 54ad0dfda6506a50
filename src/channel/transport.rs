use anyhow::{Context, Result};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use super::messages::{EVENT_CONNECT, EVENT_DISCONNECT};

/// One event received from the inference service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub event: String,
    pub payload: Vec<u8>,
}

impl InboundMessage {
    pub fn new(event: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            event: event.into(),
            payload: payload.into(),
        }
    }

    /// A payload-less `connect` / `disconnect` notification
    pub fn lifecycle(event: &str) -> Self {
        Self::new(event, Vec::new())
    }
}

/// Event-based bidirectional wire
///
/// Implementations deliver inbound events, including `connect` and
/// `disconnect` lifecycle notifications, in arrival order on the receiver
/// returned by `open`.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Establish the connection
    async fn open(&self, endpoint: &str) -> Result<mpsc::Receiver<InboundMessage>>;

    /// Transmit a serialized payload under an event name
    async fn emit(&self, event: &str, payload: String) -> Result<()>;

    /// Tear the connection down
    async fn close(&self) -> Result<()>;

    /// Transport name for logging
    fn name(&self) -> &str;
}

/// In-process transport: records what is emitted, lets the caller inject replies
#[derive(Debug, Default)]
pub struct MemoryTransport {
    emitted: Mutex<Vec<(String, String)>>,
    inbound: Mutex<Option<mpsc::Sender<InboundMessage>>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything emitted so far, as `(event, payload)` pairs
    pub fn emitted(&self) -> Vec<(String, String)> {
        self.emitted
            .lock()
            .map(|emitted| emitted.clone())
            .unwrap_or_default()
    }

    /// Deliver an event as if the remote side had sent it
    pub async fn inject(&self, event: &str, payload: impl Into<Vec<u8>>) -> Result<()> {
        let sender = self
            .inbound
            .lock()
            .map_err(|_| anyhow::anyhow!("Memory transport lock poisoned"))?
            .clone()
            .context("Memory transport is not open")?;

        sender
            .send(InboundMessage::new(event, payload))
            .await
            .context("Inbound receiver dropped")
    }
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    async fn open(&self, endpoint: &str) -> Result<mpsc::Receiver<InboundMessage>> {
        let (tx, rx) = mpsc::channel(64);
        tx.send(InboundMessage::lifecycle(EVENT_CONNECT))
            .await
            .context("Inbound receiver dropped")?;

        *self
            .inbound
            .lock()
            .map_err(|_| anyhow::anyhow!("Memory transport lock poisoned"))? = Some(tx);

        debug!("Memory transport opened for {}", endpoint);
        Ok(rx)
    }

    async fn emit(&self, event: &str, payload: String) -> Result<()> {
        self.emitted
            .lock()
            .map_err(|_| anyhow::anyhow!("Memory transport lock poisoned"))?
            .push((event.to_string(), payload));
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let sender = self
            .inbound
            .lock()
            .map_err(|_| anyhow::anyhow!("Memory transport lock poisoned"))?
            .take();

        if let Some(sender) = sender {
            // Receiver may already be gone during teardown
            let _ = sender.send(InboundMessage::lifecycle(EVENT_DISCONNECT)).await;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
