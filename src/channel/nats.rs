use anyhow::{Context, Result};
use async_nats::Client;
use futures::stream::StreamExt;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::messages::{EVENT_CONNECT, EVENT_DISCONNECT};
use super::transport::{InboundMessage, Transport};

/// NATS-backed transport
///
/// Event `e` is published on `<prefix>.e` with reply subject
/// `<prefix>.<client_id>.response`. Everything under `<prefix>.<client_id>.*`
/// is delivered inbound, keyed by the last subject token.
pub struct NatsTransport {
    prefix: String,
    client_id: String,
    client: Mutex<Option<Client>>,
    inbound_task: Mutex<Option<JoinHandle<()>>>,
    lifecycle_tx: Mutex<Option<mpsc::Sender<InboundMessage>>>,
}

impl NatsTransport {
    pub fn new(prefix: impl Into<String>, client_id: Option<String>) -> Self {
        Self {
            prefix: prefix.into(),
            client_id: client_id.unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string()),
            client: Mutex::new(None),
            inbound_task: Mutex::new(None),
            lifecycle_tx: Mutex::new(None),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Install the reply forwarder, aborting the one from an earlier `open`
    async fn replace_inbound_task(&self, task: JoinHandle<()>) {
        if let Some(previous) = self.inbound_task.lock().await.replace(task) {
            warn!("Replacing existing reply subscription");
            previous.abort();
        }
    }

    fn outbound_subject(&self, event: &str) -> String {
        format!("{}.{}", self.prefix, event)
    }

    fn inbound_subject(&self, event: &str) -> String {
        format!("{}.{}.{}", self.prefix, self.client_id, event)
    }
}

#[async_trait::async_trait]
impl Transport for NatsTransport {
    async fn open(&self, endpoint: &str) -> Result<mpsc::Receiver<InboundMessage>> {
        info!("Connecting to NATS at {}", endpoint);

        let (tx, rx) = mpsc::channel(64);

        let events_tx = tx.clone();
        let client = async_nats::ConnectOptions::new()
            .event_callback(move |event| {
                let events_tx = events_tx.clone();
                async move {
                    let lifecycle = match event {
                        async_nats::Event::Connected => EVENT_CONNECT,
                        async_nats::Event::Disconnected => EVENT_DISCONNECT,
                        other => {
                            warn!("NATS event: {}", other);
                            return;
                        }
                    };
                    let _ = events_tx.send(InboundMessage::lifecycle(lifecycle)).await;
                }
            })
            .connect(endpoint)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        let subject = self.inbound_subject("*");
        let mut subscriber = client
            .subscribe(subject.clone())
            .await
            .context("Failed to subscribe to replies")?;

        info!("Subscribed to {}", subject);

        let inbound_tx = tx.clone();
        let task = tokio::spawn(async move {
            while let Some(msg) = subscriber.next().await {
                let event = msg.subject.rsplit('.').next().unwrap_or_default().to_string();
                if inbound_tx
                    .send(InboundMessage::new(event, msg.payload.to_vec()))
                    .await
                    .is_err()
                {
                    break;
                }
            }
            info!("Reply subscription ended");
        });

        tx.send(InboundMessage::lifecycle(EVENT_CONNECT))
            .await
            .context("Inbound receiver dropped")?;

        if let Some(previous) = self.client.lock().await.replace(client) {
            if let Err(e) = previous.flush().await {
                warn!("Failed to flush replaced NATS connection: {}", e);
            }
        }
        self.replace_inbound_task(task).await;
        *self.lifecycle_tx.lock().await = Some(tx);

        Ok(rx)
    }

    async fn emit(&self, event: &str, payload: String) -> Result<()> {
        let client = self
            .client
            .lock()
            .await
            .clone()
            .context("NATS transport is not open")?;

        let subject = self.outbound_subject(event);
        let bytes = payload.len();
        client
            .publish_with_reply(subject.clone(), self.inbound_subject("response"), payload.into())
            .await
            .context("Failed to publish event")?;

        info!("Published {} ({} bytes)", subject, bytes);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        info!("Closing NATS connection");

        if let Some(task) = self.inbound_task.lock().await.take() {
            task.abort();
        }

        if let Some(client) = self.client.lock().await.take() {
            if let Err(e) = client.flush().await {
                warn!("Failed to flush NATS connection: {}", e);
            }
        }

        if let Some(tx) = self.lifecycle_tx.lock().await.take() {
            let _ = tx.send(InboundMessage::lifecycle(EVENT_DISCONNECT)).await;
        }

        // async-nats handles the rest on drop
        Ok(())
    }

    fn name(&self) -> &str {
        "nats"
    }
}
