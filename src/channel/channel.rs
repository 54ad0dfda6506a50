use anyhow::Result;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::messages::{EVENT_CONNECT, EVENT_DISCONNECT};
use super::transport::{InboundMessage, Transport};

/// Handler for one inbound event name, called with the raw payload
pub type EventHandler = Arc<dyn Fn(&[u8]) + Send + Sync>;

type HandlerTable = Arc<RwLock<HashMap<String, EventHandler>>>;

/// The single persistent connection to the inference service
///
/// Created once when the session context starts and disposed explicitly with
/// `disconnect`. Each event name has one handler slot: registering again
/// replaces the previous handler. Inbound events are dispatched one at a time
/// on a dedicated task, so handlers never run concurrently.
pub struct SessionChannel {
    transport: Arc<dyn Transport>,
    connected: Arc<AtomicBool>,
    handlers: HandlerTable,
    dispatch_task: Mutex<Option<JoinHandle<()>>>,
    dropped_sends: AtomicUsize,
}

impl SessionChannel {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            connected: Arc::new(AtomicBool::new(false)),
            handlers: Arc::new(RwLock::new(HashMap::new())),
            dispatch_task: Mutex::new(None),
            dropped_sends: AtomicUsize::new(0),
        }
    }

    /// Open the connection; a no-op when already connected
    pub async fn connect(&self, endpoint: &str) -> Result<()> {
        let mut dispatch_task = self.dispatch_task.lock().await;
        if self.connected.load(Ordering::SeqCst) {
            debug!("Channel already connected");
            return Ok(());
        }

        info!("Opening {} channel to {}", self.transport.name(), endpoint);
        let inbound = self.transport.open(endpoint).await?;
        self.connected.store(true, Ordering::SeqCst);

        let handlers = Arc::clone(&self.handlers);
        let connected = Arc::clone(&self.connected);
        *dispatch_task = Some(tokio::spawn(Self::dispatch(inbound, handlers, connected)));

        Ok(())
    }

    /// Register the handler for `event`, replacing any earlier one
    pub fn on(&self, event: &str, handler: EventHandler) {
        let mut handlers = self
            .handlers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if handlers.insert(event.to_string(), handler).is_some() {
            warn!("Replaced existing handler for `{}` event", event);
        }
    }

    /// Transmit `payload` under `event`
    ///
    /// Never fails: when disconnected, or when the transport rejects the
    /// payload, the send is logged and dropped. Returns whether it went out.
    pub async fn send(&self, event: &str, payload: String) -> bool {
        if !self.connected.load(Ordering::SeqCst) {
            warn!("Channel not connected, dropping `{}` event", event);
            self.dropped_sends.fetch_add(1, Ordering::SeqCst);
            return false;
        }

        match self.transport.emit(event, payload).await {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to send `{}` event: {}", event, e);
                self.dropped_sends.fetch_add(1, Ordering::SeqCst);
                false
            }
        }
    }

    /// Close the connection; safe to call repeatedly
    pub async fn disconnect(&self) {
        let mut dispatch_task = self.dispatch_task.lock().await;
        if !self.connected.swap(false, Ordering::SeqCst) && dispatch_task.is_none() {
            return;
        }

        if let Err(e) = self.transport.close().await {
            error!("Failed to close {} channel: {}", self.transport.name(), e);
        }

        if let Some(task) = dispatch_task.take() {
            task.abort();
        }

        info!("Channel disconnected");
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Sends dropped because the channel was unavailable
    pub fn dropped_sends(&self) -> usize {
        self.dropped_sends.load(Ordering::SeqCst)
    }

    async fn dispatch(
        mut inbound: mpsc::Receiver<InboundMessage>,
        handlers: HandlerTable,
        connected: Arc<AtomicBool>,
    ) {
        while let Some(message) = inbound.recv().await {
            // Lifecycle events are informational; the transport reconnects on its own
            match message.event.as_str() {
                EVENT_CONNECT => info!("Channel connected"),
                EVENT_DISCONNECT => warn!("Channel disconnected by transport"),
                _ => debug!(
                    "Received `{}` event ({} bytes)",
                    message.event,
                    message.payload.len()
                ),
            }

            let handler = handlers
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .get(&message.event)
                .cloned();

            match handler {
                Some(handler) => handler(&message.payload),
                None => debug!("No handler for `{}` event", message.event),
            }
        }

        connected.store(false, Ordering::SeqCst);
        info!("Channel dispatch stopped");
    }
}
