use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use super::controller::{AudioCaptureController, SessionEvent};
use super::stats::SessionSnapshot;
use crate::audio::CaptureBackend;
use crate::channel::{SessionChannel, EVENT_CONNECT, EVENT_DISCONNECT, EVENT_RESPONSE};
use crate::history::SessionHistoryStore;
use crate::voice::VoiceFeedbackEngine;

/// User gestures delivered to the session loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    Start,
    Stop,
    /// Release the device, close the channel and end the loop
    Shutdown,
}

/// Cloneable handle for driving and observing a running session
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    snapshots: watch::Receiver<SessionSnapshot>,
}

impl SessionHandle {
    pub async fn send(&self, command: SessionCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .context("Session loop has stopped")
    }

    pub async fn start(&self) -> Result<()> {
        self.send(SessionCommand::Start).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.send(SessionCommand::Stop).await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(SessionCommand::Shutdown).await
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Wait until a published snapshot satisfies `predicate`
    ///
    /// There is no built-in deadline; wrap in `tokio::time::timeout` if one is
    /// wanted.
    pub async fn wait_until<F>(&self, predicate: F) -> Result<SessionSnapshot>
    where
        F: FnMut(&SessionSnapshot) -> bool,
    {
        let mut snapshots = self.snapshots.clone();
        let snapshot = snapshots
            .wait_for(predicate)
            .await
            .context("Session loop has stopped")?;
        Ok(snapshot.clone())
    }
}

/// Single event loop that owns the controller
///
/// User commands, captured fragments, encoding completions and channel replies
/// are handled one at a time; a snapshot is published after each.
pub struct SessionRunner {
    controller: AudioCaptureController,
    channel: Arc<SessionChannel>,
    commands: mpsc::Receiver<SessionCommand>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    snapshots: watch::Sender<SessionSnapshot>,
}

impl SessionRunner {
    /// Wire a controller to the channel
    ///
    /// Registers this session's `response`, `connect` and `disconnect`
    /// handlers, replacing any registered earlier.
    pub fn new(
        backend: Box<dyn CaptureBackend>,
        channel: Arc<SessionChannel>,
        history: Arc<SessionHistoryStore>,
        voice: Arc<VoiceFeedbackEngine>,
        timestamp_format: &str,
    ) -> (Self, SessionHandle) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands_rx) = mpsc::channel(16);

        let replies = events_tx.clone();
        channel.on(
            EVENT_RESPONSE,
            Arc::new(move |payload: &[u8]| {
                if replies.send(SessionEvent::Reply(payload.to_vec())).is_err() {
                    warn!("Session loop gone, reply dropped");
                }
            }),
        );
        channel.on(
            EVENT_CONNECT,
            Arc::new(|_: &[u8]| info!("Inference service reachable")),
        );
        channel.on(
            EVENT_DISCONNECT,
            Arc::new(|_: &[u8]| warn!("Inference service unreachable")),
        );

        let controller = AudioCaptureController::new(
            backend,
            Arc::clone(&channel),
            history,
            voice,
            events_tx,
            timestamp_format,
        );

        let (snapshots_tx, snapshots_rx) = watch::channel(controller.snapshot());

        let runner = Self {
            controller,
            channel,
            commands: commands_rx,
            events: events_rx,
            snapshots: snapshots_tx,
        };
        let handle = SessionHandle {
            commands: commands_tx,
            snapshots: snapshots_rx,
        };

        (runner, handle)
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.controller.snapshot());
    }

    /// Run until `Shutdown` or until every handle is dropped
    pub async fn run(mut self) -> Result<()> {
        info!("Session loop started");

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(SessionCommand::Start) => {
                        // Denial is recorded in the snapshot
                        let _ = self.controller.start().await;
                    }
                    Some(SessionCommand::Stop) => self.controller.stop().await,
                    Some(SessionCommand::Shutdown) | None => break,
                },
                Some(event) = self.events.recv() => self.controller.handle_event(event).await,
                Some(fragment) = self.controller.next_fragment() => self.controller.on_fragment(fragment),
            }
            self.publish();
        }

        self.controller.shutdown().await;
        self.channel.disconnect().await;
        self.publish();

        info!("Session loop stopped");
        Ok(())
    }
}
