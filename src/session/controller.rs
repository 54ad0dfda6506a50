use base64::Engine;
use chrono::{DateTime, Utc};
use std::future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::stats::{SessionSnapshot, SessionState, SessionStats};
use crate::audio::{concatenate, AudioFragment, CaptureBackend};
use crate::channel::{InferenceReply, SessionChannel, TransmissionEnvelope, EVENT_MESSAGE};
use crate::emotion::{self, EmotionDistribution};
use crate::error::SessionError;
use crate::history::{HistoryEntry, SessionHistoryStore};
use crate::voice::{VoiceFeedbackEngine, FALLBACK_REPLY};

/// Shown in place of a reply that carried no text
pub const DISPLAY_FALLBACK: &str = "No text response";

/// Asynchronous completions fed back into the controller
#[derive(Debug)]
pub enum SessionEvent {
    /// Finalization of a recording finished
    Encoded {
        recording_id: Uuid,
        result: Result<String, SessionError>,
    },
    /// Raw `response` payload from the channel
    Reply(Vec<u8>),
}

/// Owns the microphone lifecycle and one recording round at a time
///
/// The controller is driven by a single event loop: every method runs to
/// completion before the next event is handled. Encoding runs off-loop and
/// reports back through `SessionEvent::Encoded`, so transmission always waits
/// for that event rather than following `stop` directly.
///
/// Starting a new recording while a reply is pending is not rejected here;
/// callers gate it.
pub struct AudioCaptureController {
    backend: Box<dyn CaptureBackend>,
    channel: Arc<SessionChannel>,
    history: Arc<SessionHistoryStore>,
    voice: Arc<VoiceFeedbackEngine>,
    events: mpsc::UnboundedSender<SessionEvent>,
    timestamp_format: String,

    state: SessionState,
    fragments: Vec<AudioFragment>,
    fragment_rx: Option<mpsc::Receiver<AudioFragment>>,
    recording_id: Option<Uuid>,
    started_at: Option<DateTime<Utc>>,
    trail: Vec<SessionState>,

    last_reply: Option<String>,
    latest: Option<EmotionDistribution>,
    last_error: Option<SessionError>,
    stats: SessionStats,
}

impl AudioCaptureController {
    pub fn new(
        backend: Box<dyn CaptureBackend>,
        channel: Arc<SessionChannel>,
        history: Arc<SessionHistoryStore>,
        voice: Arc<VoiceFeedbackEngine>,
        events: mpsc::UnboundedSender<SessionEvent>,
        timestamp_format: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            channel,
            history,
            voice,
            events,
            timestamp_format: timestamp_format.into(),
            state: SessionState::Idle,
            fragments: Vec::new(),
            fragment_rx: None,
            recording_id: None,
            started_at: None,
            trail: Vec::new(),
            last_reply: None,
            latest: None,
            last_error: None,
            stats: SessionStats::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// States the current recording has passed through
    pub fn trail(&self) -> &[SessionState] {
        &self.trail
    }

    pub fn recording_id(&self) -> Option<Uuid> {
        self.recording_id
    }

    fn transition(&mut self, next: SessionState) {
        debug!("Session state {:?} -> {:?}", self.state, next);
        self.state = next;
        self.trail.push(next);
    }

    /// Record a failed attempt and settle back in `Idle` by way of `Error`
    fn fail(&mut self, err: SessionError) {
        self.last_error = Some(err);
        self.transition(SessionState::Error);
        self.transition(SessionState::Idle);
    }

    /// Request microphone access and begin recording
    ///
    /// Denial passes through `Error` back to `Idle` and is returned so the caller can
    /// tell the user. Calling while already recording does nothing.
    pub async fn start(&mut self) -> Result<(), SessionError> {
        if self.state == SessionState::Recording {
            warn!("Recording already started");
            return Ok(());
        }
        if self.state == SessionState::AwaitingResponse {
            warn!("Starting a new recording while a reply is still pending");
        }

        self.trail.clear();
        info!("Requesting microphone access from {} backend", self.backend.name());

        let started = match self.backend.request_access().await {
            Ok(()) => self.backend.start().await,
            Err(e) => Err(e),
        };

        let fragment_rx = match started {
            Ok(rx) => rx,
            Err(e) => {
                let err = SessionError::PermissionDenied(format!("{:#}", e));
                error!("Error accessing microphone: {}", err);
                self.stats.permission_denials += 1;
                self.fail(err.clone());
                return Err(err);
            }
        };

        let recording_id = Uuid::new_v4();
        info!("Recording {} started", recording_id);

        self.recording_id = Some(recording_id);
        self.started_at = Some(Utc::now());
        self.fragments.clear();
        self.fragment_rx = Some(fragment_rx);
        self.last_error = None;
        self.stats.recordings_started += 1;
        self.stats.fragments_buffered = 0;
        self.transition(SessionState::Recording);

        Ok(())
    }

    /// Buffer one captured fragment
    pub fn on_fragment(&mut self, fragment: AudioFragment) {
        if self.state != SessionState::Recording {
            debug!("Ignoring fragment outside of recording ({:?})", self.state);
            return;
        }
        self.fragments.push(fragment);
        self.stats.fragments_buffered = self.fragments.len();
    }

    /// Next fragment from the capture backend
    ///
    /// Pends forever when nothing is being captured, so it can sit in a
    /// `select!` next to other event sources.
    pub async fn next_fragment(&mut self) -> Option<AudioFragment> {
        let Some(rx) = self.fragment_rx.as_mut() else {
            return future::pending().await;
        };

        match rx.recv().await {
            Some(fragment) => Some(fragment),
            None => {
                debug!("Capture backend closed its fragment stream");
                self.fragment_rx = None;
                None
            }
        }
    }

    /// Stop recording and finalize the buffered audio
    ///
    /// Releases the input device, then concatenates and encodes the fragments
    /// off-loop. The result arrives later as `SessionEvent::Encoded`.
    pub async fn stop(&mut self) {
        if self.state != SessionState::Recording {
            debug!("Stop requested while {:?}, ignoring", self.state);
            return;
        }

        self.transition(SessionState::Encoding);

        if let Err(e) = self.backend.stop().await {
            error!("Failed to stop {} backend: {}", self.backend.name(), e);
        }

        // Fragments already captured but not yet handled still belong to this recording
        if let Some(mut rx) = self.fragment_rx.take() {
            while let Ok(fragment) = rx.try_recv() {
                self.fragments.push(fragment);
            }
        }

        let fragments = std::mem::take(&mut self.fragments);
        let recording_id = self.recording_id.unwrap_or_default();
        info!(
            "Recording {} stopped with {} fragments",
            recording_id,
            fragments.len()
        );

        let events = self.events.clone();
        tokio::spawn(async move {
            let result = encode_recording(fragments).await;
            if events
                .send(SessionEvent::Encoded {
                    recording_id,
                    result,
                })
                .is_err()
            {
                warn!("Session loop gone, encoded recording {} discarded", recording_id);
            }
        });

        self.voice.speak_waiting_prompt();
    }

    /// Wrap encoded audio in an envelope and hand it to the channel
    ///
    /// The session moves to `AwaitingResponse` whether or not the channel
    /// accepted it; a dropped send leaves it waiting for a reply that will
    /// never come.
    pub async fn on_encoded(&mut self, recording_id: Uuid, result: Result<String, SessionError>) {
        if self.state != SessionState::Encoding || self.recording_id != Some(recording_id) {
            warn!("Discarding encoded audio for stale recording {}", recording_id);
            return;
        }

        let payload = result.and_then(|audio| {
            TransmissionEnvelope::audio(audio)
                .to_payload()
                .map_err(|e| SessionError::EncodingFailure(e.to_string()))
        });

        let payload = match payload {
            Ok(payload) => payload,
            Err(err) => {
                error!("Recording {} could not be encoded: {}", recording_id, err);
                self.stats.encoding_failures += 1;
                self.fail(err);
                return;
            }
        };

        info!("Sending recording {} ({} bytes)", recording_id, payload.len());

        if self.channel.send(EVENT_MESSAGE, payload).await {
            self.stats.recordings_sent += 1;
        } else {
            warn!("Recording {} was not transmitted, no reply will arrive", recording_id);
            self.last_error = Some(SessionError::ChannelUnavailable(EVENT_MESSAGE.to_string()));
        }
        self.stats.dropped_sends = self.channel.dropped_sends();

        self.transition(SessionState::AwaitingResponse);
    }

    /// Consume an inference reply
    ///
    /// A parsed reply is appended to history, then spoken. A reply that fails
    /// to parse is logged and leaves history untouched. Either way a pending
    /// session returns to `Idle`.
    pub async fn on_reply(&mut self, reply: InferenceReply) -> Option<EmotionDistribution> {
        self.stats.replies_received += 1;
        info!("Inference reply received");

        self.last_reply = Some(
            reply
                .text
                .clone()
                .unwrap_or_else(|| DISPLAY_FALLBACK.to_string()),
        );

        let parsed = match emotion::parse(&reply) {
            Ok(distribution) => {
                let entry = HistoryEntry::now(distribution.clone(), &self.timestamp_format);
                let outcome = self.history.append(entry).await;
                if let Some(err) = outcome.error {
                    self.stats.persistence_failures += 1;
                    self.last_error = Some(err);
                }

                self.stats.replies_parsed += 1;
                self.latest = Some(distribution.clone());

                let mood = emotion::detect_mood(&reply);
                let text = reply.text.as_deref().unwrap_or(FALLBACK_REPLY);
                self.voice.speak(text, mood.as_deref());

                Some(distribution)
            }
            Err(failure) => {
                error!("Failed to parse inference reply: {}", failure.code());
                self.stats.parse_failures += 1;
                self.latest = None;
                self.last_error = Some(SessionError::MalformedResponse(failure));
                None
            }
        };

        if self.state == SessionState::AwaitingResponse {
            self.transition(SessionState::Idle);
        } else {
            debug!("Reply arrived while {:?}, state unchanged", self.state);
        }

        parsed
    }

    /// Route an asynchronous completion to its handler
    pub async fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Encoded {
                recording_id,
                result,
            } => self.on_encoded(recording_id, result).await,
            SessionEvent::Reply(payload) => {
                self.on_reply(InferenceReply::from_slice(&payload)).await;
            }
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let mut stats = self.stats.clone();
        stats.dropped_sends = self.channel.dropped_sends();

        SessionSnapshot {
            state: self.state,
            recording_id: self.recording_id,
            trail: self.trail.clone(),
            started_at: self.started_at,
            last_reply: self.last_reply.clone(),
            latest: self.latest.clone(),
            last_error: self.last_error.clone(),
            stats,
        }
    }

    /// Release the input device if a recording is still running
    pub async fn shutdown(&mut self) {
        if self.backend.is_capturing() {
            if let Err(e) = self.backend.stop().await {
                error!("Failed to stop {} backend: {}", self.backend.name(), e);
            }
        }
        self.fragment_rx = None;
    }
}

/// Join and base64-encode a finished recording off the event loop
async fn encode_recording(fragments: Vec<AudioFragment>) -> Result<String, SessionError> {
    tokio::task::spawn_blocking(move || {
        base64::engine::general_purpose::STANDARD.encode(concatenate(fragments))
    })
    .await
    .map_err(|e| SessionError::EncodingFailure(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MemoryTransport;
    use crate::config::VoiceConfig;
    use crate::history::MemoryStore;
    use crate::voice::MemorySynthesizer;
    use std::time::Duration;

    /// Grants or denies access, then replays a fixed list of fragments
    struct ScriptedBackend {
        grant: bool,
        fragments: Vec<Vec<u8>>,
        capturing: bool,
    }

    #[async_trait::async_trait]
    impl CaptureBackend for ScriptedBackend {
        async fn request_access(&mut self) -> anyhow::Result<()> {
            if self.grant {
                Ok(())
            } else {
                anyhow::bail!("NotAllowedError: permission denied")
            }
        }

        async fn start(&mut self) -> anyhow::Result<mpsc::Receiver<AudioFragment>> {
            let (tx, rx) = mpsc::channel(16);
            for (i, data) in self.fragments.iter().enumerate() {
                tx.send(AudioFragment::new(data.clone(), i as u64 * 100)).await?;
            }
            self.capturing = true;
            Ok(rx)
        }

        async fn stop(&mut self) -> anyhow::Result<()> {
            self.capturing = false;
            Ok(())
        }

        fn is_capturing(&self) -> bool {
            self.capturing
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    struct Harness {
        controller: AudioCaptureController,
        events: mpsc::UnboundedReceiver<SessionEvent>,
        transport: Arc<MemoryTransport>,
        history: Arc<SessionHistoryStore>,
        synth: Arc<MemorySynthesizer>,
    }

    async fn harness(grant: bool, fragments: Vec<Vec<u8>>, connect: bool) -> Harness {
        let transport = Arc::new(MemoryTransport::new());
        let channel = Arc::new(SessionChannel::new(transport.clone()));
        if connect {
            channel.connect("memory://test").await.unwrap();
        }

        let history = Arc::new(SessionHistoryStore::new(Arc::new(MemoryStore::new())));
        let synth = Arc::new(MemorySynthesizer::new());
        let voice = Arc::new(VoiceFeedbackEngine::new(
            synth.clone(),
            VoiceConfig {
                waiting_prompt: false,
                ..VoiceConfig::default()
            },
        ));
        let (tx, rx) = mpsc::unbounded_channel();

        let backend = Box::new(ScriptedBackend {
            grant,
            fragments,
            capturing: false,
        });
        let controller = AudioCaptureController::new(
            backend,
            channel,
            Arc::clone(&history),
            voice,
            tx,
            "%H:%M",
        );

        Harness {
            controller,
            events: rx,
            transport,
            history,
            synth,
        }
    }

    async fn next_event(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> SessionEvent {
        tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap()
    }

    fn happy_reply() -> InferenceReply {
        InferenceReply::from_slice(
            br#"{"text":"ok","model_response":"{\"mood\":\"happy\",\"probabilities\":{\"happy\":80,\"sad\":5}}"}"#,
        )
    }

    #[tokio::test]
    async fn denied_access_never_records() {
        let mut h = harness(false, Vec::new(), true).await;

        let result = h.controller.start().await;

        assert!(matches!(result, Err(SessionError::PermissionDenied(_))));
        assert_eq!(h.controller.state(), SessionState::Idle);
        assert_eq!(h.controller.trail(), &[SessionState::Error, SessionState::Idle]);
        assert!(h.controller.snapshot().failed());
        assert_eq!(h.controller.snapshot().stats.permission_denials, 1);
    }

    #[tokio::test]
    async fn two_fragments_become_one_envelope() {
        let mut h = harness(true, vec![b"RIFF".to_vec(), b"data".to_vec()], true).await;

        h.controller.start().await.unwrap();
        while let Some(fragment) = h.controller.next_fragment().await {
            h.controller.on_fragment(fragment);
        }
        h.controller.stop().await;
        assert_eq!(h.controller.state(), SessionState::Encoding);

        let event = next_event(&mut h.events).await;
        h.controller.handle_event(event).await;

        let emitted = h.transport.emitted();
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].0, "message");

        let envelope: TransmissionEnvelope = serde_json::from_str(&emitted[0].1).unwrap();
        assert_eq!(envelope.kind, "audio_data");
        let audio = base64::engine::general_purpose::STANDARD
            .decode(envelope.audio)
            .unwrap();
        assert_eq!(audio, b"RIFFdata");

        assert_eq!(
            h.controller.trail(),
            &[
                SessionState::Recording,
                SessionState::Encoding,
                SessionState::AwaitingResponse
            ]
        );
    }

    #[tokio::test]
    async fn unhandled_fragments_are_drained_on_stop() {
        let mut h = harness(true, vec![vec![1], vec![2], vec![3]], true).await;

        h.controller.start().await.unwrap();
        let first = h.controller.next_fragment().await.unwrap();
        h.controller.on_fragment(first);
        h.controller.stop().await;

        let SessionEvent::Encoded { result, .. } = next_event(&mut h.events).await else {
            panic!("expected encoded event");
        };
        let audio = base64::engine::general_purpose::STANDARD
            .decode(result.unwrap())
            .unwrap();
        assert_eq!(audio, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn empty_recording_is_still_sent() {
        let mut h = harness(true, Vec::new(), true).await;

        h.controller.start().await.unwrap();
        h.controller.stop().await;
        let event = next_event(&mut h.events).await;
        h.controller.handle_event(event).await;

        assert_eq!(h.controller.state(), SessionState::AwaitingResponse);
        assert!(!h.controller.snapshot().failed());

        let emitted = h.transport.emitted();
        assert_eq!(emitted.len(), 1);
        let envelope: TransmissionEnvelope = serde_json::from_str(&emitted[0].1).unwrap();
        assert_eq!(envelope.audio, "");
        assert_eq!(envelope.kind, "audio_data");
    }

    #[tokio::test]
    async fn failed_encoding_returns_to_idle_without_sending() {
        let mut h = harness(true, vec![vec![1]], true).await;

        h.controller.start().await.unwrap();
        h.controller.stop().await;
        let Some(recording_id) = h.controller.recording_id() else {
            panic!("recording id");
        };
        h.controller
            .on_encoded(
                recording_id,
                Err(SessionError::EncodingFailure("reader aborted".to_string())),
            )
            .await;

        assert_eq!(h.controller.state(), SessionState::Idle);
        assert_eq!(
            h.controller.trail(),
            &[
                SessionState::Recording,
                SessionState::Encoding,
                SessionState::Error,
                SessionState::Idle
            ]
        );
        assert!(h.transport.emitted().is_empty());
        assert_eq!(h.controller.snapshot().stats.encoding_failures, 1);
    }

    #[tokio::test]
    async fn stop_outside_recording_is_noop() {
        let mut h = harness(true, Vec::new(), true).await;
        h.controller.stop().await;
        assert_eq!(h.controller.state(), SessionState::Idle);
        assert!(h.controller.trail().is_empty());
    }

    #[tokio::test]
    async fn disconnected_channel_leaves_session_waiting() {
        let mut h = harness(true, vec![vec![7]], false).await;

        h.controller.start().await.unwrap();
        h.controller.stop().await;
        let event = next_event(&mut h.events).await;
        h.controller.handle_event(event).await;

        let snapshot = h.controller.snapshot();
        assert_eq!(snapshot.state, SessionState::AwaitingResponse);
        assert_eq!(snapshot.stats.dropped_sends, 1);
        assert_eq!(snapshot.stats.recordings_sent, 0);
        assert_eq!(
            snapshot.last_error,
            Some(SessionError::ChannelUnavailable("message".to_string()))
        );
    }

    #[tokio::test]
    async fn parsed_reply_updates_history_and_speaks() {
        let mut h = harness(true, vec![vec![7]], true).await;
        h.controller.start().await.unwrap();
        h.controller.stop().await;
        let event = next_event(&mut h.events).await;
        h.controller.handle_event(event).await;

        let dist = h.controller.on_reply(happy_reply()).await.unwrap();

        assert_eq!(dist.len(), 3);
        assert_eq!(h.controller.state(), SessionState::Idle);
        assert_eq!(h.history.load().await.len(), 1);
        assert_eq!(h.synth.spoken()[0].text, "ok");
        assert_eq!(h.controller.snapshot().latest, Some(dist));
    }

    #[tokio::test]
    async fn malformed_reply_still_releases_session() {
        let mut h = harness(true, vec![vec![7]], true).await;
        h.controller.start().await.unwrap();
        h.controller.stop().await;
        let event = next_event(&mut h.events).await;
        h.controller.handle_event(event).await;

        let result = h
            .controller
            .on_reply(InferenceReply::from_slice(br#"{"text":"hmm"}"#))
            .await;

        assert!(result.is_none());
        assert_eq!(h.controller.state(), SessionState::Idle);
        assert!(h.history.load().await.is_empty());
        assert!(h.synth.spoken().is_empty());

        let snapshot = h.controller.snapshot();
        assert_eq!(snapshot.stats.parse_failures, 1);
        assert_eq!(snapshot.last_reply.as_deref(), Some("hmm"));
    }

    #[tokio::test]
    async fn stale_encoding_is_ignored_after_restart() {
        let mut h = harness(true, vec![vec![1]], true).await;

        h.controller.start().await.unwrap();
        h.controller.stop().await;
        let stale = next_event(&mut h.events).await;

        // New recording begins before the old encoding is handled
        h.controller.start().await.unwrap();
        h.controller.handle_event(stale).await;

        assert_eq!(h.controller.state(), SessionState::Recording);
        assert!(h.transport.emitted().is_empty());
    }

    #[tokio::test]
    async fn start_while_awaiting_is_not_rejected() {
        let mut h = harness(true, vec![vec![1]], true).await;
        h.controller.start().await.unwrap();
        h.controller.stop().await;
        let event = next_event(&mut h.events).await;
        h.controller.handle_event(event).await;
        assert_eq!(h.controller.state(), SessionState::AwaitingResponse);

        h.controller.start().await.unwrap();
        assert_eq!(h.controller.state(), SessionState::Recording);

        // The late reply is still recorded but does not disturb the new recording
        h.controller.on_reply(happy_reply()).await;
        assert_eq!(h.controller.state(), SessionState::Recording);
        assert_eq!(h.history.snapshot().await.len(), 1);
    }
}
