use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::config::{new_session_id, SessionConfig};
use super::resources::CaptureHandles;
use super::state::{ConversationState, ConversationStateMachine, StateEvent};
use super::stats::{EndReason, SessionReport, SessionStats};
use super::transcript::TranscriptionAccumulator;
use crate::audio::{
    AudioChunk, AudioDecoder, AudioDevices, AudioEncoder, BufferId, PlaybackEndedReceiver,
    PlaybackSignal,
};
use crate::error::{VoiceError, VoiceResult};
use crate::live::{Connector, InboundEvent, LiveConnection, LiveSetup};

/// Publish a report every this many outbound chunks
const REPORT_EVERY_CHUNKS: u64 = 16;

/// Controller for the live voice conversation.
///
/// At most one session runs at a time. Each session is a task that owns all of its
/// state and handles stop requests, inbound events, playback completions, and captured
/// audio one at a time; callers observe it through watch channels.
pub struct VoiceSession {
    config: SessionConfig,
    connector: Arc<dyn Connector>,
    devices: Arc<dyn AudioDevices>,
    state_tx: watch::Sender<ConversationState>,
    volume_tx: watch::Sender<f32>,
    report_tx: watch::Sender<SessionReport>,
    active: Mutex<Option<ActiveSession>>,
}

struct ActiveSession {
    session_id: String,
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<SessionStats>,
}

impl VoiceSession {
    pub fn new(
        config: SessionConfig,
        connector: Arc<dyn Connector>,
        devices: Arc<dyn AudioDevices>,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConversationState::Disconnected);
        let (volume_tx, _) = watch::channel(0.0);
        let (report_tx, _) = watch::channel(SessionReport::idle());

        Self {
            config,
            connector,
            devices,
            state_tx,
            volume_tx,
            report_tx,
            active: Mutex::new(None),
        }
    }

    /// Start a session and wait until the remote service has accepted it.
    ///
    /// Fails fast with a configuration error when no credential is configured, before any
    /// device or network access. Returns the new session id.
    pub async fn start(&self) -> VoiceResult<String> {
        let mut active = self.active.lock().await;

        if let Some(current) = active.as_ref() {
            if !current.task.is_finished() {
                warn!("Voice session {} already active", current.session_id);
                return Err(VoiceError::SessionActive);
            }
        }
        if let Some(finished) = active.take() {
            if let Err(e) = finished.task.await {
                error!("Previous session task panicked: {}", e);
            }
        }

        let setup = self.config.live_setup().ok_or_else(|| {
            VoiceError::Configuration("No API key configured for the Live service".to_string())
        })?;

        let mut config = self.config.clone();
        config.session_id = new_session_id();
        let session_id = config.session_id.clone();

        info!("Starting voice session: {}", session_id);

        let (stop_tx, stop_rx) = oneshot::channel();
        let (ready_tx, ready_rx) = oneshot::channel();

        let startup = Startup {
            config,
            setup,
            connector: Arc::clone(&self.connector),
            devices: Arc::clone(&self.devices),
            state_tx: self.state_tx.clone(),
            volume_tx: self.volume_tx.clone(),
            report_tx: self.report_tx.clone(),
        };
        let task = tokio::spawn(startup.run(stop_rx, ready_tx));

        *active = Some(ActiveSession {
            session_id: session_id.clone(),
            stop_tx,
            task,
        });
        drop(active);

        match ready_rx.await {
            Ok(Ok(())) => {
                info!("Voice session {} connected", session_id);
                Ok(session_id)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(VoiceError::Connection(
                "Session task ended during startup".to_string(),
            )),
        }
    }

    /// Stop the current session from any state and wait for its teardown.
    ///
    /// Calling this with no session running is a no-op that returns the last stats.
    pub async fn stop(&self) -> SessionStats {
        let active = self.active.lock().await.take();

        let Some(active) = active else {
            debug!("No active voice session to stop");
            return self.report().stats;
        };

        info!("Stopping voice session: {}", active.session_id);
        let _ = active.stop_tx.send(());

        match active.task.await {
            Ok(stats) => stats,
            Err(e) => {
                error!("Session task panicked: {}", e);
                self.state_tx.send_replace(ConversationState::Disconnected);
                self.volume_tx.send_replace(0.0);
                self.report().stats
            }
        }
    }

    pub fn state(&self) -> ConversationState {
        *self.state_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConversationState> {
        self.state_tx.subscribe()
    }

    /// Latest microphone volume in `[0, 100]`
    pub fn volume(&self) -> f32 {
        *self.volume_tx.borrow()
    }

    pub fn subscribe_volume(&self) -> watch::Receiver<f32> {
        self.volume_tx.subscribe()
    }

    pub fn report(&self) -> SessionReport {
        self.report_tx.borrow().clone()
    }

    pub fn subscribe_report(&self) -> watch::Receiver<SessionReport> {
        self.report_tx.subscribe()
    }

    pub fn is_active(&self) -> bool {
        self.state().is_active()
    }
}

/// Everything a session task needs before it has resources
struct Startup {
    config: SessionConfig,
    setup: LiveSetup,
    connector: Arc<dyn Connector>,
    devices: Arc<dyn AudioDevices>,
    state_tx: watch::Sender<ConversationState>,
    volume_tx: watch::Sender<f32>,
    report_tx: watch::Sender<SessionReport>,
}

impl Startup {
    async fn run(
        self,
        mut stop_rx: oneshot::Receiver<()>,
        ready_tx: oneshot::Sender<VoiceResult<()>>,
    ) -> SessionStats {
        let mut machine = ConversationStateMachine::new(self.state_tx.clone());
        machine.handle(StateEvent::StartRequested);

        let mut stats = SessionStats::new(&self.config.session_id);
        let (ended_tx, ended_rx) = mpsc::unbounded_channel();

        let opening = async {
            let (handles, capture_rx) = CaptureHandles::acquire(
                self.devices.as_ref(),
                &self.config,
                ended_tx,
                self.volume_tx.clone(),
            )
            .await?;

            // Dropping `handles` on failure releases the devices
            let connection = self.connector.open(&self.setup).await?;
            Ok::<_, VoiceError>((handles, capture_rx, connection))
        };

        // A hung handshake is only recoverable through stop
        let opened = tokio::select! {
            biased;
            _ = &mut stop_rx => Err(VoiceError::Cancelled),
            result = opening => result,
        };

        let (handles, capture_rx, connection) = match opened {
            Ok(parts) => parts,
            Err(e) => {
                let reason = match &e {
                    VoiceError::Cancelled => {
                        info!("Voice session {} cancelled while connecting", self.config.session_id);
                        EndReason::UserStop
                    }
                    other => {
                        error!("Voice session {} failed to start: {}", self.config.session_id, other);
                        EndReason::StartFailed(other.to_string())
                    }
                };
                machine.handle(StateEvent::Ended);
                stats.state = machine.state();
                stats.end_reason = Some(reason);
                stats.refresh_duration();
                self.report_tx.send_replace(SessionReport {
                    stats: stats.clone(),
                    turns: Vec::new(),
                    pending: String::new(),
                });
                let _ = ready_tx.send(Err(e));
                return stats;
            }
        };

        // The connector only returns once the service accepted the setup
        machine.handle(StateEvent::Opened);
        let _ = ready_tx.send(Ok(()));

        let state = SessionState {
            encoder: AudioEncoder::new(self.config.input_sample_rate),
            decoder: AudioDecoder::new(self.config.output_sample_rate),
            handles,
            connection,
            capture_rx: Some(capture_rx),
            ended_rx,
            machine,
            accumulator: TranscriptionAccumulator::new(),
            stats,
            report_tx: self.report_tx,
        };

        state.run(stop_rx).await
    }
}

/// The single owned record of a running session
struct SessionState {
    handles: CaptureHandles,
    connection: LiveConnection,
    capture_rx: Option<mpsc::Receiver<AudioChunk>>,
    ended_rx: PlaybackEndedReceiver,
    machine: ConversationStateMachine,
    accumulator: TranscriptionAccumulator,
    encoder: AudioEncoder,
    decoder: AudioDecoder,
    stats: SessionStats,
    report_tx: watch::Sender<SessionReport>,
}

impl SessionState {
    async fn run(mut self, mut stop_rx: oneshot::Receiver<()>) -> SessionStats {
        self.publish();

        let reason = loop {
            tokio::select! {
                biased;

                _ = &mut stop_rx => break EndReason::UserStop,

                event = self.connection.events.recv() => {
                    let event = event.unwrap_or_else(|| InboundEvent::Closed {
                        abnormal: true,
                        reason: "event stream ended".to_string(),
                    });
                    if let Some(reason) = self.handle_inbound(event) {
                        break reason;
                    }
                    self.publish();
                }

                Some(id) = self.ended_rx.recv() => {
                    self.handle_ended(id);
                    self.publish();
                }

                chunk = next_chunk(&mut self.capture_rx) => match chunk {
                    Some(chunk) => self.handle_chunk(chunk),
                    None => {
                        info!("Capture stream ended; continuing without microphone input");
                        self.capture_rx = None;
                    }
                },
            }
        };

        self.teardown(reason)
    }

    fn handle_inbound(&mut self, event: InboundEvent) -> Option<EndReason> {
        match event {
            InboundEvent::Opened => {
                self.machine.handle(StateEvent::Opened);
            }
            InboundEvent::TranscriptFragment(text) => {
                self.accumulator.push_fragment(&text);
            }
            InboundEvent::TurnComplete => {
                if let Some(turn) = self.accumulator.complete_turn() {
                    info!("Model: {}", turn.text);
                }
            }
            InboundEvent::Audio(payload) => {
                self.stats.payloads_received += 1;
                match self.decoder.decode(&payload) {
                    Ok(buffer) => self.schedule(buffer),
                    Err(e) => {
                        self.stats.decode_failures += 1;
                        warn!("Dropping inbound audio payload: {}", e);
                    }
                }
            }
            InboundEvent::Closed { abnormal: false, .. } => return Some(EndReason::RemoteClosed),
            InboundEvent::Closed {
                abnormal: true,
                reason,
            } => return Some(EndReason::RemoteClosedAbnormally(reason)),
            InboundEvent::Errored(e) => return Some(EndReason::TransportError(e)),
        }
        None
    }

    fn schedule(&mut self, buffer: crate::audio::PlaybackBuffer) {
        let Some(scheduler) = self.handles.scheduler_mut() else {
            return;
        };

        match scheduler.schedule(buffer) {
            Ok((scheduled, signal)) => {
                self.stats.buffers_scheduled += 1;
                if signal == Some(PlaybackSignal::Started) {
                    debug!("Playback started at {:.3}s", scheduled.start);
                }
                self.machine.handle(StateEvent::AudioScheduled);
            }
            Err(e) => warn!("Failed to schedule playback: {}", e),
        }
    }

    fn handle_ended(&mut self, id: BufferId) {
        let drained = self
            .handles
            .scheduler_mut()
            .and_then(|scheduler| scheduler.on_ended(id));

        if drained == Some(PlaybackSignal::Drained) {
            self.machine.handle(StateEvent::PlaybackDrained);
        }
    }

    fn handle_chunk(&mut self, chunk: AudioChunk) {
        if self.connection.sender.send_audio(self.encoder.encode(&chunk)) {
            self.stats.chunks_sent += 1;
            debug!("Sent chunk {} ({} samples)", chunk.sequence, chunk.samples.len());
            if self.stats.chunks_sent % REPORT_EVERY_CHUNKS == 0 {
                self.publish();
            }
        }
    }

    fn publish(&mut self) {
        self.stats.state = self.machine.state();
        self.stats.active_buffers = self
            .handles
            .scheduler()
            .map_or(0, |scheduler| scheduler.active_count());
        self.stats.turns_count = self.accumulator.turns().len();
        self.stats.refresh_duration();

        self.report_tx.send_replace(SessionReport {
            stats: self.stats.clone(),
            turns: self.accumulator.turns().to_vec(),
            pending: self.accumulator.pending().to_string(),
        });
    }

    fn teardown(mut self, reason: EndReason) -> SessionStats {
        if reason.is_error() {
            error!("Voice session {} ended: {:?}", self.stats.session_id, reason);
        } else {
            info!("Voice session {} ended: {:?}", self.stats.session_id, reason);
        }

        self.connection.sender.close();
        self.handles.release();
        self.capture_rx = None;
        self.accumulator.clear();
        self.machine.handle(StateEvent::Ended);
        self.stats.end_reason = Some(reason);
        self.publish();

        self.stats.clone()
    }
}

async fn next_chunk(rx: &mut Option<mpsc::Receiver<AudioChunk>>) -> Option<AudioChunk> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
