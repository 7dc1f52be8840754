// In-memory stand-ins for the audio devices and the Live service
//
// The fakes record what the session did to them (tracks started, contexts opened, buffers
// played or halted) so tests can assert on resource lifecycle without hardware or network.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use base64::Engine;
use lex_live::audio::{
    AnalyserTap, AudioBackendConfig, AudioChunk, AudioDevices, BufferId, CaptureBackend, PlaybackContext,
    PlaybackEndedSender,
};
use lex_live::live::{ClientCommand, Connector, LiveConnection, LiveSender, LiveSetup};
use lex_live::{ConversationState, InboundEvent, SessionConfig, VoiceError, VoiceResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

pub const WAIT: Duration = Duration::from_secs(5);

/// Shared record of everything done to the fake devices
#[derive(Default)]
pub struct DeviceLog {
    pub tracks_live: AtomicUsize,
    pub contexts_open: AtomicUsize,
    pub started: Mutex<Vec<(BufferId, f64)>>,
    pub stopped: Mutex<Vec<BufferId>>,
    clock: Mutex<f64>,
    capture_tx: Mutex<Option<mpsc::Sender<AudioChunk>>>,
    meter: Mutex<Option<AnalyserTap>>,
    ended_tx: Mutex<Option<PlaybackEndedSender>>,
}

impl DeviceLog {
    pub fn set_time(&self, time: f64) {
        *self.clock.lock().unwrap() = time;
    }

    pub fn time(&self) -> f64 {
        *self.clock.lock().unwrap()
    }

    pub fn tracks_live(&self) -> usize {
        self.tracks_live.load(Ordering::SeqCst)
    }

    pub fn contexts_open(&self) -> usize {
        self.contexts_open.load(Ordering::SeqCst)
    }

    pub fn started_ids(&self) -> Vec<BufferId> {
        self.started.lock().unwrap().iter().map(|(id, _)| *id).collect()
    }

    pub fn start_times(&self) -> Vec<f64> {
        self.started.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }

    pub fn stopped_ids(&self) -> Vec<BufferId> {
        self.stopped.lock().unwrap().clone()
    }

    /// Report a buffer as having played to the end
    pub fn finish(&self, id: BufferId) {
        if let Some(tx) = self.ended_tx.lock().unwrap().as_ref() {
            let _ = tx.send(id);
        }
    }

    /// Feed one microphone chunk to the running capture
    pub async fn capture(&self, chunk: AudioChunk) -> bool {
        if let Some(meter) = self.meter.lock().unwrap().as_ref() {
            meter.push(&chunk.samples);
        }
        let tx = self.capture_tx.lock().unwrap().clone();
        match tx {
            Some(tx) => tx.send(chunk).await.is_ok(),
            None => false,
        }
    }
}

pub struct FakeContext {
    log: Arc<DeviceLog>,
    sample_rate: u32,
    closed: bool,
    pub fail_start: bool,
}

impl FakeContext {
    pub fn new(log: Arc<DeviceLog>, sample_rate: u32) -> Self {
        log.contexts_open.fetch_add(1, Ordering::SeqCst);
        Self {
            log,
            sample_rate,
            closed: false,
            fail_start: false,
        }
    }
}

impl PlaybackContext for FakeContext {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn current_time(&self) -> f64 {
        self.log.time()
    }

    fn start(&mut self, id: BufferId, _samples: Arc<[f32]>, at: f64) -> VoiceResult<()> {
        if self.closed || self.fail_start {
            return Err(VoiceError::Device("context unavailable".to_string()));
        }
        self.log.started.lock().unwrap().push((id, at));
        Ok(())
    }

    fn stop(&mut self, id: BufferId) {
        self.log.stopped.lock().unwrap().push(id);
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.log.contexts_open.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

pub struct FakeCapture {
    log: Arc<DeviceLog>,
    meter: Option<AnalyserTap>,
    capturing: bool,
}

#[async_trait]
impl CaptureBackend for FakeCapture {
    async fn start(&mut self) -> VoiceResult<mpsc::Receiver<AudioChunk>> {
        let (tx, rx) = mpsc::channel(32);
        *self.log.capture_tx.lock().unwrap() = Some(tx);
        *self.log.meter.lock().unwrap() = self.meter.clone();
        self.log.tracks_live.fetch_add(1, Ordering::SeqCst);
        self.capturing = true;
        Ok(rx)
    }

    fn stop(&mut self) -> VoiceResult<()> {
        if self.capturing {
            self.capturing = false;
            self.log.capture_tx.lock().unwrap().take();
            self.log.meter.lock().unwrap().take();
            self.log.tracks_live.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn name(&self) -> &str {
        "fake microphone"
    }
}

#[derive(Default)]
pub struct FakeDevices {
    pub log: Arc<DeviceLog>,
    pub deny_microphone: bool,
}

impl FakeDevices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn denying_microphone() -> Self {
        Self {
            deny_microphone: true,
            ..Self::default()
        }
    }
}

impl AudioDevices for FakeDevices {
    fn open_playback(
        &self,
        sample_rate: u32,
        ended_tx: PlaybackEndedSender,
    ) -> VoiceResult<Box<dyn PlaybackContext>> {
        *self.log.ended_tx.lock().unwrap() = Some(ended_tx);
        Ok(Box::new(FakeContext::new(Arc::clone(&self.log), sample_rate)))
    }

    fn open_capture(&self, config: AudioBackendConfig) -> VoiceResult<Box<dyn CaptureBackend>> {
        if self.deny_microphone {
            return Err(VoiceError::Device("microphone permission denied".to_string()));
        }
        Ok(Box::new(FakeCapture {
            log: Arc::clone(&self.log),
            meter: config.meter,
            capturing: false,
        }))
    }

    fn name(&self) -> &str {
        "fake"
    }
}

/// The service's end of an open fake connection
pub struct Remote {
    pub events: mpsc::UnboundedSender<InboundEvent>,
    pub outbound: mpsc::UnboundedReceiver<ClientCommand>,
}

#[derive(Default)]
pub struct FakeConnector {
    pub opens: AtomicUsize,
    pub hang: bool,
    pub refuse: bool,
    remote: Mutex<Option<Remote>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::default()
        }
    }

    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::default()
        }
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn take_remote(&self) -> Option<Remote> {
        self.remote.lock().unwrap().take()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn open(&self, _setup: &LiveSetup) -> VoiceResult<LiveConnection> {
        self.opens.fetch_add(1, Ordering::SeqCst);

        if self.hang {
            std::future::pending::<()>().await;
        }
        if self.refuse {
            return Err(VoiceError::Connection("handshake rejected".to_string()));
        }

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        *self.remote.lock().unwrap() = Some(Remote {
            events: events_tx,
            outbound: out_rx,
        });

        Ok(LiveConnection {
            sender: LiveSender::new(out_tx),
            events: events_rx,
        })
    }
}

pub fn session_config() -> SessionConfig {
    SessionConfig {
        api_key: Some("test-key".to_string()),
        analysis_rate_hz: 30,
        ..SessionConfig::default()
    }
}

/// Base64 PCM16 payload of `seconds` of a quiet tone at `rate`
pub fn pcm_payload(seconds: f64, rate: u32) -> String {
    let len = (seconds * rate as f64).round() as usize;
    let bytes: Vec<u8> = (0..len)
        .map(|i| ((i as f32 * 0.05).sin() * 8000.0) as i16)
        .flat_map(|s| s.to_le_bytes())
        .collect();
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

pub async fn wait_for_state(
    rx: &mut watch::Receiver<ConversationState>,
    want: ConversationState,
) -> Result<()> {
    tokio::time::timeout(WAIT, rx.wait_for(|state| *state == want)).await??;
    Ok(())
}
