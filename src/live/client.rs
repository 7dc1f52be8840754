use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::messages::{
    AudioTranscriptionConfig, ClientMessage, Content, GenerationConfig, InboundEvent, MediaBlob,
    Modality, RealtimeInput, ServerMessage, SetupMessage,
};
use crate::error::{VoiceError, VoiceResult};

/// What the session asks the remote service for when opening
#[derive(Clone)]
pub struct LiveSetup {
    pub model: String,
    pub system_instruction: String,
    pub api_key: String,
}

impl fmt::Debug for LiveSetup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveSetup")
            .field("model", &self.model)
            .field("system_instruction", &self.system_instruction)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl From<&LiveSetup> for SetupMessage {
    fn from(setup: &LiveSetup) -> Self {
        SetupMessage {
            model: setup.model.clone(),
            generation_config: GenerationConfig {
                response_modalities: vec![Modality::Audio],
            },
            system_instruction: Content::text(setup.system_instruction.clone()),
            output_audio_transcription: AudioTranscriptionConfig::default(),
        }
    }
}

/// Commands consumed by a connection's writer
#[derive(Debug, Clone)]
pub enum ClientCommand {
    Send(ClientMessage),
    Close,
}

/// Non-blocking handle for outbound traffic
#[derive(Clone)]
pub struct LiveSender {
    tx: mpsc::UnboundedSender<ClientCommand>,
    closed: Arc<AtomicBool>,
}

impl LiveSender {
    pub fn new(tx: mpsc::UnboundedSender<ClientCommand>) -> Self {
        Self {
            tx,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Queue a message; returns false if the connection is closed
    pub fn send(&self, message: ClientMessage) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        self.tx.send(ClientCommand::Send(message)).is_ok()
    }

    /// Fire-and-forget one encoded audio chunk
    pub fn send_audio(&self, blob: MediaBlob) -> bool {
        self.send(ClientMessage::RealtimeInput(RealtimeInput {
            media_chunks: vec![blob],
        }))
    }

    /// Close the connection. Closing twice is a no-op.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.tx.send(ClientCommand::Close);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// An open bidirectional stream
pub struct LiveConnection {
    pub sender: LiveSender,
    pub events: mpsc::UnboundedReceiver<InboundEvent>,
}

/// Opens streams to a conversational-audio service.
///
/// `open` resolves once the service has accepted the setup. A rejected setup is an error,
/// never a connection that closes right away.
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, setup: &LiveSetup) -> VoiceResult<LiveConnection>;
}

/// Websocket connector for the Gemini Live bidirectional endpoint
pub struct GeminiConnector {
    endpoint: String,
}

impl GeminiConnector {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait::async_trait]
impl Connector for GeminiConnector {
    async fn open(&self, setup: &LiveSetup) -> VoiceResult<LiveConnection> {
        info!("Connecting to Live service at {}", self.endpoint);

        let url = format!("{}?key={}", self.endpoint, setup.api_key);
        let (ws, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| VoiceError::Connection(format!("Failed to connect: {}", e)))?;

        let (mut ws_tx, mut ws_rx) = ws.split();

        let setup_json = serde_json::to_string(&ClientMessage::Setup(SetupMessage::from(setup)))
            .map_err(|e| VoiceError::Connection(format!("Failed to encode setup: {}", e)))?;
        ws_tx.send(Message::Text(setup_json)).await?;

        debug!("Setup sent for model {}, awaiting acknowledgement", setup.model);

        // Events that arrive alongside the acknowledgement are replayed to the session
        let mut early = Vec::new();
        loop {
            let payload = match ws_rx.next().await {
                Some(Ok(Message::Text(text))) => text.into_bytes(),
                Some(Ok(Message::Binary(bytes))) => bytes,
                Some(Ok(Message::Close(frame))) => {
                    return Err(VoiceError::Connection(format!(
                        "Setup rejected: {}",
                        close_reason(frame.as_ref())
                    )))
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    return Err(VoiceError::Connection(format!("Setup failed: {}", e)))
                }
                None => {
                    return Err(VoiceError::Connection(
                        "Connection closed during setup".to_string(),
                    ))
                }
            };

            let message = match serde_json::from_slice::<ServerMessage>(&payload) {
                Ok(message) => message,
                Err(e) => {
                    warn!("Failed to parse server message: {}", e);
                    continue;
                }
            };
            let acknowledged = message.setup_complete.is_some();
            early.extend(
                message
                    .into_events()
                    .into_iter()
                    .filter(|event| !matches!(event, InboundEvent::Opened)),
            );
            if acknowledged {
                break;
            }
        }

        info!("Connected, setup accepted for model {}", setup.model);

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ClientCommand>();
        let (events_tx, events_rx) = mpsc::unbounded_channel::<InboundEvent>();
        for event in early {
            let _ = events_tx.send(event);
        }

        tokio::spawn(async move {
            while let Some(command) = out_rx.recv().await {
                let message = match command {
                    ClientCommand::Send(message) => message,
                    ClientCommand::Close => break,
                };
                match serde_json::to_string(&message) {
                    Ok(text) => {
                        if let Err(e) = ws_tx.send(Message::Text(text)).await {
                            warn!("Failed to send to Live service: {}", e);
                            break;
                        }
                    }
                    Err(e) => warn!("Failed to encode client message: {}", e),
                }
            }

            let _ = ws_tx
                .send(Message::Close(Some(CloseFrame {
                    code: CloseCode::Normal,
                    reason: "client closed".into(),
                })))
                .await;
            debug!("Live writer stopped");
        });

        tokio::spawn(async move {
            let last = loop {
                if events_tx.is_closed() {
                    debug!("Live reader stopped: session gone");
                    return;
                }

                let payload = match ws_rx.next().await {
                    Some(Ok(Message::Text(text))) => text.into_bytes(),
                    Some(Ok(Message::Binary(bytes))) => bytes,
                    Some(Ok(Message::Close(frame))) => break close_event(frame),
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => break InboundEvent::Errored(e.to_string()),
                    None => {
                        break InboundEvent::Closed {
                            abnormal: true,
                            reason: "connection dropped".to_string(),
                        }
                    }
                };

                match serde_json::from_slice::<ServerMessage>(&payload) {
                    Ok(message) => {
                        for event in message.into_events() {
                            if events_tx.send(event).is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => warn!("Failed to parse server message: {}", e),
                }
            };

            let _ = events_tx.send(last);
            debug!("Live reader stopped");
        });

        Ok(LiveConnection {
            sender: LiveSender::new(out_tx),
            events: events_rx,
        })
    }
}

fn close_event(frame: Option<CloseFrame<'_>>) -> InboundEvent {
    InboundEvent::Closed {
        abnormal: frame.as_ref().is_some_and(|f| f.code != CloseCode::Normal),
        reason: close_reason(frame.as_ref()),
    }
}

fn close_reason(frame: Option<&CloseFrame<'_>>) -> String {
    match frame {
        None => String::new(),
        Some(frame) => format!("{} ({})", frame.reason, u16::from(frame.code)),
    }
}
