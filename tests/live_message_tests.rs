// Integration tests for the Live wire messages
//
// These verify the JSON shapes sent to the service and the order in which server messages
// are demultiplexed into session events.

use lex_live::live::messages::SetupMessage;
use lex_live::live::{ClientCommand, ClientMessage, LiveSender, LiveSetup, ServerMessage};
use lex_live::{AudioEncoder, InboundEvent};
use lex_live::audio::AudioChunk;
use serde_json::json;
use tokio::sync::mpsc;

fn setup() -> LiveSetup {
    LiveSetup {
        model: "models/test-live".to_string(),
        system_instruction: "Réponds en français.".to_string(),
        api_key: "secret-key".to_string(),
    }
}

#[test]
fn test_setup_message_shape() {
    let message = ClientMessage::Setup(SetupMessage::from(&setup()));
    let value = serde_json::to_value(&message).unwrap();

    assert_eq!(
        value,
        json!({
            "setup": {
                "model": "models/test-live",
                "generationConfig": { "responseModalities": ["AUDIO"] },
                "systemInstruction": { "parts": [{ "text": "Réponds en français." }] },
                "outputAudioTranscription": {}
            }
        })
    );
}

#[test]
fn test_setup_debug_redacts_key() {
    let debug = format!("{:?}", setup());
    assert!(!debug.contains("secret-key"));
    assert!(debug.contains("models/test-live"));
}

#[test]
fn test_realtime_input_shape() {
    let blob = AudioEncoder::new(16000).encode(&AudioChunk {
        samples: vec![0.5],
        sample_rate: 16000,
        sequence: 0,
    });
    let message = ClientMessage::RealtimeInput(lex_live::live::messages::RealtimeInput {
        media_chunks: vec![blob],
    });

    let value = serde_json::to_value(&message).unwrap();
    assert_eq!(
        value,
        json!({
            "realtimeInput": {
                "mediaChunks": [{ "mimeType": "audio/pcm;rate=16000", "data": "AEA=" }]
            }
        })
    );
}

#[test]
fn test_setup_complete_opens() {
    let message: ServerMessage = serde_json::from_value(json!({ "setupComplete": {} })).unwrap();
    assert_eq!(message.into_events(), vec![InboundEvent::Opened]);
}

#[test]
fn test_server_content_event_order() {
    let message: ServerMessage = serde_json::from_value(json!({
        "serverContent": {
            "modelTurn": {
                "parts": [
                    { "inlineData": { "mimeType": "audio/pcm;rate=24000", "data": "AAAA" } },
                    { "text": "ignored" },
                    { "inlineData": { "mimeType": "image/png", "data": "iVBO" } },
                    { "inlineData": { "mimeType": "audio/pcm;rate=24000", "data": "BBBB" } }
                ]
            },
            "turnComplete": true,
            "outputTranscription": { "text": "Bonjour" }
        }
    }))
    .unwrap();

    assert_eq!(
        message.into_events(),
        vec![
            InboundEvent::TranscriptFragment("Bonjour".to_string()),
            InboundEvent::TurnComplete,
            InboundEvent::Audio("AAAA".to_string()),
            InboundEvent::Audio("BBBB".to_string()),
        ]
    );
}

#[test]
fn test_unknown_and_empty_fields_yield_nothing() {
    let message: ServerMessage = serde_json::from_value(json!({
        "usageMetadata": { "totalTokenCount": 12 },
        "serverContent": { "outputTranscription": { "text": "" } }
    }))
    .unwrap();

    assert!(message.into_events().is_empty());
}

#[test]
fn test_sender_close_is_idempotent() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let sender = LiveSender::new(tx);
    let clone = sender.clone();

    assert!(sender.send_audio(AudioEncoder::new(16000).encode(&AudioChunk {
        samples: vec![0.0; 4],
        sample_rate: 16000,
        sequence: 0,
    })));

    sender.close();
    clone.close();
    assert!(clone.is_closed());
    assert!(!clone.send(ClientMessage::Setup(SetupMessage::from(&setup()))));

    assert!(matches!(
        rx.try_recv(),
        Ok(ClientCommand::Send(ClientMessage::RealtimeInput(_)))
    ));
    assert!(matches!(rx.try_recv(), Ok(ClientCommand::Close)));
    assert!(rx.try_recv().is_err());
}
