//! Bidirectional streaming connection to the conversational-audio service

pub mod client;
pub mod messages;

pub use client::{ClientCommand, Connector, GeminiConnector, LiveConnection, LiveSender, LiveSetup};
pub use messages::{ClientMessage, InboundEvent, MediaBlob, ServerMessage};
