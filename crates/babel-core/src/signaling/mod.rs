//! Signaling channel between a participant and the room coordinator.
//!
//! Messages are JSON objects tagged by `type`. Outbound and inbound kinds
//! are separate enums so the controller matches exhaustively on what the
//! server can actually send.

pub mod memory;
pub mod websocket;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::config::{SignalingEndpoint, TranslationMode};
use crate::errors::{BabelError, TransportFault};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

/// SDP blob with its role, as exchanged on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid", default)]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex", default)]
    pub sdp_mline_index: Option<u16>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_mline_index: None,
        }
    }
}

/// Client → server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum OutboundSignal {
    Offer {
        offer: SessionDescription,
        source_lang: String,
        target_lang: String,
    },
    Candidate {
        candidate: IceCandidate,
    },
    Speaking {
        speaking: bool,
    },
    LanguageSettingsChange {
        source_lang: String,
        target_lang: String,
    },
    TranslationModeChange {
        mode: TranslationMode,
    },
}

/// Server → client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum InboundSignal {
    Answer {
        answer: SessionDescription,
    },
    Candidate {
        candidate: IceCandidate,
    },
    UserJoined {
        user_id: String,
    },
    UserLeft {
        user_id: String,
    },
    Speaking {
        from_user_id: String,
        speaking: bool,
    },
    Subtitle {
        from_user_id: String,
        text: String,
    },
    #[serde(rename = "translated_audio")]
    TranslatedAudio {
        from_user_id: String,
        /// Base64-encoded audio bytes.
        audio_content: String,
    },
}

/// What the receiving half of a channel yields.
#[derive(Debug)]
pub enum ChannelEvent {
    Message(InboundSignal),
    /// Orderly close by either side.
    Closed { reason: Option<String> },
    /// The transport failed underneath an open channel.
    Failed(BabelError),
}

#[derive(Debug)]
pub(crate) enum Outgoing {
    Signal(OutboundSignal),
    Close,
}

/// Cloneable sending half. Sending never blocks; the channel's writer
/// drains messages in order.
#[derive(Debug, Clone)]
pub struct SignalSender {
    tx: mpsc::UnboundedSender<Outgoing>,
    url: String,
}

impl SignalSender {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Outgoing>, url: impl Into<String>) -> Self {
        Self { tx, url: url.into() }
    }

    pub fn send(&self, signal: OutboundSignal) -> Result<(), BabelError> {
        self.tx
            .send(Outgoing::Signal(signal))
            .map_err(|_| BabelError::transport(&self.url, TransportFault::Dropped, "channel closed"))
    }

    /// Ask the writer to close the channel. Safe to call repeatedly.
    pub fn close(&self) {
        let _ = self.tx.send(Outgoing::Close);
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// An open channel: ordered outbound sender plus the inbound event stream.
pub struct SignalingChannel {
    pub sender: SignalSender,
    pub events: mpsc::UnboundedReceiver<ChannelEvent>,
}

/// Opens signaling channels. Implemented over WebSocket for production
/// and in memory for embedding and tests.
#[async_trait]
pub trait SignalingConnector: Send + Sync {
    async fn connect(&self, endpoint: &SignalingEndpoint) -> Result<SignalingChannel, BabelError>;
}

/// Parse one inbound text frame.
pub fn decode_inbound(text: &str) -> Result<InboundSignal, serde_json::Error> {
    serde_json::from_str(text)
}

pub fn encode_outbound(signal: &OutboundSignal) -> Result<String, serde_json::Error> {
    serde_json::to_string(signal)
}
