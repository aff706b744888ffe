use std::sync::{Arc, PoisonError, RwLock};

use crate::config::{LanguagePair, TranslationMode};
use crate::media::StreamHandle;

/// Events emitted by the core to UI listeners.
#[derive(Debug, Clone)]
pub enum CallEvent {
    CallStateChanged(CallState),
    NegotiationStateChanged(NegotiationState),
    ParticipantJoined(ParticipantInfo),
    ParticipantLeft(String), // participant id
    StreamBound {
        participant_id: String,
        stream: StreamHandle,
    },
    SpeakingChanged {
        participant_id: String,
        speaking: bool,
    },
    /// `None` means the caption expired and should be hidden.
    SubtitleChanged {
        participant_id: String,
        text: Option<String>,
    },
    LocalMediaChanged(LocalMediaState),
    LanguagePairChanged(LanguagePair),
    TranslationModeChanged(TranslationMode),
    Notice(Notice),
    CallEnded(EndReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    NotInCall,
    Joining,
    InCall,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    Idle,
    Offering,
    Connecting,
    Connected,
    Renegotiating,
    Closed,
}

/// Snapshot of one participant for the rendering surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantInfo {
    pub id: String,
    pub display_name: String,
    pub stream: Option<StreamHandle>,
    pub is_local: bool,
    pub mic_enabled: bool,
    pub is_speaking: bool,
    pub subtitle: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LocalMediaState {
    pub mic_enabled: bool,
    pub camera_enabled: bool,
    pub screen_sharing: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Info,
    Warning,
    Error,
}

/// User-visible message; `detail` carries troubleshooting text when the
/// fault is environmental.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
    pub detail: Option<String>,
}

impl Notice {
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Warning,
            message: message.into(),
            detail: None,
        }
    }

    pub fn error(message: impl Into<String>, detail: Option<String>) -> Self {
        Self {
            kind: NoticeKind::Error,
            message: message.into(),
            detail,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndReason {
    HungUp,
    RemoteClosed,
    TransportFailed(String),
    ProtocolViolation(String),
}

/// Trait for receiving events from the core.
/// Implementations must be Send + Sync (called from tokio tasks).
pub trait CallEventListener: Send + Sync {
    fn on_event(&self, event: CallEvent);
}

/// Internal event emitter that dispatches to registered listeners.
#[derive(Clone, Default)]
pub struct EventEmitter {
    listeners: Arc<RwLock<Vec<Arc<dyn CallEventListener>>>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&self, listener: Arc<dyn CallEventListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    pub fn emit(&self, event: CallEvent) {
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        for listener in listeners.iter() {
            listener.on_event(event.clone());
        }
    }
}
