use tokio::time::Instant;

use crate::config::{LanguagePair, TranslationMode};
use crate::events::ParticipantInfo;
use crate::media::StreamHandle;

/// One participant as tracked by the room.
#[derive(Debug, Clone)]
pub struct Participant {
    pub id: String,
    pub display_name: String,
    pub stream: Option<StreamHandle>,
    pub is_local: bool,
    pub mic_enabled: bool,
    pub is_speaking: bool,
    pub current_subtitle: String,
    pub subtitle_expiry: Option<Instant>,
}

impl Participant {
    pub fn local(id: &str, display_name: &str, stream: StreamHandle) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            stream: Some(stream),
            is_local: true,
            mic_enabled: true,
            is_speaking: false,
            current_subtitle: String::new(),
            subtitle_expiry: None,
        }
    }

    pub fn remote(id: &str) -> Self {
        Self {
            id: id.to_string(),
            display_name: remote_display_name(id),
            stream: None,
            is_local: false,
            mic_enabled: true,
            is_speaking: false,
            current_subtitle: String::new(),
            subtitle_expiry: None,
        }
    }

    pub fn info(&self) -> ParticipantInfo {
        ParticipantInfo {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
            stream: self.stream.clone(),
            is_local: self.is_local,
            mic_enabled: self.mic_enabled,
            is_speaking: self.is_speaking,
            subtitle: self.current_subtitle.clone(),
        }
    }
}

/// `Remote` plus a short tag taken from the participant id.
pub fn remote_display_name(id: &str) -> String {
    let short: String = id.strip_prefix("user_").unwrap_or(id).chars().take(4).collect();
    format!("Remote {short}")
}

/// Membership and per-participant state of the active call.
///
/// A reducer over incoming events. Events naming an unknown participant
/// are ignored for `leave`, `set_speaking` and `set_subtitle` (late
/// arrivals after a leave are normal under jitter); `join` and
/// `bind_stream` create the record when it is missing, since a media track
/// can arrive before the join signal.
#[derive(Debug, Clone)]
pub struct Room {
    id: String,
    participants: Vec<Participant>,
    language_pair: LanguagePair,
    translation_mode: TranslationMode,
}

impl Room {
    pub fn new(
        id: &str,
        local: Participant,
        language_pair: LanguagePair,
        translation_mode: TranslationMode,
    ) -> Self {
        Self {
            id: id.to_string(),
            participants: vec![local],
            language_pair,
            translation_mode,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn language_pair(&self) -> &LanguagePair {
        &self.language_pair
    }

    pub fn set_language_pair(&mut self, pair: LanguagePair) {
        self.language_pair = pair;
    }

    pub fn translation_mode(&self) -> TranslationMode {
        self.translation_mode
    }

    pub fn set_translation_mode(&mut self, mode: TranslationMode) {
        self.translation_mode = mode;
    }

    /// Returns the new record when `participant_id` was not yet present.
    pub fn join(&mut self, participant_id: &str) -> Option<ParticipantInfo> {
        if self.participant(participant_id).is_some() {
            return None;
        }
        let participant = Participant::remote(participant_id);
        let info = participant.info();
        self.participants.push(participant);
        Some(info)
    }

    /// Returns true when a remote participant was removed.
    pub fn leave(&mut self, participant_id: &str) -> bool {
        if self.local().is_some_and(|p| p.id == participant_id) {
            tracing::warn!("ignoring leave for the local participant {participant_id}");
            return false;
        }
        let before = self.participants.len();
        self.participants.retain(|p| p.id != participant_id);
        self.participants.len() != before
    }

    /// Returns true when the speaking flag actually changed.
    pub fn set_speaking(&mut self, participant_id: &str, speaking: bool) -> bool {
        match self.participant_mut(participant_id) {
            Some(p) if p.is_speaking != speaking => {
                p.is_speaking = speaking;
                true
            }
            _ => false,
        }
    }

    /// Returns false when the participant is unknown.
    pub fn set_subtitle(&mut self, participant_id: &str, text: &str, expires_at: Instant) -> bool {
        match self.participant_mut(participant_id) {
            Some(p) => {
                p.current_subtitle = text.to_string();
                p.subtitle_expiry = Some(expires_at);
                true
            }
            None => false,
        }
    }

    /// Returns true when a caption was showing and has been cleared.
    pub fn clear_subtitle(&mut self, participant_id: &str) -> bool {
        match self.participant_mut(participant_id) {
            Some(p) if !p.current_subtitle.is_empty() => {
                p.current_subtitle.clear();
                p.subtitle_expiry = None;
                true
            }
            _ => false,
        }
    }

    /// Attach a stream, creating the participant if needed. Returns the
    /// record when it was created by this call.
    pub fn bind_stream(&mut self, participant_id: &str, stream: StreamHandle) -> Option<ParticipantInfo> {
        let created = self.join(participant_id);
        if let Some(p) = self.participant_mut(participant_id) {
            p.stream = Some(stream);
        }
        created
    }

    pub fn set_mic_enabled(&mut self, participant_id: &str, enabled: bool) -> bool {
        match self.participant_mut(participant_id) {
            Some(p) => {
                p.mic_enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn participant(&self, participant_id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == participant_id)
    }

    pub fn participant_mut(&mut self, participant_id: &str) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.id == participant_id)
    }

    pub fn local(&self) -> Option<&Participant> {
        self.participants.iter().find(|p| p.is_local)
    }

    pub fn local_mut(&mut self) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.is_local)
    }

    /// Participants in join order.
    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn snapshot(&self) -> Vec<ParticipantInfo> {
        self.participants.iter().map(Participant::info).collect()
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }
}
