use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};

/// Oldest entries are dropped past this many captions.
const MAX_CAPTIONS: usize = 500;

/// One received caption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionEntry {
    pub id: String,
    pub participant_id: String,
    pub text: String,
    pub received_at: DateTime<Utc>,
}

/// In-memory caption history for the current call.
///
/// Shared between the session actor (writer) and UI readers. Cleared on
/// hang-up; nothing is persisted.
#[derive(Clone, Default)]
pub struct CaptionLog {
    entries: Arc<Mutex<Vec<CaptionEntry>>>,
}

impl CaptionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, participant_id: &str, text: &str) -> CaptionEntry {
        let entry = CaptionEntry {
            id: uuid::Uuid::new_v4().to_string(),
            participant_id: participant_id.to_string(),
            text: text.to_string(),
            received_at: Utc::now(),
        };
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.push(entry.clone());
        let overflow = entries.len().saturating_sub(MAX_CAPTIONS);
        if overflow > 0 {
            entries.drain(..overflow);
        }
        entry
    }

    pub fn entries(&self) -> Vec<CaptionEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn for_participant(&self, participant_id: &str) -> Vec<CaptionEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.participant_id == participant_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
