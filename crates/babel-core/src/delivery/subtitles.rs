use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Fired when a participant's caption has been quiet for the whole window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleExpiry {
    pub participant_id: String,
    pub generation: u64,
}

struct ArmedTimer {
    generation: u64,
    handle: JoinHandle<()>,
}

/// One countdown per participant, cancelled and replaced on every new
/// caption.
///
/// Expiries are delivered on a channel to the session actor rather than
/// applied from the timer task. Each arm gets a fresh generation, so an
/// expiry that was already in flight when a newer caption arrived is
/// recognized as stale and ignored.
pub struct SubtitleTimers {
    window: Duration,
    timers: HashMap<String, ArmedTimer>,
    next_generation: u64,
    expiries: mpsc::UnboundedSender<SubtitleExpiry>,
}

impl SubtitleTimers {
    pub fn new(window: Duration, expiries: mpsc::UnboundedSender<SubtitleExpiry>) -> Self {
        Self {
            window,
            timers: HashMap::new(),
            next_generation: 0,
            expiries,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// (Re)arm the timer for `participant_id`, returning its generation.
    pub fn arm(&mut self, participant_id: &str) -> u64 {
        self.cancel(participant_id);
        self.next_generation += 1;
        let generation = self.next_generation;

        let tx = self.expiries.clone();
        let window = self.window;
        let pid = participant_id.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let _ = tx.send(SubtitleExpiry {
                participant_id: pid,
                generation,
            });
        });

        self.timers.insert(
            participant_id.to_string(),
            ArmedTimer { generation, handle },
        );
        generation
    }

    /// Consume an expiry. Returns true if it belongs to the currently armed
    /// timer, in which case the caption should be cleared.
    pub fn take_if_current(&mut self, expiry: &SubtitleExpiry) -> bool {
        match self.timers.get(&expiry.participant_id) {
            Some(timer) if timer.generation == expiry.generation => {
                self.timers.remove(&expiry.participant_id);
                true
            }
            _ => {
                tracing::debug!(
                    "stale subtitle expiry for {} (gen {})",
                    expiry.participant_id,
                    expiry.generation
                );
                false
            }
        }
    }

    pub fn is_armed(&self, participant_id: &str) -> bool {
        self.timers.contains_key(participant_id)
    }

    pub fn cancel(&mut self, participant_id: &str) {
        if let Some(timer) = self.timers.remove(participant_id) {
            timer.handle.abort();
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, timer) in self.timers.drain() {
            timer.handle.abort();
        }
    }

    pub fn armed_count(&self) -> usize {
        self.timers.len()
    }
}

impl Drop for SubtitleTimers {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
