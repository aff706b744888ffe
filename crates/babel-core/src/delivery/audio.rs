use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use base64::Engine;
use tokio::task::JoinHandle;

use crate::errors::BabelError;

/// Host-side audio sink for translated speech.
#[async_trait]
pub trait AudioOutput: Send + Sync {
    /// Decode and play one chunk, resolving once playback has finished.
    /// Undecodable input fails with [`BabelError::DecodeFailure`].
    async fn play(&self, participant_id: &str, chunk: Vec<u8>) -> Result<(), BabelError>;
}

/// Decode the transport encoding of a `translated_audio` payload.
pub fn decode_audio_content(encoded: &str) -> Result<Vec<u8>, BabelError> {
    base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| BabelError::DecodeFailure(format!("invalid base64 audio payload: {e}")))
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Vec<u8>>,
    is_playing: bool,
    closed: bool,
}

/// Translated-audio queue for one participant.
struct ParticipantQueue {
    participant_id: String,
    state: Mutex<QueueState>,
    drain: Mutex<Option<JoinHandle<()>>>,
}

impl ParticipantQueue {
    fn new(participant_id: &str) -> Self {
        Self {
            participant_id: participant_id.to_string(),
            state: Mutex::new(QueueState::default()),
            drain: Mutex::new(None),
        }
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a chunk, starting the drain if nothing is playing.
    fn push(self: &Arc<Self>, chunk: Vec<u8>, output: Arc<dyn AudioOutput>) {
        let start = {
            let mut state = self.state();
            if state.closed {
                return;
            }
            state.pending.push_back(chunk);
            if state.is_playing {
                false
            } else {
                state.is_playing = true;
                true
            }
        };
        if start {
            let queue = self.clone();
            let handle = tokio::spawn(async move { queue.drain(output).await });
            *self.drain.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        }
    }

    async fn drain(self: Arc<Self>, output: Arc<dyn AudioOutput>) {
        loop {
            // Popping and clearing `is_playing` happen under one lock so a
            // concurrent push either lands before the pop or restarts the
            // drain itself.
            let chunk = {
                let mut state = self.state();
                match state.pending.pop_front() {
                    Some(chunk) if !state.closed => chunk,
                    _ => {
                        state.is_playing = false;
                        return;
                    }
                }
            };

            let len = chunk.len();
            match output.play(&self.participant_id, chunk).await {
                Ok(()) => {
                    tracing::debug!("played translated chunk for {} ({len} bytes)", self.participant_id)
                }
                Err(e) => tracing::warn!(
                    "dropping translated chunk for {} ({len} bytes): {e}",
                    self.participant_id
                ),
            }
        }
    }

    fn stop(&self) {
        {
            let mut state = self.state();
            state.closed = true;
            state.pending.clear();
            state.is_playing = false;
        }
        if let Some(handle) = self.drain.lock().unwrap_or_else(PoisonError::into_inner).take() {
            handle.abort();
        }
    }
}

/// Per-participant sequential playback of translated speech.
///
/// Chunks for one participant play strictly in arrival order with no
/// overlap. Different participants drain on independent tasks, so a slow
/// decode for one never delays another. Chunks from a participant who
/// has left are dropped until they join again.
pub struct AudioPipeline {
    output: Arc<dyn AudioOutput>,
    queues: HashMap<String, Arc<ParticipantQueue>>,
    departed: HashSet<String>,
}

impl AudioPipeline {
    pub fn new(output: Arc<dyn AudioOutput>) -> Self {
        Self {
            output,
            queues: HashMap::new(),
            departed: HashSet::new(),
        }
    }

    pub fn enqueue(&mut self, participant_id: &str, chunk: Vec<u8>) {
        if self.departed.contains(participant_id) {
            tracing::debug!("dropping translated chunk from departed {participant_id}");
            return;
        }
        let queue = self
            .queues
            .entry(participant_id.to_string())
            .or_insert_with(|| Arc::new(ParticipantQueue::new(participant_id)))
            .clone();
        queue.push(chunk, self.output.clone());
    }

    pub fn pending_len(&self, participant_id: &str) -> usize {
        self.queues
            .get(participant_id)
            .map(|q| q.state().pending.len())
            .unwrap_or(0)
    }

    pub fn is_playing(&self, participant_id: &str) -> bool {
        self.queues
            .get(participant_id)
            .map(|q| q.state().is_playing)
            .unwrap_or(false)
    }

    pub fn has_queue(&self, participant_id: &str) -> bool {
        self.queues.contains_key(participant_id)
    }

    /// Stop and forget one participant's queue (they left the room).
    pub fn remove(&mut self, participant_id: &str) {
        self.departed.insert(participant_id.to_string());
        if let Some(queue) = self.queues.remove(participant_id) {
            queue.stop();
        }
    }

    /// Accept chunks again from a participant who rejoined.
    pub fn readmit(&mut self, participant_id: &str) {
        self.departed.remove(participant_id);
    }

    /// Stop all in-flight playback and discard every backlog.
    pub fn stop_all(&mut self) {
        for (_, queue) in self.queues.drain() {
            queue.stop();
        }
    }
}

impl Drop for AudioPipeline {
    fn drop(&mut self) {
        self.stop_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingAudioOutput;
    use std::time::Duration;

    #[test]
    fn decodes_base64_payloads() {
        assert_eq!(decode_audio_content("AAEC").unwrap(), vec![0, 1, 2]);
        assert!(matches!(
            decode_audio_content("***"),
            Err(BabelError::DecodeFailure(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn chunks_play_in_arrival_order() {
        let output = RecordingAudioOutput::new(Duration::from_millis(100));
        let mut pipeline = AudioPipeline::new(output.clone());

        pipeline.enqueue("user_a", b"c1".to_vec());
        pipeline.enqueue("user_a", b"c2".to_vec());
        pipeline.enqueue("user_a", b"c3".to_vec());
        assert!(pipeline.is_playing("user_a"));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(output.played("user_a"), vec![b"c1".to_vec(), b"c2".to_vec(), b"c3".to_vec()]);
        assert!(!pipeline.is_playing("user_a"));
        assert_eq!(output.max_concurrent("user_a"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn decode_failure_does_not_stall_queue() {
        let output = RecordingAudioOutput::new(Duration::from_millis(100));
        output.fail_on(b"c2");
        let mut pipeline = AudioPipeline::new(output.clone());

        pipeline.enqueue("user_a", b"c1".to_vec());
        pipeline.enqueue("user_a", b"c2".to_vec());
        pipeline.enqueue("user_a", b"c3".to_vec());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(output.played("user_a"), vec![b"c1".to_vec(), b"c3".to_vec()]);
        assert_eq!(output.attempted("user_a"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_participant_does_not_block_others() {
        let output = RecordingAudioOutput::new(Duration::from_millis(100));
        output.set_delay("user_a", Duration::from_secs(10));
        let mut pipeline = AudioPipeline::new(output.clone());

        pipeline.enqueue("user_a", b"slow".to_vec());
        pipeline.enqueue("user_b", b"fast".to_vec());

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(output.played("user_b"), vec![b"fast".to_vec()]);
        assert!(output.played("user_a").is_empty());
        assert!(pipeline.is_playing("user_a"));
    }

    #[tokio::test(start_paused = true)]
    async fn chunk_arriving_after_drain_restarts_playback() {
        let output = RecordingAudioOutput::new(Duration::from_millis(100));
        let mut pipeline = AudioPipeline::new(output.clone());

        pipeline.enqueue("user_a", b"c1".to_vec());
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!pipeline.is_playing("user_a"));

        pipeline.enqueue("user_a", b"c2".to_vec());
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(output.played("user_a"), vec![b"c1".to_vec(), b"c2".to_vec()]);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_all_abandons_backlog_and_inflight_chunk() {
        let output = RecordingAudioOutput::new(Duration::from_secs(1));
        let mut pipeline = AudioPipeline::new(output.clone());

        pipeline.enqueue("user_a", b"c1".to_vec());
        pipeline.enqueue("user_a", b"c2".to_vec());
        tokio::time::sleep(Duration::from_millis(10)).await;
        pipeline.stop_all();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(output.played("user_a").is_empty());
        assert_eq!(output.attempted("user_a"), 1);
        assert!(!pipeline.has_queue("user_a"));
    }

    #[tokio::test(start_paused = true)]
    async fn removed_participant_queue_is_discarded() {
        let output = RecordingAudioOutput::new(Duration::from_millis(100));
        let mut pipeline = AudioPipeline::new(output.clone());
        pipeline.enqueue("user_a", b"c1".to_vec());
        pipeline.enqueue("user_a", b"c2".to_vec());
        pipeline.remove("user_a");
        assert_eq!(pipeline.pending_len("user_a"), 0);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(output.played("user_a").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn late_chunks_from_departed_participant_are_dropped() {
        let output = RecordingAudioOutput::new(Duration::from_millis(100));
        let mut pipeline = AudioPipeline::new(output.clone());
        pipeline.remove("user_a");
        pipeline.enqueue("user_a", b"late".to_vec());
        assert!(!pipeline.has_queue("user_a"));

        pipeline.readmit("user_a");
        pipeline.enqueue("user_a", b"back".to_vec());
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(output.played("user_a"), vec![b"back".to_vec()]);
        assert_eq!(output.attempted("user_a"), 1);
    }
}
