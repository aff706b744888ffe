//! Translated-media delivery: caption expiry timers, per-participant audio
//! queues and the caption history.

pub mod audio;
pub mod captions;
pub mod subtitles;

pub use audio::{AudioOutput, AudioPipeline, decode_audio_content};
pub use captions::{CaptionEntry, CaptionLog};
pub use subtitles::{SubtitleExpiry, SubtitleTimers};
