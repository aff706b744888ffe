//! Local media handles and the capture collaborator.
//!
//! The core never touches hardware. Hosts implement [`MediaTrack`] over
//! their platform tracks and [`MediaCaptureProvider`] over their capture
//! APIs; the session controller only flips enabled flags, swaps the
//! outgoing video track and stops tracks on teardown.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::BabelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackSource {
    Microphone,
    Camera,
    ScreenShare,
    Unknown,
}

/// A local capture track owned by the host platform.
#[async_trait]
pub trait MediaTrack: Send + Sync {
    fn id(&self) -> String;
    fn kind(&self) -> TrackKind;
    fn source(&self) -> TrackSource;
    fn is_enabled(&self) -> bool;
    fn set_enabled(&self, enabled: bool);
    /// Release the underlying device. Must tolerate repeated calls.
    fn stop(&self);
    /// Resolves once the environment ends the track on its own, e.g. when
    /// the OS revokes a screen-capture grant.
    async fn ended(&self);
}

pub type TrackHandle = Arc<dyn MediaTrack>;

/// Opaque stream identity handed to the rendering surface.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamHandle {
    pub stream_id: String,
}

impl StreamHandle {
    pub fn new(stream_id: impl Into<String>) -> Self {
        Self {
            stream_id: stream_id.into(),
        }
    }
}

/// A set of local tracks acquired together (camera + mic, or a screen).
#[derive(Clone)]
pub struct LocalMedia {
    id: String,
    tracks: Vec<TrackHandle>,
}

impl fmt::Debug for LocalMedia {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<String> = self.tracks.iter().map(|t| t.id()).collect();
        f.debug_struct("LocalMedia")
            .field("id", &self.id)
            .field("tracks", &ids)
            .finish()
    }
}

impl LocalMedia {
    pub fn new(id: impl Into<String>, tracks: Vec<TrackHandle>) -> Self {
        Self {
            id: id.into(),
            tracks,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn handle(&self) -> StreamHandle {
        StreamHandle::new(self.id.clone())
    }

    pub fn tracks(&self) -> &[TrackHandle] {
        &self.tracks
    }

    pub fn audio_track(&self) -> Option<TrackHandle> {
        self.tracks
            .iter()
            .find(|t| t.kind() == TrackKind::Audio)
            .cloned()
    }

    pub fn video_track(&self) -> Option<TrackHandle> {
        self.tracks
            .iter()
            .find(|t| t.kind() == TrackKind::Video)
            .cloned()
    }

    pub fn has_video(&self) -> bool {
        self.tracks.iter().any(|t| t.kind() == TrackKind::Video)
    }

    pub fn stop_all(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }
}

/// Capture constraints passed to the host when acquiring camera and mic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaConstraints {
    pub audio_device_id: Option<String>,
    pub video_device_id: Option<String>,
    pub ideal_width: u32,
    pub ideal_height: u32,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            audio_device_id: None,
            video_device_id: None,
            ideal_width: 1280,
            ideal_height: 720,
        }
    }
}

/// Host-side capture. Either call may fail with
/// [`BabelError::PermissionDenied`].
#[async_trait]
pub trait MediaCaptureProvider: Send + Sync {
    async fn acquire_local_media(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<LocalMedia, BabelError>;

    async fn acquire_screen_media(&self) -> Result<LocalMedia, BabelError>;
}
