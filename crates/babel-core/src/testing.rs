//! Test doubles for the host-side collaborators.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, mpsc};

use crate::config::IceServer;
use crate::delivery::AudioOutput;
use crate::errors::BabelError;
use crate::events::{CallEvent, CallEventListener, EventEmitter};
use crate::media::{LocalMedia, MediaCaptureProvider, MediaConstraints, MediaTrack, TrackHandle, TrackKind, TrackSource};
use crate::negotiation::{PeerConnector, PeerEvent, PeerTransport};
use crate::signaling::{IceCandidate, OutboundSignal, Outgoing, SessionDescription, SignalSender};

// ── Tracks ───────────────────────────────────────────────────────────

pub struct FakeTrack {
    id: String,
    kind: TrackKind,
    source: TrackSource,
    enabled: AtomicBool,
    stops: AtomicUsize,
    ended: AtomicBool,
    ended_notify: Notify,
}

impl FakeTrack {
    fn build(id: &str, kind: TrackKind, source: TrackSource) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            kind,
            source,
            enabled: AtomicBool::new(true),
            stops: AtomicUsize::new(0),
            ended: AtomicBool::new(false),
            ended_notify: Notify::new(),
        })
    }

    pub fn audio(id: &str) -> Arc<Self> {
        Self::build(id, TrackKind::Audio, TrackSource::Microphone)
    }

    pub fn camera(id: &str) -> Arc<Self> {
        Self::build(id, TrackKind::Video, TrackSource::Camera)
    }

    pub fn screen(id: &str) -> Arc<Self> {
        Self::build(id, TrackKind::Video, TrackSource::ScreenShare)
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Simulate the OS ending the track (e.g. revoking a screen grant).
    pub fn revoke(&self) {
        self.ended.store(true, Ordering::SeqCst);
        self.ended_notify.notify_waiters();
    }
}

#[async_trait]
impl MediaTrack for FakeTrack {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn source(&self) -> TrackSource {
        self.source
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    async fn ended(&self) {
        loop {
            let notified = self.ended_notify.notified();
            if self.ended.load(Ordering::SeqCst) {
                return;
            }
            notified.await;
        }
    }
}

pub fn local_media(id: &str, tracks: &[Arc<FakeTrack>]) -> LocalMedia {
    LocalMedia::new(
        id,
        tracks.iter().map(|t| t.clone() as TrackHandle).collect(),
    )
}

// ── Capture ──────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeCapture {
    deny_screen: AtomicBool,
    screens: Mutex<Vec<Arc<FakeTrack>>>,
}

impl FakeCapture {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn deny_screen(&self, deny: bool) {
        self.deny_screen.store(deny, Ordering::SeqCst);
    }

    pub fn last_screen_track(&self) -> Option<Arc<FakeTrack>> {
        self.screens.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl MediaCaptureProvider for FakeCapture {
    async fn acquire_local_media(&self, _constraints: &MediaConstraints) -> Result<LocalMedia, BabelError> {
        Ok(local_media(
            "camera-media",
            &[FakeTrack::audio("mic"), FakeTrack::camera("cam")],
        ))
    }

    async fn acquire_screen_media(&self) -> Result<LocalMedia, BabelError> {
        if self.deny_screen.load(Ordering::SeqCst) {
            return Err(BabelError::PermissionDenied("screen capture blocked".into()));
        }
        let mut screens = self.screens.lock().unwrap();
        let n = screens.len() + 1;
        let track = FakeTrack::screen(&format!("screen-{n}"));
        screens.push(track.clone());
        Ok(local_media(&format!("screen-media-{n}"), &[track]))
    }
}

// ── Signaling ────────────────────────────────────────────────────────

pub struct SignalSink {
    rx: mpsc::UnboundedReceiver<Outgoing>,
}

impl SignalSink {
    pub fn next(&mut self) -> Option<OutboundSignal> {
        loop {
            match self.rx.try_recv() {
                Ok(Outgoing::Signal(signal)) => return Some(signal),
                Ok(Outgoing::Close) => continue,
                Err(_) => return None,
            }
        }
    }

    pub fn drain(&mut self) -> Vec<OutboundSignal> {
        std::iter::from_fn(|| self.next()).collect()
    }
}

pub fn signal_pair() -> (SignalSender, SignalSink) {
    let (tx, rx) = mpsc::unbounded_channel();
    (SignalSender::new(tx, "memory://test"), SignalSink { rx })
}

// ── Peer transport ───────────────────────────────────────────────────

#[derive(Default)]
struct TransportLog {
    offers: usize,
    remote_set: bool,
    applied: Vec<String>,
    applied_early: bool,
    rejected: HashSet<String>,
    refuse_replace: bool,
    replaced: Vec<String>,
    closes: usize,
}

#[derive(Default)]
pub struct FakeTransport {
    log: Mutex<TransportLog>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reject_candidate(&self, candidate: &str) {
        self.log.lock().unwrap().rejected.insert(candidate.to_string());
    }

    pub fn refuse_replace(&self) {
        self.log.lock().unwrap().refuse_replace = true;
    }

    pub fn applied_candidates(&self) -> Vec<String> {
        self.log.lock().unwrap().applied.clone()
    }

    pub fn candidate_applied_without_remote(&self) -> bool {
        self.log.lock().unwrap().applied_early
    }

    pub fn replaced_tracks(&self) -> Vec<String> {
        self.log.lock().unwrap().replaced.clone()
    }

    pub fn close_count(&self) -> usize {
        self.log.lock().unwrap().closes
    }

    pub fn offer_count(&self) -> usize {
        self.log.lock().unwrap().offers
    }
}

#[async_trait]
impl PeerTransport for FakeTransport {
    async fn create_offer(&self) -> Result<SessionDescription, BabelError> {
        let mut log = self.log.lock().unwrap();
        log.offers += 1;
        Ok(SessionDescription::offer(format!("v=0 offer-{}", log.offers)))
    }

    async fn set_local_description(&self, _description: &SessionDescription) -> Result<(), BabelError> {
        Ok(())
    }

    async fn set_remote_description(&self, description: &SessionDescription) -> Result<(), BabelError> {
        if description.sdp.trim().is_empty() {
            return Err(BabelError::ProtocolViolation("malformed SDP: empty description".into()));
        }
        self.log.lock().unwrap().remote_set = true;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<(), BabelError> {
        let mut log = self.log.lock().unwrap();
        if !log.remote_set {
            log.applied_early = true;
        }
        if log.rejected.contains(&candidate.candidate) {
            return Err(BabelError::DecodeFailure(format!(
                "unparseable candidate '{}'",
                candidate.candidate
            )));
        }
        log.applied.push(candidate.candidate.clone());
        Ok(())
    }

    async fn replace_video_track(&self, track: TrackHandle) -> Result<(), BabelError> {
        let mut log = self.log.lock().unwrap();
        if log.refuse_replace {
            return Err(BabelError::TrackReplacement("in-place replacement unsupported".into()));
        }
        log.replaced.push(track.id());
        Ok(())
    }

    async fn close(&self) {
        self.log.lock().unwrap().closes += 1;
    }
}

#[derive(Default)]
pub struct FakePeerConnector {
    transport: Arc<FakeTransport>,
    events: Mutex<Option<mpsc::UnboundedSender<PeerEvent>>>,
    created: AtomicUsize,
    seeded: Mutex<Vec<String>>,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl FakePeerConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn transport(&self) -> Arc<FakeTransport> {
        self.transport.clone()
    }

    pub fn emit(&self, event: PeerEvent) {
        if let Some(tx) = self.events.lock().unwrap().as_ref() {
            let _ = tx.send(event);
        }
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn seeded_tracks(&self) -> Vec<String> {
        self.seeded.lock().unwrap().clone()
    }

    /// Make the next `create` wait until the returned gate is notified.
    pub fn hold(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }
}

#[async_trait]
impl PeerConnector for FakePeerConnector {
    async fn create(
        &self,
        _ice_servers: &[IceServer],
        local_tracks: &[TrackHandle],
    ) -> Result<(Arc<dyn PeerTransport>, mpsc::UnboundedReceiver<PeerEvent>), BabelError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        *self.seeded.lock().unwrap() = local_tracks.iter().map(|t| t.id()).collect();
        let (tx, rx) = mpsc::unbounded_channel();
        *self.events.lock().unwrap() = Some(tx);
        let transport: Arc<dyn PeerTransport> = self.transport.clone();
        Ok((transport, rx))
    }
}

// ── Audio output ─────────────────────────────────────────────────────

#[derive(Default)]
struct PlaybackLog {
    played: HashMap<String, Vec<Vec<u8>>>,
    attempted: HashMap<String, usize>,
    active: HashMap<String, usize>,
    max_active: HashMap<String, usize>,
    delays: HashMap<String, Duration>,
    fail_on: HashSet<Vec<u8>>,
}

/// Plays chunks by sleeping, recording what finished.
pub struct RecordingAudioOutput {
    default_delay: Duration,
    log: Mutex<PlaybackLog>,
}

impl RecordingAudioOutput {
    pub fn new(default_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            default_delay,
            log: Mutex::new(PlaybackLog::default()),
        })
    }

    pub fn fail_on(&self, chunk: &[u8]) {
        self.log.lock().unwrap().fail_on.insert(chunk.to_vec());
    }

    pub fn set_delay(&self, participant_id: &str, delay: Duration) {
        self.log
            .lock()
            .unwrap()
            .delays
            .insert(participant_id.to_string(), delay);
    }

    pub fn played(&self, participant_id: &str) -> Vec<Vec<u8>> {
        self.log
            .lock()
            .unwrap()
            .played
            .get(participant_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn attempted(&self, participant_id: &str) -> usize {
        self.log
            .lock()
            .unwrap()
            .attempted
            .get(participant_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn max_concurrent(&self, participant_id: &str) -> usize {
        self.log
            .lock()
            .unwrap()
            .max_active
            .get(participant_id)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl AudioOutput for RecordingAudioOutput {
    async fn play(&self, participant_id: &str, chunk: Vec<u8>) -> Result<(), BabelError> {
        let delay = {
            let mut log = self.log.lock().unwrap();
            *log.attempted.entry(participant_id.to_string()).or_default() += 1;
            if log.fail_on.contains(&chunk) {
                return Err(BabelError::DecodeFailure("corrupt chunk".into()));
            }
            let active = {
                let a = log.active.entry(participant_id.to_string()).or_default();
                *a += 1;
                *a
            };
            let max = log.max_active.entry(participant_id.to_string()).or_default();
            *max = (*max).max(active);
            log.delays
                .get(participant_id)
                .copied()
                .unwrap_or(self.default_delay)
        };

        tokio::time::sleep(delay).await;

        let mut log = self.log.lock().unwrap();
        if let Some(a) = log.active.get_mut(participant_id) {
            *a -= 1;
        }
        log.played
            .entry(participant_id.to_string())
            .or_default()
            .push(chunk);
        Ok(())
    }
}

// ── Events ───────────────────────────────────────────────────────────

#[derive(Default)]
pub struct EventCapture {
    events: Mutex<Vec<CallEvent>>,
}

impl EventCapture {
    pub fn attach(emitter: &EventEmitter) -> Arc<Self> {
        let capture = Arc::new(Self::default());
        emitter.add_listener(capture.clone());
        capture
    }

    pub fn events(&self) -> Vec<CallEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&CallEvent) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| pred(e)).count()
    }
}

impl CallEventListener for EventCapture {
    fn on_event(&self, event: CallEvent) {
        self.events.lock().unwrap().push(event);
    }
}
