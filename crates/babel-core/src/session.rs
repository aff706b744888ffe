//! Call lifecycle: join, in-call controls and teardown.
//!
//! `CallSession` is the handle the UI holds. Per-call state lives in an
//! [`ActiveCall`] behind the session lock; a spawned event loop applies
//! signaling messages, transport events, caption expiries and screen-share
//! endings to it one at a time.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::{CallConfig, LanguagePair, LanguageSide, SignalingEndpoint, TranslationMode, generate_participant_id};
use crate::delivery::{AudioOutput, AudioPipeline, CaptionLog, SubtitleExpiry, SubtitleTimers, decode_audio_content};
use crate::errors::BabelError;
use crate::events::{
    CallEvent, CallEventListener, CallState, EndReason, EventEmitter, LocalMediaState, NegotiationState, Notice,
    ParticipantInfo,
};
use crate::media::{LocalMedia, MediaCaptureProvider, MediaConstraints};
use crate::membership::{Participant, Room};
use crate::negotiation::{Negotiator, PeerConnector, PeerEvent};
use crate::signaling::{ChannelEvent, InboundSignal, OutboundSignal, SignalSender, SignalingConnector};

const LOCAL_DISPLAY_NAME: &str = "You";

/// Host-side collaborators driven by a session.
#[derive(Clone)]
pub struct HostServices {
    pub signaling: Arc<dyn SignalingConnector>,
    pub peers: Arc<dyn PeerConnector>,
    pub capture: Arc<dyn MediaCaptureProvider>,
    pub audio: Arc<dyn AudioOutput>,
}

enum LoopCommand {
    ScreenShareEnded { generation: u64 },
}

struct ScreenShare {
    media: LocalMedia,
    generation: u64,
    watcher: JoinHandle<()>,
}

/// Everything owned by one call. Dropping it stops the event loop.
struct ActiveCall {
    room: Room,
    signals: SignalSender,
    negotiator: Negotiator,
    subtitles: SubtitleTimers,
    audio: AudioPipeline,
    camera: LocalMedia,
    screen: Option<ScreenShare>,
    screen_generation: u64,
    commands: mpsc::UnboundedSender<LoopCommand>,
    _shutdown: oneshot::Sender<()>,
}

impl ActiveCall {
    fn media_state(&self) -> LocalMediaState {
        LocalMediaState {
            mic_enabled: self.camera.audio_track().is_some_and(|t| t.is_enabled()),
            camera_enabled: self.camera.video_track().is_some_and(|t| t.is_enabled()),
            screen_sharing: self.screen.is_some(),
        }
    }

    /// Put the camera back on the outgoing video slot and release the screen.
    async fn end_screen_share(&mut self) -> Result<(), BabelError> {
        let Some(screen) = self.screen.take() else {
            return Ok(());
        };
        screen.watcher.abort();

        let restored = match self.camera.video_track() {
            Some(camera) => {
                let languages = self.room.language_pair().clone();
                self.negotiator
                    .replace_outgoing_video_track(camera, &languages)
                    .await
                    .map(|_| ())
            }
            None => Ok(()),
        };
        screen.media.stop_all();

        match restored {
            Err(e) if !e.is_fatal() => {
                tracing::warn!("could not restore the camera track: {e}");
                Ok(())
            }
            other => other,
        }
    }

    async fn release(mut self) {
        self.subtitles.cancel_all();
        self.audio.stop_all();
        self.negotiator.close().await;
        self.signals.close();
        if let Some(screen) = self.screen.take() {
            screen.watcher.abort();
            screen.media.stop_all();
        }
        self.camera.stop_all();
    }
}

struct SessionState {
    call_state: CallState,
    /// Bumped on every join attempt and teardown; stale loops and joins
    /// compare against it.
    epoch: u64,
    language_pair: LanguagePair,
    translation_mode: TranslationMode,
    active: Option<ActiveCall>,
}

enum Flow {
    Continue,
    End(EndReason),
}

struct Shared {
    state: Mutex<SessionState>,
    emitter: EventEmitter,
    captions: CaptionLog,
    local_id: String,
}

fn end_reason(error: &BabelError) -> EndReason {
    match error {
        BabelError::ProtocolViolation(detail) => EndReason::ProtocolViolation(detail.clone()),
        other => EndReason::TransportFailed(other.to_string()),
    }
}

impl Shared {
    fn emit(&self, event: CallEvent) {
        self.emitter.emit(event);
    }

    fn set_call_state(&self, state: &mut SessionState, next: CallState) {
        if state.call_state == next {
            return;
        }
        tracing::info!("call state {:?} -> {:?}", state.call_state, next);
        state.call_state = next;
        self.emit(CallEvent::CallStateChanged(next));
    }

    /// Release every per-call resource and return to `NotInCall`.
    /// Idempotent: a second call finds nothing to release.
    async fn teardown(&self, state: &mut SessionState, reason: EndReason) {
        let active = state.active.take();
        if active.is_none() && state.call_state == CallState::NotInCall {
            return;
        }
        state.epoch += 1;
        if let Some(active) = active {
            tracing::info!("tearing down call in room {} ({reason:?})", active.room.id());
            active.release().await;
        }
        self.captions.clear();
        self.set_call_state(state, CallState::NotInCall);
        self.emit(CallEvent::CallEnded(reason));
    }

    async fn fail(&self, state: &mut SessionState, error: &BabelError) {
        tracing::error!("call failed: {error}");
        let message = match error {
            BabelError::ProtocolViolation(_) => "The call ended because the server sent an unexpected message.",
            _ => "The call ended because the connection to the server was lost.",
        };
        self.emit(CallEvent::Notice(Notice::error(message, error.diagnostic())));
        self.teardown(state, end_reason(error)).await;
    }

    async fn handle_signal(&self, active: &mut ActiveCall, signal: InboundSignal) -> Result<Flow, BabelError> {
        match signal {
            InboundSignal::Answer { answer } => active.negotiator.apply_remote_answer(answer).await?,
            InboundSignal::Candidate { candidate } => active.negotiator.apply_remote_candidate(candidate).await?,
            InboundSignal::UserJoined { user_id } => {
                if user_id == self.local_id {
                    return Ok(Flow::Continue);
                }
                active.audio.readmit(&user_id);
                if let Some(info) = active.room.join(&user_id) {
                    tracing::info!("participant {user_id} joined");
                    self.emit(CallEvent::ParticipantJoined(info));
                }
            }
            InboundSignal::UserLeft { user_id } => {
                active.subtitles.cancel(&user_id);
                active.audio.remove(&user_id);
                if active.room.leave(&user_id) {
                    tracing::info!("participant {user_id} left");
                    self.emit(CallEvent::ParticipantLeft(user_id));
                }
            }
            InboundSignal::Speaking { from_user_id, speaking } => {
                if active.room.set_speaking(&from_user_id, speaking) {
                    self.emit(CallEvent::SpeakingChanged {
                        participant_id: from_user_id,
                        speaking,
                    });
                }
            }
            InboundSignal::Subtitle { from_user_id, text } => {
                let expires_at = Instant::now() + active.subtitles.window();
                if active.room.set_subtitle(&from_user_id, &text, expires_at) {
                    active.subtitles.arm(&from_user_id);
                    self.captions.record(&from_user_id, &text);
                    self.emit(CallEvent::SubtitleChanged {
                        participant_id: from_user_id,
                        text: Some(text),
                    });
                } else {
                    tracing::debug!("subtitle for unknown participant {from_user_id} ignored");
                }
            }
            InboundSignal::TranslatedAudio { from_user_id, audio_content } => {
                if !active.room.translation_mode().plays_audio() {
                    tracing::debug!("text-only mode, dropping translated audio from {from_user_id}");
                    return Ok(Flow::Continue);
                }
                match decode_audio_content(&audio_content) {
                    Ok(chunk) => active.audio.enqueue(&from_user_id, chunk),
                    Err(e) => tracing::warn!("dropping translated audio from {from_user_id}: {e}"),
                }
            }
        }
        Ok(Flow::Continue)
    }

    async fn handle_peer_event(&self, active: &mut ActiveCall, event: PeerEvent) -> Result<Flow, BabelError> {
        match event {
            PeerEvent::LocalCandidate(candidate) => active.negotiator.on_local_candidate_generated(candidate)?,
            PeerEvent::RemoteTrack(track) => {
                let binding = active.negotiator.on_remote_track_arrived(&track)?;
                if binding.participant_id == self.local_id {
                    tracing::debug!("ignoring loopback track {}", track.track_id);
                    return Ok(Flow::Continue);
                }
                if let Some(info) = active.room.bind_stream(&binding.participant_id, binding.stream.clone()) {
                    self.emit(CallEvent::ParticipantJoined(info));
                }
                self.emit(CallEvent::StreamBound {
                    participant_id: binding.participant_id,
                    stream: binding.stream,
                });
            }
            PeerEvent::Connected => active.negotiator.mark_connected(),
            PeerEvent::Failed(reason) => {
                self.emit(CallEvent::Notice(Notice::error(
                    "The media connection failed.",
                    Some(reason.clone()),
                )));
                return Ok(Flow::End(EndReason::TransportFailed(reason)));
            }
            PeerEvent::Closed => return Ok(Flow::End(EndReason::RemoteClosed)),
        }
        Ok(Flow::Continue)
    }

    fn handle_expiry(&self, active: &mut ActiveCall, expiry: SubtitleExpiry) {
        if active.subtitles.take_if_current(&expiry) && active.room.clear_subtitle(&expiry.participant_id) {
            self.emit(CallEvent::SubtitleChanged {
                participant_id: expiry.participant_id,
                text: None,
            });
        }
    }

    async fn handle_command(&self, active: &mut ActiveCall, command: LoopCommand) -> Result<Flow, BabelError> {
        match command {
            LoopCommand::ScreenShareEnded { generation } => {
                if active.screen.as_ref().is_some_and(|s| s.generation == generation) {
                    tracing::info!("screen share ended by the system, restoring camera");
                    active.end_screen_share().await?;
                    self.emit(CallEvent::LocalMediaChanged(active.media_state()));
                }
            }
        }
        Ok(Flow::Continue)
    }
}

enum Step {
    Channel(ChannelEvent),
    Peer(PeerEvent),
    Expiry(SubtitleExpiry),
    Command(LoopCommand),
}

struct LoopInputs {
    channel: mpsc::UnboundedReceiver<ChannelEvent>,
    peer: mpsc::UnboundedReceiver<PeerEvent>,
    expiries: mpsc::UnboundedReceiver<SubtitleExpiry>,
    commands: mpsc::UnboundedReceiver<LoopCommand>,
    shutdown: oneshot::Receiver<()>,
}

async fn event_loop(shared: Arc<Shared>, epoch: u64, mut inputs: LoopInputs) {
    loop {
        let step = tokio::select! {
            _ = &mut inputs.shutdown => break,
            event = inputs.channel.recv() => {
                Step::Channel(event.unwrap_or(ChannelEvent::Closed { reason: None }))
            }
            Some(event) = inputs.peer.recv() => Step::Peer(event),
            Some(expiry) = inputs.expiries.recv() => Step::Expiry(expiry),
            Some(command) = inputs.commands.recv() => Step::Command(command),
        };

        let mut guard = shared.state.lock().await;
        let state = &mut *guard;
        if state.epoch != epoch {
            break;
        }
        let Some(active) = state.active.as_mut() else {
            break;
        };

        let outcome = match step {
            Step::Channel(ChannelEvent::Message(signal)) => shared.handle_signal(active, signal).await,
            Step::Channel(ChannelEvent::Closed { reason }) => {
                tracing::info!(
                    "signaling channel closed by the server ({})",
                    reason.as_deref().unwrap_or("no reason")
                );
                shared.emit(CallEvent::Notice(Notice::warning("The call was closed by the server.")));
                Ok(Flow::End(EndReason::RemoteClosed))
            }
            Step::Channel(ChannelEvent::Failed(error)) => Err(error),
            Step::Peer(event) => shared.handle_peer_event(active, event).await,
            Step::Expiry(expiry) => {
                shared.handle_expiry(active, expiry);
                Ok(Flow::Continue)
            }
            Step::Command(command) => shared.handle_command(active, command).await,
        };

        match outcome {
            Ok(Flow::Continue) => {}
            Ok(Flow::End(reason)) => {
                shared.teardown(state, reason).await;
                break;
            }
            Err(e) if e.is_fatal() => {
                shared.fail(state, &e).await;
                break;
            }
            Err(e) => tracing::warn!("event not applied: {e}"),
        }
    }
    tracing::debug!("call event loop {epoch} finished");
}

/// One participant's view of calls: joins rooms, exposes in-call
/// controls and fans state changes out to listeners.
pub struct CallSession {
    config: CallConfig,
    host: HostServices,
    shared: Arc<Shared>,
}

impl CallSession {
    pub fn new(config: CallConfig, host: HostServices) -> Self {
        let local_id = config
            .participant_id
            .clone()
            .unwrap_or_else(generate_participant_id);
        let shared = Arc::new(Shared {
            state: Mutex::new(SessionState {
                call_state: CallState::NotInCall,
                epoch: 0,
                language_pair: LanguagePair::default(),
                translation_mode: config.translation_mode,
                active: None,
            }),
            emitter: EventEmitter::new(),
            captions: CaptionLog::new(),
            local_id,
        });
        Self { config, host, shared }
    }

    pub fn add_listener(&self, listener: Arc<dyn CallEventListener>) {
        self.shared.emitter.add_listener(listener);
    }

    pub fn local_participant_id(&self) -> &str {
        &self.shared.local_id
    }

    /// Captions received during the current call.
    pub fn captions(&self) -> CaptionLog {
        self.shared.captions.clone()
    }

    /// Ask the host for camera and microphone.
    pub async fn prepare_local_media(&self, constraints: &MediaConstraints) -> Result<LocalMedia, BabelError> {
        self.host
            .capture
            .acquire_local_media(constraints)
            .await
            .inspect_err(|e| {
                tracing::warn!("local media unavailable: {e}");
                if matches!(e, BabelError::PermissionDenied(_)) {
                    self.shared.emit(CallEvent::Notice(Notice::warning(
                        "Camera or microphone access was denied.",
                    )));
                }
            })
    }

    /// Join `room_id` with the given local media.
    ///
    /// The request is validated before any network I/O. On success the
    /// signaling channel is open, the initial offer has been sent and the
    /// session is `InCall`. On a transport failure the local media is
    /// stopped and the session returns to `NotInCall`.
    pub async fn join(&self, room_id: &str, local_media: LocalMedia, languages: LanguagePair) -> Result<(), BabelError> {
        let room_id = room_id.trim();
        if room_id.is_empty() {
            return Err(BabelError::InvalidJoinRequest("room id is empty".into()));
        }
        if !local_media.has_video() {
            return Err(BabelError::InvalidJoinRequest(
                "local media has no video track".into(),
            ));
        }
        let endpoint = SignalingEndpoint::new(&self.config.signaling_url, room_id, &self.shared.local_id)?;

        let epoch = {
            let mut state = self.shared.state.lock().await;
            if state.call_state != CallState::NotInCall {
                return Err(BabelError::InvalidJoinRequest(format!(
                    "already {:?}",
                    state.call_state
                )));
            }
            state.epoch += 1;
            state.language_pair = languages.clone();
            self.shared.set_call_state(&mut state, CallState::Joining);
            state.epoch
        };
        tracing::info!("joining room {room_id} as {} via {}", self.shared.local_id, endpoint.url());

        if let Some(mic) = local_media.audio_track() {
            mic.set_enabled(self.config.mic_enabled_on_join);
        }
        if let Some(camera) = local_media.video_track() {
            camera.set_enabled(self.config.camera_enabled_on_join);
        }

        let channel = match self.host.signaling.connect(&endpoint).await {
            Ok(channel) => channel,
            Err(e) => {
                self.abort_join(epoch, &local_media, &e).await;
                return Err(e);
            }
        };
        let (transport, peer_events) = match self
            .host
            .peers
            .create(&self.config.ice_servers, local_media.tracks())
            .await
        {
            Ok(created) => created,
            Err(e) => {
                channel.sender.close();
                self.abort_join(epoch, &local_media, &e).await;
                return Err(e);
            }
        };

        let mut guard = self.shared.state.lock().await;
        let state = &mut *guard;
        if state.epoch != epoch || state.call_state != CallState::Joining {
            tracing::info!("hung up while joining {room_id}");
            channel.sender.close();
            transport.close().await;
            local_media.stop_all();
            return Err(BabelError::SessionClosed);
        }

        let (expiry_tx, expiry_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let display_name = self
            .config
            .display_name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| LOCAL_DISPLAY_NAME.to_string());
        let mut local = Participant::local(&self.shared.local_id, &display_name, local_media.handle());
        local.mic_enabled = local_media.audio_track().is_some_and(|t| t.is_enabled());

        let negotiator = Negotiator::new(
            room_id,
            transport,
            channel.sender.clone(),
            self.shared.emitter.clone(),
            local_media.video_track(),
        );
        state.active = Some(ActiveCall {
            room: Room::new(room_id, local, languages.clone(), state.translation_mode),
            signals: channel.sender,
            negotiator,
            subtitles: SubtitleTimers::new(self.config.subtitle_window, expiry_tx),
            audio: AudioPipeline::new(self.host.audio.clone()),
            camera: local_media,
            screen: None,
            screen_generation: 0,
            commands: command_tx,
            _shutdown: shutdown_tx,
        });

        let Some(active) = state.active.as_mut() else {
            return Err(BabelError::SessionClosed);
        };
        if let Err(e) = active.negotiator.start_as_offerer(&languages).await {
            self.shared.fail(state, &e).await;
            return Err(e);
        }
        let participants = active.room.snapshot();
        let media_state = active.media_state();

        self.shared.set_call_state(state, CallState::InCall);
        for info in participants {
            self.shared.emit(CallEvent::ParticipantJoined(info));
        }
        self.shared.emit(CallEvent::LocalMediaChanged(media_state));
        drop(guard);

        let inputs = LoopInputs {
            channel: channel.events,
            peer: peer_events,
            expiries: expiry_rx,
            commands: command_rx,
            shutdown: shutdown_rx,
        };
        tokio::spawn(event_loop(self.shared.clone(), epoch, inputs));
        Ok(())
    }

    async fn abort_join(&self, epoch: u64, local_media: &LocalMedia, error: &BabelError) {
        local_media.stop_all();
        let mut state = self.shared.state.lock().await;
        if state.epoch != epoch {
            return;
        }
        tracing::error!("join failed: {error}");
        self.shared.emit(CallEvent::Notice(Notice::error(
            "Could not join the call.",
            error.diagnostic(),
        )));
        self.shared.teardown(&mut state, end_reason(error)).await;
    }

    /// Leave the call. Safe to call in any state and more than once.
    pub async fn hang_up(&self) {
        let mut state = self.shared.state.lock().await;
        if state.call_state == CallState::NotInCall {
            tracing::debug!("hang_up while not in a call");
            return;
        }
        self.shared.teardown(&mut state, EndReason::HungUp).await;
    }

    /// Returns whether the microphone is now enabled.
    pub async fn toggle_mic(&self) -> Result<bool, BabelError> {
        let mut state = self.shared.state.lock().await;
        let active = state.active.as_mut().ok_or(BabelError::SessionClosed)?;
        let Some(track) = active.camera.audio_track() else {
            tracing::warn!("no microphone track to toggle");
            return Ok(false);
        };
        let enabled = !track.is_enabled();
        track.set_enabled(enabled);
        active.room.set_mic_enabled(&self.shared.local_id, enabled);
        tracing::info!("microphone {}", if enabled { "enabled" } else { "muted" });
        self.shared.emit(CallEvent::LocalMediaChanged(active.media_state()));
        Ok(enabled)
    }

    /// Returns whether the camera is now enabled.
    pub async fn toggle_cam(&self) -> Result<bool, BabelError> {
        let mut state = self.shared.state.lock().await;
        let active = state.active.as_mut().ok_or(BabelError::SessionClosed)?;
        let Some(track) = active.camera.video_track() else {
            tracing::warn!("no camera track to toggle");
            return Ok(false);
        };
        let enabled = !track.is_enabled();
        track.set_enabled(enabled);
        tracing::info!("camera {}", if enabled { "enabled" } else { "disabled" });
        self.shared.emit(CallEvent::LocalMediaChanged(active.media_state()));
        Ok(enabled)
    }

    /// Start or stop sharing the screen. Returns whether sharing is active.
    ///
    /// While sharing, the screen track occupies the outgoing video slot; when
    /// the host ends the capture on its own, the camera is restored.
    pub async fn toggle_screen_share(&self) -> Result<bool, BabelError> {
        let epoch = {
            let mut guard = self.shared.state.lock().await;
            let state = &mut *guard;
            let epoch = state.epoch;
            let active = state.active.as_mut().ok_or(BabelError::SessionClosed)?;
            if active.screen.is_some() {
                let outcome = active.end_screen_share().await;
                let media_state = active.media_state();
                return match outcome {
                    Ok(()) => {
                        tracing::info!("screen share stopped");
                        self.shared.emit(CallEvent::LocalMediaChanged(media_state));
                        Ok(false)
                    }
                    Err(e) => {
                        self.shared.fail(state, &e).await;
                        Err(e)
                    }
                };
            }
            epoch
        };

        // The capture grant can take user interaction; the lock is not held.
        let media = match self.host.capture.acquire_screen_media().await {
            Ok(media) => media,
            Err(e) => {
                tracing::warn!("screen capture not granted: {e}");
                self.shared.emit(CallEvent::Notice(Notice::warning(format!(
                    "Screen sharing was not started: {e}"
                ))));
                return Err(e);
            }
        };
        let Some(track) = media.video_track() else {
            media.stop_all();
            return Err(BabelError::TrackReplacement(
                "screen capture produced no video track".into(),
            ));
        };

        let mut guard = self.shared.state.lock().await;
        let state = &mut *guard;
        if state.epoch != epoch {
            media.stop_all();
            return Err(BabelError::SessionClosed);
        }
        let Some(active) = state.active.as_mut() else {
            media.stop_all();
            return Err(BabelError::SessionClosed);
        };
        if active.screen.is_some() {
            media.stop_all();
            return Ok(true);
        }

        let languages = active.room.language_pair().clone();
        match active
            .negotiator
            .replace_outgoing_video_track(track.clone(), &languages)
            .await
        {
            Ok(outcome) => tracing::info!("screen share started ({outcome:?})"),
            Err(e) => {
                media.stop_all();
                if e.is_fatal() {
                    self.shared.fail(state, &e).await;
                } else {
                    tracing::warn!("screen share not started: {e}");
                    self.shared.emit(CallEvent::Notice(Notice::warning(
                        "Screen sharing could not be started.",
                    )));
                }
                return Err(e);
            }
        }

        active.screen_generation += 1;
        let generation = active.screen_generation;
        let commands = active.commands.clone();
        let watcher = tokio::spawn(async move {
            track.ended().await;
            let _ = commands.send(LoopCommand::ScreenShareEnded { generation });
        });
        active.screen = Some(ScreenShare {
            media,
            generation,
            watcher,
        });
        self.shared.emit(CallEvent::LocalMediaChanged(active.media_state()));
        Ok(true)
    }

    /// Change one side of the language pair. In a call the coordinator is
    /// told without waiting for an acknowledgement.
    pub async fn change_language(&self, side: LanguageSide, value: &str) -> Result<LanguagePair, BabelError> {
        let mut guard = self.shared.state.lock().await;
        let state = &mut *guard;
        let pair = state.language_pair.with(side, value)?;
        if pair == state.language_pair {
            return Ok(pair);
        }
        state.language_pair = pair.clone();
        if let Some(active) = state.active.as_mut() {
            active.room.set_language_pair(pair.clone());
            let sent = active.signals.send(OutboundSignal::LanguageSettingsChange {
                source_lang: pair.source.clone(),
                target_lang: pair.target.clone(),
            });
            if let Err(e) = sent {
                tracing::warn!("language change not delivered: {e}");
            }
        }
        tracing::info!("languages now {} -> {}", pair.source, pair.target);
        self.shared.emit(CallEvent::LanguagePairChanged(pair.clone()));
        Ok(pair)
    }

    /// Flip between text-only and audio-and-text translation.
    ///
    /// Chunks already queued keep playing; chunks received while text-only
    /// are dropped on arrival.
    pub async fn toggle_translation_mode(&self) -> TranslationMode {
        let mut guard = self.shared.state.lock().await;
        let state = &mut *guard;
        let mode = state.translation_mode.toggled();
        state.translation_mode = mode;
        if let Some(active) = state.active.as_mut() {
            active.room.set_translation_mode(mode);
            if let Err(e) = active.signals.send(OutboundSignal::TranslationModeChange { mode }) {
                tracing::warn!("translation mode change not delivered: {e}");
            }
        }
        tracing::info!("translation mode now {mode:?}");
        self.shared.emit(CallEvent::TranslationModeChanged(mode));
        mode
    }

    /// Report local voice activity to the coordinator.
    pub async fn announce_speaking(&self, speaking: bool) -> Result<(), BabelError> {
        let mut state = self.shared.state.lock().await;
        let active = state.active.as_mut().ok_or(BabelError::SessionClosed)?;
        if active.room.set_speaking(&self.shared.local_id, speaking) {
            self.shared.emit(CallEvent::SpeakingChanged {
                participant_id: self.shared.local_id.clone(),
                speaking,
            });
        }
        active.signals.send(OutboundSignal::Speaking { speaking })
    }

    pub async fn call_state(&self) -> CallState {
        self.shared.state.lock().await.call_state
    }

    /// Participants in join order; empty outside a call.
    pub async fn participants(&self) -> Vec<ParticipantInfo> {
        self.shared
            .state
            .lock()
            .await
            .active
            .as_ref()
            .map(|a| a.room.snapshot())
            .unwrap_or_default()
    }

    pub async fn negotiation_state(&self) -> NegotiationState {
        self.shared
            .state
            .lock()
            .await
            .active
            .as_ref()
            .map(|a| a.negotiator.state())
            .unwrap_or(NegotiationState::Idle)
    }

    pub async fn translation_mode(&self) -> TranslationMode {
        self.shared.state.lock().await.translation_mode
    }

    pub async fn language_pair(&self) -> LanguagePair {
        self.shared.state.lock().await.language_pair.clone()
    }

    pub async fn is_screen_sharing(&self) -> bool {
        self.shared
            .state
            .lock()
            .await
            .active
            .as_ref()
            .is_some_and(|a| a.screen.is_some())
    }

    pub async fn local_media_state(&self) -> Option<LocalMediaState> {
        self.shared
            .state
            .lock()
            .await
            .active
            .as_ref()
            .map(ActiveCall::media_state)
    }
}
