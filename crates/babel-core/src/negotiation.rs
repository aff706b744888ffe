//! Offer/answer/candidate negotiation against the room coordinator.
//!
//! Topology: the coordinator is a selective forwarding unit. There is one
//! negotiation session per call, and every remote participant's media
//! arrives over it, told apart by track and stream identity.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::config::{IceServer, LanguagePair};
use crate::errors::BabelError;
use crate::events::{CallEvent, EventEmitter, NegotiationState};
use crate::media::{StreamHandle, TrackHandle, TrackKind};
use crate::signaling::{IceCandidate, OutboundSignal, SdpType, SessionDescription, SignalSender};

/// Inbound media as announced by the peer transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTrack {
    pub track_id: String,
    pub stream_id: String,
    pub kind: TrackKind,
    /// Owner carried in the track metadata, when the coordinator sets it.
    pub participant_id: Option<String>,
}

/// Notifications from the peer transport to the session.
#[derive(Debug, Clone)]
pub enum PeerEvent {
    LocalCandidate(IceCandidate),
    RemoteTrack(RemoteTrack),
    Connected,
    Failed(String),
    Closed,
}

/// The media transport underneath negotiation (an RTC peer connection).
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescription, BabelError>;
    async fn set_local_description(&self, description: &SessionDescription) -> Result<(), BabelError>;
    /// Malformed descriptions fail with [`BabelError::ProtocolViolation`].
    async fn set_remote_description(&self, description: &SessionDescription) -> Result<(), BabelError>;
    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<(), BabelError>;
    /// Swap the outgoing video track in place. An error means the
    /// transport needs a new offer/answer round-trip instead.
    async fn replace_video_track(&self, track: TrackHandle) -> Result<(), BabelError>;
    async fn close(&self);
}

/// Creates a transport seeded with the local tracks, together with the
/// stream of its events.
#[async_trait]
pub trait PeerConnector: Send + Sync {
    async fn create(
        &self,
        ice_servers: &[IceServer],
        local_tracks: &[TrackHandle],
    ) -> Result<(Arc<dyn PeerTransport>, mpsc::UnboundedReceiver<PeerEvent>), BabelError>;
}

/// A remote track resolved to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackBinding {
    pub participant_id: String,
    pub stream: StreamHandle,
    pub kind: TrackKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceOutcome {
    InPlace,
    Renegotiating,
    /// An offer is already outstanding; a fresh one follows its answer.
    Queued,
}

/// Negotiation state machine for one call.
///
/// `Idle → Offering → Connecting → Connected → Closed`, with
/// `Connected → Renegotiating → Connected` when a track swap needs a new
/// round-trip. A swap requested while an offer is still outstanding is
/// queued and offered again once that answer lands. Remote candidates are
/// buffered until a remote description exists and are then applied in
/// arrival order.
pub struct Negotiator {
    peer_id: String,
    transport: Arc<dyn PeerTransport>,
    signals: SignalSender,
    emitter: EventEmitter,
    state: NegotiationState,
    local_description: Option<SessionDescription>,
    remote_description: Option<SessionDescription>,
    pending_candidates: VecDeque<IceCandidate>,
    outgoing_video_track: Option<TrackHandle>,
    queued_offer: Option<LanguagePair>,
    stream_owners: HashMap<String, String>,
}

impl Negotiator {
    pub fn new(
        peer_id: &str,
        transport: Arc<dyn PeerTransport>,
        signals: SignalSender,
        emitter: EventEmitter,
        outgoing_video_track: Option<TrackHandle>,
    ) -> Self {
        Self {
            peer_id: peer_id.to_string(),
            transport,
            signals,
            emitter,
            state: NegotiationState::Idle,
            local_description: None,
            remote_description: None,
            pending_candidates: VecDeque::new(),
            outgoing_video_track,
            queued_offer: None,
            stream_owners: HashMap::new(),
        }
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    pub fn local_description(&self) -> Option<&SessionDescription> {
        self.local_description.as_ref()
    }

    pub fn remote_description(&self) -> Option<&SessionDescription> {
        self.remote_description.as_ref()
    }

    pub fn pending_candidates(&self) -> usize {
        self.pending_candidates.len()
    }

    pub fn outgoing_video_track(&self) -> Option<TrackHandle> {
        self.outgoing_video_track.clone()
    }

    pub fn has_queued_offer(&self) -> bool {
        self.queued_offer.is_some()
    }

    fn transition(&mut self, next: NegotiationState) {
        if self.state == next {
            return;
        }
        tracing::info!("negotiation {}: {:?} -> {:?}", self.peer_id, self.state, next);
        self.state = next;
        self.emitter.emit(CallEvent::NegotiationStateChanged(next));
    }

    fn ensure_open(&self) -> Result<(), BabelError> {
        if self.state == NegotiationState::Closed {
            Err(BabelError::SessionClosed)
        } else {
            Ok(())
        }
    }

    /// Create and send the initial offer.
    pub async fn start_as_offerer(&mut self, languages: &LanguagePair) -> Result<(), BabelError> {
        self.ensure_open()?;
        if self.state != NegotiationState::Idle {
            return Err(BabelError::ProtocolViolation(format!(
                "offer requested in state {:?}",
                self.state
            )));
        }
        self.send_offer(languages, NegotiationState::Offering).await
    }

    async fn send_offer(&mut self, languages: &LanguagePair, next: NegotiationState) -> Result<(), BabelError> {
        let offer = self.transport.create_offer().await?;
        if offer.kind != SdpType::Offer {
            return Err(BabelError::ProtocolViolation(
                "transport produced a non-offer description".into(),
            ));
        }
        self.transport.set_local_description(&offer).await?;
        self.local_description = Some(offer.clone());
        self.transition(next);
        self.signals.send(OutboundSignal::Offer {
            offer,
            source_lang: languages.source.clone(),
            target_lang: languages.target.clone(),
        })
    }

    /// Apply the coordinator's answer to our outstanding offer.
    pub async fn apply_remote_answer(&mut self, description: SessionDescription) -> Result<(), BabelError> {
        self.ensure_open()?;
        let next = match self.state {
            NegotiationState::Offering => NegotiationState::Connecting,
            NegotiationState::Renegotiating => NegotiationState::Connected,
            other => {
                return Err(BabelError::ProtocolViolation(format!(
                    "answer received in state {other:?} with no outstanding offer"
                )));
            }
        };
        if description.kind != SdpType::Answer {
            return Err(BabelError::ProtocolViolation(format!(
                "expected an answer description, got {:?}",
                description.kind
            )));
        }

        self.transport.set_remote_description(&description).await?;
        self.remote_description = Some(description);
        self.transition(next);
        self.flush_pending_candidates().await?;

        if let Some(languages) = self.queued_offer.take() {
            tracing::info!("sending queued offer for the current outgoing tracks");
            self.send_offer(&languages, NegotiationState::Renegotiating).await?;
        }
        Ok(())
    }

    /// Apply or buffer a remote candidate.
    pub async fn apply_remote_candidate(&mut self, candidate: IceCandidate) -> Result<(), BabelError> {
        self.ensure_open()?;
        if self.remote_description.is_none() {
            tracing::debug!(
                "buffering remote candidate until answer ({} pending)",
                self.pending_candidates.len() + 1
            );
            self.pending_candidates.push_back(candidate);
            return Ok(());
        }
        self.add_candidate(&candidate).await
    }

    async fn flush_pending_candidates(&mut self) -> Result<(), BabelError> {
        if !self.pending_candidates.is_empty() {
            tracing::debug!("applying {} buffered candidates", self.pending_candidates.len());
        }
        while let Some(candidate) = self.pending_candidates.pop_front() {
            self.add_candidate(&candidate).await?;
        }
        Ok(())
    }

    async fn add_candidate(&self, candidate: &IceCandidate) -> Result<(), BabelError> {
        match self.transport.add_ice_candidate(candidate).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                tracing::warn!("remote candidate rejected by transport: {e}");
                Ok(())
            }
        }
    }

    /// Forward a locally gathered candidate to the coordinator.
    pub fn on_local_candidate_generated(&self, candidate: IceCandidate) -> Result<(), BabelError> {
        self.ensure_open()?;
        self.signals.send(OutboundSignal::Candidate { candidate })
    }

    /// Record an explicit stream → participant association, e.g. from a
    /// signaling-layer announcement.
    pub fn bind_stream_owner(&mut self, stream_id: &str, participant_id: &str) {
        self.stream_owners
            .insert(stream_id.to_string(), participant_id.to_string());
    }

    /// Resolve the owner of an inbound track.
    ///
    /// Owner metadata on the track wins, then the binding table, then the
    /// stream id itself. The result is remembered so later tracks of the
    /// same stream resolve identically.
    pub fn on_remote_track_arrived(&mut self, track: &RemoteTrack) -> Result<TrackBinding, BabelError> {
        self.ensure_open()?;
        let participant_id = track
            .participant_id
            .clone()
            .filter(|id| !id.is_empty())
            .or_else(|| self.stream_owners.get(&track.stream_id).cloned())
            .unwrap_or_else(|| track.stream_id.clone());
        self.stream_owners
            .insert(track.stream_id.clone(), participant_id.clone());

        tracing::debug!(
            "remote {:?} track {} bound to {participant_id}",
            track.kind,
            track.track_id
        );
        Ok(TrackBinding {
            participant_id,
            stream: StreamHandle::new(track.stream_id.clone()),
            kind: track.kind,
        })
    }

    /// Transport reported connectivity.
    pub fn mark_connected(&mut self) {
        if self.state == NegotiationState::Connecting {
            self.transition(NegotiationState::Connected);
        }
    }

    /// Swap the outgoing video track, renegotiating when the transport
    /// cannot replace it in place.
    pub async fn replace_outgoing_video_track(
        &mut self,
        track: TrackHandle,
        languages: &LanguagePair,
    ) -> Result<ReplaceOutcome, BabelError> {
        self.ensure_open()?;
        let previous = self.outgoing_video_track.replace(track.clone());

        if self.state == NegotiationState::Idle {
            // Nothing negotiated yet; the next offer carries the new track.
            return Ok(ReplaceOutcome::InPlace);
        }

        match self.transport.replace_video_track(track).await {
            Ok(()) => {
                tracing::info!("outgoing video track replaced in place");
                Ok(ReplaceOutcome::InPlace)
            }
            Err(e) => match self.state {
                NegotiationState::Connecting | NegotiationState::Connected => {
                    tracing::info!("in-place track replacement failed ({e}), renegotiating");
                    self.send_offer(languages, NegotiationState::Renegotiating).await?;
                    Ok(ReplaceOutcome::Renegotiating)
                }
                NegotiationState::Offering | NegotiationState::Renegotiating => {
                    tracing::info!("in-place track replacement failed ({e}), offer queued behind the pending answer");
                    self.queued_offer = Some(languages.clone());
                    Ok(ReplaceOutcome::Queued)
                }
                _ => {
                    self.outgoing_video_track = previous;
                    Err(BabelError::TrackReplacement(format!(
                        "cannot renegotiate in state {:?}: {e}",
                        self.state
                    )))
                }
            },
        }
    }

    /// Terminal transition. Idempotent.
    pub async fn close(&mut self) {
        if self.state == NegotiationState::Closed {
            return;
        }
        self.transition(NegotiationState::Closed);
        self.pending_candidates.clear();
        self.queued_offer = None;
        self.outgoing_video_track = None;
        self.transport.close().await;
    }
}
