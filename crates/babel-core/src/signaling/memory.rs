//! In-process signaling: the "server" end is handed to the embedder.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{ChannelEvent, InboundSignal, OutboundSignal, Outgoing, SignalSender, SignalingChannel, SignalingConnector};
use crate::config::SignalingEndpoint;
use crate::errors::{BabelError, TransportFault};

/// Connector whose channels terminate in [`MemoryServer`] handles.
pub struct MemoryConnector {
    servers: mpsc::UnboundedSender<MemoryServer>,
    attempts: AtomicUsize,
    refuse_with: Mutex<Option<TransportFault>>,
}

impl MemoryConnector {
    /// Returns the connector and a stream yielding the server end of every
    /// channel it opens.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MemoryServer>) {
        let (servers, rx) = mpsc::unbounded_channel();
        (
            Self {
                servers,
                attempts: AtomicUsize::new(0),
                refuse_with: Mutex::new(None),
            },
            rx,
        )
    }

    /// Make subsequent connects fail with `fault`.
    pub fn refuse(&self, fault: TransportFault) {
        *self.refuse_with.lock().unwrap_or_else(|e| e.into_inner()) = Some(fault);
    }

    /// Number of connect calls so far, successful or not.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SignalingConnector for MemoryConnector {
    async fn connect(&self, endpoint: &SignalingEndpoint) -> Result<SignalingChannel, BabelError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let refused = self
            .refuse_with
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(fault) = refused {
            return Err(BabelError::transport(endpoint.url(), fault, "refused by memory connector"));
        }

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let server = MemoryServer {
            endpoint: endpoint.url().to_string(),
            outbound: out_rx,
            inbound: in_tx,
            client_closed: false,
        };
        self.servers
            .send(server)
            .map_err(|_| BabelError::transport(endpoint.url(), TransportFault::Unreachable, "no memory server listening"))?;

        Ok(SignalingChannel {
            sender: SignalSender::new(out_tx, endpoint.url()),
            events: in_rx,
        })
    }
}

/// Server end of an in-memory channel.
pub struct MemoryServer {
    pub endpoint: String,
    outbound: mpsc::UnboundedReceiver<Outgoing>,
    inbound: mpsc::UnboundedSender<ChannelEvent>,
    client_closed: bool,
}

impl MemoryServer {
    /// Next signal sent by the client, or `None` once the client closed.
    pub async fn next_signal(&mut self) -> Option<OutboundSignal> {
        if self.client_closed {
            return None;
        }
        match self.outbound.recv().await {
            Some(Outgoing::Signal(signal)) => Some(signal),
            Some(Outgoing::Close) | None => {
                self.client_closed = true;
                None
            }
        }
    }

    /// Non-blocking variant of [`next_signal`](Self::next_signal).
    pub fn try_next_signal(&mut self) -> Option<OutboundSignal> {
        if self.client_closed {
            return None;
        }
        match self.outbound.try_recv() {
            Ok(Outgoing::Signal(signal)) => Some(signal),
            Ok(Outgoing::Close) | Err(mpsc::error::TryRecvError::Disconnected) => {
                self.client_closed = true;
                None
            }
            Err(mpsc::error::TryRecvError::Empty) => None,
        }
    }

    /// Whether the client asked to close or dropped its sender.
    pub fn is_client_closed(&mut self) -> bool {
        while !self.client_closed {
            match self.outbound.try_recv() {
                Ok(Outgoing::Signal(_)) => continue,
                Ok(Outgoing::Close) | Err(mpsc::error::TryRecvError::Disconnected) => {
                    self.client_closed = true;
                }
                Err(mpsc::error::TryRecvError::Empty) => break,
            }
        }
        self.client_closed
    }

    pub fn push(&self, signal: InboundSignal) {
        let _ = self.inbound.send(ChannelEvent::Message(signal));
    }

    pub fn close(&self, reason: Option<&str>) {
        let _ = self.inbound.send(ChannelEvent::Closed {
            reason: reason.map(str::to_string),
        });
    }

    pub fn fail(&self, error: BabelError) {
        let _ = self.inbound.send(ChannelEvent::Failed(error));
    }
}
