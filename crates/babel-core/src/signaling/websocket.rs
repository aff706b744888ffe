//! WebSocket signaling over `tokio-tungstenite`.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use super::{
    ChannelEvent, Outgoing, SignalSender, SignalingChannel, SignalingConnector, decode_inbound,
    encode_outbound,
};
use crate::config::SignalingEndpoint;
use crate::errors::{BabelError, TransportFault};

/// Opens JSON-over-WebSocket channels to the room coordinator.
#[derive(Debug, Default, Clone)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SignalingConnector for WebSocketConnector {
    async fn connect(&self, endpoint: &SignalingEndpoint) -> Result<SignalingChannel, BabelError> {
        let url = endpoint.url().to_string();
        tracing::info!("connecting signaling channel: {url}");

        let (ws, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| classify_connect_error(&url, e))?;
        let (mut sink, mut stream) = ws.split();

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Outgoing>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<ChannelEvent>();

        // Writer: serializes outbound signals in send order.
        let writer_events = in_tx.clone();
        let writer_url = url.clone();
        tokio::spawn(async move {
            while let Some(outgoing) = out_rx.recv().await {
                match outgoing {
                    Outgoing::Signal(signal) => {
                        let json = match encode_outbound(&signal) {
                            Ok(json) => json,
                            Err(e) => {
                                tracing::warn!("dropping unencodable signal: {e}");
                                continue;
                            }
                        };
                        if let Err(e) = sink.send(Message::Text(json)).await {
                            tracing::warn!("signaling write failed: {e}");
                            let _ = writer_events.send(ChannelEvent::Failed(BabelError::transport(
                                &writer_url,
                                TransportFault::Dropped,
                                e.to_string(),
                            )));
                            break;
                        }
                    }
                    Outgoing::Close => {
                        let _ = sink.send(Message::Close(None)).await;
                        let _ = sink.close().await;
                        tracing::debug!("signaling writer closed");
                        break;
                    }
                }
            }
        });

        // Reader: decodes inbound frames, skipping anything unrecognized.
        let reader_url = url.clone();
        tokio::spawn(async move {
            loop {
                let event = match stream.next().await {
                    Some(Ok(Message::Text(text))) => match decode_inbound(&text) {
                        Ok(signal) => ChannelEvent::Message(signal),
                        Err(e) => {
                            tracing::warn!("ignoring unrecognized signaling frame: {e}");
                            continue;
                        }
                    },
                    // tungstenite queues the pong itself.
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                    Some(Ok(Message::Binary(data))) => {
                        tracing::warn!("ignoring binary signaling frame ({} bytes)", data.len());
                        continue;
                    }
                    Some(Ok(Message::Frame(_))) => continue,
                    Some(Ok(Message::Close(frame))) => ChannelEvent::Closed {
                        reason: frame.map(|f| f.reason.to_string()),
                    },
                    Some(Err(e)) => ChannelEvent::Failed(BabelError::transport(
                        &reader_url,
                        TransportFault::Dropped,
                        e.to_string(),
                    )),
                    None => ChannelEvent::Closed { reason: None },
                };

                let terminal = !matches!(event, ChannelEvent::Message(_));
                if in_tx.send(event).is_err() || terminal {
                    break;
                }
            }
            tracing::debug!("signaling reader ended: {reader_url}");
        });

        Ok(SignalingChannel {
            sender: SignalSender::new(out_tx, url),
            events: in_rx,
        })
    }
}

/// Map a handshake failure to the fault the user can act on.
fn classify_connect_error(url: &str, error: WsError) -> BabelError {
    match error {
        WsError::Io(e) => BabelError::transport(url, TransportFault::Unreachable, e.to_string()),
        WsError::Tls(e) => BabelError::transport(url, TransportFault::Tls, e.to_string()),
        WsError::Http(response) => {
            let status = response.status().as_u16();
            BabelError::transport(
                url,
                TransportFault::HandshakeRejected {
                    status: Some(status),
                },
                format!("server answered HTTP {status} instead of switching protocols"),
            )
        }
        WsError::Url(e) => BabelError::Config(format!("invalid signaling url '{url}': {e}")),
        WsError::Protocol(e) => BabelError::transport(
            url,
            TransportFault::HandshakeRejected { status: None },
            e.to_string(),
        ),
        other => BabelError::transport(url, TransportFault::Unreachable, other.to_string()),
    }
}
