//! Per-session loops and egress for an authenticated peer.
//!
//! Each peer owns two background loops, both cancellable through the
//! link's token: one accepting unidirectional streams (one frame per
//! stream) and one receiving datagrams. Both hand received frames to the
//! registered [`DataSink`]. Outgoing messages open a fresh unidirectional
//! stream per frame with open and write deadlines.

use crate::error::NetError;
use crate::{close_code, STREAM_OPEN_TIMEOUT, WRITE_TIMEOUT};
use async_trait::async_trait;
use bytes::Bytes;
use gossamer_crypto::PeerId;
use gossamer_wire::{decode_datagram, encode_datagram, read_frame, write_frame, FrameType};
use quinn::Connection;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Receiver for frames read off a peer session.
///
/// The sink is the narrow capability a session has into the rest of the
/// node: it enqueues onto the dispatcher's bounded ingress channel, so a
/// full queue back-pressures this peer's read loops.
#[async_trait]
pub trait DataSink: Send + Sync {
    /// Called once per received frame.
    async fn on_data(&self, frame_type: FrameType, payload: Bytes, from: PeerId);
}

/// Session handle owning the receive loops and egress for one peer.
pub struct PeerLink {
    connection: Connection,
    cancel: CancellationToken,
}

impl PeerLink {
    /// Wrap an authenticated connection. Loops start separately via
    /// [`PeerLink::start_loops`].
    pub fn new(connection: Connection) -> Self {
        Self {
            connection,
            cancel: CancellationToken::new(),
        }
    }

    /// Remote socket address.
    pub fn remote_address(&self) -> SocketAddr {
        self.connection.remote_address()
    }

    /// This link's cancellation token.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Spawn the stream-accept and datagram loops for this session.
    pub fn start_loops(self: &Arc<Self>, peer_id: PeerId, sink: Arc<dyn DataSink>) {
        let link = Arc::clone(self);
        let stream_sink = Arc::clone(&sink);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = link.cancel.cancelled() => break,
                    accepted = link.connection.accept_uni() => {
                        match accepted {
                            Ok(mut stream) => {
                                let sink = Arc::clone(&stream_sink);
                                tokio::spawn(async move {
                                    match read_frame(&mut stream).await {
                                        Ok((frame_type, payload)) => {
                                            trace!(%peer_id, ?frame_type, len = payload.len(), "stream frame");
                                            sink.on_data(frame_type, payload, peer_id).await;
                                        }
                                        Err(err) => debug!(%peer_id, "stream frame read failed: {err}"),
                                    }
                                });
                            }
                            Err(err) => {
                                debug!(%peer_id, "peer disconnected: {err}");
                                break;
                            }
                        }
                    }
                }
            }
        });

        let link = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = link.cancel.cancelled() => break,
                    received = link.connection.read_datagram() => {
                        match received {
                            Ok(datagram) => match decode_datagram(&datagram) {
                                Ok((frame_type, payload)) => {
                                    trace!(%peer_id, ?frame_type, len = payload.len(), "datagram frame");
                                    sink.on_data(frame_type, payload, peer_id).await;
                                }
                                Err(err) => debug!(%peer_id, "datagram decode failed: {err}"),
                            },
                            Err(err) => {
                                debug!(%peer_id, "datagram loop ended: {err}");
                                break;
                            }
                        }
                    }
                }
            }
        });
    }

    /// Send one frame on a fresh unidirectional stream: 2 s open deadline,
    /// 1 s write deadline.
    pub async fn send_message(&self, frame_type: FrameType, payload: &[u8]) -> Result<(), NetError> {
        let mut stream = timeout(STREAM_OPEN_TIMEOUT, self.connection.open_uni())
            .await
            .map_err(|_| NetError::Timeout)??;

        timeout(WRITE_TIMEOUT, write_frame(&mut stream, frame_type, payload))
            .await
            .map_err(|_| NetError::Timeout)??;

        stream.finish().ok();
        Ok(())
    }

    /// Send one frame as an unreliable datagram. Payloads over the
    /// 1199-byte budget are refused.
    pub fn send_datagram(&self, frame_type: FrameType, payload: &[u8]) -> Result<(), NetError> {
        let frame = encode_datagram(frame_type, payload)?;
        self.connection.send_datagram(frame)?;
        Ok(())
    }

    /// Cancel both loops and close the session.
    pub fn close(&self) {
        self.cancel.cancel();
        self.connection
            .close(close_code::NORMAL_CLOSE, b"normal close");
    }
}
