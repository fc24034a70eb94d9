//! QUIC endpoint wrapper: listening, dialing, and session authentication.
//!
//! One endpoint serves both roles. Every new connection, inbound or
//! outbound, runs the mutual handshake on its first bidirectional stream;
//! only sessions that prove their identity are surfaced as
//! [`NewSessionEvent`]s. Failures close the session with `AUTH_FAILED`.

use crate::error::NetError;
use crate::{close_code, handshake, tls, DIAL_TIMEOUT};
use gossamer_crypto::{Identity, PeerId};
use quinn::{Connection, Endpoint};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// SNI name presented on dial; peers ignore it (the certificate chain is
/// never validated).
const SERVER_NAME: &str = "gossamer";

const SESSION_CHANNEL_CAPACITY: usize = 16;

/// An authenticated session ready for swarm registration.
#[derive(Debug)]
pub struct NewSessionEvent {
    /// The established QUIC connection
    pub connection: Connection,
    /// The peer's verified 32-byte identity
    pub peer_key: [u8; 32],
    /// Remote socket address
    pub addr: SocketAddr,
    /// Whether we initiated the session
    pub is_outbound: bool,
}

/// Session-oriented datagram transport bound to one local socket.
pub struct Transport {
    endpoint: Endpoint,
    identity: Arc<Identity>,
    session_tx: mpsc::Sender<NewSessionEvent>,
}

impl Transport {
    /// Bind the endpoint and return the transport together with the stream
    /// of authenticated sessions.
    pub fn bind(
        addr: SocketAddr,
        identity: Arc<Identity>,
    ) -> Result<(Arc<Self>, mpsc::Receiver<NewSessionEvent>), NetError> {
        let server = tls::server_config(&identity)?;
        let client = tls::client_config(&identity)?;

        let mut endpoint = Endpoint::server(server, addr)?;
        endpoint.set_default_client_config(client);

        let (session_tx, session_rx) = mpsc::channel(SESSION_CHANNEL_CAPACITY);

        Ok((
            Arc::new(Self {
                endpoint,
                identity,
                session_tx,
            }),
            session_rx,
        ))
    }

    /// The bound local address.
    pub fn local_addr(&self) -> Result<SocketAddr, NetError> {
        Ok(self.endpoint.local_addr()?)
    }

    /// Accept sessions until the endpoint closes. Each connection is
    /// authenticated on its own task so a slow handshake never blocks the
    /// accept loop.
    pub fn spawn_accept_loop(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let transport = Arc::clone(self);
        tokio::spawn(async move {
            info!("listening for sessions");
            while let Some(incoming) = transport.endpoint.accept().await {
                let transport = Arc::clone(&transport);
                tokio::spawn(async move {
                    let connection = match incoming.await {
                        Ok(connection) => connection,
                        Err(err) => {
                            debug!("inbound connection failed: {err}");
                            return;
                        }
                    };
                    transport.authenticate_inbound(connection).await;
                });
            }
        })
    }

    async fn authenticate_inbound(&self, connection: Connection) {
        let addr = connection.remote_address();

        let (mut send, mut recv) = match connection.accept_bi().await {
            Ok(pair) => pair,
            Err(err) => {
                warn!(%addr, "no handshake stream: {err}");
                connection.close(close_code::STREAM_ERROR, b"stream error");
                return;
            }
        };

        match handshake::authenticate(&mut recv, &mut send, &self.identity).await {
            Ok(peer_key) => {
                if let Some(cn) = tls::peer_common_name(&connection) {
                    debug!(%addr, cert_cn = %cn, "peer certificate");
                }
                info!(peer = %PeerId::from_public_key(&peer_key), %addr, "inbound peer authenticated");
                self.emit(connection, peer_key, addr, false).await;
            }
            Err(err) => {
                warn!(%addr, "inbound authentication failed: {err}");
                connection.close(close_code::AUTH_FAILED, b"auth failed");
            }
        }
    }

    /// Dial, authenticate, and surface the session. The 3 s deadline
    /// covers connection establishment; 0-RTT is used when the transport
    /// has a cached session ticket.
    pub async fn dial(&self, addr: SocketAddr) -> Result<[u8; 32], NetError> {
        let connecting = self.endpoint.connect(addr, SERVER_NAME)?;

        let connection = match connecting.into_0rtt() {
            Ok((connection, _accepted)) => connection,
            Err(connecting) => timeout(DIAL_TIMEOUT, connecting)
                .await
                .map_err(|_| NetError::Timeout)??,
        };

        let (mut send, mut recv) = connection.open_bi().await?;
        match handshake::authenticate(&mut recv, &mut send, &self.identity).await {
            Ok(peer_key) => {
                info!(peer = %PeerId::from_public_key(&peer_key), %addr, "outbound peer authenticated");
                self.emit(connection, peer_key, addr, true).await;
                Ok(peer_key)
            }
            Err(err) => {
                warn!(%addr, "outbound authentication failed: {err}");
                connection.close(close_code::AUTH_FAILED, b"auth failed");
                Err(err)
            }
        }
    }

    async fn emit(&self, connection: Connection, peer_key: [u8; 32], addr: SocketAddr, is_outbound: bool) {
        let event = NewSessionEvent {
            connection,
            peer_key,
            addr,
            is_outbound,
        };
        if self.session_tx.send(event).await.is_err() {
            warn!("session consumer gone; dropping authenticated session");
        }
    }

    /// Close the endpoint, refusing new sessions.
    pub fn shutdown(&self) {
        self.endpoint.close(close_code::NO_ERROR, b"shutdown");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};
    use tokio::time::Duration;

    fn loopback() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)
    }

    #[tokio::test]
    async fn test_dial_authenticates_both_sides() {
        let alice = Arc::new(Identity::generate());
        let bob = Arc::new(Identity::generate());

        let (alice_transport, mut alice_rx) =
            Transport::bind(loopback(), Arc::clone(&alice)).unwrap();
        let (bob_transport, mut bob_rx) = Transport::bind(loopback(), Arc::clone(&bob)).unwrap();

        alice_transport.spawn_accept_loop();
        bob_transport.spawn_accept_loop();

        let bob_addr = bob_transport.local_addr().unwrap();
        let dialed_key = alice_transport.dial(bob_addr).await.unwrap();
        assert_eq!(dialed_key, bob.public_key_bytes());

        let alice_event = timeout(Duration::from_secs(5), alice_rx.recv())
            .await
            .unwrap()
            .unwrap();
        let bob_event = timeout(Duration::from_secs(5), bob_rx.recv())
            .await
            .unwrap()
            .unwrap();

        assert!(alice_event.is_outbound);
        assert_eq!(alice_event.peer_key, bob.public_key_bytes());
        assert!(!bob_event.is_outbound);
        assert_eq!(bob_event.peer_key, alice.public_key_bytes());
    }

    #[tokio::test]
    async fn test_dial_unreachable_times_out() {
        let alice = Arc::new(Identity::generate());
        let (transport, _rx) = Transport::bind(loopback(), alice).unwrap();

        // An address nothing listens on; blackholed by the loopback stack
        // until the dial deadline fires.
        let dead: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let started = std::time::Instant::now();
        let result = transport.dial(dead).await;

        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
