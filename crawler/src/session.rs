//! One short-lived visit to a peer.
//!
//! A [`PeerSession`] connects, performs the version handshake, asks for
//! addresses and collects them until the peer has answered, hangs up, or the
//! session deadline passes. It owns nothing shared, everything it learned is
//! handed back in a [`SessionReport`].

use crate::connection::{Connector, PeerConnection};
use log::debug;
use peermap_connection::handshake::{self, HandshakeInfo, HandshakeState};
use peermap_connection::wire::Message;
use peermap_connection::{ConnectionConfiguration, ConnectionError, PeerAddress};
use std::fmt;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};

/// Progress of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Opening the TCP connection.
    Connecting,
    /// Our version is sent, waiting for the peer's version and verack.
    HandshakeSent,
    /// Both sides have exchanged version and verack.
    HandshakeAcked,
    /// The getaddr request is sent.
    AddrRequested,
    /// The peer has started answering.
    Collecting,
    /// Finished normally.
    Done,
    /// Connect failure or protocol violation.
    Failed,
    /// The session deadline passed.
    TimedOut,
}

impl SessionState {
    /// True for the states a session ends in.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Done | SessionState::Failed | SessionState::TimedOut
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Connecting => "connecting",
            SessionState::HandshakeSent => "handshake sent",
            SessionState::HandshakeAcked => "handshake acked",
            SessionState::AddrRequested => "addr requested",
            SessionState::Collecting => "collecting",
            SessionState::Done => "done",
            SessionState::Failed => "failed",
            SessionState::TimedOut => "timed out",
        };
        f.write_str(name)
    }
}

/// Outcome of a finished session.
#[derive(Debug)]
pub struct SessionReport {
    /// The visited peer.
    pub target: PeerAddress,
    /// Terminal state.
    pub state: SessionState,
    /// Metadata from the peer's version message. Only set once both version
    /// and verack arrived, and never for a failed session.
    pub handshake: Option<HandshakeInfo>,
    /// Addresses the peer gossiped, in arrival order. Empty for failed sessions.
    pub discovered: Vec<PeerAddress>,
    /// Why the session failed.
    pub failure: Option<ConnectionError>,
}

impl SessionReport {
    /// True if the peer completed the handshake and was not dropped later.
    pub fn completed_handshake(&self) -> bool {
        self.handshake.is_some()
    }
}

/// A single visit to a peer.
#[derive(Debug)]
pub struct PeerSession {
    target: PeerAddress,
    state: SessionState,
    nonce: u64,
    deadline: Instant,
    discovered: Vec<PeerAddress>,
    handshake: Option<HandshakeInfo>,
}

impl PeerSession {
    /// Create a session for `target` which must finish within `timeout`.
    pub fn new(target: PeerAddress, timeout: Duration) -> Self {
        PeerSession {
            target,
            state: SessionState::Connecting,
            nonce: handshake::generate_nonce(),
            deadline: Instant::now() + timeout,
            discovered: Vec::new(),
            handshake: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run the session to completion.
    ///
    /// Never fails, failures are part of the report. A failed session reports
    /// no addresses, a timed out one keeps whatever it collected.
    pub async fn run<C: Connector>(
        mut self,
        connector: &C,
        config: &ConnectionConfiguration,
    ) -> SessionReport {
        let outcome = timeout_at(self.deadline, self.drive(connector, config)).await;

        let failure = match outcome {
            Ok(Ok(())) => {
                self.state = SessionState::Done;
                None
            }
            Ok(Err(e)) => {
                debug!("Session with {} failed in state {}: {e}", self.target, self.state);
                self.state = SessionState::Failed;
                self.discovered.clear();
                self.handshake = None;
                Some(e)
            }
            Err(_) => {
                debug!(
                    "Session with {} timed out in state {} with {} addresses",
                    self.target,
                    self.state,
                    self.discovered.len()
                );
                self.state = SessionState::TimedOut;
                None
            }
        };

        SessionReport {
            target: self.target,
            state: self.state,
            handshake: self.handshake,
            discovered: self.discovered,
            failure,
        }
    }

    async fn drive<C: Connector>(
        &mut self,
        connector: &C,
        config: &ConnectionConfiguration,
    ) -> Result<(), ConnectionError> {
        self.state = SessionState::Connecting;
        let mut conn = connector.connect(&self.target).await?;

        let result = self.exchange(&mut conn, config).await;
        conn.close().await;
        result
    }

    async fn exchange<P: PeerConnection>(
        &mut self,
        conn: &mut P,
        config: &ConnectionConfiguration,
    ) -> Result<(), ConnectionError> {
        let version = handshake::version_message(config, &self.target, self.nonce);
        conn.send(Message::Version(version)).await?;
        self.state = SessionState::HandshakeSent;

        let mut progress = HandshakeState::VersionSent;
        let mut info = None;
        while !progress.is_complete() {
            match conn.receive().await? {
                Message::Version(version) => {
                    if version.nonce == self.nonce {
                        return Err(ConnectionError::ConnectionLoop);
                    }
                    progress = progress
                        .on_version()
                        .ok_or(ConnectionError::ProtocolFailed("duplicate version message"))?;
                    info = Some(HandshakeInfo::from(&version));
                    conn.send(Message::Verack).await?;
                }
                Message::Verack => progress = progress.on_verack(),
                Message::Ping(nonce) => conn.send(Message::Pong(nonce)).await?,
                other => debug!(
                    "Ignoring {} from {} during handshake",
                    other.command(),
                    self.target
                ),
            }
        }
        self.handshake = info;
        self.state = SessionState::HandshakeAcked;

        conn.send(Message::GetAddr).await?;
        self.state = SessionState::AddrRequested;

        let default_port = config.default_port();
        loop {
            let message = match conn.receive().await {
                Ok(message) => message,
                Err(e) if e.is_closed() => {
                    debug!("{} closed the connection while collecting", self.target);
                    return Ok(());
                }
                Err(e) => return Err(e),
            };
            self.state = SessionState::Collecting;

            match message {
                Message::Addr(entries) => {
                    self.discovered.extend(
                        entries
                            .iter()
                            .map(|entry| entry.to_peer_address(default_port)),
                    );
                    // A single entry is usually the peer announcing itself.
                    if entries.len() > 1 {
                        debug!(
                            "Collected {} addresses from {}",
                            self.discovered.len(),
                            self.target
                        );
                        return Ok(());
                    }
                }
                Message::Ping(nonce) => conn.send(Message::Pong(nonce)).await?,
                _ => {}
            }
        }
    }
}
