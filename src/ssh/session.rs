// BBS Node - Secure Session
// Copyright (C) 2025 Akaere Networks
// SPDX-License-Identifier: AGPL-3.0-or-later

//! One authenticated caller connection
//!
//! Construction runs the server-side handshake to completion or failure and
//! records the outcome. Afterwards all plaintext moves through `push_data`
//! and `pop_data`, which share one lock so the protocol never sees a push and
//! a pop at the same time.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::Mutex;

use super::identity::{HostIdentity, ensure_crypto};
use super::protocol::{ActivateStatus, ProtocolError, ProtocolSession, Readiness};
use super::server::RusshProtocol;
use crate::config::{CONTROL_DRAIN_BYTES, HANDSHAKE_ATTEMPTS};
use crate::{log_debug, log_info, log_warn};

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum HandshakeFailure {
    #[error("private key rejected: {0}")]
    PrivateKey(ProtocolError),
    #[error("socket rejected: {0}")]
    Socket(ProtocolError),
    #[error("handshake rejected: {0}")]
    Rejected(ProtocolError),
    #[error("handshake did not finish after {0} attempts")]
    AttemptsExhausted(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeState {
    Ready,
    Failed(HandshakeFailure),
}

/// The session ended, equivalent to a closed remote side
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("secure session closed: {0}")]
pub struct RelayFailure(pub ProtocolError);

pub struct SecureSession<P: ProtocolSession = RusshProtocol> {
    protocol: Mutex<P>,
    readiness: Option<Arc<dyn Readiness>>,
    state: HandshakeState,
}

impl SecureSession<RusshProtocol> {
    pub async fn new(socket: TcpStream, identity: &HostIdentity) -> Self {
        Self::with_protocol(RusshProtocol::new(), socket, identity).await
    }
}

impl<P: ProtocolSession> SecureSession<P> {
    pub async fn with_protocol(mut protocol: P, socket: TcpStream, identity: &HostIdentity) -> Self {
        ensure_crypto();

        let state = match handshake(&mut protocol, socket, identity).await {
            Ok(()) => {
                drain_control_bytes(&mut protocol);
                log_info!("Secure session established");
                HandshakeState::Ready
            }
            Err(failure) => {
                log_warn!("Secure session handshake failed: {}", failure);
                HandshakeState::Failed(failure)
            }
        };

        let readiness = match state {
            HandshakeState::Ready => protocol.readiness(),
            HandshakeState::Failed(_) => None,
        };

        Self {
            protocol: Mutex::new(protocol),
            readiness,
            state,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state == HandshakeState::Ready
    }

    pub fn state(&self) -> &HandshakeState {
        &self.state
    }

    /// Push then flush `data`; returns the bytes accepted, 0 on any failure
    pub async fn push_data(&self, data: &[u8]) -> usize {
        if !self.is_ready() || data.is_empty() {
            return 0;
        }
        let mut protocol = self.protocol.lock().await;
        let pushed = match protocol.push(data).await {
            Ok(pushed) => pushed,
            Err(e) => {
                log_debug!("Secure push failed: {}", e);
                return 0;
            }
        };
        if let Err(e) = protocol.flush().await {
            log_debug!("Secure flush failed: {}", e);
            return 0;
        }
        pushed
    }

    /// Take buffered plaintext; `Ok(0)` when none is waiting
    pub async fn pop_data(&self, buf: &mut [u8]) -> Result<usize, RelayFailure> {
        if !self.is_ready() {
            return Err(RelayFailure(ProtocolError::NotActive));
        }
        let mut protocol = self.protocol.lock().await;
        protocol.pop(buf).map_err(RelayFailure)
    }

    /// Wait up to `wait` for inbound plaintext; true when woken by data
    pub async fn wait_readable(&self, wait: Duration) -> bool {
        match &self.readiness {
            Some(readiness) => tokio::time::timeout(wait, readiness.wait()).await.is_ok(),
            None => {
                tokio::time::sleep(wait).await;
                false
            }
        }
    }
}

async fn handshake<P: ProtocolSession>(
    protocol: &mut P,
    socket: TcpStream,
    identity: &HostIdentity,
) -> Result<(), HandshakeFailure> {
    protocol
        .attach_private_key(identity)
        .map_err(HandshakeFailure::PrivateKey)?;
    protocol
        .attach_socket(socket)
        .map_err(HandshakeFailure::Socket)?;

    let mut attempts_remaining = HANDSHAKE_ATTEMPTS;
    while attempts_remaining > 0 {
        attempts_remaining -= 1;

        if let Err(e) = protocol.set_auto_respond(true) {
            log_debug!("Auto-respond not accepted: {}", e);
            continue;
        }

        match protocol.activate().await {
            Ok(()) => return Ok(()),
            Err(ActivateStatus::NeedsMoreData) => {
                log_debug!(
                    "Handshake waiting for peer ({} attempts left)",
                    attempts_remaining
                );
            }
            Err(ActivateStatus::Failed(e)) => return Err(HandshakeFailure::Rejected(e)),
        }
    }

    Err(HandshakeFailure::AttemptsExhausted(HANDSHAKE_ATTEMPTS))
}

/// Discard what the peer sent during activation before application data
fn drain_control_bytes<P: ProtocolSession>(protocol: &mut P) {
    let mut scratch = vec![0u8; CONTROL_DRAIN_BYTES];
    match protocol.pop(&mut scratch) {
        Ok(0) => {}
        Ok(n) => log_debug!("Discarded {} bytes of session setup traffic", n),
        Err(e) => log_debug!("Nothing to drain after handshake: {}", e),
    }
}
