// BBS Node - Session Protocol Capabilities
// Copyright (C) 2025 Akaere Networks
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The operations a secure session needs from the protocol library
//!
//! `SecureSession` only talks to the library through [`ProtocolSession`],
//! which keeps the handshake and relay logic independent of russh and lets
//! tests script a protocol peer.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::sync::Notify;

use super::identity::HostIdentity;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("host key rejected: {0}")]
    PrivateKey(String),
    #[error("socket rejected: {0}")]
    Socket(String),
    #[error("session is not active")]
    NotActive,
    #[error("peer closed the session")]
    Closed,
    #[error("protocol failure: {0}")]
    Failed(String),
}

/// Outcome of one activation attempt that did not complete the handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivateStatus {
    /// The peer has not sent enough to finish; try again
    NeedsMoreData,
    Failed(ProtocolError),
}

/// Something a relay task can wait on until plaintext may be available
#[async_trait]
pub trait Readiness: Send + Sync {
    async fn wait(&self);
}

#[async_trait]
impl Readiness for Notify {
    async fn wait(&self) {
        self.notified().await;
    }
}

#[async_trait]
impl Readiness for TcpStream {
    async fn wait(&self) {
        let _ = self.readable().await;
    }
}

#[async_trait]
pub trait ProtocolSession: Send {
    fn attach_private_key(&mut self, identity: &HostIdentity) -> Result<(), ProtocolError>;

    fn attach_socket(&mut self, socket: TcpStream) -> Result<(), ProtocolError>;

    fn set_auto_respond(&mut self, enabled: bool) -> Result<(), ProtocolError>;

    /// Drive the handshake forward
    async fn activate(&mut self) -> Result<(), ActivateStatus>;

    /// Queue plaintext for the peer, returning how much was accepted
    async fn push(&mut self, data: &[u8]) -> Result<usize, ProtocolError>;

    async fn flush(&mut self) -> Result<(), ProtocolError>;

    /// Take buffered plaintext without waiting; `Ok(0)` when none is buffered
    fn pop(&mut self, buf: &mut [u8]) -> Result<usize, ProtocolError>;

    /// Readiness source for inbound plaintext, available once active
    fn readiness(&self) -> Option<Arc<dyn Readiness>>;
}
