// BBS Node - russh Protocol Backend
// Copyright (C) 2025 Akaere Networks
// SPDX-License-Identifier: AGPL-3.0-or-later

//! [`ProtocolSession`] on top of a russh server connection
//!
//! The first activation spawns the russh connection task. Later activations
//! wait a bounded step for the caller to open a shell channel, which is when
//! the link becomes usable for plaintext.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::{ChannelId, CryptoVec, server};
use russh_keys::key::KeyPair;
use tokio::net::TcpStream;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{Notify, mpsc, oneshot};
use tokio::task::JoinHandle;

use super::handler::{NodeSshHandler, ShellReady};
use super::identity::HostIdentity;
use super::protocol::{ActivateStatus, ProtocolError, ProtocolSession, Readiness};
use crate::config::ACTIVATION_STEP_SECS;
use crate::log_debug;

enum LinkState {
    Idle,
    Negotiating {
        ready: oneshot::Receiver<ShellReady>,
        task: JoinHandle<()>,
    },
    Active {
        channel: ChannelId,
        handle: server::Handle,
        task: JoinHandle<()>,
    },
    Closed,
}

pub struct RusshProtocol {
    key: Option<KeyPair>,
    socket: Option<TcpStream>,
    auto_respond: bool,
    activation_step: Duration,
    state: LinkState,
    inbound_tx: Option<mpsc::UnboundedSender<Vec<u8>>>,
    inbound_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    pending: VecDeque<u8>,
    notify: Arc<Notify>,
}

impl Default for RusshProtocol {
    fn default() -> Self {
        Self::new()
    }
}

impl RusshProtocol {
    pub fn new() -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            key: None,
            socket: None,
            auto_respond: false,
            activation_step: Duration::from_secs(ACTIVATION_STEP_SECS),
            state: LinkState::Idle,
            inbound_tx: Some(inbound_tx),
            inbound_rx,
            pending: VecDeque::new(),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn with_activation_step(mut self, step: Duration) -> Self {
        self.activation_step = step;
        self
    }

    fn server_config(key: KeyPair) -> Arc<server::Config> {
        Arc::new(server::Config {
            inactivity_timeout: Some(Duration::from_secs(3600)),
            auth_rejection_time: Duration::from_secs(3),
            auth_rejection_time_initial: Some(Duration::from_secs(0)),
            keys: vec![key],
            ..Default::default()
        })
    }

    fn spawn_connection(&mut self) -> Result<LinkState, ActivateStatus> {
        let key = self.key.take().ok_or_else(|| {
            ActivateStatus::Failed(ProtocolError::PrivateKey("no host key attached".to_string()))
        })?;
        let socket = self.socket.take().ok_or_else(|| {
            ActivateStatus::Failed(ProtocolError::Socket("no socket attached".to_string()))
        })?;
        let inbound = self
            .inbound_tx
            .take()
            .ok_or(ActivateStatus::Failed(ProtocolError::Closed))?;

        let (ready_tx, ready) = oneshot::channel();
        let handler = NodeSshHandler::new(self.auto_respond, ready_tx, inbound, self.notify.clone());
        let config = Self::server_config(key);

        let task = tokio::spawn(async move {
            match server::run_stream(config, socket, handler).await {
                Ok(running) => {
                    if let Err(e) = running.await {
                        log_debug!("SSH connection ended: {}", e);
                    }
                }
                Err(e) => log_debug!("SSH connection setup failed: {}", e),
            }
        });

        Ok(LinkState::Negotiating { ready, task })
    }
}

impl Drop for RusshProtocol {
    fn drop(&mut self) {
        match &self.state {
            LinkState::Negotiating { task, .. } | LinkState::Active { task, .. } => task.abort(),
            LinkState::Idle | LinkState::Closed => {}
        }
    }
}

#[async_trait]
impl ProtocolSession for RusshProtocol {
    fn attach_private_key(&mut self, identity: &HostIdentity) -> Result<(), ProtocolError> {
        if !matches!(self.state, LinkState::Idle) {
            return Err(ProtocolError::PrivateKey(
                "connection already started".to_string(),
            ));
        }
        self.key = Some(identity.key_pair().clone());
        Ok(())
    }

    fn attach_socket(&mut self, socket: TcpStream) -> Result<(), ProtocolError> {
        if !matches!(self.state, LinkState::Idle) {
            return Err(ProtocolError::Socket("connection already started".to_string()));
        }
        socket
            .set_nodelay(true)
            .map_err(|e| ProtocolError::Socket(e.to_string()))?;
        self.socket = Some(socket);
        Ok(())
    }

    fn set_auto_respond(&mut self, enabled: bool) -> Result<(), ProtocolError> {
        // Takes effect for the connection started by the next activation
        self.auto_respond = enabled;
        Ok(())
    }

    async fn activate(&mut self) -> Result<(), ActivateStatus> {
        let state = std::mem::replace(&mut self.state, LinkState::Closed);
        let (next, outcome) = match state {
            LinkState::Idle => match self.spawn_connection() {
                Ok(next) => (next, Err(ActivateStatus::NeedsMoreData)),
                Err(status) => (LinkState::Closed, Err(status)),
            },
            LinkState::Negotiating { mut ready, task } => {
                match tokio::time::timeout(self.activation_step, &mut ready).await {
                    Ok(Ok((channel, handle))) => {
                        (LinkState::Active { channel, handle, task }, Ok(()))
                    }
                    Ok(Err(_)) => {
                        task.abort();
                        (LinkState::Closed, Err(ActivateStatus::Failed(ProtocolError::Closed)))
                    }
                    Err(_) => (
                        LinkState::Negotiating { ready, task },
                        Err(ActivateStatus::NeedsMoreData),
                    ),
                }
            }
            active @ LinkState::Active { .. } => (active, Ok(())),
            LinkState::Closed => (
                LinkState::Closed,
                Err(ActivateStatus::Failed(ProtocolError::Closed)),
            ),
        };
        self.state = next;
        outcome
    }

    async fn push(&mut self, data: &[u8]) -> Result<usize, ProtocolError> {
        let LinkState::Active { channel, handle, .. } = &self.state else {
            return Err(ProtocolError::NotActive);
        };
        handle
            .data(*channel, CryptoVec::from_slice(data))
            .await
            .map_err(|_| ProtocolError::Closed)?;
        Ok(data.len())
    }

    async fn flush(&mut self) -> Result<(), ProtocolError> {
        // Handle::data hands the packet to the connection task directly
        match self.state {
            LinkState::Active { .. } => Ok(()),
            _ => Err(ProtocolError::NotActive),
        }
    }

    fn pop(&mut self, buf: &mut [u8]) -> Result<usize, ProtocolError> {
        // Several packets may share one readiness wakeup, take all that fit
        while self.pending.len() < buf.len() {
            match self.inbound_rx.try_recv() {
                Ok(chunk) => self.pending.extend(chunk),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) if self.pending.is_empty() => {
                    return Err(ProtocolError::Closed);
                }
                Err(TryRecvError::Disconnected) => break,
            }
        }
        let count = buf.len().min(self.pending.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..count)) {
            *slot = byte;
        }
        Ok(count)
    }

    fn readiness(&self) -> Option<Arc<dyn Readiness>> {
        match self.state {
            LinkState::Active { .. } => Some(self.notify.clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssh::bridge::{RelayExit, TransportBridge};
    use crate::ssh::session::SecureSession;
    use crate::ssh::session::tests::{loopback_pair, test_identity};
    use russh::ChannelMsg;
    use russh::client;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    /// Client that only trusts the host key it was given
    struct PinnedClient {
        fingerprint: String,
    }

    #[async_trait]
    impl client::Handler for PinnedClient {
        type Error = russh::Error;

        async fn check_server_key(
            &mut self,
            server_public_key: &russh_keys::key::PublicKey,
        ) -> Result<bool, Self::Error> {
            Ok(server_public_key.fingerprint() == self.fingerprint)
        }
    }

    #[tokio::test]
    async fn test_pop_takes_every_queued_packet() {
        let mut protocol = RusshProtocol::new();
        let inbound = protocol.inbound_tx.clone().unwrap();
        inbound.send(b"first".to_vec()).unwrap();
        inbound.send(b"second".to_vec()).unwrap();

        let mut buf = [0u8; 64];
        assert_eq!(protocol.pop(&mut buf), Ok(11));
        assert_eq!(&buf[..11], b"firstsecond");
        assert_eq!(protocol.pop(&mut buf), Ok(0));

        // Bytes beyond the buffer wait for the next pop
        inbound.send(b"abcdef".to_vec()).unwrap();
        let mut small = [0u8; 4];
        assert_eq!(protocol.pop(&mut small), Ok(4));
        drop(inbound);
        protocol.inbound_tx.take();
        assert_eq!(protocol.pop(&mut small), Ok(2));
        assert_eq!(&small[..2], b"ef");
        assert_eq!(protocol.pop(&mut small), Err(ProtocolError::Closed));
    }

    #[tokio::test]
    async fn test_real_ssh_client_reaches_the_bridge() {
        let dir = TempDir::new().unwrap();
        let identity = test_identity(&dir);
        let (server_side, client_side) = loopback_pair().await;
        let (go_tx, go_rx) = oneshot::channel::<()>();

        let fingerprint = identity.fingerprint().to_string();
        let caller = tokio::spawn(async move {
            let config = Arc::new(client::Config::default());
            let mut handle = client::connect_stream(config, client_side, PinnedClient { fingerprint })
                .await
                .unwrap();
            assert!(handle.authenticate_password("guest", "anything").await.unwrap());
            let mut channel = handle.channel_open_session().await.unwrap();
            channel.request_pty(true, "ansi", 80, 24, 0, 0, &[]).await.unwrap();
            channel.request_shell(true).await.unwrap();

            // Typing starts once the node is relaying
            go_rx.await.unwrap();
            channel.data(&b"hello"[..]).await.unwrap();

            let mut echoed = Vec::new();
            while echoed.len() < b"welcome".len() {
                match channel.wait().await {
                    Some(ChannelMsg::Data { data }) => echoed.extend_from_slice(&data),
                    Some(_) => {}
                    None => break,
                }
            }
            channel.eof().await.unwrap();
            // Keep the connection up until the node has seen the EOF
            (handle, echoed)
        });

        let session = SecureSession::new(server_side, &identity).await;
        assert!(session.is_ready());
        let (mut bridge, mut plain) = TransportBridge::start(session).await.unwrap();
        go_tx.send(()).unwrap();

        let mut typed = [0u8; 5];
        tokio::time::timeout(Duration::from_secs(10), plain.read_exact(&mut typed))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&typed, b"hello");

        plain.write_all(b"welcome").await.unwrap();
        let (_handle, echoed) = tokio::time::timeout(Duration::from_secs(10), caller)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(echoed, b"welcome");

        // Channel EOF ends the caller's input and closes the bridge
        tokio::time::timeout(Duration::from_secs(10), bridge.closed())
            .await
            .unwrap();
        assert_eq!(bridge.shutdown().await.0, RelayExit::RemoteClosed);
    }

    #[tokio::test]
    async fn test_activate_without_key_fails_hard() {
        let mut protocol = RusshProtocol::new();
        assert_eq!(
            protocol.activate().await,
            Err(ActivateStatus::Failed(ProtocolError::PrivateKey(
                "no host key attached".to_string()
            )))
        );
        // Once failed the link stays closed
        assert_eq!(
            protocol.activate().await,
            Err(ActivateStatus::Failed(ProtocolError::Closed))
        );
    }

    #[tokio::test]
    async fn test_inactive_link_refuses_plaintext() {
        let mut protocol = RusshProtocol::new();
        let mut buf = [0u8; 8];
        assert_eq!(protocol.push(b"x").await, Err(ProtocolError::NotActive));
        assert_eq!(protocol.pop(&mut buf), Ok(0));
        assert!(protocol.readiness().is_none());
    }
}
