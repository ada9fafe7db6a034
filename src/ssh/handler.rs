// BBS Node - SSH Session Handler
// Copyright (C) 2025 Akaere Networks
// SPDX-License-Identifier: AGPL-3.0-or-later

//! russh callbacks for a single caller
//!
//! The node runs its own logon after the transport is up, so SSH level
//! authentication is accepted whenever auto-respond is on. The handler opens
//! exactly one session channel, signals the protocol once the caller asks
//! for a shell and queues channel data for the relay.

use std::sync::Arc;

use anyhow::Result;
use russh::{Channel, ChannelId, server};
use russh_keys::key;
use tokio::sync::{Notify, mpsc, oneshot};

use crate::log_debug;

/// Sent to the protocol once the caller's shell channel is usable
pub type ShellReady = (ChannelId, server::Handle);

pub struct NodeSshHandler {
    auto_respond: bool,
    channel: Option<ChannelId>,
    ready: Option<oneshot::Sender<ShellReady>>,
    inbound: Option<mpsc::UnboundedSender<Vec<u8>>>,
    notify: Arc<Notify>,
}

impl NodeSshHandler {
    pub fn new(
        auto_respond: bool,
        ready: oneshot::Sender<ShellReady>,
        inbound: mpsc::UnboundedSender<Vec<u8>>,
        notify: Arc<Notify>,
    ) -> Self {
        Self {
            auto_respond,
            channel: None,
            ready: Some(ready),
            inbound: Some(inbound),
            notify,
        }
    }

    fn decide(&self, method: &str, user: &str) -> server::Auth {
        if self.auto_respond {
            log_debug!("SSH {} authentication accepted for '{}'", method, user);
            server::Auth::Accept
        } else {
            log_debug!("SSH {} authentication rejected for '{}'", method, user);
            server::Auth::Reject {
                proceed_with_methods: None,
            }
        }
    }

    fn is_ours(&self, channel: ChannelId) -> bool {
        self.channel == Some(channel)
    }

    fn end_inbound(&mut self) {
        if self.inbound.take().is_some() {
            self.notify.notify_one();
        }
    }
}

impl Drop for NodeSshHandler {
    fn drop(&mut self) {
        self.end_inbound();
    }
}

#[async_trait::async_trait]
impl server::Handler for NodeSshHandler {
    type Error = anyhow::Error;

    async fn auth_none(&mut self, user: &str) -> Result<server::Auth, Self::Error> {
        Ok(self.decide("none", user))
    }

    async fn auth_password(
        &mut self,
        user: &str,
        _password: &str,
    ) -> Result<server::Auth, Self::Error> {
        Ok(self.decide("password", user))
    }

    async fn auth_publickey(
        &mut self,
        user: &str,
        _public_key: &key::PublicKey,
    ) -> Result<server::Auth, Self::Error> {
        Ok(self.decide("publickey", user))
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<server::Msg>,
        _session: &mut server::Session,
    ) -> Result<bool, Self::Error> {
        if self.channel.is_some() {
            log_debug!("Refusing extra SSH channel {:?}", channel.id());
            return Ok(false);
        }
        log_debug!("SSH channel opened: {:?}", channel.id());
        self.channel = Some(channel.id());
        Ok(true)
    }

    async fn pty_request(
        &mut self,
        channel: ChannelId,
        term: &str,
        col_width: u32,
        row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _modes: &[(russh::Pty, u32)],
        session: &mut server::Session,
    ) -> Result<(), Self::Error> {
        log_debug!(
            "SSH PTY request on {:?}: {} {}x{}",
            channel,
            term,
            col_width,
            row_height
        );
        session.request_success();
        Ok(())
    }

    async fn shell_request(
        &mut self,
        channel: ChannelId,
        session: &mut server::Session,
    ) -> Result<(), Self::Error> {
        if !self.is_ours(channel) {
            session.request_failure();
            return Ok(());
        }
        session.request_success();
        if let Some(ready) = self.ready.take() {
            // The protocol may have given up waiting; nothing to tell then
            let _ = ready.send((channel, session.handle()));
        }
        Ok(())
    }

    async fn data(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        _session: &mut server::Session,
    ) -> Result<(), Self::Error> {
        if !self.is_ours(channel) {
            return Ok(());
        }
        if let Some(inbound) = &self.inbound {
            if inbound.send(data.to_vec()).is_ok() {
                self.notify.notify_one();
            }
        }
        Ok(())
    }

    async fn channel_eof(
        &mut self,
        channel: ChannelId,
        _session: &mut server::Session,
    ) -> Result<(), Self::Error> {
        log_debug!("SSH channel EOF: {:?}", channel);
        if self.is_ours(channel) {
            self.end_inbound();
        }
        Ok(())
    }

    async fn channel_close(
        &mut self,
        channel: ChannelId,
        _session: &mut server::Session,
    ) -> Result<(), Self::Error> {
        log_debug!("SSH channel closed: {:?}", channel);
        if self.is_ours(channel) {
            self.end_inbound();
        }
        Ok(())
    }
}
