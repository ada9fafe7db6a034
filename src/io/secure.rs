// BBS Node - Secure Transport
// Copyright (C) 2025 Akaere Networks
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::io;

use async_trait::async_trait;

use super::{RemoteIo, SocketIo, TransportKind};
use crate::ssh::bridge::TransportBridge;
use crate::ssh::protocol::ProtocolSession;
use crate::ssh::server::RusshProtocol;

/// SSH caller, seen through the plaintext end of a transport bridge
pub struct SecureIo<P: ProtocolSession + 'static = RusshProtocol> {
    bridge: TransportBridge<P>,
    plain: SocketIo,
}

impl<P: ProtocolSession + 'static> SecureIo<P> {
    pub fn new(bridge: TransportBridge<P>, plain_end: tokio::net::TcpStream) -> Self {
        Self {
            bridge,
            plain: SocketIo::plain(plain_end, TransportKind::Secure),
        }
    }
}

#[async_trait]
impl<P: ProtocolSession + 'static> RemoteIo for SecureIo<P> {
    fn transport(&self) -> TransportKind {
        TransportKind::Secure
    }

    async fn open(&mut self) -> bool {
        !self.bridge.is_closed() && self.plain.open().await
    }

    async fn close(&mut self, temporary: bool) {
        self.plain.close(temporary).await;
        if !temporary {
            self.bridge.shutdown().await;
        }
    }

    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.plain.read(buf).await
    }

    async fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.plain.write(data).await
    }

    fn carrier(&self) -> bool {
        self.plain.carrier() && !self.bridge.is_closed()
    }

    fn incoming(&mut self) -> bool {
        self.plain.incoming()
    }
}
