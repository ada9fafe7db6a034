// BBS Node - Null Transport
// Copyright (C) 2025 Akaere Networks
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::io;

use async_trait::async_trait;

use super::{RemoteIo, TransportKind};

/// No remote caller; the node is driven from the local console
#[derive(Debug, Default)]
pub struct NullIo;

#[async_trait]
impl RemoteIo for NullIo {
    fn transport(&self) -> TransportKind {
        TransportKind::None
    }

    async fn open(&mut self) -> bool {
        true
    }

    async fn close(&mut self, _temporary: bool) {}

    async fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Ok(0)
    }

    async fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        Ok(data.len())
    }

    fn carrier(&self) -> bool {
        false
    }

    fn incoming(&mut self) -> bool {
        false
    }
}
