// BBS Node - Socket Transport
// Copyright (C) 2025 Akaere Networks
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::collections::VecDeque;
use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use super::telnet::{self, TelnetDecoder};
use super::{RemoteIo, TransportKind};
use crate::log_debug;

const READ_CHUNK: usize = 4096;

/// Adopt a connected socket handed down by the process that accepted it
#[cfg(unix)]
pub fn inherit_socket(handle: u64) -> io::Result<TcpStream> {
    use std::os::unix::io::{FromRawFd, RawFd};

    let fd = RawFd::try_from(handle)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "socket handle out of range"))?;
    // SAFETY: the launching listener passes ownership of this descriptor to
    // the node and does not use it afterwards.
    let stream = unsafe { std::net::TcpStream::from_raw_fd(fd) };
    stream.set_nonblocking(true)?;
    TcpStream::from_std(stream)
}

#[cfg(windows)]
pub fn inherit_socket(handle: u64) -> io::Result<TcpStream> {
    use std::os::windows::io::FromRawSocket;

    // SAFETY: the launching listener passes ownership of this socket to the
    // node and does not use it afterwards.
    let stream = unsafe { std::net::TcpStream::from_raw_socket(handle) };
    stream.set_nonblocking(true)?;
    TcpStream::from_std(stream)
}

/// Caller connected over a plain socket, optionally speaking telnet
pub struct SocketIo {
    stream: Option<TcpStream>,
    kind: TransportKind,
    decoder: Option<TelnetDecoder>,
    pending: VecDeque<u8>,
    carrier: bool,
}

impl SocketIo {
    pub fn telnet(stream: TcpStream) -> Self {
        Self::new(stream, TransportKind::Telnet, Some(TelnetDecoder::new()))
    }

    /// Raw byte stream reported as `kind`
    pub fn plain(stream: TcpStream, kind: TransportKind) -> Self {
        Self::new(stream, kind, None)
    }

    fn new(stream: TcpStream, kind: TransportKind, decoder: Option<TelnetDecoder>) -> Self {
        Self {
            stream: Some(stream),
            kind,
            decoder,
            pending: VecDeque::new(),
            carrier: true,
        }
    }

    fn accept_input(&mut self, raw: &[u8]) {
        match &mut self.decoder {
            Some(decoder) => {
                let mut decoded = Vec::with_capacity(raw.len());
                decoder.decode(raw, &mut decoded);
                self.pending.extend(decoded);
            }
            None => self.pending.extend(raw.iter().copied()),
        }
    }

    fn take_pending(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.pending.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        n
    }

    fn lose_carrier(&mut self) {
        if self.carrier {
            log_debug!("{} caller dropped carrier", self.kind);
        }
        self.carrier = false;
    }
}

#[async_trait]
impl RemoteIo for SocketIo {
    fn transport(&self) -> TransportKind {
        self.kind
    }

    async fn open(&mut self) -> bool {
        if self.decoder.is_none() {
            return self.carrier;
        }
        let Some(stream) = self.stream.as_mut() else {
            return false;
        };
        if stream.write_all(&telnet::NEGOTIATION).await.is_err() {
            self.lose_carrier();
            return false;
        }
        true
    }

    async fn close(&mut self, temporary: bool) {
        if let Some(stream) = self.stream.as_mut() {
            let _ = stream.flush().await;
            if !temporary {
                let _ = stream.shutdown().await;
            }
        }
        if !temporary {
            self.stream = None;
            self.carrier = false;
        }
    }

    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut raw = [0u8; READ_CHUNK];
        while self.pending.is_empty() {
            let Some(stream) = self.stream.as_mut() else {
                return Ok(0);
            };
            let n = stream.read(&mut raw).await?;
            if n == 0 {
                self.lose_carrier();
                return Ok(0);
            }
            self.accept_input(&raw[..n]);
        }
        Ok(self.take_pending(buf))
    }

    async fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "connection closed"))?;
        let encoded = match self.decoder {
            Some(_) => telnet::escape(data),
            None => data.into(),
        };
        stream.write_all(&encoded).await?;
        Ok(data.len())
    }

    fn carrier(&self) -> bool {
        self.carrier && self.stream.is_some()
    }

    fn incoming(&mut self) -> bool {
        if !self.pending.is_empty() {
            return true;
        }
        let mut raw = [0u8; READ_CHUNK];
        let result = match self.stream.as_ref() {
            Some(stream) => stream.try_read(&mut raw),
            None => return false,
        };
        match result {
            Ok(0) => {
                self.lose_carrier();
                false
            }
            Ok(n) => {
                self.accept_input(&raw[..n]);
                !self.pending.is_empty()
            }
            Err(_) => false,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::io::telnet::{DO, IAC, OPT_SGA};
    use tokio::net::TcpListener;

    pub(crate) async fn socket_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
        (accepted.unwrap().0, client.unwrap())
    }

    #[tokio::test]
    async fn test_telnet_session_negotiates_and_filters() {
        let (server, mut caller) = socket_pair().await;
        let mut io = SocketIo::telnet(server);

        assert!(io.open().await);
        let mut negotiation = [0u8; 9];
        caller.read_exact(&mut negotiation).await.unwrap();
        assert_eq!(negotiation, telnet::NEGOTIATION);

        caller.write_all(&[IAC, DO, OPT_SGA, b'Y', IAC, IAC]).await.unwrap();
        let mut buf = [0u8; 8];
        let mut got = Vec::new();
        while got.len() < 2 {
            let n = io.read(&mut buf).await.unwrap();
            got.extend_from_slice(&buf[..n]);
        }
        assert_eq!(got, vec![b'Y', IAC]);

        io.write(&[b'>', IAC]).await.unwrap();
        let mut echoed = [0u8; 3];
        caller.read_exact(&mut echoed).await.unwrap();
        assert_eq!(echoed, [b'>', IAC, IAC]);
    }

    #[tokio::test]
    async fn test_hangup_drops_carrier() {
        let (server, caller) = socket_pair().await;
        let mut io = SocketIo::plain(server, TransportKind::Telnet);
        drop(caller);

        let mut buf = [0u8; 4];
        assert_eq!(io.read(&mut buf).await.unwrap(), 0);
        assert!(!io.carrier());
    }
}
