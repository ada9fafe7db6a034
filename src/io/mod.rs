// BBS Node - Remote I/O
// Copyright (C) 2025 Akaere Networks
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The byte stream the interactive session talks to
//!
//! Whatever carries the caller (nothing, telnet or SSH through the bridge),
//! the interactive side only sees [`RemoteIo`].

pub mod null;
pub mod secure;
pub mod socket;
pub mod telnet;

use std::fmt;
use std::io;
use std::str::FromStr;

use async_trait::async_trait;

pub use null::NullIo;
pub use secure::SecureIo;
pub use socket::{SocketIo, inherit_socket};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Local console only
    None,
    Telnet,
    Secure,
}

impl TransportKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransportKind::None => "none",
            TransportKind::Telnet => "telnet",
            TransportKind::Secure => "ssh",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "n" | "none" => Ok(TransportKind::None),
            "t" | "telnet" => Ok(TransportKind::Telnet),
            "s" | "ssh" => Ok(TransportKind::Secure),
            other => Err(format!("unknown transport '{}' (expected T or S)", other)),
        }
    }
}

#[async_trait]
pub trait RemoteIo: Send {
    fn transport(&self) -> TransportKind;

    /// Prepare the connection for the session; false if the caller is gone
    async fn open(&mut self) -> bool;

    /// End the connection, or only flush it when `temporary`
    async fn close(&mut self, temporary: bool);

    /// Read caller input; `Ok(0)` means the caller is gone
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    async fn write(&mut self, data: &[u8]) -> io::Result<usize>;

    fn carrier(&self) -> bool;

    /// Whether input is waiting, without blocking
    fn incoming(&mut self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_parsing() {
        assert_eq!("T".parse::<TransportKind>(), Ok(TransportKind::Telnet));
        assert_eq!("s".parse::<TransportKind>(), Ok(TransportKind::Secure));
        assert_eq!("none".parse::<TransportKind>(), Ok(TransportKind::None));
        assert!("x".parse::<TransportKind>().is_err());
        assert_eq!(TransportKind::Secure.to_string(), "ssh");
    }
}
