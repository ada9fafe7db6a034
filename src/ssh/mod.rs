// BBS Node - SSH Module
// Copyright (C) 2025 Akaere Networks
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Secure transport for callers arriving over SSH
//!
//! - `identity`: passphrase-protected host key store
//! - `protocol`: what a secure session needs from the protocol library
//! - `server`, `handler`: the russh backed implementation
//! - `session`: handshake and serialized plaintext I/O for one caller
//! - `bridge`: relays plaintext to a loopback socket for the interactive side

pub mod bridge;
pub mod handler;
pub mod identity;
pub mod protocol;
pub mod server;
pub mod session;

pub use bridge::{BridgeError, RelayExit, TransportBridge};
pub use identity::{HostIdentity, KeyError};
pub use protocol::{ActivateStatus, ProtocolError, ProtocolSession};
pub use server::RusshProtocol;
pub use session::{HandshakeFailure, HandshakeState, RelayFailure, SecureSession};
