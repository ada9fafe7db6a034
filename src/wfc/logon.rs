// BBS Node - Local Logon
// Copyright (C) 2025 Akaere Networks
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::time::Duration;

use super::services::Console;
use crate::core::Clock;

/// First byte of a two-byte extended key
pub const EXTENDED_PREFIXES: [u8; 2] = [0, 224];

/// Result of the sysop's answer at the local logon prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalLogon {
    Declined,
    /// Normal logon as the primary sysop account
    Primary,
    /// Straight to the main menu as the given sysop account
    Fast(u16),
}

impl LocalLogon {
    pub fn code(self) -> u8 {
        match self {
            LocalLogon::Declined => 0,
            LocalLogon::Primary => 1,
            LocalLogon::Fast(_) => 2,
        }
    }
}

/// Give the rest of this time slice to other tasks
pub async fn give_up_slice(slice: Duration) {
    if slice.is_zero() {
        tokio::task::yield_now().await;
    } else {
        tokio::time::sleep(slice).await;
    }
}

/// Wait for a key until `timeout` has passed on `clock`
pub async fn wait_for_key(
    console: &mut dyn Console,
    clock: &dyn Clock,
    timeout: Duration,
    slice: Duration,
) -> Option<u8> {
    let limit = chrono::Duration::seconds(timeout.as_secs() as i64);
    let started = clock.now();
    loop {
        if console.key_pressed() {
            if let Some(key) = console.get_key() {
                return Some(key);
            }
        }
        if clock.now().signed_duration_since(started) > limit {
            return None;
        }
        give_up_slice(slice).await;
    }
}
