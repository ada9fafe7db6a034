// BBS Node - User Accounts
// Copyright (C) 2025 Akaere Networks
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Account records as seen by the node and the storage contract behind them

use serde::{Deserialize, Serialize};

use crate::config::SYSOP_LEVEL;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub number: u16,
    pub name: String,
    pub security_level: u8,
    pub deleted: bool,
}

impl UserRecord {
    pub fn new(number: u16, name: impl Into<String>, security_level: u8) -> Self {
        Self {
            number,
            name: name.into(),
            security_level,
            deleted: false,
        }
    }

    /// Placeholder used before any account has been read
    pub fn guest() -> Self {
        Self::new(0, "", 0)
    }

    pub fn is_sysop(&self) -> bool {
        self.security_level == SYSOP_LEVEL
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("account {0} does not exist")]
    Missing(u16),
    #[error("account storage failure: {0}")]
    Storage(String),
}

/// Persistent account storage
pub trait UserStore: Send + Sync {
    fn read_user(&self, number: u16) -> Result<UserRecord, AccountError>;

    fn user_count(&self) -> Result<u16, AccountError>;
}

/// Whether `number` may skip the logon prompt from the local console
pub fn fast_logon_eligible(store: &dyn UserStore, number: u16) -> Result<Option<UserRecord>, AccountError> {
    if number == 0 || number > store.user_count()? {
        return Ok(None);
    }
    match store.read_user(number) {
        Ok(user) if user.is_sysop() && !user.deleted => Ok(Some(user)),
        Ok(_) | Err(AccountError::Missing(_)) => Ok(None),
        Err(err) => Err(err),
    }
}
