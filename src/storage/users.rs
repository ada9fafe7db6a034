// BBS Node - Account Store
// Copyright (C) 2025 Akaere Networks
// SPDX-License-Identifier: AGPL-3.0-or-later

use super::lmdb::{SharedNodeDatabase, StorageError};
use crate::config::{PRIMARY_USER, SYSOP_LEVEL};
use crate::core::{AccountError, UserRecord, UserStore};
use crate::log_notice;

const USER_PREFIX: &str = "user/";

fn user_key(number: u16) -> String {
    format!("{}{:05}", USER_PREFIX, number)
}

impl From<StorageError> for AccountError {
    fn from(err: StorageError) -> Self {
        AccountError::Storage(err.to_string())
    }
}

pub struct LmdbUserStore {
    db: SharedNodeDatabase,
}

impl LmdbUserStore {
    pub fn new(db: SharedNodeDatabase) -> Self {
        Self { db }
    }

    pub fn write_user(&self, user: &UserRecord) -> Result<(), AccountError> {
        Ok(self.db.put_json(&user_key(user.number), user)?)
    }

    /// Create the sysop account on a fresh database
    pub fn ensure_primary_user(&self, name: &str) -> Result<(), AccountError> {
        if self.db.get_json::<UserRecord>(&user_key(PRIMARY_USER))?.is_none() {
            self.write_user(&UserRecord::new(PRIMARY_USER, name, SYSOP_LEVEL))?;
            log_notice!("Created sysop account #{} '{}'", PRIMARY_USER, name);
        }
        Ok(())
    }
}

impl UserStore for LmdbUserStore {
    fn read_user(&self, number: u16) -> Result<UserRecord, AccountError> {
        self.db
            .get_json(&user_key(number))?
            .ok_or(AccountError::Missing(number))
    }

    fn user_count(&self) -> Result<u16, AccountError> {
        // Account numbers are dense from 1, deleted accounts keep their slot
        Ok(self
            .db
            .keys_with_prefix(USER_PREFIX)?
            .iter()
            .filter_map(|key| key[USER_PREFIX.len()..].parse::<u16>().ok())
            .max()
            .unwrap_or(0))
    }
}
