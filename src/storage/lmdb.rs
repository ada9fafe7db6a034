// BBS Node - LMDB Node Database
// Copyright (C) 2025 Akaere Networks
// SPDX-License-Identifier: AGPL-3.0-or-later

//! One LMDB environment per process, shared by every store
//!
//! Values are JSON documents under prefixed string keys (`status`,
//! `user/00001`, `instance/003`, `event/nightly`). LMDB's own locking lets
//! several node processes share the directory.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use lmdb::{Cursor, Database, Environment, Transaction, WriteFlags};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::NODE_DB_MAP_SIZE;
use crate::{log_debug, log_info, log_warn};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("cannot prepare {path}: {source}")]
    Directory {
        path: String,
        source: std::io::Error,
    },
    #[error("LMDB error: {0}")]
    Lmdb(#[from] lmdb::Error),
    #[error("stored value for '{key}' is unreadable: {source}")]
    Decode {
        key: String,
        source: serde_json::Error,
    },
    #[error("cannot encode value for '{key}': {source}")]
    Encode {
        key: String,
        source: serde_json::Error,
    },
}

#[derive(Debug)]
pub struct NodeDatabase {
    env: Environment,
    db: Database,
}

pub type SharedNodeDatabase = Arc<NodeDatabase>;

impl NodeDatabase {
    pub fn open(dir: &Path) -> Result<Self, StorageError> {
        if !dir.exists() {
            fs::create_dir_all(dir).map_err(|source| StorageError::Directory {
                path: dir.display().to_string(),
                source,
            })?;
            log_info!("Created node database directory: {}", dir.display());
        }

        let env = Environment::new()
            .set_max_dbs(1)
            .set_map_size(NODE_DB_MAP_SIZE)
            .open(dir)?;
        let db = env.open_db(None)?;

        log_debug!("Node database opened at {}", dir.display());
        Ok(Self { env, db })
    }

    pub fn shared(dir: &Path) -> Result<SharedNodeDatabase, StorageError> {
        Ok(Arc::new(Self::open(dir)?))
    }

    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        let txn = self.env.begin_ro_txn()?;
        match txn.get(self.db, &key) {
            Ok(bytes) => serde_json::from_slice(bytes)
                .map(Some)
                .map_err(|source| StorageError::Decode {
                    key: key.to_string(),
                    source,
                }),
            Err(lmdb::Error::NotFound) => Ok(None),
            Err(e) => {
                log_warn!("LMDB: Error reading key '{}': {}", key, e);
                Err(e.into())
            }
        }
    }

    pub fn put_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let encoded = serde_json::to_vec(value).map_err(|source| StorageError::Encode {
            key: key.to_string(),
            source,
        })?;
        let mut txn = self.env.begin_rw_txn()?;
        txn.put(self.db, &key, &encoded, WriteFlags::empty())?;
        txn.commit()?;
        Ok(())
    }

    /// Read-modify-write `key` inside one write transaction
    ///
    /// Concurrent nodes serialize on the LMDB writer lock, so an update is
    /// never lost between the read and the write.
    pub fn update_json<T, F>(&self, key: &str, update: F) -> Result<T, StorageError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(Option<T>) -> T,
    {
        let mut txn = self.env.begin_rw_txn()?;
        let current = match txn.get(self.db, &key) {
            Ok(bytes) => Some(serde_json::from_slice(bytes).map_err(|source| {
                StorageError::Decode {
                    key: key.to_string(),
                    source,
                }
            })?),
            Err(lmdb::Error::NotFound) => None,
            Err(e) => return Err(e.into()),
        };

        let next = update(current);
        let encoded = serde_json::to_vec(&next).map_err(|source| StorageError::Encode {
            key: key.to_string(),
            source,
        })?;
        txn.put(self.db, &key, &encoded, WriteFlags::empty())?;
        txn.commit()?;
        Ok(next)
    }

    pub fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let txn = self.env.begin_ro_txn()?;
        let mut cursor = txn.open_ro_cursor(self.db)?;
        let mut keys = Vec::new();

        for (key, _) in cursor.iter() {
            if let Ok(key) = std::str::from_utf8(key) {
                if key.starts_with(prefix) {
                    keys.push(key.to_string());
                }
            }
        }

        Ok(keys)
    }
}
