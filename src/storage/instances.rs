// BBS Node - Instance Registry
// Copyright (C) 2025 Akaere Networks
// SPDX-License-Identifier: AGPL-3.0-or-later

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::lmdb::SharedNodeDatabase;
use crate::core::{InstanceLocation, InstanceRegistry};
use crate::log_debug;

const INSTANCE_PREFIX: &str = "instance/";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub instance: u16,
    pub location: InstanceLocation,
    pub since: DateTime<Utc>,
}

pub struct LmdbInstanceRegistry {
    db: SharedNodeDatabase,
}

impl LmdbInstanceRegistry {
    pub fn new(db: SharedNodeDatabase) -> Self {
        Self { db }
    }

    pub fn list(&self) -> anyhow::Result<Vec<InstanceRecord>> {
        let mut records = Vec::new();
        for key in self.db.keys_with_prefix(INSTANCE_PREFIX)? {
            if let Some(record) = self.db.get_json(&key)? {
                records.push(record);
            }
        }
        Ok(records)
    }
}

impl InstanceRegistry for LmdbInstanceRegistry {
    fn announce(&self, instance: u16, location: InstanceLocation) -> anyhow::Result<()> {
        let key = format!("{}{:03}", INSTANCE_PREFIX, instance);
        let current: Option<InstanceRecord> = self.db.get_json(&key)?;
        if current.is_some_and(|record| record.location == location) {
            return Ok(());
        }
        self.db.put_json(
            &key,
            &InstanceRecord {
                instance,
                location,
                since: Utc::now(),
            },
        )?;
        log_debug!("Node {} is now {}", instance, location.describe());
        Ok(())
    }
}
