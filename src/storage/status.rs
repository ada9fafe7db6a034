// BBS Node - Status Store
// Copyright (C) 2025 Akaere Networks
// SPDX-License-Identifier: AGPL-3.0-or-later

use chrono::NaiveDate;

use super::lmdb::{SharedNodeDatabase, StorageError};
use crate::core::{Clock, NodeStatus, StatusError, StatusStore};

const STATUS_KEY: &str = "status";

impl From<StorageError> for StatusError {
    fn from(err: StorageError) -> Self {
        StatusError::Storage(err.to_string())
    }
}

pub struct LmdbStatusStore {
    db: SharedNodeDatabase,
    /// Date used when no status has been written yet
    first_day: NaiveDate,
}

impl LmdbStatusStore {
    pub fn new(db: SharedNodeDatabase, clock: &dyn Clock) -> Self {
        Self {
            db,
            first_day: clock.today(),
        }
    }

    fn update(&self, change: impl FnOnce(&mut NodeStatus)) -> Result<NodeStatus, StatusError> {
        let first_day = self.first_day;
        Ok(self.db.update_json(STATUS_KEY, |current: Option<NodeStatus>| {
            let mut status = current.unwrap_or_else(|| NodeStatus::new(first_day));
            change(&mut status);
            status
        })?)
    }
}

impl StatusStore for LmdbStatusStore {
    fn status(&self) -> Result<NodeStatus, StatusError> {
        Ok(self
            .db
            .get_json(STATUS_KEY)?
            .unwrap_or_else(|| NodeStatus::new(self.first_day)))
    }

    fn roll_day(&self, today: NaiveDate) -> Result<NodeStatus, StatusError> {
        self.update(|status| {
            if status.last_date != today {
                status.last_date = today;
                status.calls_today = 0;
            }
        })
    }

    fn set_net_clean_needed(&self, needed: bool) -> Result<(), StatusError> {
        self.update(|status| status.net_clean_needed = needed)?;
        Ok(())
    }

    fn record_call(&self) -> Result<NodeStatus, StatusError> {
        self.update(|status| {
            status.calls_today += 1;
            status.total_calls += 1;
        })
    }
}
