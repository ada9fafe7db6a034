// BBS Node - Node Status
// Copyright (C) 2025 Akaere Networks
// SPDX-License-Identifier: AGPL-3.0-or-later

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// System-wide status shared by every node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    /// Date of the last day rollover
    pub last_date: NaiveDate,
    pub calls_today: u32,
    pub total_calls: u32,
    pub net_clean_needed: bool,
}

impl NodeStatus {
    pub fn new(last_date: NaiveDate) -> Self {
        Self {
            last_date,
            calls_today: 0,
            total_calls: 0,
            net_clean_needed: false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StatusError {
    #[error("status storage failure: {0}")]
    Storage(String),
}

pub trait StatusStore: Send + Sync {
    fn status(&self) -> Result<NodeStatus, StatusError>;

    /// Move the status to `today`, resetting the daily counters
    fn roll_day(&self, today: NaiveDate) -> Result<NodeStatus, StatusError>;

    fn set_net_clean_needed(&self, needed: bool) -> Result<(), StatusError>;

    /// Count a caller that reached the interactive session
    fn record_call(&self) -> Result<NodeStatus, StatusError>;
}
