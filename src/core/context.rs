// BBS Node - Session Context
// Copyright (C) 2025 Akaere Networks
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Per-node session state handed explicitly to every component

use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDate};

use super::account::UserRecord;
use super::clock::Clock;
use crate::config::NodeConfig;

pub struct SessionContext {
    pub instance: u16,
    pub config: Arc<NodeConfig>,
    pub clock: Arc<dyn Clock>,
    pub user: UserRecord,
    effective_sl: u8,
    pub current_speed: String,
    pub user_online: bool,
    /// Minutes until the next external event, as passed on the command line
    pub event_minutes: Option<u32>,
}

impl SessionContext {
    pub fn new(instance: u16, config: Arc<NodeConfig>, clock: Arc<dyn Clock>) -> Self {
        Self {
            instance,
            config,
            clock,
            user: UserRecord::guest(),
            effective_sl: 0,
            current_speed: "KB".to_string(),
            user_online: false,
            event_minutes: None,
        }
    }

    pub fn user_number(&self) -> u16 {
        self.user.number
    }

    /// Make `user` the current account and drop any temporary level change
    pub fn switch_user(&mut self, user: UserRecord) {
        self.user = user;
        self.reset_effective_sl();
    }

    pub fn effective_sl(&self) -> u8 {
        self.effective_sl
    }

    pub fn reset_effective_sl(&mut self) {
        self.effective_sl = self.user.security_level;
    }

    pub fn now(&self) -> DateTime<Local> {
        self.clock.now()
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }
}
