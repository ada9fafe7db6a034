// BBS Node - Scheduled Housekeeping
// Copyright (C) 2025 Akaere Networks
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Timed events, begin-day and network maintenance as external programs
//!
//! Each timed event keeps its last-run date in the node database. A node
//! claims an event by writing today's date before starting the program, so
//! when several nodes share a data directory only one of them runs it.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::process::{node_env, run_captured};
use crate::config::{NodeConfig, TimedEvent};
use crate::core::{SessionContext, StatusStore};
use crate::storage::SharedNodeDatabase;
use crate::wfc::{CalloutMode, Housekeeping};
use crate::{log_debug, log_info, log_notice};

const EVENT_PREFIX: &str = "event/";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub last_run: Option<NaiveDate>,
    /// Node currently running the event
    pub running_on: Option<u16>,
}

fn event_key(event: &TimedEvent) -> String {
    format!("{}{}", EVENT_PREFIX, event.name)
}

pub struct ScheduledHousekeeping {
    config: Arc<NodeConfig>,
    db: SharedNodeDatabase,
    status: Arc<dyn StatusStore>,
}

impl ScheduledHousekeeping {
    pub fn new(config: Arc<NodeConfig>, db: SharedNodeDatabase, status: Arc<dyn StatusStore>) -> Self {
        Self { config, db, status }
    }

    pub fn record(&self, event: &TimedEvent) -> Result<EventRecord> {
        Ok(self.db.get_json(&event_key(event))?.unwrap_or_default())
    }

    fn is_due(&self, event: &TimedEvent, ctx: &SessionContext) -> Result<bool> {
        let Some(start) = event.start_time() else {
            return Ok(false);
        };
        if !event.runs_on(ctx.instance) || ctx.now().time() < start {
            return Ok(false);
        }
        let record = self.record(event)?;
        Ok(record.last_run != Some(ctx.today()) && record.running_on.is_none())
    }

    /// Mark the event as run today by this node; false if another node has it
    fn claim(&self, event: &TimedEvent, ctx: &SessionContext) -> Result<bool> {
        let today = ctx.today();
        let mut claimed = false;
        self.db
            .update_json(&event_key(event), |record: Option<EventRecord>| {
                let record = record.unwrap_or_default();
                if record.last_run == Some(today) || record.running_on.is_some() {
                    return record;
                }
                claimed = true;
                EventRecord {
                    last_run: Some(today),
                    running_on: Some(ctx.instance),
                }
            })?;
        Ok(claimed)
    }

    fn release(&self, event: &TimedEvent) -> Result<()> {
        self.db
            .update_json(&event_key(event), |record: Option<EventRecord>| EventRecord {
                running_on: None,
                ..record.unwrap_or_default()
            })?;
        Ok(())
    }

    async fn run_optional(
        &self,
        label: &str,
        command: Option<&str>,
        env: &[(&str, String)],
    ) -> Result<()> {
        match command {
            Some(command) => run_captured(label, command, env).await,
            None => {
                log_debug!("No {} program configured", label);
                Ok(())
            }
        }
    }
}

#[async_trait]
impl Housekeeping for ScheduledHousekeeping {
    async fn cleanup_events(&mut self, ctx: &SessionContext) -> Result<()> {
        for event in &self.config.events.timed {
            let record = self.record(event)?;
            if record.running_on == Some(ctx.instance) {
                log_notice!("Clearing unfinished event '{}'", event.name);
                self.release(event)?;
            }
        }
        Ok(())
    }

    async fn begin_day(&mut self, ctx: &SessionContext) -> Result<()> {
        log_info!("Running begin-day event");
        let mut env = node_env(ctx);
        env.push(("BBS_NODE_DATE", ctx.today().format("%Y-%m-%d").to_string()));
        self.run_optional("begin-day", self.config.events.beginday_command.as_deref(), &env)
            .await
    }

    async fn check_event(&mut self, ctx: &SessionContext) -> Result<Option<usize>> {
        for (index, event) in self.config.events.timed.iter().enumerate() {
            if self.is_due(event, ctx)? {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    async fn run_event(&mut self, index: usize, ctx: &SessionContext) -> Result<()> {
        let event = self
            .config
            .events
            .timed
            .get(index)
            .with_context(|| format!("no timed event #{}", index))?;

        if !self.claim(event, ctx)? {
            log_debug!("Event '{}' already taken by another node", event.name);
            return Ok(());
        }

        log_info!("Running event '{}'", event.name);
        let mut env = node_env(ctx);
        env.push(("BBS_NODE_EVENT", event.name.clone()));
        let result = run_captured("event", &event.command, &env).await;
        self.release(event)?;
        result
    }

    async fn attempt_callout(&mut self, ctx: &SessionContext) -> Result<()> {
        let mut env = node_env(ctx);
        env.push(("BBS_NODE_CALLOUT", "auto".to_string()));
        env.push((
            "BBS_NODE_SYSTEM",
            self.config.network.system_number.to_string(),
        ));
        self.run_optional("callout", self.config.network.callout_command.as_deref(), &env)
            .await
    }

    async fn force_callout(&mut self, mode: CalloutMode, ctx: &SessionContext) -> Result<()> {
        log_info!("Network callout requested ({})", mode.as_str());
        let mut env = node_env(ctx);
        env.push(("BBS_NODE_CALLOUT", mode.as_str().to_string()));
        env.push((
            "BBS_NODE_SYSTEM",
            self.config.network.system_number.to_string(),
        ));
        self.run_optional("callout", self.config.network.callout_command.as_deref(), &env)
            .await
    }

    async fn cleanup_net(&mut self, ctx: &SessionContext) -> Result<()> {
        let env = node_env(ctx);
        self.run_optional("net cleanup", self.config.network.cleanup_command.as_deref(), &env)
            .await?;
        self.status.set_net_clean_needed(false)?;
        Ok(())
    }
}
