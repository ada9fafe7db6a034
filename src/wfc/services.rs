// BBS Node - WFC Collaborators
// Copyright (C) 2025 Akaere Networks
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Everything the dispatcher delegates
//!
//! The dispatcher only sequences work. Screens, editors, network programs
//! and event runners sit behind these traits so the loop can be driven by
//! fakes in tests and by external programs in production.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use super::command::{SysopHotKey, WfcCommand};
use super::screen::WfcScreen;
use crate::core::{ActivityLog, InstanceRegistry, SessionContext, StatusStore, UserStore};

/// The local sysop keyboard and screen
pub trait Console: Send {
    fn key_pressed(&mut self) -> bool;

    /// Next key without waiting
    fn get_key(&mut self) -> Option<u8>;

    fn cls(&mut self);

    fn puts(&mut self, text: &str);

    fn draw_wfc(&mut self, screen: &WfcScreen);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalloutMode {
    /// Call the configured hub now
    Forced,
    /// Keep dialing until a connection is made
    WarDial,
    /// Call every system with pending outbound mail
    Fast,
}

impl CalloutMode {
    pub fn for_command(command: WfcCommand) -> Option<Self> {
        match command {
            WfcCommand::ForceCallout => Some(CalloutMode::Forced),
            WfcCommand::WarDialCallout => Some(CalloutMode::WarDial),
            WfcCommand::FastCallout => Some(CalloutMode::Fast),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CalloutMode::Forced => "forced",
            CalloutMode::WarDial => "wardial",
            CalloutMode::Fast => "fast",
        }
    }
}

/// Scheduled and network maintenance
#[async_trait]
pub trait Housekeeping: Send {
    /// Forget events left pending from an earlier run
    async fn cleanup_events(&mut self, ctx: &SessionContext) -> Result<()>;

    async fn begin_day(&mut self, ctx: &SessionContext) -> Result<()>;

    /// Index of the next external event that is due
    async fn check_event(&mut self, ctx: &SessionContext) -> Result<Option<usize>>;

    async fn run_event(&mut self, index: usize, ctx: &SessionContext) -> Result<()>;

    async fn attempt_callout(&mut self, ctx: &SessionContext) -> Result<()>;

    async fn force_callout(&mut self, mode: CalloutMode, ctx: &SessionContext) -> Result<()>;

    async fn cleanup_net(&mut self, ctx: &SessionContext) -> Result<()>;
}

/// Runs sysop commands and hot keys
#[async_trait]
pub trait SysopCommands: Send {
    async fn execute(
        &mut self,
        command: WfcCommand,
        ctx: &mut SessionContext,
        console: &mut dyn Console,
    ) -> Result<()>;

    async fn hot_key(
        &mut self,
        key: SysopHotKey,
        ctx: &mut SessionContext,
        console: &mut dyn Console,
    ) -> Result<()>;
}

pub struct WfcServices {
    pub console: Box<dyn Console>,
    pub housekeeping: Box<dyn Housekeeping>,
    pub commands: Box<dyn SysopCommands>,
    pub status: Arc<dyn StatusStore>,
    pub users: Arc<dyn UserStore>,
    pub instances: Arc<dyn InstanceRegistry>,
    pub activity: Box<dyn ActivityLog>,
}
