// BBS Node - Connection Dispatcher
// Copyright (C) 2025 Akaere Networks
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The waiting-for-caller loop
//!
//! One iteration announces the node, rolls the day over when the date
//! changes, runs due events, calls out to the network, redraws the screen and
//! handles at most one sysop key. The loop ends when a caller is signalled,
//! a local logon completes or the sysop quits.

use std::time::Duration;

use super::command::{SysopHotKey, WfcCommand};
use super::logon::{EXTENDED_PREFIXES, LocalLogon, give_up_slice, wait_for_key};
use super::screen::WfcScreen;
use super::services::{CalloutMode, WfcServices};
use super::state::{DispatcherState, IncomingSignal, WfcState};
use crate::config::{LOGON_PROMPT_TIMEOUT, PRIMARY_USER};
use crate::core::{
    AccountError, InstanceLocation, SessionContext, StatusError, fast_logon_eligible,
};
use crate::{log_debug, log_error, log_info, log_notice, log_warn};

/// How long to wait for the second byte of an extended key
const EXTENDED_KEY_TIMEOUT: Duration = Duration::from_secs(1);

/// Default pause when an iteration found nothing to do
pub const DEFAULT_IDLE_SLICE: Duration = Duration::from_millis(100);

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("node status unavailable: {0}")]
    Status(#[from] StatusError),
    #[error("user accounts unavailable: {0}")]
    Account(#[from] AccountError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WfcOutcome {
    /// A remote caller is waiting
    Caller,
    LocalLogon(LocalLogon),
    Quit,
}

impl WfcOutcome {
    pub fn code(self) -> u8 {
        match self {
            WfcOutcome::LocalLogon(logon) => logon.code(),
            WfcOutcome::Caller | WfcOutcome::Quit => 0,
        }
    }
}

pub struct ConnectionDispatcher {
    services: WfcServices,
    state: DispatcherState,
    idle_slice: Duration,
}

impl ConnectionDispatcher {
    pub fn new(services: WfcServices) -> Result<Self, DispatchError> {
        let status = services.status.status()?;
        Ok(Self {
            services,
            state: DispatcherState::new(status.last_date),
            idle_slice: DEFAULT_IDLE_SLICE,
        })
    }

    /// Pause used when idle; zero only yields to the runtime
    pub fn with_idle_slice(mut self, slice: Duration) -> Self {
        self.idle_slice = slice;
        self
    }

    pub fn state(&self) -> &DispatcherState {
        &self.state
    }

    /// Handle for raising the incoming-caller signal from outside the loop
    pub fn incoming(&self) -> IncomingSignal {
        self.state.incoming().clone()
    }

    pub fn services_mut(&mut self) -> &mut WfcServices {
        &mut self.services
    }

    /// Wait for a caller, a local logon or the sysop quitting
    pub async fn run(&mut self, ctx: &mut SessionContext) -> Result<WfcOutcome, DispatchError> {
        self.services.console.cls();
        ctx.user_online = false;
        self.announce(ctx, InstanceLocation::Wfc);
        self.load_primary_user(ctx)?;

        loop {
            if let Some(outcome) = self.run_iteration(ctx).await? {
                log_info!("Leaving WFC: {:?}", outcome);
                self.state.wfc_active = false;
                return Ok(outcome);
            }
        }
    }

    /// One pass of the loop; `Some` ends the loop
    pub async fn run_iteration(
        &mut self,
        ctx: &mut SessionContext,
    ) -> Result<Option<WfcOutcome>, DispatchError> {
        self.state.phase = WfcState::Idle;
        if !self.state.wfc_active {
            self.announce(ctx, InstanceLocation::Wfc);
            self.state.wfc_active = true;
        }

        let today = ctx.today();
        if today != self.state.last_rollover_date {
            if ctx.config.runs_begin_day(ctx.instance) {
                self.roll_over(ctx).await?;
            } else {
                self.state.last_rollover_date = self.services.status.status()?.last_date;
            }
        }

        self.state.phase = WfcState::RunningEvents;
        let mut any = self.run_pending_events(ctx).await;

        let network = &ctx.config.network;
        if !any
            && network.callout
            && network.system_number != 0
            && self.state.callout_due(ctx.now(), network.callout_interval())
        {
            if let Err(e) = self.services.housekeeping.attempt_callout(ctx).await {
                log_warn!("Network callout failed: {:#}", e);
            }
            self.state.last_callout_attempt = Some(ctx.now());
            any = true;
        }

        self.draw_screen(ctx)?;

        if self.state.incoming().take() {
            self.state.phase = WfcState::HandoffToLogon;
            return Ok(Some(WfcOutcome::Caller));
        }

        self.state.phase = WfcState::AwaitingKey;
        if self.services.console.key_pressed() {
            self.load_primary_user(ctx)?;
            if let Some(key) = self.services.console.get_key() {
                any = true;
                if let Some(outcome) = self.dispatch_key(key, ctx).await? {
                    self.state.phase = match outcome {
                        WfcOutcome::Quit => WfcState::Exit,
                        _ => WfcState::HandoffToLogon,
                    };
                    return Ok(Some(outcome));
                }
            }
        }

        if !any {
            self.idle_housekeeping(ctx).await?;
            give_up_slice(self.idle_slice).await;
        }
        Ok(None)
    }

    /// Prompt for a local logon and classify the answer
    pub async fn local_logon(
        &mut self,
        ctx: &mut SessionContext,
    ) -> Result<LocalLogon, DispatchError> {
        self.services
            .console
            .puts("Log on to the BBS? (Y, F or 1-9 for fast logon): ");
        let Some(key) = self.read_key(ctx, LOGON_PROMPT_TIMEOUT).await else {
            log_debug!("Local logon prompt timed out");
            return Ok(LocalLogon::Declined);
        };

        let logon = match key.to_ascii_uppercase() {
            b'Y' => {
                self.load_primary_user(ctx)?;
                LocalLogon::Primary
            }
            b'F' => self.fast_logon(ctx, PRIMARY_USER)?,
            digit @ b'1'..=b'9' => self.fast_logon(ctx, u16::from(digit - b'0'))?,
            prefix if EXTENDED_PREFIXES.contains(&prefix) => {
                let _ = self.read_key(ctx, EXTENDED_KEY_TIMEOUT).await;
                LocalLogon::Declined
            }
            _ => LocalLogon::Declined,
        };

        if logon != LocalLogon::Declined {
            ctx.user_online = true;
            log_info!("Local logon as user #{} ({:?})", ctx.user_number(), logon);
        }
        Ok(logon)
    }

    fn fast_logon(
        &mut self,
        ctx: &mut SessionContext,
        number: u16,
    ) -> Result<LocalLogon, DispatchError> {
        match fast_logon_eligible(self.services.users.as_ref(), number)? {
            Some(user) => {
                ctx.switch_user(user);
                Ok(LocalLogon::Fast(number))
            }
            None => {
                log_notice!("Fast logon refused for user #{}", number);
                Ok(LocalLogon::Declined)
            }
        }
    }

    async fn roll_over(&mut self, ctx: &SessionContext) -> Result<(), DispatchError> {
        let today = ctx.today();
        log_info!("Running day rollover for {}", today);

        if let Err(e) = self.services.housekeeping.cleanup_events(ctx).await {
            log_warn!("Clearing pending events failed: {:#}", e);
        }
        let previous = self.services.status.status()?;
        self.services.status.roll_day(today)?;
        if let Err(e) = self.services.housekeeping.begin_day(ctx).await {
            log_error!("Begin-day event failed: {:#}", e);
        }

        let record = [
            String::new(),
            format!(
                "~ {} day rollover on node {}",
                today.format("%m/%d/%y"),
                ctx.instance
            ),
            format!(
                "  {} calls on {}, {} calls total",
                previous.calls_today,
                previous.last_date.format("%m/%d/%y"),
                previous.total_calls
            ),
        ];
        if let Err(e) = self.services.activity.lines(&record) {
            log_warn!("Cannot write rollover record: {:#}", e);
        }

        self.state.last_rollover_date = today;
        Ok(())
    }

    async fn run_pending_events(&mut self, ctx: &SessionContext) -> bool {
        let mut ran = false;
        loop {
            match self.services.housekeeping.check_event(ctx).await {
                Ok(Some(index)) => {
                    ran = true;
                    if let Err(e) = self.services.housekeeping.run_event(index, ctx).await {
                        log_error!("Event {} failed: {:#}", index, e);
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    log_error!("Cannot check for pending events: {:#}", e);
                    break;
                }
            }
        }
        ran
    }

    fn draw_screen(&mut self, ctx: &SessionContext) -> Result<(), DispatchError> {
        let status = self.services.status.status()?;
        let screen = WfcScreen::new(
            &ctx.config.system_name,
            ctx.instance,
            ctx.now(),
            &status,
            self.state.last_callout_attempt,
        );
        self.services.console.draw_wfc(&screen);
        Ok(())
    }

    async fn dispatch_key(
        &mut self,
        key: u8,
        ctx: &mut SessionContext,
    ) -> Result<Option<WfcOutcome>, DispatchError> {
        if key == 0 {
            if let Some(code) = self.read_key(ctx, EXTENDED_KEY_TIMEOUT).await {
                let hot_key = SysopHotKey::from_scan_code(code);
                let commands = &mut self.services.commands;
                if let Err(e) = commands
                    .hot_key(hot_key, ctx, self.services.console.as_mut())
                    .await
                {
                    log_warn!("Hot key {:?} failed: {:#}", hot_key, e);
                }
                self.finish_command(ctx, &format!("{:?}", hot_key))?;
            }
            return Ok(None);
        }

        let Some(command) = WfcCommand::from_key(key.to_ascii_uppercase()) else {
            return Ok(None);
        };
        self.execute(command, ctx).await
    }

    async fn execute(
        &mut self,
        command: WfcCommand,
        ctx: &mut SessionContext,
    ) -> Result<Option<WfcOutcome>, DispatchError> {
        self.state.phase = WfcState::ExecutingCommand;
        if command.requires_network() && ctx.config.network.system_number == 0 {
            log_debug!("{} needs a network system number", command.describe());
            return Ok(None);
        }
        log_debug!("WFC command: {}", command.describe());

        match command {
            WfcCommand::Quit => return Ok(Some(WfcOutcome::Quit)),
            WfcCommand::Exit => {
                self.services.console.puts("Exit the BBS? ");
                let answer = self.read_key(ctx, LOGON_PROMPT_TIMEOUT).await;
                if answer.is_some_and(|key| key.eq_ignore_ascii_case(&b'Y')) {
                    return Ok(Some(WfcOutcome::Quit));
                }
            }
            WfcCommand::LocalLogon => {
                let logon = self.local_logon(ctx).await?;
                if logon != LocalLogon::Declined {
                    return Ok(Some(WfcOutcome::LocalLogon(logon)));
                }
            }
            _ => {
                if let Some(location) = command.location() {
                    self.announce(ctx, location);
                }
                let result = match CalloutMode::for_command(command) {
                    Some(mode) => {
                        self.state.last_callout_attempt = Some(ctx.now());
                        self.services.housekeeping.force_callout(mode, ctx).await
                    }
                    None => {
                        self.services
                            .commands
                            .execute(command, ctx, self.services.console.as_mut())
                            .await
                    }
                };
                if let Err(e) = result {
                    log_warn!("{} failed: {:#}", command.describe(), e);
                }
                if command.needs_net_cleanup() {
                    self.cleanup_net(ctx).await;
                }
            }
        }

        self.finish_command(ctx, command.describe())?;
        Ok(None)
    }

    fn finish_command(&mut self, ctx: &mut SessionContext, what: &str) -> Result<(), DispatchError> {
        self.services.console.cls();
        if !self.state.incoming().is_raised() && !ctx.user_online {
            self.load_primary_user(ctx)?;
        }

        let activity = &mut self.services.activity;
        if let Err(e) = activity.line(&format!("@ {} at WFC", what)) {
            log_warn!("Cannot write activity log: {:#}", e);
        }
        if let Err(e) = activity.consolidate(ctx.today()) {
            log_warn!("Cannot consolidate activity log: {:#}", e);
        }

        self.announce(ctx, InstanceLocation::Wfc);
        Ok(())
    }

    async fn idle_housekeeping(&mut self, ctx: &SessionContext) -> Result<(), DispatchError> {
        let now = ctx.now();
        let needed = self.services.status.status()?.net_clean_needed;
        if needed
            || self
                .state
                .net_clean_due(now, ctx.config.network.cleanup_interval())
        {
            self.cleanup_net(ctx).await;
            self.state.last_net_clean = Some(now);
        }
        Ok(())
    }

    async fn cleanup_net(&mut self, ctx: &SessionContext) {
        if let Err(e) = self.services.housekeeping.cleanup_net(ctx).await {
            log_warn!("Network cleanup failed: {:#}", e);
        }
    }

    async fn read_key(&mut self, ctx: &SessionContext, timeout: Duration) -> Option<u8> {
        wait_for_key(
            self.services.console.as_mut(),
            ctx.clock.as_ref(),
            timeout,
            self.idle_slice,
        )
        .await
    }

    fn load_primary_user(&mut self, ctx: &mut SessionContext) -> Result<(), DispatchError> {
        let user = self.services.users.read_user(PRIMARY_USER)?;
        ctx.switch_user(user);
        Ok(())
    }

    fn announce(&self, ctx: &SessionContext, location: InstanceLocation) {
        if let Err(e) = self.services.instances.announce(ctx.instance, location) {
            log_warn!("Cannot record node location: {:#}", e);
        }
    }
}
