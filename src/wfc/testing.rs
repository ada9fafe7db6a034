// BBS Node - WFC Test Fakes
// Copyright (C) 2025 Akaere Networks
// SPDX-License-Identifier: AGPL-3.0-or-later

//! In-memory collaborators that record what the dispatcher asked for

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate, TimeZone};

use super::command::{SysopHotKey, WfcCommand};
use super::dispatcher::ConnectionDispatcher;
use super::screen::WfcScreen;
use super::services::{CalloutMode, Console, Housekeeping, SysopCommands, WfcServices};
use crate::config::NodeConfig;
use crate::core::{
    AccountError, ActivityLog, Clock, InstanceLocation, InstanceRegistry, NodeStatus,
    SessionContext, StatusError, StatusStore, UserRecord, UserStore,
};

/// Ordered record of collaborator calls
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn record(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|e| *e == entry).count()
    }
}

/// Clock that moves only when told to, or by `step` on every read
pub struct FakeClock {
    now: Mutex<DateTime<Local>>,
    step: Mutex<chrono::Duration>,
    reads: AtomicUsize,
}

impl FakeClock {
    pub fn new(start: DateTime<Local>) -> Self {
        Self {
            now: Mutex::new(start),
            step: Mutex::new(chrono::Duration::zero()),
            reads: AtomicUsize::new(0),
        }
    }

    pub fn stepping(step: chrono::Duration) -> Self {
        let clock = Self::default();
        clock.set_step(step);
        clock
    }

    pub fn set_step(&self, step: chrono::Duration) {
        *self.step.lock().unwrap() = step;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn today_date(&self) -> NaiveDate {
        self.now.lock().unwrap().date_naive()
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new(Local.with_ymd_and_hms(2025, 6, 10, 12, 0, 0).unwrap())
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Local> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let step = *self.step.lock().unwrap();
        let mut now = self.now.lock().unwrap();
        let current = *now;
        *now = current + step;
        current
    }
}

#[derive(Default)]
struct ConsoleState {
    keys: VecDeque<u8>,
    output: Vec<String>,
    draws: usize,
}

#[derive(Clone, Default)]
pub struct ScriptedConsole(Arc<Mutex<ConsoleState>>);

impl ScriptedConsole {
    pub fn with_keys(keys: &[u8]) -> Self {
        let console = Self::default();
        console.push_keys(keys);
        console
    }

    pub fn push_keys(&self, keys: &[u8]) {
        self.0.lock().unwrap().keys.extend(keys.iter().copied());
    }

    pub fn remaining(&self) -> usize {
        self.0.lock().unwrap().keys.len()
    }

    pub fn output(&self) -> String {
        self.0.lock().unwrap().output.concat()
    }

    pub fn draws(&self) -> usize {
        self.0.lock().unwrap().draws
    }
}

impl Console for ScriptedConsole {
    fn key_pressed(&mut self) -> bool {
        !self.0.lock().unwrap().keys.is_empty()
    }

    fn get_key(&mut self) -> Option<u8> {
        self.0.lock().unwrap().keys.pop_front()
    }

    fn cls(&mut self) {}

    fn puts(&mut self, text: &str) {
        self.0.lock().unwrap().output.push(text.to_string());
    }

    fn draw_wfc(&mut self, _screen: &WfcScreen) {
        self.0.lock().unwrap().draws += 1;
    }
}

#[derive(Clone)]
pub struct MemoryStatus(Arc<Mutex<NodeStatus>>);

impl MemoryStatus {
    pub fn new(date: NaiveDate) -> Self {
        Self(Arc::new(Mutex::new(NodeStatus::new(date))))
    }

    pub fn set_date(&self, date: NaiveDate) {
        self.0.lock().unwrap().last_date = date;
    }

    pub fn date(&self) -> NaiveDate {
        self.0.lock().unwrap().last_date
    }

    pub fn set_calls(&self, today: u32, total: u32) {
        let mut status = self.0.lock().unwrap();
        status.calls_today = today;
        status.total_calls = total;
    }

    pub fn set_net_clean_needed_flag(&self, needed: bool) {
        self.0.lock().unwrap().net_clean_needed = needed;
    }
}

impl StatusStore for MemoryStatus {
    fn status(&self) -> Result<NodeStatus, StatusError> {
        Ok(self.0.lock().unwrap().clone())
    }

    fn roll_day(&self, today: NaiveDate) -> Result<NodeStatus, StatusError> {
        let mut status = self.0.lock().unwrap();
        if status.last_date != today {
            status.last_date = today;
            status.calls_today = 0;
        }
        Ok(status.clone())
    }

    fn set_net_clean_needed(&self, needed: bool) -> Result<(), StatusError> {
        self.set_net_clean_needed_flag(needed);
        Ok(())
    }

    fn record_call(&self) -> Result<NodeStatus, StatusError> {
        let mut status = self.0.lock().unwrap();
        status.calls_today += 1;
        status.total_calls += 1;
        Ok(status.clone())
    }
}

#[derive(Clone, Default)]
pub struct MemoryUsers(Arc<Mutex<BTreeMap<u16, UserRecord>>>);

impl MemoryUsers {
    pub fn add(&self, user: UserRecord) {
        self.0.lock().unwrap().insert(user.number, user);
    }
}

impl UserStore for MemoryUsers {
    fn read_user(&self, number: u16) -> Result<UserRecord, AccountError> {
        self.0
            .lock()
            .unwrap()
            .get(&number)
            .cloned()
            .ok_or(AccountError::Missing(number))
    }

    fn user_count(&self) -> Result<u16, AccountError> {
        Ok(self.0.lock().unwrap().keys().next_back().copied().unwrap_or(0))
    }
}

pub struct RecordingRegistry(Journal);

impl InstanceRegistry for RecordingRegistry {
    fn announce(&self, _instance: u16, location: InstanceLocation) -> Result<()> {
        self.0.record(format!("announce {:?}", location));
        Ok(())
    }
}

#[derive(Default)]
struct ActivityState {
    lines: Vec<String>,
    consolidations: usize,
}

#[derive(Clone, Default)]
pub struct MemoryActivity(Arc<Mutex<ActivityState>>);

impl MemoryActivity {
    pub fn lines(&self) -> Vec<String> {
        self.0.lock().unwrap().lines.clone()
    }

    pub fn consolidations(&self) -> usize {
        self.0.lock().unwrap().consolidations
    }
}

impl ActivityLog for MemoryActivity {
    fn line(&mut self, text: &str) -> Result<()> {
        self.0.lock().unwrap().lines.push(text.to_string());
        Ok(())
    }

    fn word(&mut self, text: &str) -> Result<()> {
        self.line(text)
    }

    fn consolidate(&mut self, _date: NaiveDate) -> Result<()> {
        self.0.lock().unwrap().consolidations += 1;
        Ok(())
    }
}

#[derive(Clone)]
pub struct RecordingHousekeeping {
    journal: Journal,
    pending_events: Arc<AtomicUsize>,
}

impl RecordingHousekeeping {
    pub fn queue_events(&self, count: usize) {
        self.pending_events.fetch_add(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl Housekeeping for RecordingHousekeeping {
    async fn cleanup_events(&mut self, _ctx: &SessionContext) -> Result<()> {
        self.journal.record("cleanup_events");
        Ok(())
    }

    async fn begin_day(&mut self, _ctx: &SessionContext) -> Result<()> {
        self.journal.record("begin_day");
        Ok(())
    }

    async fn check_event(&mut self, _ctx: &SessionContext) -> Result<Option<usize>> {
        match self.pending_events.load(Ordering::SeqCst) {
            0 => Ok(None),
            _ => Ok(Some(0)),
        }
    }

    async fn run_event(&mut self, _index: usize, _ctx: &SessionContext) -> Result<()> {
        self.journal.record("run_event");
        self.pending_events.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    async fn attempt_callout(&mut self, _ctx: &SessionContext) -> Result<()> {
        self.journal.record("attempt_callout");
        Ok(())
    }

    async fn force_callout(&mut self, mode: CalloutMode, _ctx: &SessionContext) -> Result<()> {
        self.journal.record(format!("force_callout {}", mode.as_str()));
        Ok(())
    }

    async fn cleanup_net(&mut self, _ctx: &SessionContext) -> Result<()> {
        self.journal.record("cleanup_net");
        Ok(())
    }
}

#[derive(Clone)]
pub struct RecordingCommands {
    journal: Journal,
    fail: Arc<AtomicBool>,
}

impl RecordingCommands {
    pub fn fail_next(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl SysopCommands for RecordingCommands {
    async fn execute(
        &mut self,
        command: WfcCommand,
        _ctx: &mut SessionContext,
        _console: &mut dyn Console,
    ) -> Result<()> {
        self.journal.record(format!("execute {:?}", command));
        if self.fail.swap(false, Ordering::SeqCst) {
            return Err(anyhow!("{} crashed", command.describe()));
        }
        Ok(())
    }

    async fn hot_key(
        &mut self,
        key: SysopHotKey,
        _ctx: &mut SessionContext,
        _console: &mut dyn Console,
    ) -> Result<()> {
        self.journal.record(format!("hot_key {:?}", key));
        Ok(())
    }
}

/// A dispatcher wired to fakes, with handles to inspect them
pub struct Harness {
    pub instance: u16,
    pub config: Arc<NodeConfig>,
    pub clock: Arc<FakeClock>,
    pub journal: Journal,
    pub console: ScriptedConsole,
    pub status: MemoryStatus,
    pub users: MemoryUsers,
    pub activity: MemoryActivity,
    pub housekeeping: RecordingHousekeeping,
    pub commands: RecordingCommands,
}

impl Harness {
    pub fn new(instance: u16) -> Self {
        Self::with_config(instance, |_| {})
    }

    pub fn with_config(instance: u16, configure: impl FnOnce(&mut NodeConfig)) -> Self {
        let mut config = NodeConfig::default();
        config.system_name = "Test BBS".to_string();
        configure(&mut config);

        let clock = Arc::new(FakeClock::default());
        let journal = Journal::default();
        let users = MemoryUsers::default();
        users.add(UserRecord::new(1, "SYSOP", 255));

        Self {
            instance,
            config: Arc::new(config),
            status: MemoryStatus::new(clock.today_date()),
            clock,
            console: ScriptedConsole::default(),
            users,
            activity: MemoryActivity::default(),
            housekeeping: RecordingHousekeeping {
                journal: journal.clone(),
                pending_events: Arc::new(AtomicUsize::new(0)),
            },
            commands: RecordingCommands {
                journal: journal.clone(),
                fail: Arc::new(AtomicBool::new(false)),
            },
            journal,
        }
    }

    pub fn context(&self) -> SessionContext {
        SessionContext::new(self.instance, self.config.clone(), self.clock.clone())
    }

    pub fn services(&self) -> WfcServices {
        WfcServices {
            console: Box::new(self.console.clone()),
            housekeeping: Box::new(self.housekeeping.clone()),
            commands: Box::new(self.commands.clone()),
            status: Arc::new(self.status.clone()),
            users: Arc::new(self.users.clone()),
            instances: Arc::new(RecordingRegistry(self.journal.clone())),
            activity: Box::new(self.activity.clone()),
        }
    }

    pub fn dispatcher(&self) -> (ConnectionDispatcher, SessionContext) {
        let dispatcher = ConnectionDispatcher::new(self.services())
            .unwrap()
            .with_idle_slice(Duration::ZERO);
        (dispatcher, self.context())
    }
}
