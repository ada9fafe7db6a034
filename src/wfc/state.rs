// BBS Node - Dispatcher State
// Copyright (C) 2025 Akaere Networks
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Duration, Local, NaiveDate};

/// Phase of the idle loop, as last entered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WfcState {
    Idle,
    RunningEvents,
    AwaitingKey,
    ExecutingCommand,
    HandoffToLogon,
    Exit,
}

/// Raised from outside the loop when a caller is waiting
#[derive(Debug, Clone, Default)]
pub struct IncomingSignal(Arc<AtomicBool>);

impl IncomingSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Consume the signal
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct DispatcherState {
    pub last_rollover_date: NaiveDate,
    pub last_callout_attempt: Option<DateTime<Local>>,
    pub last_net_clean: Option<DateTime<Local>>,
    pub wfc_active: bool,
    pub phase: WfcState,
    incoming: IncomingSignal,
}

impl DispatcherState {
    pub fn new(last_rollover_date: NaiveDate) -> Self {
        Self {
            last_rollover_date,
            last_callout_attempt: None,
            last_net_clean: None,
            wfc_active: false,
            phase: WfcState::Idle,
            incoming: IncomingSignal::new(),
        }
    }

    pub fn incoming(&self) -> &IncomingSignal {
        &self.incoming
    }

    pub fn callout_due(&self, now: DateTime<Local>, interval: Duration) -> bool {
        self.last_callout_attempt
            .is_none_or(|last| now.signed_duration_since(last) > interval)
    }

    pub fn net_clean_due(&self, now: DateTime<Local>, interval: Duration) -> bool {
        self.last_net_clean
            .is_none_or(|last| now.signed_duration_since(last) > interval)
    }
}
