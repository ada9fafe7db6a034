// BBS Node - Activity Log Contract
// Copyright (C) 2025 Akaere Networks
// SPDX-License-Identifier: AGPL-3.0-or-later

use chrono::NaiveDate;

/// Sysop activity log
pub trait ActivityLog: Send {
    /// Append one complete line
    fn line(&mut self, text: &str) -> anyhow::Result<()>;

    /// Append a multi-line record
    fn lines(&mut self, lines: &[String]) -> anyhow::Result<()> {
        for line in lines {
            self.line(line)?;
        }
        Ok(())
    }

    /// Append a word to the current line, wrapping as needed
    fn word(&mut self, text: &str) -> anyhow::Result<()>;

    /// Fold this instance's log into the daily log for `date`
    fn consolidate(&mut self, date: NaiveDate) -> anyhow::Result<()>;
}
