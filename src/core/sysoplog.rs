// BBS Node - Sysop Log
// Copyright (C) 2025 Akaere Networks
// SPDX-License-Identifier: AGPL-3.0-or-later

//! File-backed sysop activity log
//!
//! Each node appends to its own instance log (`inst-NNN.log`) so that nodes
//! never interleave partial records. Consolidation moves the instance log to
//! the end of the daily log (`YYMMDD.log`) in one append.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::NaiveDate;

use super::activity::ActivityLog;

/// Words wrap before this column
const WRAP_COLUMN: usize = 78;

pub fn daily_log_name(date: NaiveDate) -> String {
    date.format("%y%m%d.log").to_string()
}

pub fn instance_log_name(instance: u16) -> String {
    format!("inst-{:03}.log", instance)
}

#[derive(Debug)]
pub struct SysopLog {
    dir: PathBuf,
    instance: u16,
    /// Column of the open word line, 0 when no line is open
    midline: usize,
}

impl SysopLog {
    pub fn new(dir: impl Into<PathBuf>, instance: u16) -> Self {
        Self {
            dir: dir.into(),
            instance,
            midline: 0,
        }
    }

    pub fn instance_path(&self) -> PathBuf {
        self.dir.join(instance_log_name(self.instance))
    }

    pub fn daily_path(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(daily_log_name(date))
    }

    fn append(&self, text: &str) -> anyhow::Result<()> {
        let path = self.instance_path();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("cannot open sysop log {}", path.display()))?;
        file.write_all(text.as_bytes())
            .with_context(|| format!("cannot write sysop log {}", path.display()))?;
        Ok(())
    }
}

impl ActivityLog for SysopLog {
    fn line(&mut self, text: &str) -> anyhow::Result<()> {
        let mut record = String::with_capacity(text.len() + 4);
        if self.midline > 0 {
            record.push_str("\r\n");
            self.midline = 0;
        }
        record.push_str(text);
        record.push_str("\r\n");
        self.append(&record)
    }

    fn word(&mut self, text: &str) -> anyhow::Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        let mut record = String::new();
        if self.midline == 0 || self.midline + 2 + text.len() > WRAP_COLUMN {
            record.push_str(if self.midline > 0 { "\r\n   " } else { "  " });
            self.midline = 3 + text.len();
        } else {
            record.push_str(", ");
            self.midline += 2 + text.len();
        }
        record.push_str(text);
        self.append(&record)
    }

    fn consolidate(&mut self, date: NaiveDate) -> anyhow::Result<()> {
        let instance_path = self.instance_path();
        let content = match fs::read(&instance_path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("cannot read {}", instance_path.display()));
            }
        };

        let daily_path = self.daily_path(date);
        append_file(&daily_path, &content)?;
        fs::remove_file(&instance_path)
            .with_context(|| format!("cannot remove {}", instance_path.display()))?;
        Ok(())
    }
}

fn append_file(path: &Path, content: &[u8]) -> anyhow::Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("cannot open {}", path.display()))?;
    file.write_all(content)
        .with_context(|| format!("cannot append to {}", path.display()))
}
