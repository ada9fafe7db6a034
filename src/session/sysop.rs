// BBS Node - Sysop Menu
// Copyright (C) 2025 Akaere Networks
// SPDX-License-Identifier: AGPL-3.0-or-later

//! WFC commands that run on the local console
//!
//! Log viewers, the help list and the status display are built in. Editors
//! and mail programs are external programs bound to their command letter in
//! the `[sysop.commands]` table.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Duration;

use super::process::{node_env, run_on_console};
use crate::config::NodeConfig;
use crate::core::sysoplog::daily_log_name;
use crate::core::{SessionContext, StatusStore};
use crate::storage::LmdbInstanceRegistry;
use crate::wfc::{Console, SysopCommands, SysopHotKey, WfcCommand};
use crate::{log_debug, log_info};

const NET_LOG: &str = "net.log";
const NET_DATA_LOGS: [&str; 3] = ["netdat0.log", "netdat1.log", "netdat2.log"];

pub struct SysopMenu {
    config: Arc<NodeConfig>,
    status: Arc<dyn StatusStore>,
    instances: Arc<LmdbInstanceRegistry>,
}

impl SysopMenu {
    pub fn new(
        config: Arc<NodeConfig>,
        status: Arc<dyn StatusStore>,
        instances: Arc<LmdbInstanceRegistry>,
    ) -> Self {
        Self {
            config,
            status,
            instances,
        }
    }

    fn show_help(&self, console: &mut dyn Console) {
        console.puts("WFC commands\r\n\r\n");
        for command in WfcCommand::ALL {
            let key = match command.key() {
                b' ' => "SPACE".to_string(),
                0x1b => "ESC".to_string(),
                other => (other as char).to_string(),
            };
            console.puts(&format!("  {:<6} {}\r\n", key, command.describe()));
        }
    }

    fn show_status(&self, ctx: &SessionContext, console: &mut dyn Console) -> Result<()> {
        let status = self.status.status()?;
        console.puts(&format!("{} status\r\n\r\n", self.config.system_name));
        console.puts(&format!("  Date        : {}\r\n", status.last_date));
        console.puts(&format!("  Calls today : {}\r\n", status.calls_today));
        console.puts(&format!("  Total calls : {}\r\n", status.total_calls));
        console.puts(&format!(
            "  Net cleanup : {}\r\n",
            if status.net_clean_needed { "pending" } else { "done" }
        ));
        console.puts("\r\nNodes\r\n");
        for record in self.instances.list()? {
            let marker = if record.instance == ctx.instance { '*' } else { ' ' };
            console.puts(&format!(
                " {}{:>3}  {:<24} since {}\r\n",
                marker,
                record.instance,
                record.location.describe(),
                record.since.format("%Y-%m-%d %H:%M")
            ));
        }
        Ok(())
    }

    fn show_file(&self, name: &str, console: &mut dyn Console) {
        let path = self.config.gfiles_dir.join(name);
        show_text(&path, console);
    }

    async fn run_bound(
        &self,
        key: u8,
        what: &str,
        ctx: &SessionContext,
        console: &mut dyn Console,
    ) -> Result<()> {
        match self.config.sysop.command_for(key as char) {
            Some(line) => {
                log_info!("Starting {} program", what);
                run_on_console(what, line, &node_env(ctx)).await
            }
            None => {
                console.puts(&format!("{} is not available on this node.\r\n", what));
                Ok(())
            }
        }
    }
}

fn show_text(path: &Path, console: &mut dyn Console) {
    match std::fs::read(path) {
        Ok(bytes) => console.puts(&String::from_utf8_lossy(&bytes)),
        Err(e) => {
            log_debug!("Cannot show {}: {}", path.display(), e);
            console.puts(&format!("{} does not exist.\r\n", path.display()));
        }
    }
}

#[async_trait]
impl SysopCommands for SysopMenu {
    async fn execute(
        &mut self,
        command: WfcCommand,
        ctx: &mut SessionContext,
        console: &mut dyn Console,
    ) -> Result<()> {
        match command {
            WfcCommand::Help => self.show_help(console),
            WfcCommand::Status => self.show_status(ctx, console)?,
            WfcCommand::TodaysLog => self.show_file(&daily_log_name(ctx.today()), console),
            WfcCommand::YesterdaysLog => {
                let yesterday = ctx.today() - Duration::days(1);
                self.show_file(&daily_log_name(yesterday), console);
            }
            WfcCommand::NetLog => self.show_file(NET_LOG, console),
            WfcCommand::NetDataLogs => {
                for name in NET_DATA_LOGS {
                    console.puts(&format!("--- {} ---\r\n", name));
                    self.show_file(name, console);
                }
            }
            WfcCommand::Environment => {}
            WfcCommand::Terminal => match self.config.sysop.terminal_command.as_deref() {
                Some(line) => run_on_console("terminal", line, &node_env(ctx)).await?,
                None => console.puts("Terminal command not specified.\r\n"),
            },
            other => self.run_bound(other.key(), other.describe(), ctx, console).await?,
        }
        Ok(())
    }

    async fn hot_key(
        &mut self,
        key: SysopHotKey,
        ctx: &mut SessionContext,
        console: &mut dyn Console,
    ) -> Result<()> {
        match key {
            SysopHotKey::Function(1) => self.show_help(console),
            SysopHotKey::Function(10) => self.show_status(ctx, console)?,
            other => log_debug!("No action bound to {:?}", other),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{InstanceLocation, InstanceRegistry};
    use crate::storage::{LmdbStatusStore, NodeDatabase};
    use crate::wfc::testing::{FakeClock, ScriptedConsole};
    use tempfile::TempDir;

    fn menu(dir: &TempDir, configure: impl FnOnce(&mut NodeConfig)) -> (SysopMenu, SessionContext) {
        let mut config = NodeConfig::default();
        config.system_name = "Test BBS".to_string();
        config.gfiles_dir = dir.path().join("gfiles");
        configure(&mut config);
        std::fs::create_dir_all(&config.gfiles_dir).unwrap();
        let config = Arc::new(config);

        let clock = Arc::new(FakeClock::default());
        let db = NodeDatabase::shared(&dir.path().join("db")).unwrap();
        let status = Arc::new(LmdbStatusStore::new(db.clone(), clock.as_ref()));
        let instances = Arc::new(LmdbInstanceRegistry::new(db));
        instances.announce(1, InstanceLocation::Wfc).unwrap();
        let ctx = SessionContext::new(1, config.clone(), clock);
        (SysopMenu::new(config, status, instances), ctx)
    }

    #[tokio::test]
    async fn test_todays_log_is_shown() {
        let dir = TempDir::new().unwrap();
        let (mut menu, mut ctx) = menu(&dir, |_| {});
        let name = daily_log_name(ctx.today());
        std::fs::write(dir.path().join("gfiles").join(name), "~ something happened\r\n").unwrap();
        let mut console = ScriptedConsole::default();

        menu.execute(WfcCommand::TodaysLog, &mut ctx, &mut console).await.unwrap();
        menu.execute(WfcCommand::YesterdaysLog, &mut ctx, &mut console).await.unwrap();

        let output = console.output();
        assert!(output.contains("~ something happened"));
        assert!(output.contains("does not exist"));
    }

    #[tokio::test]
    async fn test_status_lists_nodes() {
        let dir = TempDir::new().unwrap();
        let (mut menu, mut ctx) = menu(&dir, |_| {});
        let mut console = ScriptedConsole::default();

        menu.execute(WfcCommand::Status, &mut ctx, &mut console).await.unwrap();

        let output = console.output();
        assert!(output.contains("Test BBS status"));
        assert!(output.contains("Calls today : 0"));
        assert!(output.contains("*  1"));
    }

    #[tokio::test]
    async fn test_unbound_commands_report_unavailable() {
        let dir = TempDir::new().unwrap();
        let (mut menu, mut ctx) = menu(&dir, |_| {});
        let mut console = ScriptedConsole::default();

        menu.execute(WfcCommand::UserEdit, &mut ctx, &mut console).await.unwrap();
        menu.execute(WfcCommand::Terminal, &mut ctx, &mut console).await.unwrap();

        let output = console.output();
        assert!(output.contains("User editor is not available on this node."));
        assert!(output.contains("Terminal command not specified."));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_bound_command_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        let (mut menu, mut ctx) = menu(&dir, |config| {
            config.sysop.commands.insert("U".to_string(), "false".to_string());
        });
        let mut console = ScriptedConsole::default();

        let result = menu.execute(WfcCommand::UserEdit, &mut ctx, &mut console).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_help_lists_every_command() {
        let dir = TempDir::new().unwrap();
        let (mut menu, mut ctx) = menu(&dir, |_| {});
        let mut console = ScriptedConsole::default();

        menu.hot_key(SysopHotKey::Function(1), &mut ctx, &mut console).await.unwrap();

        let output = console.output();
        assert!(output.contains("SPACE  Local logon"));
        assert!(output.contains("ESC    Exit the BBS"));
        assert!(output.contains("Q      Quit"));
    }
}
