// BBS Node - Interactive Handoff
// Copyright (C) 2025 Akaere Networks
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Passing a logged-on caller to the interactive subsystem
//!
//! The interactive BBS itself is an external program. Remote callers are
//! relayed between the node's [`RemoteIo`] and the program's piped stdio;
//! local logons give the program the console terminal.

use std::process::Stdio;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::process::{command_from_line, node_env};
use crate::config::NodeConfig;
use crate::core::SessionContext;
use crate::io::{RemoteIo, TransportKind};
use crate::{log_debug, log_info, log_warn};

const RELAY_BUFFER: usize = 4096;

/// How the caller reached the interactive subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handoff {
    /// A remote caller that still has to log on
    Remote,
    /// The sysop chose a normal local logon
    LocalPrimary,
    /// The sysop skipped the logon as this account
    LocalFast(u16),
    /// The caller was logged on as this account from the command line
    Preselected(u16),
}

impl Handoff {
    pub fn as_str(self) -> &'static str {
        match self {
            Handoff::Remote => "remote",
            Handoff::LocalPrimary => "local",
            Handoff::LocalFast(_) => "fast",
            Handoff::Preselected(_) => "preselected",
        }
    }

    pub fn is_local(self) -> bool {
        matches!(self, Handoff::LocalPrimary | Handoff::LocalFast(_))
    }
}

#[async_trait]
pub trait InteractiveSubsystem: Send {
    /// Run the caller's session until it ends
    async fn run(
        &mut self,
        handoff: Handoff,
        io: &mut dyn RemoteIo,
        ctx: &mut SessionContext,
    ) -> Result<()>;
}

/// Environment describing the handoff to the interactive program
pub fn handoff_env(
    handoff: Handoff,
    transport: TransportKind,
    ctx: &SessionContext,
) -> Vec<(&'static str, String)> {
    let mut env = node_env(ctx);
    env.push(("BBS_NODE_TRANSPORT", transport.as_str().to_string()));
    env.push(("BBS_NODE_LOGON", handoff.as_str().to_string()));
    env
}

/// Interactive subsystem run as the configured program
pub struct CommandHandoff {
    config: Arc<NodeConfig>,
}

impl CommandHandoff {
    pub fn new(config: Arc<NodeConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl InteractiveSubsystem for CommandHandoff {
    async fn run(
        &mut self,
        handoff: Handoff,
        io: &mut dyn RemoteIo,
        ctx: &mut SessionContext,
    ) -> Result<()> {
        let Some(line) = self.config.interactive.command.as_deref() else {
            log_warn!("No interactive command configured, ending session");
            let _ = io
                .write(b"\r\nThis node has no interactive session configured.\r\n")
                .await;
            return Ok(());
        };

        let mut command = command_from_line(line)?;
        command
            .args(&self.config.interactive.args)
            .envs(handoff_env(handoff, io.transport(), ctx))
            .kill_on_drop(true);

        log_info!(
            "Handing user #{} to the interactive session ({})",
            ctx.user_number(),
            handoff.as_str()
        );

        if handoff.is_local() || io.transport() == TransportKind::None {
            let status = command
                .stdin(Stdio::inherit())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit())
                .status()
                .await
                .with_context(|| format!("cannot start interactive program '{}'", line))?;
            log_debug!("Interactive session ended with {}", status);
            return Ok(());
        }

        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("cannot start interactive program '{}'", line))?;
        let mut child_in = child.stdin.take().context("interactive stdin not piped")?;
        let mut child_out = child.stdout.take().context("interactive stdout not piped")?;

        let mut from_caller = [0u8; RELAY_BUFFER];
        let mut from_child = [0u8; RELAY_BUFFER];
        loop {
            tokio::select! {
                read = io.read(&mut from_caller) => match read {
                    Ok(0) | Err(_) => {
                        log_info!("Caller disconnected, stopping interactive session");
                        break;
                    }
                    Ok(n) => {
                        if child_in.write_all(&from_caller[..n]).await.is_err() {
                            break;
                        }
                    }
                },
                read = child_out.read(&mut from_child) => match read {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if io.write(&from_child[..n]).await.is_err() {
                            break;
                        }
                    }
                },
            }
        }

        drop(child_in);
        // Already gone when the program ended the session itself
        let _ = child.start_kill();
        let status = child.wait().await.context("interactive program lost")?;
        log_debug!("Interactive session ended with {}", status);
        Ok(())
    }
}
