// BBS Node - External Programs
// Copyright (C) 2025 Akaere Networks
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Running configured sysop and maintenance programs

use std::process::Stdio;

use anyhow::{Context, Result, anyhow, bail};
use tokio::process::Command;

use crate::config::INSTANCE_ENV;
use crate::core::SessionContext;
use crate::log_debug;

/// Environment every child of the node sees
pub fn node_env(ctx: &SessionContext) -> Vec<(&'static str, String)> {
    let mut env = vec![
        (INSTANCE_ENV, ctx.instance.to_string()),
        ("BBS_NODE_USER", ctx.user_number().to_string()),
        ("BBS_NODE_SPEED", ctx.current_speed.clone()),
    ];
    if let Some(minutes) = ctx.event_minutes {
        env.push(("BBS_NODE_EVENT_MINUTES", minutes.to_string()));
    }
    env
}

/// Build a command from a whitespace separated command line
pub fn command_from_line(line: &str) -> Result<Command> {
    let mut words = line.split_whitespace();
    let program = words
        .next()
        .ok_or_else(|| anyhow!("empty command line"))?;
    let mut command = Command::new(program);
    command.args(words);
    Ok(command)
}

/// Run a maintenance program to completion with captured output
pub async fn run_captured(label: &str, line: &str, env: &[(&str, String)]) -> Result<()> {
    let output = command_from_line(line)?
        .envs(env.iter().map(|(key, value)| (*key, value.as_str())))
        .stdin(Stdio::null())
        .output()
        .await
        .with_context(|| format!("cannot start {} program '{}'", label, line))?;

    if !output.stdout.is_empty() {
        log_debug!("{} stdout: {}", label, String::from_utf8_lossy(&output.stdout).trim_end());
    }
    if !output.status.success() {
        bail!(
            "{} program '{}' exited with {}: {}",
            label,
            line,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim_end()
        );
    }
    Ok(())
}

/// Run a program on the local console's terminal
pub async fn run_on_console(label: &str, line: &str, env: &[(&str, String)]) -> Result<()> {
    let status = command_from_line(line)?
        .envs(env.iter().map(|(key, value)| (*key, value.as_str())))
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await
        .with_context(|| format!("cannot start {} program '{}'", label, line))?;
    if !status.success() {
        bail!("{} program '{}' exited with {}", label, line, status);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConfig;
    use crate::core::SystemClock;
    use std::sync::Arc;

    #[test]
    fn test_node_env() {
        let mut ctx = SessionContext::new(4, Arc::new(NodeConfig::default()), Arc::new(SystemClock));
        ctx.event_minutes = Some(30);
        let env = node_env(&ctx);
        assert!(env.contains(&(INSTANCE_ENV, "4".to_string())));
        assert!(env.contains(&("BBS_NODE_SPEED", "KB".to_string())));
        assert!(env.contains(&("BBS_NODE_EVENT_MINUTES", "30".to_string())));
    }

    #[test]
    fn test_empty_command_line() {
        assert!(command_from_line("   ").is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_captured_reports_exit_status() {
        run_captured("test", "true", &[]).await.unwrap();
        let err = run_captured("test", "false", &[]).await.unwrap_err();
        assert!(err.to_string().contains("exited with"));
        assert!(run_captured("test", "/nonexistent/program", &[]).await.is_err());
    }
}
