// BBS Node - Entry Point
// Copyright (C) 2025 Akaere Networks
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::env;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;

use bbs_node::config::{Cli, HOME_DIR_ENV, INSTANCE_ENV, NodeConfig};
use bbs_node::core::SystemClock;
use bbs_node::core::logger::{
    init_from_args, log_init_failed, log_init_ok, log_init_ok_with_details, log_init_start,
    log_init_warn,
};
use bbs_node::session::{CommandHandoff, SessionLauncher};
use bbs_node::{log_error, log_info};

async fn run(cli: Cli) -> Result<i32> {
    log_init_start("node configuration");
    let config = match NodeConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            log_init_failed("node configuration", &e.to_string());
            return Err(e.into());
        }
    };
    log_init_ok_with_details("node configuration", &cli.config.display().to_string());
    if config.interactive.command.is_none() {
        log_init_warn("interactive session", "no command configured, callers will be turned away");
    }

    log_init_start("node database");
    let mut interactive = CommandHandoff::new(Arc::new(config.clone()));
    let launcher = match SessionLauncher::new(cli, config, Arc::new(SystemClock)) {
        Ok(launcher) => launcher,
        Err(e) => {
            log_init_failed("node database", &e.to_string());
            return Err(e.into());
        }
    };
    log_init_ok("node database");

    Ok(launcher.run(&mut interactive).await?)
}

fn prepare_environment() -> Result<()> {
    if let Ok(instance) = env::var(INSTANCE_ENV) {
        bail!(
            "already running inside node {} ({} is set); a node cannot be started from a session",
            instance,
            INSTANCE_ENV
        );
    }
    if let Ok(dir) = env::var(HOME_DIR_ENV) {
        env::set_current_dir(&dir).with_context(|| format!("cannot change to {}", dir))?;
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let _ = dotenv::dotenv();
    let cli = Cli::parse();

    if let Err(e) = init_from_args(cli.debug, cli.journald, cli.instance) {
        eprintln!("Failed to initialize logger: {}", e);
        std::process::exit(cli.error_level);
    }

    if let Err(e) = prepare_environment() {
        log_error!("{:#}", e);
        std::process::exit(cli.error_level);
    }

    let instance = cli.instance;
    let error_level = cli.error_level;
    log_info!("Starting node {}", instance);
    let level = match run(cli).await {
        Ok(level) => level,
        Err(e) => {
            log_error!("Node {} failed: {:#}", instance, e);
            error_level
        }
    };
    log_info!("Node {} exiting with level {}", instance, level);
    std::process::exit(level);
}
