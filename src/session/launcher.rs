// BBS Node - Session Launcher
// Copyright (C) 2025 Akaere Networks
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Process entry for one node instance
//!
//! A node either takes over a connection accepted by an outside listener
//! (`-H`, with `-X T` or `-X S`), runs its own WFC loop on the local console,
//! or only runs the begin-day event (`-E`).

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{Cli, NodeConfig, PRIMARY_USER, SshSettings};
use crate::core::{
    AccountError, ActivityLog, Clock, InstanceLocation, InstanceRegistry, SessionContext,
    StatusError, StatusStore, SysopLog, UserStore,
};
use crate::io::{NullIo, RemoteIo, SecureIo, SocketIo, TransportKind, inherit_socket};
use crate::session::console::{NullConsole, StdinConsole};
use crate::session::events::ScheduledHousekeeping;
use crate::session::handoff::{Handoff, InteractiveSubsystem};
use crate::session::sysop::SysopMenu;
use crate::ssh::bridge::{BridgeError, TransportBridge};
use crate::ssh::identity::{HostIdentity, KeyError};
use crate::ssh::server::RusshProtocol;
use crate::ssh::session::SecureSession;
use crate::storage::{
    LmdbInstanceRegistry, LmdbStatusStore, LmdbUserStore, NodeDatabase, SharedNodeDatabase,
    StorageError,
};
use crate::wfc::{
    ConnectionDispatcher, Console, DispatchError, Housekeeping, LocalLogon, WfcOutcome,
    WfcServices,
};
use crate::{log_debug, log_error, log_info, log_notice, log_warn};

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("cannot create {path}: {source}")]
    Directory { path: PathBuf, source: io::Error },
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Account(#[from] AccountError),
    #[error(transparent)]
    Status(#[from] StatusError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error("cannot take over connection handle {handle}: {source}")]
    Handle { handle: u64, source: io::Error },
    #[error(transparent)]
    Bridge(BridgeError),
    #[error("begin-day event failed: {0:#}")]
    BeginDay(anyhow::Error),
}

/// How the node talks to its caller
#[derive(Debug)]
pub enum TransportPlan {
    Local,
    Telnet(u64),
    Secure(u64, HostIdentity),
}

impl TransportPlan {
    pub fn kind(&self) -> TransportKind {
        match self {
            TransportPlan::Local => TransportKind::None,
            TransportPlan::Telnet(_) => TransportKind::Telnet,
            TransportPlan::Secure(..) => TransportKind::Secure,
        }
    }
}

/// Decide the transport; a host key problem falls back to telnet
pub fn resolve_transport(
    requested: TransportKind,
    handle: Option<u64>,
    load_identity: impl FnOnce() -> Result<HostIdentity, KeyError>,
) -> TransportPlan {
    let Some(handle) = handle else {
        if requested != TransportKind::None {
            log_warn!("Transport {} requested without a handle, running locally", requested);
        }
        return TransportPlan::Local;
    };

    match requested {
        TransportKind::None => {
            log_warn!("Handle {} given without a transport, running locally", handle);
            TransportPlan::Local
        }
        TransportKind::Telnet => TransportPlan::Telnet(handle),
        TransportKind::Secure => match load_identity() {
            Ok(identity) => {
                log_debug!("Host key {}", identity.fingerprint());
                TransportPlan::Secure(handle, identity)
            }
            Err(e) => {
                log_error!("Cannot load SSH host key: {}", e);
                if let KeyError::BadPassphrase = e {
                    log_error!(
                        "The system password does not unlock the host key; delete the key file to generate a new one"
                    );
                }
                log_notice!("Falling back to telnet");
                TransportPlan::Telnet(handle)
            }
        },
    }
}

/// Open the caller's transport; `None` when the secure handshake failed
pub async fn create_comm(
    plan: TransportPlan,
    ssh: &SshSettings,
) -> Result<Option<Box<dyn RemoteIo>>, LaunchError> {
    let take = |handle: u64| {
        inherit_socket(handle).map_err(|source| LaunchError::Handle { handle, source })
    };

    match plan {
        TransportPlan::Local => Ok(Some(Box::new(NullIo))),
        TransportPlan::Telnet(handle) => Ok(Some(Box::new(SocketIo::telnet(take(handle)?)))),
        TransportPlan::Secure(handle, identity) => {
            log_debug!(
                "Caller has {}s to complete the SSH handshake",
                ssh.handshake_window().as_secs()
            );
            let protocol = RusshProtocol::new().with_activation_step(ssh.activation_step());
            let session = SecureSession::with_protocol(protocol, take(handle)?, &identity).await;
            match TransportBridge::start(session).await {
                Ok((bridge, plain_end)) => Ok(Some(Box::new(SecureIo::new(bridge, plain_end)))),
                Err(BridgeError::Handshake(failure)) => {
                    log_warn!("Dropping caller: {}", failure);
                    Ok(None)
                }
                Err(e) => Err(LaunchError::Bridge(e)),
            }
        }
    }
}

pub struct SessionLauncher {
    cli: Cli,
    config: Arc<NodeConfig>,
    clock: Arc<dyn Clock>,
    db: SharedNodeDatabase,
    status: Arc<LmdbStatusStore>,
    users: Arc<LmdbUserStore>,
    instances: Arc<LmdbInstanceRegistry>,
}

impl SessionLauncher {
    pub fn new(cli: Cli, config: NodeConfig, clock: Arc<dyn Clock>) -> Result<Self, LaunchError> {
        std::fs::create_dir_all(&config.gfiles_dir).map_err(|source| LaunchError::Directory {
            path: config.gfiles_dir.clone(),
            source,
        })?;

        let db = NodeDatabase::shared(&config.database_dir())?;
        let status = Arc::new(LmdbStatusStore::new(db.clone(), clock.as_ref()));
        let users = Arc::new(LmdbUserStore::new(db.clone()));
        users.ensure_primary_user("SYSOP")?;
        let instances = Arc::new(LmdbInstanceRegistry::new(db.clone()));

        Ok(Self {
            cli,
            config: Arc::new(config),
            clock,
            db,
            status,
            users,
            instances,
        })
    }

    /// Exit level for a normal end of this node
    pub fn ok_level(&self) -> i32 {
        self.cli.ok_level
    }

    pub fn context(&self) -> SessionContext {
        let mut ctx = SessionContext::new(self.cli.instance, self.config.clone(), self.clock.clone());
        ctx.event_minutes = self.cli.event_minutes;
        if let Some(speed) = self.cli.speed.or(self.cli.com_speed) {
            ctx.current_speed = speed.to_string();
        }
        ctx
    }

    fn activity(&self) -> SysopLog {
        SysopLog::new(&self.config.gfiles_dir, self.cli.instance)
    }

    fn housekeeping(&self) -> ScheduledHousekeeping {
        ScheduledHousekeeping::new(self.config.clone(), self.db.clone(), self.status.clone())
    }

    fn services(&self, console: Box<dyn Console>) -> WfcServices {
        WfcServices {
            console,
            housekeeping: Box::new(self.housekeeping()),
            commands: Box::new(SysopMenu::new(
                self.config.clone(),
                self.status.clone(),
                self.instances.clone(),
            )),
            status: self.status.clone(),
            users: self.users.clone(),
            instances: self.instances.clone(),
            activity: Box::new(self.activity()),
        }
    }

    fn announce(&self, ctx: &SessionContext, location: InstanceLocation) {
        if let Err(e) = self.instances.announce(ctx.instance, location) {
            log_warn!("Cannot record node location: {:#}", e);
        }
    }

    /// Run this node to completion; returns the process exit level
    pub async fn run(&self, interactive: &mut dyn InteractiveSubsystem) -> Result<i32, LaunchError> {
        let mut ctx = self.context();

        let result = if self.cli.event_only {
            self.run_event_only(&mut ctx).await
        } else {
            let config = &self.config;
            let plan = resolve_transport(self.cli.transport, self.cli.handle, || {
                HostIdentity::open_or_create(&config.key_path(), &config.system_password)
            });
            match plan {
                TransportPlan::Local => self.run_local(&mut ctx, interactive).await,
                remote => {
                    log_info!("Taking over {} caller", remote.kind());
                    match create_comm(remote, &self.config.ssh).await? {
                        Some(mut io) => self.run_remote(io.as_mut(), &mut ctx, interactive).await,
                        None => Ok(self.ok_level()),
                    }
                }
            }
        };

        self.announce(&ctx, InstanceLocation::Down);
        result
    }

    /// Begin-day only, for schedulers outside the node
    pub async fn run_event_only(&self, ctx: &mut SessionContext) -> Result<i32, LaunchError> {
        let mut housekeeping = self.housekeeping();
        let mut activity = self.activity();

        if let Err(e) = housekeeping.cleanup_events(ctx).await {
            log_warn!("Clearing pending events failed: {:#}", e);
        }

        let today = ctx.today();
        if self.status.status()?.last_date != today {
            self.status.roll_day(today)?;
            housekeeping.begin_day(ctx).await.map_err(LaunchError::BeginDay)?;
            log_info!("Begin-day event finished for {}", today);
        } else {
            log_notice!("Begin-day already ran for {}", today);
            if let Err(e) = activity.line("~ Begin-day event already ran today") {
                log_warn!("Cannot write activity log: {:#}", e);
            }
        }
        if let Err(e) = activity.consolidate(today) {
            log_warn!("Cannot consolidate activity log: {:#}", e);
        }
        Ok(self.ok_level())
    }

    /// Account picked with `-U`, if it can log on
    fn preselected_user(&self, ctx: &mut SessionContext) -> Result<Option<u16>, LaunchError> {
        let Some(number) = self.cli.user else {
            return Ok(None);
        };
        match self.users.read_user(number) {
            Ok(user) if !user.deleted => {
                ctx.switch_user(user);
                ctx.user_online = true;
                Ok(Some(number))
            }
            Ok(_) | Err(AccountError::Missing(_)) => {
                log_warn!("User #{} cannot be preselected", number);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn run_remote(
        &self,
        io: &mut dyn RemoteIo,
        ctx: &mut SessionContext,
        interactive: &mut dyn InteractiveSubsystem,
    ) -> Result<i32, LaunchError> {
        let status = self.status.record_call()?;
        log_info!(
            "Caller on node {} over {} (call {} today)",
            ctx.instance,
            io.transport(),
            status.calls_today
        );
        self.announce(ctx, InstanceLocation::Online);

        if !io.open().await {
            log_notice!("Caller hung up before the session started");
            return Ok(self.ok_level());
        }

        let handoff = match self.preselected_user(ctx)? {
            Some(number) => Handoff::Preselected(number),
            None => Handoff::Remote,
        };
        if let Err(e) = interactive.run(handoff, io, ctx).await {
            log_error!("Interactive session failed: {:#}", e);
        }

        io.close(self.cli.no_hangup).await;
        self.end_session(ctx);
        Ok(self.ok_level())
    }

    async fn run_local(
        &self,
        ctx: &mut SessionContext,
        interactive: &mut dyn InteractiveSubsystem,
    ) -> Result<i32, LaunchError> {
        if let Some(number) = self.preselected_user(ctx)? {
            self.announce(ctx, InstanceLocation::Online);
            if let Err(e) = interactive.run(Handoff::Preselected(number), &mut NullIo, ctx).await {
                log_error!("Interactive session failed: {:#}", e);
            }
            self.end_session(ctx);
            return Ok(self.ok_level());
        }

        let console: Box<dyn Console> = if atty::is(atty::Stream::Stdin) {
            Box::new(StdinConsole::new())
        } else {
            log_debug!("No terminal on stdin, console keys disabled");
            Box::new(NullConsole)
        };
        let mut dispatcher = ConnectionDispatcher::new(self.services(console))?;

        loop {
            let outcome = tokio::select! {
                outcome = dispatcher.run(ctx) => outcome?,
                _ = tokio::signal::ctrl_c() => {
                    log_notice!("Interrupted, shutting node {} down", ctx.instance);
                    return Ok(self.ok_level());
                }
            };

            let handoff = match outcome {
                WfcOutcome::Quit => return Ok(self.ok_level()),
                WfcOutcome::Caller => {
                    log_debug!("Incoming signal without a remote line on this node");
                    continue;
                }
                WfcOutcome::LocalLogon(LocalLogon::Primary) => Handoff::LocalPrimary,
                WfcOutcome::LocalLogon(LocalLogon::Fast(number)) => Handoff::LocalFast(number),
                WfcOutcome::LocalLogon(LocalLogon::Declined) => continue,
            };

            self.announce(ctx, InstanceLocation::Online);
            if let Err(e) = interactive.run(handoff, &mut NullIo, ctx).await {
                log_error!("Interactive session failed: {:#}", e);
            }
            self.end_session(ctx);
        }
    }

    fn end_session(&self, ctx: &mut SessionContext) {
        let mut activity = self.activity();
        let line = format!("~ User #{} off node {}", ctx.user_number(), ctx.instance);
        if let Err(e) = activity.line(&line) {
            log_warn!("Cannot write activity log: {:#}", e);
        }
        if let Err(e) = activity.consolidate(ctx.today()) {
            log_warn!("Cannot consolidate activity log: {:#}", e);
        }
        ctx.user_online = false;
        if let Ok(user) = self.users.read_user(PRIMARY_USER) {
            ctx.switch_user(user);
        }
    }
}
