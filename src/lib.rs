//! # BBS Node
//!
//! One node of a multi-user dial-in style bulletin board system.
//!
//! A node either waits for a caller at the WFC ("waiting for caller") screen,
//! where the sysop can run maintenance commands and log on locally, or takes
//! over a connection accepted by an outside listener and hands the caller to
//! the interactive session program. Callers arrive over telnet or over SSH,
//! in which case the secure session is bridged to a plain loopback socket.
//!
//! ## Layout
//!
//! - [`config`]: command line, `node.toml` and constants
//! - [`core`]: logging, session context, accounts, node status, activity log
//! - [`storage`]: LMDB persistence shared by every node of a system
//! - [`ssh`]: host identity, secure session and transport bridge
//! - [`io`]: the caller's byte stream (none, telnet or bridged SSH)
//! - [`wfc`]: the waiting-for-caller loop and its command table
//! - [`session`]: launcher, sysop menu, scheduled events and interactive handoff
//!
//! ```no_run
//! use std::sync::Arc;
//! use bbs_node::config::{Cli, NodeConfig};
//! use bbs_node::core::SystemClock;
//! use bbs_node::session::{CommandHandoff, SessionLauncher};
//! use clap::Parser;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cli = Cli::parse();
//!     let config = NodeConfig::load(&cli.config)?;
//!     let mut interactive = CommandHandoff::new(Arc::new(config.clone()));
//!     let launcher = SessionLauncher::new(cli, config, Arc::new(SystemClock))?;
//!     let level = launcher.run(&mut interactive).await?;
//!     std::process::exit(level);
//! }
//! ```

pub mod config;
pub mod core;
pub mod io;
pub mod session;
pub mod ssh;
pub mod storage;
pub mod wfc;

pub use config::{Cli, NodeConfig};
pub use session::{LaunchError, SessionLauncher};
pub use wfc::{ConnectionDispatcher, WfcOutcome};
