use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveTime;
use clap::Parser;
use serde::Deserialize;

use crate::io::TransportKind;

// Host identity
pub const HOST_KEY_LABEL: &str = "bbs_node_ssh_server";
pub const DEFAULT_KEY_FILE: &str = "hostkey.json";

// Secure session handshake. The first activation only starts the
// connection, so a caller gets (HANDSHAKE_ATTEMPTS - 1) steps to finish key
// exchange, authentication and the shell request: 4.5 minutes by default.
pub const HANDSHAKE_ATTEMPTS: u32 = 10;
pub const ACTIVATION_STEP_SECS: u64 = 30;
pub const CONTROL_DRAIN_BYTES: usize = 4096;

// Transport bridge relay
pub const RELAY_CHUNK_SIZE: usize = 16 * 1024;
pub const RELAY_POLL_INTERVAL: Duration = Duration::from_secs(1);

// WFC idle loop
pub const CALLOUT_INTERVAL_SECS: u64 = 60;
pub const NET_CLEANUP_INTERVAL_SECS: u64 = 55;
pub const LOGON_PROMPT_TIMEOUT: Duration = Duration::from_secs(60);
/// Upper bound for configured intervals, one year
pub const MAX_INTERVAL_SECS: u64 = 365 * 24 * 60 * 60;

// Accounts
pub const PRIMARY_USER: u16 = 1;
pub const SYSOP_LEVEL: u8 = 255;

// Process environment
pub const INSTANCE_ENV: &str = "BBS_NODE_INSTANCE";
pub const HOME_DIR_ENV: &str = "BBS_NODE_DIR";

// LMDB map size for the shared node database
pub const NODE_DB_MAP_SIZE: usize = 64 * 1024 * 1024;

pub const DEFAULT_CONFIG_FILE: &str = "node.toml";

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "A multi-user terminal BBS node")]
pub struct Cli {
    /// Node instance number
    #[arg(short = 'N', long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..=999))]
    pub instance: u16,

    /// Inherited socket handle of an already accepted connection
    #[arg(short = 'H', long)]
    pub handle: Option<u64>,

    /// Transport of the inherited handle (T = telnet, S = ssh)
    #[arg(short = 'X', long, default_value = "none")]
    pub transport: TransportKind,

    /// Connection speed of a caller that is already online
    #[arg(short = 'B', long)]
    pub speed: Option<u32>,

    /// Port speed reported to the interactive session
    #[arg(short = 'S', long)]
    pub com_speed: Option<u32>,

    /// Minutes until the next external event
    #[arg(short = 'R', long)]
    pub event_minutes: Option<u32>,

    /// Log this account on directly
    #[arg(short = 'U', long)]
    pub user: Option<u16>,

    /// Exit level on normal termination
    #[arg(short = 'Q', long, default_value_t = 0)]
    pub ok_level: i32,

    /// Exit level on error termination
    #[arg(short = 'A', long, default_value_t = 1)]
    pub error_level: i32,

    /// Run the begin-day event and exit
    #[arg(short = 'E', long)]
    pub event_only: bool,

    /// Leave the connection up when the session ends
    #[arg(short = 'Z', long)]
    pub no_hangup: bool,

    /// Node configuration file
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Enable debug output
    #[arg(short, long)]
    pub debug: bool,

    /// Write journald structured records to stderr
    #[arg(long)]
    pub journald: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Node configuration loaded from `node.toml`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub system_name: String,
    /// Passphrase protecting the host key store
    pub system_password: String,
    pub data_dir: PathBuf,
    pub gfiles_dir: PathBuf,
    /// Node that runs the day rollover; 0 lets any node run it
    pub begin_day_node: u16,
    pub ssh: SshSettings,
    pub network: NetworkSettings,
    pub events: EventSettings,
    pub interactive: InteractiveSettings,
    pub sysop: SysopSettings,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            system_name: "BBS Node".to_string(),
            system_password: String::new(),
            data_dir: PathBuf::from("data"),
            gfiles_dir: PathBuf::from("gfiles"),
            begin_day_node: 0,
            ssh: SshSettings::default(),
            network: NetworkSettings::default(),
            events: EventSettings::default(),
            interactive: InteractiveSettings::default(),
            sysop: SysopSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SshSettings {
    pub key_file: PathBuf,
    /// Seconds one handshake activation waits for the caller's shell request
    pub activation_step_secs: u64,
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            key_file: PathBuf::from(DEFAULT_KEY_FILE),
            activation_step_secs: ACTIVATION_STEP_SECS,
        }
    }
}

impl SshSettings {
    pub fn activation_step(&self) -> Duration {
        Duration::from_secs(self.activation_step_secs.clamp(1, MAX_INTERVAL_SECS))
    }

    /// Longest time a caller may take to reach the shell
    pub fn handshake_window(&self) -> Duration {
        self.activation_step() * HANDSHAKE_ATTEMPTS.saturating_sub(1)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    pub callout: bool,
    pub system_number: u16,
    pub callout_command: Option<String>,
    pub cleanup_command: Option<String>,
    pub callout_interval_secs: u64,
    pub cleanup_interval_secs: u64,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            callout: false,
            system_number: 0,
            callout_command: None,
            cleanup_command: None,
            callout_interval_secs: CALLOUT_INTERVAL_SECS,
            cleanup_interval_secs: NET_CLEANUP_INTERVAL_SECS,
        }
    }
}

impl NetworkSettings {
    pub fn callout_interval(&self) -> chrono::Duration {
        interval(self.callout_interval_secs)
    }

    pub fn cleanup_interval(&self) -> chrono::Duration {
        interval(self.cleanup_interval_secs)
    }
}

fn interval(secs: u64) -> chrono::Duration {
    // MAX_INTERVAL_SECS fits chrono's range, so this never panics
    chrono::Duration::seconds(secs.min(MAX_INTERVAL_SECS) as i64)
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EventSettings {
    pub beginday_command: Option<String>,
    pub timed: Vec<TimedEvent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimedEvent {
    pub name: String,
    /// Local start time as `HH:MM`
    pub time: String,
    pub command: String,
    /// Node that runs the event; 0 means any node
    #[serde(default)]
    pub node: u16,
}

impl TimedEvent {
    pub fn start_time(&self) -> Option<NaiveTime> {
        NaiveTime::parse_from_str(&self.time, "%H:%M").ok()
    }

    pub fn runs_on(&self, instance: u16) -> bool {
        self.node == 0 || self.node == instance
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InteractiveSettings {
    pub command: Option<String>,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SysopSettings {
    pub terminal_command: Option<String>,
    /// Programs bound to WFC command letters, e.g. `B = "boardedit"`
    pub commands: BTreeMap<String, String>,
}

impl SysopSettings {
    pub fn command_for(&self, key: char) -> Option<&str> {
        let wanted = key.to_ascii_uppercase().to_string();
        self.commands
            .iter()
            .find(|(letter, _)| letter.to_ascii_uppercase() == wanted)
            .map(|(_, command)| command.as_str())
    }
}

impl NodeConfig {
    /// Load the configuration file and validate it
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content).map_err(|err| match err {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: NodeConfig = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.begin_day_node > 999 {
            return Err(ConfigError::Invalid(format!(
                "begin_day_node {} is outside 0..=999",
                self.begin_day_node
            )));
        }
        for event in &self.events.timed {
            if event.start_time().is_none() {
                return Err(ConfigError::Invalid(format!(
                    "event '{}' has unreadable time '{}'",
                    event.name, event.time
                )));
            }
        }
        for letter in self.sysop.commands.keys() {
            if letter.chars().count() != 1 {
                return Err(ConfigError::Invalid(format!(
                    "sysop command key '{}' must be a single letter",
                    letter
                )));
            }
        }
        Ok(())
    }

    pub fn key_path(&self) -> PathBuf {
        self.data_dir.join(&self.ssh.key_file)
    }

    pub fn database_dir(&self) -> PathBuf {
        self.data_dir.join("node-lmdb")
    }

    /// Whether this instance may run the day rollover
    pub fn runs_begin_day(&self, instance: u16) -> bool {
        self.begin_day_node == 0 || self.begin_day_node == instance
    }
}
