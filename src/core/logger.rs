// BBS Node - Systemd-Style Logger
// Copyright (C) 2025 Akaere Networks
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Systemd-style logging compatible with journald
//!
//! Every record is tagged with the node instance so that the output of
//! several nodes sharing one journal (or one terminal multiplexer) can be
//! told apart:
//! - Log levels: emerg, alert, crit, err, warning, notice, info, debug
//! - Terminal output with timestamps and optional colors
//! - Journald output with `PRIORITY=` / `MESSAGE=` fields

use std::sync::Mutex;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Log levels following systemd priority conventions
/// https://www.freedesktop.org/software/systemd/man/sd-daemon.html
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    /// System is unusable (0)
    Emergency = 0,
    /// Action must be taken immediately (1)
    Alert = 1,
    /// Critical conditions (2)
    Critical = 2,
    /// Error conditions (3)
    Error = 3,
    /// Warning conditions (4)
    Warning = 4,
    /// Normal but significant condition (5)
    Notice = 5,
    /// Informational message (6)
    Info = 6,
    /// Debug-level message (7)
    Debug = 7,
}

impl LogLevel {
    pub fn from_priority(priority: u8) -> Self {
        match priority {
            0 => LogLevel::Emergency,
            1 => LogLevel::Alert,
            2 => LogLevel::Critical,
            3 => LogLevel::Error,
            4 => LogLevel::Warning,
            5 => LogLevel::Notice,
            6 => LogLevel::Info,
            _ => LogLevel::Debug,
        }
    }

    /// Get the priority number for systemd
    pub fn priority(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Emergency => "EMERG",
            LogLevel::Alert => "ALERT",
            LogLevel::Critical => "CRIT",
            LogLevel::Error => "ERR",
            LogLevel::Warning => "WARNING",
            LogLevel::Notice => "NOTICE",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
        }
    }

    /// Get color code for terminal output
    pub fn color_code(self) -> &'static str {
        match self {
            LogLevel::Emergency => "\x1b[1;41m", // Bold red background
            LogLevel::Alert => "\x1b[1;91m",     // Bold bright red
            LogLevel::Critical => "\x1b[1;31m",  // Bold red
            LogLevel::Error => "\x1b[31m",       // Red
            LogLevel::Warning => "\x1b[33m",     // Yellow
            LogLevel::Notice => "\x1b[36m",      // Cyan
            LogLevel::Info => "\x1b[32m",        // Green
            LogLevel::Debug => "\x1b[37m",       // White/gray
        }
    }
}

/// Logger configuration
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// Minimum log level to output
    pub min_level: LogLevel,
    /// Whether to use colors in output
    pub use_colors: bool,
    /// Whether to include timestamps
    pub include_timestamp: bool,
    /// Whether to include target/module information
    pub include_target: bool,
    /// Whether to format for journald (structured format)
    pub journald_format: bool,
    /// Node instance tag attached to every record
    pub instance: Option<u16>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Info,
            use_colors: atty::is(atty::Stream::Stderr),
            include_timestamp: true,
            include_target: false,
            journald_format: false,
            instance: None,
        }
    }
}

/// Global logger instance
static LOGGER: Mutex<Option<Logger>> = Mutex::new(None);

/// Systemd-style logger implementation
#[derive(Debug)]
pub struct Logger {
    config: LoggerConfig,
    min_level: AtomicU8,
}

impl Logger {
    pub fn new(config: LoggerConfig) -> Self {
        Self {
            min_level: AtomicU8::new(config.min_level.priority()),
            config,
        }
    }

    /// Initialize the global logger
    pub fn init(config: LoggerConfig) -> Result<(), LoggerError> {
        let logger = Self::new(config);

        let mut global_logger = LOGGER.lock().map_err(|_| LoggerError::InitError)?;
        if global_logger.is_some() {
            return Err(LoggerError::AlreadyInitialized);
        }
        *global_logger = Some(logger);

        Ok(())
    }

    /// Set the minimum log level at runtime
    pub fn set_min_level(&self, level: LogLevel) {
        self.min_level.store(level.priority(), Ordering::Relaxed);
    }

    /// Check if a log level should be output
    pub fn should_log(&self, level: LogLevel) -> bool {
        level.priority() <= self.min_level.load(Ordering::Relaxed)
    }

    pub fn log(&self, level: LogLevel, target: &str, message: &str) {
        if !self.should_log(level) {
            return;
        }

        let timestamp = if self.config.include_timestamp {
            Some(
                SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_secs(),
            )
        } else {
            None
        };

        let formatted = if self.config.journald_format {
            self.format_journald(level, target, message, timestamp)
        } else {
            self.format_terminal(level, target, message, timestamp)
        };

        eprintln!("{}", formatted);
    }

    /// Format for journald structured output
    fn format_journald(
        &self,
        level: LogLevel,
        target: &str,
        message: &str,
        timestamp: Option<u64>,
    ) -> String {
        let mut output = String::new();

        output.push_str(&format!("PRIORITY={}\n", level.priority()));
        output.push_str(&format!("MESSAGE={}\n", message));

        if self.config.include_target && !target.is_empty() {
            output.push_str(&format!("CODE_FILE={}\n", target));
        }

        if let Some(instance) = self.config.instance {
            output.push_str(&format!("BBS_NODE={}\n", instance));
        }

        if let Some(ts) = timestamp {
            output.push_str(&format!("_SOURCE_REALTIME_TIMESTAMP={}\n", ts * 1_000_000));
        }

        output.push_str("SYSLOG_IDENTIFIER=bbs-node\n");

        output
    }

    /// Format for terminal output
    fn format_terminal(
        &self,
        level: LogLevel,
        target: &str,
        message: &str,
        timestamp: Option<u64>,
    ) -> String {
        let mut output = String::new();

        if let Some(ts) = timestamp {
            let datetime = chrono::DateTime::from_timestamp(ts as i64, 0)
                .unwrap_or_default()
                .format("%Y-%m-%d %H:%M:%S");
            output.push_str(&format!("{} ", datetime));
        }

        if let Some(instance) = self.config.instance {
            output.push_str(&format!("[node {}] ", instance));
        }

        if self.config.include_target && !target.is_empty() {
            output.push_str(&format!("{}: ", target));
        }

        // Systemd-style status lines carry their own marker, only color them
        if let Some(status_level) = status_marker_level(message) {
            if self.config.use_colors {
                output.push_str(&format!("{}{}\x1b[0m", status_level.color_code(), message));
            } else {
                output.push_str(message);
            }
        } else if self.config.use_colors {
            output.push_str(&format!(
                "{}[{}]\x1b[0m {}",
                level.color_code(),
                level.as_str(),
                message
            ));
        } else {
            output.push_str(&format!("[{}] {}", level.as_str(), message));
        }

        output
    }
}

fn status_marker_level(message: &str) -> Option<LogLevel> {
    if !message.starts_with('[') {
        return None;
    }
    if message.starts_with("[  FAILED ]") {
        Some(LogLevel::Error)
    } else if message.starts_with("[   WARN ]") {
        Some(LogLevel::Warning)
    } else if message.starts_with("[   OK   ]") {
        Some(LogLevel::Info)
    } else if message.starts_with("[*]") {
        Some(LogLevel::Notice)
    } else {
        None
    }
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::core::logger::log_with_level($crate::core::logger::LogLevel::Error, module_path!(), &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::core::logger::log_with_level($crate::core::logger::LogLevel::Warning, module_path!(), &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_notice {
    ($($arg:tt)*) => {
        $crate::core::logger::log_with_level($crate::core::logger::LogLevel::Notice, module_path!(), &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::core::logger::log_with_level($crate::core::logger::LogLevel::Info, module_path!(), &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::core::logger::log_with_level($crate::core::logger::LogLevel::Debug, module_path!(), &format!($($arg)*))
    };
}

/// Internal function to log with level
pub fn log_with_level(level: LogLevel, target: &str, message: &str) {
    if let Ok(logger_guard) = LOGGER.lock() {
        if let Some(ref logger) = *logger_guard {
            logger.log(level, target, message);
        }
    }
}

/// Systemd-style initialization message with loading indicator
pub fn log_init_start(service_name: &str) {
    let message = format!("[*] Starting {}...", service_name);
    log_with_level(LogLevel::Notice, module_path!(), &message);
}

/// Systemd-style success message with OK status
pub fn log_init_ok(service_name: &str) {
    let message = format!("[   OK   ] Starting {}", service_name);
    log_with_level(LogLevel::Info, module_path!(), &message);
}

pub fn log_init_ok_with_details(service_name: &str, details: &str) {
    let message = format!("[   OK   ] Starting {} ({})", service_name, details);
    log_with_level(LogLevel::Info, module_path!(), &message);
}

/// Systemd-style failure message with FAILED status
pub fn log_init_failed(service_name: &str, error: &str) {
    let message = format!("[  FAILED ] Starting {} - {}", service_name, error);
    log_with_level(LogLevel::Error, module_path!(), &message);
}

/// Systemd-style warning message with WARN status
pub fn log_init_warn(service_name: &str, warning: &str) {
    let message = format!("[   WARN ] Starting {} - {}", service_name, warning);
    log_with_level(LogLevel::Warning, module_path!(), &message);
}

/// Logger initialization errors
#[derive(Debug, thiserror::Error)]
pub enum LoggerError {
    #[error("Logger already initialized")]
    AlreadyInitialized,
    #[error("Failed to initialize logger")]
    InitError,
}

/// Initialize logger from CLI arguments
pub fn init_from_args(debug: bool, journald: bool, instance: u16) -> Result<(), LoggerError> {
    let min_level = if debug { LogLevel::Debug } else { LogLevel::Info };

    let config = LoggerConfig {
        min_level,
        use_colors: atty::is(atty::Stream::Stderr) && !journald,
        include_timestamp: !journald,
        include_target: debug,
        journald_format: journald,
        instance: Some(instance),
    };

    Logger::init(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain_config() -> LoggerConfig {
        LoggerConfig {
            min_level: LogLevel::Debug,
            use_colors: false,
            include_timestamp: false,
            include_target: false,
            journald_format: false,
            instance: Some(7),
        }
    }

    #[test]
    fn test_log_level_ordering() {
        assert!(LogLevel::Emergency < LogLevel::Alert);
        assert!(LogLevel::Info < LogLevel::Debug);
        assert!(LogLevel::Error < LogLevel::Warning);
    }

    #[test]
    fn test_log_level_priority_roundtrip() {
        for priority in 0..=7 {
            assert_eq!(LogLevel::from_priority(priority).priority(), priority);
        }
        assert_eq!(LogLevel::from_priority(42), LogLevel::Debug);
    }

    #[test]
    fn test_logger_level_filtering() {
        let logger = Logger::new(LoggerConfig {
            min_level: LogLevel::Warning,
            ..plain_config()
        });

        assert!(logger.should_log(LogLevel::Error));
        assert!(logger.should_log(LogLevel::Warning));
        assert!(!logger.should_log(LogLevel::Info));

        logger.set_min_level(LogLevel::Debug);
        assert!(logger.should_log(LogLevel::Debug));
    }

    #[test]
    fn test_terminal_format_tags_instance() {
        let logger = Logger::new(plain_config());
        let line = logger.format_terminal(LogLevel::Warning, "x", "carrier lost", None);
        assert_eq!(line, "[node 7] [WARNING] carrier lost");
    }

    #[test]
    fn test_terminal_format_keeps_status_marker() {
        let logger = Logger::new(plain_config());
        let line = logger.format_terminal(LogLevel::Info, "x", "[   OK   ] Starting relay", None);
        assert_eq!(line, "[node 7] [   OK   ] Starting relay");
    }

    #[test]
    fn test_journald_format_fields() {
        let logger = Logger::new(LoggerConfig {
            journald_format: true,
            ..plain_config()
        });
        let record = logger.format_journald(LogLevel::Error, "x", "handshake failed", None);
        assert!(record.starts_with("PRIORITY=3\nMESSAGE=handshake failed\n"));
        assert!(record.contains("BBS_NODE=7\n"));
        assert!(record.ends_with("SYSLOG_IDENTIFIER=bbs-node\n"));
    }
}
