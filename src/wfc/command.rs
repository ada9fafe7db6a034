// BBS Node - WFC Command Table
// Copyright (C) 2025 Akaere Networks
// SPDX-License-Identifier: AGPL-3.0-or-later

use crate::core::InstanceLocation;

const ESC: u8 = 0x1b;

/// Single-key sysop commands available while waiting for a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WfcCommand {
    LocalLogon,
    Help,
    ForceCallout,
    WarDialCallout,
    FastCallout,
    MenuEditor,
    NetDataLogs,
    NetListing,
    Exit,
    BoardEdit,
    ChainEdit,
    DirEdit,
    SendEmail,
    GfileEdit,
    EventEdit,
    SendInternetMail,
    ConferenceEdit,
    SendMailFile,
    TodaysLog,
    ReadMail,
    NetLog,
    EditTextFile,
    PendingList,
    Quit,
    ReadAllMail,
    Status,
    Terminal,
    UserEdit,
    VoteEdit,
    EditGfile,
    Environment,
    YesterdaysLog,
    ActivityLog,
}

impl WfcCommand {
    pub const ALL: [WfcCommand; 33] = [
        WfcCommand::LocalLogon,
        WfcCommand::Help,
        WfcCommand::ForceCallout,
        WfcCommand::WarDialCallout,
        WfcCommand::FastCallout,
        WfcCommand::MenuEditor,
        WfcCommand::NetDataLogs,
        WfcCommand::NetListing,
        WfcCommand::Exit,
        WfcCommand::BoardEdit,
        WfcCommand::ChainEdit,
        WfcCommand::DirEdit,
        WfcCommand::SendEmail,
        WfcCommand::GfileEdit,
        WfcCommand::EventEdit,
        WfcCommand::SendInternetMail,
        WfcCommand::ConferenceEdit,
        WfcCommand::SendMailFile,
        WfcCommand::TodaysLog,
        WfcCommand::ReadMail,
        WfcCommand::NetLog,
        WfcCommand::EditTextFile,
        WfcCommand::PendingList,
        WfcCommand::Quit,
        WfcCommand::ReadAllMail,
        WfcCommand::Status,
        WfcCommand::Terminal,
        WfcCommand::UserEdit,
        WfcCommand::VoteEdit,
        WfcCommand::EditGfile,
        WfcCommand::Environment,
        WfcCommand::YesterdaysLog,
        WfcCommand::ActivityLog,
    ];

    /// Look up an (already upper-cased) key
    pub fn from_key(key: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|command| command.key() == key)
    }

    pub fn key(self) -> u8 {
        match self {
            WfcCommand::LocalLogon => b' ',
            WfcCommand::Help => b'?',
            WfcCommand::ForceCallout => b'/',
            WfcCommand::WarDialCallout => b'.',
            WfcCommand::FastCallout => b'*',
            WfcCommand::MenuEditor => b'!',
            WfcCommand::NetDataLogs => b',',
            WfcCommand::NetListing => b'`',
            WfcCommand::Exit => ESC,
            WfcCommand::BoardEdit => b'B',
            WfcCommand::ChainEdit => b'C',
            WfcCommand::DirEdit => b'D',
            WfcCommand::SendEmail => b'E',
            WfcCommand::GfileEdit => b'G',
            WfcCommand::EventEdit => b'H',
            WfcCommand::SendInternetMail => b'I',
            WfcCommand::ConferenceEdit => b'J',
            WfcCommand::SendMailFile => b'K',
            WfcCommand::TodaysLog => b'L',
            WfcCommand::ReadMail => b'M',
            WfcCommand::NetLog => b'N',
            WfcCommand::EditTextFile => b'O',
            WfcCommand::PendingList => b'P',
            WfcCommand::Quit => b'Q',
            WfcCommand::ReadAllMail => b'R',
            WfcCommand::Status => b'S',
            WfcCommand::Terminal => b'T',
            WfcCommand::UserEdit => b'U',
            WfcCommand::VoteEdit => b'V',
            WfcCommand::EditGfile => b'W',
            WfcCommand::Environment => b'X',
            WfcCommand::YesterdaysLog => b'Y',
            WfcCommand::ActivityLog => b'Z',
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            WfcCommand::LocalLogon => "Local logon",
            WfcCommand::Help => "Help",
            WfcCommand::ForceCallout => "Force network callout",
            WfcCommand::WarDialCallout => "War-dial callout",
            WfcCommand::FastCallout => "Fast network callout",
            WfcCommand::MenuEditor => "Menu editor",
            WfcCommand::NetDataLogs => "Network data logs",
            WfcCommand::NetListing => "Network listing",
            WfcCommand::Exit => "Exit the BBS",
            WfcCommand::BoardEdit => "Board editor",
            WfcCommand::ChainEdit => "Chain editor",
            WfcCommand::DirEdit => "Directory editor",
            WfcCommand::SendEmail => "Send email",
            WfcCommand::GfileEdit => "G-file editor",
            WfcCommand::EventEdit => "Event editor",
            WfcCommand::SendInternetMail => "Send internet mail",
            WfcCommand::ConferenceEdit => "Conference editor",
            WfcCommand::SendMailFile => "Send a text file as mail",
            WfcCommand::TodaysLog => "Today's log",
            WfcCommand::ReadMail => "Read sysop mail",
            WfcCommand::NetLog => "Network log",
            WfcCommand::EditTextFile => "Edit a text file",
            WfcCommand::PendingList => "Pending network transfers",
            WfcCommand::Quit => "Quit",
            WfcCommand::ReadAllMail => "Read all mail",
            WfcCommand::Status => "System status",
            WfcCommand::Terminal => "Terminal program",
            WfcCommand::UserEdit => "User editor",
            WfcCommand::VoteEdit => "Voting editor",
            WfcCommand::EditGfile => "Edit a g-file",
            WfcCommand::Environment => "Environment",
            WfcCommand::YesterdaysLog => "Yesterday's log",
            WfcCommand::ActivityLog => "Activity log",
        }
    }

    /// Location announced to other nodes while the command runs
    pub fn location(self) -> Option<InstanceLocation> {
        match self {
            WfcCommand::BoardEdit => Some(InstanceLocation::BoardEdit),
            WfcCommand::ChainEdit => Some(InstanceLocation::ChainEdit),
            WfcCommand::DirEdit => Some(InstanceLocation::DirEdit),
            WfcCommand::GfileEdit => Some(InstanceLocation::GfileEdit),
            WfcCommand::EventEdit => Some(InstanceLocation::EventEdit),
            WfcCommand::ConferenceEdit => Some(InstanceLocation::ConfEdit),
            WfcCommand::MenuEditor => Some(InstanceLocation::MenuEdit),
            WfcCommand::EditTextFile | WfcCommand::EditGfile => Some(InstanceLocation::TextEdit),
            WfcCommand::ReadAllMail => Some(InstanceLocation::MailRead),
            WfcCommand::UserEdit => Some(InstanceLocation::UserEdit),
            WfcCommand::VoteEdit => Some(InstanceLocation::VoteEdit),
            WfcCommand::Terminal => Some(InstanceLocation::Terminal),
            WfcCommand::ForceCallout | WfcCommand::WarDialCallout | WfcCommand::FastCallout => {
                Some(InstanceLocation::NetCallout)
            }
            _ => None,
        }
    }

    /// Commands that may leave outbound network mail behind
    pub fn needs_net_cleanup(self) -> bool {
        matches!(
            self,
            WfcCommand::BoardEdit
                | WfcCommand::SendEmail
                | WfcCommand::SendInternetMail
                | WfcCommand::SendMailFile
                | WfcCommand::ReadMail
        )
    }

    /// Commands that only make sense with a network system number
    pub fn requires_network(self) -> bool {
        matches!(
            self,
            WfcCommand::ForceCallout
                | WfcCommand::WarDialCallout
                | WfcCommand::NetListing
                | WfcCommand::NetDataLogs
        )
    }
}

/// Extended key read after a zero prefix byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SysopHotKey {
    Function(u8),
    ShiftFunction(u8),
    ControlFunction(u8),
    AltFunction(u8),
    Home,
    Other(u8),
}

impl SysopHotKey {
    /// Decode a PC scan code
    pub fn from_scan_code(code: u8) -> Self {
        match code {
            59..=68 => SysopHotKey::Function(code - 58),
            71 => SysopHotKey::Home,
            84..=93 => SysopHotKey::ShiftFunction(code - 83),
            94..=103 => SysopHotKey::ControlFunction(code - 93),
            104..=113 => SysopHotKey::AltFunction(code - 103),
            other => SysopHotKey::Other(other),
        }
    }
}
