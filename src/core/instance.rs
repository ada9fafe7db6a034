// BBS Node - Instance Locations
// Copyright (C) 2025 Akaere Networks
// SPDX-License-Identifier: AGPL-3.0-or-later

use serde::{Deserialize, Serialize};

/// What a node is doing, as shown to the other nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstanceLocation {
    Wfc,
    Online,
    BoardEdit,
    ChainEdit,
    DirEdit,
    ConfEdit,
    GfileEdit,
    EventEdit,
    MenuEdit,
    TextEdit,
    MailRead,
    UserEdit,
    VoteEdit,
    Terminal,
    NetCallout,
    Down,
}

impl InstanceLocation {
    pub fn describe(self) -> &'static str {
        match self {
            InstanceLocation::Wfc => "waiting for call",
            InstanceLocation::Online => "online",
            InstanceLocation::BoardEdit => "editing boards",
            InstanceLocation::ChainEdit => "editing chains",
            InstanceLocation::DirEdit => "editing directories",
            InstanceLocation::ConfEdit => "editing conferences",
            InstanceLocation::GfileEdit => "editing gfiles",
            InstanceLocation::EventEdit => "editing events",
            InstanceLocation::MenuEdit => "editing menus",
            InstanceLocation::TextEdit => "editing a text file",
            InstanceLocation::MailRead => "reading mail",
            InstanceLocation::UserEdit => "editing users",
            InstanceLocation::VoteEdit => "editing voting questions",
            InstanceLocation::Terminal => "in a terminal program",
            InstanceLocation::NetCallout => "calling out",
            InstanceLocation::Down => "down",
        }
    }
}

pub trait InstanceRegistry: Send + Sync {
    fn announce(&self, instance: u16, location: InstanceLocation) -> anyhow::Result<()>;
}
