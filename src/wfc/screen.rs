// BBS Node - WFC Screen
// Copyright (C) 2025 Akaere Networks
// SPDX-License-Identifier: AGPL-3.0-or-later

use chrono::{DateTime, Local};

use crate::core::NodeStatus;

/// Snapshot shown on the local console while the node waits for a call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WfcScreen {
    pub system_name: String,
    pub instance: u16,
    pub date: String,
    pub calls_today: u32,
    pub total_calls: u32,
    pub net_clean_needed: bool,
    pub last_callout: Option<String>,
}

impl WfcScreen {
    pub fn new(
        system_name: &str,
        instance: u16,
        now: DateTime<Local>,
        status: &NodeStatus,
        last_callout: Option<DateTime<Local>>,
    ) -> Self {
        // Minute resolution so consoles only redraw when something changes
        Self {
            system_name: system_name.to_string(),
            instance,
            date: now.format("%a %b %d %Y  %H:%M").to_string(),
            calls_today: status.calls_today,
            total_calls: status.total_calls,
            net_clean_needed: status.net_clean_needed,
            last_callout: last_callout.map(|at| at.format("%H:%M").to_string()),
        }
    }

    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("{} - node {}", self.system_name, self.instance),
            self.date.clone(),
            String::new(),
            format!("Calls today : {}", self.calls_today),
            format!("Total calls : {}", self.total_calls),
            format!(
                "Last callout: {}",
                self.last_callout.as_deref().unwrap_or("never")
            ),
        ];
        if self.net_clean_needed {
            lines.push("Network cleanup pending".to_string());
        }
        lines.push(String::new());
        lines.push("Waiting for call. SPACE logs on locally, ? lists commands.".to_string());
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    #[test]
    fn test_screen_lines() {
        let now = Local.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).unwrap();
        let mut status = NodeStatus::new(NaiveDate::from_ymd_opt(2025, 3, 14).unwrap());
        status.calls_today = 4;
        status.total_calls = 1200;

        let screen = WfcScreen::new("Akaere BBS", 2, now, &status, None);
        let lines = screen.lines();
        assert_eq!(lines[0], "Akaere BBS - node 2");
        assert_eq!(lines[1], "Fri Mar 14 2025  09:26");
        assert!(lines.contains(&"Calls today : 4".to_string()));
        assert!(lines.contains(&"Last callout: never".to_string()));
        assert!(!lines.iter().any(|l| l.contains("cleanup pending")));

        status.net_clean_needed = true;
        let later = WfcScreen::new("Akaere BBS", 2, now, &status, Some(now));
        assert_ne!(screen, later);
        assert!(later.lines().contains(&"Last callout: 09:26".to_string()));
    }
}
