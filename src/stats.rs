use serde::{Deserialize, Serialize};
use std::fmt;

/// Statistics snapshot for a single relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayStats {
    /// Relay reporting name
    pub name: String,
    /// Total bytes written to the test client (server → client)
    pub bytes_to_client: u64,
    /// Total bytes written to the real server (client → server)
    pub bytes_to_server: u64,
    /// Current client → server rate in bytes/second
    pub upload_rate: u64,
    /// Current server → client rate in bytes/second
    pub download_rate: u64,
    /// Cap applied to writes towards the client (0 = unlimited)
    pub bytes_per_second: u64,
    pub stopped: bool,
    pub paused: bool,
    /// Seconds since the relay was created
    pub age_secs: u64,
}

impl RelayStats {
    /// One `report` line: ` <name>: <to client> <to server> <stopped|active>[ (paused)]`
    pub fn report_line(&self) -> String {
        format!(
            " {}: {} {} {}{}",
            self.name,
            self.bytes_to_client,
            self.bytes_to_server,
            if self.stopped { "stopped" } else { "active" },
            if self.paused { " (paused)" } else { "" }
        )
    }
}

/// Statistics snapshot for a single acceptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptorStats {
    pub name: String,
    pub listen_port: u16,
    pub target: String,
    pub state: String,
    pub relays_spawned: u64,
    /// Cap given to relays spawned from now on
    pub default_bytes_per_second: u64,
    pub uptime_secs: u64,
}

impl AcceptorStats {
    pub fn list_line(&self) -> String {
        format!(
            " {}: port {} -> {} [{}] relays: {} speed: {} up {}",
            self.name,
            self.listen_port,
            self.target,
            self.state,
            self.relays_spawned,
            format_rate(self.default_bytes_per_second),
            format_duration(self.uptime_secs)
        )
    }
}

/// Aggregate over all relays, emitted by the periodic logger
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSummary {
    /// Relays not yet stopped
    pub active: usize,
    /// Active relays currently moving bytes client → server
    pub uploading: usize,
    pub upload_rate: u64,
    /// Active relays currently moving bytes server → client
    pub downloading: usize,
    pub download_rate: u64,
    /// Totals include stopped relays
    pub total_up: u64,
    pub total_down: u64,
}

impl StatsSummary {
    pub fn from_relays<'a>(relays: impl IntoIterator<Item = &'a RelayStats>) -> Self {
        let mut summary = StatsSummary::default();
        for stats in relays {
            if !stats.stopped {
                summary.active += 1;
                if stats.upload_rate > 0 {
                    summary.uploading += 1;
                }
                if stats.download_rate > 0 {
                    summary.downloading += 1;
                }
                summary.upload_rate += stats.upload_rate;
                summary.download_rate += stats.download_rate;
            }
            summary.total_up += stats.bytes_to_server;
            summary.total_down += stats.bytes_to_client;
        }
        summary
    }
}

impl fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "active: {} uploading: {} rate {} downloading: {} rate {} totals: up {} down {}",
            self.active,
            self.uploading,
            self.upload_rate,
            self.downloading,
            self.download_rate,
            self.total_up,
            self.total_down
        )
    }
}

/// Format bytes into human-readable format
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

/// Format a bytes/second cap, 0 meaning no cap
pub fn format_rate(bytes_per_second: u64) -> String {
    if bytes_per_second == 0 {
        "unlimited".to_string()
    } else {
        format!("{}/s", format_bytes(bytes_per_second))
    }
}

/// Format duration into human-readable format
pub fn format_duration(seconds: u64) -> String {
    let days = seconds / 86400;
    let hours = (seconds % 86400) / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if days > 0 {
        format!("{}d {:02}h", days, hours)
    } else if hours > 0 {
        format!("{}h {:02}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {:02}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}
