// 配置管理模块 - 使用模块化设计

mod validator;

pub use validator::ConfigValidator;

use crate::relay::{RelayOptions, DEFAULT_HOLD_BUFFER_BYTES};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

/// 端口计数器的初始值
pub const DEFAULT_FIRST_PORT: u16 = 3677;

/// 服务器未指定端口时使用的出站端口
pub const DEFAULT_TARGET_PORT: u16 = 80;

/// 统计日志间隔（秒）
pub const DEFAULT_STATS_INTERVAL_SECS: u64 = 5;

/// 速率统计窗口（毫秒）
pub const DEFAULT_RATE_WINDOW_MS: u64 = 1000;

/// `adddefaultrelays` 使用的内置存储节点列表
pub const DEFAULT_SERVERS: &[&str] = &[
    "gfs262n300.userstorage.mega.co.nz",
    "gfs204n118.userstorage.mega.co.nz",
    "gfs208n108.userstorage.mega.co.nz",
    "gfs214n108.userstorage.mega.co.nz",
    "gfs270n221.userstorage.mega.co.nz",
    "gfs302n108.userstorage.mega.co.nz",
];

/// Relay 引擎配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    /// acceptor 监听地址
    pub bind_addr: IpAddr,
    /// 端口计数器初始值（addrelay 每次取一个）
    pub first_port: u16,
    /// 出站连接默认端口
    pub target_port: u16,
    /// 统计日志间隔（秒）
    pub stats_interval_secs: u64,
    /// 速率统计窗口（毫秒）
    pub rate_window_ms: u64,
    /// 暂停方向暂存数据的上限（字节）
    pub hold_buffer_bytes: usize,
    /// 新 acceptor 的默认限速（字节/秒，0 不限速）
    pub default_bytes_per_second: u64,
    /// adddefaultrelays 使用的服务器列表
    pub default_servers: Vec<String>,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            first_port: DEFAULT_FIRST_PORT,
            target_port: DEFAULT_TARGET_PORT,
            stats_interval_secs: DEFAULT_STATS_INTERVAL_SECS,
            rate_window_ms: DEFAULT_RATE_WINDOW_MS,
            hold_buffer_bytes: DEFAULT_HOLD_BUFFER_BYTES,
            default_bytes_per_second: 0,
            default_servers: DEFAULT_SERVERS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl RelaySettings {
    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs)
    }

    pub fn rate_window(&self) -> Duration {
        Duration::from_millis(self.rate_window_ms)
    }

    /// 新 relay 的参数
    pub fn relay_options(&self) -> RelayOptions {
        RelayOptions {
            rate_window: self.rate_window(),
            bytes_per_second: self.default_bytes_per_second,
            hold_buffer_bytes: self.hold_buffer_bytes,
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub relay: RelaySettings,
    /// 主机名 → 地址的静态覆盖（优先于 DNS）
    pub hosts: HashMap<String, IpAddr>,
}

impl AppConfig {
    /// 从文件加载配置
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file: {}", path))?;
        Self::from_toml_str(&content)
    }

    /// 从 TOML 文本解析并验证
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: AppConfig =
            toml::from_str(content).context("Failed to parse relay configuration")?;
        config
            .validate()
            .context("Configuration validation failed")?;
        Ok(config)
    }

    /// 验证配置
    pub fn validate(&self) -> anyhow::Result<()> {
        ConfigValidator::validate_app_config(self)
    }
}
