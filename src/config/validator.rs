use anyhow::{bail, Result};
use std::collections::HashSet;
use tracing::warn;

use super::{AppConfig, RelaySettings};
use crate::relay::READ_CHUNK_SIZE;

/// 配置验证器 - 负责所有配置验证逻辑
pub struct ConfigValidator;

impl ConfigValidator {
    /// 验证端口号
    pub fn validate_port(port: u16, context: &str) -> Result<()> {
        if port == 0 {
            bail!("{}: port cannot be 0", context);
        }
        Ok(())
    }

    /// 验证服务器名称（addrelay 的参数，不能为空或包含空白）
    pub fn validate_server_name(name: &str, context: &str) -> Result<()> {
        if name.trim().is_empty() {
            bail!("{}: server name cannot be empty", context);
        }
        if name.chars().any(char::is_whitespace) {
            bail!("{}: server name '{}' contains whitespace", context, name);
        }
        Ok(())
    }

    /// 验证 relay 配置
    pub fn validate_relay_settings(settings: &RelaySettings) -> Result<()> {
        Self::validate_port(settings.first_port, "relay.first_port")?;
        Self::validate_port(settings.target_port, "relay.target_port")?;

        if settings.stats_interval_secs == 0 {
            bail!("relay.stats_interval_secs must be greater than 0");
        }
        if settings.rate_window_ms == 0 {
            bail!("relay.rate_window_ms must be greater than 0");
        }
        if settings.hold_buffer_bytes < READ_CHUNK_SIZE {
            bail!(
                "relay.hold_buffer_bytes ({}) must be at least one read chunk ({} bytes)",
                settings.hold_buffer_bytes,
                READ_CHUNK_SIZE
            );
        }
        if settings.rate_window_ms > 60_000 {
            warn!(
                "relay.rate_window_ms is very large ({} ms), rate limits will react slowly",
                settings.rate_window_ms
            );
        }

        let mut seen = HashSet::new();
        for server in &settings.default_servers {
            Self::validate_server_name(server, "relay.default_servers")?;
            if !seen.insert(server.to_lowercase()) {
                bail!("Duplicate default server '{}'", server);
            }
        }
        Ok(())
    }

    /// 验证完整配置
    pub fn validate_app_config(config: &AppConfig) -> Result<()> {
        Self::validate_relay_settings(&config.relay)?;
        for name in config.hosts.keys() {
            Self::validate_server_name(name, "hosts")?;
        }
        Ok(())
    }
}
