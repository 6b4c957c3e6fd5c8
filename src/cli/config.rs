use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::config::AppConfig;
use crate::stats::format_rate;

#[derive(Serialize)]
struct CheckResult {
    valid: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    config: Option<AppConfig>,
}

/// Expand path with tilde (~) and make it absolute
pub fn expand_path(path: &str) -> Result<String> {
    let expanded = shellexpand::tilde(path);
    let path_buf = PathBuf::from(expanded.as_ref());

    if path_buf.is_absolute() {
        Ok(expanded.into_owned())
    } else {
        std::env::current_dir()
            .context("Failed to get current directory")?
            .join(&path_buf)
            .to_str()
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("Invalid path: {}", path))
    }
}

/// 加载配置文件；未指定路径时使用默认配置
pub fn load_config(path: Option<&str>) -> Result<AppConfig> {
    match path {
        Some(path) => {
            let path = expand_path(path)?;
            AppConfig::load(&path)
        }
        None => Ok(AppConfig::default()),
    }
}

/// 可疑但合法的配置项
fn collect_warnings(config: &AppConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    if config.relay.default_servers.is_empty() {
        warnings.push("default_servers is empty, adddefaultrelays will do nothing".to_string());
    }
    if !config.relay.bind_addr.is_loopback() {
        warnings.push(format!(
            "Acceptors listen on non-loopback address {}",
            config.relay.bind_addr
        ));
    }
    if config.relay.first_port < 1024 {
        warnings.push(format!(
            "first_port {} is a privileged port",
            config.relay.first_port
        ));
    }
    warnings
}

/// Check configuration file format
pub fn check_config(config_path: &str, format: &str) -> Result<()> {
    let path = Path::new(config_path);

    if !path.exists() {
        if format == "json" {
            let result = CheckResult {
                valid: false,
                warnings: vec![],
                error: Some(format!("Configuration file not found: {}", config_path)),
                config: None,
            };
            println!("{}", serde_json::to_string_pretty(&result)?);
        } else {
            println!("✗ Configuration file not found: {}", config_path);
        }
        anyhow::bail!("Configuration file not found: {}", config_path);
    }

    if format == "text" {
        println!("Checking configuration file: {}\n", config_path);
    }

    match AppConfig::load(config_path) {
        Ok(config) => {
            let warnings = collect_warnings(&config);
            if format == "json" {
                let result = CheckResult {
                    valid: true,
                    warnings,
                    error: None,
                    config: Some(config),
                };
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                let relay = &config.relay;
                println!("✓ Bind address: {}", relay.bind_addr);
                println!("✓ First port: {}", relay.first_port);
                println!("✓ Target port: {}", relay.target_port);
                println!("✓ Stats interval: {}s", relay.stats_interval_secs);
                println!("✓ Rate window: {}ms", relay.rate_window_ms);
                println!("✓ Hold buffer: {} bytes", relay.hold_buffer_bytes);
                println!(
                    "✓ Default speed: {}",
                    format_rate(relay.default_bytes_per_second)
                );
                println!("✓ Default servers: {}", relay.default_servers.len());
                for (idx, server) in relay.default_servers.iter().enumerate() {
                    println!("  Server #{}: {}", idx + 1, server);
                }
                println!("✓ Host overrides: {}", config.hosts.len());
                for (name, addr) in &config.hosts {
                    println!("  {} -> {}", name, addr);
                }
                for warning in &warnings {
                    println!("⚠ Warning: {}", warning);
                }
                println!("\n✓ Relay configuration is valid!");
            }
            Ok(())
        }
        Err(e) => {
            if format == "json" {
                let result = CheckResult {
                    valid: false,
                    warnings: vec![],
                    error: Some(format!("{:#}", e)),
                    config: None,
                };
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("✗ Configuration validation failed!");
                println!("\nError details:");
                println!("{:#}", e);

                println!("\nCommon issues:");
                println!("  1. Check TOML syntax (brackets, quotes, commas)");
                println!("  2. Verify field names are spelled correctly");
                println!("  3. Ensure port numbers are valid (1-65535)");
                println!("  4. Host overrides must map names to IP addresses");
            }

            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelaySettings;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn test_expand_relative_path() {
        let expanded = expand_path("relay.toml").unwrap();
        assert!(Path::new(&expanded).is_absolute());
        assert!(expanded.ends_with("relay.toml"));
    }

    #[test]
    fn test_load_default_config() {
        assert_eq!(load_config(None).unwrap(), AppConfig::default());
        assert!(load_config(Some("/nonexistent/relay.toml")).is_err());
    }

    #[test]
    fn test_warnings() {
        assert!(collect_warnings(&AppConfig::default()).is_empty());

        let config = AppConfig {
            relay: RelaySettings {
                bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                first_port: 80,
                default_servers: vec![],
                ..RelaySettings::default()
            },
            ..AppConfig::default()
        };
        assert_eq!(collect_warnings(&config).len(), 3);
    }

    #[test]
    fn test_check_missing_file() {
        assert!(check_config("/nonexistent/relay.toml", "json").is_err());
    }
}
