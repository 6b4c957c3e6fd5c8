// 服务器名称解析（addrelay 使用）
// 测试和离线环境可以通过覆盖表把存储主机指向本地端点

use crate::error::{RelayError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::net::IpAddr;
use tracing::debug;

/// Resolves a server name to one address.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, host: &str) -> Result<IpAddr>;
}

/// System DNS with static overrides checked first.
#[derive(Debug, Clone, Default)]
pub struct SystemResolver {
    overrides: HashMap<String, IpAddr>,
}

impl SystemResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_overrides(overrides: HashMap<String, IpAddr>) -> Self {
        let overrides = overrides
            .into_iter()
            .map(|(name, addr)| (name.to_lowercase(), addr))
            .collect();
        Self { overrides }
    }

    /// Pin `host` to `addr`.
    pub fn insert(&mut self, host: impl Into<String>, addr: IpAddr) {
        self.overrides.insert(host.into().to_lowercase(), addr);
    }
}

#[async_trait]
impl Resolver for SystemResolver {
    async fn resolve(&self, host: &str) -> Result<IpAddr> {
        if let Ok(addr) = host.parse::<IpAddr>() {
            return Ok(addr);
        }
        if let Some(addr) = self.overrides.get(&host.to_lowercase()) {
            debug!("Resolved '{}' to {} from overrides", host, addr);
            return Ok(*addr);
        }

        let addrs: Vec<IpAddr> = tokio::net::lookup_host((host, 0))
            .await
            .map_err(|e| RelayError::resolve_failed(host, e.to_string()))?
            .map(|sa| sa.ip())
            .collect();

        // 优先 IPv4（与存储节点的 A 记录一致）
        addrs
            .iter()
            .find(|a| a.is_ipv4())
            .or_else(|| addrs.first())
            .copied()
            .ok_or_else(|| RelayError::resolve_failed(host, "no addresses returned"))
    }
}
