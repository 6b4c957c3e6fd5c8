/// 文本控制面
///
/// 命令行解析为 [`Command`]，选择器在注册表快照上匹配，结果（包括错误）都以文本返回
mod command;
mod selector;

pub use command::{Command, HELP_TEXT};
pub use selector::Selector;

use crate::acceptor::AcceptorState;
use crate::error::{RelayError, Result};
use crate::registry::Registry;
use crate::relay::Relay;
use crate::resolver::Resolver;
use crate::stats::format_rate;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct ControlPlane {
    registry: Arc<Registry>,
    resolver: Arc<dyn Resolver>,
}

impl ControlPlane {
    pub fn new(registry: Arc<Registry>, resolver: Arc<dyn Resolver>) -> Self {
        Self { registry, resolver }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// 执行一行命令，错误也渲染为文本
    pub async fn execute_line(&self, line: &str) -> String {
        let result = match Command::parse(line) {
            Ok(Some(command)) => self.execute(command).await,
            Ok(None) => return String::new(),
            Err(e) => Err(e),
        };
        result.unwrap_or_else(|e| {
            debug!("Command '{}' failed: {}", line.trim(), e);
            e.to_string()
        })
    }

    /// 执行命令，返回要显示的文本（没有匹配对象时为空）
    pub async fn execute(&self, command: Command) -> Result<String> {
        match command {
            Command::AddRelay { server } => self.add_relay(&server).await,
            Command::AddDefaultRelays => {
                let mut lines = Vec::new();
                for server in &self.registry.settings().default_servers {
                    match self.add_relay(server).await {
                        Ok(line) => lines.push(line),
                        Err(e) => {
                            warn!("Default relay '{}' not added: {}", server, e);
                            lines.push(e.to_string());
                        }
                    }
                }
                Ok(lines.join("\n"))
            }
            Command::NextPort(port) => {
                if let Some(port) = port {
                    self.registry.set_next_port(port);
                }
                Ok(match self.registry.next_port() {
                    Some(port) => format!("Next Port: {}", port),
                    None => "Next Port: none".to_string(),
                })
            }
            Command::CloseAcceptor(selector) => {
                let lines = selector
                    .filter(self.registry.acceptors(), |a| a.name())
                    .into_iter()
                    .filter(|a| a.stop())
                    .map(|a| format!("closed {}", a.name()))
                    .collect::<Vec<_>>();
                Ok(lines.join("\n"))
            }
            Command::OpenAcceptor(selector) => {
                let mut lines = Vec::new();
                for acceptor in selector.filter(self.registry.acceptors(), |a| a.name()) {
                    if acceptor.state() != AcceptorState::Stopped {
                        continue;
                    }
                    match acceptor.start().await {
                        Ok(()) => lines.push(format!("opened {}", acceptor.name())),
                        Err(e) => lines.push(e.to_string()),
                    }
                }
                Ok(lines.join("\n"))
            }
            Command::CloseRelay(selector) => {
                let lines = self
                    .live_relays(&selector)
                    .into_iter()
                    .filter(|r| r.stop_now())
                    .map(|r| format!("closed {}", r.name()))
                    .collect::<Vec<_>>();
                Ok(lines.join("\n"))
            }
            Command::PauseRelay {
                selector,
                paused,
                side,
            } => {
                let verb = if paused { "paused" } else { "unpaused" };
                let lines = self
                    .live_relays(&selector)
                    .into_iter()
                    .filter(|r| match side {
                        Some(side) => r.pause_side(side, paused),
                        None => r.pause(paused),
                    })
                    .map(|r| match side {
                        Some(side) => format!("{} {} ({})", verb, r.name(), side.direction()),
                        None => format!("{} {}", verb, r.name()),
                    })
                    .collect::<Vec<_>>();
                Ok(lines.join("\n"))
            }
            Command::RelaySpeed {
                selector,
                bytes_per_second,
            } => {
                let lines = selector
                    .filter(self.registry.relays(), |r| r.name())
                    .into_iter()
                    .map(|r| {
                        r.set_bytes_per_second(bytes_per_second);
                        format!("{} speed {}", r.name(), format_rate(bytes_per_second))
                    })
                    .collect::<Vec<_>>();
                Ok(lines.join("\n"))
            }
            Command::AcceptorSpeed {
                selector,
                bytes_per_second,
            } => {
                let lines = selector
                    .filter(self.registry.acceptors(), |a| a.name())
                    .into_iter()
                    .map(|a| {
                        a.set_bytes_per_second(bytes_per_second);
                        format!("{} speed {}", a.name(), format_rate(bytes_per_second))
                    })
                    .collect::<Vec<_>>();
                Ok(lines.join("\n"))
            }
            Command::Report { json: false } => Ok(self.registry.report()),
            Command::Report { json: true } => {
                let stats = self.registry.relay_stats();
                serde_json::to_string_pretty(&stats)
                    .map_err(|e| RelayError::Other(anyhow::Error::from(e)))
            }
            Command::Acceptors => Ok(self
                .registry
                .acceptor_stats()
                .iter()
                .map(|s| s.list_line())
                .collect::<Vec<_>>()
                .join("\n")),
            Command::GetCode => Ok(self.registry.code_snippet()),
            Command::Help => Ok(HELP_TEXT.to_string()),
            Command::Exit => {
                self.registry.request_exit();
                Ok("exiting".to_string())
            }
        }
    }

    /// `server` 可带端口；名称保持输入原样
    async fn add_relay(&self, server: &str) -> Result<String> {
        let (host, port) = split_host_port(server, self.registry.settings().target_port)?;
        // 端口在解析之前取出，解析失败也会消耗
        let listen_port = self.registry.take_port()?;
        let ip = self.resolver.resolve(host).await?;
        let target = SocketAddr::new(ip, port);
        let acceptor = self
            .registry
            .add_acceptor_on(server, listen_port, target)
            .await?;
        Ok(format!(
            "Acceptor active on {}, relaying to {}",
            acceptor.listen_port(),
            server
        ))
    }

    fn live_relays(&self, selector: &Selector) -> Vec<Arc<Relay>> {
        selector
            .filter(self.registry.relays(), |r| r.name())
            .into_iter()
            .filter(|r| !r.is_stopped())
            .collect()
    }
}

/// 拆分 `host[:port]`，IPv6 字面量需写成 `[addr]:port`
fn split_host_port(server: &str, default_port: u16) -> Result<(&str, u16)> {
    if let Some(rest) = server.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| RelayError::usage("addrelay <server[:port]>"))?;
        return match tail.strip_prefix(':') {
            Some(port) => Ok((host, parse_target_port(port)?)),
            None if tail.is_empty() => Ok((host, default_port)),
            None => Err(RelayError::usage("addrelay <server[:port]>")),
        };
    }
    match server.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => Ok((host, parse_target_port(port)?)),
        _ => Ok((server, default_port)),
    }
}

fn parse_target_port(text: &str) -> Result<u16> {
    match text.parse::<u16>() {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(RelayError::usage("addrelay <server[:port]>, port in 1-65535")),
    }
}
