/// 进程级注册表：所有 acceptor 和 relay
///
/// 两个集合共用一把锁且只增不减；控制操作先在锁内取快照，释放锁后再逐个操作
use crate::acceptor::{Acceptor, RelaySink};
use crate::config::RelaySettings;
use crate::error::{RelayError, Result};
use crate::relay::Relay;
use crate::stats::{AcceptorStats, RelayStats, StatsSummary};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Default)]
struct Collections {
    acceptors: Vec<Arc<Acceptor>>,
    relays: Vec<Arc<Relay>>,
}

pub struct Registry {
    settings: RelaySettings,
    collections: Mutex<Collections>,
    /// 超过 65535 表示端口已用尽
    next_port: AtomicU32,
    exit_requested: AtomicBool,
}

impl Registry {
    pub fn new(settings: RelaySettings) -> Arc<Self> {
        Arc::new(Self {
            next_port: AtomicU32::new(u32::from(settings.first_port)),
            settings,
            collections: Mutex::new(Collections::default()),
            exit_requested: AtomicBool::new(false),
        })
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    /// 下一个 addrelay 将使用的端口，用尽后为 None
    pub fn next_port(&self) -> Option<u16> {
        match u16::try_from(self.next_port.load(Ordering::Relaxed)) {
            Ok(0) | Err(_) => None,
            Ok(port) => Some(port),
        }
    }

    pub fn set_next_port(&self, port: u16) {
        self.next_port.store(u32::from(port), Ordering::Relaxed);
    }

    /// 取出当前端口并把计数器加一（不检测端口是否空闲）
    ///
    /// 65535 之后不会回绕到 0，直到 `set_next_port` 重新设置
    pub fn take_port(&self) -> Result<u16> {
        self.next_port
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |port| {
                (1..=u32::from(u16::MAX))
                    .contains(&port)
                    .then_some(port + 1)
            })
            .ok()
            .and_then(|port| u16::try_from(port).ok())
            .ok_or_else(|| {
                RelayError::usage("no listening ports left, choose one with nextport <port>")
            })
    }

    /// Create an acceptor on the next port and start it.
    ///
    /// The port counter advances even when binding fails; a failed acceptor is
    /// not registered.
    pub async fn add_acceptor(
        self: &Arc<Self>,
        name: &str,
        target: SocketAddr,
    ) -> Result<Arc<Acceptor>> {
        let port = self.take_port()?;
        self.add_acceptor_on(name, port, target).await
    }

    /// 在已取出的端口上创建并启动 acceptor
    pub async fn add_acceptor_on(
        self: &Arc<Self>,
        name: &str,
        port: u16,
        target: SocketAddr,
    ) -> Result<Arc<Acceptor>> {
        let listen_addr = SocketAddr::new(self.settings.bind_addr, port);

        let registry: Weak<Registry> = Arc::downgrade(self);
        let sink: RelaySink = Arc::new(move |relay| {
            if let Some(registry) = registry.upgrade() {
                registry.publish_relay(relay);
            }
        });

        let acceptor = Acceptor::new(
            name,
            listen_addr,
            target,
            self.settings.relay_options(),
            sink,
        );
        acceptor.start().await?;

        let index = {
            let mut collections = self.collections.lock();
            collections.acceptors.push(Arc::clone(&acceptor));
            collections.acceptors.len() - 1
        };
        debug!("Acceptor '{}' registered as #{}", name, index);
        Ok(acceptor)
    }

    /// Register a relay spawned by one of the acceptors.
    pub fn publish_relay(&self, relay: Arc<Relay>) {
        let name = relay.name().to_string();
        let index = {
            let mut collections = self.collections.lock();
            collections.relays.push(relay);
            collections.relays.len() - 1
        };
        info!("{} relay is #{}", name, index);
    }

    pub fn acceptors(&self) -> Vec<Arc<Acceptor>> {
        self.collections.lock().acceptors.clone()
    }

    pub fn relays(&self) -> Vec<Arc<Relay>> {
        self.collections.lock().relays.clone()
    }

    /// 一致的快照：在锁内读取所有 relay 的计数
    pub fn relay_stats(&self) -> Vec<RelayStats> {
        let collections = self.collections.lock();
        collections.relays.iter().map(|r| r.snapshot()).collect()
    }

    pub fn acceptor_stats(&self) -> Vec<AcceptorStats> {
        let collections = self.collections.lock();
        collections.acceptors.iter().map(|a| a.snapshot()).collect()
    }

    pub fn summary(&self) -> StatsSummary {
        StatsSummary::from_relays(&self.relay_stats())
    }

    /// One line per relay, in creation order.
    pub fn report(&self) -> String {
        self.relay_stats()
            .iter()
            .map(|s| s.report_line())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// 客户端重定向代码：把每个 acceptor 的名称替换为本地端口
    pub fn code_snippet(&self) -> String {
        let collections = self.collections.lock();
        let mut lines: Vec<String> = collections
            .acceptors
            .iter()
            .map(|a| {
                format!(
                    "pieceUrl = pieceUrl.replace(\"{}\", \"localhost:{}\");",
                    a.name(),
                    a.listen_port()
                )
            })
            .collect();
        lines.push("pieceUrl = pieceUrl.replace(\"https:\", \"http:\");".to_string());
        lines.join("\n")
    }

    /// 停止所有 acceptor，返回实际停止的数量
    pub fn stop_all_acceptors(&self) -> usize {
        self.acceptors().iter().filter(|a| a.stop()).count()
    }

    pub fn request_exit(&self) {
        if !self.exit_requested.swap(true, Ordering::AcqRel) {
            info!("Exit requested");
        }
    }

    pub fn exit_requested(&self) -> bool {
        self.exit_requested.load(Ordering::Acquire)
    }

    /// 周期性输出汇总统计，直到 `cancel` 被触发
    pub async fn run_stats_logger(self: Arc<Self>, interval: Duration, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(interval) => {
                    info!("{}", self.summary());
                }
            }
        }
        debug!("Stats logger stopped");
    }
}
