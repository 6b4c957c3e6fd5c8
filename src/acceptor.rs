/// Acceptor 模块
///
/// 每个入站连接依次经过：接受、连接固定目标、通过注册回调发布 [`Relay`]。
/// 任一阶段失败只结束这一个连接，acceptor 继续监听。
use crate::error::{RelayError, Result};
use crate::relay::{Relay, RelayOptions};
use crate::stats::AcceptorStats;
use parking_lot::Mutex;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Registration callback receiving every started relay.
pub type RelaySink = Arc<dyn Fn(Arc<Relay>) + Send + Sync>;

/// Acceptor 生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptorState {
    /// 已创建，尚未监听
    Idle,
    Listening,
    /// 已停止接受新连接（可以重新启动）
    Stopped,
}

impl fmt::Display for AcceptorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcceptorState::Idle => write!(f, "idle"),
            AcceptorState::Listening => write!(f, "listening"),
            AcceptorState::Stopped => write!(f, "stopped"),
        }
    }
}

struct Lifecycle {
    state: AcceptorState,
    cancel: CancellationToken,
    accept_task: Option<JoinHandle<()>>,
}

pub struct Acceptor {
    name: String,
    listen_addr: SocketAddr,
    /// 监听器实际绑定的端口，未绑定时为 0
    bound_port: AtomicU16,
    target: SocketAddr,
    lifecycle: Mutex<Lifecycle>,
    relays_spawned: AtomicU64,
    default_bytes_per_second: AtomicU64,
    relay_options: RelayOptions,
    sink: RelaySink,
    created_at: Instant,
}

impl Acceptor {
    pub fn new(
        name: impl Into<String>,
        listen_addr: SocketAddr,
        target: SocketAddr,
        relay_options: RelayOptions,
        sink: RelaySink,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            listen_addr,
            bound_port: AtomicU16::new(0),
            target,
            lifecycle: Mutex::new(Lifecycle {
                state: AcceptorState::Idle,
                cancel: CancellationToken::new(),
                accept_task: None,
            }),
            relays_spawned: AtomicU64::new(0),
            default_bytes_per_second: AtomicU64::new(relay_options.bytes_per_second),
            relay_options,
            sink,
            created_at: Instant::now(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 实际监听的端口（配置为 0 时由系统分配）
    pub fn listen_port(&self) -> u16 {
        match self.bound_port.load(Ordering::Relaxed) {
            0 => self.listen_addr.port(),
            port => port,
        }
    }

    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    pub fn state(&self) -> AcceptorState {
        self.lifecycle.lock().state
    }

    pub fn relays_spawned(&self) -> u64 {
        self.relays_spawned.load(Ordering::Relaxed)
    }

    /// Cap given to relays spawned after this call; existing relays keep theirs.
    pub fn set_bytes_per_second(&self, bytes_per_second: u64) {
        self.default_bytes_per_second
            .store(bytes_per_second, Ordering::Relaxed);
        debug!(
            "Acceptor '{}' default speed set to {} bytes/s",
            self.name, bytes_per_second
        );
    }

    pub fn bytes_per_second(&self) -> u64 {
        self.default_bytes_per_second.load(Ordering::Relaxed)
    }

    /// Bind the listening port and start accepting. Also restarts a stopped acceptor.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let previous = {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.state == AcceptorState::Listening {
                return Err(RelayError::invalid_state(format!(
                    "acceptor '{}' is already listening",
                    self.name
                )));
            }
            lifecycle.accept_task.take()
        };
        // 等待上一轮监听任务释放端口
        if let Some(task) = previous {
            let _ = task.await;
        }

        let listener = TcpListener::bind(self.listen_addr)
            .await
            .map_err(|e| RelayError::listen_failed(self.listen_addr, e))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| RelayError::listen_failed(self.listen_addr, e))?;
        self.bound_port.store(local_addr.port(), Ordering::Relaxed);

        let cancel = CancellationToken::new();
        {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.state == AcceptorState::Listening {
                return Err(RelayError::invalid_state(format!(
                    "acceptor '{}' is already listening",
                    self.name
                )));
            }
            lifecycle.state = AcceptorState::Listening;
            lifecycle.cancel = cancel.clone();
            lifecycle.accept_task = Some(tokio::spawn(
                Arc::clone(self).accept_loop(listener, cancel),
            ));
        }

        info!(
            "Acceptor '{}' listening on {}, relaying to {}",
            self.name, local_addr, self.target
        );
        Ok(())
    }

    /// Stop accepting new connections. Relays already spawned are unaffected.
    ///
    /// Returns false when the acceptor was not listening.
    pub fn stop(&self) -> bool {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.state != AcceptorState::Listening {
            return false;
        }
        lifecycle.state = AcceptorState::Stopped;
        lifecycle.cancel.cancel();
        true
    }

    pub fn snapshot(&self) -> AcceptorStats {
        AcceptorStats {
            name: self.name.clone(),
            listen_port: self.listen_port(),
            target: self.target.to_string(),
            state: self.state().to_string(),
            relays_spawned: self.relays_spawned(),
            default_bytes_per_second: self.bytes_per_second(),
            uptime_secs: self.created_at.elapsed().as_secs(),
        }
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((inbound, peer_addr)) => {
                            debug!("Acceptor '{}': accepted connection from {}", self.name, peer_addr);
                            tokio::spawn(Arc::clone(&self).connect_and_publish(inbound, peer_addr));
                        }
                        Err(e) => {
                            error!("Acceptor '{}': accept error: {}", self.name, e);
                            sleep(Duration::from_millis(100)).await;
                        }
                    }
                }
            }
        }
        info!(
            "Acceptor '{}' stopped listening on {}",
            self.name, self.listen_addr
        );
    }

    async fn connect_and_publish(self: Arc<Self>, inbound: TcpStream, peer_addr: SocketAddr) {
        let outbound = match TcpStream::connect(self.target).await {
            Ok(stream) => stream,
            Err(e) => {
                // inbound 在此处被 drop，客户端看到连接关闭
                warn!(
                    "Acceptor '{}': dropping connection from {}: {}",
                    self.name,
                    peer_addr,
                    RelayError::connect_failed(self.target, e)
                );
                return;
            }
        };

        for stream in [&inbound, &outbound] {
            if let Err(e) = stream.set_nodelay(true) {
                warn!("Failed to set TCP_NODELAY: {}", e);
            }
        }

        let seq = self.relays_spawned.fetch_add(1, Ordering::Relaxed) + 1;
        let options = RelayOptions {
            bytes_per_second: self.bytes_per_second(),
            ..self.relay_options.clone()
        };
        let relay = Relay::new(format!("{}/{}", self.name, seq), inbound, outbound, &options);
        if let Err(e) = relay.start() {
            warn!("Acceptor '{}': {}", self.name, e);
            return;
        }

        (self.sink)(relay);
    }
}

impl fmt::Debug for Acceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Acceptor")
            .field("name", &self.name)
            .field("listen_addr", &self.listen_addr)
            .field("target", &self.target)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::time::timeout;

    fn free_port() -> u16 {
        std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    fn local(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    async fn echo_server() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let (mut r, mut w) = socket.split();
                    let _ = tokio::io::copy(&mut r, &mut w).await;
                });
            }
        });
        addr
    }

    fn collecting_sink() -> (RelaySink, Arc<Mutex<Vec<Arc<Relay>>>>) {
        let relays = Arc::new(Mutex::new(Vec::new()));
        let store = Arc::clone(&relays);
        let sink: RelaySink = Arc::new(move |relay| store.lock().push(relay));
        (sink, relays)
    }

    async fn wait_for_relays(relays: &Mutex<Vec<Arc<Relay>>>, count: usize) {
        for _ in 0..200 {
            if relays.lock().len() >= count {
                return;
            }
            sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {} relays", count);
    }

    #[tokio::test]
    async fn test_accept_connect_publish() {
        let target = echo_server().await;
        let port = free_port();
        let (sink, relays) = collecting_sink();
        let acceptor = Acceptor::new("host1", local(port), target, RelayOptions::default(), sink);

        acceptor.start().await.unwrap();
        assert_eq!(acceptor.state(), AcceptorState::Listening);

        let mut client = TcpStream::connect(local(port)).await.unwrap();
        client.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        timeout(Duration::from_secs(2), client.read_exact(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf, b"ping");

        wait_for_relays(&relays, 1).await;
        assert_eq!(relays.lock()[0].name(), "host1/1");
        assert_eq!(acceptor.relays_spawned(), 1);
    }

    #[tokio::test]
    async fn test_listen_port_reports_bound_port() {
        let target = echo_server().await;
        let (sink, relays) = collecting_sink();
        let acceptor = Acceptor::new("any", local(0), target, RelayOptions::default(), sink);
        assert_eq!(acceptor.listen_port(), 0);

        acceptor.start().await.unwrap();
        let port = acceptor.listen_port();
        assert_ne!(port, 0);
        assert_eq!(acceptor.snapshot().listen_port, port);

        let _client = TcpStream::connect(local(port)).await.unwrap();
        wait_for_relays(&relays, 1).await;
    }

    #[tokio::test]
    async fn test_connect_failure_keeps_accepting() {
        let dead_target = local(free_port());
        let port = free_port();
        let (sink, relays) = collecting_sink();
        let acceptor = Acceptor::new("dead", local(port), dead_target, RelayOptions::default(), sink);
        acceptor.start().await.unwrap();

        for _ in 0..2 {
            let mut client = TcpStream::connect(local(port)).await.unwrap();
            let mut buf = [0u8; 1];
            let result = timeout(Duration::from_secs(2), client.read(&mut buf))
                .await
                .expect("inbound connection should be closed");
            assert!(matches!(result, Ok(0) | Err(_)));
        }

        assert!(relays.lock().is_empty());
        assert_eq!(acceptor.state(), AcceptorState::Listening);
        assert_eq!(acceptor.relays_spawned(), 0);
    }

    #[tokio::test]
    async fn test_stop_keeps_existing_relays() {
        let target = echo_server().await;
        let port = free_port();
        let (sink, relays) = collecting_sink();
        let acceptor = Acceptor::new("host1", local(port), target, RelayOptions::default(), sink);
        acceptor.start().await.unwrap();

        let mut client = TcpStream::connect(local(port)).await.unwrap();
        wait_for_relays(&relays, 1).await;

        assert!(acceptor.stop());
        assert!(!acceptor.stop());
        assert_eq!(acceptor.state(), AcceptorState::Stopped);
        sleep(Duration::from_millis(50)).await;
        assert!(TcpStream::connect(local(port)).await.is_err());

        // 已建立的 relay 继续工作
        client.write_all(b"still").await.unwrap();
        let mut buf = [0u8; 5];
        timeout(Duration::from_secs(2), client.read_exact(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf, b"still");
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let target = echo_server().await;
        let port = free_port();
        let (sink, relays) = collecting_sink();
        let acceptor = Acceptor::new("host1", local(port), target, RelayOptions::default(), sink);

        acceptor.start().await.unwrap();
        assert!(acceptor.start().await.is_err());
        acceptor.stop();
        acceptor.start().await.unwrap();

        let _client = TcpStream::connect(local(port)).await.unwrap();
        wait_for_relays(&relays, 1).await;
    }

    #[tokio::test]
    async fn test_listen_failure() {
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = occupied.local_addr().unwrap().port();
        let (sink, _relays) = collecting_sink();
        let acceptor = Acceptor::new("busy", local(port), local(1), RelayOptions::default(), sink);

        let err = acceptor.start().await.unwrap_err();
        assert!(err.is_listen_failed());
        assert_eq!(acceptor.state(), AcceptorState::Idle);
    }

    #[tokio::test]
    async fn test_default_speed_applies_to_new_relays() {
        let target = echo_server().await;
        let port = free_port();
        let (sink, relays) = collecting_sink();
        let acceptor = Acceptor::new("host1", local(port), target, RelayOptions::default(), sink);
        acceptor.start().await.unwrap();

        let _first = TcpStream::connect(local(port)).await.unwrap();
        wait_for_relays(&relays, 1).await;

        acceptor.set_bytes_per_second(2048);
        let _second = TcpStream::connect(local(port)).await.unwrap();
        wait_for_relays(&relays, 2).await;

        let relays = relays.lock();
        assert_eq!(relays[0].bytes_per_second(), 0);
        assert_eq!(relays[1].bytes_per_second(), 2048);
        assert_eq!(relays[1].name(), "host1/2");
    }
}
