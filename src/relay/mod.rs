mod forward;
mod leg;

pub use forward::READ_CHUNK_SIZE;
pub use leg::Leg;

use crate::error::{RelayError, Result};
use crate::rate_limiter::DEFAULT_RATE_WINDOW;
use crate::stats::RelayStats;
use crate::transport::{BoxedTransport, LegSide, Transport};
use forward::{forward, hold_capacity};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// 暂存缓冲区默认大小
pub const DEFAULT_HOLD_BUFFER_BYTES: usize = 256 * 1024;

/// 新建 Relay 的参数
#[derive(Debug, Clone)]
pub struct RelayOptions {
    /// 速率统计窗口
    pub rate_window: Duration,
    /// 两个方向的初始上限（字节/秒，0 不限速）
    pub bytes_per_second: u64,
    /// 每个方向暂存数据的上限
    pub hold_buffer_bytes: usize,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            rate_window: DEFAULT_RATE_WINDOW,
            bytes_per_second: 0,
            hold_buffer_bytes: DEFAULT_HOLD_BUFFER_BYTES,
        }
    }
}

/// 一条端到端的代理连接
///
/// 由两条已连接的字节流构造，`start()` 后启动上行和下行两个转发任务。
/// 任一方向读到 EOF 或出错都会结束整个 Relay；停止是单向的，不能重新启动。
pub struct Relay {
    name: String,
    created_at: Instant,
    client: Leg,
    server: Leg,
    stopped: AtomicBool,
    cancel: CancellationToken,
    endpoints: Mutex<Option<(BoxedTransport, BoxedTransport)>>,
    hold_chunks: usize,
}

impl Relay {
    /// 用面向客户端和面向服务器的两条连接创建 Relay（尚未开始转发）
    pub fn new(
        name: impl Into<String>,
        client: impl Transport,
        server: impl Transport,
        options: &RelayOptions,
    ) -> Arc<Self> {
        let client: BoxedTransport = Box::new(client);
        let server: BoxedTransport = Box::new(server);
        Arc::new(Self {
            name: name.into(),
            created_at: Instant::now(),
            client: Leg::new(
                LegSide::Client,
                options.rate_window,
                options.bytes_per_second,
            ),
            server: Leg::new(
                LegSide::Server,
                options.rate_window,
                options.bytes_per_second,
            ),
            stopped: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            endpoints: Mutex::new(Some((client, server))),
            hold_chunks: hold_capacity(options.hold_buffer_bytes),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn leg(&self, side: LegSide) -> &Leg {
        match side {
            LegSide::Client => &self.client,
            LegSide::Server => &self.server,
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// 任一方向暂停即视为暂停
    pub fn is_paused(&self) -> bool {
        self.client.is_paused() || self.server.is_paused()
    }

    /// 启动两个方向的转发（必须在 tokio 运行时中调用）
    pub fn start(self: &Arc<Self>) -> Result<()> {
        if self.is_stopped() {
            return Err(RelayError::invalid_state(format!(
                "relay '{}' is stopped",
                self.name
            )));
        }
        let (client, server) = self.endpoints.lock().take().ok_or_else(|| {
            RelayError::invalid_state(format!("relay '{}' already started", self.name))
        })?;

        let (client_read, client_write) = tokio::io::split(client);
        let (server_read, server_write) = tokio::io::split(server);

        // 上行：客户端 → 服务器
        let relay = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = relay.cancel.cancelled() => {}
                _ = forward(&relay, client_read, server_write, &relay.server, relay.hold_chunks) => {}
            }
        });

        // 下行：服务器 → 客户端
        let relay = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = relay.cancel.cancelled() => {}
                _ = forward(&relay, server_read, client_write, &relay.client, relay.hold_chunks) => {}
            }
        });

        debug!("Relay '{}' started", self.name);
        Ok(())
    }

    /// 暂停或恢复两个方向，返回是否有方向的状态发生变化
    pub fn pause(&self, paused: bool) -> bool {
        let client_changed = self.client.set_paused(paused);
        let server_changed = self.server.set_paused(paused);
        let changed = client_changed || server_changed;
        if changed {
            info!(
                "Relay '{}' {}",
                self.name,
                if paused { "paused" } else { "resumed" }
            );
        }
        changed
    }

    /// 只暂停或恢复写入 `side` 的方向
    pub fn pause_side(&self, side: LegSide, paused: bool) -> bool {
        let changed = self.leg(side).set_paused(paused);
        if changed {
            info!(
                "Relay '{}' {} direction {}",
                self.name,
                side.direction(),
                if paused { "paused" } else { "resumed" }
            );
        }
        changed
    }

    /// 设置两个方向的速率上限（0 不限速）
    pub fn set_bytes_per_second(&self, bytes_per_second: u64) {
        self.client.limiter().set_cap(bytes_per_second);
        self.server.limiter().set_cap(bytes_per_second);
        debug!(
            "Relay '{}' speed set to {} bytes/s",
            self.name, bytes_per_second
        );
    }

    pub fn bytes_per_second(&self) -> u64 {
        self.client.limiter().cap()
    }

    /// 立即关闭两条连接，不等待在途数据
    ///
    /// 返回 false 表示 Relay 早已停止
    pub fn stop_now(&self) -> bool {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return false;
        }
        info!("Relay '{}' closed", self.name);
        self.cancel.cancel();
        // 尚未启动时直接释放两条连接
        drop(self.endpoints.lock().take());
        true
    }

    /// 转发任务在 EOF 或 I/O 错误时调用
    pub(crate) fn finish(&self, reason: impl fmt::Display) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("Relay '{}' stopped: {}", self.name, reason);
        self.cancel.cancel();
    }

    /// 等待 Relay 停止
    pub async fn stopped(&self) {
        self.cancel.cancelled().await
    }

    /// 计数快照
    pub fn snapshot(&self) -> RelayStats {
        let stopped = self.is_stopped();
        let (upload_rate, download_rate) = if stopped {
            (0, 0)
        } else {
            (
                self.server.limiter().current_rate(),
                self.client.limiter().current_rate(),
            )
        };
        RelayStats {
            name: self.name.clone(),
            bytes_to_client: self.client.total_bytes(),
            bytes_to_server: self.server.total_bytes(),
            upload_rate,
            download_rate,
            bytes_per_second: self.bytes_per_second(),
            stopped,
            paused: self.is_paused(),
            age_secs: self.created_at.elapsed().as_secs(),
        }
    }
}

impl fmt::Debug for Relay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relay")
            .field("name", &self.name)
            .field("stopped", &self.is_stopped())
            .field("paused", &self.is_paused())
            .finish()
    }
}
