/// Relay 运行时
///
/// 所有 socket I/O 和统计日志都运行在 `relays` 线程上的单线程 tokio 运行时中，
/// 控制台线程通过 [`RelayRunner::block_on`] 把任务交给它
use crate::config::AppConfig;
use crate::control::ControlPlane;
use crate::error::{RelayError, Result};
use crate::registry::Registry;
use crate::resolver::{Resolver, SystemResolver};
use std::future::Future;
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::runtime::{Builder, Handle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct RelayRunner {
    registry: Arc<Registry>,
    control: ControlPlane,
    handle: Handle,
    cancel: CancellationToken,
    thread: Option<JoinHandle<()>>,
}

impl RelayRunner {
    /// 使用配置中的 `[hosts]` 覆盖创建系统解析器并启动
    pub fn start(config: AppConfig) -> Result<Self> {
        let resolver = SystemResolver::with_overrides(config.hosts.clone());
        Self::start_with_resolver(config, Arc::new(resolver))
    }

    pub fn start_with_resolver(config: AppConfig, resolver: Arc<dyn Resolver>) -> Result<Self> {
        config
            .validate()
            .map_err(|e| RelayError::config_error(format!("{:#}", e)))?;

        let runtime = Builder::new_current_thread().enable_all().build()?;
        let handle = runtime.handle().clone();
        let cancel = CancellationToken::new();

        let registry = Registry::new(config.relay.clone());
        let control = ControlPlane::new(Arc::clone(&registry), resolver);

        handle.spawn(
            Arc::clone(&registry).run_stats_logger(config.relay.stats_interval(), cancel.clone()),
        );

        // Ctrl+C 只设置退出标志，由控制台负责关闭
        let signal_registry = Arc::clone(&registry);
        let signal_cancel = cancel.clone();
        handle.spawn(async move {
            tokio::select! {
                _ = signal_cancel.cancelled() => {}
                result = tokio::signal::ctrl_c() => match result {
                    Ok(()) => signal_registry.request_exit(),
                    Err(e) => warn!("Failed to listen for Ctrl+C: {}", e),
                },
            }
        });

        let park = cancel.clone();
        let thread = std::thread::Builder::new()
            .name("relays".to_string())
            .spawn(move || {
                runtime.block_on(park.cancelled());
                debug!("Relay runtime stopping");
                // runtime 在此 drop，仍在运行的 relay 随之被放弃
            })?;

        info!(
            "Relay runtime started (first port {}, target port {})",
            config.relay.first_port, config.relay.target_port
        );

        Ok(Self {
            registry,
            control,
            handle,
            cancel,
            thread: Some(thread),
        })
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn control(&self) -> &ControlPlane {
        &self.control
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// 在 relay 运行时上执行 `future` 并等待结果（不能在运行时线程内调用）
    pub fn block_on<F, T>(&self, future: F) -> Result<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        if !self.is_running() {
            return Err(RelayError::RuntimeUnavailable);
        }
        let task = self.handle.spawn(future);
        futures::executor::block_on(task).map_err(|e| {
            debug!("Relay runtime task failed: {}", e);
            RelayError::RuntimeUnavailable
        })
    }

    /// 执行一行控制命令，返回要显示的文本
    pub fn execute_line(&self, line: &str) -> String {
        let control = self.control.clone();
        let line = line.to_string();
        self.block_on(async move { control.execute_line(&line).await })
            .unwrap_or_else(|e| e.to_string())
    }

    /// 停止接受新连接，结束日志任务并等待运行时线程退出
    pub fn shutdown(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        let stopped = self.registry.stop_all_acceptors();
        debug!("Stopped {} acceptors", stopped);
        self.cancel.cancel();
        if thread.join().is_err() {
            warn!("Relay runtime thread panicked");
        }
        info!("Relay runtime stopped");
    }
}

impl Drop for RelayRunner {
    fn drop(&mut self) {
        self.shutdown();
    }
}
