use crate::rate_limiter::RateLimiter;
use crate::transport::LegSide;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::watch;

/// Relay 的一侧
///
/// 计数和限速都针对“写入本侧连接”的字节：
/// 客户端侧统计下行（服务器 → 客户端），服务器侧统计上行
#[derive(Debug)]
pub struct Leg {
    side: LegSide,
    total_bytes: AtomicU64,
    limiter: RateLimiter,
    paused: watch::Sender<bool>,
}

impl Leg {
    pub fn new(side: LegSide, window: Duration, bytes_per_second: u64) -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            side,
            total_bytes: AtomicU64::new(0),
            limiter: RateLimiter::new(window, bytes_per_second),
            paused,
        }
    }

    pub fn side(&self) -> LegSide {
        self.side
    }

    /// 累计写入字节数（只增不减）
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes.load(Ordering::Relaxed)
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    /// 设置暂停状态，返回状态是否发生变化
    pub fn set_paused(&self, paused: bool) -> bool {
        self.paused.send_if_modified(|current| {
            if *current == paused {
                false
            } else {
                *current = paused;
                true
            }
        })
    }

    /// 等待直到本侧未暂停
    pub(crate) async fn wait_resumed(&self) {
        let mut rx = self.paused.subscribe();
        // Sender 与 Leg 同生命周期，wait_for 不会因通道关闭而失败
        let _ = rx.wait_for(|paused| !*paused).await;
    }

    /// 等待直到本侧被暂停
    pub(crate) async fn wait_paused(&self) {
        let mut rx = self.paused.subscribe();
        let _ = rx.wait_for(|paused| *paused).await;
    }

    pub(crate) fn record(&self, bytes: usize) {
        self.limiter.record(bytes);
        self.total_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leg_counters() {
        let leg = Leg::new(LegSide::Client, Duration::from_secs(1), 0);
        assert_eq!(leg.side(), LegSide::Client);
        assert_eq!(leg.total_bytes(), 0);

        leg.record(100);
        leg.record(23);
        assert_eq!(leg.total_bytes(), 123);
        assert_eq!(leg.limiter().current_rate(), 123);
    }

    #[test]
    fn test_set_paused_reports_change() {
        let leg = Leg::new(LegSide::Server, Duration::from_secs(1), 0);
        assert!(!leg.is_paused());
        assert!(leg.set_paused(true));
        assert!(!leg.set_paused(true));
        assert!(leg.is_paused());
        assert!(leg.set_paused(false));
    }

    #[tokio::test]
    async fn test_wait_resumed() {
        let leg = std::sync::Arc::new(Leg::new(LegSide::Server, Duration::from_secs(1), 0));
        leg.set_paused(true);

        let waiter = {
            let leg = leg.clone();
            tokio::spawn(async move { leg.wait_resumed().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        leg.set_paused(false);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake after resume")
            .unwrap();
    }
}
