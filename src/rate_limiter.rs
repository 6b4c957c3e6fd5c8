/// 速率限制器模块
///
/// 统计尾随时间窗口内已写出的字节数，并在设置了上限时推迟写入。
/// 窗口内预算为 `cap * window`，预算耗尽后写方等待最早的样本过期，
/// 因此长期平均速率受限，短时间内允许突发。
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// 默认统计窗口
pub const DEFAULT_RATE_WINDOW: Duration = Duration::from_secs(1);

/// 相邻写入合并到同一个样本的时间粒度（限制样本数量）
const SAMPLE_BUCKET: Duration = Duration::from_millis(50);

/// 单次等待的最长时间，之后重新检查上限（上限可能被控制面修改）
const MAX_THROTTLE_SLEEP: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy)]
struct Sample {
    at: Instant,
    bytes: u64,
}

/// 单方向的字节速率限制器
#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    /// 每秒字节数上限，0 表示不限速
    cap: AtomicU64,
    samples: Mutex<VecDeque<Sample>>,
}

impl RateLimiter {
    /// 创建新的速率限制器
    pub fn new(window: Duration, bytes_per_second: u64) -> Self {
        Self {
            window: window.max(SAMPLE_BUCKET),
            cap: AtomicU64::new(bytes_per_second),
            samples: Mutex::new(VecDeque::new()),
        }
    }

    /// 创建不限速、默认窗口的限制器
    pub fn unlimited() -> Self {
        Self::new(DEFAULT_RATE_WINDOW, 0)
    }

    /// 统计窗口长度
    pub fn window(&self) -> Duration {
        self.window
    }

    /// 当前上限（字节/秒）
    pub fn cap(&self) -> u64 {
        self.cap.load(Ordering::Relaxed)
    }

    /// 修改上限，0 关闭限速
    pub fn set_cap(&self, bytes_per_second: u64) {
        self.cap.store(bytes_per_second, Ordering::Relaxed);
    }

    /// 记录一次已完成的写入
    pub fn record(&self, bytes: usize) {
        self.record_at(Instant::now(), bytes);
    }

    /// 尾随窗口内观察到的速率（字节/秒）
    pub fn current_rate(&self) -> u64 {
        self.rate_at(Instant::now())
    }

    /// 尝试获取写入预算（非阻塞）
    /// 返回 Ok(n) 表示允许立即写入 n 字节（n <= want），否则返回 Err(Duration) 表示需要等待的时间
    pub fn check(&self, want: usize) -> Result<usize, Duration> {
        self.check_at(Instant::now(), want)
    }

    /// 异步等待直到可以写入，返回本次允许写入的字节数
    pub async fn acquire(&self, want: usize) -> usize {
        loop {
            match self.check(want) {
                Ok(n) => return n,
                Err(wait_time) => {
                    tokio::time::sleep(wait_time.min(MAX_THROTTLE_SLEEP)).await;
                }
            }
        }
    }

    fn budget(&self, cap: u64) -> u64 {
        let budget = u128::from(cap) * self.window.as_millis() / 1000;
        u64::try_from(budget).unwrap_or(u64::MAX).max(1)
    }

    fn record_at(&self, now: Instant, bytes: usize) {
        if bytes == 0 {
            return;
        }
        let bytes = bytes as u64;
        let mut samples = self.samples.lock();
        prune(&mut samples, now, self.window);
        match samples.back_mut() {
            Some(last) if now.saturating_duration_since(last.at) < SAMPLE_BUCKET => {
                last.bytes = last.bytes.saturating_add(bytes);
            }
            _ => samples.push_back(Sample { at: now, bytes }),
        }
    }

    fn rate_at(&self, now: Instant) -> u64 {
        let mut samples = self.samples.lock();
        prune(&mut samples, now, self.window);
        let sent: u64 = samples.iter().map(|s| s.bytes).sum();
        let window_ms = self.window.as_millis().max(1);
        u64::try_from(u128::from(sent) * 1000 / window_ms).unwrap_or(u64::MAX)
    }

    fn check_at(&self, now: Instant, want: usize) -> Result<usize, Duration> {
        let cap = self.cap();
        if cap == 0 || want == 0 {
            return Ok(want);
        }

        let budget = self.budget(cap);
        let mut samples = self.samples.lock();
        prune(&mut samples, now, self.window);
        let sent: u64 = samples.iter().map(|s| s.bytes).sum();

        if sent < budget {
            let free = budget - sent;
            return Ok(want.min(usize::try_from(free).unwrap_or(usize::MAX)));
        }

        // 找到最早一个过期后能让窗口回到预算以内的样本
        let mut remaining = sent;
        for sample in samples.iter() {
            remaining -= sample.bytes;
            if remaining < budget {
                let expires = sample.at + self.window;
                return Err(expires
                    .saturating_duration_since(now)
                    .max(Duration::from_millis(1)));
            }
        }
        Err(self.window)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::unlimited()
    }
}

fn prune(samples: &mut VecDeque<Sample>, now: Instant, window: Duration) {
    while let Some(front) = samples.front() {
        if now.saturating_duration_since(front.at) >= window {
            samples.pop_front();
        } else {
            break;
        }
    }
}
