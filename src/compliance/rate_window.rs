//! 滑动窗口速率统计
//!
//! 真正的尾随窗口：按时间裁剪而不是对齐到整秒桶，
//! 任意1秒跨度内的突发都能被如实计入

use std::collections::VecDeque;
use tokio::time::{Duration, Instant};

/// 时间裁剪的交易时间戳窗口
///
/// 每次读取前裁剪过期条目，另设容量硬上限防止无界增长
#[derive(Debug)]
pub struct RateWindow {
    samples: VecDeque<Instant>,
    window: Duration,
    capacity: usize,
}

impl RateWindow {
    pub fn new(window_seconds: f64, capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity.min(64)),
            window: Duration::from_secs_f64(window_seconds),
            capacity,
        }
    }

    /// 记录一笔交易的时间戳
    pub fn record(&mut self, now: Instant) {
        self.prune(now);
        if self.samples.len() >= self.capacity {
            // 容量兜底，正常配置下窗口裁剪先行生效
            self.samples.pop_front();
        }
        self.samples.push_back(now);
    }

    /// 裁剪窗口外的过期条目，摊还O(1)
    pub fn prune(&mut self, now: Instant) {
        let Some(cutoff) = now.checked_sub(self.window) else {
            return;
        };
        while let Some(front) = self.samples.front() {
            if *front <= cutoff {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// 窗口内的交易笔数，只读（供快照接口使用）
    pub fn count(&self, now: Instant) -> usize {
        match now.checked_sub(self.window) {
            None => self.samples.len(),
            Some(cutoff) => self
                .samples
                .iter()
                .rev()
                .take_while(|ts| **ts > cutoff)
                .count(),
        }
    }

    /// 当前每秒交易速率
    pub fn tps(&self, now: Instant) -> f64 {
        self.count(now) as f64 / self.window.as_secs_f64()
    }

    pub fn window_seconds(&self) -> f64 {
        self.window.as_secs_f64()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// 预测式速率：假设再放行一笔之后的窗口速率
///
/// 纯函数，准入决策用它在越限之前拦截，而不是事后补救
pub fn predicted_tps(current_count: usize, window_seconds: f64) -> f64 {
    if window_seconds <= 0.0 {
        return f64::INFINITY;
    }
    (current_count as f64 + 1.0) / window_seconds
}
