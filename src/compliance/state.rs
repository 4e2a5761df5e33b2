//! 合规状态机
//!
//! ACTIVE/PAUSED 两态；暂停到期靠惰性时钟比较解除，
//! 日计数在自然日边界重置，但不打断进行中的暂停

use chrono::NaiveDate;
use std::collections::HashMap;
use tokio::time::{Duration, Instant};

use crate::core::config::ComplianceConfig;
use crate::core::types::StrategyKey;

use super::rate_window::RateWindow;

/// 熔断暂停时长（秒）：基础时长按当日已有违规次数翻倍，封顶
///
/// 纯函数，和状态机解耦便于单测
pub fn escalated_pause_seconds(base: f64, max: f64, prior_violations: u32) -> f64 {
    // 指数封顶，避免移位溢出
    let exponent = prior_violations.min(16);
    (base * f64::powi(2.0, exponent as i32)).min(max)
}

/// 进程生命周期内的合规可变状态
///
/// 所有字段只在控制器的单把互斥锁内读写
#[derive(Debug)]
pub struct ComplianceState {
    pub paused: bool,
    pub pause_until: Option<Instant>,
    /// 最近一次熔断的暂停时长
    pub current_pause: Duration,
    pub violations_today: u32,
    pub daily_count: u64,
    pub user_counts: HashMap<String, u64>,
    pub strategy_counts: HashMap<StrategyKey, u64>,
    /// 计数器归属的自然日（UTC）
    pub counter_day: NaiveDate,
    pub window: RateWindow,
}

impl ComplianceState {
    pub fn new(config: &ComplianceConfig, today: NaiveDate) -> Self {
        Self {
            paused: false,
            pause_until: None,
            current_pause: Duration::ZERO,
            violations_today: 0,
            daily_count: 0,
            user_counts: HashMap::new(),
            strategy_counts: HashMap::new(),
            counter_day: today,
            window: RateWindow::new(config.rate_window_seconds, config.rate_window_capacity),
        }
    }

    /// 跨日时重置日计数与违规计数，返回是否发生了重置
    ///
    /// 不清除进行中的暂停，窗口按时间自行裁剪
    pub fn roll_day_if_needed(&mut self, today: NaiveDate) -> bool {
        if today == self.counter_day {
            return false;
        }
        self.counter_day = today;
        self.reset_daily();
        true
    }

    /// 清空日/用户/策略计数与违规计数
    pub fn reset_daily(&mut self) {
        self.daily_count = 0;
        self.user_counts.clear();
        self.strategy_counts.clear();
        self.violations_today = 0;
    }

    /// 触发熔断：升级暂停时长并进入 PAUSED，返回本次暂停秒数
    pub fn trip(&mut self, now: Instant, config: &ComplianceConfig) -> f64 {
        let pause_seconds = escalated_pause_seconds(
            config.base_pause_seconds,
            config.max_pause_seconds,
            self.violations_today,
        );
        self.violations_today += 1;
        self.current_pause = Duration::from_secs_f64(pause_seconds);
        self.pause_until = Some(now + self.current_pause);
        self.paused = true;
        pause_seconds
    }

    /// 暂停剩余秒数，未暂停或已到期返回0
    pub fn pause_remaining(&self, now: Instant) -> f64 {
        match self.pause_until {
            Some(until) if self.paused => until.saturating_duration_since(now).as_secs_f64(),
            _ => 0.0,
        }
    }

    /// 惰性解除已到期的暂停，返回是否发生了恢复
    pub fn resume_if_expired(&mut self, now: Instant) -> bool {
        if self.paused && self.pause_remaining(now) <= 0.0 {
            self.paused = false;
            self.pause_until = None;
            return true;
        }
        false
    }

    /// 记录一笔已提交的交易
    pub fn record(&mut self, now: Instant, user_id: &str, strategy: StrategyKey) {
        self.window.record(now);
        self.daily_count += 1;
        *self.user_counts.entry(user_id.to_string()).or_insert(0) += 1;
        *self.strategy_counts.entry(strategy).or_insert(0) += 1;
    }
}
