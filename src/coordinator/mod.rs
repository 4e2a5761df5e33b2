//! 策略协调器
//!
//! 把一批可能互相冲突的候选信号收敛为可安全执行的子集：
//! 标识归一化 -> 市场状态过滤 -> 风格过滤 -> 同标的裁决 -> 租约裁决

pub mod lease;
pub mod priority;

use log::{debug, error, info};
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tokio::time::{timeout, Duration, Instant};

use crate::core::config::CoordinatorConfig;
use crate::core::error::GateError;
use crate::core::types::{AdmittedSignal, MarketRegime, Signal, StrategyKey};

pub use lease::{LeaseBook, LeaseDecision, LeaseInfo, OwnershipLease};
pub use priority::{RegimePriorityTable, StrategyRegistry};

/// 过滤阶段的候选项
#[derive(Debug, Clone)]
struct Candidate {
    signal: Signal,
    key: StrategyKey,
    priority: u32,
}

/// 协调器只读统计快照
#[derive(Debug, Clone, Serialize)]
pub struct CoordinationStats {
    pub leases: Vec<LeaseInfo>,
    pub priorities: HashMap<MarketRegime, HashMap<StrategyKey, u32>>,
}

/// 策略协调器
///
/// 由编排层构造一次并以引用传递，不使用全局单例。
/// 租约簿是唯一的共享可变状态，整个裁决过程在一把锁内完成
pub struct StrategyCoordinator {
    registry: StrategyRegistry,
    table: RegimePriorityTable,
    confidence_override_threshold: f64,
    lock_wait: Duration,
    leases: Mutex<LeaseBook>,
}

impl StrategyCoordinator {
    pub fn new(config: &CoordinatorConfig) -> Result<Self, GateError> {
        let registry = StrategyRegistry::from_config(config)?;
        let table = RegimePriorityTable::new(config.regime_priorities.clone());

        Ok(Self {
            registry,
            table,
            confidence_override_threshold: config.confidence_override_threshold,
            lock_wait: Duration::from_millis(config.lock_wait_ms),
            leases: Mutex::new(LeaseBook::new(Duration::from_secs_f64(
                config.ownership_timeout_seconds,
            ))),
        })
    }

    /// 协调一批信号，返回冲突消解后的可执行子集
    ///
    /// 对畸形输入绝不报错，最坏情况是信号被丢弃；
    /// 租约锁有界等待超时则整批失败关闭
    pub async fn coordinate_signals(
        &self,
        signals: Vec<Signal>,
        regime: MarketRegime,
    ) -> Vec<AdmittedSignal> {
        if signals.is_empty() {
            return Vec::new();
        }
        let incoming = signals.len();

        // 阶段1~3：归一化 + 状态优先级过滤 + 风格过滤（纯函数，不碰共享状态）
        let mut by_symbol: HashMap<String, Vec<Candidate>> = HashMap::new();
        for signal in signals {
            let key = self.registry.normalize(&signal.strategy_id);
            let priority = self.table.priority_of(regime, key);
            let override_ok = signal.confidence >= self.confidence_override_threshold;

            if priority == 0 && !override_ok {
                debug!(
                    "🚫 {} 的 {} 信号被市场状态 {:?} 禁用 (优先级0, 置信度{:.1})",
                    key, signal.symbol, regime, signal.confidence
                );
                continue;
            }

            if !style_allowed(&signal, regime) && !override_ok {
                debug!(
                    "🚫 {} 的 {} 信号风格与市场状态 {:?} 不符, 丢弃",
                    key, signal.symbol, regime
                );
                continue;
            }

            if override_ok && (priority == 0 || !style_allowed(&signal, regime)) {
                info!(
                    "✨ {} 的 {} 信号置信度 {:.1} 达到豁免阈值, 绕过状态过滤",
                    key, signal.symbol, signal.confidence
                );
            }

            by_symbol
                .entry(signal.symbol.clone())
                .or_default()
                .push(Candidate {
                    signal,
                    key,
                    priority,
                });
        }

        // 阶段5：租约裁决，共享状态只在这把锁内访问
        let mut book = match timeout(self.lock_wait, self.leases.lock()).await {
            Ok(guard) => guard,
            Err(_) => {
                error!(
                    "🔒 租约锁等待超时({}ms), 本轮 {} 个信号全部失败关闭",
                    self.lock_wait.as_millis(),
                    incoming
                );
                return Vec::new();
            }
        };

        let now = Instant::now();
        let mut admitted = Vec::new();

        for (symbol, candidates) in by_symbol {
            // 阶段4：同标的多候选裁决，高优先级胜出，平局比置信度
            let Some(winner) = select_winner(candidates) else {
                continue;
            };

            match book.try_claim(&symbol, winner.key, now) {
                LeaseDecision::Rejected {
                    holder,
                    remaining_seconds,
                } => {
                    debug!(
                        "🔐 {} 的租约由 {} 持有(剩余{:.0}s), 拒绝 {} 的信号",
                        symbol, holder, remaining_seconds, winner.key
                    );
                }
                LeaseDecision::Transferred { from } => {
                    info!("🔄 {} 的租约从 {} 转移到 {}", symbol, from, winner.key);
                    admitted.push(AdmittedSignal {
                        signal: winner.signal,
                        owner: winner.key,
                        priority: winner.priority,
                    });
                }
                LeaseDecision::Granted | LeaseDecision::Refreshed => {
                    admitted.push(AdmittedSignal {
                        signal: winner.signal,
                        owner: winner.key,
                        priority: winner.priority,
                    });
                }
            }
        }
        drop(book);

        admitted.sort_by(|a, b| a.signal.symbol.cmp(&b.signal.symbol));
        info!(
            "🧭 信号协调完成: 输入{} 通过{} (市场状态 {:?})",
            incoming,
            admitted.len(),
            regime
        );
        admitted
    }

    /// 释放标的租约，由执行层在平仓后调用，无租约时为空操作
    pub async fn release_symbol(&self, symbol: &str) {
        let mut book = self.leases.lock().await;
        if book.release(symbol) {
            info!("🔓 释放 {} 的所有权租约", symbol);
        }
    }

    /// 只读统计快照，不改变任何可观测状态
    pub async fn get_coordination_stats(&self) -> CoordinationStats {
        let book = self.leases.lock().await;
        CoordinationStats {
            leases: book.snapshot(Instant::now()),
            priorities: self.table.snapshot(),
        }
    }
}

/// 风格过滤：趋势行情丢弃逆势信号，震荡行情丢弃趋势跟随信号
fn style_allowed(signal: &Signal, regime: MarketRegime) -> bool {
    if signal.is_counter_trend() && regime.is_trending() {
        return false;
    }
    if signal.is_trend_following() && regime.is_ranging_or_choppy() {
        return false;
    }
    true
}

/// 同标的多候选裁决：优先级高者胜，平局比置信度，再平则保留先到者
fn select_winner(candidates: Vec<Candidate>) -> Option<Candidate> {
    let mut best: Option<Candidate> = None;
    for candidate in candidates {
        best = match best {
            None => Some(candidate),
            Some(current) => {
                let wins = candidate.priority > current.priority
                    || (candidate.priority == current.priority
                        && candidate.signal.confidence > current.signal.confidence);
                if wins {
                    Some(candidate)
                } else {
                    Some(current)
                }
            }
        };
    }
    best
}
