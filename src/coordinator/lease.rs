//! 标的所有权租约
//!
//! 同一标的在任意时刻至多被一个策略持有；租约靠惰性的
//! 时钟比较过期，不使用定时器

use serde::Serialize;
use std::collections::HashMap;
use tokio::time::{Duration, Instant};

use crate::core::types::StrategyKey;

/// 单个标的的所有权租约
#[derive(Debug, Clone)]
pub struct OwnershipLease {
    pub owner: StrategyKey,
    pub acquired_at: Instant,
    /// 最近一次刷新时间，过期判定以此为准
    pub refreshed_at: Instant,
}

/// 租约裁决结果
#[derive(Debug, Clone, PartialEq)]
pub enum LeaseDecision {
    /// 无租约，新建
    Granted,
    /// 同一持有者，仅刷新时间戳
    Refreshed,
    /// 原租约过期，所有权转移
    Transferred { from: StrategyKey },
    /// 租约有效且持有者不同，拒绝
    Rejected {
        holder: StrategyKey,
        remaining_seconds: f64,
    },
}

/// 租约簿
///
/// 调用方负责串行化访问（协调器用单把互斥锁包住整个裁决）
#[derive(Debug)]
pub struct LeaseBook {
    leases: HashMap<String, OwnershipLease>,
    timeout: Duration,
}

impl LeaseBook {
    pub fn new(timeout: Duration) -> Self {
        Self {
            leases: HashMap::new(),
            timeout,
        }
    }

    /// 尝试以 claimant 的身份认领标的
    ///
    /// 裁决与状态变更在同一次调用内完成，杜绝先查后改的竞态
    pub fn try_claim(&mut self, symbol: &str, claimant: StrategyKey, now: Instant) -> LeaseDecision {
        match self.leases.get_mut(symbol) {
            None => {
                self.leases.insert(
                    symbol.to_string(),
                    OwnershipLease {
                        owner: claimant,
                        acquired_at: now,
                        refreshed_at: now,
                    },
                );
                LeaseDecision::Granted
            }
            Some(lease) if lease.owner == claimant => {
                lease.refreshed_at = now;
                LeaseDecision::Refreshed
            }
            Some(lease) => {
                let age = now.saturating_duration_since(lease.refreshed_at);
                if age >= self.timeout {
                    let from = lease.owner;
                    lease.owner = claimant;
                    lease.acquired_at = now;
                    lease.refreshed_at = now;
                    LeaseDecision::Transferred { from }
                } else {
                    LeaseDecision::Rejected {
                        holder: lease.owner,
                        remaining_seconds: (self.timeout - age).as_secs_f64(),
                    }
                }
            }
        }
    }

    /// 释放租约，无租约时为空操作
    pub fn release(&mut self, symbol: &str) -> bool {
        self.leases.remove(symbol).is_some()
    }

    pub fn len(&self) -> usize {
        self.leases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leases.is_empty()
    }

    pub fn holder_of(&self, symbol: &str) -> Option<StrategyKey> {
        self.leases.get(symbol).map(|l| l.owner)
    }

    /// 只读快照
    pub fn snapshot(&self, now: Instant) -> Vec<LeaseInfo> {
        let mut infos: Vec<LeaseInfo> = self
            .leases
            .iter()
            .map(|(symbol, lease)| LeaseInfo {
                symbol: symbol.clone(),
                owner: lease.owner,
                age_seconds: now.saturating_duration_since(lease.refreshed_at).as_secs_f64(),
                expired: now.saturating_duration_since(lease.refreshed_at) >= self.timeout,
            })
            .collect();
        infos.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        infos
    }
}

/// 租约可观测性条目
#[derive(Debug, Clone, Serialize)]
pub struct LeaseInfo {
    pub symbol: String,
    pub owner: StrategyKey,
    /// 距上次刷新的秒数
    pub age_seconds: f64,
    pub expired: bool,
}
