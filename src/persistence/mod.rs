//! 审计持久化协作者
//!
//! 对准入核心来说持久化是"发后即忘"的旁路：写入失败只记日志，
//! 永远不影响准入决策，也不回滚内存计数

use async_trait::async_trait;
use log::debug;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::core::error::GateError;
use crate::core::types::{TradeRecord, ViolationRecord};

/// 审计存储接口，由外部持久化层实现
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// 追加一条成交审计记录
    async fn append_trade(&self, record: &TradeRecord) -> Result<(), GateError>;

    /// 追加一条熔断违规记录
    async fn append_violation(&self, record: &ViolationRecord) -> Result<(), GateError>;
}

/// 空实现：只记调试日志，用于未接持久化层的部署
pub struct NullAuditStore;

#[async_trait]
impl AuditStore for NullAuditStore {
    async fn append_trade(&self, record: &TradeRecord) -> Result<(), GateError> {
        debug!("审计(丢弃): 成交 {} {}", record.trade_id, record.symbol);
        Ok(())
    }

    async fn append_violation(&self, record: &ViolationRecord) -> Result<(), GateError> {
        debug!(
            "审计(丢弃): 违规 {:.2}/s 暂停{:.0}s",
            record.observed_tps, record.pause_seconds
        );
        Ok(())
    }
}

/// 内存实现，用于测试与回放
pub struct MemoryAuditStore {
    trades: RwLock<Vec<TradeRecord>>,
    violations: RwLock<Vec<ViolationRecord>>,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self {
            trades: RwLock::new(Vec::new()),
            violations: RwLock::new(Vec::new()),
        }
    }

    pub async fn trades(&self) -> Vec<TradeRecord> {
        self.trades.read().await.clone()
    }

    pub async fn violations(&self) -> Vec<ViolationRecord> {
        self.violations.read().await.clone()
    }
}

impl Default for MemoryAuditStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn append_trade(&self, record: &TradeRecord) -> Result<(), GateError> {
        self.trades.write().await.push(record.clone());
        Ok(())
    }

    async fn append_violation(&self, record: &ViolationRecord) -> Result<(), GateError> {
        self.violations.write().await.push(record.clone());
        Ok(())
    }
}

/// 故障注入实现：写入永远失败，用于验证"失败只记日志"的契约
pub struct FailingAuditStore;

#[async_trait]
impl AuditStore for FailingAuditStore {
    async fn append_trade(&self, _record: &TradeRecord) -> Result<(), GateError> {
        Err(GateError::PersistenceError("模拟写入失败".to_string()))
    }

    async fn append_violation(&self, _record: &ViolationRecord) -> Result<(), GateError> {
        Err(GateError::PersistenceError("模拟写入失败".to_string()))
    }
}

/// 便捷构造：默认空实现
pub fn null_store() -> Arc<dyn AuditStore> {
    Arc::new(NullAuditStore)
}
