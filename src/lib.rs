#![allow(dead_code)]

pub mod compliance;
pub mod coordinator;
pub mod core;
pub mod persistence;
pub mod pipeline;
pub mod utils;

// 选择性导出，避免命名冲突
pub use self::core::{config::*, error::*, types::*};
pub use compliance::{
    AdmissionDecision, ComplianceAdmissionController, ComplianceStatus, RateMonitor,
};
pub use coordinator::{CoordinationStats, StrategyCoordinator};
pub use persistence::{AuditStore, FailingAuditStore, MemoryAuditStore, NullAuditStore};
pub use pipeline::{AdmissionPipeline, CycleReport, OrderExecutor};
pub use utils::TradeIdGenerator;
