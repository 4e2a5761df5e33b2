//! 合规准入控制
//!
//! 最后一道闸门：滑动窗口速率上限、预测式拦截、
//! 升级式熔断暂停、日/用户/策略配额

pub mod controller;
pub mod monitor;
pub mod rate_window;
pub mod state;

pub use controller::{AdmissionDecision, ComplianceAdmissionController, ComplianceStatus};
pub use monitor::RateMonitor;
pub use rate_window::{predicted_tps, RateWindow};
pub use state::{escalated_pause_seconds, ComplianceState};
