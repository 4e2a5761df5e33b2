//! 准入管线编排
//!
//! 按扫描周期驱动两级闸门：协调 -> 合规准入 -> 外部执行 -> 记录。
//! 下单本身由外部 OrderExecutor 完成，本模块只决定"能不能走"

use async_trait::async_trait;
use log::{info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::compliance::ComplianceAdmissionController;
use crate::coordinator::StrategyCoordinator;
use crate::core::error::GateError;
use crate::core::types::{AdmittedSignal, MarketRegime, Signal, TradeRecord};
use crate::utils::TradeIdGenerator;

/// 外部下单执行器接口
#[async_trait]
pub trait OrderExecutor: Send + Sync {
    /// 提交订单，成功返回订单号
    async fn place(&self, signal: &AdmittedSignal) -> Result<String, GateError>;
}

/// 单个扫描周期的结算报告
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleReport {
    /// 输入信号数
    pub incoming: usize,
    /// 通过协调的信号数
    pub coordinated: usize,
    /// 通过合规准入的信号数
    pub allowed: usize,
    /// 实际提交成功的订单数
    pub submitted: usize,
    /// 合规拒绝原因 -> 次数
    pub denials: HashMap<String, u32>,
    /// 执行层失败数（不回滚租约）
    pub executor_failures: u32,
}

/// 信号准入管线
///
/// 由编排层构造一次持有；协调器与合规控制器都以共享引用传入，
/// 不存在任何全局可变状态
pub struct AdmissionPipeline {
    coordinator: Arc<StrategyCoordinator>,
    compliance: Arc<ComplianceAdmissionController>,
    executor: Arc<dyn OrderExecutor>,
    trade_ids: TradeIdGenerator,
    account_id: String,
}

impl AdmissionPipeline {
    pub fn new(
        coordinator: Arc<StrategyCoordinator>,
        compliance: Arc<ComplianceAdmissionController>,
        executor: Arc<dyn OrderExecutor>,
        account_id: impl Into<String>,
    ) -> Self {
        let account_id = account_id.into();
        Self {
            coordinator,
            compliance,
            executor,
            trade_ids: TradeIdGenerator::new(&account_id),
            account_id,
        }
    }

    /// 执行一个扫描周期
    ///
    /// 对每个通过协调的信号：提交前做合规准入，确认提交后记录成交。
    /// 执行失败只记日志，不释放租约（仓位可能部分成交），
    /// 租约释放始终由编排层在平仓后显式调用
    pub async fn run_cycle(&self, signals: Vec<Signal>, regime: MarketRegime) -> CycleReport {
        let mut report = CycleReport {
            incoming: signals.len(),
            ..CycleReport::default()
        };

        let admitted = self.coordinator.coordinate_signals(signals, regime).await;
        report.coordinated = admitted.len();

        for signal in admitted {
            let decision = self
                .compliance
                .can_place_trade(Some(&self.account_id), Some(signal.owner))
                .await;

            if !decision.allowed {
                *report.denials.entry(decision.reason).or_insert(0) += 1;
                continue;
            }
            report.allowed += 1;

            match self.executor.place(&signal).await {
                Ok(order_id) => {
                    let trade_id = self.trade_ids.generate(signal.owner);
                    info!(
                        "✅ {} 订单已提交: {} (交易ID {})",
                        signal.signal.symbol, order_id, trade_id
                    );
                    self.compliance
                        .record_trade(TradeRecord::new(
                            trade_id,
                            &self.account_id,
                            signal.owner,
                            &signal.signal.symbol,
                        ))
                        .await;
                    report.submitted += 1;
                }
                Err(e) => {
                    warn!("❌ {} 订单提交失败: {}", signal.signal.symbol, e);
                    report.executor_failures += 1;
                }
            }
        }

        info!(
            "🏁 周期结束: 输入{} 协调通过{} 合规放行{} 提交{} 执行失败{}",
            report.incoming,
            report.coordinated,
            report.allowed,
            report.submitted,
            report.executor_failures
        );
        report
    }

    /// 平仓后释放标的租约
    pub async fn release_position(&self, symbol: &str) {
        self.coordinator.release_symbol(symbol).await;
    }
}
