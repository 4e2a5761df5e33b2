//! 合规准入控制器
//!
//! 下单前的最后一道闸门：硬性每秒交易上限 + 预测式拦截 +
//! 自动升级的熔断暂停 + 日/用户/策略配额

use chrono::Utc;
use log::{error, info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{timeout, Duration, Instant};

use crate::core::config::ComplianceConfig;
use crate::core::types::{StrategyKey, TradeRecord, ViolationRecord};
use crate::persistence::AuditStore;

use super::rate_window::predicted_tps;
use super::state::ComplianceState;

/// 准入决策
///
/// 拒绝是正常的负分支而不是错误，原因串供看板直接展示
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdmissionDecision {
    pub allowed: bool,
    pub reason: String,
}

impl AdmissionDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: "ok".to_string(),
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
        }
    }
}

/// 合规状态只读快照
#[derive(Debug, Clone, Serialize)]
pub struct ComplianceStatus {
    pub paused: bool,
    /// 暂停剩余秒数，未暂停为0
    pub pause_remaining_seconds: f64,
    pub current_pause_seconds: f64,
    pub violations_today: u32,
    pub current_tps: f64,
    pub window_count: usize,
    pub daily_count: u64,
    pub daily_trade_limit: u64,
    pub max_trades_per_second: u32,
    pub user_counts: HashMap<String, u64>,
    pub strategy_counts: HashMap<StrategyKey, u64>,
}

/// 合规准入控制器
///
/// 由编排层构造一次并共享引用。"观测速率 -> 决策 -> 可能熔断"
/// 整个序列在单把互斥锁内原子完成，杜绝先查后改竞态；
/// 锁等待有界，超时失败关闭
pub struct ComplianceAdmissionController {
    config: ComplianceConfig,
    state: Mutex<ComplianceState>,
    store: Arc<dyn AuditStore>,
    lock_wait: Duration,
}

impl ComplianceAdmissionController {
    pub fn new(config: ComplianceConfig, store: Arc<dyn AuditStore>) -> Self {
        let state = ComplianceState::new(&config, Utc::now().date_naive());
        let lock_wait = Duration::from_millis(config.lock_wait_ms);
        Self {
            config,
            state: Mutex::new(state),
            store,
            lock_wait,
        }
    }

    pub fn config(&self) -> &ComplianceConfig {
        &self.config
    }

    /// 单笔交易的准入决策，提交前调用
    ///
    /// 决策本身不写交易历史；速率越限会触发熔断（状态机转换），
    /// 预测式拦截只拒绝、不算违规
    pub async fn can_place_trade(
        &self,
        user_id: Option<&str>,
        strategy: Option<StrategyKey>,
    ) -> AdmissionDecision {
        let mut state = match timeout(self.lock_wait, self.state.lock()).await {
            Ok(guard) => guard,
            Err(_) => {
                error!(
                    "🔒 准入锁等待超时({}ms), 失败关闭拒绝交易",
                    self.lock_wait.as_millis()
                );
                return AdmissionDecision::deny("admission lock timeout, failing closed");
            }
        };

        let now = Instant::now();
        if state.roll_day_if_needed(Utc::now().date_naive()) {
            info!("📅 跨日，日计数与违规计数已重置");
        }

        // 步骤1/2：暂停检查与惰性恢复
        if state.paused {
            let remaining = state.pause_remaining(now);
            if remaining > 0.0 {
                return AdmissionDecision::deny(format!(
                    "rate limit pause active: {:.1}s remaining",
                    remaining
                ));
            }
            state.resume_if_expired(now);
            info!("✅ 熔断暂停到期, 恢复交易");
        }

        // 步骤3：当前窗口速率
        state.window.prune(now);
        let count = state.window.count(now);
        let current_tps = count as f64 / self.config.rate_window_seconds;
        let limit = self.config.max_trades_per_second;

        // 步骤4：已越限 -> 熔断
        if current_tps >= limit as f64 {
            let pause_seconds = state.trip(now, &self.config);
            let violation = ViolationRecord {
                observed_tps: current_tps,
                limit,
                pause_seconds,
                violations_today: state.violations_today,
                occurred_at: Utc::now(),
            };
            warn!(
                "🚨 交易速率 {:.2}/s 达到上限 {}/s, 熔断暂停 {:.0}s (今日第{}次违规)",
                current_tps, limit, pause_seconds, state.violations_today
            );
            drop(state);

            // 违规审计旁路写入，失败只记日志
            let store = Arc::clone(&self.store);
            tokio::spawn(async move {
                if let Err(e) = store.append_violation(&violation).await {
                    warn!("⚠️ 违规审计写入失败(已忽略): {}", e);
                }
            });

            return AdmissionDecision::deny(format!(
                "rate limit exceeded: {:.2}/s >= {}/s, trading paused {:.0}s",
                current_tps, limit, pause_seconds
            ));
        }

        // 步骤5：预测式拦截，放行这一笔就会越限则拒绝，但不算违规
        let predicted = predicted_tps(count, self.config.rate_window_seconds);
        if predicted > limit as f64 {
            return AdmissionDecision::deny(format!(
                "rate limit would be exceeded: predicted {:.2}/s > {}/s",
                predicted, limit
            ));
        }

        // 步骤6：配额检查，日 -> 用户 -> 策略
        if state.daily_count >= self.config.daily_trade_limit {
            return AdmissionDecision::deny(format!(
                "daily trade limit reached: {}/{}",
                state.daily_count, self.config.daily_trade_limit
            ));
        }

        if let Some(user) = user_id {
            let used = state.user_counts.get(user).copied().unwrap_or(0);
            if used >= self.config.per_user_trade_limit {
                return AdmissionDecision::deny(format!(
                    "user trade limit reached for {}: {}/{}",
                    user, used, self.config.per_user_trade_limit
                ));
            }
        }

        if let Some(key) = strategy {
            if let Some(per_strategy) = self.config.per_strategy_limits.get(&key) {
                let used = state.strategy_counts.get(&key).copied().unwrap_or(0);
                if used >= *per_strategy {
                    return AdmissionDecision::deny(format!(
                        "strategy trade limit reached for {}: {}/{}",
                        key, used, per_strategy
                    ));
                }
            }
        }

        AdmissionDecision::allow()
    }

    /// 记录一笔已确认提交的交易
    ///
    /// 内存状态是准入的权威依据；持久化是旁路写入，
    /// 失败不回滚计数也不向上传播
    pub async fn record_trade(&self, record: TradeRecord) {
        {
            let mut state = self.state.lock().await;
            if state.roll_day_if_needed(Utc::now().date_naive()) {
                info!("📅 跨日，日计数与违规计数已重置");
            }
            state.record(Instant::now(), &record.user_id, record.strategy);
        }

        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            if let Err(e) = store.append_trade(&record).await {
                warn!("⚠️ 交易审计写入失败(已忽略): {}", e);
            }
        });
    }

    /// 当前滑动窗口速率，只读
    pub async fn calculate_trades_per_second(&self) -> f64 {
        let state = self.state.lock().await;
        state.window.tps(Instant::now())
    }

    /// 合规状态只读快照，不改变任何可观测状态
    pub async fn get_compliance_status(&self) -> ComplianceStatus {
        let state = self.state.lock().await;
        let now = Instant::now();
        let remaining = state.pause_remaining(now);

        ComplianceStatus {
            paused: state.paused && remaining > 0.0,
            pause_remaining_seconds: remaining,
            current_pause_seconds: state.current_pause.as_secs_f64(),
            violations_today: state.violations_today,
            current_tps: state.window.tps(now),
            window_count: state.window.count(now),
            daily_count: state.daily_count,
            daily_trade_limit: self.config.daily_trade_limit,
            max_trades_per_second: self.config.max_trades_per_second,
            user_counts: state.user_counts.clone(),
            strategy_counts: state.strategy_counts.clone(),
        }
    }

    /// 日边界重置：清空日/用户/策略计数与违规计数
    ///
    /// 不碰滑动窗口（按时间自行裁剪），也不打断进行中的暂停
    pub async fn reset_daily_counters(&self) {
        let mut state = self.state.lock().await;
        state.reset_daily();
        info!("🧹 日合规计数已重置");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryAuditStore;

    fn controller_with(
        config: ComplianceConfig,
    ) -> (Arc<ComplianceAdmissionController>, Arc<MemoryAuditStore>) {
        let store = Arc::new(MemoryAuditStore::new());
        let controller = Arc::new(ComplianceAdmissionController::new(config, store.clone()));
        (controller, store)
    }

    fn record(strategy: StrategyKey) -> TradeRecord {
        TradeRecord::new("T0001", "acct-1", strategy, "BTCUSDT")
    }

    async fn drain_spawned() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn scenario_a_rate_ceiling_trips_and_recovers() {
        // max=7, 窗口1秒：0.0~0.6s 提交7笔，0.65s 第8次请求触发熔断5秒
        let (controller, store) = controller_with(ComplianceConfig::default());

        for i in 0..7 {
            let decision = controller
                .can_place_trade(Some("acct-1"), Some(StrategyKey::Momentum))
                .await;
            assert!(decision.allowed, "第{}笔应放行: {}", i + 1, decision.reason);
            controller.record_trade(record(StrategyKey::Momentum)).await;
            tokio::time::advance(Duration::from_millis(100)).await;
        }

        // 此刻 t=0.7，倒回到0.65的语义：窗口内仍是7笔
        tokio::time::advance(Duration::from_millis(50)).await;
        let decision = controller
            .can_place_trade(Some("acct-1"), Some(StrategyKey::Momentum))
            .await;
        assert!(!decision.allowed);
        assert!(decision.reason.contains("rate limit exceeded"), "{}", decision.reason);

        let status = controller.get_compliance_status().await;
        assert!(status.paused);
        assert_eq!(status.violations_today, 1);
        assert!((status.current_pause_seconds - 5.0).abs() < f64::EPSILON);

        // 暂停期内继续拒绝，原因带剩余秒数
        tokio::time::advance(Duration::from_millis(50)).await;
        let decision = controller.can_place_trade(None, None).await;
        assert!(!decision.allowed);
        assert!(decision.reason.contains("remaining"), "{}", decision.reason);

        // t=6.0s：暂停到期且窗口已清空，恢复放行
        tokio::time::advance(Duration::from_millis(5200)).await;
        let decision = controller.can_place_trade(None, None).await;
        assert!(decision.allowed, "{}", decision.reason);

        // 违规审计已旁路写入
        drain_spawned().await;
        assert_eq!(store.violations().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn burst_inside_any_one_second_span_trips() {
        // 突发不对齐整秒边界也要触发
        let (controller, _store) = controller_with(ComplianceConfig::default());

        tokio::time::advance(Duration::from_millis(700)).await;
        for _ in 0..7 {
            controller.record_trade(record(StrategyKey::Scalping)).await;
            tokio::time::advance(Duration::from_millis(40)).await;
        }
        // 7笔落在 0.7~0.98 之间，跨过 t=1.0 后窗口内仍是7笔
        tokio::time::advance(Duration::from_millis(100)).await;
        let decision = controller.can_place_trade(None, None).await;
        assert!(!decision.allowed);
        assert!(decision.reason.contains("rate limit exceeded"));
    }

    #[tokio::test(start_paused = true)]
    async fn predictive_guard_denies_without_tripping() {
        // 窗口0.5秒、上限7：3笔在窗内时 current=6<7 而 predicted=8>7
        let config = ComplianceConfig {
            rate_window_seconds: 0.5,
            ..ComplianceConfig::default()
        };
        let (controller, store) = controller_with(config);

        for _ in 0..3 {
            controller.record_trade(record(StrategyKey::Momentum)).await;
            tokio::time::advance(Duration::from_millis(10)).await;
        }

        let decision = controller.can_place_trade(None, None).await;
        assert!(!decision.allowed);
        assert!(decision.reason.contains("would be exceeded"), "{}", decision.reason);

        // 预测式拦截不算违规、不暂停
        let status = controller.get_compliance_status().await;
        assert!(!status.paused);
        assert_eq!(status.violations_today, 0);
        drain_spawned().await;
        assert!(store.violations().await.is_empty());

        // 窗口滑出后恢复放行
        tokio::time::advance(Duration::from_millis(600)).await;
        let decision = controller.can_place_trade(None, None).await;
        assert!(decision.allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_escalates_on_repeat_violations() {
        let (controller, _store) = controller_with(ComplianceConfig::default());

        for _ in 0..7 {
            controller.record_trade(record(StrategyKey::Momentum)).await;
        }
        let first = controller.can_place_trade(None, None).await;
        assert!(first.reason.contains("paused 5s"), "{}", first.reason);

        // 等第一次暂停结束，立刻再次越限
        tokio::time::advance(Duration::from_millis(5100)).await;
        for _ in 0..7 {
            controller.record_trade(record(StrategyKey::Momentum)).await;
        }
        let second = controller.can_place_trade(None, None).await;
        assert!(second.reason.contains("paused 10s"), "{}", second.reason);

        let status = controller.get_compliance_status().await;
        assert_eq!(status.violations_today, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn quota_checks_in_order_daily_user_strategy() {
        let config = ComplianceConfig {
            max_trades_per_second: 100,
            daily_trade_limit: 3,
            per_user_trade_limit: 2,
            per_strategy_limits: HashMap::from([(StrategyKey::Momentum, 1)]),
            ..ComplianceConfig::default()
        };
        let (controller, _store) = controller_with(config);

        controller
            .record_trade(TradeRecord::new("T1", "u1", StrategyKey::Momentum, "X"))
            .await;
        tokio::time::advance(Duration::from_secs(2)).await;

        // 策略配额先于用户耗尽
        let decision = controller
            .can_place_trade(Some("u1"), Some(StrategyKey::Momentum))
            .await;
        assert!(!decision.allowed);
        assert!(decision.reason.contains("strategy trade limit"), "{}", decision.reason);

        // 其他策略仍可过
        let decision = controller
            .can_place_trade(Some("u1"), Some(StrategyKey::Breakout))
            .await;
        assert!(decision.allowed);

        controller
            .record_trade(TradeRecord::new("T2", "u1", StrategyKey::Breakout, "X"))
            .await;
        tokio::time::advance(Duration::from_secs(2)).await;

        // 用户配额耗尽，其他用户不受影响
        let decision = controller
            .can_place_trade(Some("u1"), Some(StrategyKey::Breakout))
            .await;
        assert!(decision.reason.contains("user trade limit"), "{}", decision.reason);
        let decision = controller
            .can_place_trade(Some("u2"), Some(StrategyKey::Breakout))
            .await;
        assert!(decision.allowed);

        controller
            .record_trade(TradeRecord::new("T3", "u2", StrategyKey::Breakout, "X"))
            .await;
        tokio::time::advance(Duration::from_secs(2)).await;

        // 日总量配额最先检查
        let decision = controller.can_place_trade(Some("u3"), None).await;
        assert!(decision.reason.contains("daily trade limit"), "{}", decision.reason);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_daily_counters_leaves_rate_window_alone() {
        let config = ComplianceConfig {
            rate_window_seconds: 0.5,
            ..ComplianceConfig::default()
        };
        let (controller, _store) = controller_with(config);

        for _ in 0..3 {
            controller.record_trade(record(StrategyKey::Momentum)).await;
        }
        // 预测式拒绝（不触发熔断）
        let before = controller.can_place_trade(None, None).await;
        assert!(!before.allowed);

        controller.reset_daily_counters().await;

        // 窗口未被重置，同样的速率决策复现
        let after = controller.can_place_trade(None, None).await;
        assert_eq!(before, after);

        let status = controller.get_compliance_status().await;
        assert_eq!(status.daily_count, 0);
        assert_eq!(status.window_count, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn status_reads_are_idempotent() {
        let (controller, _store) = controller_with(ComplianceConfig::default());
        controller.record_trade(record(StrategyKey::Momentum)).await;

        let first = controller.get_compliance_status().await;
        let second = controller.get_compliance_status().await;
        assert_eq!(first.window_count, second.window_count);
        assert_eq!(first.daily_count, second.daily_count);
        assert_eq!(first.violations_today, second.violations_today);
        assert!((controller.calculate_trades_per_second().await - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn persistence_failure_never_blocks_admission() {
        use crate::persistence::FailingAuditStore;

        let controller = ComplianceAdmissionController::new(
            ComplianceConfig::default(),
            Arc::new(FailingAuditStore),
        );

        controller.record_trade(record(StrategyKey::Momentum)).await;
        drain_spawned().await;

        // 写入失败被吞掉，内存计数仍是权威依据
        let status = controller.get_compliance_status().await;
        assert_eq!(status.daily_count, 1);
        assert_eq!(status.window_count, 1);
        assert!(controller.can_place_trade(None, None).await.allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn trade_audit_written_fire_and_forget() {
        let (controller, store) = controller_with(ComplianceConfig::default());
        controller.record_trade(record(StrategyKey::Momentum)).await;
        drain_spawned().await;

        let trades = store.trades().await;
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].strategy, StrategyKey::Momentum);
        assert_eq!(trades[0].symbol, "BTCUSDT");
    }
}
