//! 后台速率监控
//!
//! 固定周期重新发布可观测速率并在接近上限时告警。
//! 纯可观测性组件：权威速率永远在 can_place_trade 内同步重算

use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

use super::controller::ComplianceAdmissionController;

/// 速率监控任务句柄
///
/// 支持优雅停机：stop() 通知循环退出并等待任务结束，
/// 控制器内的累计状态不受影响
pub struct RateMonitor {
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
    rate_rx: watch::Receiver<f64>,
}

impl RateMonitor {
    /// 启动监控循环
    pub fn spawn(controller: Arc<ComplianceAdmissionController>) -> Self {
        let config = controller.config().clone();
        let period = Duration::from_millis(config.monitor_interval_ms);
        let warn_threshold = config.warn_utilization * config.max_trades_per_second as f64;

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let (rate_tx, rate_rx) = watch::channel(0.0f64);

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!("📡 速率监控启动, 周期 {}ms", period.as_millis());

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let tps = controller.calculate_trades_per_second().await;
                        let _ = rate_tx.send(tps);

                        if tps >= warn_threshold {
                            warn!(
                                "⚠️ 交易速率 {:.2}/s 已达上限 {}/s 的 {:.0}%",
                                tps,
                                config.max_trades_per_second,
                                tps / config.max_trades_per_second as f64 * 100.0
                            );
                        } else {
                            debug!("📊 当前交易速率 {:.2}/s", tps);
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("📡 速率监控已停止");
        });

        Self {
            handle,
            shutdown_tx,
            rate_rx,
        }
    }

    /// 最近一次发布的速率
    pub fn current_rate(&self) -> f64 {
        *self.rate_rx.borrow()
    }

    /// 订阅速率更新，供看板消费
    pub fn subscribe(&self) -> watch::Receiver<f64> {
        self.rate_rx.clone()
    }

    /// 优雅停机
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.handle.await;
    }
}
