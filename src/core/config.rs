use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;

use crate::core::error::GateError;
use crate::core::types::{MarketRegime, StrategyKey};

/// 协调器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// 标的租约超时（秒），超时后其他策略可以接管
    #[serde(default = "default_ownership_timeout")]
    pub ownership_timeout_seconds: f64,
    /// 置信度豁免阈值，达到后可绕过市场状态禁用
    #[serde(default = "default_confidence_override")]
    pub confidence_override_threshold: f64,
    /// 原始策略标识符 -> 标准键名 的别名表，启动时校验
    #[serde(default)]
    pub strategy_aliases: HashMap<String, String>,
    /// 市场状态 -> 策略 -> 优先级，0 表示该状态下禁用
    #[serde(default = "default_regime_priorities")]
    pub regime_priorities: HashMap<MarketRegime, HashMap<StrategyKey, u32>>,
    /// 租约锁的有界等待（毫秒），超时失败关闭
    #[serde(default = "default_lock_wait_ms")]
    pub lock_wait_ms: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            ownership_timeout_seconds: default_ownership_timeout(), // 5分钟
            confidence_override_threshold: default_confidence_override(),
            strategy_aliases: HashMap::new(),
            regime_priorities: default_regime_priorities(),
            lock_wait_ms: default_lock_wait_ms(),
        }
    }
}

/// 合规准入配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceConfig {
    /// 每秒交易数硬上限
    #[serde(default = "default_max_tps")]
    pub max_trades_per_second: u32,
    /// 滑动窗口长度（秒）
    #[serde(default = "default_rate_window")]
    pub rate_window_seconds: f64,
    /// 首次熔断暂停秒数
    #[serde(default = "default_base_pause")]
    pub base_pause_seconds: f64,
    /// 熔断暂停秒数上限
    #[serde(default = "default_max_pause")]
    pub max_pause_seconds: f64,
    /// 日交易总量上限
    #[serde(default = "default_daily_limit")]
    pub daily_trade_limit: u64,
    /// 单用户日交易上限
    #[serde(default = "default_user_limit")]
    pub per_user_trade_limit: u64,
    /// 单策略日交易上限，未配置的策略不限
    #[serde(default)]
    pub per_strategy_limits: HashMap<StrategyKey, u64>,
    /// 后台速率监控周期（毫秒），仅用于可观测性
    #[serde(default = "default_monitor_interval")]
    pub monitor_interval_ms: u64,
    /// 速率利用率告警线（占上限比例）
    #[serde(default = "default_warn_utilization")]
    pub warn_utilization: f64,
    /// 准入决策锁的有界等待（毫秒），超时失败关闭
    #[serde(default = "default_lock_wait_ms")]
    pub lock_wait_ms: u64,
    /// 时间戳窗口容量硬上限，防止无界增长
    #[serde(default = "default_window_capacity")]
    pub rate_window_capacity: usize,
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        Self {
            max_trades_per_second: default_max_tps(),
            rate_window_seconds: default_rate_window(),
            base_pause_seconds: default_base_pause(), // 首次熔断5秒
            max_pause_seconds: default_max_pause(),   // 封顶30秒
            daily_trade_limit: default_daily_limit(),
            per_user_trade_limit: default_user_limit(),
            per_strategy_limits: HashMap::new(),
            monitor_interval_ms: default_monitor_interval(),
            warn_utilization: default_warn_utilization(), // 90%告警
            lock_wait_ms: default_lock_wait_ms(),
            rate_window_capacity: default_window_capacity(),
        }
    }
}

/// 准入管线总配置，启动时加载一次，之后不可变
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GateConfig {
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub compliance: ComplianceConfig,
}

impl GateConfig {
    /// 从YAML文件加载配置
    pub fn from_file(path: &str) -> Result<Self, GateError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| GateError::ConfigError(format!("读取配置文件失败: {}", e)))?;

        let config: GateConfig = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// 启动时校验，别名表指向未知键名视为配置错误
    pub fn validate(&self) -> Result<(), GateError> {
        for (raw, target) in &self.coordinator.strategy_aliases {
            if StrategyKey::parse(target).is_none() {
                return Err(GateError::ConfigError(format!(
                    "策略别名 '{}' 指向未知键名 '{}'",
                    raw, target
                )));
            }
        }
        if self.compliance.max_trades_per_second == 0 {
            return Err(GateError::ConfigError(
                "max_trades_per_second 必须大于0".to_string(),
            ));
        }
        if self.compliance.rate_window_seconds <= 0.0 {
            return Err(GateError::ConfigError(
                "rate_window_seconds 必须为正数".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_ownership_timeout() -> f64 {
    300.0
}

fn default_confidence_override() -> f64 {
    8.0
}

fn default_max_tps() -> u32 {
    7
}

fn default_rate_window() -> f64 {
    1.0
}

fn default_base_pause() -> f64 {
    5.0
}

fn default_max_pause() -> f64 {
    30.0
}

fn default_daily_limit() -> u64 {
    200
}

fn default_user_limit() -> u64 {
    100
}

fn default_monitor_interval() -> u64 {
    100
}

fn default_warn_utilization() -> f64 {
    0.9
}

fn default_lock_wait_ms() -> u64 {
    50
}

fn default_window_capacity() -> usize {
    4096
}

/// 内置的默认优先级表
///
/// 覆盖全部六种市场状态；Unknown 策略在任何状态下都缺省为0，
/// 只能靠置信度豁免进场
fn default_regime_priorities() -> HashMap<MarketRegime, HashMap<StrategyKey, u32>> {
    use MarketRegime::*;
    use StrategyKey::*;

    let mut table = HashMap::new();

    table.insert(
        StrongTrending,
        HashMap::from([
            (Momentum, 10),
            (Breakout, 8),
            (News, 5),
            (Scalping, 2),
            (MeanReversion, 0),
        ]),
    );
    table.insert(
        Trending,
        HashMap::from([
            (Momentum, 8),
            (Breakout, 7),
            (News, 5),
            (Scalping, 3),
            (MeanReversion, 1),
        ]),
    );
    table.insert(
        Ranging,
        HashMap::from([
            (MeanReversion, 9),
            (Scalping, 7),
            (News, 4),
            (Breakout, 2),
            (Momentum, 1),
        ]),
    );
    table.insert(
        Choppy,
        HashMap::from([
            (MeanReversion, 6),
            (Scalping, 5),
            (News, 2),
            (Breakout, 0),
            (Momentum, 0),
        ]),
    );
    table.insert(
        Volatile,
        HashMap::from([
            (News, 8),
            (Breakout, 6),
            (Scalping, 4),
            (Momentum, 3),
            (MeanReversion, 2),
        ]),
    );
    table.insert(
        Neutral,
        HashMap::from([
            (Momentum, 5),
            (MeanReversion, 5),
            (Breakout, 5),
            (Scalping, 5),
            (News, 5),
        ]),
    );

    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = GateConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.compliance.max_trades_per_second, 7);
        assert!((config.compliance.rate_window_seconds - 1.0).abs() < f64::EPSILON);
        assert!((config.coordinator.ownership_timeout_seconds - 300.0).abs() < f64::EPSILON);
        assert!((config.coordinator.confidence_override_threshold - 8.0).abs() < f64::EPSILON);
    }

    #[test]
    fn bad_alias_rejected() {
        let mut config = GateConfig::default();
        config
            .coordinator
            .strategy_aliases
            .insert("mom_v3".to_string(), "超级动量".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn yaml_roundtrip_with_partial_override() {
        let yaml = r#"
compliance:
  max_trades_per_second: 3
  daily_trade_limit: 50
coordinator:
  ownership_timeout_seconds: 60
  strategy_aliases:
    mom_v3: momentum
"#;
        let config: GateConfig = serde_yaml::from_str(yaml).expect("解析失败");
        assert!(config.validate().is_ok());
        assert_eq!(config.compliance.max_trades_per_second, 3);
        assert_eq!(config.compliance.daily_trade_limit, 50);
        // 未覆盖的字段保持默认
        assert!((config.compliance.base_pause_seconds - 5.0).abs() < f64::EPSILON);
        assert!((config.coordinator.ownership_timeout_seconds - 60.0).abs() < f64::EPSILON);
        assert!(!config.coordinator.regime_priorities.is_empty());
    }

    #[test]
    fn default_priority_table_covers_all_regimes() {
        let table = default_regime_priorities();
        for regime in [
            MarketRegime::StrongTrending,
            MarketRegime::Trending,
            MarketRegime::Ranging,
            MarketRegime::Choppy,
            MarketRegime::Volatile,
            MarketRegime::Neutral,
        ] {
            assert!(table.contains_key(&regime), "缺少状态 {:?}", regime);
        }
        // 震荡期禁用动量
        assert_eq!(table[&MarketRegime::Choppy][&StrategyKey::Momentum], 0);
    }
}
