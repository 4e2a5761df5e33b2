//! 策略标识归一化与市场状态优先级表

use log::warn;
use std::collections::HashMap;

use crate::core::config::CoordinatorConfig;
use crate::core::error::GateError;
use crate::core::types::{MarketRegime, StrategyKey};

/// 策略标识注册表
///
/// 启动时用内置别名加配置别名构建一张校验过的映射表，
/// 查不到的原始标识符一律折叠到 Unknown，不做子串猜测
#[derive(Debug, Clone)]
pub struct StrategyRegistry {
    aliases: HashMap<String, StrategyKey>,
}

impl StrategyRegistry {
    /// 根据配置构建注册表，别名指向未知键名时报配置错误
    pub fn from_config(config: &CoordinatorConfig) -> Result<Self, GateError> {
        let mut aliases = Self::builtin_aliases();

        for (raw, target) in &config.strategy_aliases {
            let key = StrategyKey::parse(target).ok_or_else(|| {
                GateError::ConfigError(format!("策略别名 '{}' 指向未知键名 '{}'", raw, target))
            })?;
            aliases.insert(raw.trim().to_lowercase(), key);
        }

        Ok(Self { aliases })
    }

    /// 内置别名，覆盖历史上各策略模块用过的命名
    fn builtin_aliases() -> HashMap<String, StrategyKey> {
        let mut aliases = HashMap::new();
        for key in [
            StrategyKey::Momentum,
            StrategyKey::MeanReversion,
            StrategyKey::Breakout,
            StrategyKey::Scalping,
            StrategyKey::News,
        ] {
            aliases.insert(key.as_str().to_string(), key);
        }
        aliases.insert("momo".to_string(), StrategyKey::Momentum);
        aliases.insert("trend_momentum".to_string(), StrategyKey::Momentum);
        aliases.insert("reversion".to_string(), StrategyKey::MeanReversion);
        aliases.insert("mean_rev".to_string(), StrategyKey::MeanReversion);
        aliases.insert("range_breakout".to_string(), StrategyKey::Breakout);
        aliases.insert("scalp".to_string(), StrategyKey::Scalping);
        aliases.insert("news_edge".to_string(), StrategyKey::News);
        aliases
    }

    /// 原始标识符折叠为标准键，只做精确查表
    pub fn normalize(&self, raw: &str) -> StrategyKey {
        let normalized = raw.trim().to_lowercase();
        match self.aliases.get(&normalized) {
            Some(key) => *key,
            None => {
                warn!("⚠️ 未识别的策略标识 '{}', 归入 unknown", raw);
                StrategyKey::Unknown
            }
        }
    }
}

/// 市场状态优先级表，启动时加载一次后只读
#[derive(Debug, Clone)]
pub struct RegimePriorityTable {
    table: HashMap<MarketRegime, HashMap<StrategyKey, u32>>,
}

impl RegimePriorityTable {
    pub fn new(table: HashMap<MarketRegime, HashMap<StrategyKey, u32>>) -> Self {
        Self { table }
    }

    /// 查询指定状态下某策略的优先级
    ///
    /// 表中缺失的状态回退到 NEUTRAL，缺失的策略条目按0处理（禁用）
    pub fn priority_of(&self, regime: MarketRegime, key: StrategyKey) -> u32 {
        let entry = self
            .table
            .get(&regime)
            .or_else(|| self.table.get(&MarketRegime::Neutral));

        entry
            .and_then(|per_strategy| per_strategy.get(&key))
            .copied()
            .unwrap_or(0)
    }

    /// 只读快照，供可观测性接口导出
    pub fn snapshot(&self) -> HashMap<MarketRegime, HashMap<StrategyKey, u32>> {
        self.table.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::CoordinatorConfig;

    fn registry() -> StrategyRegistry {
        StrategyRegistry::from_config(&CoordinatorConfig::default()).expect("构建注册表失败")
    }

    #[test]
    fn normalize_builtin_and_unknown() {
        let registry = registry();
        assert_eq!(registry.normalize("momentum"), StrategyKey::Momentum);
        assert_eq!(registry.normalize("  Scalp "), StrategyKey::Scalping);
        assert_eq!(registry.normalize("mean_rev"), StrategyKey::MeanReversion);
        // 子串不命中：不再做模糊匹配
        assert_eq!(registry.normalize("momentum_v9"), StrategyKey::Unknown);
        assert_eq!(registry.normalize("随便什么"), StrategyKey::Unknown);
    }

    #[test]
    fn config_alias_extends_builtin() {
        let mut config = CoordinatorConfig::default();
        config
            .strategy_aliases
            .insert("momentum_v9".to_string(), "momentum".to_string());
        let registry = StrategyRegistry::from_config(&config).expect("构建注册表失败");
        assert_eq!(registry.normalize("momentum_v9"), StrategyKey::Momentum);
    }

    #[test]
    fn bad_alias_is_config_error() {
        let mut config = CoordinatorConfig::default();
        config
            .strategy_aliases
            .insert("x".to_string(), "not_a_key".to_string());
        assert!(StrategyRegistry::from_config(&config).is_err());
    }

    #[test]
    fn priority_missing_entries_default_zero() {
        let config = CoordinatorConfig::default();
        let table = RegimePriorityTable::new(config.regime_priorities);

        assert_eq!(
            table.priority_of(MarketRegime::Trending, StrategyKey::Momentum),
            8
        );
        // Unknown 在任何状态下都没有条目
        assert_eq!(
            table.priority_of(MarketRegime::Trending, StrategyKey::Unknown),
            0
        );
    }

    #[test]
    fn missing_regime_falls_back_to_neutral() {
        let mut raw = HashMap::new();
        raw.insert(
            MarketRegime::Neutral,
            HashMap::from([(StrategyKey::Momentum, 4u32)]),
        );
        let table = RegimePriorityTable::new(raw);

        // VOLATILE 未配置，回退 NEUTRAL
        assert_eq!(
            table.priority_of(MarketRegime::Volatile, StrategyKey::Momentum),
            4
        );
    }
}
