//! 信号准入管线的核心类型
//!
//! 所有策略产生的候选信号、市场状态标签、策略键
//! 以及审计记录都定义在这里

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 信号方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalDirection {
    Buy,
    Sell,
}

/// 策略键
///
/// 原始策略标识符在进入协调器之前统一折叠到这个固定集合，
/// 无法识别的标识符映射到 Unknown 而不是报错
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKey {
    /// 动量策略
    Momentum,
    /// 均值回归策略
    MeanReversion,
    /// 突破策略
    Breakout,
    /// 剥头皮策略
    Scalping,
    /// 消息面策略
    News,
    /// 未识别策略
    Unknown,
}

impl StrategyKey {
    /// 解析标准键名，不做任何模糊匹配
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "momentum" => Some(StrategyKey::Momentum),
            "mean_reversion" => Some(StrategyKey::MeanReversion),
            "breakout" => Some(StrategyKey::Breakout),
            "scalping" => Some(StrategyKey::Scalping),
            "news" => Some(StrategyKey::News),
            "unknown" => Some(StrategyKey::Unknown),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKey::Momentum => "momentum",
            StrategyKey::MeanReversion => "mean_reversion",
            StrategyKey::Breakout => "breakout",
            StrategyKey::Scalping => "scalping",
            StrategyKey::News => "news",
            StrategyKey::Unknown => "unknown",
        }
    }

    /// 短代码，用于交易ID前缀
    pub fn short_code(&self) -> &'static str {
        match self {
            StrategyKey::Momentum => "MOM",
            StrategyKey::MeanReversion => "MRV",
            StrategyKey::Breakout => "BRK",
            StrategyKey::Scalping => "SCP",
            StrategyKey::News => "NWS",
            StrategyKey::Unknown => "UNK",
        }
    }
}

impl std::fmt::Display for StrategyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 市场状态标签
///
/// 每个扫描周期由外部 RegimeProvider 提供一次
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketRegime {
    StrongTrending,
    Trending,
    Ranging,
    Choppy,
    Volatile,
    Neutral,
}

impl MarketRegime {
    /// 从外部标签解析，无法识别的标签回退到 NEUTRAL
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_uppercase().as_str() {
            "STRONG_TRENDING" => MarketRegime::StrongTrending,
            "TRENDING" => MarketRegime::Trending,
            "RANGING" => MarketRegime::Ranging,
            "CHOPPY" => MarketRegime::Choppy,
            "VOLATILE" => MarketRegime::Volatile,
            "NEUTRAL" => MarketRegime::Neutral,
            _ => MarketRegime::Neutral,
        }
    }

    /// 是否处于趋势行情
    pub fn is_trending(&self) -> bool {
        matches!(self, MarketRegime::StrongTrending | MarketRegime::Trending)
    }

    /// 是否处于震荡行情
    pub fn is_ranging_or_choppy(&self) -> bool {
        matches!(self, MarketRegime::Ranging | MarketRegime::Choppy)
    }
}

/// 候选交易信号
///
/// 每个扫描周期创建一次、消费一次，不做持久化
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    /// 策略模块上报的原始标识符，由 StrategyRegistry 折叠为 StrategyKey
    pub strategy_id: String,
    pub direction: SignalDirection,
    /// 置信度，0~10
    pub confidence: f64,
    /// 自由格式标签，例如优势来源分类
    pub tags: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

impl Signal {
    pub fn new(
        symbol: impl Into<String>,
        strategy_id: impl Into<String>,
        direction: SignalDirection,
        confidence: f64,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            strategy_id: strategy_id.into(),
            direction,
            confidence,
            tags: Vec::new(),
            generated_at: Utc::now(),
        }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// 是否标记为逆势信号
    ///
    /// 迁移期间保留子串匹配语义（标签中任意位置出现 counter_trend），
    /// 与历史行为保持一致
    pub fn is_counter_trend(&self) -> bool {
        self.tags.iter().any(|t| t.contains("counter_trend"))
    }

    /// 是否标记为趋势跟随信号，子串语义同上
    pub fn is_trend_following(&self) -> bool {
        self.tags.iter().any(|t| t.contains("trend_following"))
    }
}

/// 通过协调的信号，附带最终归属的策略键
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmittedSignal {
    pub signal: Signal,
    /// 本轮胜出并持有该标的租约的策略
    pub owner: StrategyKey,
    /// 胜出时的市场状态优先级
    pub priority: u32,
}

/// 成交审计记录
///
/// 只在交易真实提交之后写入
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub trade_id: String,
    pub user_id: String,
    pub strategy: StrategyKey,
    pub symbol: String,
    pub recorded_at: DateTime<Utc>,
}

impl TradeRecord {
    pub fn new(
        trade_id: impl Into<String>,
        user_id: impl Into<String>,
        strategy: StrategyKey,
        symbol: impl Into<String>,
    ) -> Self {
        Self {
            trade_id: trade_id.into(),
            user_id: user_id.into(),
            strategy,
            symbol: symbol.into(),
            recorded_at: Utc::now(),
        }
    }
}

/// 熔断违规审计记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViolationRecord {
    /// 触发时观测到的滑动窗口速率
    pub observed_tps: f64,
    /// 配置的速率上限
    pub limit: u32,
    /// 本次熔断暂停秒数
    pub pause_seconds: f64,
    /// 当日累计违规次数（含本次）
    pub violations_today: u32,
    pub occurred_at: DateTime<Utc>,
}
