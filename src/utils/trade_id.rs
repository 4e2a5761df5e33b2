//! 交易ID生成器
//!
//! 为每笔放行的交易生成唯一且可识别的ID：
//! 账户前缀 + 策略短码 + 紧凑时间戳 + 序列号 + 随机尾缀

use chrono::Utc;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::core::types::StrategyKey;

pub struct TradeIdGenerator {
    account_code: String,
    sequence: AtomicU64,
}

impl TradeIdGenerator {
    pub fn new(account_id: &str) -> Self {
        Self {
            account_code: Self::account_code(account_id),
            sequence: AtomicU64::new(0),
        }
    }

    /// 生成交易ID
    pub fn generate(&self, strategy: StrategyKey) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        let timestamp = Self::compact_timestamp();
        let salt = Self::random_suffix();

        format!(
            "{}{}{}{:04}{}",
            self.account_code,
            strategy.short_code(),
            timestamp,
            seq % 10000,
            salt
        )
    }

    /// 账户代码：取前3个字母数字字符，不足补X
    fn account_code(account_id: &str) -> String {
        let mut code: String = account_id
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .take(3)
            .collect::<String>()
            .to_uppercase();
        while code.len() < 3 {
            code.push('X');
        }
        code
    }

    /// 紧凑时间戳，格式 MMDDHHMM
    fn compact_timestamp() -> String {
        Utc::now().format("%m%d%H%M").to_string()
    }

    /// 两位随机尾缀，防止重启后序列号归零产生碰撞
    fn random_suffix() -> String {
        const CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
        let mut rng = rand::thread_rng();
        (0..2)
            .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
            .collect()
    }
}
