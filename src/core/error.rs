use thiserror::Error;

#[derive(Error, Debug)]
pub enum GateError {
    #[error("配置错误: {0}")]
    ConfigError(String),

    #[error("YAML配置错误: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("JSON序列化错误: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("IO错误: {0}")]
    IoError(#[from] std::io::Error),

    #[error("持久化错误: {0}")]
    PersistenceError(String),

    #[error("下单执行错误: {0}")]
    ExecutionError(String),

    #[error("锁等待超时: 操作 '{operation}' 超时 ({timeout_ms}ms)")]
    LockTimeout { operation: String, timeout_ms: u64 },
}

impl GateError {
    /// 判断错误是否可以忽略（不影响准入决策）
    ///
    /// 持久化是尽力而为的旁路写入，失败只记日志；
    /// 锁超时必须失败关闭（拒绝准入），不可忽略。
    pub fn is_swallowable(&self) -> bool {
        matches!(self, GateError::PersistenceError(_))
    }
}
