//! 桥接服务错误类型
//!
//! 任一错误都不应终止进程：调用方可重试或走降级路径。
//! 等待超时不是错误（任务之后仍可能完成），见 `tasks::WaitOutcome`。

use thiserror::Error;

/// 任务队列 / 卡池缓存 / 模拟器注册表可能出现的错误
#[derive(Error, Debug)]
pub enum BridgeError {
    /// 卡池在客户端表或服务端表中不存在（两表须以同一 id 同时命中才可用）
    #[error("Pool not found: {0}")]
    PoolNotFound(String),

    /// 模拟器报告抽取次数已耗尽，与「未找到」相区分
    #[error("Pool exhausted: {0}")]
    PoolExhausted(String),

    /// 首次拉取远端表尚未成功，依赖方必须拒绝服务
    #[error("Gacha tables unavailable")]
    TablesUnavailable,

    /// 同一路径以不同文档类型二次打开
    #[error("Store type conflict: {0}")]
    StoreTypeConflict(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Fetch error: {0}")]
    Fetch(#[from] reqwest::Error),
}
