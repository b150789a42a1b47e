//! 错误类型与组合根上下文

pub mod context;
pub mod error;

pub use context::BridgeContext;
pub use error::BridgeError;
