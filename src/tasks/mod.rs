//! 远程任务队列子系统
//!
//! - **types**: 任务记录、状态机与上报协议的线上格式
//! - **queue**: 提交 / 等待完成 / 上报 / 按状态查询

pub mod queue;
pub mod types;

pub use queue::TaskQueue;
pub use types::{MaaTask, StatusReport, TaskId, TaskStatus, TaskType, WaitOutcome};
