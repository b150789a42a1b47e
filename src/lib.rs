//! MaaBridge - 远程 MAA 任务调度与寻访模拟服务
//!
//! 聊天前端通过这里提交远程任务（截图、脚本化游戏会话等），远程代理
//! 执行后经 HTTP 边界上报结果；同一前端还可以对缓存的卡池表跑寻访模拟。
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型与组合根上下文
//! - **store**: 可持久化的响应式 JSON 文档存储（单路径单例 + 文件监视）
//! - **tasks**: 远程任务队列（提交 / 等待完成 / 上报 / 按状态查询）
//! - **gacha**: 卡池表缓存、检索索引与按 (用户, 卡池) 缓存的模拟器
//! - **server**: 面向远程代理的 HTTP 边界

pub mod config;
pub mod core;
pub mod gacha;
pub mod server;
pub mod store;
pub mod tasks;
