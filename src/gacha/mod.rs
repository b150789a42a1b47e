//! 寻访（gacha）模拟子系统
//!
//! - **tables**: 本地/远端卡池表缓存（24h TTL），两表按卡池 id 并联
//! - **index**: 检索/展示索引（重名消歧、最新优先排序、别名匹配）
//! - **executor**: 模拟器缝合面与内建实现
//! - **registry**: 按 (用户, 卡池) 缓存模拟器，解析「最近使用的卡池」

pub mod executor;
pub mod index;
pub mod registry;
pub mod tables;

pub use executor::{Pull, Simulator, SimulatorFactory, UpPoolSimulator};
pub use index::PoolEntry;
pub use registry::ExecutorRegistry;
pub use tables::{
    CharacterInfo, CharacterTable, ClientPoolRecord, GachaClientTable, GachaServerTable,
    HttpTableFetcher, JoinedPool, ServerPoolRecord, ServerTableFetcher, TableCache,
};
