//! 模拟器注册表
//!
//! 按 (用户, 卡池) 缓存一份模拟器状态，每次访问刷新访问时间戳。
//! 未指定卡池时解析「该用户最近使用的卡池」：无缓存条目则退回全目录
//! 开放时间最新的卡池。条目默认永不淘汰（与原行为一致），
//! `evict_idle` 仅在配置开启时由后台循环调用。

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::core::BridgeError;
use crate::gacha::executor::{Pull, Simulator, SimulatorFactory, UpPoolSimulator};
use crate::gacha::tables::TableCache;

struct ExecutorEntry {
    /// 最近访问时刻（毫秒时间戳）
    last_access: i64,
    sim: Box<dyn Simulator>,
}

pub struct ExecutorRegistry {
    tables: Arc<TableCache>,
    factory: SimulatorFactory,
    /// user_id -> pool_id -> 模拟器
    entries: RwLock<HashMap<String, HashMap<String, ExecutorEntry>>>,
}

impl ExecutorRegistry {
    pub fn new(tables: Arc<TableCache>) -> Self {
        Self::with_factory(
            tables,
            Arc::new(|pool, chars| Box::new(UpPoolSimulator::new(pool, chars))),
        )
    }

    /// 注入模拟器实现（测试用确定性实现，或接入真实模拟库）
    pub fn with_factory(tables: Arc<TableCache>, factory: SimulatorFactory) -> Self {
        Self {
            tables,
            factory,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// 确保 (user, pool) 的条目存在并刷新其访问时间，然后对模拟器执行闭包。
    /// 卡池必须同时存在于两张表中，否则 [`BridgeError::PoolNotFound`]。
    async fn with_executor<R>(
        &self,
        user_id: &str,
        pool_id: &str,
        f: impl FnOnce(&mut dyn Simulator) -> R,
    ) -> Result<R, BridgeError> {
        let exists = self
            .entries
            .read()
            .await
            .get(user_id)
            .map(|pools| pools.contains_key(pool_id))
            .unwrap_or(false);

        if !exists {
            // 建表查询不持写锁
            let pool = self.tables.joined_pool(pool_id).await?;
            let chars = self.tables.characters();
            let sim = (self.factory)(&pool, &chars);
            self.entries
                .write()
                .await
                .entry(user_id.to_string())
                .or_default()
                .entry(pool_id.to_string())
                .or_insert_with(|| {
                    tracing::debug!(user = %user_id, pool = %pool_id, "executor created");
                    ExecutorEntry {
                        last_access: 0,
                        sim,
                    }
                });
        }

        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(user_id)
            .and_then(|pools| pools.get_mut(pool_id))
            .ok_or_else(|| BridgeError::PoolNotFound(pool_id.to_string()))?;
        entry.last_access = chrono::Utc::now().timestamp_millis();
        Ok(f(entry.sim.as_mut()))
    }

    /// 对指定卡池抽 `count` 次。第一抽即耗尽返回 [`BridgeError::PoolExhausted`]，
    /// 中途耗尽返回已抽出的部分
    pub async fn draw(
        &self,
        user_id: &str,
        pool_id: &str,
        count: u32,
    ) -> Result<Vec<Pull>, BridgeError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let pulls = self
            .with_executor(user_id, pool_id, |sim| {
                let mut out = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    match sim.draw_once() {
                        Some(pull) => out.push(pull),
                        None => break,
                    }
                }
                out
            })
            .await?;
        if pulls.is_empty() {
            return Err(BridgeError::PoolExhausted(pool_id.to_string()));
        }
        Ok(pulls)
    }

    /// 该 (用户, 卡池) 的累计抽数
    pub async fn draw_count(&self, user_id: &str, pool_id: &str) -> Result<u32, BridgeError> {
        self.with_executor(user_id, pool_id, |sim| sim.draw_count())
            .await
    }

    /// 解析该用户「最近使用」的卡池：有缓存条目时取访问时间最大者
    /// （并列取迭代序首个），否则取全目录开放时间最新的卡池
    pub async fn most_recent_pool(&self, user_id: &str) -> Result<String, BridgeError> {
        let user_pools: Vec<(String, i64)> = self
            .entries
            .read()
            .await
            .get(user_id)
            .map(|pools| {
                pools
                    .iter()
                    .map(|(id, e)| (id.clone(), e.last_access))
                    .collect()
            })
            .unwrap_or_default();

        if let Some(first) = user_pools.first().cloned() {
            let best = user_pools.into_iter().fold(first, |best, cur| {
                if cur.1 > best.1 {
                    cur
                } else {
                    best
                }
            });
            return Ok(best.0);
        }

        self.tables.most_recent_pool_id().await
    }

    /// 「最近使用的卡池」上的抽取，返回 (卡池 id, 结果)
    pub async fn draw_most_recent(
        &self,
        user_id: &str,
        count: u32,
    ) -> Result<(String, Vec<Pull>), BridgeError> {
        let pool_id = self.most_recent_pool(user_id).await?;
        let pulls = self.draw(user_id, &pool_id, count).await?;
        Ok((pool_id, pulls))
    }

    /// 淘汰闲置超过 `max_idle_hours` 的条目（默认不启用）
    pub async fn evict_idle(&self, max_idle_hours: u64) -> usize {
        let cutoff = chrono::Utc::now().timestamp_millis() - max_idle_hours as i64 * 3600 * 1000;
        let mut entries = self.entries.write().await;
        let mut removed = 0;
        for pools in entries.values_mut() {
            let before = pools.len();
            pools.retain(|_, e| e.last_access >= cutoff);
            removed += before - pools.len();
        }
        entries.retain(|_, pools| !pools.is_empty());
        if removed > 0 {
            tracing::info!(removed, "evicted idle executors");
        }
        removed
    }
}
