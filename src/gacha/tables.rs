//! 卡池表缓存
//!
//! 客户端表与角色表来自本地静态文件，进程生命周期内只读一次；
//! 服务端表从远端按 TTL（默认 24 小时）拉取。拉取失败向调用方上抛，
//! 已缓存的旧值在下一次成功之前不会被丢弃；首次拉取就失败时两表缺一，
//! 依赖方必须拒绝服务。

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::core::BridgeError;
use crate::gacha::index::{self, PoolEntry};

/// 本地客户端卡池表（`gacha_table.json`）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GachaClientTable {
    pub gacha_pool_client: Vec<ClientPoolRecord>,
}

/// 客户端可见的卡池记录
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientPoolRecord {
    pub gacha_pool_id: String,
    pub gacha_pool_name: String,
    /// 开放时间（秒级时间戳）
    pub open_time: i64,
    #[serde(default)]
    pub end_time: Option<i64>,
}

/// 远端服务端卡池表，形如 `{"gachaPoolClient": [...]}`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GachaServerTable {
    pub gacha_pool_client: Vec<ServerPoolRecord>,
}

/// 服务端可见的卡池详情（up 角色、抽取上限）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerPoolRecord {
    pub gacha_pool_id: String,
    #[serde(default)]
    pub up_char_list: Vec<String>,
    #[serde(default)]
    pub limit_times: Option<u32>,
}

/// 角色静态信息（`character_table.json` 的值，键是角色 ID）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterInfo {
    pub name: String,
    pub rarity: u8,
}

pub type CharacterTable = HashMap<String, CharacterInfo>;

/// 同一卡池 id 在两张表中的并联记录。卡池仅在两表同时命中时可用
#[derive(Debug, Clone)]
pub struct JoinedPool {
    pub client: ClientPoolRecord,
    pub server: ServerPoolRecord,
}

/// 服务端表拉取的抽象：生产实现走 HTTP，测试注入假实现
#[async_trait]
pub trait ServerTableFetcher: Send + Sync {
    async fn fetch(&self) -> Result<GachaServerTable, BridgeError>;
}

/// `GET <endpoint>/gacha_table.json`
pub struct HttpTableFetcher {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTableFetcher {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl ServerTableFetcher for HttpTableFetcher {
    async fn fetch(&self) -> Result<GachaServerTable, BridgeError> {
        let url = format!("{}/gacha_table.json", self.endpoint.trim_end_matches('/'));
        let table = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(table)
    }
}

/// 卡池表缓存与检索索引
pub struct TableCache {
    fetcher: Box<dyn ServerTableFetcher>,
    ttl: Duration,
    client_table: Arc<GachaClientTable>,
    characters: Arc<CharacterTable>,
    server_table: RwLock<Option<Arc<GachaServerTable>>>,
    last_fetched: RwLock<Option<Instant>>,
    /// 惰性构建，只在进程启动或显式 reset 时失效
    index: RwLock<Option<Arc<Vec<PoolEntry>>>>,
}

impl TableCache {
    /// 读入本地静态表并构建缓存。本地文件缺失或损坏是启动错误
    pub fn load(
        gamedata_dir: &Path,
        fetcher: Box<dyn ServerTableFetcher>,
        ttl: Duration,
    ) -> Result<Self, BridgeError> {
        let client_table: GachaClientTable =
            read_json(&gamedata_dir.join("gacha_table.json"))?;
        let characters: CharacterTable =
            read_json(&gamedata_dir.join("character_table.json"))?;
        tracing::info!(
            pools = client_table.gacha_pool_client.len(),
            characters = characters.len(),
            "gamedata loaded"
        );
        Ok(Self::new(client_table, characters, fetcher, ttl))
    }

    pub fn new(
        client_table: GachaClientTable,
        characters: CharacterTable,
        fetcher: Box<dyn ServerTableFetcher>,
        ttl: Duration,
    ) -> Self {
        Self {
            fetcher,
            ttl,
            client_table: Arc::new(client_table),
            characters: Arc::new(characters),
            server_table: RwLock::new(None),
            last_fetched: RwLock::new(None),
            index: RwLock::new(None),
        }
    }

    pub fn characters(&self) -> Arc<CharacterTable> {
        Arc::clone(&self.characters)
    }

    pub fn client_table(&self) -> Arc<GachaClientTable> {
        Arc::clone(&self.client_table)
    }

    /// 返回 (客户端表, 服务端表)。TTL 内直接命中缓存；过期则重新拉取，
    /// 时间戳只在拉取成功后重置。并发过期可能触发重复拉取，幂等可接受。
    pub async fn tables(
        &self,
    ) -> Result<(Arc<GachaClientTable>, Arc<GachaServerTable>), BridgeError> {
        {
            let fetched_at = *self.last_fetched.read().await;
            let cached = self.server_table.read().await.clone();
            if let (Some(at), Some(server)) = (fetched_at, cached) {
                if at.elapsed() < self.ttl {
                    return Ok((Arc::clone(&self.client_table), server));
                }
            }
        }

        tracing::info!("refreshing remote gacha table");
        let fetched = Arc::new(self.fetcher.fetch().await?);
        *self.server_table.write().await = Some(Arc::clone(&fetched));
        *self.last_fetched.write().await = Some(Instant::now());
        Ok((Arc::clone(&self.client_table), fetched))
    }

    /// 两表并联取卡池；任一表缺失该 id 即视为未找到
    pub async fn joined_pool(&self, pool_id: &str) -> Result<JoinedPool, BridgeError> {
        let (client, server) = self.tables().await?;
        let c = client
            .gacha_pool_client
            .iter()
            .find(|p| p.gacha_pool_id == pool_id)
            .ok_or_else(|| BridgeError::PoolNotFound(pool_id.to_string()))?;
        let s = server
            .gacha_pool_client
            .iter()
            .find(|p| p.gacha_pool_id == pool_id)
            .ok_or_else(|| BridgeError::PoolNotFound(pool_id.to_string()))?;
        Ok(JoinedPool {
            client: c.clone(),
            server: s.clone(),
        })
    }

    /// 全目录中 open_time 最大的可用卡池；并列取迭代序首个
    pub async fn most_recent_pool_id(&self) -> Result<String, BridgeError> {
        let (client, server) = self.tables().await?;
        let mut best: Option<&ClientPoolRecord> = None;
        for pool in &client.gacha_pool_client {
            let usable = server
                .gacha_pool_client
                .iter()
                .any(|s| s.gacha_pool_id == pool.gacha_pool_id);
            if !usable {
                continue;
            }
            if best.map(|b| pool.open_time > b.open_time).unwrap_or(true) {
                best = Some(pool);
            }
        }
        best.map(|p| p.gacha_pool_id.clone())
            .ok_or(BridgeError::TablesUnavailable)
    }

    /// 检索/展示索引：按开放时间倒序的全卡池列表，重名卡池已消歧
    pub async fn search_index(&self) -> Result<Arc<Vec<PoolEntry>>, BridgeError> {
        if let Some(cached) = self.index.read().await.clone() {
            return Ok(cached);
        }
        let (client, server) = self.tables().await?;
        let built = Arc::new(index::build_index(&client, &server, &self.characters));
        *self.index.write().await = Some(Arc::clone(&built));
        Ok(built)
    }

    /// 别名子串匹配，最多 25 条，保持索引中的最新优先顺序
    pub async fn search(&self, query: &str) -> Result<Vec<PoolEntry>, BridgeError> {
        let idx = self.search_index().await?;
        Ok(idx
            .iter()
            .filter(|e| e.matches(query))
            .take(25)
            .cloned()
            .collect())
    }

    /// 显式失效检索索引（下次访问重建）
    pub async fn reset_index(&self) {
        *self.index.write().await = None;
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, BridgeError> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// 计数假实现：记录拉取次数，可切换为失败
    pub(crate) struct FakeFetcher {
        pub calls: AtomicUsize,
        pub fail: AtomicBool,
        pub table: GachaServerTable,
    }

    impl FakeFetcher {
        pub fn new(table: GachaServerTable) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: AtomicBool::new(false),
                table,
            }
        }
    }

    #[async_trait]
    impl ServerTableFetcher for Arc<FakeFetcher> {
        async fn fetch(&self) -> Result<GachaServerTable, BridgeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(BridgeError::TablesUnavailable);
            }
            Ok(self.table.clone())
        }
    }

    pub(crate) fn client_pool(id: &str, name: &str, open_time: i64) -> ClientPoolRecord {
        ClientPoolRecord {
            gacha_pool_id: id.to_string(),
            gacha_pool_name: name.to_string(),
            open_time,
            end_time: None,
        }
    }

    pub(crate) fn server_pool(id: &str, up: &[&str]) -> ServerPoolRecord {
        ServerPoolRecord {
            gacha_pool_id: id.to_string(),
            up_char_list: up.iter().map(|s| s.to_string()).collect(),
            limit_times: None,
        }
    }

    pub(crate) fn characters() -> CharacterTable {
        let mut chars = CharacterTable::new();
        chars.insert(
            "char_1001".to_string(),
            CharacterInfo {
                name: "能天使".to_string(),
                rarity: 5,
            },
        );
        chars.insert(
            "char_1002".to_string(),
            CharacterInfo {
                name: "德克萨斯".to_string(),
                rarity: 4,
            },
        );
        chars.insert(
            "char_1003".to_string(),
            CharacterInfo {
                name: "芬".to_string(),
                rarity: 2,
            },
        );
        chars
    }

    fn cache_with(
        pools: Vec<ClientPoolRecord>,
        server: Vec<ServerPoolRecord>,
        ttl: Duration,
    ) -> (TableCache, Arc<FakeFetcher>) {
        let fetcher = Arc::new(FakeFetcher::new(GachaServerTable {
            gacha_pool_client: server,
        }));
        let cache = TableCache::new(
            GachaClientTable {
                gacha_pool_client: pools,
            },
            characters(),
            Box::new(Arc::clone(&fetcher)),
            ttl,
        );
        (cache, fetcher)
    }

    #[tokio::test]
    async fn test_tables_memoized_within_ttl() {
        let (cache, fetcher) = cache_with(
            vec![client_pool("p1", "常驻标准寻访", 100)],
            vec![server_pool("p1", &[])],
            Duration::from_secs(3600),
        );

        let (_, first) = cache.tables().await.unwrap();
        let (_, second) = cache.tables().await.unwrap();
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        // 同一 Arc 实例
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_expired_ttl_refetches_once() {
        let (cache, fetcher) = cache_with(
            vec![client_pool("p1", "常驻标准寻访", 100)],
            vec![server_pool("p1", &[])],
            Duration::from_millis(0),
        );

        cache.tables().await.unwrap();
        cache.tables().await.unwrap();
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_first_fetch_failure_fails_closed() {
        let (cache, fetcher) = cache_with(
            vec![client_pool("p1", "常驻标准寻访", 100)],
            vec![server_pool("p1", &[])],
            Duration::from_secs(3600),
        );
        fetcher.fail.store(true, Ordering::SeqCst);

        assert!(cache.tables().await.is_err());
        assert!(cache.joined_pool("p1").await.is_err());
        assert!(cache.most_recent_pool_id().await.is_err());
    }

    #[tokio::test]
    async fn test_failure_after_success_keeps_previous_table() {
        let (cache, fetcher) = cache_with(
            vec![client_pool("p1", "常驻标准寻访", 100)],
            vec![server_pool("p1", &[])],
            Duration::from_millis(0),
        );

        cache.tables().await.unwrap();
        fetcher.fail.store(true, Ordering::SeqCst);

        // TTL 已过且拉取失败：错误上抛，但旧表未被清空
        assert!(cache.tables().await.is_err());
        assert!(cache.server_table.read().await.is_some());

        fetcher.fail.store(false, Ordering::SeqCst);
        let (_, recovered) = cache.tables().await.unwrap();
        assert_eq!(recovered.gacha_pool_client.len(), 1);
    }

    #[tokio::test]
    async fn test_joined_pool_requires_both_tables() {
        let (cache, _) = cache_with(
            vec![
                client_pool("p1", "常驻标准寻访", 100),
                client_pool("p2", "未在服务端的池", 200),
            ],
            vec![server_pool("p1", &["char_1001"])],
            Duration::from_secs(3600),
        );

        assert!(cache.joined_pool("p1").await.is_ok());
        assert!(matches!(
            cache.joined_pool("p2").await,
            Err(BridgeError::PoolNotFound(_))
        ));
        assert!(matches!(
            cache.joined_pool("p9").await,
            Err(BridgeError::PoolNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_most_recent_pool_is_max_open_time() {
        let (cache, _) = cache_with(
            vec![
                client_pool("old", "旧池", 100),
                client_pool("new", "新池", 300),
                client_pool("mid", "中池", 200),
            ],
            vec![
                server_pool("old", &[]),
                server_pool("new", &[]),
                server_pool("mid", &[]),
            ],
            Duration::from_secs(3600),
        );

        assert_eq!(cache.most_recent_pool_id().await.unwrap(), "new");
    }

    #[tokio::test]
    async fn test_search_caps_at_25_and_keeps_order() {
        let pools: Vec<ClientPoolRecord> = (0i64..30)
            .map(|i| client_pool(&format!("p{:02}", i), &format!("寻访{:02}", i), i))
            .collect();
        let server: Vec<ServerPoolRecord> = (0..30)
            .map(|i| server_pool(&format!("p{:02}", i), &[]))
            .collect();
        let (cache, _) = cache_with(pools, server, Duration::from_secs(3600));

        let hits = cache.search("寻访").await.unwrap();
        assert_eq!(hits.len(), 25);
        // 最新优先的顺序在截断后保持不变
        for pair in hits.windows(2) {
            assert!(pair[0].open_time > pair[1].open_time);
        }
        assert_eq!(hits[0].pool_id, "p29");
    }

    #[tokio::test]
    async fn test_index_rebuilt_only_after_reset() {
        let (cache, fetcher) = cache_with(
            vec![client_pool("p1", "常驻标准寻访", 100)],
            vec![server_pool("p1", &[])],
            Duration::from_secs(3600),
        );

        let first = cache.search_index().await.unwrap();
        let second = cache.search_index().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);

        cache.reset_index().await;
        let rebuilt = cache.search_index().await.unwrap();
        assert!(!Arc::ptr_eq(&first, &rebuilt));
    }

    #[tokio::test]
    async fn test_most_recent_skips_pools_missing_from_server_table() {
        let (cache, _) = cache_with(
            vec![
                client_pool("unusable", "只在客户端", 999),
                client_pool("usable", "两表都有", 100),
            ],
            vec![server_pool("usable", &[])],
            Duration::from_secs(3600),
        );

        assert_eq!(cache.most_recent_pool_id().await.unwrap(), "usable");
    }
}
