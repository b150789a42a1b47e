//! 可持久化的响应式 JSON 文档存储
//!
//! 每个路径对应一份内存中的 JSON 文档：内存修改写回磁盘，磁盘上的外部修改
//! 由后台任务按 mtime 轮询发现并读回内存，且二者通过单个重入闩互斥，
//! 自己的写入不会再触发自己的读回。每次内容变化都会递增一个 `watch`
//! 修订号，供 `tasks::TaskQueue::await_completion` 这类条件等待消费。
//!
//! 仅保证单进程内「一条路径一个实例」（见 [`StoreRegistry`]），
//! 多进程共享同一文件需要外部文件锁，这里不解决。

use std::any::Any;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, SystemTime};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::core::BridgeError;

/// 外部修改的轮询间隔
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// 单个 JSON 文档的句柄，克隆共享同一份内存实例
pub struct JsonStore<T> {
    inner: Arc<StoreInner<T>>,
}

impl<T> Clone for JsonStore<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct StoreInner<T> {
    path: PathBuf,
    data: RwLock<T>,
    /// 最近一次读/写失败的描述；成功不清除历史错误
    last_error: Mutex<Option<String>>,
    /// 重入闩：读回路径与写盘路径共用，轮询发现闩被持有时跳过本轮
    latch: AtomicBool,
    /// 每次内容变化递增
    revision: watch::Sender<u64>,
    /// 自己写盘产生的 mtime，轮询据此忽略自己的写入
    known_mtime: Mutex<Option<SystemTime>>,
    cancel: CancellationToken,
}

impl<T> JsonStore<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// 打开文档：文件存在则读入，否则把 `default` 写盘作为初始内容。
    /// 必须在 tokio 运行时内调用（会启动 mtime 轮询任务）。
    ///
    /// 注意：直接调用不做同路径去重，去重由 [`StoreRegistry::open`] 负责。
    pub fn open(path: impl AsRef<Path>, default: T) -> Self {
        let path = path.as_ref().to_path_buf();
        let (revision, _) = watch::channel(0u64);

        let store = Self {
            inner: Arc::new(StoreInner {
                path,
                data: RwLock::new(default.clone()),
                last_error: Mutex::new(None),
                latch: AtomicBool::new(false),
                revision,
                known_mtime: Mutex::new(None),
                cancel: CancellationToken::new(),
            }),
        };

        if store.inner.path.exists() {
            store.read_from_disk();
        } else {
            store.persist();
        }
        store.remember_mtime();
        store.spawn_watcher();
        store
    }

    /// 当前文档内容的快照
    pub fn read(&self) -> T {
        match self.inner.data.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// 整体替换文档内容并落盘
    pub fn write(&self, value: T) {
        self.mutate(|data| *data = value);
    }

    /// 在写锁下就地修改文档，随后落盘并递增修订号
    pub fn mutate<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let out = {
            let mut guard = match self.inner.data.write() {
                Ok(g) => g,
                Err(poisoned) => poisoned.into_inner(),
            };
            f(&mut guard)
        };

        // 闩已被读回路径持有时跳过本次写盘（外部修改会被合并覆盖，
        // 单写者约定下可接受）；内存值始终保留本次修改
        if !self.inner.latch.swap(true, Ordering::SeqCst) {
            self.persist();
            self.remember_mtime();
            self.inner.latch.store(false, Ordering::SeqCst);
        }
        self.inner.revision.send_modify(|r| *r += 1);
        out
    }

    /// 订阅修订号：文档内容每次变化（含外部修改）都会唤醒
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.revision.subscribe()
    }

    /// 最近一次读/写失败的描述
    pub fn last_error(&self) -> Option<String> {
        match self.inner.last_error.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// 停止文件监视。注册表中的条目由 [`StoreRegistry::close`] 移除
    pub fn close(&self) {
        self.inner.cancel.cancel();
    }

    fn spawn_watcher(&self) {
        let store = self.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(POLL_INTERVAL);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = store.inner.cancel.cancelled() => break,
                    _ = tick.tick() => store.poll_disk(),
                }
            }
            tracing::debug!(path = %store.inner.path.display(), "store watcher stopped");
        });
    }

    /// 轮询 mtime，发现外部修改（含文件被删除）则读回内存
    fn poll_disk(&self) {
        if self.inner.latch.load(Ordering::SeqCst) {
            return;
        }
        let mtime = std::fs::metadata(&self.inner.path)
            .and_then(|m| m.modified())
            .ok();
        {
            let mut known = match self.inner.known_mtime.lock() {
                Ok(g) => g,
                Err(poisoned) => poisoned.into_inner(),
            };
            if *known == mtime {
                return;
            }
            *known = mtime;
        }
        self.read_from_disk();
        self.inner.revision.send_modify(|r| *r += 1);
    }

    /// 从磁盘读回内存；失败只记录错误，内存值保持不变
    fn read_from_disk(&self) {
        if self.inner.latch.swap(true, Ordering::SeqCst) {
            return;
        }
        let parsed = std::fs::read_to_string(&self.inner.path)
            .map_err(|e| e.to_string())
            .and_then(|s| serde_json::from_str::<T>(&s).map_err(|e| e.to_string()));
        match parsed {
            Ok(value) => {
                let mut guard = match self.inner.data.write() {
                    Ok(g) => g,
                    Err(poisoned) => poisoned.into_inner(),
                };
                *guard = value;
            }
            Err(e) => {
                tracing::warn!(path = %self.inner.path.display(), "store read failed: {}", e);
                self.record_error(e);
            }
        }
        self.inner.latch.store(false, Ordering::SeqCst);
    }

    /// 序列化当前内存值并写盘；失败只记录错误，内存值仍是本次尝试的值
    fn persist(&self) {
        let serialized = {
            let guard = match self.inner.data.read() {
                Ok(g) => g,
                Err(poisoned) => poisoned.into_inner(),
            };
            serde_json::to_string(&*guard)
        };
        let result = serialized
            .map_err(|e| e.to_string())
            .and_then(|s| std::fs::write(&self.inner.path, s).map_err(|e| e.to_string()));
        if let Err(e) = result {
            tracing::warn!(path = %self.inner.path.display(), "store write failed: {}", e);
            self.record_error(e);
        }
    }

    fn remember_mtime(&self) {
        let mtime = std::fs::metadata(&self.inner.path)
            .and_then(|m| m.modified())
            .ok();
        match self.inner.known_mtime.lock() {
            Ok(mut g) => *g = mtime,
            Err(poisoned) => *poisoned.into_inner() = mtime,
        }
    }

    fn record_error(&self, message: String) {
        match self.inner.last_error.lock() {
            Ok(mut g) => *g = Some(message),
            Err(poisoned) => *poisoned.into_inner() = Some(message),
        }
    }
}

struct RegistryEntry {
    handle: Box<dyn Any + Send + Sync>,
    cancel: CancellationToken,
}

/// 按路径去重的存储注册表：一条路径全进程至多一个监视实例。
/// 由组合根（`core::BridgeContext`）持有，不做全局可变状态。
#[derive(Default)]
pub struct StoreRegistry {
    entries: Mutex<HashMap<PathBuf, RegistryEntry>>,
}

impl StoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 返回该路径的单例句柄；不存在则创建（读盘或写入 `default`）。
    /// 同一路径以不同类型打开时返回 [`BridgeError::StoreTypeConflict`]。
    pub fn open<T>(&self, path: impl AsRef<Path>, default: T) -> Result<JsonStore<T>, BridgeError>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let path = path.as_ref().to_path_buf();
        let mut entries = match self.entries.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(entry) = entries.get(&path) {
            return entry
                .handle
                .downcast_ref::<JsonStore<T>>()
                .cloned()
                .ok_or_else(|| BridgeError::StoreTypeConflict(path.display().to_string()));
        }

        let store = JsonStore::open(&path, default);
        entries.insert(
            path,
            RegistryEntry {
                handle: Box::new(store.clone()),
                cancel: store.inner.cancel.clone(),
            },
        );
        Ok(store)
    }

    /// 停止监视并移除注册表条目；路径未注册时返回 false
    pub fn close(&self, path: impl AsRef<Path>) -> bool {
        let mut entries = match self.entries.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        match entries.remove(path.as_ref()) {
            Some(entry) => {
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }
}
