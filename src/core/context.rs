//! 组合根上下文
//!
//! 进程级单例（存储注册表、任务队列、表缓存、模拟器注册表）都挂在这个
//! 显式上下文对象上，由 main 构建并传给各边界，不使用全局可变状态。

use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::core::BridgeError;
use crate::gacha::{ExecutorRegistry, HttpTableFetcher, TableCache};
use crate::store::StoreRegistry;
use crate::tasks::{TaskQueue, TaskType, WaitOutcome};

pub struct BridgeContext {
    pub config: AppConfig,
    pub stores: Arc<StoreRegistry>,
    pub tasks: Arc<TaskQueue>,
    pub tables: Arc<TableCache>,
    pub executors: Arc<ExecutorRegistry>,
}

impl BridgeContext {
    /// 构建全部组件。本地静态表缺失是启动错误。
    /// 必须在 tokio 运行时内调用（任务存储会启动文件监视任务）。
    pub fn new(config: AppConfig) -> Result<Self, BridgeError> {
        std::fs::create_dir_all(&config.data.dir)?;

        let stores = Arc::new(StoreRegistry::new());
        let tasks = Arc::new(TaskQueue::open(
            &stores,
            config.data.tasks_file(),
            config.data.images_dir(),
        )?);

        let fetcher = Box::new(HttpTableFetcher::new(config.gacha.endpoint.clone()));
        let tables = Arc::new(TableCache::load(
            &config.data.gamedata_dir,
            fetcher,
            Duration::from_secs(config.gacha.cache_ttl_hours * 3600),
        )?);
        let executors = Arc::new(ExecutorRegistry::new(Arc::clone(&tables)));

        Ok(Self {
            config,
            stores,
            tasks,
            tables,
            executors,
        })
    }

    /// 提交任务并按配置的默认超时等待完成
    pub async fn submit_and_wait(
        &self,
        task_type: TaskType,
        params: Option<String>,
    ) -> WaitOutcome {
        let id = self.tasks.submit(task_type, params);
        self.tasks
            .await_completion(&id, Duration::from_secs(self.config.tasks.await_timeout_secs))
            .await
    }

    /// 停止任务存储的文件监视（进程退出前调用）
    pub fn shutdown(&self) {
        self.stores.close(self.config.data.tasks_file());
    }
}
