//! 远程任务队列
//!
//! 建立在 `store::JsonStore<Vec<MaaTask>>` 之上的只增任务列表：
//! 前端提交后等待完成，远程代理通过 HTTP 边界上报结果。
//! 等待基于存储的修订号通道加超时，不阻塞其他操作。

use std::path::PathBuf;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::core::BridgeError;
use crate::store::{JsonStore, StoreRegistry};
use crate::tasks::types::{MaaTask, StatusReport, TaskId, TaskStatus, TaskType, WaitOutcome};

pub struct TaskQueue {
    store: JsonStore<Vec<MaaTask>>,
    images_dir: PathBuf,
}

impl TaskQueue {
    pub fn new(store: JsonStore<Vec<MaaTask>>, images_dir: PathBuf) -> Self {
        Self { store, images_dir }
    }

    /// 经注册表打开 `tasks_file` 并构建队列（组合根调用）
    pub fn open(
        registry: &StoreRegistry,
        tasks_file: impl AsRef<std::path::Path>,
        images_dir: PathBuf,
    ) -> Result<Self, BridgeError> {
        let store = registry.open(tasks_file, Vec::new())?;
        Ok(Self::new(store, images_dir))
    }

    /// 追加一条 Pending 任务，返回任务 ID
    pub fn submit(&self, task_type: TaskType, params: Option<String>) -> TaskId {
        let id = uuid::Uuid::new_v4().to_string();
        let task = MaaTask {
            id: id.clone(),
            task_type,
            status: TaskStatus::Pending,
            params,
            payload: None,
            created_at: Some(chrono::Utc::now().timestamp_millis()),
        };
        self.store.mutate(|tasks| tasks.push(task));
        tracing::info!(task = %id, ?task_type, "task submitted");
        id
    }

    /// 按 ID 取任务快照
    pub fn get(&self, id: &str) -> Option<MaaTask> {
        self.store.read().into_iter().find(|t| t.id == id)
    }

    /// 按状态过滤的快照，不阻塞
    pub fn query_by_status(&self, status: TaskStatus) -> Vec<MaaTask> {
        self.store
            .read()
            .into_iter()
            .filter(|t| t.status == status)
            .collect()
    }

    /// 等待任务离开 Pending，直到 `timeout` 为止。
    /// 超时返回 [`WaitOutcome::TimedOut`]，任务记录不受影响；
    /// 等待只挂起当前调用，其余提交/上报/查询可自由交错。
    pub async fn await_completion(&self, id: &str, timeout: Duration) -> WaitOutcome {
        let mut rx = self.store.subscribe();
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(task) = self.get(id) {
                if task.status.is_terminal() {
                    return WaitOutcome::Completed(task);
                }
            }
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => return WaitOutcome::TimedOut,
                changed = rx.changed() => {
                    // 存储被关闭时不再有唤醒，按超时处理
                    if changed.is_err() {
                        return WaitOutcome::TimedOut;
                    }
                }
            }
        }
    }

    /// 远程代理上报结果。未知 ID 与已终态的记录都是静默空操作
    /// （边界无从区分过期 ID 与外来 ID）。
    ///
    /// 截图类任务：payload 缺失或不是合法 base64 时一律记 Failure；
    /// 否则解码写入图片目录，任务 payload 记为该路径，状态记 Success。
    pub fn report(&self, report: StatusReport) -> Result<(), BridgeError> {
        let Some(task) = self.get(&report.task) else {
            tracing::debug!(task = %report.task, "report for unknown task ignored");
            return Ok(());
        };
        if task.status.is_terminal() {
            tracing::debug!(task = %report.task, "report for finished task ignored");
            return Ok(());
        }

        if task.task_type.is_capture_image() {
            return self.apply_image_report(&report);
        }

        // 上报协议只有 SUCCESS / FAILURE；状态机不允许回到 Pending
        if !report.status.is_terminal() {
            tracing::warn!(task = %report.task, "non-terminal status report ignored");
            return Ok(());
        }

        self.apply(&report.task, report.status, report.payload);
        Ok(())
    }

    fn apply_image_report(&self, report: &StatusReport) -> Result<(), BridgeError> {
        let decoded = report
            .payload
            .as_deref()
            .and_then(|p| BASE64.decode(p.as_bytes()).ok());
        let Some(bytes) = decoded else {
            tracing::warn!(task = %report.task, "image report without usable payload");
            self.apply(&report.task, TaskStatus::Failure, None);
            return Ok(());
        };

        std::fs::create_dir_all(&self.images_dir)?;
        let image_path = self.images_dir.join(format!("{}.payload.jpeg", report.task));
        std::fs::write(&image_path, bytes)?;
        self.apply(
            &report.task,
            TaskStatus::Success,
            Some(image_path.display().to_string()),
        );
        Ok(())
    }

    fn apply(&self, id: &str, status: TaskStatus, payload: Option<String>) {
        self.store.mutate(|tasks| {
            if let Some(task) = tasks.iter_mut().find(|t| t.id == id) {
                if task.status.is_terminal() {
                    return;
                }
                task.status = status;
                if payload.is_some() {
                    task.payload = payload;
                }
            }
        });
        tracing::info!(task = %id, ?status, "task reported");
    }

    /// 保留策略（默认不启用）：删除早于 `max_age_hours` 的终态任务。
    /// 旧文件里没有 createdAt 的记录视为不可回收。
    pub fn cleanup_finished(&self, max_age_hours: u64) -> usize {
        let cutoff = chrono::Utc::now().timestamp_millis() - max_age_hours as i64 * 3600 * 1000;
        let removed = self.store.mutate(|tasks| {
            let before = tasks.len();
            tasks.retain(|t| {
                !(t.status.is_terminal() && t.created_at.map(|c| c < cutoff).unwrap_or(false))
            });
            before - tasks.len()
        });
        if removed > 0 {
            tracing::info!(removed, "cleaned up finished tasks");
        }
        removed
    }
}
