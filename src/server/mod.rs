//! 面向远程代理的 HTTP 边界
//!
//! - `POST /api/maa/report-status`: 代理上报任务执行结果，响应恒为空
//!   （未知 ID 也返回 200，边界无从区分过期与外来 ID）
//! - `POST /api/maa/tasks?status=PENDING`: 按状态精确过滤任务列表
//! - `GET /health`

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::core::BridgeContext;
use crate::tasks::{MaaTask, StatusReport, TaskStatus};

/// 任务列表查询参数
#[derive(Debug, Deserialize)]
pub struct TaskListQuery {
    pub status: TaskStatus,
}

/// 任务列表响应体
#[derive(Debug, Serialize)]
pub struct TaskListResponse {
    pub tasks: Vec<MaaTask>,
}

/// 创建路由
pub fn create_router(ctx: Arc<BridgeContext>) -> Router {
    Router::new()
        .route("/api/maa/report-status", post(report_status))
        .route("/api/maa/tasks", post(list_tasks))
        .route("/health", get(|| async { "OK" }))
        .with_state(ctx)
}

/// POST /api/maa/report-status - 远程代理上报任务结果
async fn report_status(
    State(ctx): State<Arc<BridgeContext>>,
    Json(report): Json<StatusReport>,
) -> StatusCode {
    match ctx.tasks.report(report) {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::error!("report failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// POST /api/maa/tasks - 按状态过滤任务
async fn list_tasks(
    State(ctx): State<Arc<BridgeContext>>,
    Query(query): Query<TaskListQuery>,
) -> Json<TaskListResponse> {
    Json(TaskListResponse {
        tasks: ctx.tasks.query_by_status(query.status),
    })
}
