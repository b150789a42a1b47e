//! 任务队列与 HTTP 边界的集成测试
//!
//! 场景来自实际使用路径：前端提交截图任务，远程代理经 HTTP 上报
//! base64 图片，前端等待完成并取回落盘路径。

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use http_body_util::BodyExt;
use tower::ServiceExt;

use maa_bridge::config::AppConfig;
use maa_bridge::core::BridgeContext;
use maa_bridge::server::create_router;
use maa_bridge::tasks::{TaskStatus, TaskType, WaitOutcome};

/// 在临时目录里铺好最小 gamedata 并构建上下文
fn context_in(dir: &std::path::Path) -> Arc<BridgeContext> {
    let gamedata = dir.join("gamedata");
    std::fs::create_dir_all(&gamedata).unwrap();
    std::fs::write(
        gamedata.join("gacha_table.json"),
        r#"{"gachaPoolClient":[{"gachaPoolId":"p1","gachaPoolName":"测试寻访","openTime":100}]}"#,
    )
    .unwrap();
    std::fs::write(
        gamedata.join("character_table.json"),
        r#"{"char_1001":{"name":"能天使","rarity":5}}"#,
    )
    .unwrap();

    let mut config = AppConfig::default();
    config.data.dir = dir.join("data");
    config.data.gamedata_dir = gamedata;
    Arc::new(BridgeContext::new(config).unwrap())
}

fn report_request(task: &str, status: &str, payload: Option<&str>) -> Request<Body> {
    let mut body = serde_json::json!({ "task": task, "status": status });
    if let Some(p) = payload {
        body["payload"] = serde_json::Value::String(p.to_string());
    }
    Request::builder()
        .method("POST")
        .uri("/api/maa/report-status")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_capture_image_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context_in(dir.path());
    let router = create_router(Arc::clone(&ctx));

    let id = ctx.tasks.submit(TaskType::CaptureImageNow, None);
    let image = b"\xff\xd8\xff\xe0jpeg-bytes-here";
    let encoded = BASE64.encode(image);

    // 代理稍后经 HTTP 边界上报
    let reporter = router.clone();
    let report_id = id.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let resp = reporter
            .oneshot(report_request(&report_id, "SUCCESS", Some(&encoded)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    });

    match ctx.tasks.await_completion(&id, Duration::from_secs(5)).await {
        WaitOutcome::Completed(task) => {
            assert_eq!(task.status, TaskStatus::Success);
            let path = task.payload.expect("image path recorded");
            assert!(path.contains("images"));
            // 落盘内容可解码回原始字节
            assert_eq!(std::fs::read(&path).unwrap(), image);
        }
        WaitOutcome::TimedOut => panic!("expected completion"),
    }

    ctx.shutdown();
}

#[tokio::test]
async fn test_timeout_then_late_report_still_lands() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context_in(dir.path());
    let router = create_router(Arc::clone(&ctx));

    let id = ctx.tasks.submit(TaskType::HeartBeat, None);

    // 没有代理响应：等待以超时告终，记录保持 Pending
    let outcome = ctx
        .tasks
        .await_completion(&id, Duration::from_millis(100))
        .await;
    assert!(matches!(outcome, WaitOutcome::TimedOut));

    // 迟到的上报仍然生效
    let resp = router
        .clone()
        .oneshot(report_request(&id, "SUCCESS", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/maa/tasks?status=SUCCESS")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let tasks = parsed["tasks"].as_array().unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0]["id"], id.as_str());
    assert_eq!(tasks[0]["type"], "HeartBeat");

    ctx.shutdown();
}

#[tokio::test]
async fn test_report_unknown_id_returns_empty_ok() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context_in(dir.path());
    let router = create_router(Arc::clone(&ctx));

    let id = ctx.tasks.submit(TaskType::LinkStart, None);

    let resp = router
        .oneshot(report_request("not-a-real-id", "SUCCESS", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    // 队列不受影响
    assert_eq!(ctx.tasks.get(&id).unwrap().status, TaskStatus::Pending);
    assert!(ctx.tasks.query_by_status(TaskStatus::Success).is_empty());

    ctx.shutdown();
}

#[tokio::test]
async fn test_status_filter_is_exact() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context_in(dir.path());
    let router = create_router(Arc::clone(&ctx));

    ctx.tasks.submit(TaskType::LinkStartCombat, None);
    let done = ctx.tasks.submit(TaskType::LinkStartMall, None);
    router
        .clone()
        .oneshot(report_request(&done, "FAILURE", None))
        .await
        .unwrap();

    let resp = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/maa/tasks?status=PENDING")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let tasks = parsed["tasks"].as_array().unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0]["status"], "PENDING");

    ctx.shutdown();
}

#[tokio::test]
async fn test_submit_and_wait_uses_configured_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let gamedata = dir.path().join("gamedata");
    std::fs::create_dir_all(&gamedata).unwrap();
    std::fs::write(
        gamedata.join("gacha_table.json"),
        r#"{"gachaPoolClient":[]}"#,
    )
    .unwrap();
    std::fs::write(gamedata.join("character_table.json"), "{}").unwrap();

    let mut config = AppConfig::default();
    config.data.dir = dir.path().join("data");
    config.data.gamedata_dir = gamedata;
    config.tasks.await_timeout_secs = 0;
    let ctx = BridgeContext::new(config).unwrap();

    // 超时为零：无上报时立即超时，记录保持 Pending
    let outcome = ctx.submit_and_wait(TaskType::HeartBeat, None).await;
    assert!(matches!(outcome, WaitOutcome::TimedOut));
    assert_eq!(ctx.tasks.query_by_status(TaskStatus::Pending).len(), 1);

    ctx.shutdown();
}

#[tokio::test]
async fn test_health_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context_in(dir.path());
    let router = create_router(ctx.clone());

    let resp = router
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"OK");

    ctx.shutdown();
}
