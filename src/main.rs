//! maa-bridge 入口
//!
//! 初始化日志、加载配置、构建组合根上下文并启动 HTTP 边界。
//! 保留策略（任务回收 / 模拟器淘汰）仅在配置开启时运行后台循环。

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use maa_bridge::config::load_config;
use maa_bridge::core::BridgeContext;
use maa_bridge::server::create_router;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 日志：默认 info，可通过 RUST_LOG 覆盖
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .with(fmt::layer())
        .init();

    let config = load_config(None).context("Failed to load config")?;
    let bind = config.server.bind.clone();

    let ctx = Arc::new(BridgeContext::new(config).context("Failed to build context")?);

    spawn_retention_loop(Arc::clone(&ctx));

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    tracing::info!("listening on {}", bind);

    axum::serve(listener, create_router(Arc::clone(&ctx)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server failed")?;

    ctx.shutdown();
    Ok(())
}

/// 每小时执行一次配置开启的保留策略；都未开启则不起循环
fn spawn_retention_loop(ctx: Arc<BridgeContext>) {
    let retention_hours = ctx.config.tasks.retention_hours;
    let idle_hours = ctx.config.gacha.executor_idle_hours;
    if retention_hours.is_none() && idle_hours.is_none() {
        return;
    }

    tokio::spawn(async move {
        let mut tick = tokio::time::interval(std::time::Duration::from_secs(3600));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tick.tick().await;
            if let Some(hours) = retention_hours {
                ctx.tasks.cleanup_finished(hours);
            }
            if let Some(hours) = idle_hours {
                ctx.executors.evict_idle(hours).await;
            }
        }
    });
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutting down");
}
