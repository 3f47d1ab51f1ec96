//! 主应用程序入口
//!
//! 加载配置、连接存储、组装协调核心并启动 Axum 服务。

use std::{sync::Arc, time::Duration};

use application::SystemClock;
use config::AppConfig;
use infrastructure::{Infrastructure, LocalAttachmentStore};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load()?;
    config.validate()?;

    let infrastructure = Infrastructure::from_config(&config).await?;
    let attachments = Arc::new(LocalAttachmentStore::from_config(&config.attachments));
    let core = infrastructure.assemble(&config, attachments, Arc::new(SystemClock));

    // 过期的吊销记录定期清理
    let sweeper = core
        .sessions
        .revocations()
        .clone()
        .spawn_sweeper(Duration::from_secs(config.revocation.sweep_interval_secs));

    let app = router(AppState::new(core))
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("服务器启动在 http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    tracing::info!("服务器已停止");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "监听退出信号失败");
    }
    tracing::info!("收到退出信号，开始优雅关闭");
}
