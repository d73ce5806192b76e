use anyhow::Context;
use brew_server::{Config, Server, ServerState, print_banner, setup_environment};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. .env → 配置
    dotenv::dotenv().ok();
    let config = Config::from_env();

    // 2. 工作目录 + 日志 (guard 持有到退出)
    let _log_guard = setup_environment(&config).context("Failed to prepare work directory")?;

    print_banner();
    tracing::info!(
        environment = %config.environment,
        database = %config.database_url,
        "Brew server starting..."
    );

    // 3. 初始化服务器状态
    let state = ServerState::initialize(&config)
        .await
        .context("Failed to initialize server state")?;

    // 4. 启动 HTTP 服务器
    let server = Server::with_state(config, state);
    if let Err(e) = server.run().await {
        tracing::error!(error = %e, "Server error");
        return Err(e.into());
    }

    Ok(())
}
