//! 诊所管理服务器主程序

use clap::Parser;
use clinic_admin::{ClinicConfig, ConfigManager};
use clinic_core::Result;
use clinic_database::{DatabasePool, DatabaseQueries, DatabaseStore};
use clinic_notify::{ClinicEventType, WebhookSubscription};
use clinic_web::{AppState, WebServer};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber;

/// 诊所服务器命令行参数
#[derive(Parser, Debug)]
#[command(name = "clinic-server")]
#[command(about = "诊所预约与支付管理服务器")]
struct Args {
    /// 监听主机
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// 服务器端口
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,

    /// 数据库连接字符串（提供时启用持久化）
    #[arg(short, long)]
    database_url: Option<String>,

    /// 日志级别
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(&args.log_level)
        .init();

    info!("启动诊所服务器...");

    // 加载配置
    let config = match &args.config {
        Some(path) => {
            let manager = ConfigManager::new(path)
                .map_err(|e| clinic_core::ClinicError::Config(e.to_string()))?;
            manager.get_config().await
        }
        None => ClinicConfig::default(),
    };

    // 命令行参数优先于配置文件
    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .map_err(|e| clinic_core::ClinicError::Config(format!("Invalid listen address: {}", e)))?;

    info!("诊所服务器配置:");
    info!("  服务器名称: {}", config.server.name);
    info!("  监听地址: {}", addr);
    info!("  Webhook订阅数: {}", config.notifications.webhooks.len());

    // 构建应用状态与默认用户
    let state = Arc::new(AppState::new(Default::default()));
    state.auth.init_default_users().await;

    // 注册配置文件中的Webhook订阅
    register_webhooks(&state, &config).await;

    // 可选的数据库初始化
    let database_url = args
        .database_url
        .or_else(|| match args.config {
            Some(_) => Some(config.database.connection_string.clone()),
            None => None,
        });

    if let Some(url) = database_url {
        match DatabasePool::connect(&url, config.database.max_connections).await {
            Ok(pool) => {
                let pool = Arc::new(pool);
                DatabaseQueries::new(pool.as_ref()).create_tables().await?;
                // 引擎的每次状态变更从此写入数据库
                state
                    .engine
                    .write()
                    .await
                    .set_store(Arc::new(DatabaseStore::new(pool)));
                info!("Database schema initialized, persistence enabled");
            }
            Err(e) => {
                warn!("Database unavailable, running in-memory only: {}", e);
            }
        }
    }

    // 启动Web服务器
    let server = WebServer::new(addr, state);
    if let Err(e) = server.run().await {
        error!("服务器启动失败: {}", e);
        return Err(e);
    }

    Ok(())
}

/// 将配置中的Webhook端点注册到通知分发器
async fn register_webhooks(state: &Arc<AppState>, config: &ClinicConfig) {
    for endpoint in &config.notifications.webhooks {
        let mut events = Vec::new();
        for name in &endpoint.events {
            match ClinicEventType::try_from(name.as_str()) {
                Ok(event_type) => events.push(event_type),
                Err(e) => warn!("Skipping webhook event subscription: {}", e),
            }
        }

        if events.is_empty() {
            warn!("Webhook {} subscribes to no known events, skipped", endpoint.url);
            continue;
        }

        let subscription =
            WebhookSubscription::new(endpoint.url.clone(), events, endpoint.secret.clone());
        state.engine.read().await.dispatcher().subscribe(subscription).await;
    }
}
