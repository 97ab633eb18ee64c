//! 贫血筛查服务主程序

mod config;

use anemia_core::Result;
use anemia_database::{MemoryDocumentStore, PatientRepository};
use anemia_integration::{MemoryAuthProvider, PredictionClient};
use anemia_storage::ObjectBlobStore;
use anemia_web::{AppState, WebServer};
use anemia_workflow::{BlockingSignal, NotificationQueue, PhotoIngestionPipeline, SessionStore};
use clap::Parser;
use config::AppConfig;
use object_store::local::LocalFileSystem;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// 服务命令行参数，覆盖配置文件中的同名项
#[derive(Parser, Debug)]
#[command(name = "anemia-server")]
#[command(about = "贫血筛查患者登记与眼睑照片分诊服务")]
struct Args {
    /// 监听主机
    #[arg(long)]
    host: Option<String>,

    /// 监听端口
    #[arg(short, long)]
    port: Option<u16>,

    /// 照片存储目录
    #[arg(short, long)]
    data_dir: Option<String>,

    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,

    /// 日志级别
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut app_config = AppConfig::load(args.config.as_deref())?;
    if let Some(host) = args.host {
        app_config.server.host = host;
    }
    if let Some(port) = args.port {
        app_config.server.port = port;
    }
    if let Some(data_dir) = args.data_dir {
        app_config.storage.data_dir = data_dir;
    }
    if let Some(level) = args.log_level {
        app_config.logging.level = level;
    }

    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&app_config.logging.level))
        .init();

    info!("Starting anemia screening service...");
    info!("  host: {}", app_config.server.host);
    info!("  port: {}", app_config.server.port);
    info!("  photo dir: {}", app_config.storage.data_dir);
    info!("  prediction endpoint base: {}", app_config.prediction.base_url);

    // 照片存储：本地文件系统后端，经/blobs路径对外提供
    std::fs::create_dir_all(&app_config.storage.data_dir)?;
    let objects: Arc<dyn object_store::ObjectStore> = Arc::new(
        LocalFileSystem::new_with_prefix(&app_config.storage.data_dir)
            .map_err(|e| anemia_core::AnemiaError::Storage(e.to_string()))?,
    );
    let public_base = app_config.storage.public_base_url.clone().unwrap_or_else(|| {
        format!(
            "http://{}:{}/blobs",
            app_config.server.host, app_config.server.port
        )
    });
    let blobs = Arc::new(ObjectBlobStore::new(objects.clone(), public_base));

    // 文档库与患者资料库
    let documents = Arc::new(MemoryDocumentStore::new());
    let repository = Arc::new(PatientRepository::new(documents, blobs.clone()));

    // 外部协作方
    let classifier = Arc::new(PredictionClient::new(app_config.prediction.base_url.clone()));
    let auth = Arc::new(MemoryAuthProvider::new());
    auth.seed_account(&app_config.auth.email, &app_config.auth.password)
        .await;

    // 进程级视图状态
    let blocking = Arc::new(BlockingSignal::new());
    let notifications = Arc::new(NotificationQueue::new());
    let session = Arc::new(SessionStore::new(
        auth.clone(),
        blocking.clone(),
        notifications.clone(),
    ));
    session.start();
    auth.resolve_initial();

    let pipeline = Arc::new(PhotoIngestionPipeline::new(
        repository.clone(),
        blobs,
        classifier,
        blocking.clone(),
        notifications.clone(),
    ));

    let state = AppState {
        repository,
        pipeline,
        session,
        blocking,
        notifications,
        objects,
    };

    let addr: SocketAddr = format!("{}:{}", app_config.server.host, app_config.server.port)
        .parse()
        .map_err(|e| {
            anemia_core::AnemiaError::Config(format!("invalid listen address: {}", e))
        })?;
    let server = WebServer::new(addr, state);

    if let Err(e) = server.run().await {
        error!("Web server failed: {}", e);
        return Err(e);
    }
    Ok(())
}
