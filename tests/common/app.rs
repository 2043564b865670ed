use std::sync::Arc;

use axum::Router;
use tempfile::TempDir;
use tokio::sync::broadcast;

use wordflow_backend::config::{Config, ImportConfig};
use wordflow_backend::routes::build_router;
use wordflow_backend::state::AppState;
use wordflow_backend::store::Store;
use wordflow_backend::workers::ImportSupervisor;

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub config: Config,
    _temp_dir: TempDir,
}

pub async fn spawn_test_app() -> TestApp {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let db_path = temp_dir.path().join("wordflow-test.db");

    // 直接构造 Config，避免 set_var 造成多线程测试环境变量竞态
    let config = Config {
        host: std::net::IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1)),
        port: 8000,
        log_level: "info".to_string(),
        enable_file_logs: false,
        log_dir: "./logs".to_string(),
        database_path: db_path.to_string_lossy().to_string(),
        app_origins: "http://localhost:5173".to_string(),
        import_: ImportConfig {
            concurrency: 2,
            batch_size: 500,
        },
    };

    let store = Arc::new(Store::open(&config.database_path).expect("open store"));
    store.run_migrations().expect("run migrations");

    let (shutdown_tx, _) = broadcast::channel::<()>(8);
    let importer = Arc::new(ImportSupervisor::new(
        store.clone(),
        &config.import_,
        shutdown_tx.clone(),
    ));

    let state = AppState::new(store, importer, &config, shutdown_tx);
    let app = build_router(state.clone());

    TestApp {
        app,
        state,
        config,
        _temp_dir: temp_dir,
    }
}
