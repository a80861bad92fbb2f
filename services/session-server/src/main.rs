use std::sync::Arc;

use session_server::client::{router, AppState};
use session_server::config::Config;
use session_server::registry::SessionRegistry;
use tracing::info;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "session-server starting");

    let config_path = std::env::var("SESSION_SERVER_CONFIG")
        .unwrap_or_else(|_| "session-server.toml".to_owned());
    let config = match Config::load_from_path(std::path::Path::new(&config_path)) {
        Ok(cfg) => {
            info!(
                client_bind = %cfg.client_bind,
                upstream_url = %cfg.upstream_url,
                data_dir = ?cfg.data_dir,
                "config loaded"
            );
            cfg
        }
        Err(e) => {
            eprintln!("FATAL: failed to load config from '{config_path}': {e}");
            std::process::exit(1);
        }
    };

    if let Some(dir) = &config.data_dir {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!("FATAL: failed to create data directory '{}': {e}", dir.display());
            std::process::exit(1);
        }
    }

    let bind_addr = config.client_bind.clone();
    let state = Arc::new(AppState { registry: SessionRegistry::new(config) });
    let app = router(state);

    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("FATAL: failed to bind '{bind_addr}': {e}");
            std::process::exit(1);
        }
    };
    info!(addr = %bind_addr, "listening for client connections");
    if let Err(e) = axum::serve(listener, app).await {
        eprintln!("FATAL: server error: {e}");
        std::process::exit(1);
    }
}
