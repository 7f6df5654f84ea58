//! Status server command: `shipdeck serve`.

use anyhow::Result;
use std::path::Path;
use tokio_util::sync::CancellationToken;

use shipdeck::config::ShipdeckToml;
use shipdeck::notify::NotificationHub;
use shipdeck::server::{ServerConfig, api::AppState, start_server};

pub async fn cmd_serve(config_path: &Path, port: u16, dev: bool) -> Result<()> {
    let config = ShipdeckToml::load(config_path)?;
    tracing::info!(
        config = %config_path.display(),
        projects = config.projects.len(),
        hosts = config.projects.iter().map(|p| p.host_count()).sum::<usize>(),
        "configuration loaded"
    );

    let root = CancellationToken::new();
    let state = AppState {
        engine: config.build_engine(),
        projects: config.projects,
        hub: NotificationHub::new(root.clone()),
    };

    start_server(ServerConfig { port, dev_mode: dev }, state, root).await
}
