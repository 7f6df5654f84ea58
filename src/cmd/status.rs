//! One-shot status command: `shipdeck status <project> --user <name>`.

use anyhow::{Context, Result};
use std::path::Path;
use tokio_util::sync::CancellationToken;

use shipdeck::config::ShipdeckToml;

pub async fn cmd_status(config_path: &Path, project: &str, user: &str) -> Result<()> {
    let config = ShipdeckToml::load(config_path)?;
    let engine = config.build_engine();

    // Ctrl+C returns whatever has resolved so far.
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let status = engine
        .fetch_statuses(&cancel, &config.projects, project, user)
        .await?;
    let json = serde_json::to_string_pretty(&status).context("Failed to serialize status")?;
    println!("{}", json);
    Ok(())
}
