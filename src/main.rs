use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cmd;

#[derive(Parser)]
#[command(name = "shipdeck")]
#[command(version, about = "Deployment status board for many hosts and environments")]
pub struct Cli {
    /// Debug logging for shipdeck (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the configuration file
    #[arg(long, global = true, default_value = shipdeck::config::DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the status API and the notification websocket
    Serve {
        /// Port to serve on
        #[arg(short, long, default_value = "8000")]
        port: u16,

        /// Enable dev mode (bind all interfaces, permissive CORS)
        #[arg(long)]
        dev: bool,
    },
    /// Print the deployment status of one project as JSON
    Status {
        /// Project name
        project: String,

        /// User whose permissions apply
        #[arg(short, long)]
        user: String,
    },
}

/// Logs go to stderr; `SHIPDECK_LOG_FORMAT=json` switches to JSON lines.
fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "shipdeck=debug,info" } else { "shipdeck=info,warn" };
    let json = std::env::var("SHIPDECK_LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(json.then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
        }))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::Serve { port, dev } => cmd::cmd_serve(&cli.config, *port, *dev).await?,
        Commands::Status { project, user } => cmd::cmd_status(&cli.config, project, user).await?,
    }

    Ok(())
}
