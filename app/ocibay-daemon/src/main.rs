use anyhow::{Context, Result};
use clap::Parser;
use ocibay_server::{Config, GatewayServer};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "ocibayd")]
#[command(author, version, about = "Caching gateway for container images", long_about = None)]
struct DaemonArgs {
    /// Configuration file (YAML).
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Listen port (overrides the config file).
    #[arg(long)]
    port: Option<u16>,

    /// Cache directory for built archives (overrides the config file).
    #[arg(long)]
    cache_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ocibay_image=info,ocibay_server=info,ocibayd=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    run(DaemonArgs::parse()).await
}

async fn run(args: DaemonArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => {
            anyhow::ensure!(path.is_file(), "config file not found: {}", path.display());
            Config::load_from(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?
        }
        None => Config::load().context("failed to load config")?,
    };

    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(cache_dir) = args.cache_dir {
        config.cache_dir = cache_dir.display().to_string();
    }
    config.validate().context("invalid configuration")?;

    info!(port = config.port, "starting ocibay");
    GatewayServer::new(config)
        .run()
        .await
        .context("server failed")?;

    Ok(())
}
