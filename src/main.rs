use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use dealwatch::engine::ParserController;
use dealwatch::{storage, AppConfig};

#[derive(Parser, Debug)]
#[command(name = "dealwatch", about = "Marketplace price-arbitrage monitor")]
struct Cli {
    /// Owner whose settings row drives the run (defaults to the configured
    /// default owner)
    #[arg(long)]
    owner: Option<i64>,

    /// Stop automatically after this many hours
    #[arg(long)]
    timer: Option<f64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("dealwatch=debug".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;
    let pool = storage::connect(&config.database).await?;

    let owner_id = cli.owner.unwrap_or(config.engine.default_owner_id);
    let controller = Arc::new(ParserController::new(config, pool));

    let spec = controller.settings().load(owner_id).await?;
    info!(owner_id, keywords = spec.keywords.len(), "starting engine");
    controller.start(spec).await?;

    if let Some(hours) = cli.timer {
        controller.set_timer(owner_id, hours).await?;
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("shutdown requested"),
        _ = controller.wait_until_stopped(owner_id) => info!("engine finished on its own"),
    }

    controller.stop(owner_id, "Нормальная остановка").await.ok();
    info!("bye");
    Ok(())
}
