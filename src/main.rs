use clap::Parser;
use mystica::{
    Registry, config, db,
    import_catalog::import_catalog_file,
    net::http,
    services::{HttpImageGenerator, ImageGenerator, PlaceholderGenerator},
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "mystica", version, about = "Mystica crafting service")]
struct Args {
    /// TOML config file. Environment variables (and .env) are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Keep everything in process memory instead of Postgres
    #[arg(long)]
    in_memory: bool,

    /// Catalog YAML imported at startup (handy together with --in-memory)
    #[arg(long)]
    seed: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;
    let args = Args::parse();

    let cfg = Arc::new(match &args.config {
        Some(path) => config::Config::load(path)?,
        None => config::Config::from_env()?,
    });

    let generator = build_generator(&cfg)?;

    let registry = if args.in_memory {
        tracing::warn!("running with in-memory storage, nothing is persisted");
        Arc::new(Registry::in_memory(cfg.clone(), generator))
    } else {
        let db = Arc::new(db::Db::new(&cfg.database_url, cfg.db_pool_size)?);
        db.init().await?;
        Arc::new(Registry::new(db, cfg.clone(), generator))
    };

    if let Some(seed) = &args.seed {
        import_catalog_file(registry.repos.catalog.as_ref(), seed).await?;
    }

    spawn_background_tasks(registry.clone());

    let addr: SocketAddr = cfg.http_addr.parse()?;
    tracing::info!(%addr, "Mystica crafting service listening");
    http::serve(addr, registry).await?;

    Ok(())
}

fn build_generator(cfg: &config::Config) -> anyhow::Result<Arc<dyn ImageGenerator>> {
    match &cfg.generator.url {
        Some(url) => {
            tracing::info!(%url, "using HTTP artwork generator");
            let generator = HttpImageGenerator::new(url.clone(), cfg.crafting.generation_timeout())?;
            Ok(Arc::new(generator))
        }
        None => {
            tracing::info!(base = %cfg.generator.artifact_base_url, "using placeholder artwork");
            Ok(Arc::new(PlaceholderGenerator::new(cfg.generator.artifact_base_url.clone())))
        }
    }
}

/// Periodically restores materials held by reservations that were never
/// committed or released (crashed process, lost task).
fn spawn_background_tasks(registry: Arc<Registry>) {
    let ledger = registry.services.ledger.clone();
    let ttl = registry.config.crafting.reservation_ttl();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval((ttl / 4).max(std::time::Duration::from_secs(1)));
        loop {
            interval.tick().await;
            if let Err(e) = ledger.sweep_expired(ttl).await {
                tracing::error!(error = %e, "reservation sweep failed");
            }
        }
    });
}

fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::{EnvFilter, prelude::*};

    color_eyre::install().map_err(|e| anyhow::anyhow!(e.to_string()))?;

    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::uptime()),
        )
        .with(tracing_error::ErrorLayer::default())
        .init();

    Ok(())
}
