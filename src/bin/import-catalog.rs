use clap::Parser;
use mystica::config;
use mystica::db::Db;
use mystica::db::repo::CatalogRepository;
use mystica::import_catalog::{import_catalog, parse_catalog};
use std::path::PathBuf;
use std::sync::Arc;

// cargo run --bin import-catalog -- --file seed/catalog.yaml

#[derive(Debug, Parser)]
#[command(name = "import-catalog", version, about = "Import item types, materials, styles and enemy style tables")]
struct Args {
    /// Catalog YAML file
    #[arg(long)]
    file: PathBuf,

    /// Only validate the file, do not touch the database
    #[arg(long)]
    dry_run: bool,

    /// Override database URL (if omitted, use env/config)
    #[arg(long)]
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();
    let args = Args::parse();

    let src = std::fs::read_to_string(&args.file)?;
    let catalog = parse_catalog(&src)?;

    if args.dry_run {
        println!(
            "catalog ok: {} styles, {} materials, {} item types, {} enemy types",
            catalog.styles.len(),
            catalog.materials.len(),
            catalog.item_types.len(),
            catalog.enemy_types.len()
        );
        return Ok(());
    }

    let cfg = config::Config::from_env()?;

    // allow overriding the DSN from CLI
    let database_url = args.database_url.as_deref().unwrap_or(&cfg.database_url);

    let db = Arc::new(Db::new(database_url, 2)?);
    db.init().await?;

    let repo = CatalogRepository::new(db);
    let summary = import_catalog(&repo, &catalog).await?;

    println!(
        "imported {} styles, {} materials, {} item types, {} enemy types",
        summary.styles, summary.materials, summary.item_types, summary.enemy_types
    );

    Ok(())
}
