mod config;
mod crypto;
mod decoder;
mod migrate;
mod prompt;
mod store;
mod transform;

use crate::config::Config;
use crate::crypto::SecrecyGateway;
use crate::migrate::{migrate_down, migrate_up};
use crate::prompt::prompt_password_hidden;
use crate::store::SqliteStore;
use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

const CREDENTIALS_TABLE: &str = "twofaccounts";

#[derive(Parser, Debug)]
#[command(
    name = "otpsplit",
    version,
    about = "Split stored otpauth:// provisioning URIs into typed credential columns"
)]
struct Cli {
    /// Path to the SQLite database
    #[arg(long)]
    db: PathBuf,

    /// Path to the deployment config (default: config.json beside the db)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Forward migration: add typed columns, rename uri to legacy_uri,
    /// backfill, tighten constraints
    Up,

    /// Backward migration: drop typed columns, restore the uri column
    Down,

    /// Write a config.json for an encrypted deployment (fresh salt)
    InitConfig,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .compact()
        .init();

    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| default_config_path(&cli.db));

    match cli.command {
        Commands::Up => cmd_up(&cli.db, &config_path)?,
        Commands::Down => cmd_down(&cli.db)?,
        Commands::InitConfig => cmd_init_config(&config_path)?,
    }

    Ok(())
}

fn default_config_path(db: &Path) -> PathBuf {
    db.parent().unwrap_or(Path::new(".")).join("config.json")
}

fn open_store(db: &Path) -> anyhow::Result<SqliteStore> {
    let conn = Connection::open(db)
        .with_context(|| format!("cannot open database {}", db.display()))?;
    Ok(SqliteStore::new(conn, CREDENTIALS_TABLE))
}

/// Build the gateway when the deployment encrypts at rest; the flag is
/// read once per run, never per record.
fn gateway_from_config(config: &Config) -> anyhow::Result<Option<SecrecyGateway>> {
    if !config.use_encryption {
        return Ok(None);
    }
    let kdf = config
        .kdf
        .as_ref()
        .ok_or_else(|| anyhow!("config enables encryption but has no kdf parameters"))?;
    let passphrase = prompt_password_hidden("Encryption passphrase: ")?;
    Ok(Some(SecrecyGateway::from_passphrase(&passphrase, kdf)?))
}

fn cmd_up(db: &Path, config_path: &Path) -> anyhow::Result<()> {
    let config = Config::load(config_path)?;
    let gateway = gateway_from_config(&config)?;
    let mut store = open_store(db)?;

    let summary = migrate_up(&mut store, gateway.as_ref())?;
    println!(
        "Migrated {} record(s), skipped {}.",
        summary.migrated, summary.skipped
    );
    Ok(())
}

fn cmd_down(db: &Path) -> anyhow::Result<()> {
    let mut store = open_store(db)?;
    migrate_down(&mut store)?;
    println!("Typed columns dropped, uri column restored.");
    Ok(())
}

fn cmd_init_config(config_path: &Path) -> anyhow::Result<()> {
    if config_path.exists() {
        anyhow::bail!("config already exists at {}", config_path.display());
    }
    let config = Config::with_encryption();
    config.save(config_path)?;
    println!("Wrote {}", config_path.display());
    Ok(())
}
