//! Command-line interface for the evidence store.
//!
//! Drives the evidence service over local backends under `$AGS_HOME`:
//! a SQLite registry, a hash-chained ledger journal and a blob directory.

use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use crate::config::{self, ResolvedConfig};
use crate::core::{EvidenceService, ServiceDeps};
use crate::store::{FsContentStore, LocalLedger, SqliteRegistry};

pub mod collect;
pub mod evidence;
pub mod provider;

/// ags-evidence - Ledger-backed evidence store
#[derive(Parser, Debug)]
#[command(name = "ags-evidence")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Onboard and administer evidence providers
    Provider {
        #[command(subcommand)]
        command: provider::ProviderCommands,
    },

    /// Register and inspect evidence schemas
    Schema {
        #[command(subcommand)]
        command: provider::SchemaCommands,
    },

    /// Record, read and verify evidence
    Evidence {
        #[command(subcommand)]
        command: evidence::EvidenceCommands,
    },

    /// Turn compliance findings into evidence
    Collect(collect::CollectArgs),

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let cfg = config::config()?;
        self.run(cfg).await
    }

    /// Execute against an already resolved configuration
    pub async fn run(self, cfg: &ResolvedConfig) -> Result<()> {
        match self.command {
            Commands::Provider { command } => {
                let service = open_service(cfg).await?;
                provider::execute_provider(&service, command).await
            }
            Commands::Schema { command } => {
                let service = open_service(cfg).await?;
                provider::execute_schema(&service, command).await
            }
            Commands::Evidence { command } => {
                let service = open_service(cfg).await?;
                evidence::execute(&service, command).await
            }
            Commands::Collect(args) => collect::execute(cfg, args).await,
            Commands::Config => show_config(cfg),
        }
    }
}

/// Build the evidence service over the local backends in `cfg.home`
pub async fn open_service(cfg: &ResolvedConfig) -> Result<Arc<EvidenceService>> {
    let registry = Arc::new(
        SqliteRegistry::open(cfg.registry_path())
            .with_context(|| format!("Failed to open registry in {}", cfg.home.display()))?,
    );
    let ledger = Arc::new(
        LocalLedger::open(cfg.ledger_path())
            .await
            .with_context(|| format!("Failed to open ledger in {}", cfg.home.display()))?,
    );
    let content = Arc::new(
        FsContentStore::open(cfg.content_dir())
            .await
            .context("Failed to open content store")?,
    );

    let deps = ServiceDeps {
        providers: registry.clone(),
        schemas: registry,
        evidence: ledger.clone(),
        content,
        ledger,
    };

    Ok(Arc::new(EvidenceService::new(deps, cfg.pagination)))
}

/// Print a value as pretty JSON on stdout
pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to encode output")?;
    println!("{}", json);
    Ok(())
}

/// Read a JSON document from a file, or from stdin when the path is `-`
pub(crate) fn read_json(path: &Path) -> Result<serde_json::Value> {
    let raw = if path == Path::new("-") {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read from stdin")?;
        buffer
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?
    };

    serde_json::from_str(&raw).with_context(|| format!("Invalid JSON in {}", path.display()))
}

fn show_config(cfg: &ResolvedConfig) -> Result<()> {
    println!("Evidence Store Configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:     {}", cfg.home.display());
    println!("  Registry: {}", cfg.registry_path().display());
    println!("  Ledger:   {}", cfg.ledger_path().display());
    println!("  Content:  {}", cfg.content_dir().display());
    println!();
    println!("Pagination:");
    println!("  Default page size: {}", cfg.pagination.default_page_size);
    println!("  Max page size:     {}", cfg.pagination.max_page_size);
    println!();
    println!("Collector:");
    println!(
        "  API endpoint: {}",
        cfg.collector.api_endpoint.as_deref().unwrap_or("(local)")
    );
    println!(
        "  Provider:     {}",
        cfg.collector.provider_id.as_deref().unwrap_or("(unset)")
    );
    println!(
        "  API key:      {}",
        if cfg.collector.api_key.is_some() { "(set)" } else { "(unset)" }
    );
    println!(
        "  Retry:        {} attempts, {}ms initial, {}ms max, x{}",
        cfg.collector.retry.max_attempts,
        cfg.collector.retry.initial_delay_ms,
        cfg.collector.retry.max_delay_ms,
        cfg.collector.retry.backoff_multiplier
    );

    Ok(())
}
