//! Provider and schema administration subcommands.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Subcommand;

use crate::core::EvidenceService;
use crate::domain::{NewProvider, NewSchema};

use super::{print_json, read_json};

/// Provider subcommands
#[derive(Subcommand, Debug)]
pub enum ProviderCommands {
    /// Onboard a provider and print its API key
    Create {
        /// Display name (must be unique)
        #[arg(long)]
        name: String,

        /// Provider ID (generated if not specified)
        #[arg(long)]
        id: Option<String>,

        #[arg(long)]
        description: Option<String>,
    },

    /// Allow a provider to submit evidence
    Enable { provider_id: String },

    /// Stop a provider from submitting evidence
    Disable { provider_id: String },

    /// Show a provider
    Show { provider_id: String },

    /// List providers
    List {
        #[arg(long)]
        page_size: Option<usize>,

        /// Token from a previous page
        #[arg(long)]
        next_token: Option<String>,
    },
}

/// Schema subcommands
#[derive(Subcommand, Debug)]
pub enum SchemaCommands {
    /// Register a JSON Schema for a provider
    Create {
        #[arg(long)]
        provider: String,

        /// Schema ID
        #[arg(long)]
        id: String,

        /// JSON Schema file ("-" for stdin)
        #[arg(long)]
        file: PathBuf,

        /// Register as an ephemeral schema that expires after this many seconds
        #[arg(long)]
        ttl_seconds: Option<u64>,
    },

    /// Show a registered schema
    Show {
        #[arg(long)]
        provider: String,

        #[arg(long)]
        id: String,
    },
}

pub async fn execute_provider(service: &EvidenceService, command: ProviderCommands) -> Result<()> {
    match command {
        ProviderCommands::Create {
            name,
            id,
            description,
        } => {
            let (provider, api_key) = service
                .create_evidence_provider(NewProvider {
                    provider_id: id,
                    name,
                    description,
                })
                .await?;

            print_json(&provider)?;
            eprintln!();
            eprintln!("API key (shown once, store it now): {}", api_key);
            Ok(())
        }
        ProviderCommands::Enable { provider_id } => {
            let provider = service.toggle_provider_status(&provider_id, true).await?;
            println!("Provider {} enabled", provider.provider_id);
            Ok(())
        }
        ProviderCommands::Disable { provider_id } => {
            let provider = service.toggle_provider_status(&provider_id, false).await?;
            println!("Provider {} disabled", provider.provider_id);
            Ok(())
        }
        ProviderCommands::Show { provider_id } => {
            match service.get_evidence_provider(&provider_id).await? {
                Some(provider) => print_json(&provider),
                None => anyhow::bail!("Provider not found: {}", provider_id),
            }
        }
        ProviderCommands::List {
            page_size,
            next_token,
        } => {
            let page = service
                .list_evidence_providers(page_size, next_token.as_deref())
                .await?;

            if page.items.is_empty() {
                println!("No providers found.");
                return Ok(());
            }

            println!("{:<38} {:<8} {:<8} NAME", "PROVIDER ID", "ENABLED", "SCHEMAS");
            println!("{}", "-".repeat(72));
            for provider in &page.items {
                println!(
                    "{:<38} {:<8} {:<8} {}",
                    provider.provider_id,
                    provider.enabled,
                    provider.schema_ids.len(),
                    provider.name
                );
            }
            if let Some(token) = page.next_token {
                println!();
                println!("More results: --next-token {}", token);
            }
            Ok(())
        }
    }
}

pub async fn execute_schema(service: &EvidenceService, command: SchemaCommands) -> Result<()> {
    match command {
        SchemaCommands::Create {
            provider,
            id,
            file,
            ttl_seconds,
        } => {
            let content = read_json(&file)?;
            let schema = service
                .create_schema(
                    &provider,
                    NewSchema {
                        schema_id: id,
                        content,
                        ttl: ttl_seconds.map(Duration::from_secs),
                    },
                )
                .await?;

            match schema.expires_at {
                Some(at) => println!("Schema {} registered (expires {})", schema.schema_id, at),
                None => println!("Schema {} registered", schema.schema_id),
            }
            Ok(())
        }
        SchemaCommands::Show { provider, id } => match service.get_schema(&provider, &id).await? {
            Some(schema) => print_json(&schema),
            None => anyhow::bail!("Schema {} not found for provider {}", id, provider),
        },
    }
}
