//! Evidence subcommands.
//!
//! Provides commands to:
//! - `create`: Record evidence on behalf of a provider
//! - `get`, `list`, `revisions`, `find-hash`: Read evidence back
//! - `verify`: Check a record against the ledger and the blob store

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Subcommand;

use crate::core::{EvidenceService, VerificationResult, VerificationStatus};
use crate::domain::{AttachmentInput, CreateEvidenceInput, EvidenceFilter, EvidenceRecord};

use super::{print_json, read_json};

/// Evidence-related subcommands
#[derive(Subcommand, Debug)]
pub enum EvidenceCommands {
    /// Record evidence
    Create {
        #[arg(long)]
        provider: String,

        /// Governed resource
        #[arg(long)]
        target: String,

        #[arg(long)]
        schema: String,

        /// Extra correlation identifier (repeatable)
        #[arg(long = "additional-target")]
        additional_targets: Vec<String>,

        /// JSON content file ("-" for stdin)
        #[arg(long)]
        content: PathBuf,

        /// File to attach (repeatable); stored under its file name
        #[arg(long = "attach")]
        attachments: Vec<PathBuf>,

        /// Provider API key
        #[arg(long, env = "AGS_API_KEY", hide_env_values = true)]
        api_key: String,
    },

    /// Show a record, or one of its revisions
    Get {
        evidence_id: String,

        #[arg(long)]
        revision: Option<u64>,
    },

    /// Search evidence
    List {
        #[arg(long)]
        provider: Option<String>,

        #[arg(long)]
        target: Option<String>,

        #[arg(long)]
        schema: Option<String>,

        /// Created at or after (RFC 3339)
        #[arg(long)]
        after: Option<DateTime<Utc>>,

        /// Created before (RFC 3339)
        #[arg(long)]
        before: Option<DateTime<Utc>>,

        #[arg(long)]
        page_size: Option<usize>,

        #[arg(long)]
        next_token: Option<String>,
    },

    /// Show the revision history of a record
    Revisions {
        evidence_id: String,

        #[arg(long)]
        page_size: Option<usize>,

        #[arg(long)]
        next_token: Option<String>,
    },

    /// Verify a record (or a historical revision) against the ledger
    Verify {
        evidence_id: String,

        #[arg(long)]
        revision: Option<u64>,
    },

    /// Find a record by its content hash
    FindHash { content_hash: String },
}

pub async fn execute(service: &EvidenceService, command: EvidenceCommands) -> Result<()> {
    match command {
        EvidenceCommands::Create {
            provider,
            target,
            schema,
            additional_targets,
            content,
            attachments,
            api_key,
        } => {
            let input = CreateEvidenceInput {
                provider_id: provider,
                target_id: target,
                schema_id: schema,
                additional_target_ids: additional_targets,
                content: read_json(&content)?,
                attachments: load_attachments(&attachments).await?,
            };

            let record = service.create_evidence(&api_key, input).await?;
            print_json(&record)
        }
        EvidenceCommands::Get {
            evidence_id,
            revision,
        } => match service.get_evidence_by_id(&evidence_id, revision).await? {
            Some(record) => print_json(&record),
            None => anyhow::bail!("Evidence not found: {}", evidence_id),
        },
        EvidenceCommands::List {
            provider,
            target,
            schema,
            after,
            before,
            page_size,
            next_token,
        } => {
            let filter = EvidenceFilter {
                provider_id: provider,
                target_id: target,
                schema_id: schema,
                created_after: after,
                created_before: before,
                page_size,
                next_token,
            };
            let page = service.get_evidences(&filter).await?;
            print_records(&page.items, page.next_token.as_deref());
            Ok(())
        }
        EvidenceCommands::Revisions {
            evidence_id,
            page_size,
            next_token,
        } => {
            let page = service
                .get_evidence_revisions(&evidence_id, page_size, next_token.as_deref())
                .await?;
            print_records(&page.items, page.next_token.as_deref());
            Ok(())
        }
        EvidenceCommands::Verify {
            evidence_id,
            revision,
        } => {
            let result = service.verify_evidence(&evidence_id, revision).await?;
            print_json(&result)?;
            ensure_verified(&result)
        }
        EvidenceCommands::FindHash { content_hash } => {
            match service.get_evidence_by_content_hash(&content_hash).await? {
                Some(record) => print_json(&record),
                None => anyhow::bail!("No evidence with content hash {}", content_hash),
            }
        }
    }
}

/// Unverified records fail the command so scripts can branch on the exit code
fn ensure_verified(result: &VerificationResult) -> Result<()> {
    if result.status == VerificationStatus::Unverified {
        let check = result
            .failed_check
            .map(|c| format!("{:?}", c))
            .unwrap_or_else(|| "unknown".to_string());
        anyhow::bail!(
            "Evidence {} is unverified (failed check: {})",
            result.evidence_id,
            check
        );
    }
    Ok(())
}

async fn load_attachments(paths: &[PathBuf]) -> Result<Vec<AttachmentInput>> {
    let mut attachments = Vec::with_capacity(paths.len());
    for path in paths {
        let object_key = path
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("Attachment has no file name: {}", path.display()))?
            .to_string();
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read attachment: {}", path.display()))?;

        attachments.push(AttachmentInput { object_key, data });
    }
    Ok(attachments)
}

fn print_records(records: &[EvidenceRecord], next_token: Option<&str>) {
    if records.is_empty() {
        println!("No evidence found.");
        return;
    }

    println!(
        "{:<38} {:<4} {:<26} {:<24} TARGET",
        "EVIDENCE ID", "REV", "CREATED", "SCHEMA"
    );
    println!("{}", "-".repeat(110));
    for record in records {
        let version = record
            .version()
            .map(|v| v.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<38} {:<4} {:<26} {:<24} {}",
            record.evidence_id,
            version,
            record.created_timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            record.schema_id,
            record.target_id
        );
    }

    if let Some(token) = next_token {
        println!();
        println!("More results: --next-token {}", token);
    }
}
