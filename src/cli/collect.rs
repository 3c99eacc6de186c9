//! `collect`: turn a file of findings into evidence.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use tracing::{info, warn};

use crate::collector::{
    ConfigEventProcessor, EvidenceApiClient, EvidenceProducer, EvidenceSubmitter, LocalSubmitter,
    SecurityHubProcessor,
};
use crate::config::ResolvedConfig;

use super::{open_service, read_json};

/// Finding source
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Source {
    /// Security Hub findings (ASFF)
    SecurityHub,

    /// Config rule compliance change events
    Config,
}

#[derive(Args, Debug)]
pub struct CollectArgs {
    #[arg(long, value_enum)]
    pub source: Source,

    /// Findings file: one finding, an array, or an EventBridge event ("-" for stdin)
    #[arg(long)]
    pub input: PathBuf,

    /// Provider to submit as (defaults to collector.provider_id)
    #[arg(long)]
    pub provider: Option<String>,

    /// Evidence API base URL; submits to the local store when unset
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Provider API key (defaults to AGS_API_KEY)
    #[arg(long)]
    pub api_key: Option<String>,
}

pub async fn execute(cfg: &ResolvedConfig, args: CollectArgs) -> Result<()> {
    let provider_id = args
        .provider
        .or_else(|| cfg.collector.provider_id.clone())
        .context("No provider configured. Use --provider or collector.provider_id")?;
    let api_key = args
        .api_key
        .or_else(|| cfg.collector.api_key.clone())
        .context("No API key configured. Use --api-key or AGS_API_KEY")?;

    let producer: Box<dyn EvidenceProducer> = match args.source {
        Source::SecurityHub => Box::new(SecurityHubProcessor::new(provider_id)),
        Source::Config => Box::new(ConfigEventProcessor::new(provider_id)),
    };

    let submitter: Box<dyn EvidenceSubmitter> =
        match args.endpoint.or_else(|| cfg.collector.api_endpoint.clone()) {
            Some(endpoint) => Box::new(
                EvidenceApiClient::new(endpoint, api_key).with_retry(cfg.collector.retry.clone()),
            ),
            None => Box::new(LocalSubmitter::new(open_service(cfg).await?, api_key)),
        };

    let input = read_json(&args.input)?;
    let findings = producer.findings(input);
    if findings.is_empty() {
        println!("No findings in {}", args.input.display());
        return Ok(());
    }

    producer.setup(submitter.as_ref()).await?;

    let mut saved = 0;
    let mut failed = 0;
    for finding in &findings {
        match producer.save_evidence(finding, submitter.as_ref()).await {
            Ok(record) => {
                saved += 1;
                println!("{}  {}", record.evidence_id, record.target_id);
            }
            Err(e) => {
                failed += 1;
                warn!(source = producer.source(), error = %format!("{:#}", e), "Finding skipped");
            }
        }
    }

    info!(source = producer.source(), saved, failed, "Collection finished");
    if failed > 0 {
        anyhow::bail!("{} of {} findings could not be saved", failed, findings.len());
    }
    Ok(())
}
