//! Operator CLI for the source-of-wealth extraction pipeline.
//!
//! Runs the pipeline over a narrative with capabilities replayed from a
//! fixture, prints the knowledge base, and debugs the field-search loop.
//! Output is JSON on stdout; logs go to stderr.

mod config;
mod replay;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use sow_extraction::{
    pipeline::{build_record, FieldSearcher},
    CandidateRecord, KnowledgeBase, NarrativeToolbox, Orchestrator, PipelineError, SourceId,
    SourceType,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::Config;
use replay::Fixture;

#[derive(Parser)]
#[command(name = "sow")]
#[command(about = "Source-of-wealth extraction pipeline")]
struct Cli {
    /// Knowledge base JSON (overrides SOW_KNOWLEDGE_BASE)
    #[arg(long, global = true)]
    knowledge_base: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the whole pipeline with replayed capability answers
    Run {
        /// Narrative text file
        #[arg(long)]
        narrative: PathBuf,

        /// Fixture with recorded capability answers
        #[arg(long)]
        responses: PathBuf,

        /// Write the envelope here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,

        /// Whole-run timeout (overrides SOW_RUN_TIMEOUT_SECS)
        #[arg(long)]
        run_timeout_secs: Option<u64>,
    },

    /// List source types and their required fields
    Knowledge {
        /// Only this source type, e.g. `employment_income`
        #[arg(long)]
        source_type: Option<String>,
    },

    /// Run the bounded search loop for one field
    Search {
        #[arg(long)]
        narrative: PathBuf,

        #[arg(long)]
        source_type: String,

        #[arg(long)]
        field: String,

        /// Known field values as `name=value`, used to scope the search
        #[arg(long = "known", value_parser = parse_known)]
        known: Vec<(String, String)>,

        /// Invocation ceiling (clamped to 5)
        #[arg(long)]
        max_invocations: Option<usize>,
    },
}

fn parse_known(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        .filter(|(name, value)| !name.is_empty() && !value.is_empty())
        .ok_or_else(|| format!("expected name=value, got '{raw}'"))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sow_extraction=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env().context("Failed to load configuration")?;
    if cli.knowledge_base.is_some() {
        config.knowledge_base = cli.knowledge_base;
    }
    let kb = config.knowledge_base()?;
    tracing::debug!(types = kb.specs().count(), "Knowledge base loaded");

    match cli.command {
        Commands::Run {
            narrative,
            responses,
            output,
            run_timeout_secs,
        } => {
            if run_timeout_secs.is_some() {
                config.run_timeout_secs = run_timeout_secs;
            }
            run(kb, &config, &narrative, &responses, output.as_deref()).await
        }
        Commands::Knowledge { source_type } => knowledge(&kb, source_type.as_deref()),
        Commands::Search {
            narrative,
            source_type,
            field,
            known,
            max_invocations,
        } => {
            search(
                &kb,
                &config,
                &narrative,
                &source_type,
                &field,
                known,
                max_invocations,
            )
            .await
        }
    }
}

fn read_narrative(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read narrative {}", path.display()))
}

async fn run(
    kb: KnowledgeBase,
    config: &Config,
    narrative: &Path,
    responses: &Path,
    output: Option<&Path>,
) -> Result<()> {
    let narrative = read_narrative(narrative)?;
    let fixture = Fixture::load(responses)?;

    let orchestrator = fixture
        .install(Orchestrator::builder(Arc::new(kb)))
        .config(config.pipeline_config())
        .build();

    let envelope = match orchestrator.run(&narrative).await {
        Ok(envelope) => envelope,
        Err(PipelineError::Fatal { reason, partial }) => {
            println!("{}", serde_json::to_string_pretty(&partial)?);
            bail!("Run failed: {reason}");
        }
        Err(e) => return Err(e).context("Run rejected"),
    };

    let json = serde_json::to_string_pretty(&envelope)?;
    match output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write envelope to {}", path.display()))?;
            tracing::info!(path = %path.display(), "Envelope written");
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn knowledge(kb: &KnowledgeBase, source_type: Option<&str>) -> Result<()> {
    let filter: Option<SourceType> = source_type
        .map(str::parse)
        .transpose()
        .context("Unknown source type")?;

    let types: Vec<_> = kb
        .specs()
        .filter(|spec| filter.map_or(true, |t| t == spec.source_type))
        .map(|spec| {
            json!({
                "source_type": spec.source_type,
                "display_name": spec.display_name,
                "description": spec.description,
                "required_fields": spec.required_fields(),
            })
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&types)?);
    Ok(())
}

async fn search(
    kb: &KnowledgeBase,
    config: &Config,
    narrative: &Path,
    source_type: &str,
    field: &str,
    known: Vec<(String, String)>,
    max_invocations: Option<usize>,
) -> Result<()> {
    let narrative = read_narrative(narrative)?;
    let source_type: SourceType = source_type.parse().context("Unknown source type")?;
    let Some(spec) = kb.field(source_type, field) else {
        bail!("{source_type} has no required field '{field}'");
    };

    let candidate = known
        .into_iter()
        .fold(CandidateRecord::new(source_type), |c, (name, value)| {
            c.with_field(name, value)
        });
    let record = build_record(candidate, kb, SourceId::new(1));

    let mut pipeline = config.pipeline_config();
    if let Some(max) = max_invocations {
        pipeline.search.max_invocations = max;
    }
    let toolbox = NarrativeToolbox::new().with_context_chars(pipeline.search.context_chars);
    let searcher = FieldSearcher::new(&toolbox, &narrative, &pipeline.search, &pipeline.retry);

    let started = std::time::Instant::now();
    let result = searcher.search_field(&record, spec).await;
    tracing::info!(
        field = %field,
        invocations = result.invocations,
        ceiling = searcher.ceiling(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Search finished"
    );

    let report = json!({
        "source_type": source_type,
        "field": result.field,
        "state": result.state(),
        "value": result.value(),
        "invocations": result.invocations,
        "ceiling": searcher.ceiling(),
        "evidence": result.evidence,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known() {
        assert_eq!(
            parse_known("employer_name = Meridian Capital").unwrap(),
            ("employer_name".to_string(), "Meridian Capital".to_string())
        );
        assert!(parse_known("employer_name").is_err());
        assert!(parse_known("=value").is_err());
    }

    #[test]
    fn test_cli_parses_search() {
        let cli = Cli::try_parse_from([
            "sow",
            "search",
            "--narrative",
            "n.txt",
            "--source-type",
            "employment_income",
            "--field",
            "employment_start_date",
            "--known",
            "employer_name=Meridian Capital",
        ])
        .unwrap();
        match cli.command {
            Commands::Search { known, .. } => assert_eq!(known.len(), 1),
            _ => panic!("expected search"),
        }
    }

    #[test]
    fn test_run_timeout_flag() {
        let cli = Cli::try_parse_from([
            "sow",
            "run",
            "--narrative",
            "n.txt",
            "--responses",
            "r.json",
            "--run-timeout-secs",
            "30",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Run {
                run_timeout_secs: Some(30),
                ..
            }
        ));
    }
}
