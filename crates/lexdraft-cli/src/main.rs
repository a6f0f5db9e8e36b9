mod display;
mod setup;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use lexdraft_ai::StaticRouter;
use lexdraft_core::{
    InstrumentType, Jurisdiction, PipelineConfig, PipelineEvent, RunRequest, batch_verify,
};
use lexdraft_pipeline::{Pipeline, PipelineDeps};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::setup::IndexOptions;

#[derive(Parser, Debug)]
#[command(name = "lexdraft", version, about = "Jurisdiction-aware legal drafting pipeline")]
struct Cli {
    /// Pipeline config (JSON); defaults apply when omitted.
    #[arg(long, global = true, env = "LEXDRAFT_CONFIG")]
    config: Option<PathBuf>,

    /// Passage corpus (JSON array of passages).
    #[arg(long, global = true, env = "LEXDRAFT_CORPUS")]
    corpus: Option<PathBuf>,

    /// Directory with an ONNX sentence-embedding model and tokenizer.
    #[arg(long, global = true)]
    model_dir: Option<PathBuf>,

    /// Persist the passage index in LanceDB at this path.
    #[arg(long, global = true)]
    lance_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Draft a document: intake, plan, retrieve, draft, verify, review, export.
    Run {
        /// Drafting instruction.
        #[arg(required = true, num_args = 1..)]
        instruction: Vec<String>,
        #[arg(long, short, default_value = "primary")]
        jurisdiction: Jurisdiction,
        #[arg(long)]
        template: Option<String>,
        /// Reference document id; repeatable.
        #[arg(long = "reference")]
        references: Vec<String>,
        /// Use this model for every stage.
        #[arg(long)]
        model: Option<String>,
        /// Print progress events as JSON lines.
        #[arg(long, conflicts_with = "json")]
        stream: bool,
        /// Print the export artifact as JSON.
        #[arg(long)]
        json: bool,
        /// Chat-completions endpoint; without one, models answer offline.
        #[arg(long, env = "LEXDRAFT_ENDPOINT")]
        endpoint: Option<String>,
        #[arg(long, env = "LEXDRAFT_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
    },
    /// Hybrid search over the corpus.
    Search {
        query: String,
        #[arg(long, short, default_value = "primary")]
        jurisdiction: Jurisdiction,
        #[arg(long, short, default_value_t = 10)]
        limit: usize,
        /// Only passages of this instrument type (e.g. "Court Rule").
        #[arg(long)]
        instrument: Option<InstrumentType>,
        /// Only passages of the given jurisdiction.
        #[arg(long)]
        only: bool,
    },
    /// Check claims against a set of citation candidates.
    Verify {
        /// Claims to check; each argument is one claim.
        #[arg(required = true, num_args = 1..)]
        claims: Vec<String>,
        /// JSON array of candidates.
        #[arg(long)]
        candidates: PathBuf,
        #[arg(long, short, default_value = "primary")]
        jurisdiction: Jurisdiction,
        /// Overrides the configured threshold.
        #[arg(long)]
        threshold: Option<f64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // stdout carries results; logs go to stderr.
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
    tracing::debug!("lexdraft v{}", env!("CARGO_PKG_VERSION"));

    let config = PipelineConfig::load(cli.config.as_deref()).context("loading config")?;
    let index = IndexOptions {
        model_dir: cli.model_dir.clone(),
        lance_dir: cli.lance_dir.clone(),
    };

    match cli.command {
        Command::Run {
            instruction,
            jurisdiction,
            template,
            references,
            model,
            stream,
            json,
            endpoint,
            api_key,
        } => {
            let corpus = require_corpus(cli.corpus.as_deref())?;
            let engine = setup::build_engine(corpus, &config, &index).await?;
            let providers = setup::providers(endpoint.as_deref(), api_key)?;
            let router = StaticRouter::default()
                .with_long_context_threshold(config.routing.long_context_threshold);
            let pipeline = Pipeline::new(
                PipelineDeps::new(Arc::new(router), providers, Arc::new(engine))
                    .with_config(config),
            );

            let mut request = RunRequest::new(instruction.join(" "), jurisdiction)
                .with_references(references);
            if let Some(template) = template {
                request = request.with_template(template);
            }
            if let Some(model) = model {
                request = request.with_model_override(model);
            }

            if stream {
                return stream_run(&pipeline, request).await;
            }
            let state = pipeline.run(request).await;
            if state.has_error() {
                display::print_failure(&state);
                return Ok(ExitCode::FAILURE);
            }
            let Some(artifact) = state.export.as_ref() else {
                anyhow::bail!("run finished without an export artifact");
            };
            if json {
                println!("{}", artifact.to_json_pretty()?);
            } else {
                display::print_export_card(artifact);
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Search {
            query,
            jurisdiction,
            limit,
            instrument,
            only,
        } => {
            let corpus = require_corpus(cli.corpus.as_deref())?;
            let engine = setup::build_engine(corpus, &config, &index).await?;
            let hits = match (instrument, only) {
                (Some(instrument), _) => {
                    engine
                        .search_by_instrument(&query, instrument, jurisdiction, limit)
                        .await?
                }
                (None, true) => {
                    engine
                        .search_by_jurisdiction(&query, jurisdiction, limit)
                        .await?
                }
                (None, false) => {
                    let ctx = engine.context(query, jurisdiction).with_max_results(limit);
                    engine.search(&ctx).await?
                }
            };
            display::print_ranked(&hits);
            Ok(ExitCode::SUCCESS)
        }

        Command::Verify {
            claims,
            candidates,
            jurisdiction,
            threshold,
        } => {
            let mut options = config.verification.options();
            if let Some(threshold) = threshold {
                anyhow::ensure!(
                    (0.0..=1.0).contains(&threshold),
                    "--threshold must be within 0..=1, got {threshold}"
                );
                options.threshold = threshold;
            }
            let candidates = setup::load_candidates(&candidates)?;
            let results = batch_verify(&claims, &candidates, jurisdiction, &options);
            for (i, (claim, result)) in claims.iter().zip(&results).enumerate() {
                if i > 0 {
                    println!();
                }
                display::print_verification(claim, result);
            }
            Ok(if results.iter().all(|r| r.passed) {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}

fn require_corpus(corpus: Option<&Path>) -> anyhow::Result<&Path> {
    corpus.context("no corpus given; pass --corpus or set LEXDRAFT_CORPUS")
}

/// Print each event as one JSON line; the exit code follows the terminal event.
async fn stream_run(pipeline: &Pipeline, request: RunRequest) -> anyhow::Result<ExitCode> {
    let mut events = pipeline.run_stream(request);
    let mut stdout = std::io::stdout().lock();
    let mut failed = false;
    while let Some(event) = events.next().await {
        failed = matches!(event, PipelineEvent::Error { .. });
        serde_json::to_writer(&mut stdout, &event)?;
        writeln!(stdout)?;
        stdout.flush()?;
    }
    Ok(if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
