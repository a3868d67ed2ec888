mod archive;
mod classifier;
mod config;
mod error;
mod fetch;
mod hot_section;
mod model;
mod normalize;
mod pipeline;
mod results;
mod similarity;
mod summarize;

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tos_common::openai::{OpenAiClient, OpenAiClientConfig};

use archive::ArchiveStore;
use classifier::ChangeClassifier;
use config::{Config, Sources};
use fetch::HttpFetcher;
use pipeline::{ChangeDetectionPipeline, PipelineSettings, SourceStatus};
use summarize::OpenAiSummarizer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    info!("starting tos-monitor run");

    let config = Config::from_env()?;
    let sources = Sources::load(&config.sources_path)?;
    info!(
        sources_path = %config.sources_path.display(),
        sources = sources.sources.len(),
        hot_sections = sources.hot_sections.len(),
        concurrency = config.concurrency,
        "configuration loaded"
    );

    let archive = Arc::new(ArchiveStore::open(config.archive_dir.clone())?);
    info!(archive = %archive.root().display(), "archive ready");

    let scorer = similarity::select_scorer(config.semantic_enabled).await;
    let classifier = Arc::new(ChangeClassifier::new(
        config.classifier_config(&sources.hot_sections)?,
        scorer,
    ));

    let fetcher = Arc::new(HttpFetcher::new(config.fetch_timeout)?);

    let openai_config = OpenAiClientConfig::from_env();
    config.check_summary_budget(&openai_config)?;
    if openai_config.api_key.is_none() {
        warn!("OPENAI_API_KEY not set, summaries will fall back to persisted text");
    }
    info!(
        base_url = %openai_config.base_url,
        model = %openai_config.model,
        "summarizer configured"
    );
    let summarizer = Arc::new(OpenAiSummarizer::new(OpenAiClient::new(openai_config)?));

    let pipeline = ChangeDetectionPipeline::new(
        Arc::clone(&archive),
        classifier,
        fetcher,
        summarizer,
        PipelineSettings {
            concurrency: config.concurrency,
            fetch_timeout: config.fetch_timeout,
            summary_timeout: config.summary_timeout,
        },
    );

    let prior = results::load_prior(&config.results_paths);
    let report = pipeline
        .run(&sources.sources, prior.as_ref(), Utc::now())
        .await;

    results::write_all(&report.document, &config.results_paths)?;

    info!(
        checked = report.statuses.len(),
        changed = report.count(SourceStatus::Changed),
        archived = report.archived(),
        failed = report.count(SourceStatus::Failed),
        "run complete"
    );
    Ok(())
}
