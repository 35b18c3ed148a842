//! # film_enrich
//!
//! Data collection for a film-analytics study. A fixed, seeded sample of
//! movies is enriched from third-party sources one stage at a time, then
//! coded thematically by a language model and by a keyword baseline.
//!
//! ## Usage
//!
//! ```sh
//! film_enrich sample
//! film_enrich plots        # OMDb
//! film_enrich posters      # TMDB
//! film_enrich subtitles    # OpenSubtitles
//! film_enrich metadata     # TMDB + genderize.io + Wikipedia
//! film_enrich thematic     # language model over subtitles + plots
//! film_enrich clean
//! film_enrich violence
//! ```
//!
//! ## Architecture
//!
//! Every enrichment stage is the same skeleton:
//! 1. **Load**: the sample (or the joined subtitle/plot text)
//! 2. **Enrich**: one [`pipeline::Enricher`] call per row, strictly in order,
//!    with a fixed pause between calls
//! 3. **Merge**: results are merged into the stage's CSV, one row per key,
//!    newest wins, so reruns top up rather than duplicate
//! 4. **Summarize**: counts and skipped/failed keys go to `runs/`

use awful_aj::{config as aj_config, config_dir, template};
use chrono::{DateTime, Local};
use clap::Parser;
use serde::Serialize;
use std::error::Error;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod classify;
mod clean;
mod cli;
mod config;
mod dataset;
mod error;
mod models;
mod outputs;
mod pipeline;
mod sources;
mod utils;

use api::AskFnWrapper;
use cli::{Cli, Command};
use config::PipelineConfig;
use dataset::{JoinKind, add_combined_text, join, join_all, load_all, load_csv, sample};
use models::{Dataset, PRIMARY_KEY, TITLE};
use outputs::json::write_run_summary;
use outputs::tabular::{MergeReport, write_dataset, write_merged};
use pipeline::{Enricher, PassReport, QuotaPolicy, RateLimiter, run_pass};
use sources::{
    build_client, genderize::GenderizeClient, metadata::MetadataSource, omdb::PlotSource,
    opensubtitles::SubtitleSource, thematic::COMBINED_TEXT, thematic::ThematicSource, tmdb::PosterSource,
    tmdb::TmdbClient,
};
use utils::ensure_writable_dir;

#[derive(Debug, Serialize)]
struct EnrichSummary<'a> {
    #[serde(flatten)]
    pass: &'a PassReport,
    merge: MergeReport,
}

#[derive(Debug, Serialize)]
struct LocalSummary {
    rows_in: usize,
    rows_out: usize,
    dropped: usize,
}

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv::dotenv().ok();

    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();

    let args = Cli::parse();
    let stage = args.command.stage();
    info!(stage, "film_enrich starting up");
    debug!(?args.config, ?args.data_dir, "Parsed CLI arguments");

    let mut cfg = PipelineConfig::load(args.config.as_deref())?;
    if let Some(dir) = &args.data_dir {
        cfg.data_dir = dir.clone();
    }

    // Early check: the data dir must be writable before any API call is spent
    if let Err(e) = ensure_writable_dir(&cfg.data_dir).await {
        error!(
            path = %cfg.data_dir.display(),
            error = %e,
            "Data directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    let credentials = args.credentials();
    let quota = if cfg.stop_on_quota {
        QuotaPolicy::Stop
    } else {
        QuotaPolicy::Continue
    };
    let started_at = Local::now();

    match &args.command {
        Command::Sample { size, seed } => {
            let size = size.unwrap_or(cfg.sample.size);
            let seed = seed.unwrap_or(cfg.sample.seed);
            run_sample(&cfg, size, seed, started_at).await?;
        }
        Command::Plots => {
            let api_key = credentials.omdb()?;
            let client = build_client(&cfg.user_agent)?;
            let source = PlotSource::new(client, &cfg.endpoints.omdb, api_key, cfg.descriptions_dir());
            let input = load_csv(&cfg.sample_path()).await?;
            let limiter = RateLimiter::new(cfg.delays.plot());
            run_enrichment(&cfg, stage, &source, &input, limiter, quota, &cfg.descriptions_path(), started_at).await?;
        }
        Command::Posters => {
            let api_key = credentials.tmdb()?;
            let client = build_client(&cfg.user_agent)?;
            let tmdb = TmdbClient::new(client.clone(), &cfg.endpoints.tmdb, api_key);
            let source = PosterSource::new(
                tmdb,
                client,
                &cfg.endpoints.tmdb_images,
                cfg.posters_dir(),
                PathBuf::from("posters"),
            );
            let input = load_csv(&cfg.sample_path()).await?;
            let limiter = RateLimiter::new(cfg.delays.poster());
            run_enrichment(&cfg, stage, &source, &input, limiter, quota, &cfg.posters_path(), started_at).await?;
        }
        Command::Subtitles => {
            let api_key = credentials.opensubtitles()?;
            let client = build_client(&cfg.user_agent)?;
            let source = SubtitleSource::new(
                client,
                &cfg.endpoints.opensubtitles,
                api_key,
                &cfg.user_agent,
                cfg.subtitles_dir(),
            );
            let input = load_csv(&cfg.sample_path()).await?;
            let limiter = RateLimiter::new(cfg.delays.subtitle());
            run_enrichment(&cfg, stage, &source, &input, limiter, quota, &cfg.subtitles_path(), started_at).await?;
        }
        Command::Metadata => {
            let api_key = credentials.tmdb()?;
            let client = build_client(&cfg.user_agent)?;
            let source = MetadataSource::new(
                TmdbClient::new(client.clone(), &cfg.endpoints.tmdb, api_key),
                GenderizeClient::new(client.clone(), &cfg.endpoints.genderize),
                client,
            );
            let input = load_csv(&cfg.sample_path()).await?;
            let limiter = RateLimiter::new(cfg.delays.metadata());
            run_enrichment(&cfg, stage, &source, &input, limiter, quota, &cfg.metadata_path(), started_at).await?;
        }
        Command::Thematic { awful_config } => {
            // ---- Load template & config ----
            let template = template::load_template(&cfg.thematic.template).await?;
            info!(template = %cfg.thematic.template, "Loaded template");
            let conf_file = match awful_config {
                Some(path) => path.clone(),
                None => config_dir()?.join("config.yaml"),
            };
            let config_path = conf_file.to_str().ok_or("model config path is not valid UTF-8")?;
            let model_config = aj_config::load_config(config_path).map_err(|e| e.to_string())?;
            info!(config_path, "Loaded model configuration");

            let input = load_text_sources(&cfg).await?;
            let model = AskFnWrapper {
                config: &model_config,
                template: &template,
            };
            let source = ThematicSource::new(model, cfg.thematic.min_chars, cfg.thematic.max_chars);
            let limiter = RateLimiter::new(cfg.delays.thematic());
            run_enrichment(&cfg, stage, &source, &input, limiter, quota, &cfg.thematic_path(), started_at).await?;
        }
        Command::Clean => {
            let inputs = load_all(&[cfg.thematic_path(), cfg.sample_path()]).await?;
            let [thematic, sampled]: [Dataset; 2] = inputs.try_into().map_err(|_| "expected two inputs")?;
            let reshaped = clean::reshape(&thematic, &sampled);
            if reshaped.dropped > 0 {
                warn!(dropped = reshaped.dropped, "Dropped (movie, theme) pairs with no category");
            }
            write_dataset(&cfg.thematic_clean_path(), &reshaped.dataset, clean::COLUMNS).await?;
            let summary = LocalSummary {
                rows_in: thematic.len(),
                rows_out: reshaped.dataset.len(),
                dropped: reshaped.dropped,
            };
            write_run_summary(&cfg.runs_dir(), stage, started_at, &summary).await?;
        }
        Command::Violence => {
            let texts = load_text_sources(&cfg).await?;
            let titles = load_csv(&cfg.sample_path()).await?.select(&[PRIMARY_KEY, TITLE]);
            let texts = join(&texts.select(&[PRIMARY_KEY, COMBINED_TEXT]), &titles, PRIMARY_KEY, JoinKind::Left)?;
            let coded = classify::code_violence(&texts, COMBINED_TEXT);
            write_dataset(&cfg.violence_path(), &coded, classify::COLUMNS).await?;
            let summary = LocalSummary {
                rows_in: texts.len(),
                rows_out: coded.len(),
                dropped: 0,
            };
            write_run_summary(&cfg.runs_dir(), stage, started_at, &summary).await?;
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        stage,
        elapsed_secs = elapsed.as_secs(),
        elapsed_ms = elapsed.as_millis(),
        "Execution complete"
    );

    Ok(())
}

/// Join the source CSVs on the primary key and draw the sample.
#[instrument(level = "info", skip(cfg, started_at))]
async fn run_sample(
    cfg: &PipelineConfig,
    size: usize,
    seed: u64,
    started_at: DateTime<Local>,
) -> Result<(), Box<dyn Error>> {
    let inputs = load_all(&cfg.input_paths()).await?;
    let joined = join_all(inputs, PRIMARY_KEY, JoinKind::Left)?;
    info!(rows = joined.len(), columns = joined.columns.len(), "Joined source datasets");

    let sampled = sample(&joined, size, seed)?;
    write_dataset(&cfg.sample_path(), &sampled, &[]).await?;

    let summary = LocalSummary {
        rows_in: joined.len(),
        rows_out: sampled.len(),
        dropped: 0,
    };
    write_run_summary(&cfg.runs_dir(), "sample", started_at, &summary).await?;
    Ok(())
}

/// Subtitles outer-joined with plots, with `combined_text` added.
async fn load_text_sources(cfg: &PipelineConfig) -> Result<Dataset, Box<dyn Error>> {
    let inputs = load_all(&[cfg.subtitles_path(), cfg.descriptions_path()]).await?;
    let mut texts = join_all(inputs, PRIMARY_KEY, JoinKind::Outer)?;
    add_combined_text(&mut texts, "subtitle_text", "plot", COMBINED_TEXT);
    info!(rows = texts.len(), "Combined subtitle and plot text");
    Ok(texts)
}

/// One enrichment pass followed by the dedup-on-merge write and a run summary.
#[allow(clippy::too_many_arguments)]
async fn run_enrichment<E: Enricher>(
    cfg: &PipelineConfig,
    stage: &str,
    enricher: &E,
    input: &Dataset,
    limiter: RateLimiter,
    quota: QuotaPolicy,
    output: &Path,
    started_at: DateTime<Local>,
) -> Result<(), Box<dyn Error>> {
    info!(stage, rows = input.len(), delay_ms = limiter.delay().as_millis() as u64, "Starting enrichment pass");
    let mut report = run_pass(enricher, input, limiter, quota).await;

    let records = std::mem::take(&mut report.records);
    let merge = write_merged(output, records, PRIMARY_KEY, enricher.columns()).await?;
    info!(
        path = %output.display(),
        existing = merge.existing,
        incoming = merge.incoming,
        written = merge.written,
        "Merged results"
    );

    for note in &report.skipped {
        debug!(row = note.row, key = %note.key, reason = %note.reason, "Skip");
    }
    if report.stopped_on_quota {
        warn!(stage, rows_seen = report.rows_seen, rows_total = report.rows_total, "Pass stopped early on quota");
    }

    let summary = EnrichSummary { pass: &report, merge };
    write_run_summary(&cfg.runs_dir(), stage, started_at, &summary).await?;
    Ok(())
}
