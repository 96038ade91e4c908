#![forbid(unsafe_code)]

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::Level;

use panel_harness::aggregate::AggregateResult;
use panel_harness::cache::SqliteEvaluationCache;
use panel_harness::config::PanelConfig;
use panel_harness::events::{
    EventLogWorker, EventSink, JsonlEventSink, TeeEventSink, TracingEventSink,
};
use panel_harness::gateway::{NoopUsageSink, StderrUsageSink, UsageSink};
use panel_harness::panel::{BatchOutcome, Panel, PanelError};
use panel_harness::report::{render_report_markdown, Leaderboard};
use panel_harness::submission::{
    BatchSubmission, ContentExtractor, PlainTextExtractor, SubmissionContent, VisualAssessment,
};
use panel_harness::telemetry::init_tracing;

#[derive(Parser)]
#[command(name = "panel", version, about = "Multi-judge hackathon scoring CLI")]
struct Cli {
    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct RunArgs {
    /// JSON config file (defaults + env overrides when omitted)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Skip the result cache
    #[arg(long)]
    no_cache: bool,
    /// Print one usage record per backend call to stderr
    #[arg(long)]
    usage: bool,
    /// Write evaluation events as JSON lines
    #[arg(long)]
    events: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate one submission
    Evaluate {
        #[arg(long, default_value = "")]
        problem: String,
        /// Extracted slide text file
        #[arg(long, conflicts_with = "content")]
        content_file: Option<PathBuf>,
        /// Extracted slide text inline
        #[arg(long)]
        content: Option<String>,
        /// Visual summary text, e.g. "Visual:11/15 clean layout"
        #[arg(long, conflicts_with = "visual_json")]
        visual: Option<String>,
        /// Visual assessment JSON ({visual_score, feedback, metrics})
        #[arg(long)]
        visual_json: Option<PathBuf>,
        #[arg(long)]
        team: Option<String>,
        /// Write the full result as JSON here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
        /// Print a markdown report instead of JSON
        #[arg(long)]
        markdown: bool,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Evaluate a JSON array of team submissions
    Batch {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        out: PathBuf,
        /// Evaluations in flight at once
        #[arg(long, default_value_t = 1)]
        workers: usize,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Render a markdown report from a result JSON file
    Report {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        team: Option<String>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Rank batch outcomes
    Leaderboard {
        #[arg(long)]
        input: PathBuf,
        /// Print JSON instead of markdown
        #[arg(long)]
        json: bool,
    },
    /// List the judge seats, their models and weights
    Judges {
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Export SQLite cache to JSONL
    CacheExport {
        #[arg(long)]
        db: Option<PathBuf>,
        #[arg(long)]
        out: PathBuf,
    },
    /// Prune SQLite cache (by age and/or size)
    CachePrune {
        #[arg(long)]
        db: Option<PathBuf>,
        #[arg(long)]
        max_age_days: Option<u64>,
        #[arg(long)]
        max_rows: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.log_json, Level::INFO);

    match cli.command {
        Commands::Evaluate {
            problem,
            content_file,
            content,
            visual,
            visual_json,
            team,
            out,
            markdown,
            run,
        } => {
            let ppt_content = match (content, content_file) {
                (Some(text), _) => text,
                (None, Some(path)) => PlainTextExtractor.extract(&path)?,
                (None, None) => return Err("evaluate requires --content or --content-file".into()),
            };
            let visual_analysis = match (visual, visual_json) {
                (Some(text), _) => text,
                (None, Some(path)) => {
                    let assessment: VisualAssessment = read_json(&path)?;
                    assessment.to_visual_analysis()
                }
                (None, None) => String::new(),
            };
            let submission = SubmissionContent::new(problem, ppt_content, visual_analysis);

            let (panel, worker) = open_panel(&run)?;
            let result = panel.evaluate_content(&submission).await;
            drop(panel);
            finish_events(worker)?;
            let result = result?;

            let rendered = if markdown {
                render_report_markdown(&result, team.as_deref())
            } else {
                serde_json::to_string_pretty(&result)?
            };
            write_output(out.as_deref(), &rendered)?;
        }
        Commands::Batch {
            input,
            out,
            workers,
            run,
        } => {
            let rows: Vec<BatchSubmission> = read_json(&input)?;
            let mut outcomes: Vec<Option<BatchOutcome>> = vec![None; rows.len()];
            let mut pending = Vec::new();
            for (idx, row) in rows.iter().enumerate() {
                match row.resolve(&PlainTextExtractor) {
                    Ok(content) => pending.push((idx, row.team.clone(), content)),
                    Err(err) => {
                        tracing::warn!(team = %row.team, error = %err, "skipping submission");
                        outcomes[idx] = Some(BatchOutcome::failed(&row.team, err));
                    }
                }
            }

            let (panel, worker) = open_panel(&run)?;
            let (indices, submissions): (Vec<usize>, Vec<(String, SubmissionContent)>) = pending
                .into_iter()
                .map(|(idx, team, content)| (idx, (team, content)))
                .unzip();
            let evaluated = panel.evaluate_batch(submissions, workers).await;
            drop(panel);
            finish_events(worker)?;

            for (idx, outcome) in indices.into_iter().zip(evaluated) {
                outcomes[idx] = Some(outcome);
            }
            let outcomes: Vec<BatchOutcome> = outcomes.into_iter().flatten().collect();
            let failed = outcomes.iter().filter(|o| o.result.is_none()).count();
            std::fs::write(&out, serde_json::to_string_pretty(&outcomes)?)?;
            println!(
                "evaluated {} submissions ({} failed); results in {}",
                outcomes.len(),
                failed,
                out.display()
            );
        }
        Commands::Report { input, team, out } => {
            let result: AggregateResult = read_json(&input)?;
            write_output(out.as_deref(), &render_report_markdown(&result, team.as_deref()))?;
        }
        Commands::Leaderboard { input, json } => {
            let outcomes: Vec<BatchOutcome> = read_json(&input)?;
            let board = Leaderboard::from_outcomes(&outcomes);
            let rendered = if json {
                serde_json::to_string_pretty(&board)?
            } else {
                board.render_markdown()
            };
            write_output(None, &rendered)?;
        }
        Commands::Judges { config } => {
            let mut config = PanelConfig::load(config.as_deref())?;
            config.cache.enabled = false;
            let panel = Panel::from_config(&config, Arc::new(NoopUsageSink))?;
            write_output(None, &serde_json::to_string_pretty(&panel.judge_info())?)?;
        }
        Commands::CacheExport { db, out } => {
            let path = db.unwrap_or_else(SqliteEvaluationCache::default_path);
            let cache = SqliteEvaluationCache::new(path)?;
            let written = cache.export_jsonl(&out).await?;
            println!("exported {written} rows to {}", out.display());
        }
        Commands::CachePrune {
            db,
            max_age_days,
            max_rows,
        } => {
            if max_age_days.is_none() && max_rows.is_none() {
                return Err("cache-prune requires --max-age-days and/or --max-rows".into());
            }
            if matches!(max_rows, Some(0)) {
                return Err("--max-rows must be >= 1".into());
            }
            let path = db.unwrap_or_else(SqliteEvaluationCache::default_path);
            let cache = SqliteEvaluationCache::new(path)?;
            let _lock = cache.lock_exclusive()?;
            let stats = cache.prune(max_age_days, max_rows).await?;
            println!(
                "pruned {} rows; {} rows remain",
                stats.deleted, stats.remaining
            );
        }
    }

    Ok(())
}

fn open_panel(
    run: &RunArgs,
) -> Result<(Panel, Option<EventLogWorker>), Box<dyn std::error::Error>> {
    let mut config = PanelConfig::load(run.config.as_deref())?;
    if run.no_cache {
        config.cache.enabled = false;
    }

    let mut sinks: Vec<Arc<dyn EventSink>> = vec![Arc::new(TracingEventSink)];
    let mut worker = None;
    if let Some(path) = &run.events {
        let (sink, w) = JsonlEventSink::new(path)?;
        sinks.push(Arc::new(sink));
        worker = Some(w);
    }
    let events: Arc<dyn EventSink> = Arc::new(TeeEventSink::new(sinks));

    let panel = if run.usage {
        build_panel(&config, Arc::new(StderrUsageSink), events)?
    } else {
        build_panel(&config, Arc::new(NoopUsageSink), events)?
    };
    Ok((panel, worker))
}

fn build_panel<U: UsageSink + 'static>(
    config: &PanelConfig,
    usage: Arc<U>,
    events: Arc<dyn EventSink>,
) -> Result<Panel, PanelError> {
    Ok(Panel::from_config(config, usage)?.with_events(events))
}

fn finish_events(worker: Option<EventLogWorker>) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(worker) = worker {
        worker.join()?;
    }
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
    Ok(serde_json::from_str(&raw).map_err(|e| format!("invalid JSON in {}: {e}", path.display()))?)
}

fn write_output(path: Option<&Path>, text: &str) -> io::Result<()> {
    match path {
        Some(path) => {
            let mut file = File::create(path)?;
            file.write_all(text.as_bytes())?;
            if !text.ends_with('\n') {
                writeln!(file)?;
            }
            Ok(())
        }
        None => {
            let stdout = io::stdout();
            let mut lock = stdout.lock();
            lock.write_all(text.as_bytes())?;
            if !text.ends_with('\n') {
                writeln!(lock)?;
            }
            Ok(())
        }
    }
}
