//! design-explorer CLI
//!
//! ```bash
//! design-explorer --src-dir ./gemm --work-dir ./gemm_dse --config ./gemm_dse/config.json
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use design_explorer::backend::{self, RunId};
use design_explorer::{
    prepare_workspace, CommandEvaluator, Config, ExhaustiveExplorer, GridCompiler, Interrupt,
    Orchestrator, Reporter, ResultStore, RunOptions, RunOutcome, RunReport, TextReporter,
};

#[derive(Parser, Debug)]
#[command(name = "design-explorer")]
#[command(about = "Explore a project's design space with concurrent search workers")]
#[command(version)]
struct Args {
    /// Project to explore
    #[arg(long)]
    src_dir: PathBuf,

    /// Working directory for jobs, reports and outputs
    #[arg(long, default_value = "./work")]
    work_dir: PathBuf,

    /// Exploration config file
    #[arg(long, default_value = "./config.json")]
    config: PathBuf,

    /// Result database path, overriding the config
    #[arg(long)]
    db: Option<PathBuf>,

    /// Log level used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let mut config = Config::from_file(&args.config).context("failed to load config")?;
    if let Some(db) = &args.db {
        config.database.path = db.clone();
    }
    let db_path = resolve(&args.work_dir, &config.database.path);

    if let Some(backup) = prepare_workspace(
        &args.src_dir,
        &args.work_dir,
        &[args.config.as_path(), db_path.as_path()],
    )? {
        info!(backup = %backup.display(), "previous workspace backed up");
    }
    config.database.path = db_path;

    let run_id = RunId::new(&config.project.name);
    info!(run = %run_id, "starting exploration");
    let backend = backend::open(&config.database, run_id)?;
    let store = Arc::new(ResultStore::new(
        backend,
        config.project.output_num,
        config.project.quality,
    ));
    let outcome = explore(&args, &config, Arc::clone(&store));
    // Worker threads may still hold the store after an interrupt, so its
    // backend is not guaranteed to drop before the process exits.
    if let Err(err) = store.cleanup() {
        warn!(error = %err, "run data left on the backend");
    }
    let report = outcome?;

    match report.outcome {
        RunOutcome::Materialized(n) => info!(
            outputs = n,
            report = %report.summary_report.display(),
            "exploration done"
        ),
        RunOutcome::NoResults => warn!(
            report = %report.summary_report.display(),
            "exploration done without a valid result"
        ),
    }
    Ok(())
}

fn explore(args: &Args, config: &Config, store: Arc<ResultStore>) -> anyhow::Result<RunReport> {
    let loaded = store.load().context("failed to load the result database")?;
    if loaded > 0 {
        info!(loaded, "resuming from stored results");
    }

    let evaluator = Arc::new(CommandEvaluator::new(
        &args.src_dir,
        args.work_dir.join("evaluate"),
        &config.evaluate,
        config.timeout.evaluation(),
    ));
    let reporter = Arc::new(TextReporter::new(Arc::clone(&store), config.clone()));
    reporter.log_config();

    let interrupt = Interrupt::new();
    let handle = interrupt.clone();
    ctrlc::set_handler(move || {
        warn!("received interrupt, draining with committed results");
        handle.trigger();
    })
    .context("failed to install the interrupt handler")?;

    let mut orchestrator = Orchestrator::new(
        GridCompiler,
        config.design_space.definition.clone(),
        store,
        Arc::new(ExhaustiveExplorer),
        evaluator,
        reporter,
        RunOptions::from_config(config, &args.work_dir),
        interrupt,
    );
    Ok(orchestrator.run()?)
}

fn resolve(work_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        work_dir.join(path)
    }
}
