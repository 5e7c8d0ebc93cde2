//! salesload command-line interface.
//!
//! ```bash
//! # Create the table, load 200 000 rows, verify
//! salesload run
//!
//! # Step by step, against a SQLite file
//! salesload --engine sqlite --db sales.db init
//! salesload --engine sqlite --db sales.db generate --rows 50000 --seed 7
//! salesload --engine sqlite --db sales.db verify --expect-rows 50000 --strict
//! ```
//!
//! Logging goes to stderr (and optionally a file); filter with `RUST_LOG`.

use std::fs::File;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;

use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use salesload::report::render_report;
use salesload::{
    ensure_table_exists, run_load, AnyStore, BarProgress, CommitAlignment, Engine, LoadConfig,
    LoadObserver, LoadSummary, LogProgress, RemainderPolicy, Storage, VerificationReport,
    Verifier,
};

const EXIT_OK: u8 = 0;
/// Exit status when verification finds mismatches under `--strict`.
const EXIT_MISMATCH: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "salesload", version, about = "Generate, load and verify synthetic sales data")]
struct Args {
    /// Database file.
    #[arg(long, global = true, default_value = "test_db.duckdb")]
    db: PathBuf,

    /// Storage engine.
    #[arg(long, global = true, value_enum, default_value_t = Engine::DuckDb)]
    engine: Engine,

    /// Also write logs to this file.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the sales_transactions table if it does not exist.
    Init,
    /// Generate and bulk-load rows.
    Generate(GenerateArgs),
    /// Check the loaded table.
    Verify(VerifyArgs),
    /// init, generate and verify in one go.
    Run(RunArgs),
}

#[derive(ClapArgs, Debug)]
struct GenerateArgs {
    /// JSON config file; flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Total rows to load.
    #[arg(long)]
    rows: Option<u64>,

    /// Rows per bulk insert.
    #[arg(long)]
    batch_size: Option<usize>,

    /// Batches between commits.
    #[arg(long)]
    commit_every: Option<usize>,

    #[arg(long, value_enum)]
    commit_alignment: Option<CommitAlignment>,

    /// Handling of rows that don't fill a whole batch.
    #[arg(long, value_enum)]
    remainder: Option<RemainderPolicy>,

    /// Seed for reproducible data.
    #[arg(long)]
    seed: Option<u64>,

    /// Log progress instead of drawing a progress bar.
    #[arg(long)]
    no_progress: bool,
}

#[derive(ClapArgs, Debug)]
struct VerifyArgs {
    /// JSON config whose value domains the data is checked against.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(flatten)]
    report: ReportArgs,
}

#[derive(ClapArgs, Debug)]
struct ReportArgs {
    /// Require exactly this many rows.
    #[arg(long)]
    expect_rows: Option<u64>,

    /// Exit non-zero when any mismatch is found.
    #[arg(long)]
    strict: bool,

    /// Write the report as JSON to this file.
    #[arg(long)]
    json: Option<PathBuf>,

    /// Rows shown in the sample section.
    #[arg(long, default_value_t = salesload::verifier::DEFAULT_SAMPLE_SIZE)]
    sample: usize,
}

#[derive(ClapArgs, Debug)]
struct RunArgs {
    #[command(flatten)]
    generate: GenerateArgs,

    #[command(flatten)]
    report: ReportArgs,
}

fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_logging(args.log_file.as_deref()) {
        eprintln!("error: {e:#}");
        return ExitCode::FAILURE;
    }

    match dispatch(&args) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(log_file: Option<&Path>) -> anyhow::Result<()> {
    // ANSI colors only when stderr is a terminal and NO_COLOR is unset.
    let ansi = std::io::stderr().is_terminal() && std::env::var_os("NO_COLOR").is_none();

    let file_layer = match log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("cannot create log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(ansi)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .try_init()
        .context("cannot install log subscriber")?;
    Ok(())
}

fn dispatch(args: &Args) -> anyhow::Result<u8> {
    match &args.cmd {
        Command::Init => {
            init_table(args.engine, &args.db)?;
            Ok(EXIT_OK)
        }
        Command::Generate(generate) => {
            let config = build_config(generate)?;
            generate_rows(args.engine, &args.db, &config, generate.no_progress)?;
            Ok(EXIT_OK)
        }
        Command::Verify(verify) => {
            let config = load_config_file(verify.config.as_deref())?;
            verify_table(args.engine, &args.db, &config, &verify.report, None)
        }
        Command::Run(run) => {
            let config = build_config(&run.generate)?;
            init_table(args.engine, &args.db)?;
            let summary = generate_rows(args.engine, &args.db, &config, run.generate.no_progress)?;
            verify_table(
                args.engine,
                &args.db,
                &config,
                &run.report,
                Some(summary.rows_loaded),
            )
        }
    }
}

fn load_config_file(path: Option<&Path>) -> anyhow::Result<LoadConfig> {
    match path {
        Some(path) => LoadConfig::from_json_file(path)
            .with_context(|| format!("cannot load config {}", path.display())),
        None => Ok(LoadConfig::default()),
    }
}

fn build_config(args: &GenerateArgs) -> anyhow::Result<LoadConfig> {
    let mut config = load_config_file(args.config.as_deref())?;
    if let Some(rows) = args.rows {
        config.total_rows = rows;
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(interval) = args.commit_every {
        config.commit.interval = interval;
    }
    if let Some(alignment) = args.commit_alignment {
        config.commit.alignment = alignment;
    }
    if let Some(remainder) = args.remainder {
        config.remainder = remainder;
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    Ok(config)
}

fn init_table(engine: Engine, path: &Path) -> anyhow::Result<()> {
    let mut store = AnyStore::open(engine, path)?;
    ensure_table_exists(&mut store)
        .with_context(|| format!("cannot create table in {}", path.display()))?;
    store.close()?;
    Ok(())
}

fn generate_rows(
    engine: Engine,
    path: &Path,
    config: &LoadConfig,
    no_progress: bool,
) -> anyhow::Result<LoadSummary> {
    let mut observer: Box<dyn LoadObserver> = if no_progress || !std::io::stderr().is_terminal()
    {
        Box::new(LogProgress::default())
    } else {
        Box::new(BarProgress::new())
    };

    info!(path = %path.display(), %engine, rows = config.total_rows, "generating data");
    let summary = run_load(engine, path, config, &mut *observer)
        .with_context(|| format!("load into {} failed", path.display()))?;

    println!(
        "Loaded {} rows in {} batches ({} commits) in {:.1}s",
        summary.rows_loaded,
        summary.batches,
        summary.commits,
        summary.elapsed_ms as f64 / 1000.0
    );
    Ok(summary)
}

fn verify_table(
    engine: Engine,
    path: &Path,
    config: &LoadConfig,
    args: &ReportArgs,
    default_expected: Option<u64>,
) -> anyhow::Result<u8> {
    let mut verifier = Verifier::new(config.domains.clone()).sample_size(args.sample);
    if let Some(rows) = args.expect_rows.or(default_expected) {
        verifier = verifier.expect_rows(rows);
    }

    let report = salesload::verify_database(engine, path, &verifier)
        .with_context(|| format!("cannot verify {}", path.display()))?;
    print!("{}", render_report(&report));
    write_json(&report, args.json.as_deref())?;

    if args.strict && !report.is_clean() {
        return Ok(EXIT_MISMATCH);
    }
    Ok(EXIT_OK)
}

fn write_json(report: &VerificationReport, path: Option<&Path>) -> anyhow::Result<()> {
    if let Some(path) = path {
        std::fs::write(path, report.to_json()?)
            .with_context(|| format!("cannot write report to {}", path.display()))?;
        info!(path = %path.display(), "wrote JSON report");
    }
    Ok(())
}
