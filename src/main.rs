use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::{
    fs::{self, OpenOptions},
    path::PathBuf,
    process::ExitCode,
    sync::Mutex,
};
use subscriber_pipeline::{
    clean::TransformOptions,
    config::PipelineConfig,
    error::PipelineError,
    ledger::ChangelogHead,
    pipeline::run_pipeline,
    promote::{AssumeYes, ConfirmationPort, GateState, PromotionGate, StdinConfirmation},
};
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FILE: &str = "cleanse_db.log";

#[derive(Parser)]
#[command(name = "subscriber-pipeline")]
#[command(about = "Clean the subscriber snapshot and promote it to production", long_about = None)]
struct Cli {
    /// YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Answer yes to every prompt
    #[arg(short, long, global = true)]
    yes: bool,

    #[arg(long, global = true)]
    source_db: Option<PathBuf>,

    #[arg(long, global = true)]
    staging_dir: Option<PathBuf>,

    #[arg(long, global = true)]
    production_dir: Option<PathBuf>,

    /// Also append logs to <LOG_DIR>/cleanse_db.log
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Clone, Copy)]
enum Command {
    /// Run the cleaning pipeline into staging
    Run,
    /// Promote staging to production if its version differs
    Promote,
    /// Print the staging and production changelog heads
    Status,
    /// Ask to run the pipeline, then ask to promote (default)
    Interactive,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match try_main(cli) {
        Ok(code) => code,
        Err(e) => {
            match e.downcast_ref::<PipelineError>() {
                Some(pe) => error!(stage = %pe.stage(), "{:#}", e),
                None => error!("{:#}", e),
            }
            eprintln!("error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

fn try_main(cli: Cli) -> Result<ExitCode> {
    // 1) config: file, then env, then flags
    let mut cfg = PipelineConfig::load(cli.config.as_deref())?;
    if let Some(p) = cli.source_db {
        cfg.source_db = p;
    }
    if let Some(p) = cli.staging_dir {
        cfg.staging_dir = p;
    }
    if let Some(p) = cli.production_dir {
        cfg.production_dir = p;
    }
    if let Some(p) = cli.log_dir {
        cfg.log_dir = Some(p);
    }

    // 2) logging
    init_logging(&cfg)?;
    info!(?cfg, "startup");

    // 3) scaffold directories
    for d in [&cfg.staging_dir, &cfg.production_dir] {
        fs::create_dir_all(d).with_context(|| format!("creating {}", d.display()))?;
    }

    let mut confirm: Box<dyn ConfirmationPort> = if cli.yes {
        Box::new(AssumeYes)
    } else {
        Box::new(StdinConfirmation)
    };

    match cli.command.unwrap_or(Command::Interactive) {
        Command::Run => {
            pipeline(&cfg)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Promote => promote(&cfg, confirm.as_mut()),
        Command::Status => {
            print_status(&gate(&cfg))?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Interactive => {
            if !confirm.confirm("Run the cleaning pipeline?") {
                info!("pipeline run declined");
                return Ok(ExitCode::SUCCESS);
            }
            pipeline(&cfg)?;
            print_status(&gate(&cfg))?;
            promote(&cfg, confirm.as_mut())
        }
    }
}

fn init_logging(cfg: &PipelineConfig) -> Result<()> {
    let env = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,subscriber_pipeline=info"));

    let file_layer = match &cfg.log_dir {
        Some(dir) => {
            fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
            let path = dir.join(LOG_FILE);
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env)
        .with(fmt::layer().with_span_events(fmt::format::FmtSpan::CLOSE))
        .with(file_layer)
        .init();
    Ok(())
}

fn gate(cfg: &PipelineConfig) -> PromotionGate {
    PromotionGate::new(
        cfg.staging_paths(),
        cfg.production_paths(),
        cfg.tables.cleansed.clone(),
    )
}

fn pipeline(cfg: &PipelineConfig) -> Result<()> {
    let report = run_pipeline(cfg, &TransformOptions::default())?;
    println!(
        "staging now at {} ({} rows, {} flagged, {} duplicates collapsed)",
        report.entry.version,
        report.stats.output_rows,
        report.stats.flagged_rows,
        report.stats.duplicates_collapsed
    );
    Ok(())
}

fn print_status(gate: &PromotionGate) -> Result<()> {
    let status = gate.status()?;
    let line = |h: &Option<ChangelogHead>| {
        h.as_ref()
            .map(|h| h.line.clone())
            .unwrap_or_else(|| "none".to_string())
    };
    println!("staging:    {}", line(&status.staging));
    println!("production: {}", line(&status.production));
    Ok(())
}

fn promote(cfg: &PipelineConfig, confirm: &mut dyn ConfirmationPort) -> Result<ExitCode> {
    let outcome = gate(cfg).run(confirm)?;
    match outcome.state {
        GateState::Promoted => {
            println!("promoted {} to production", outcome.staging_version);
            Ok(ExitCode::SUCCESS)
        }
        GateState::UpToDate => {
            println!("production already at {}", outcome.staging_version);
            Ok(ExitCode::SUCCESS)
        }
        GateState::Cancelled => {
            println!("promotion cancelled");
            Ok(ExitCode::from(2))
        }
        other => anyhow::bail!("promotion gate stopped in state {}", other),
    }
}
