pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

use fiscus_core::config::{AppConfig, LoadOptions, LogFormat};

#[derive(Debug, Parser)]
#[command(
    name = "fiscus",
    about = "Fiscus operator CLI",
    long_about = "Operate the fiscus budget tracker: migrations, demo fixtures, readiness \
                  checks, counter reconciliation, and activity-log verification.",
    after_help = "Examples:\n  fiscus migrate\n  fiscus doctor --json\n  fiscus verify-log --entity-kind project --entity-id proj-0001"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the deterministic demo dataset and verify it landed")]
    Seed,
    #[command(about = "Validate config, database connectivity, and schema readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Recompute usage counters from live references and repair drift")]
    Reconcile {
        #[arg(long, help = "Emit the full drift report as JSON")]
        json: bool,
    },
    #[command(name = "verify-log", about = "Verify one entity's activity hash chain")]
    VerifyLog {
        #[arg(long, help = "Entity kind: allocation|project|report|fund_record|fund_report")]
        entity_kind: String,
        #[arg(long, help = "Entity id whose chain to verify")]
        entity_id: String,
    },
    #[command(about = "Report live/trashed row counts per entity kind")]
    Status,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Reconcile { json } => commands::reconcile::run(json),
        Command::VerifyLog { entity_kind, entity_id } => {
            commands::verify_log::run(&entity_kind, &entity_id)
        }
        Command::Status => commands::status::run(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Best-effort subscriber install from the logging config. A broken config
/// still gets default logging; the command itself reports the config error.
fn init_logging() {
    let logging = AppConfig::load(LoadOptions::default())
        .map(|config| config.logging)
        .unwrap_or_else(|_| AppConfig::default().logging);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(logging.level.clone())),
        )
        .with_writer(std::io::stderr);

    let installed = match logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    // Tests may install a subscriber first; that is fine.
    let _ = installed;
}
