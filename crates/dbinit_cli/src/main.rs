//! `dbinit` command-line entry point.
//!
//! # Responsibility
//! - Resolve settings from flags, the settings file and the environment.
//! - Print human-readable progress and map the outcome to an exit code.

use clap::Parser;
use dbinit_core::{
    default_log_dir, default_log_level, init_logging, load_env_file, ConnectionSettings,
    MemoryConnector, MongoConnector, Profile, Progress, ProvisionError, ProvisionReport,
    ProvisionResult, Provisioner, RetryPolicy, Schema,
};
use log::{error, info};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

const EXIT_PROVISION_FAILED: u8 = 1;
const EXIT_USAGE: u8 = 2;

/// Creates the application's MongoDB collections and indexes if missing.
#[derive(Debug, Parser)]
#[command(name = "dbinit", version, about)]
struct Cli {
    /// Schema set to provision (annaforces|judge).
    #[arg(long, default_value_t = Profile::Annaforces)]
    profile: Profile,

    /// Settings file loaded before reading the environment (default: nearest `.env`).
    #[arg(long, value_name = "PATH")]
    env_file: Option<PathBuf>,

    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    /// Overrides the profile's database name.
    #[arg(long)]
    database: Option<String>,

    #[arg(long, default_value_t = 5)]
    max_attempts: u32,

    #[arg(long, default_value_t = 10)]
    retry_delay_secs: u64,

    /// Provision an empty in-memory store instead of connecting.
    #[arg(long)]
    dry_run: bool,

    /// Print the selected schema as JSON and exit.
    #[arg(long)]
    print_schema: bool,

    #[arg(long, env = "DBINIT_LOG_LEVEL")]
    log_level: Option<String>,

    #[arg(long, env = "DBINIT_LOG_DIR", value_name = "DIR")]
    log_dir: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = cli.log_level.as_deref().unwrap_or_else(|| default_log_level());
    let log_dir = cli.log_dir.clone().unwrap_or_else(default_log_dir);
    if let Err(err) = init_logging(level, &log_dir) {
        eprintln!("logging disabled: {err}");
    }
    ExitCode::from(run(&cli))
}

fn run(cli: &Cli) -> u8 {
    let provisioner = Provisioner::new(RetryPolicy::new(
        cli.max_attempts,
        Duration::from_secs(cli.retry_delay_secs),
    ));
    info!(
        "event=cli_start module=cli status=ok run_id={} profile={} dry_run={} version={}",
        provisioner.run_id(),
        cli.profile,
        cli.dry_run,
        dbinit_core::core_version()
    );

    let schema = match &cli.database {
        Some(database) => cli.profile.schema().with_database(database.clone()),
        None => cli.profile.schema(),
    };

    if cli.print_schema {
        return print_schema(&schema);
    }

    let mut print = |progress: &Progress<'_>| {
        if matches!(progress, Progress::Complete) {
            println!();
        }
        println!("{progress}");
    };

    let result = if cli.dry_run {
        provisioner.run(&MemoryConnector::new(), &schema, &mut print)
    } else {
        let settings = match resolve_settings(cli) {
            Ok(settings) => settings,
            Err(message) => {
                error!("event=cli_config module=cli status=error error={message}");
                eprintln!("{message}");
                return EXIT_USAGE;
            }
        };
        provisioner.run(&MongoConnector::new(settings), &schema, &mut print)
    };

    if let Err(ProvisionError::Schema(err)) = &result {
        eprintln!("invalid schema: {err}");
    }
    exit_code(&result)
}

/// Maps a run outcome to the process exit status.
///
/// Other failures were already described by progress lines.
fn exit_code(result: &ProvisionResult<ProvisionReport>) -> u8 {
    match result {
        Ok(_) => 0,
        Err(ProvisionError::Schema(_)) => EXIT_USAGE,
        Err(_) => EXIT_PROVISION_FAILED,
    }
}

fn resolve_settings(cli: &Cli) -> Result<ConnectionSettings, String> {
    load_env_file(cli.env_file.as_deref()).map_err(|err| err.to_string())?;

    let mut settings = ConnectionSettings::from_env().map_err(|err| err.to_string())?;
    if let Some(host) = &cli.host {
        settings = settings.with_host(host.clone());
    }
    if let Some(port) = cli.port {
        settings = settings.with_port(port).map_err(|err| err.to_string())?;
    }
    info!(
        "event=config_load module=cli status=ok target={} authenticated={}",
        settings.address(),
        settings.is_authenticated()
    );
    Ok(settings)
}

fn print_schema(schema: &Schema) -> u8 {
    match serde_json::to_string_pretty(schema) {
        Ok(json) => {
            println!("{json}");
            0
        }
        Err(err) => {
            eprintln!("failed to render schema: {err}");
            EXIT_PROVISION_FAILED
        }
    }
}
