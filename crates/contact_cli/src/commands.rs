//! Subcommand execution and error-to-exit-code mapping.
//!
//! # Invariants
//! - Every command prints exactly one JSON document, including runs whose
//!   logging configuration is rejected.
//! - Bad input exits with `EXIT_BAD_REQUEST` and a descriptive error.
//! - Internal failures exit with `EXIT_INTERNAL` and a generic error; the
//!   detail goes to the log only.

use crate::cli::{Cli, Command, IdentifyArgs, LookupArgs};
use crate::validate::{from_flags, parse_body, RequestError};
use anyhow::{Context, Result};
use contact_core::db::open_db;
use contact_core::{
    core_version, default_log_level, identify_contact, init_logging_with, normalize_input, ping,
    IdentifyError, IdentifyService, LogConfig, SqliteContactRepository,
};
use log::error;
use serde_json::{json, Value};

pub const EXIT_OK: u8 = 0;
pub const EXIT_INTERNAL: u8 = 1;
pub const EXIT_BAD_REQUEST: u8 = 2;

/// JSON document and exit code produced by one command.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutput {
    pub exit_code: u8,
    pub body: Value,
}

/// Starts file logging when a log directory is configured.
pub fn init_cli_logging(cli: &Cli) -> Result<()> {
    let Some(log_dir) = cli.log_dir.as_deref() else {
        return Ok(());
    };
    let log_dir = log_dir
        .to_str()
        .context("log directory must be valid UTF-8")?;
    let level = cli.log_level.as_deref().unwrap_or(default_log_level());

    let config = LogConfig::parse(level, log_dir)?.with_echo_warnings(true);
    init_logging_with(config).context("failed to initialize logging")?;
    Ok(())
}

/// Starts logging, then runs the selected subcommand.
///
/// A rejected `--log-level`/`--log-dir` is reported as bad input instead of
/// aborting the process.
pub fn run(cli: &Cli) -> CommandOutput {
    if let Err(err) = init_cli_logging(cli) {
        return bad_request(format!("{err:#}"));
    }
    execute(cli)
}

/// Runs the selected subcommand and maps failures onto exit codes.
pub fn execute(cli: &Cli) -> CommandOutput {
    let result = match &cli.command {
        Command::Identify(args) => run_identify(cli, args),
        Command::Cluster(args) => run_cluster(cli, args),
        Command::Health => Ok(health()),
    };

    match result {
        Ok(body) => CommandOutput {
            exit_code: EXIT_OK,
            body,
        },
        Err(err) => failure_output(&err),
    }
}

fn health() -> Value {
    json!({
        "ok": ping() == "pong",
        "version": core_version(),
    })
}

fn run_identify(cli: &Cli, args: &IdentifyArgs) -> Result<Value> {
    let request = match args.json.as_deref() {
        Some(body) => parse_body(body)?,
        None => from_flags(args.lookup.email.as_deref(), args.lookup.phone.as_deref())?,
    };

    let mut conn = open_db(&cli.db_path)
        .with_context(|| format!("failed to open contact store {}", cli.db_path.display()))?;
    let response = identify_contact(&mut conn, &request)?;
    Ok(serde_json::to_value(response)?)
}

fn run_cluster(cli: &Cli, args: &LookupArgs) -> Result<Value> {
    let request = from_flags(args.email.as_deref(), args.phone.as_deref())?;
    let input = normalize_input(&request)?;

    let conn = open_db(&cli.db_path)
        .with_context(|| format!("failed to open contact store {}", cli.db_path.display()))?;
    let repo = SqliteContactRepository::try_new(&conn)?;
    let contacts = IdentifyService::new(repo)
        .find_cluster(input.email.as_deref(), input.phone_number.as_deref())?;
    Ok(json!({ "contacts": contacts }))
}

fn failure_output(err: &anyhow::Error) -> CommandOutput {
    if let Some(request_err) = err.downcast_ref::<RequestError>() {
        return bad_request(request_err.to_string());
    }
    if let Some(IdentifyError::Validation(message)) = err.downcast_ref::<IdentifyError>() {
        return bad_request(message.clone());
    }

    error!("event=command module=cli status=error error={err:#}");
    CommandOutput {
        exit_code: EXIT_INTERNAL,
        body: json!({ "error": "Internal Server Error" }),
    }
}

fn bad_request(message: String) -> CommandOutput {
    CommandOutput {
        exit_code: EXIT_BAD_REQUEST,
        body: json!({ "error": message }),
    }
}
