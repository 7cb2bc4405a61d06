//! `contact` binary entry point.

use anyhow::Result;
use clap::Parser;
use contact_cli::{run, Cli};
use std::process::ExitCode;

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let output = run(&cli);
    println!("{}", serde_json::to_string_pretty(&output.body)?);
    Ok(ExitCode::from(output.exit_code))
}
