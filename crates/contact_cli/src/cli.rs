//! Command-line surface and process configuration.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments for `contact`.
#[derive(Parser, Debug)]
#[command(name = "contact")]
#[command(about = "Reconcile contact identities across emails and phone numbers")]
#[command(version)]
pub struct Cli {
    /// SQLite database file holding contacts
    #[arg(long, default_value = "contacts.db", env = "CONTACT_DB_PATH")]
    pub db_path: PathBuf,

    /// Log level (trace|debug|info|warn|error); defaults by build mode
    #[arg(long, env = "CONTACT_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Absolute directory for rotated log files; logging is off when unset
    #[arg(long, env = "CONTACT_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Identify a contact and print its consolidated cluster
    Identify(IdentifyArgs),
    /// Print every contact reachable from an email and/or phone number
    Cluster(LookupArgs),
    /// Print a health probe
    Health,
}

#[derive(Args, Debug)]
pub struct IdentifyArgs {
    #[command(flatten)]
    pub lookup: LookupArgs,

    /// Raw JSON request body, e.g. '{"email":"a@x.com","phoneNumber":123}'
    #[arg(long, conflicts_with_all = ["email", "phone"])]
    pub json: Option<String>,
}

#[derive(Args, Debug)]
pub struct LookupArgs {
    #[arg(long)]
    pub email: Option<String>,

    #[arg(long)]
    pub phone: Option<String>,
}
