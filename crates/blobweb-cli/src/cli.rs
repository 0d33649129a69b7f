use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Default store for the inspection commands.
pub const DEFAULT_STORE_URL: &str = "sqlite:///datastore.db";

#[derive(Parser)]
#[command(
    name = "blobweb",
    about = "Serve blobweb apps and manage their datastores",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the HTTP server
    Serve(ServeArgs),
    /// Print the effective configuration as TOML
    Config(ConfigArgs),
    /// List keys in a datastore
    Keys(KeysArgs),
    /// Show the record stored under a key
    Show(ShowArgs),
    /// Copy every non-internal key from one datastore to another
    Migrate(MigrateArgs),
    /// Delete every key in a datastore
    Flush(FlushArgs),
}

#[derive(Args)]
pub struct ServeArgs {
    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub host: Option<String>,
    #[arg(short, long)]
    pub port: Option<u16>,
    /// Enables the datastore at this URL
    #[arg(long)]
    pub datastore_url: Option<String>,
    /// Log RPC calls at debug level only
    #[arg(long)]
    pub quiet: bool,
}

#[derive(Args)]
pub struct ConfigArgs {
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

#[derive(Args)]
pub struct KeysArgs {
    /// Glob pattern, e.g. `user::*`
    pub pattern: Option<String>,
    #[arg(long, default_value = DEFAULT_STORE_URL)]
    pub url: String,
}

#[derive(Args)]
pub struct ShowArgs {
    pub key: String,
    #[arg(long, default_value = DEFAULT_STORE_URL)]
    pub url: String,
}

#[derive(Args)]
pub struct MigrateArgs {
    pub source: String,
    pub destination: String,
}

#[derive(Args)]
pub struct FlushArgs {
    #[arg(long, default_value = DEFAULT_STORE_URL)]
    pub url: String,
    /// Required; flushing cannot be undone
    #[arg(long)]
    pub yes: bool,
}
