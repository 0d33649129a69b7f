use std::path::Path;

use anyhow::{bail, Context};
use blobweb_rpc::{LoggingMode, Reply, RpcOptions};
use blobweb_server::{AppConfig, WebApp};
use blobweb_store::{cleanup_temp_dirs, migrate, Record, Store};
use colored::Colorize;
use serde_json::json;
use tracing::debug;

use crate::cli::*;

/// Run one subcommand, then remove the temp folders its stores created.
pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let format = cli.format;
    let result = match cli.command {
        Command::Serve(args) => cmd_serve(args),
        Command::Config(args) => cmd_config(args),
        Command::Keys(args) => cmd_keys(args, format),
        Command::Show(args) => cmd_show(args, format),
        Command::Migrate(args) => cmd_migrate(args, format),
        Command::Flush(args) => cmd_flush(args),
    };
    let removed = cleanup_temp_dirs();
    debug!(removed, "removed temp folders");
    result
}

fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    match path {
        Some(path) => Ok(AppConfig::load(path)?),
        None => Ok(AppConfig::default()),
    }
}

/// The config file with command-line overrides applied.
pub fn effective_config(args: &ServeArgs) -> anyhow::Result<AppConfig> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(host) = &args.host {
        config.server.host = host.clone();
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(url) = &args.datastore_url {
        config.datastore.enabled = true;
        config.datastore.url = url.clone();
    }
    if args.quiet {
        config.logging_mode = LoggingMode::Quiet;
    }
    Ok(config)
}

fn cmd_serve(args: ServeArgs) -> anyhow::Result<()> {
    let config = effective_config(&args)?;
    let mut app = WebApp::new(config)?;
    app.register("ping", |_, _, _| Ok(Reply::Value(json!("pong"))), RpcOptions::new());
    let server = app.into_server()?;

    println!(
        "{} blobweb serving on {}",
        "✓".green().bold(),
        server.bind_addr().to_string().bold()
    );
    let runtime = tokio::runtime::Runtime::new().context("cannot start async runtime")?;
    runtime.block_on(server.serve())?;
    Ok(())
}

fn cmd_config(args: ConfigArgs) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    print!("{}", config.to_toml_string()?);
    Ok(())
}

fn open_store(url: &str) -> anyhow::Result<Store> {
    let store = Store::open(url).with_context(|| format!("cannot open datastore {url}"))?;
    if store.is_new() {
        eprintln!("{} {} was empty", "!".yellow().bold(), url);
    }
    Ok(store)
}

/// Sorted keys matching `pattern`.
pub fn list_keys(store: &Store, pattern: Option<&str>) -> anyhow::Result<Vec<String>> {
    let mut keys = store.keys(pattern)?;
    keys.sort();
    Ok(keys)
}

fn cmd_keys(args: KeysArgs, format: OutputFormat) -> anyhow::Result<()> {
    let store = open_store(&args.url)?;
    let keys = list_keys(&store, args.pattern.as_deref())?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&keys)?),
        OutputFormat::Text => {
            for key in &keys {
                println!("{key}");
            }
            println!("{} keys in {}", keys.len().to_string().bold(), store.describe().dimmed());
        }
    }
    Ok(())
}

pub fn find_record(store: &Store, key: &str) -> anyhow::Result<Record> {
    match store.get(key)? {
        Some(record) => Ok(record),
        None => bail!("no record under key {key:?}"),
    }
}

fn cmd_show(args: ShowArgs, format: OutputFormat) -> anyhow::Result<()> {
    let store = open_store(&args.url)?;
    let record = find_record(&store, &args.key)?;
    let body = serde_json::to_string_pretty(&record)?;
    match format {
        OutputFormat::Json => println!("{body}"),
        OutputFormat::Text => {
            println!("{} {}", record.kind().to_string().cyan().bold(), args.key.yellow());
            println!("{body}");
        }
    }
    Ok(())
}

fn cmd_migrate(args: MigrateArgs, format: OutputFormat) -> anyhow::Result<()> {
    let report = migrate(&args.source, &args.destination)
        .with_context(|| format!("migration {} -> {} failed", args.source, args.destination))?;
    match format {
        OutputFormat::Json => println!(
            "{}",
            json!({ "copied": report.copied, "skipped": report.skipped })
        ),
        OutputFormat::Text => {
            println!(
                "{} Migrated {} keys from {} to {}",
                "✓".green().bold(),
                report.copied.len().to_string().bold(),
                args.source,
                args.destination
            );
            if !report.skipped.is_empty() {
                println!("  skipped internal: {}", report.skipped.join(", ").dimmed());
            }
        }
    }
    Ok(())
}

fn cmd_flush(args: FlushArgs) -> anyhow::Result<()> {
    if !args.yes {
        bail!("refusing to flush {} without --yes", args.url);
    }
    let store = open_store(&args.url)?;
    store.flush()?;
    println!("{} Flushed {}", "✓".green().bold(), args.url);
    Ok(())
}
