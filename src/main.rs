// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Tether - runtime module resolver and asynchronous resource loader
//!
//! This is the main entry point for the tether CLI/REPL.
//!
//! ## Features
//!
//! - Resolve module identifiers against a directory or a web root
//! - Declare modules and packages up front with a JSON manifest
//! - Inspect identifier normalization
//! - Interactive REPL over a live loader

mod manifest;
mod repl;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use owo_colors::OwoColorize;
use tether_core::{Loader, LoaderConfig, ModuleValue, ResourceFetcher};
use tether_fetch::{FsFetcher, HttpFetcher};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use manifest::Manifest;

/// Tether - resolve module graphs and load their resources
#[derive(Parser, Debug)]
#[command(name = "tether")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Require modules and print their values
    #[command(alias = "r")]
    Resolve(ResolveArgs),

    /// Show how identifiers normalize
    #[command(alias = "n")]
    Normalize(NormalizeArgs),

    /// Start an interactive shell
    Repl(LoaderArgs),
}

/// Options shared by every command that builds a loader
#[derive(Args, Debug, Default, Clone)]
struct LoaderArgs {
    /// Serve resources from this directory instead of over HTTP
    #[arg(long)]
    root: Option<PathBuf>,

    /// Base URL relative resource URLs are joined onto
    #[arg(long, env = "TETHER_BASE_URL")]
    base_url: Option<String>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// JSON manifest of modules and packages to declare
    #[arg(short, long)]
    manifest: Option<PathBuf>,

    /// Fetch package bundles before their members
    #[arg(long)]
    bundle: bool,

    /// Prefix substitution, e.g. APP=/app/
    #[arg(short, long = "prefix", value_parser = parse_prefix)]
    prefixes: Vec<(String, String)>,
}

#[derive(Args, Debug)]
struct ResolveArgs {
    #[command(flatten)]
    loader: LoaderArgs,

    /// How long to wait for the graph to settle
    #[arg(short, long, default_value_t = 5000)]
    wait_ms: u64,

    /// Print the full report even when everything resolved
    #[arg(long)]
    report: bool,

    /// Module identifiers to require
    #[arg(required = true)]
    ids: Vec<String>,
}

#[derive(Args, Debug)]
struct NormalizeArgs {
    #[command(flatten)]
    loader: LoaderArgs,

    /// Identifiers to normalize
    #[arg(required = true)]
    ids: Vec<String>,
}

fn parse_prefix(raw: &str) -> std::result::Result<(String, String), String> {
    raw.split_once('=')
        .map(|(name, value)| (name.trim().to_string(), value.to_string()))
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", raw))
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("{}: failed to start runtime: {}", "Error".red().bold(), e);
            return ExitCode::FAILURE;
        }
    };
    // Loaders capture the runtime they are built in
    let _guard = runtime.enter();

    let result = match cli.command {
        Some(Commands::Resolve(args)) => runtime.block_on(run_resolve(args)).map(exit_code),
        Some(Commands::Normalize(args)) => run_normalize(&args).map(exit_code),
        Some(Commands::Repl(args)) => run_repl(&args, &runtime),
        None => run_repl(&LoaderArgs::default(), &runtime),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}: {:#}", "Error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Build a loader from command line options
fn build_loader(args: &LoaderArgs) -> Result<Loader> {
    let mut config = match &args.config {
        Some(path) => LoaderConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => {
            let mut config = LoaderConfig::default();
            config.load_from_env();
            config
        }
    };
    if let Some(base_url) = &args.base_url {
        config.base_url = base_url.clone();
    }
    if args.bundle {
        config.bundle_packages = true;
    }
    config.prefixes.extend(args.prefixes.iter().cloned());

    let fetcher: Arc<dyn ResourceFetcher> = match &args.root {
        Some(root) => Arc::new(FsFetcher::new(root)),
        None => Arc::new(HttpFetcher::new(&config)?),
    };
    let loader = Loader::with_config(config, fetcher);

    if let Some(path) = &args.manifest {
        Manifest::from_file(path)?.apply(&loader)?;
    }
    Ok(loader)
}

/// Require the ids and print what they resolve to; `false` if the graph did not settle
async fn run_resolve(args: ResolveArgs) -> Result<bool> {
    let loader = build_loader(&args.loader)?;
    let future = loader.require(args.ids.clone())?;

    let outcome = tokio::time::timeout(Duration::from_millis(args.wait_ms), future).await;
    let resolved = match outcome {
        Ok(Ok(ModuleValue::List(values))) => {
            for (id, value) in args.ids.iter().zip(values.iter()) {
                println!("{} {}", id.cyan().bold(), repl::format_value(value));
            }
            true
        }
        Ok(Ok(value)) => {
            println!("{}", repl::format_value(&value));
            true
        }
        Ok(Err(e)) => {
            eprintln!("{}: {}", "Load failed".red().bold(), e);
            false
        }
        Err(_) => {
            eprintln!(
                "{}: not settled after {}ms",
                "Timed out".yellow().bold(),
                args.wait_ms
            );
            false
        }
    };

    if !resolved || args.report {
        println!();
        print!("{}", loader.report());
    }

    Ok(resolved)
}

fn run_normalize(args: &NormalizeArgs) -> Result<bool> {
    let loader = build_loader(&args.loader)?;
    let mut success = true;

    for raw in &args.ids {
        match loader.normalize(raw) {
            Ok(id) => println!(
                "{:10} {} {}",
                id.kind.to_string().magenta(),
                id.canonical.as_str().cyan().bold(),
                id.url.dimmed()
            ),
            Err(e) => {
                eprintln!("{}: {}", "Error".red().bold(), e);
                success = false;
            }
        }
    }
    Ok(success)
}

/// Start the interactive REPL
fn run_repl(args: &LoaderArgs, runtime: &tokio::runtime::Runtime) -> Result<ExitCode> {
    let loader = build_loader(args)?;
    let mut repl = repl::Repl::new(loader, runtime.handle().clone())
        .context("Failed to initialize REPL")?;
    repl.run().context("REPL error")?;
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_prefix() {
        assert_eq!(
            parse_prefix("APP=/app/"),
            Ok(("APP".to_string(), "/app/".to_string()))
        );
        assert_eq!(parse_prefix("EMPTY="), Ok(("EMPTY".to_string(), String::new())));
        assert!(parse_prefix("APP").is_err());
        assert!(parse_prefix("=/app/").is_err());
    }

    #[test]
    fn test_cli_parses_resolve() {
        let cli = Cli::try_parse_from([
            "tether", "-vv", "resolve", "--root", "web", "-p", "APP=/app/", "--wait-ms", "50",
            "{APP}main", "css!theme",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Some(Commands::Resolve(args)) = cli.command else {
            panic!("expected resolve");
        };
        assert_eq!(args.loader.root, Some(PathBuf::from("web")));
        assert_eq!(args.loader.prefixes, vec![("APP".to_string(), "/app/".to_string())]);
        assert_eq!(args.wait_ms, 50);
        assert_eq!(args.ids, vec!["{APP}main", "css!theme"]);
    }

    #[tokio::test]
    async fn test_resolve_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hello.txt"), "hi").unwrap();

        let args = ResolveArgs {
            loader: LoaderArgs {
                root: Some(dir.path().to_path_buf()),
                ..LoaderArgs::default()
            },
            wait_ms: 2000,
            report: false,
            ids: vec!["text!hello.txt".to_string()],
        };
        assert!(run_resolve(args).await.unwrap());
    }

    #[tokio::test]
    async fn test_resolve_times_out_on_missing_resource() {
        let dir = tempfile::tempdir().unwrap();
        let args = ResolveArgs {
            loader: LoaderArgs {
                root: Some(dir.path().to_path_buf()),
                ..LoaderArgs::default()
            },
            wait_ms: 100,
            report: false,
            ids: vec!["missing".to_string()],
        };
        assert!(!run_resolve(args).await.unwrap());
    }
}
