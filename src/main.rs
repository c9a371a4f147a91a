//! CLI entry point for nfe-downloader.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use nfe_core::{NfeService, ServiceError};
use serde_json::{Value, json};
use tracing::debug;

mod app;
mod app_config;
mod cli;

use app::{command_dispatcher, terminal};
use app_config::CliOverrides;
use cli::Args;

/// Process outcome mapped to an exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessExit {
    Success,
    Partial,
    Failure,
}

impl From<ProcessExit> for ExitCode {
    fn from(exit: ProcessExit) -> Self {
        match exit {
            ProcessExit::Success => ExitCode::SUCCESS,
            ProcessExit::Failure => ExitCode::from(1),
            ProcessExit::Partial => ExitCode::from(2),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();
    terminal::init_tracing(terminal::default_log_level(args.quiet, args.verbose));
    debug!(?args, "CLI arguments parsed");

    let (value, exit) = match run(&args).await {
        Ok(result) => result,
        Err(error) => (error_json(&error), ProcessExit::Failure),
    };
    print_json(&value);
    exit.into()
}

async fn run(args: &Args) -> Result<(Value, ProcessExit)> {
    let loaded = app_config::load_file_config(args.config.as_deref())?;
    if let Some(path) = loaded.path.as_deref()
        && loaded.config.is_some()
    {
        debug!(path = %path.display(), "config file loaded");
    }
    let overrides = CliOverrides {
        data_dir: args.data_dir.clone(),
        resolver_host: args.resolver_host.clone(),
        resolver_port: args.resolver_port,
    };
    let config = app_config::build_service_config(&loaded, |name| std::env::var(name).ok(), &overrides)?;
    debug!(?config, "service config resolved");

    let service = NfeService::open(config).context("Failed to start the NF-e service")?;
    command_dispatcher::dispatch(&service, &args.command, args.quiet).await
}

/// `{error, kind}` for a failed command.
fn error_json(error: &anyhow::Error) -> Value {
    let kind = error
        .chain()
        .find_map(|cause| cause.downcast_ref::<ServiceError>())
        .map_or("error", ServiceError::kind);
    json!({ "error": format!("{error:#}"), "kind": kind })
}

fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(error) => eprintln!("failed to encode result: {error}"),
    }
}
