//! CLI command routing: runs one subcommand against the service and returns its JSON result.

use std::collections::BTreeMap;
use std::io::{self, IsTerminal, Read};
use std::path::Path;

use anyhow::{Context, Result, bail};
use nfe_core::NfeService;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use crate::ProcessExit;
use crate::app::exit_handler::determine_exit_outcome;
use crate::app::progress_manager::BatchProgress;
use crate::app::terminal;
use crate::cli::{Command, DownloadArgs};

/// Seed input: `[{"key": .., "url": ..}, ..]` or `{"<key>": "<url>", ..}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SeedInput {
    Pairs(Vec<SeedPair>),
    Map(BTreeMap<String, String>),
}

#[derive(Debug, Deserialize)]
struct SeedPair {
    key: String,
    url: String,
}

impl SeedInput {
    fn into_pairs(self) -> Vec<(String, String)> {
        match self {
            Self::Pairs(pairs) => pairs.into_iter().map(|p| (p.key, p.url)).collect(),
            Self::Map(map) => map.into_iter().collect(),
        }
    }
}

/// Runs `command` and returns the JSON to print plus the exit outcome.
pub(crate) async fn dispatch(
    service: &NfeService,
    command: &Command,
    quiet: bool,
) -> Result<(Value, ProcessExit)> {
    let value = match command {
        Command::ResolveUrl(target) => {
            let resolution = service
                .resolve_url(&target.key, target.token.as_deref())
                .await?;
            serde_json::to_value(resolution)?
        }
        Command::Download(args) => run_download(service, args).await?,
        Command::ListKeys => {
            let keys = service.list_keys();
            json!({ "count": keys.len(), "keys": keys })
        }
        Command::AddKey { key } => serde_json::to_value(service.add_key(key)?)?,
        Command::AddKeysBulk { keys } => serde_json::to_value(service.add_keys_bulk(keys))?,
        Command::ImportKeys { file } => {
            let text = read_input(file.as_deref())?;
            serde_json::to_value(service.import_keys(&text))?
        }
        Command::RemoveKey { key } => {
            service.remove_key(key)?;
            json!({ "removed": key })
        }
        Command::ClearKeys => json!({ "removed_count": service.clear_keys() }),
        Command::GetStatusAll => serde_json::to_value(service.get_status_all())?,
        Command::SetStatus {
            key,
            status,
            message,
        } => {
            let change = service.set_status(key, status, message)?;
            json!({ "key": key, "change": change })
        }
        Command::GetUrlCache => serde_json::to_value(service.get_url_cache())?,
        Command::ClearUrlCache => json!({ "removed_count": service.clear_url_cache() }),
        Command::ClearStatusCache => json!({ "removed_count": service.clear_status_cache() }),
        Command::GetDetails { key } => serde_json::to_value(service.get_details(key)?)?,
        Command::SeedUrlCache { file } => {
            let raw = read_input(file.as_deref())?;
            let input: SeedInput = serde_json::from_str(&raw)
                .context("Seed input must be a JSON array of {key, url} objects or a key-to-URL object")?;
            serde_json::to_value(service.seed_url_cache(input.into_pairs()))?
        }
        Command::RunBatch { no_progress } => {
            let total = service.list_keys().len();
            let mut progress = BatchProgress::new(terminal::progress_enabled(quiet, *no_progress), total);
            let report = service
                .run_batch_with_progress(|key| progress.record(&key))
                .await;
            progress.finish();
            let exit = determine_exit_outcome(report.successful_count, report.failed_count());
            return Ok((serde_json::to_value(report)?, exit));
        }
    };
    Ok((value, ProcessExit::Success))
}

async fn run_download(service: &NfeService, args: &DownloadArgs) -> Result<Value> {
    let document = service
        .download(&args.target.key, args.target.token.as_deref())
        .await?;

    let mut value = serde_json::to_value(&document)?;
    value["size"] = json!(document.content.len());
    if let Some(output) = &args.output {
        tokio::fs::write(output, &document.content)
            .await
            .with_context(|| format!("Failed to write '{}'", output.display()))?;
        info!(path = %output.display(), "document copied");
        value["output"] = json!(output);
    }
    Ok(value)
}

/// Reads `file`, or stdin when no file is given.
fn read_input(file: Option<&Path>) -> Result<String> {
    if let Some(path) = file {
        return std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read '{}'", path.display()));
    }
    if io::stdin().is_terminal() {
        bail!("No input provided\n  Suggestion: Pass a file path or pipe the content via stdin");
    }
    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .context("Failed to read stdin")?;
    Ok(buffer)
}
