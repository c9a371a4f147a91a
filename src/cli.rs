//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

/// Resolve, cache and download NF-e fiscal documents by access key.
///
/// Every subcommand prints its result as JSON on stdout. Logs go to stderr.
#[derive(Parser, Debug)]
#[command(name = "nfe-downloader")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (default: $XDG_CONFIG_HOME/nfe-downloader/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Directory holding the key registry and cache files
    #[arg(short = 'd', long, global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Resolver service host
    #[arg(long, global = true, value_name = "HOST")]
    pub resolver_host: Option<String>,

    /// Resolver service port (1-65535)
    #[arg(long, global = true, value_name = "PORT", value_parser = clap::value_parser!(u16).range(1..))]
    pub resolver_port: Option<u16>,

    #[command(subcommand)]
    pub command: Command,
}

/// Front-end operations.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Resolve a key to its document URL (cache first)
    ResolveUrl(TokenArgs),

    /// Resolve and download a key's document
    Download(DownloadArgs),

    /// List registered keys
    #[command(alias = "ls")]
    ListKeys,

    /// Register one key
    AddKey {
        /// 44-digit access key
        key: String,
    },

    /// Register several keys at once
    #[command(name = "add-keys-bulk", alias = "add-keys")]
    AddKeysBulk {
        /// Access keys
        #[arg(required = true, num_args = 1..)]
        keys: Vec<String>,
    },

    /// Register every 44-digit key found in a text file (or stdin)
    ImportKeys {
        /// Text file to scan; reads stdin when omitted
        file: Option<PathBuf>,
    },

    /// Remove a key and its cached URL
    #[command(alias = "rm")]
    RemoveKey {
        /// 44-digit access key
        key: String,
    },

    /// Remove every registered key and cached URL
    ClearKeys,

    /// Show every processing status entry
    #[command(name = "get-status-all", alias = "status")]
    GetStatusAll,

    /// Set a key's processing status
    SetStatus {
        /// 44-digit access key
        key: String,
        /// processing, retry, error, completed or done
        status: String,
        /// Free-form status message
        #[arg(short, long, default_value = "")]
        message: String,
    },

    /// Show every cached URL
    #[command(name = "get-url-cache", alias = "url-cache")]
    GetUrlCache,

    /// Empty the resolved-URL cache
    ClearUrlCache,

    /// Empty the processing-status cache
    ClearStatusCache,

    /// Show everything known about a key
    #[command(name = "get-details", alias = "details")]
    GetDetails {
        /// 44-digit access key
        key: String,
    },

    /// Seed the URL cache from a JSON object of key to URL
    SeedUrlCache {
        /// JSON file; reads stdin when omitted
        file: Option<PathBuf>,
    },

    /// Resolve and download every registered key
    RunBatch {
        /// Hide the progress bar
        #[arg(long)]
        no_progress: bool,
    },
}

/// Key plus optional captcha token.
#[derive(ClapArgs, Debug, Clone, PartialEq, Eq)]
pub struct TokenArgs {
    /// 44-digit access key
    pub key: String,

    /// Captcha token forwarded to the resolver service
    #[arg(short, long)]
    pub token: Option<String>,
}

/// Arguments of the `download` subcommand.
#[derive(ClapArgs, Debug, Clone, PartialEq, Eq)]
pub struct DownloadArgs {
    #[command(flatten)]
    pub target: TokenArgs,

    /// Copy the document to this path as well
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,
}
