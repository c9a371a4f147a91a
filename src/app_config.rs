//! Application configuration: config file, environment, then CLI flags.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use nfe_core::{RetryPolicy, ServiceConfig};

/// Environment variable overriding the resolver host.
pub const API_HOST_ENV: &str = "API_HOST";
/// Environment variable overriding the resolver port.
pub const API_PORT_ENV: &str = "API_PORT";

/// Values read from `config.toml`. Unset keys keep the built-in defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    /// Directory holding `nfe_keys.txt` and the cache files.
    pub data_dir: Option<PathBuf>,
    /// Download directory, relative to `data_dir` unless absolute.
    pub download_dir: Option<PathBuf>,
    /// Failure report directory, relative to `data_dir` unless absolute.
    pub report_dir: Option<PathBuf>,
    /// Resolver service host.
    pub resolver_host: Option<String>,
    /// Resolver service port.
    pub resolver_port: Option<u16>,
    /// Attempts per interactive download.
    pub interactive_max_attempts: Option<u32>,
    /// Seconds between interactive attempts.
    pub interactive_retry_delay_secs: Option<u64>,
    /// Attempts per key in batch runs.
    pub batch_max_attempts: Option<u32>,
    /// Seconds between batch attempts.
    pub batch_retry_delay_secs: Option<u64>,
    /// Document download timeout.
    pub download_timeout_secs: Option<u64>,
    /// Resolver request timeout.
    pub resolver_timeout_secs: Option<u64>,
    /// Age after which cached URLs are ignored. Unset means never.
    pub url_cache_ttl_secs: Option<u64>,
}

impl FileConfig {
    /// Validates config values against runtime constraints.
    pub fn validate(&self) -> Result<()> {
        if let Some(host) = &self.resolver_host
            && host.trim().is_empty()
        {
            bail!("Invalid config value for `resolver_host`: must not be empty");
        }
        if self.resolver_port == Some(0) {
            bail!("Invalid config value for `resolver_port`: 0. Expected range: 1..=65535");
        }
        validate_range("interactive_max_attempts", self.interactive_max_attempts.map(u64::from), 1, 20)?;
        validate_range("batch_max_attempts", self.batch_max_attempts.map(u64::from), 1, 20)?;
        validate_range("interactive_retry_delay_secs", self.interactive_retry_delay_secs, 0, 600)?;
        validate_range("batch_retry_delay_secs", self.batch_retry_delay_secs, 0, 600)?;
        validate_range("download_timeout_secs", self.download_timeout_secs, 1, 3600)?;
        validate_range("resolver_timeout_secs", self.resolver_timeout_secs, 1, 3600)?;
        validate_range("url_cache_ttl_secs", self.url_cache_ttl_secs, 1, u64::MAX)?;
        Ok(())
    }

    /// Overlays the set values onto `config`.
    pub fn apply(&self, config: &mut ServiceConfig) {
        if let Some(data_dir) = &self.data_dir {
            config.data_dir.clone_from(data_dir);
        }
        if let Some(download_dir) = &self.download_dir {
            config.download_dir.clone_from(download_dir);
        }
        if let Some(report_dir) = &self.report_dir {
            config.report_dir.clone_from(report_dir);
        }
        if let Some(host) = &self.resolver_host {
            config.resolver_host.clone_from(host);
        }
        if let Some(port) = self.resolver_port {
            config.resolver_port = port;
        }
        config.interactive_policy = RetryPolicy::new(
            self.interactive_max_attempts
                .unwrap_or(config.interactive_policy.max_attempts()),
            self.interactive_retry_delay_secs
                .map_or(config.interactive_policy.delay(), Duration::from_secs),
        );
        config.batch_policy = RetryPolicy::new(
            self.batch_max_attempts
                .unwrap_or(config.batch_policy.max_attempts()),
            self.batch_retry_delay_secs
                .map_or(config.batch_policy.delay(), Duration::from_secs),
        );
        if let Some(secs) = self.download_timeout_secs {
            config.download_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.resolver_timeout_secs {
            config.resolver_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.url_cache_ttl_secs {
            config.url_cache_ttl = Some(Duration::from_secs(secs));
        }
    }
}

fn validate_range(field: &str, value: Option<u64>, min: u64, max: u64) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(min..=max).contains(&value) {
        if max == u64::MAX {
            bail!("Invalid config value for `{field}`: {value}. Expected at least {min}");
        }
        bail!("Invalid config value for `{field}`: {value}. Expected range: {min}..={max}");
    }
    Ok(())
}

/// Loaded config metadata.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Config path that was considered.
    pub path: Option<PathBuf>,
    /// Parsed file config when the file exists.
    pub config: Option<FileConfig>,
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/nfe-downloader/config.toml`
/// 2. `$HOME/.config/nfe-downloader/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("nfe-downloader")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("nfe-downloader")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads the config file.
///
/// An explicit path must exist; the default path is optional.
pub fn load_file_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    if let Some(path) = explicit {
        let config = read_config_file(path)?;
        return Ok(LoadedConfig {
            path: Some(path.to_path_buf()),
            config: Some(config),
        });
    }

    let path = resolve_default_config_path();
    let config = match path.as_deref() {
        Some(path_ref) if path_ref.exists() => Some(read_config_file(path_ref)?),
        _ => None,
    };
    Ok(LoadedConfig { path, config })
}

fn read_config_file(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

/// Applies `API_HOST` / `API_PORT` from `lookup` onto `config`.
pub fn apply_env_overrides(
    config: &mut ServiceConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    if let Some(host) = lookup(API_HOST_ENV).filter(|h| !h.trim().is_empty()) {
        config.resolver_host = host.trim().to_string();
    }
    if let Some(port) = lookup(API_PORT_ENV).filter(|p| !p.trim().is_empty()) {
        config.resolver_port = parse_port(&port)
            .with_context(|| format!("Invalid {API_PORT_ENV} environment value '{port}'"))?;
    }
    Ok(())
}

/// Settings given on the command line; these win over every other source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliOverrides {
    pub data_dir: Option<PathBuf>,
    pub resolver_host: Option<String>,
    pub resolver_port: Option<u16>,
}

/// Merges defaults, the config file, the environment and CLI flags.
pub fn build_service_config(
    loaded: &LoadedConfig,
    lookup: impl Fn(&str) -> Option<String>,
    cli: &CliOverrides,
) -> Result<ServiceConfig> {
    let mut config = ServiceConfig::default();
    if let Some(file) = &loaded.config {
        file.apply(&mut config);
    }
    apply_env_overrides(&mut config, lookup)?;
    if let Some(data_dir) = &cli.data_dir {
        config.data_dir.clone_from(data_dir);
    }
    if let Some(host) = &cli.resolver_host {
        config.resolver_host.clone_from(host);
    }
    if let Some(port) = cli.resolver_port {
        config.resolver_port = port;
    }
    Ok(config)
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }
        let line_no = line_index + 1;

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!("Invalid config syntax on line {line_no}: expected key = value");
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let invalid = || format!("Invalid `{key}` value on line {line_no}");

        match key {
            "data_dir" => {
                cfg.data_dir = Some(PathBuf::from(parse_string_literal(value).with_context(invalid)?));
            }
            "download_dir" => {
                cfg.download_dir = Some(PathBuf::from(parse_string_literal(value).with_context(invalid)?));
            }
            "report_dir" => {
                cfg.report_dir = Some(PathBuf::from(parse_string_literal(value).with_context(invalid)?));
            }
            "resolver_host" => {
                cfg.resolver_host = Some(parse_string_literal(value).with_context(invalid)?);
            }
            "resolver_port" => {
                cfg.resolver_port = Some(parse_port(value).with_context(invalid)?);
            }
            "interactive_max_attempts" => {
                cfg.interactive_max_attempts = Some(parse_integer_u32(value).with_context(invalid)?);
            }
            "interactive_retry_delay_secs" => {
                cfg.interactive_retry_delay_secs = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "batch_max_attempts" => {
                cfg.batch_max_attempts = Some(parse_integer_u32(value).with_context(invalid)?);
            }
            "batch_retry_delay_secs" => {
                cfg.batch_retry_delay_secs = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "download_timeout_secs" => {
                cfg.download_timeout_secs = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "resolver_timeout_secs" => {
                cfg.resolver_timeout_secs = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "url_cache_ttl_secs" => {
                cfg.url_cache_ttl_secs = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            unknown => {
                bail!("Unknown configuration key: '{unknown}' on line {line_no}");
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u64"))
}

fn parse_integer_u32(raw_value: &str) -> Result<u32> {
    let value = parse_integer_u64(raw_value)?;
    u32::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u32"))
}

fn parse_port(raw_value: &str) -> Result<u16> {
    let value = parse_integer_u64(raw_value)?;
    match u16::try_from(value) {
        Ok(0) | Err(_) => bail!("Expected port in range 1..=65535"),
        Ok(port) => Ok(port),
    }
}
