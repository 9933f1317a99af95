//! Command line and configuration file handling.
//!
//! Settings come from a TOML file (explicit `--config`, or `iptv-relay.toml`
//! in the working directory) and from command line flags. Flags take
//! precedence over the file.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;
use thiserror::Error;

use iptv_relay_protocol::{ConfigError, ProxyRule};

use crate::checker::{CheckerConfig, CheckerKind};
use crate::scheduler::ScoringSchedulerConfig;
use crate::source::{ChannelSource, ProxyRules};

/// Configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "iptv-relay.toml";

const DEFAULT_LISTEN: &str = "0.0.0.0:8080";
const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_RETENTION_DAYS: u64 = 7;

/// Start-up configuration errors.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to read config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid listen address: {0}")]
    Listen(String),

    #[error("No channel document configured (set [sources] url or file, or --sources-url / --sources-file)")]
    MissingSource,

    #[error("Both a channel document URL and file are configured; pick one")]
    AmbiguousSource,

    #[error("Invalid proxy rule: {0}")]
    Proxy(#[from] ConfigError),
}

/// iptv-relay - health-scored IPTV source relay
#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Address to listen on [default: 0.0.0.0:8080]
    #[arg(short, long)]
    pub listen: Option<SocketAddr>,

    /// URL of the channel document
    #[arg(short = 'u', long)]
    pub sources_url: Option<String>,

    /// Path of a local channel document
    #[arg(short = 's', long)]
    pub sources_file: Option<PathBuf>,

    /// Timeout for fetching a remote channel document in seconds
    #[arg(long)]
    pub sources_timeout: Option<u64>,

    /// Configuration file path
    #[arg(short = 'f', long)]
    pub config: Option<PathBuf>,

    /// Availability checker implementation
    #[arg(long, value_enum)]
    pub checker: Option<CheckerKind>,

    /// Availability check timeout in seconds
    #[arg(long)]
    pub check_timeout: Option<u64>,

    /// Media prober binary for the ffmpeg checker
    #[arg(long)]
    pub ffmpeg_path: Option<String>,

    /// Seconds between scoring passes
    #[arg(long)]
    pub score_interval: Option<u64>,

    /// Milliseconds between probes of one channel
    #[arg(long)]
    pub probe_delay_ms: Option<u64>,

    /// Disable the periodic scoring pass
    #[arg(long)]
    pub no_scoring: bool,

    /// Upstream timeout for proxied streams in seconds
    #[arg(long)]
    pub forward_timeout: Option<u64>,

    /// Directory where log files are stored
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Number of days to keep log files
    #[arg(long)]
    pub log_retention_days: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Configuration file format.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    #[serde(default)]
    server: ServerSection,
    #[serde(default)]
    sources: SourcesSection,
    #[serde(default)]
    proxy: Vec<ProxySection>,
    #[serde(default)]
    checker: CheckerSection,
    #[serde(default)]
    scoring: ScoringSection,
    #[serde(default)]
    forward: ForwardSection,
    #[serde(default)]
    logging: LoggingSection,
}

#[derive(Debug, Deserialize, Default)]
struct ServerSection {
    listen: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct SourcesSection {
    url: Option<String>,
    file: Option<PathBuf>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ProxySection {
    host: String,
    #[serde(default)]
    headers: Vec<String>,
}

#[derive(Debug, Deserialize, Default)]
struct CheckerSection {
    kind: Option<CheckerKind>,
    timeout_secs: Option<u64>,
    ffmpeg_path: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ScoringSection {
    enabled: Option<bool>,
    interval_secs: Option<u64>,
    probe_delay_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct ForwardSection {
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct LoggingSection {
    log_dir: Option<String>,
    retention_days: Option<u64>,
    level: Option<String>,
}

/// Read and decode a configuration file.
pub fn load_config(path: &Path) -> Result<ConfigFile, SettingsError> {
    let contents = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(toml::from_str(&contents)?)
}

/// Explicit config path, or the default file if it exists.
pub fn config_path(args: &Args) -> Option<PathBuf> {
    args.config.clone().or_else(|| {
        let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
        default_path.exists().then_some(default_path)
    })
}

/// Fully resolved relay settings.
#[derive(Debug)]
pub struct RelayConfig {
    pub listen: SocketAddr,
    pub source: ChannelSource,
    /// Bounds a remote channel document fetch.
    pub source_timeout: Duration,
    pub proxy_rules: ProxyRules,
    pub checker: CheckerConfig,
    pub scoring: ScoringSchedulerConfig,
    pub forward_timeout: Duration,
    pub log_dir: PathBuf,
    pub log_retention_days: u64,
    pub log_level: String,
}

impl RelayConfig {
    /// Merge command line arguments over the file configuration.
    pub fn resolve(args: &Args, file: ConfigFile) -> Result<Self, SettingsError> {
        let listen = match args.listen {
            Some(addr) => addr,
            None => {
                let raw = file.server.listen.as_deref().unwrap_or(DEFAULT_LISTEN);
                raw.parse()
                    .map_err(|_| SettingsError::Listen(raw.to_string()))?
            }
        };

        let source = pick_source(args.sources_url.clone(), args.sources_file.clone())?
            .or(pick_source(file.sources.url, file.sources.file)?)
            .ok_or(SettingsError::MissingSource)?;
        let source_timeout = Duration::from_secs(
            args.sources_timeout
                .or(file.sources.timeout_secs)
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
        );

        let proxy_rules = file
            .proxy
            .iter()
            .map(|p| ProxyRule::parse(&p.host, p.headers.as_slice()))
            .collect::<Result<Vec<_>, _>>()?;

        let checker = CheckerConfig {
            kind: args.checker.or(file.checker.kind).unwrap_or_default(),
            timeout: Duration::from_secs(
                args.check_timeout
                    .or(file.checker.timeout_secs)
                    .unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
            ffmpeg_path: args
                .ffmpeg_path
                .clone()
                .or(file.checker.ffmpeg_path)
                .unwrap_or_else(|| CheckerConfig::default().ffmpeg_path),
        };

        let scoring_defaults = ScoringSchedulerConfig::default();
        let scoring = ScoringSchedulerConfig {
            enabled: !args.no_scoring && file.scoring.enabled.unwrap_or(scoring_defaults.enabled),
            interval_secs: args
                .score_interval
                .or(file.scoring.interval_secs)
                .unwrap_or(scoring_defaults.interval_secs),
            probe_delay_ms: args
                .probe_delay_ms
                .or(file.scoring.probe_delay_ms)
                .unwrap_or(scoring_defaults.probe_delay_ms),
        };

        let forward_timeout = Duration::from_secs(
            args.forward_timeout
                .or(file.forward.timeout_secs)
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
        );

        let log_dir = args
            .log_dir
            .clone()
            .or(file.logging.log_dir.map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR));
        let log_retention_days = args
            .log_retention_days
            .or(file.logging.retention_days)
            .unwrap_or(DEFAULT_RETENTION_DAYS);
        let log_level = if args.verbose {
            "debug".to_string()
        } else {
            file.logging.level.unwrap_or_else(|| "info".to_string())
        };

        Ok(Self {
            listen,
            source,
            source_timeout,
            proxy_rules: ProxyRules::new(proxy_rules),
            checker,
            scoring,
            forward_timeout,
            log_dir,
            log_retention_days,
            log_level,
        })
    }
}

fn pick_source(
    url: Option<String>,
    file: Option<PathBuf>,
) -> Result<Option<ChannelSource>, SettingsError> {
    match (url, file) {
        (Some(_), Some(_)) => Err(SettingsError::AmbiguousSource),
        (Some(url), None) => Ok(Some(ChannelSource::Remote(url))),
        (None, Some(path)) => Ok(Some(ChannelSource::File(path))),
        (None, None) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
[server]
listen = "127.0.0.1:9090"

[sources]
url = "http://config.example/channels.yml"
timeout_secs = 30

[[proxy]]
host = "cdn.example"
headers = ["Referer|https://cdn.example/", "User-Agent|Mozilla/5.0"]

[[proxy]]
host = "other.example:8443"

[checker]
kind = "ffmpeg"
timeout_secs = 5
ffmpeg_path = "/usr/bin/ffmpeg"

[scoring]
enabled = false
interval_secs = 600
probe_delay_ms = 250

[forward]
timeout_secs = 20

[logging]
log_dir = "/var/log/iptv-relay"
retention_days = 3
level = "warn"
"#;

    #[test]
    fn test_full_config_file() {
        let file: ConfigFile = toml::from_str(FULL).unwrap();
        let config = RelayConfig::resolve(&Args::default(), file).unwrap();

        assert_eq!(config.listen, "127.0.0.1:9090".parse::<SocketAddr>().unwrap());
        assert_eq!(
            config.source,
            ChannelSource::Remote("http://config.example/channels.yml".to_string())
        );
        assert_eq!(config.proxy_rules.len(), 2);
        assert_eq!(
            config.proxy_rules.headers_for("http://cdn.example/live.m3u8"),
            &[
                ("Referer".to_string(), "https://cdn.example/".to_string()),
                ("User-Agent".to_string(), "Mozilla/5.0".to_string()),
            ]
        );
        assert!(config.proxy_rules.requires_proxy("https://other.example:8443/x"));
        assert_eq!(config.checker.kind, CheckerKind::Ffmpeg);
        assert_eq!(config.checker.timeout, Duration::from_secs(5));
        assert_eq!(config.checker.ffmpeg_path, "/usr/bin/ffmpeg");
        assert_eq!(
            config.scoring,
            ScoringSchedulerConfig {
                enabled: false,
                interval_secs: 600,
                probe_delay_ms: 250,
            }
        );
        assert_eq!(config.source_timeout, Duration::from_secs(30));
        assert_eq!(config.forward_timeout, Duration::from_secs(20));
        assert_eq!(config.log_dir, PathBuf::from("/var/log/iptv-relay"));
        assert_eq!(config.log_retention_days, 3);
        assert_eq!(config.log_level, "warn");
    }

    #[test]
    fn test_defaults() {
        let file: ConfigFile = toml::from_str("[sources]\nfile = \"channels.yml\"\n").unwrap();
        let config = RelayConfig::resolve(&Args::default(), file).unwrap();

        assert_eq!(config.listen, DEFAULT_LISTEN.parse::<SocketAddr>().unwrap());
        assert_eq!(config.source, ChannelSource::File(PathBuf::from("channels.yml")));
        assert_eq!(config.proxy_rules.len(), 0);
        assert_eq!(config.checker.kind, CheckerKind::Http);
        assert_eq!(config.checker.timeout, Duration::from_secs(10));
        assert_eq!(config.scoring, ScoringSchedulerConfig::default());
        assert_eq!(config.source_timeout, Duration::from_secs(10));
        assert_eq!(config.forward_timeout, Duration::from_secs(10));
        assert_eq!(config.log_dir, PathBuf::from("logs"));
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_command_line_takes_precedence() {
        let file: ConfigFile = toml::from_str(FULL).unwrap();
        let args = Args::parse_from([
            "iptv-relay",
            "--listen",
            "0.0.0.0:7000",
            "--sources-file",
            "local.yml",
            "--checker",
            "http",
            "--score-interval",
            "60",
            "--sources-timeout",
            "3",
            "--forward-timeout",
            "45",
            "--verbose",
        ]);
        let config = RelayConfig::resolve(&args, file).unwrap();

        assert_eq!(config.listen.port(), 7000);
        assert_eq!(config.source, ChannelSource::File(PathBuf::from("local.yml")));
        assert_eq!(config.checker.kind, CheckerKind::Http);
        assert_eq!(config.scoring.interval_secs, 60);
        assert_eq!(config.scoring.probe_delay_ms, 250);
        assert_eq!(config.source_timeout, Duration::from_secs(3));
        assert_eq!(config.forward_timeout, Duration::from_secs(45));
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_invalid_settings() {
        let missing = RelayConfig::resolve(&Args::default(), ConfigFile::default());
        assert!(matches!(missing, Err(SettingsError::MissingSource)));

        let both: ConfigFile = toml::from_str("[sources]\nurl = \"http://a\"\nfile = \"b.yml\"\n").unwrap();
        assert!(matches!(
            RelayConfig::resolve(&Args::default(), both),
            Err(SettingsError::AmbiguousSource)
        ));

        let bad_header: ConfigFile = toml::from_str(
            "[sources]\nfile = \"a.yml\"\n[[proxy]]\nhost = \"cdn.example\"\nheaders = [\"Referer\"]\n",
        )
        .unwrap();
        assert!(matches!(
            RelayConfig::resolve(&Args::default(), bad_header),
            Err(SettingsError::Proxy(ConfigError::InvalidHeader { .. }))
        ));

        let bad_listen: ConfigFile =
            toml::from_str("[server]\nlisten = \"not-an-address\"\n[sources]\nfile = \"a.yml\"\n").unwrap();
        assert!(matches!(
            RelayConfig::resolve(&Args::default(), bad_listen),
            Err(SettingsError::Listen(_))
        ));
    }

    #[test]
    fn test_unknown_checker_kind_is_rejected() {
        assert!(toml::from_str::<ConfigFile>("[checker]\nkind = \"ping\"\n").is_err());
    }

    #[test]
    fn test_load_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("iptv-relay.toml");
        std::fs::write(&path, FULL).unwrap();
        assert!(load_config(&path).is_ok());
        assert!(matches!(
            load_config(&dir.path().join("missing.toml")),
            Err(SettingsError::Io { .. })
        ));
    }
}
