//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

#[cfg(test)]
mod tests;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "rivista";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_GATEWAY_URL: &str = "http://127.0.0.1:8081/";
const DEFAULT_PLATFORM_DOMAIN: &str = "t.me";
const DEFAULT_CACHE_DIR: &str = "cache";
const DEFAULT_RETENTION_DAYS: u64 = 20;
const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 60;
const DEFAULT_REFETCH_DELAY_MS: u64 = 1000;
const DEFAULT_SIGNING_KEY_FILE: &str = "signing.key";
const DEFAULT_FEED_ITEMS: usize = 50;

/// Command-line arguments for the rivista binary.
#[derive(Debug, Parser)]
#[command(name = "rivista", version, about = "rivista channel mirror server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "RIVISTA_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP service with the background reconciler.
    Serve(Box<ServeArgs>),
    /// Run a single cache reconciliation cycle and exit.
    #[command(name = "reconcile")]
    Reconcile(Box<ServeArgs>),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the platform gateway base URL.
    #[arg(long = "platform-gateway-url", value_name = "URL")]
    pub platform_gateway_url: Option<String>,

    /// Override the platform gateway bearer token.
    #[arg(long = "platform-token", value_name = "TOKEN")]
    pub platform_token: Option<String>,

    /// Override the platform's public web domain.
    #[arg(long = "platform-domain", value_name = "DOMAIN")]
    pub platform_domain: Option<String>,

    /// Override the content cache directory.
    #[arg(long = "cache-directory", value_name = "PATH")]
    pub cache_directory: Option<PathBuf>,

    /// Override the cache retention window in days.
    #[arg(long = "cache-retention-days", value_name = "DAYS")]
    pub cache_retention_days: Option<u64>,

    /// Override the reconciliation cadence in seconds.
    #[arg(long = "cache-reconcile-interval-seconds", value_name = "SECONDS")]
    pub cache_reconcile_interval_seconds: Option<u64>,

    /// Override the inter-download delay in milliseconds.
    #[arg(long = "cache-refetch-delay-ms", value_name = "MILLIS")]
    pub cache_refetch_delay_ms: Option<u64>,

    /// Override the signing key file path.
    #[arg(long = "signing-key-file", value_name = "PATH")]
    pub signing_key_file: Option<PathBuf>,

    /// Toggle digest enforcement on content URLs.
    #[arg(
        long = "signing-enforce",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub signing_enforce: Option<bool>,

    /// Override the default feed item count.
    #[arg(long = "feeds-default-items", value_name = "COUNT")]
    pub feeds_default_items: Option<usize>,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub platform: PlatformSettings,
    pub cache: CacheSettings,
    pub signing: SigningSettings,
    pub render: RenderSettings,
    pub feeds: FeedSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct PlatformSettings {
    pub gateway_url: Url,
    pub token: Option<String>,
    pub domain: String,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub directory: PathBuf,
    pub retention: Duration,
    pub reconcile_interval: Duration,
    pub refetch_delay: Duration,
}

#[derive(Debug, Clone)]
pub struct SigningSettings {
    pub key_file: PathBuf,
    pub enforce: bool,
}

/// Rendering and flag policy knobs; all defaulted, all data-driven.
#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub video_caption_max: usize,
    pub title_text_floor: usize,
    pub title_max_chars: usize,
    pub media_box: u32,
    pub audio_width: u32,
    pub mockery_emoji: Vec<String>,
    pub mockery_min_count: u32,
    pub keywords: KeywordSettings,
}

#[derive(Debug, Clone, Default)]
pub struct KeywordSettings {
    pub stream: Option<Vec<String>>,
    pub donat: Option<Vec<String>>,
    pub advert: Option<Vec<String>>,
    pub paywall: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub default_items: usize,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Parse CLI arguments and load settings in one step.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let cli = CliArgs::parse();
    let settings = load(&cli)?;
    Ok((cli, settings))
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("RIVISTA").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) | Some(Command::Reconcile(args)) => {
            raw.apply_overrides(&args.overrides)
        }
        None => raw.apply_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    platform: RawPlatformSettings,
    cache: RawCacheSettings,
    signing: RawSigningSettings,
    render: RawRenderSettings,
    feeds: RawFeedSettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPlatformSettings {
    gateway_url: Option<String>,
    token: Option<String>,
    domain: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    directory: Option<PathBuf>,
    retention_days: Option<u64>,
    reconcile_interval_seconds: Option<u64>,
    refetch_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSigningSettings {
    key_file: Option<PathBuf>,
    enforce: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRenderSettings {
    video_caption_max: Option<usize>,
    title_text_floor: Option<usize>,
    title_max_chars: Option<usize>,
    media_box: Option<u32>,
    audio_width: Option<u32>,
    mockery_emoji: Option<Vec<String>>,
    mockery_min_count: Option<u32>,
    keywords: RawKeywordSettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawKeywordSettings {
    stream: Option<Vec<String>>,
    donat: Option<Vec<String>>,
    advert: Option<Vec<String>>,
    paywall: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawFeedSettings {
    default_items: Option<usize>,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.platform_gateway_url.as_ref() {
            self.platform.gateway_url = Some(url.clone());
        }
        if let Some(token) = overrides.platform_token.as_ref() {
            self.platform.token = Some(token.clone());
        }
        if let Some(domain) = overrides.platform_domain.as_ref() {
            self.platform.domain = Some(domain.clone());
        }
        if let Some(directory) = overrides.cache_directory.as_ref() {
            self.cache.directory = Some(directory.clone());
        }
        if let Some(days) = overrides.cache_retention_days {
            self.cache.retention_days = Some(days);
        }
        if let Some(seconds) = overrides.cache_reconcile_interval_seconds {
            self.cache.reconcile_interval_seconds = Some(seconds);
        }
        if let Some(millis) = overrides.cache_refetch_delay_ms {
            self.cache.refetch_delay_ms = Some(millis);
        }
        if let Some(path) = overrides.signing_key_file.as_ref() {
            self.signing.key_file = Some(path.clone());
        }
        if let Some(enforce) = overrides.signing_enforce {
            self.signing.enforce = Some(enforce);
        }
        if let Some(count) = overrides.feeds_default_items {
            self.feeds.default_items = Some(count);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            platform,
            cache,
            signing,
            render,
            feeds,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let platform = build_platform_settings(platform)?;
        let cache = build_cache_settings(cache)?;
        let signing = build_signing_settings(signing, &cache)?;
        let render = build_render_settings(render)?;
        let feeds = build_feed_settings(feeds)?;

        Ok(Self {
            server,
            logging,
            platform,
            cache,
            signing,
            render,
            feeds,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = format!("{host}:{port}")
        .parse::<SocketAddr>()
        .map_err(|err| LoadError::invalid("server.addr", err.to_string()))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_platform_settings(platform: RawPlatformSettings) -> Result<PlatformSettings, LoadError> {
    let raw_url = platform
        .gateway_url
        .unwrap_or_else(|| DEFAULT_GATEWAY_URL.to_string());
    let gateway_url = Url::parse(&raw_url)
        .map_err(|err| LoadError::invalid("platform.gateway_url", err.to_string()))?;

    let token = platform.token.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let domain = platform
        .domain
        .unwrap_or_else(|| DEFAULT_PLATFORM_DOMAIN.to_string());
    if domain.trim().is_empty() {
        return Err(LoadError::invalid("platform.domain", "must not be empty"));
    }

    Ok(PlatformSettings {
        gateway_url,
        token,
        domain,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let directory = cache
        .directory
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR));

    let retention_days = cache.retention_days.unwrap_or(DEFAULT_RETENTION_DAYS);
    if retention_days == 0 {
        return Err(LoadError::invalid(
            "cache.retention_days",
            "must be greater than zero",
        ));
    }

    let interval_secs = cache
        .reconcile_interval_seconds
        .unwrap_or(DEFAULT_RECONCILE_INTERVAL_SECS);
    if interval_secs == 0 {
        return Err(LoadError::invalid(
            "cache.reconcile_interval_seconds",
            "must be greater than zero",
        ));
    }

    Ok(CacheSettings {
        directory,
        retention: Duration::from_secs(retention_days * 24 * 60 * 60),
        reconcile_interval: Duration::from_secs(interval_secs),
        refetch_delay: Duration::from_millis(
            cache.refetch_delay_ms.unwrap_or(DEFAULT_REFETCH_DELAY_MS),
        ),
    })
}

fn build_signing_settings(
    signing: RawSigningSettings,
    cache: &CacheSettings,
) -> Result<SigningSettings, LoadError> {
    let key_file = signing
        .key_file
        .unwrap_or_else(|| cache.directory.join(DEFAULT_SIGNING_KEY_FILE));
    Ok(SigningSettings {
        key_file,
        enforce: signing.enforce.unwrap_or(true),
    })
}

fn build_render_settings(render: RawRenderSettings) -> Result<RenderSettings, LoadError> {
    let title_text_floor = render.title_text_floor.unwrap_or(10);
    let title_max_chars = render.title_max_chars.unwrap_or(51);
    if title_max_chars < title_text_floor {
        return Err(LoadError::invalid(
            "render.title_max_chars",
            "must not be smaller than render.title_text_floor",
        ));
    }

    Ok(RenderSettings {
        video_caption_max: render.video_caption_max.unwrap_or(200),
        title_text_floor,
        title_max_chars,
        media_box: render.media_box.unwrap_or(600),
        audio_width: render.audio_width.unwrap_or(400),
        mockery_emoji: render
            .mockery_emoji
            .unwrap_or_else(|| vec!["🤡".to_string(), "💩".to_string()]),
        mockery_min_count: render.mockery_min_count.unwrap_or(10),
        keywords: KeywordSettings {
            stream: render.keywords.stream,
            donat: render.keywords.donat,
            advert: render.keywords.advert,
            paywall: render.keywords.paywall,
        },
    })
}

fn build_feed_settings(feeds: RawFeedSettings) -> Result<FeedSettings, LoadError> {
    let default_items = feeds.default_items.unwrap_or(DEFAULT_FEED_ITEMS);
    if default_items == 0 {
        return Err(LoadError::invalid(
            "feeds.default_items",
            "must be greater than zero",
        ));
    }
    Ok(FeedSettings { default_items })
}
