use std::path::PathBuf;

use clap::{Args, Parser, builder::BoolishValueParser};

/// Command-line arguments for the backrest binary.
#[derive(Debug, Parser)]
#[command(
    name = "backrest",
    version,
    about = "Response caching front for a repository REST service"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "BACKREST_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

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

    /// Enable the response cache with a `[maxEntries]:[magnitude][unit]` policy.
    #[arg(long = "cache-policy", env = "BACKREST_CACHE", value_name = "POLICY")]
    pub cache_policy: Option<String>,

    /// Largest response body, in bytes, that is written to the cache.
    #[arg(long = "cache-max-body-bytes", value_name = "BYTES")]
    pub cache_max_body_bytes: Option<u64>,

    /// Use the Redis store at this host instead of the in-process store.
    #[arg(long = "redis-host", env = "BACKREST_REDIS_HOST", value_name = "HOST")]
    pub redis_host: Option<String>,

    /// Override the Redis connection pool size.
    #[arg(long = "redis-pool-size", value_name = "COUNT")]
    pub redis_pool_size: Option<u64>,

    /// Override how long a cache operation waits for a pooled connection.
    #[arg(long = "redis-wait-timeout-ms", value_name = "MILLIS")]
    pub redis_wait_timeout_ms: Option<u64>,

    /// Base URL of the repository service that uncached requests are forwarded to.
    #[arg(long = "origin-url", value_name = "URL")]
    pub origin_url: Option<String>,

    /// Override the origin request timeout.
    #[arg(long = "origin-timeout-seconds", value_name = "SECONDS")]
    pub origin_timeout_seconds: Option<u64>,
}
