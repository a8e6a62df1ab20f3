//! Server configuration, loaded from environment variables at startup.

/// Runtime configuration for inkstream-server.
///
/// Every field has a sensible default so the server works out-of-the-box
/// without any environment variables set.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP address to bind (default: `"0.0.0.0:3000"`).
    pub bind_address: String,

    /// SQLite (or other) database URL (default: `"sqlite://inkstream.db?mode=rwc"`).
    ///
    /// The path in a `sqlite://` URL is relative to the **current working
    /// directory** of the server process at startup. For predictable
    /// behaviour in production, use an absolute path.
    pub database_url: String,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,

    /// Number of executor handles in the pool. Fixed for the lifetime of
    /// the process.
    pub executor_pool_capacity: usize,

    /// When `true`, serve the Swagger UI at `/swagger-ui` and the OpenAPI
    /// spec at `/api-docs/openapi.json`.
    pub enable_swagger: bool,

    /// Comma-separated list of allowed CORS origins. When `None` (default),
    /// all origins are allowed.
    pub cors_allowed_origins: Option<String>,

    /// Images resolved larger than this are spooled to a temporary file on
    /// disk rather than held in memory for the lifetime of the task.
    pub bitmap_spool_threshold_bytes: usize,
}

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            bind_address: env_or("INKSTREAM_BIND", "0.0.0.0:3000"),
            database_url: env_or("INKSTREAM_DATABASE_URL", "sqlite://inkstream.db?mode=rwc"),
            log_level: env_or("INKSTREAM_LOG", "info"),
            log_json: std::env::var("INKSTREAM_LOG_JSON")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            executor_pool_capacity: parse_env("INKSTREAM_EXECUTOR_POOL_CAPACITY", 4),
            enable_swagger: std::env::var("INKSTREAM_ENABLE_SWAGGER")
                .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
                .unwrap_or(true),
            cors_allowed_origins: std::env::var("INKSTREAM_CORS_ORIGINS").ok(),
            bitmap_spool_threshold_bytes: parse_env("INKSTREAM_BITMAP_SPOOL_THRESHOLD_BYTES", 8 * 1024 * 1024),
        }
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
