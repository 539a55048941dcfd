//! Application configuration loaded from environment variables.

const DEFAULT_OUT_OF_STOCK_ADDRESS: &str = "stock@made.com";

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `DATABASE_URL` — PostgreSQL connection string; alternatively `DB_HOST`
///   together with `DB_USER`, `DB_PASSWORD`, `DB_PORT` (default `5432`) and
///   `DB_DATABASE`. Without either the in-memory store is used.
/// - `OUT_OF_STOCK_ADDRESS` — recipient of out-of-stock notifications
///   (default: `"stock@made.com"`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub out_of_stock_address: String,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`, falling back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: lookup("DATABASE_URL").or_else(|| postgres_uri(&lookup)),
            out_of_stock_address: lookup("OUT_OF_STOCK_ADDRESS")
                .unwrap_or(defaults.out_of_stock_address),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Assembles a connection string from the `DB_*` variables when `DB_HOST` is set.
fn postgres_uri(lookup: &impl Fn(&str) -> Option<String>) -> Option<String> {
    let host = lookup("DB_HOST")?;
    let user = lookup("DB_USER").unwrap_or_else(|| "postgres".to_string());
    let password = lookup("DB_PASSWORD").unwrap_or_default();
    let port = lookup("DB_PORT").unwrap_or_else(|| "5432".to_string());
    let database = lookup("DB_DATABASE").unwrap_or_else(|| "postgres".to_string());
    Some(format!(
        "postgres://{user}:{password}@{host}:{port}/{database}"
    ))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            out_of_stock_address: DEFAULT_OUT_OF_STOCK_ADDRESS.to_string(),
        }
    }
}
