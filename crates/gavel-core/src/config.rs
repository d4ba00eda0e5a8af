use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_AUCTION_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_COLLECTION: &str = "auctions";
/// Environment variable consulted when `auction.interval` is not configured.
pub const AUCTION_INTERVAL_ENV: &str = "AUCTION_INTERVAL";

/// Top-level config (gavel.toml + GAVEL_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GavelConfig {
    #[serde(default)]
    pub auction: AuctionConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

/// Auction lifetime settings.
///
/// Both values are duration strings such as `"20s"`, `"5m"` or `"1h30m"`.
/// They are kept raw here; the closer parses them and falls back to
/// defaults on malformed input.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuctionConfig {
    /// How long an auction stays active. Override with GAVEL_AUCTION_INTERVAL.
    pub interval: Option<String>,
    /// Upper bound on one expiry sweep's store round-trip.
    pub timeout: Option<String>,
}

impl AuctionConfig {
    /// The configured interval, or `AUCTION_INTERVAL` from the environment.
    pub fn interval_setting(&self) -> Option<String> {
        self.interval
            .clone()
            .or_else(|| std::env::var(AUCTION_INTERVAL_ENV).ok())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
    /// Table holding auction rows.
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            collection: default_collection(),
        }
    }
}

fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.gavel/gavel.db", home)
}

fn default_collection() -> String {
    DEFAULT_COLLECTION.to_string()
}

impl GavelConfig {
    /// Load config from a TOML file with GAVEL_* env var overrides.
    ///
    /// Uses the explicit path when given, otherwise ~/.gavel/gavel.toml.
    /// A missing file is not an error; defaults apply.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: GavelConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("GAVEL_").split("_"))
            .extract()
            .map_err(|e| crate::error::GavelError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.gavel/gavel.toml", home)
}
