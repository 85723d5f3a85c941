use crate::domain::{CharacterId, Decimal};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub esi_api_url: String,
    pub sso_api_url: String,
    pub sso_client_id: String,
    pub sso_client_secret: String,
    /// Character whose incoming donations count toward good standing.
    pub standings_character: CharacterId,
    /// Fraction of trailing-window receipts that must be passed along.
    pub standing_ratio: Decimal,
    pub poll_interval_secs: u64,
    /// A participant is polled again once this much time has passed.
    pub staleness_secs: i64,
    /// Participants processed per scheduler pass.
    pub batch_size: i64,
    pub retention_days: i64,
    /// Run the pruning sweep every N scheduler passes.
    pub prune_every: u64,
    /// Lower bound on the market price refresh interval.
    pub price_floor_secs: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

fn parse_var<T: std::str::FromStr>(
    env_map: &HashMap<String, String>,
    key: &str,
    default: &str,
    expect: &str,
) -> Result<T, ConfigError> {
    env_map
        .get(key)
        .map(|s| s.as_str())
        .unwrap_or(default)
        .parse::<T>()
        .map_err(|_| ConfigError::InvalidValue(key.to_string(), expect.to_string()))
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let esi_api_url = env_map
            .get("ESI_API_URL")
            .cloned()
            .unwrap_or_else(|| "https://esi.evetech.net/latest".to_string());

        let sso_api_url = env_map
            .get("SSO_API_URL")
            .cloned()
            .unwrap_or_else(|| "https://login.eveonline.com".to_string());

        let sso_client_id = env_map
            .get("SSO_CLIENT_ID")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("SSO_CLIENT_ID".to_string()))?;

        let sso_client_secret = env_map
            .get("SSO_CLIENT_SECRET")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("SSO_CLIENT_SECRET".to_string()))?;

        let standings_character = CharacterId::new(parse_var(
            &env_map,
            "STANDINGS_CHARACTER",
            "2114454465",
            "must be a valid i64",
        )?);

        let standing_ratio: Decimal = parse_var(
            &env_map,
            "STANDING_RATIO",
            "0.01",
            "must be a valid decimal",
        )?;
        if standing_ratio.is_negative() {
            return Err(ConfigError::InvalidValue(
                "STANDING_RATIO".to_string(),
                "must be non-negative".to_string(),
            ));
        }

        let poll_interval_secs =
            parse_var(&env_map, "POLL_INTERVAL_SECS", "60", "must be a valid u64")?;
        let staleness_secs = parse_var(&env_map, "STALENESS_SECS", "3600", "must be a valid i64")?;
        let batch_size = parse_var(&env_map, "BATCH_SIZE", "100", "must be a valid i64")?;
        let retention_days = parse_var(&env_map, "RETENTION_DAYS", "30", "must be a valid i64")?;
        let prune_every = parse_var(&env_map, "PRUNE_EVERY", "60", "must be a valid u64")?;
        let price_floor_secs =
            parse_var(&env_map, "PRICE_FLOOR_SECS", "60", "must be a valid u64")?;

        Ok(Config {
            database_path,
            esi_api_url,
            sso_api_url,
            sso_client_id,
            sso_client_secret,
            standings_character,
            standing_ratio,
            poll_interval_secs,
            staleness_secs,
            batch_size,
            retention_days,
            prune_every,
            price_floor_secs,
        })
    }
}
