use {
    crate::{
        error::ConfigError,
        persistence::PersistenceConfig,
        selection::{SelectionMode, BONUS_STREAK, HISTORY_CAP},
        session::{EligibilityBand, SessionSettings},
    },
    std::{env, str::FromStr, time::Duration},
};

/// Configuration loaded from environment variables
///
/// Environment variables:
/// - `RPC_ENDPOINT` (required, http:// or https://)
/// - `TOKEN_MINT` (required)
/// - `POLL_INTERVAL_MS` (default: 2000)
/// - `COHORT_SIZE` (default: 50)
/// - `HOLDERFLOW_DB_PATH` (default: holderflow.db)
/// - `SESSION_SNAPSHOT_PATH` (default: session.json)
/// - `AUTOSAVE_INTERVAL_SECS` (default: 60)
/// - `LOTTERY_EVERY_POLLS` (default: 30, 0 disables)
/// - `LOTTERY_MODE` (weighted | uniform, default: weighted)
/// - `LOTTERY_MIN_PCT` / `LOTTERY_MAX_PCT` (default: 0 / 100)
/// - `FETCH_MAX_RETRIES` (default: 2)
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub rpc_endpoint: String,
    pub token_mint: String,
    pub poll_interval_ms: u64,
    pub cohort_size: usize,
    pub db_path: String,
    pub snapshot_path: String,
    pub autosave_interval_secs: u64,
    pub lottery_every_polls: u64,
    pub lottery_mode: SelectionMode,
    pub lottery_min_pct: f64,
    pub lottery_max_pct: f64,
    pub fetch_max_retries: u32,
}

fn parse_or<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{} = '{}'", key, raw))),
        Err(_) => Ok(default),
    }
}

impl TrackerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let rpc_endpoint = env::var("RPC_ENDPOINT")
            .map_err(|_| ConfigError::MissingVariable("RPC_ENDPOINT".to_string()))?;

        if !rpc_endpoint.starts_with("http://") && !rpc_endpoint.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "RPC_ENDPOINT must start with http:// or https://".to_string(),
            ));
        }

        let token_mint = env::var("TOKEN_MINT")
            .map(|s| s.trim().to_string())
            .ok()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ConfigError::MissingVariable("TOKEN_MINT".to_string()))?;

        let cohort_size = parse_or("COHORT_SIZE", 50usize)?;
        if cohort_size == 0 {
            return Err(ConfigError::InvalidValue(
                "COHORT_SIZE must be greater than zero".to_string(),
            ));
        }

        let lottery_mode = match env::var("LOTTERY_MODE") {
            Ok(raw) => raw.parse().map_err(ConfigError::InvalidValue)?,
            Err(_) => SelectionMode::Weighted,
        };

        let lottery_min_pct = parse_or("LOTTERY_MIN_PCT", 0.0)?;
        let lottery_max_pct = parse_or("LOTTERY_MAX_PCT", 100.0)?;
        if lottery_min_pct > lottery_max_pct {
            return Err(ConfigError::InvalidValue(format!(
                "LOTTERY_MIN_PCT ({}) is above LOTTERY_MAX_PCT ({})",
                lottery_min_pct, lottery_max_pct
            )));
        }

        Ok(Self {
            rpc_endpoint,
            token_mint,
            poll_interval_ms: parse_or("POLL_INTERVAL_MS", 2_000)?,
            cohort_size,
            db_path: env::var("HOLDERFLOW_DB_PATH").unwrap_or_else(|_| "holderflow.db".to_string()),
            snapshot_path: env::var("SESSION_SNAPSHOT_PATH")
                .unwrap_or_else(|_| "session.json".to_string()),
            autosave_interval_secs: parse_or("AUTOSAVE_INTERVAL_SECS", 60)?,
            lottery_every_polls: parse_or("LOTTERY_EVERY_POLLS", 30)?,
            lottery_mode,
            lottery_min_pct,
            lottery_max_pct,
            fetch_max_retries: parse_or("FETCH_MAX_RETRIES", 2)?,
        })
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            cohort_size: self.cohort_size,
            lottery_mode: self.lottery_mode,
            lottery_band: EligibilityBand::new(self.lottery_min_pct, self.lottery_max_pct),
            lottery_every_polls: self.lottery_every_polls,
            bonus_streak: BONUS_STREAK,
            history_cap: HISTORY_CAP,
        }
    }

    pub fn persistence_config(&self) -> PersistenceConfig {
        PersistenceConfig {
            file_path: self.snapshot_path.clone(),
            autosave_interval: Duration::from_secs(self.autosave_interval_secs.max(1)),
        }
    }
}
