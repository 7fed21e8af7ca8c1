// ⚙️ Configuration - fee schedule + storage location
// Loaded once at startup; never mutated afterwards.

use crate::db::Store;
use crate::entities::Transport;
use crate::error::ConfigError;
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Number of visits that make up one billing cycle
pub const VISITS_PER_CYCLE: u32 = 5;

pub const DEFAULT_DB_PATH: &str = "data/memberships.db";
pub const DEFAULT_FEES: &str = "BUS=100000,TRAVEL=50000";
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_STATIC_DIR: &str = "static";

// ============================================================================
// FEE SCHEDULE
// ============================================================================

/// Per-visit fee for every transport kind
///
/// Always complete: construction fails unless every [`Transport`] has a
/// positive fee, so lookups never need a fallback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeeSchedule {
    fees: BTreeMap<Transport, i64>,
}

impl FeeSchedule {
    /// Build from explicit pairs
    pub fn new<I>(entries: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (Transport, i64)>,
    {
        let mut fees = BTreeMap::new();

        for (transport, fee) in entries {
            if fee <= 0 {
                return Err(ConfigError::InvalidFee {
                    transport: transport.as_str().to_string(),
                    reason: "must be positive".to_string(),
                });
            }
            if fee.checked_mul(i64::from(VISITS_PER_CYCLE)).is_none() {
                return Err(ConfigError::InvalidFee {
                    transport: transport.as_str().to_string(),
                    reason: "cycle amount overflows".to_string(),
                });
            }
            fees.insert(transport, fee);
        }

        for transport in Transport::ALL {
            if !fees.contains_key(&transport) {
                return Err(ConfigError::MissingTransport(transport.as_str()));
            }
        }

        Ok(FeeSchedule { fees })
    }

    /// Parse `BUS=100000,TRAVEL=50000`
    pub fn parse(list: &str) -> Result<Self, ConfigError> {
        let mut entries = Vec::new();

        for raw in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let (name, amount) = raw
                .split_once('=')
                .ok_or_else(|| ConfigError::MalformedEntry(raw.to_string()))?;

            let transport: Transport = name
                .parse()
                .map_err(|_| ConfigError::UnknownTransport(name.trim().to_string()))?;

            let fee: i64 = amount.trim().parse().map_err(|_| ConfigError::InvalidFee {
                transport: transport.as_str().to_string(),
                reason: format!("'{}' is not an integer", amount.trim()),
            })?;

            entries.push((transport, fee));
        }

        FeeSchedule::new(entries)
    }

    pub fn fee_for(&self, transport: Transport) -> i64 {
        // Completeness is checked in `new`
        self.fees[&transport]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Transport, i64)> + '_ {
        self.fees.iter().map(|(t, fee)| (*t, *fee))
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        FeeSchedule {
            fees: BTreeMap::from([(Transport::Bus, 100_000), (Transport::Travel, 50_000)]),
        }
    }
}

// ============================================================================
// APPLICATION CONFIG
// ============================================================================

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub busy_timeout: Duration,
    pub fees: FeeSchedule,
    pub bind_addr: String,
    pub static_dir: PathBuf,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenvy::dotenv();

        let busy_timeout_ms = match env_var("MEMBERSHIP_DB_BUSY_TIMEOUT_MS")? {
            Some(raw) => raw
                .parse::<u64>()
                .context("MEMBERSHIP_DB_BUSY_TIMEOUT_MS must be a number of milliseconds")?,
            None => DEFAULT_BUSY_TIMEOUT_MS,
        };

        let fees_raw = env_var("MEMBERSHIP_FEES")?.unwrap_or_else(|| DEFAULT_FEES.to_string());
        let fees = FeeSchedule::parse(&fees_raw).context("MEMBERSHIP_FEES is invalid")?;

        Ok(Self {
            db_path: env::var_os("MEMBERSHIP_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH)),
            busy_timeout: Duration::from_millis(busy_timeout_ms),
            fees,
            bind_addr: env_var("MEMBERSHIP_BIND")?.unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            static_dir: env::var_os("MEMBERSHIP_STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STATIC_DIR)),
        })
    }

    /// Create the data directory if needed and open the store
    pub fn open_store(&self) -> Result<Store> {
        if let Some(parent) = self.db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create data directory {}", parent.display()))?;
        }

        Store::open(&self.db_path, self.busy_timeout)
            .with_context(|| format!("Failed to open database {}", self.db_path.display()))
    }
}

/// Read a text variable; unset is `None`, non-UTF-8 is an error
fn env_var(key: &str) -> Result<Option<String>> {
    match env::var(key) {
        Ok(value) => Ok(Some(value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(env::VarError::NotUnicode(raw)) => {
            anyhow::bail!("{} is set but is not valid UTF-8: {:?}", key, raw)
        }
    }
}
