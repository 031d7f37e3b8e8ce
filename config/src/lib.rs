//! Confidential fundraising configuration
//!
//! Handles loading configuration from:
//! 1. CF_CONFIG env var (explicit path)
//! 2. ./config.toml (current directory)
//! 3. ~/.cfund/config.toml (user home)
//!
//! Environment variables take precedence over TOML config.

use anyhow::{Context, Result};
use cfund_types::Address;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;
use std::{env, fs};

/// Global config instance for convenience access
pub static GLOBAL_CONFIG: OnceLock<CfundConfig> = OnceLock::new();

const CONFIG_FILE_NAME: &str = "config.toml";
const CONFIG_DIR_NAME: &str = ".cfund";

// ============================================================================
// Default Constants
// ============================================================================

const DEFAULT_LEDGER_URL: &str = "http://127.0.0.1:8545";
const DEFAULT_RELAYER_URL: &str = "http://127.0.0.1:7077";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

const DEFAULT_FUNDRAISING_CONTRACT: &str =
    "0x3f5a0c1e9b7d24c8e6a1f0b3d5c7e9a2b4d6f8a0c2e4b6d8f0a1c3e5b7d9f1a3";
const DEFAULT_TOKEN_CONTRACT: &str =
    "0x7c2e4a6b8d0f1e3c5a7b9d1f3e5c7a9b1d3f5e7c9a1b3d5f7e9c1a3b5d7f9e1c";

const DEFAULT_STALE_TIME_MS: u64 = 10_000;
const DEFAULT_DECRYPT_DURATION_DAYS: u64 = 10;
/// 2^53 - 1
const DEFAULT_MAX_AMOUNT: u64 = (1 << 53) - 1;

// ============================================================================
// Config Structs
// ============================================================================

/// Root configuration structure (matches TOML layout)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CfundConfig {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub contracts: ContractsConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub decryption: DecryptionConfig,
    #[serde(default)]
    pub donation: DonationConfig,
    #[serde(default)]
    pub features: FeatureFlags,
}

/// Endpoints of the ledger gateway and the decryption relayer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_ledger_url")]
    pub ledger_url: String,
    #[serde(default = "default_relayer_url")]
    pub relayer_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            ledger_url: DEFAULT_LEDGER_URL.into(),
            relayer_url: DEFAULT_RELAYER_URL.into(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

fn default_ledger_url() -> String {
    DEFAULT_LEDGER_URL.into()
}
fn default_relayer_url() -> String {
    DEFAULT_RELAYER_URL.into()
}
fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

/// Deployed contract addresses (hex, 32 bytes)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractsConfig {
    #[serde(default = "default_fundraising")]
    pub fundraising: String,
    #[serde(default = "default_token")]
    pub token: String,
}

impl Default for ContractsConfig {
    fn default() -> Self {
        Self {
            fundraising: DEFAULT_FUNDRAISING_CONTRACT.into(),
            token: DEFAULT_TOKEN_CONTRACT.into(),
        }
    }
}

fn default_fundraising() -> String {
    DEFAULT_FUNDRAISING_CONTRACT.into()
}
fn default_token() -> String {
    DEFAULT_TOKEN_CONTRACT.into()
}

/// Campaign registry cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_stale_time")]
    pub stale_time_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stale_time_ms: DEFAULT_STALE_TIME_MS,
        }
    }
}

fn default_stale_time() -> u64 {
    DEFAULT_STALE_TIME_MS
}

/// Decryption authorization policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecryptionConfig {
    /// Validity of a signed authorization
    #[serde(default = "default_duration_days")]
    pub duration_days: u64,
}

impl Default for DecryptionConfig {
    fn default() -> Self {
        Self {
            duration_days: DEFAULT_DECRYPT_DURATION_DAYS,
        }
    }
}

fn default_duration_days() -> u64 {
    DEFAULT_DECRYPT_DURATION_DAYS
}

/// Donation limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DonationConfig {
    /// Largest amount (base units) accepted for encryption
    #[serde(default = "default_max_amount")]
    pub max_amount: u64,
}

impl Default for DonationConfig {
    fn default() -> Self {
        Self {
            max_amount: DEFAULT_MAX_AMOUNT,
        }
    }
}

fn default_max_amount() -> u64 {
    DEFAULT_MAX_AMOUNT
}

/// Feature flags
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureFlags {
    /// Run against the in-memory ledger and local encryption service
    #[serde(default)]
    pub dev_mode: bool,
}

// ============================================================================
// Override Helpers
// ============================================================================

fn override_string(lookup: &impl Fn(&str) -> Option<String>, key: &str, field: &mut String) {
    if let Some(v) = lookup(key) {
        *field = v;
    }
}

/// Set field if present and parseable; unparseable values are ignored
fn override_parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, field: &mut T) {
    if let Some(v) = lookup(key) {
        match v.parse() {
            Ok(parsed) => *field = parsed,
            Err(_) => log::warn!("Ignoring unparseable {}={}", key, v),
        }
    }
}

/// "1" or "true" (any case) is truthy
fn override_bool(lookup: &impl Fn(&str) -> Option<String>, key: &str, field: &mut bool) {
    if let Some(v) = lookup(key) {
        *field = v == "1" || v.eq_ignore_ascii_case("true");
    }
}

// ============================================================================
// Implementation
// ============================================================================

impl CfundConfig {
    /// Load configuration from config file with env var overrides
    pub fn load() -> Result<Self> {
        let mut config = match Self::find_config_file() {
            Some(path) => {
                log::info!("Loading config from: {}", path.display());
                Self::read_file(&path)?
            }
            None => {
                log::info!("No config file found, using defaults and environment variables");
                Self::default()
            }
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific file path
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::read_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Find the config file path
    fn find_config_file() -> Option<PathBuf> {
        if let Ok(path) = env::var("CF_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let local_path = PathBuf::from(CONFIG_FILE_NAME);
        if local_path.exists() {
            return Some(local_path);
        }

        Self::default_config_path().filter(|p| p.exists())
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    /// Apply overrides from any key/value source
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        // Network
        override_string(&lookup, "CF_LEDGER_URL", &mut self.network.ledger_url);
        override_string(&lookup, "CF_RELAYER_URL", &mut self.network.relayer_url);
        override_parse(
            &lookup,
            "CF_REQUEST_TIMEOUT",
            &mut self.network.request_timeout_secs,
        );

        // Contracts
        override_string(
            &lookup,
            "CF_FUNDRAISING_ADDRESS",
            &mut self.contracts.fundraising,
        );
        override_string(&lookup, "CF_TOKEN_ADDRESS", &mut self.contracts.token);

        override_parse(&lookup, "CF_STALE_TIME_MS", &mut self.cache.stale_time_ms);
        override_parse(
            &lookup,
            "CF_DECRYPT_DURATION_DAYS",
            &mut self.decryption.duration_days,
        );
        override_parse(&lookup, "CF_MAX_AMOUNT", &mut self.donation.max_amount);

        override_bool(&lookup, "CF_DEV_MODE", &mut self.features.dev_mode);
    }

    /// Parses the configured contract addresses
    pub fn contract_addresses(&self) -> Result<ContractAddresses> {
        Ok(ContractAddresses {
            fundraising: Address::from_str(&self.contracts.fundraising)
                .context("Invalid contracts.fundraising address")?,
            token: Address::from_str(&self.contracts.token)
                .context("Invalid contracts.token address")?,
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.network.request_timeout_secs)
    }

    pub fn stale_time(&self) -> Duration {
        Duration::from_millis(self.cache.stale_time_ms)
    }

    /// Get the default config file path
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Generate a sample config file
    pub fn generate_sample() -> String {
        let mut sample = Self::default();
        sample.features.dev_mode = true;
        toml::to_string_pretty(&sample).unwrap_or_default()
    }

    /// Get the global config instance, initializing it if necessary.
    ///
    /// Falls back to defaults if loading fails.
    pub fn global() -> &'static CfundConfig {
        GLOBAL_CONFIG.get_or_init(|| {
            Self::load().unwrap_or_else(|e| {
                log::warn!("Failed to load config: {:#}, using defaults", e);
                Self::default()
            })
        })
    }
}

// ============================================================================
// Parsed Config
// ============================================================================

/// Contract addresses parsed from config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContractAddresses {
    pub fundraising: Address,
    pub token: Address,
}

impl Default for ContractAddresses {
    fn default() -> Self {
        // The built-in constants are valid hex
        let parse = |s: &str| Address::from_str(s).unwrap_or(Address([0u8; 32]));
        Self {
            fundraising: parse(DEFAULT_FUNDRAISING_CONTRACT),
            token: parse(DEFAULT_TOKEN_CONTRACT),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
