use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use anyhow::Result;
use url::Url;

use crate::error::ConfigError;
use crate::schedule::PaymentInterval;

const ENV_PREFIX: &str = "PAYOUT";
const TREASURY_KEY_VAR: &str = "TREASURY_PRIVATE_KEY";
const METRICS_ENDPOINT_VAR: &str = "PUSHGATEWAY";
const DATABASE_URL_VAR: &str = "DATABASE_URL";

/// Non-secret settings, read from the config file and `PAYOUT_*` variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Network the node and treasury live on, e.g. "mainnet" or "testnet-10"
    pub network_id: Option<String>,
    // How many payout runs per day; must divide 24
    pub payouts_per_day: i64,
    // Comma-separated node urls; empty means the network's local default
    pub resolver: String,
    // Minutes between countdown log lines
    pub heartbeat_minutes: u64,
    // Executable that performs the actual balance transfer
    pub payout_command: String,
    pub payout_args: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            network_id: None,
            payouts_per_day: 2,
            resolver: String::new(),
            heartbeat_minutes: 10,
            payout_command: "transfer-balances".to_string(),
            payout_args: Vec::new(),
        }
    }
}

impl Settings {
    /// Settings written by `--init`.
    pub fn template() -> Self {
        Self {
            network_id: Some("mainnet".to_string()),
            ..Self::default()
        }
    }

    /// Layer the JSON file (if any) under `PAYOUT_*` environment overrides.
    pub fn load(config_path: &str) -> Result<Self, ConfigError> {
        let layered = config::Config::builder()
            .add_source(
                config::File::new(config_path, config::FileFormat::Json).required(false),
            )
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;

        Ok(layered.try_deserialize()?)
    }

    pub fn save(&self, config_path: &str) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;

        // Create parent directories if they don't exist
        if let Some(parent) = PathBuf::from(config_path).parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(config_path, content)?;
        Ok(())
    }
}

/// Secrets and operational endpoints taken from the process environment.
#[derive(Clone, Default)]
pub struct Secrets {
    pub treasury_key: Option<String>,
    pub metrics_endpoint: Option<String>,
    pub database_url: Option<String>,
}

impl Secrets {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            treasury_key: lookup(TREASURY_KEY_VAR),
            metrics_endpoint: lookup(METRICS_ENDPOINT_VAR),
            database_url: lookup(DATABASE_URL_VAR),
        }
    }
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secrets")
            .field("treasury_key", &self.treasury_key.as_ref().map(|_| "<redacted>"))
            .field("metrics_endpoint", &self.metrics_endpoint)
            .field("database_url", &self.database_url.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Everything the orchestrator needs, checked and immutable.
#[derive(Clone)]
pub struct ValidatedConfig {
    pub network_id: String,
    pub interval: PaymentInterval,
    pub resolver: String,
    pub heartbeat: Duration,
    pub treasury_key: String,
    pub metrics_endpoint: Url,
    pub database_url: String,
    pub payout_command: String,
    pub payout_args: Vec<String>,
}

impl fmt::Debug for ValidatedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatedConfig")
            .field("network_id", &self.network_id)
            .field("interval", &self.interval)
            .field("resolver", &self.resolver)
            .field("heartbeat", &self.heartbeat)
            .field("treasury_key", &"<redacted>")
            .field("metrics_endpoint", &self.metrics_endpoint)
            .field("database_url", &"<redacted>")
            .field("payout_command", &self.payout_command)
            .finish()
    }
}

fn present(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn http_url(raw: String) -> Result<Url, ConfigError> {
    match Url::parse(&raw) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(url),
        _ => Err(ConfigError::InvalidMetricsEndpoint(raw)),
    }
}

/// Fail fast on missing secrets, endpoints or a bad interval.
///
/// Checks run in a fixed order and the first failure is returned.
pub fn validate(settings: &Settings, secrets: &Secrets) -> Result<ValidatedConfig, ConfigError> {
    let treasury_key = present(&secrets.treasury_key).ok_or(ConfigError::MissingCredential)?;
    let network_id = present(&settings.network_id).ok_or(ConfigError::MissingNetworkId)?;
    let metrics_endpoint =
        present(&secrets.metrics_endpoint).ok_or(ConfigError::MissingMetricsEndpoint)?;
    let metrics_endpoint = http_url(metrics_endpoint)?;
    let database_url = present(&secrets.database_url).ok_or(ConfigError::MissingDatabaseUrl)?;
    let interval = PaymentInterval::from_payouts_per_day(settings.payouts_per_day)?;

    if settings.heartbeat_minutes == 0 {
        return Err(ConfigError::HeartbeatTooShort);
    }

    Ok(ValidatedConfig {
        network_id,
        interval,
        resolver: settings.resolver.trim().to_string(),
        heartbeat: Duration::from_secs(settings.heartbeat_minutes * 60),
        treasury_key,
        metrics_endpoint,
        database_url,
        payout_command: settings.payout_command.clone(),
        payout_args: settings.payout_args.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn full_secrets() -> Secrets {
        Secrets {
            treasury_key: Some("deadbeef".into()),
            metrics_endpoint: Some("http://pushgateway:9091".into()),
            database_url: Some("postgres://payouts@db/payouts".into()),
        }
    }

    #[test]
    fn valid_configuration_passes() {
        let validated = validate(&Settings::template(), &full_secrets()).unwrap();
        assert_eq!(validated.network_id, "mainnet");
        assert_eq!(validated.interval.hours(), 12);
        assert_eq!(validated.heartbeat, Duration::from_secs(600));
    }

    #[test]
    fn missing_credential_is_reported_first() {
        let secrets = Secrets::default();
        assert_matches!(
            validate(&Settings::default(), &secrets),
            Err(ConfigError::MissingCredential)
        );
    }

    #[test]
    fn blank_credential_counts_as_missing() {
        let secrets = Secrets {
            treasury_key: Some("   ".into()),
            ..full_secrets()
        };
        assert_matches!(
            validate(&Settings::template(), &secrets),
            Err(ConfigError::MissingCredential)
        );
    }

    #[test]
    fn missing_network_id() {
        assert_matches!(
            validate(&Settings::default(), &full_secrets()),
            Err(ConfigError::MissingNetworkId)
        );
    }

    #[test]
    fn missing_metrics_endpoint() {
        let secrets = Secrets {
            metrics_endpoint: None,
            ..full_secrets()
        };
        assert_matches!(
            validate(&Settings::template(), &secrets),
            Err(ConfigError::MissingMetricsEndpoint)
        );
    }

    #[test]
    fn metrics_endpoint_must_be_http() {
        for raw in ["pushgateway:9091", "not a url", "ftp://pushgateway"] {
            let secrets = Secrets {
                metrics_endpoint: Some(raw.into()),
                ..full_secrets()
            };
            assert_matches!(
                validate(&Settings::template(), &secrets),
                Err(ConfigError::InvalidMetricsEndpoint(url)) if url == raw
            );
        }
    }

    #[test]
    fn missing_database_url() {
        let secrets = Secrets {
            database_url: Some(String::new()),
            ..full_secrets()
        };
        assert_matches!(
            validate(&Settings::template(), &secrets),
            Err(ConfigError::MissingDatabaseUrl)
        );
    }

    #[test]
    fn bad_interval_is_a_config_error() {
        let settings = Settings {
            payouts_per_day: 48,
            ..Settings::template()
        };
        assert_matches!(
            validate(&settings, &full_secrets()),
            Err(ConfigError::IntervalOutOfRange { payouts_per_day: 48 })
        );
    }

    #[test]
    fn negative_payouts_in_file_is_out_of_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"network_id":"mainnet","payouts_per_day":-2}"#).unwrap();

        let loaded = Settings::load(path.to_str().unwrap()).unwrap();

        assert_matches!(
            validate(&loaded, &full_secrets()),
            Err(ConfigError::IntervalOutOfRange { payouts_per_day: -2 })
        );
    }

    #[test]
    fn zero_heartbeat_is_rejected() {
        let settings = Settings {
            heartbeat_minutes: 0,
            ..Settings::template()
        };
        assert_matches!(
            validate(&settings, &full_secrets()),
            Err(ConfigError::HeartbeatTooShort)
        );
    }

    #[test]
    fn secrets_read_from_lookup() {
        let secrets = Secrets::from_lookup(|name| match name {
            "TREASURY_PRIVATE_KEY" => Some("k".into()),
            "DATABASE_URL" => Some("postgres://x".into()),
            _ => None,
        });
        assert_eq!(secrets.treasury_key.as_deref(), Some("k"));
        assert_eq!(secrets.metrics_endpoint, None);
        assert!(!format!("{secrets:?}").contains("postgres://x"));
    }

    #[test]
    fn saved_template_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let path = path.to_str().unwrap();

        Settings::template().save(path).unwrap();
        let loaded = Settings::load(path).unwrap();

        assert_eq!(loaded.network_id.as_deref(), Some("mainnet"));
        assert_eq!(loaded.payouts_per_day, 2);
        assert_eq!(loaded.heartbeat_minutes, 10);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let loaded = Settings::load(path.to_str().unwrap()).unwrap();
        assert_eq!(loaded.payouts_per_day, 2);
        assert_eq!(loaded.payout_command, "transfer-balances");
    }
}
