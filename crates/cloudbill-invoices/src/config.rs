use crate::domain::downtime::DowntimePolicy;
use crate::domain::manager::InvoicePolicy;
use crate::error::{BillingError, Result};
use chrono::Duration;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const DEFAULT_CONFIG_FILE: &str = "cloudbill-invoices.toml";
const ENV_PREFIX: &str = "CLOUDBILL_";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvoicesConfig {
    pub service: ServiceConfig,
    pub invoices: InvoiceSettings,
    pub ledger: LedgerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub environment: String,
    pub service_id: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            service_id: "cloudbill-invoices".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceSettings {
    /// Days between issuing an invoice and its due date.
    pub payment_interval_days: u32,
    pub default_tax_percent: Decimal,
    /// Shortest reportable downtime, in seconds. Unset means unbounded.
    pub downtime_duration_minimal_secs: Option<i64>,
    pub downtime_duration_maximal_secs: Option<i64>,
}

impl Default for InvoiceSettings {
    fn default() -> Self {
        Self {
            payment_interval_days: 30,
            default_tax_percent: Decimal::ZERO,
            downtime_duration_minimal_secs: Some(24 * 60 * 60),
            downtime_duration_maximal_secs: Some(30 * 24 * 60 * 60),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// JSON file the binary reads and rewrites.
    pub snapshot_path: PathBuf,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            snapshot_path: PathBuf::from("ledger.json"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub default_filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Compact,
            default_filter: "cloudbill_invoices=info".to_string(),
        }
    }
}

impl InvoicesConfig {
    /// Defaults, then the TOML file, then `CLOUDBILL_*` variables
    /// (`CLOUDBILL_INVOICES__DEFAULT_TAX_PERCENT=20`).
    pub fn load(path_override: Option<PathBuf>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(InvoicesConfig::default()));

        let path = path_override.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        if path.exists() {
            figment = figment.merge(Toml::file(&path));
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: InvoicesConfig = figment
            .extract()
            .map_err(|e| BillingError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let settings = &self.invoices;
        if settings.default_tax_percent < Decimal::ZERO
            || settings.default_tax_percent > Decimal::ONE_HUNDRED
        {
            return Err(BillingError::Config(format!(
                "default_tax_percent must be within 0-100, got {}",
                settings.default_tax_percent
            )));
        }
        if settings.payment_interval_days == 0 {
            return Err(BillingError::Config(
                "payment_interval_days must be positive".to_string(),
            ));
        }
        for (name, value) in [
            ("downtime_duration_minimal_secs", settings.downtime_duration_minimal_secs),
            ("downtime_duration_maximal_secs", settings.downtime_duration_maximal_secs),
        ] {
            if matches!(value, Some(secs) if secs < 0) {
                return Err(BillingError::Config(format!("{} must not be negative", name)));
            }
        }
        if let (Some(minimal), Some(maximal)) = (
            settings.downtime_duration_minimal_secs,
            settings.downtime_duration_maximal_secs,
        ) {
            if minimal > maximal {
                return Err(BillingError::Config(format!(
                    "minimal downtime duration ({}s) exceeds maximal ({}s)",
                    minimal, maximal
                )));
            }
        }
        Ok(())
    }

    pub fn policy(&self) -> InvoicePolicy {
        InvoicePolicy {
            default_tax_percent: self.invoices.default_tax_percent,
            payment_interval_days: self.invoices.payment_interval_days,
            downtime: DowntimePolicy {
                minimal: self
                    .invoices
                    .downtime_duration_minimal_secs
                    .map(Duration::seconds),
                maximal: self
                    .invoices
                    .downtime_duration_maximal_secs
                    .map(Duration::seconds),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Write;

    #[test]
    fn test_defaults_match_policy_defaults() {
        let config = InvoicesConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.policy(), InvoicePolicy::default());
    }

    #[test]
    fn test_toml_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[invoices]
payment_interval_days = 14
default_tax_percent = "20"

[ledger]
snapshot_path = "/var/lib/cloudbill/ledger.json"
"#
        )
        .unwrap();

        let config = InvoicesConfig::load(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.invoices.payment_interval_days, 14);
        assert_eq!(config.invoices.default_tax_percent, dec!(20));
        assert_eq!(
            config.ledger.snapshot_path,
            PathBuf::from("/var/lib/cloudbill/ledger.json")
        );
        assert_eq!(config.logging.format, LogFormat::Compact);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = InvoicesConfig::default();
        config.invoices.default_tax_percent = dec!(120);
        assert!(config.validate().is_err());

        let mut config = InvoicesConfig::default();
        config.invoices.payment_interval_days = 0;
        assert!(config.validate().is_err());

        let mut config = InvoicesConfig::default();
        config.invoices.downtime_duration_minimal_secs = Some(10);
        config.invoices.downtime_duration_maximal_secs = Some(5);
        assert!(config.validate().is_err());

        let mut config = InvoicesConfig::default();
        config.invoices.downtime_duration_maximal_secs = None;
        assert!(config.validate().is_ok());
        assert_eq!(config.policy().downtime.maximal, None);
    }

    #[test]
    fn test_generated_config_round_trips() {
        let rendered = toml::to_string_pretty(&InvoicesConfig::default()).unwrap();
        let parsed: InvoicesConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.invoices.payment_interval_days, 30);
        assert_eq!(parsed.logging.default_filter, "cloudbill_invoices=info");
    }
}
