use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use anyhow::Context;
use chrono::NaiveDate;
use serde::Deserialize;

use billing_core::{CustomerProfile, GapFillStrategy};

#[derive(Debug, Clone, Deserialize)]
pub struct CustomerConfig {
    pub name: String,
    /// IANA zone id, e.g. `America/Los_Angeles`.
    pub timezone: String,
    pub billing_day: u8,
    #[serde(default = "default_interval_minutes")]
    pub billing_interval_minutes: u32,
    /// Name of the tariff to pick from the tariff document.
    pub tariff: String,
}

fn default_interval_minutes() -> u32 {
    CustomerProfile::DEFAULT_INTERVAL_MINUTES
}

#[derive(Debug, Clone, Deserialize)]
pub struct UtilityConfig {
    pub name: String,
    /// Local civil dates, `YYYY-MM-DD`.
    #[serde(default)]
    pub holidays: Vec<String>,
}

/// Gap strategy spelled the way the config and CLI spell it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
#[clap(rename_all = "kebab-case")]
pub enum GapStrategyArg {
    ExtrapolateLast,
    LinearInterpolate,
}

impl Default for GapStrategyArg {
    fn default() -> Self {
        GapStrategyArg::ExtrapolateLast
    }
}

impl From<GapStrategyArg> for GapFillStrategy {
    fn from(arg: GapStrategyArg) -> Self {
        match arg {
            GapStrategyArg::ExtrapolateLast => GapFillStrategy::ExtrapolateLast,
            GapStrategyArg::LinearInterpolate => GapFillStrategy::LinearInterpolate,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ComputeConfig {
    #[serde(default)]
    pub gap_strategy: GapStrategyArg,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BillingConfig {
    pub customer: CustomerConfig,
    pub utility: UtilityConfig,
    #[serde(default)]
    pub compute: ComputeConfig,
}

impl BillingConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path = env::var("BILLING_CONFIG").unwrap_or_else(|_| "billing-config.toml".to_string());
        Self::from_path(Path::new(&path))
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let cfg: BillingConfig = toml::from_str(&contents)
            .with_context(|| format!("invalid config {}", path.display()))?;
        Ok(cfg)
    }

    pub fn profile(&self) -> billing_core::Result<CustomerProfile> {
        CustomerProfile::new(
            &self.customer.timezone,
            self.customer.billing_interval_minutes,
            self.customer.billing_day,
        )
    }

    pub fn holiday_set(&self) -> anyhow::Result<BTreeSet<NaiveDate>> {
        self.utility
            .holidays
            .iter()
            .map(|s| {
                NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                    .with_context(|| format!("invalid holiday date '{s}'"))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_config() {
        let cfg: BillingConfig = toml::from_str(
            r#"
            [customer]
            name = "ACME Manufacturing"
            timezone = "America/Los_Angeles"
            billing_day = 15
            billing_interval_minutes = 5
            tariff = "B-19"

            [utility]
            name = "PG&E"
            holidays = ["2024-01-01", "2024-07-04"]

            [compute]
            gap_strategy = "linear_interpolate"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.customer.billing_day, 15);
        assert_eq!(cfg.compute.gap_strategy, GapStrategyArg::LinearInterpolate);
        assert_eq!(cfg.holiday_set().unwrap().len(), 2);
        assert!(cfg.profile().is_ok());
    }

    #[test]
    fn interval_and_strategy_default() {
        let cfg: BillingConfig = toml::from_str(
            r#"
            [customer]
            name = "ACME"
            timezone = "UTC"
            billing_day = 31
            tariff = "Flat"

            [utility]
            name = "Acme Power"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.customer.billing_interval_minutes, 5);
        assert_eq!(cfg.compute.gap_strategy, GapStrategyArg::ExtrapolateLast);
        assert!(cfg.holiday_set().unwrap().is_empty());
    }

    #[test]
    fn bad_holiday_date_is_an_error() {
        let cfg: BillingConfig = toml::from_str(
            r#"
            [customer]
            name = "ACME"
            timezone = "UTC"
            billing_day = 31
            tariff = "Flat"

            [utility]
            name = "Acme Power"
            holidays = ["01/01/2024"]
            "#,
        )
        .unwrap();
        assert!(cfg.holiday_set().is_err());
    }
}
