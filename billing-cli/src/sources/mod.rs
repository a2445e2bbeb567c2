pub mod tariff_yaml;
pub mod usage_csv;

pub use tariff_yaml::{TariffImport, TariffYamlSource};
pub use usage_csv::UsageCsvSource;

#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("usage csv error: {0}")]
    UsageCsv(String),
    #[error("tariff yaml error: {0}")]
    TariffYaml(String),
}
