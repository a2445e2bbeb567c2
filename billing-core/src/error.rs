#[derive(thiserror::Error, Debug)]
pub enum BillingError {
    /// Tariff, customer, or usage data violates a declared invariant.
    #[error("invalid input: {0}")]
    InputValidation(String),
    /// Usage data disagrees with the customer profile (cadence, alignment, duplicates).
    #[error("inconsistent usage data: {0}")]
    Inconsistency(String),
    /// No strategy can repair the requested period.
    #[error("missing usage data: {0}")]
    MissingData(String),
    #[error("unknown time zone '{0}'")]
    ZoneUnknown(String),
    /// Cooperative cancellation was requested; no partial result is kept.
    #[error("bill computation cancelled")]
    Cancelled,
    /// Should be unreachable with fixed-precision decimals.
    #[error("numeric overflow while {0}")]
    Overflow(String),
}

pub type Result<T> = std::result::Result<T, BillingError>;
