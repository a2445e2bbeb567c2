pub mod customer;
pub mod tariff;
pub mod usage;

pub use customer::CustomerProfile;
pub use tariff::{
    ApplicabilityRule, ChargeId, CustomerCharge, CustomerChargeType, DemandCharge, EnergyCharge,
    MonthDay, PeakType, SeasonWindow, Tariff,
};
pub use usage::UsageRecord;
