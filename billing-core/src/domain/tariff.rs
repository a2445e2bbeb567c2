use std::collections::HashSet;
use std::fmt;

use chrono::{Datelike, NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::{BillingError, Result};

/// Stable identifier for one charge, used to key line items and the
/// per-interval cost matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChargeId(Uuid);

impl ChargeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ChargeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ChargeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A calendar (month, day) with the year ignored, so seasonal windows
/// repeat annually. Ordering is lexicographic on (month, day).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MonthDay {
    month: u32,
    day: u32,
}

impl MonthDay {
    pub fn new(month: u32, day: u32) -> Result<Self> {
        // Day validity is checked against the leap-year maximum so Feb 29
        // remains expressible.
        let max_day = match month {
            1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
            4 | 6 | 9 | 11 => 30,
            2 => 29,
            _ => {
                return Err(BillingError::InputValidation(format!(
                    "month must be between 1 and 12 (got {month})"
                )))
            }
        };
        if day == 0 || day > max_day {
            return Err(BillingError::InputValidation(format!(
                "day {day} is not valid for month {month}"
            )));
        }
        Ok(Self { month, day })
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            month: date.month(),
            day: date.day(),
        }
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn day(&self) -> u32 {
        self.day
    }
}

impl fmt::Display for MonthDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}-{:02}", self.month, self.day)
    }
}

/// Annual month/day window, inclusive on both bounds. When `end < start`
/// the window wraps the year boundary (e.g. Oct 1 -- May 31).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeasonWindow {
    pub start: MonthDay,
    pub end: MonthDay,
}

impl SeasonWindow {
    pub fn contains(&self, md: MonthDay) -> bool {
        if self.end < self.start {
            md >= self.start || md <= self.end
        } else {
            md >= self.start && md <= self.end
        }
    }
}

/// Predicate deciding on which intervals a charge is in force.
///
/// The time-of-day window is half-open: an interval qualifies when its
/// local start is >= `period_start_local` and strictly < `period_end_local`.
/// Equal endpoints at midnight are the all-day sentinel; a window never
/// spans midnight within a single rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicabilityRule {
    pub period_start_local: NaiveTime,
    pub period_end_local: NaiveTime,
    pub season: Option<SeasonWindow>,
    pub weekdays: bool,
    pub weekends: bool,
    pub holidays: bool,
}

impl ApplicabilityRule {
    pub fn new(
        period_start_local: NaiveTime,
        period_end_local: NaiveTime,
        season: Option<SeasonWindow>,
        weekdays: bool,
        weekends: bool,
        holidays: bool,
    ) -> Result<Self> {
        let midnight = NaiveTime::from_hms_opt(0, 0, 0).expect("midnight is a valid time");
        if period_end_local < period_start_local {
            return Err(BillingError::InputValidation(format!(
                "period_end_time_local {period_end_local} is before period_start_time_local {period_start_local}; wrap-midnight windows must be split into two rules"
            )));
        }
        if period_start_local == period_end_local && period_start_local != midnight {
            return Err(BillingError::InputValidation(format!(
                "equal period endpoints are only allowed at 00:00 (got {period_start_local})"
            )));
        }
        Ok(Self {
            period_start_local,
            period_end_local,
            season,
            weekdays,
            weekends,
            holidays,
        })
    }

    /// Rule with no time, season, or day-class constraint.
    pub fn always() -> Self {
        let midnight = NaiveTime::from_hms_opt(0, 0, 0).expect("midnight is a valid time");
        Self {
            period_start_local: midnight,
            period_end_local: midnight,
            season: None,
            weekdays: true,
            weekends: true,
            holidays: true,
        }
    }

    /// Equal midnight endpoints mean the whole day.
    pub fn all_day(&self) -> bool {
        self.period_start_local == self.period_end_local
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeakType {
    Daily,
    Monthly,
}

impl fmt::Display for PeakType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeakType::Daily => write!(f, "daily"),
            PeakType::Monthly => write!(f, "monthly"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustomerChargeType {
    Daily,
    Monthly,
}

impl fmt::Display for CustomerChargeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CustomerChargeType::Daily => write!(f, "daily"),
            CustomerChargeType::Monthly => write!(f, "monthly"),
        }
    }
}

const RATE_PRECISION: u32 = 5;

fn validated_rate(value: Decimal, what: &str, name: &str) -> Result<Decimal> {
    if value < Decimal::ZERO {
        return Err(BillingError::InputValidation(format!(
            "{what} for '{name}' must be non-negative (got {value})"
        )));
    }
    // Storage carries at most five fractional digits; finer input rounds.
    Ok(value.round_dp(RATE_PRECISION))
}

/// $/kWh charge; in force on any interval matched by at least one of its
/// rules. A charge with no rules applies everywhere.
#[derive(Debug, Clone, PartialEq)]
pub struct EnergyCharge {
    pub id: ChargeId,
    pub name: String,
    pub rate_usd_per_kwh: Decimal,
    pub rules: Vec<ApplicabilityRule>,
}

impl EnergyCharge {
    pub fn new(
        name: impl Into<String>,
        rate_usd_per_kwh: Decimal,
        rules: Vec<ApplicabilityRule>,
    ) -> Result<Self> {
        let name = name.into();
        let rate_usd_per_kwh = validated_rate(rate_usd_per_kwh, "rate_usd_per_kwh", &name)?;
        Ok(Self {
            id: ChargeId::new(),
            name,
            rate_usd_per_kwh,
            rules,
        })
    }
}

/// $/kW charge on the scope peak; the scope is each local day or each
/// billing month depending on `peak_type`.
#[derive(Debug, Clone, PartialEq)]
pub struct DemandCharge {
    pub id: ChargeId,
    pub name: String,
    pub rate_usd_per_kw: Decimal,
    pub peak_type: PeakType,
    pub rules: Vec<ApplicabilityRule>,
}

impl DemandCharge {
    pub fn new(
        name: impl Into<String>,
        rate_usd_per_kw: Decimal,
        peak_type: PeakType,
        rules: Vec<ApplicabilityRule>,
    ) -> Result<Self> {
        let name = name.into();
        let rate_usd_per_kw = validated_rate(rate_usd_per_kw, "rate_usd_per_kw", &name)?;
        Ok(Self {
            id: ChargeId::new(),
            name,
            rate_usd_per_kw,
            peak_type,
            rules,
        })
    }
}

/// Flat recurring charge, always active; carries no applicability rules.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerCharge {
    pub id: ChargeId,
    pub name: String,
    pub amount_usd: Decimal,
    pub charge_type: CustomerChargeType,
}

impl CustomerCharge {
    pub fn new(
        name: impl Into<String>,
        amount_usd: Decimal,
        charge_type: CustomerChargeType,
    ) -> Result<Self> {
        let name = name.into();
        let amount_usd = validated_rate(amount_usd, "amount_usd", &name)?;
        Ok(Self {
            id: ChargeId::new(),
            name,
            amount_usd,
            charge_type,
        })
    }
}

/// Immutable pricing structure for one utility rate schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct Tariff {
    pub utility: String,
    pub name: String,
    pub energy_charges: Vec<EnergyCharge>,
    pub demand_charges: Vec<DemandCharge>,
    pub customer_charges: Vec<CustomerCharge>,
}

impl Tariff {
    pub fn new(
        utility: impl Into<String>,
        name: impl Into<String>,
        energy_charges: Vec<EnergyCharge>,
        demand_charges: Vec<DemandCharge>,
        customer_charges: Vec<CustomerCharge>,
    ) -> Result<Self> {
        let utility = utility.into();
        let name = name.into();
        if energy_charges.is_empty() && demand_charges.is_empty() && customer_charges.is_empty() {
            return Err(BillingError::InputValidation(format!(
                "tariff '{name}' must declare at least one charge"
            )));
        }
        check_unique_names("energy charge", &name, energy_charges.iter().map(|c| c.name.as_str()))?;
        check_unique_names("demand charge", &name, demand_charges.iter().map(|c| c.name.as_str()))?;
        check_unique_names(
            "customer charge",
            &name,
            customer_charges.iter().map(|c| c.name.as_str()),
        )?;
        Ok(Self {
            utility,
            name,
            energy_charges,
            demand_charges,
            customer_charges,
        })
    }

    pub fn charge_count(&self) -> usize {
        self.energy_charges.len() + self.demand_charges.len() + self.customer_charges.len()
    }

    /// Charge name lookup for rendering line items.
    pub fn charge_name(&self, id: ChargeId) -> Option<&str> {
        self.energy_charges
            .iter()
            .map(|c| (c.id, c.name.as_str()))
            .chain(self.demand_charges.iter().map(|c| (c.id, c.name.as_str())))
            .chain(self.customer_charges.iter().map(|c| (c.id, c.name.as_str())))
            .find(|(cid, _)| *cid == id)
            .map(|(_, name)| name)
    }
}

fn check_unique_names<'a>(
    family: &str,
    tariff: &str,
    names: impl Iterator<Item = &'a str>,
) -> Result<()> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(BillingError::InputValidation(format!(
                "duplicate {family} name '{name}' in tariff '{tariff}'"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn equal_nonzero_period_endpoints_rejected() {
        let res = ApplicabilityRule::new(t(16, 0), t(16, 0), None, true, true, true);
        assert!(matches!(res, Err(BillingError::InputValidation(_))));
    }

    #[test]
    fn midnight_to_midnight_is_all_day() {
        let rule = ApplicabilityRule::new(t(0, 0), t(0, 0), None, true, true, true).unwrap();
        assert!(rule.all_day());
    }

    #[test]
    fn inverted_period_rejected() {
        let res = ApplicabilityRule::new(t(21, 0), t(16, 0), None, true, true, true);
        assert!(matches!(res, Err(BillingError::InputValidation(_))));
    }

    #[test]
    fn wrap_year_window_contains_both_ends_of_winter() {
        let window = SeasonWindow {
            start: MonthDay::new(10, 1).unwrap(),
            end: MonthDay::new(5, 31).unwrap(),
        };
        assert!(window.contains(MonthDay::new(12, 31).unwrap()));
        assert!(window.contains(MonthDay::new(1, 1).unwrap()));
        assert!(window.contains(MonthDay::new(11, 15).unwrap()));
        assert!(window.contains(MonthDay::new(3, 15).unwrap()));
        assert!(!window.contains(MonthDay::new(7, 15).unwrap()));
    }

    #[test]
    fn month_day_rejects_invalid_dates() {
        assert!(MonthDay::new(2, 30).is_err());
        assert!(MonthDay::new(2, 29).is_ok());
        assert!(MonthDay::new(13, 1).is_err());
        assert!(MonthDay::new(4, 31).is_err());
    }

    #[test]
    fn rates_round_to_five_decimals() {
        let charge = EnergyCharge::new(
            "peak",
            Decimal::from_str("0.123456789").unwrap(),
            Vec::new(),
        )
        .unwrap();
        assert_eq!(charge.rate_usd_per_kwh, Decimal::from_str("0.12346").unwrap());
    }

    #[test]
    fn negative_rate_rejected() {
        let res = EnergyCharge::new("bad", Decimal::from_str("-0.1").unwrap(), Vec::new());
        assert!(matches!(res, Err(BillingError::InputValidation(_))));
    }

    #[test]
    fn tariff_requires_a_charge() {
        let res = Tariff::new("PG&E", "Empty", Vec::new(), Vec::new(), Vec::new());
        assert!(matches!(res, Err(BillingError::InputValidation(_))));
    }

    #[test]
    fn tariff_rejects_duplicate_names_within_family() {
        let a = EnergyCharge::new("Peak", Decimal::ONE, Vec::new()).unwrap();
        let b = EnergyCharge::new("Peak", Decimal::TWO, Vec::new()).unwrap();
        let res = Tariff::new("PG&E", "B-19", vec![a, b], Vec::new(), Vec::new());
        assert!(matches!(res, Err(BillingError::InputValidation(_))));
    }
}
