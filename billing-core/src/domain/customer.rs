use chrono_tz::Tz;

use crate::error::{BillingError, Result};

/// Billing parameters of a single customer.
///
/// `billing_day` is the last day included in a billing month: the month
/// closes at the end of that local day and the next one opens at the
/// following local midnight. Months shorter than `billing_day` close on
/// their last calendar day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerProfile {
    pub timezone: String,
    pub billing_interval_minutes: u32,
    pub billing_day: u8,
}

impl CustomerProfile {
    pub const DEFAULT_INTERVAL_MINUTES: u32 = 5;

    pub fn new(
        timezone: impl Into<String>,
        billing_interval_minutes: u32,
        billing_day: u8,
    ) -> Result<Self> {
        if !(1..=31).contains(&billing_day) {
            return Err(BillingError::InputValidation(format!(
                "billing_day must be between 1 and 31 (got {billing_day})"
            )));
        }
        if billing_interval_minutes == 0
            || 60 % billing_interval_minutes != 0
            || 1440 % billing_interval_minutes != 0
        {
            return Err(BillingError::InputValidation(format!(
                "billing_interval_minutes must divide both 60 and 1440 evenly (got {billing_interval_minutes})"
            )));
        }
        Ok(Self {
            timezone: timezone.into(),
            billing_interval_minutes,
            billing_day,
        })
    }

    /// Resolve the IANA zone id against the tz database.
    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| BillingError::ZoneUnknown(self.timezone.clone()))
    }

    pub fn step(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.billing_interval_minutes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_standard_cadences() {
        for minutes in [5, 15, 30, 60] {
            assert!(CustomerProfile::new("UTC", minutes, 31).is_ok());
        }
    }

    #[test]
    fn rejects_cadence_not_dividing_an_hour() {
        let res = CustomerProfile::new("UTC", 7, 31);
        assert!(matches!(res, Err(BillingError::InputValidation(_))));
    }

    #[test]
    fn rejects_billing_day_out_of_range() {
        assert!(CustomerProfile::new("UTC", 5, 0).is_err());
        assert!(CustomerProfile::new("UTC", 5, 32).is_err());
    }

    #[test]
    fn unknown_zone_surfaces_as_zone_error() {
        let profile = CustomerProfile::new("Mars/Olympus_Mons", 5, 15).unwrap();
        assert!(matches!(profile.tz(), Err(BillingError::ZoneUnknown(_))));
    }
}
