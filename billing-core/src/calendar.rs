//! Billing-month calendar math.
//!
//! The billing month ending on day `d` runs from the day after the previous
//! month's closing day through day `d` inclusive (clamped to short months).
//! Both grid labelling and scope accounting go through these helpers so the
//! two can never disagree.

use chrono::{Datelike, NaiveDate};

/// Identifies a billing month by the calendar (year, month) of its closing
/// day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BillingMonthKey {
    pub year: i32,
    pub month: u32,
}

impl BillingMonthKey {
    pub fn new(year: i32, month: u32) -> Self {
        Self { year, month }
    }

    fn prev(self) -> Self {
        if self.month == 1 {
            Self::new(self.year - 1, 12)
        } else {
            Self::new(self.year, self.month - 1)
        }
    }

    fn next(self) -> Self {
        if self.month == 12 {
            Self::new(self.year + 1, 1)
        } else {
            Self::new(self.year, self.month + 1)
        }
    }
}

impl std::fmt::Display for BillingMonthKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    let first = NaiveDate::from_ymd_opt(year, month, 1).expect("valid first of month");
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .expect("valid first of next month");
    (next - first).num_days() as u32
}

/// Day on which the billing month of (year, month) closes, clamping
/// `billing_day` into short months.
pub fn closing_day(year: i32, month: u32, billing_day: u8) -> u32 {
    u32::from(billing_day).min(days_in_month(year, month))
}

/// Billing month containing the given local date.
pub fn billing_month_of(local_date: NaiveDate, billing_day: u8) -> BillingMonthKey {
    let key = BillingMonthKey::new(local_date.year(), local_date.month());
    if local_date.day() <= closing_day(key.year, key.month, billing_day) {
        key
    } else {
        key.next()
    }
}

/// Inclusive local date span of a billing month.
pub fn month_span(key: BillingMonthKey, billing_day: u8) -> (NaiveDate, NaiveDate) {
    let end = NaiveDate::from_ymd_opt(key.year, key.month, closing_day(key.year, key.month, billing_day))
        .expect("closing day is valid for its month");
    let prev = key.prev();
    let prev_close =
        NaiveDate::from_ymd_opt(prev.year, prev.month, closing_day(prev.year, prev.month, billing_day))
            .expect("closing day is valid for its month");
    let start = prev_close.succ_opt().expect("date after closing day");
    (start, end)
}

/// Number of days in an inclusive date span.
pub fn span_days(start: NaiveDate, end: NaiveDate) -> i64 {
    (end - start).num_days() + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn billing_day_15_boundary() {
        assert_eq!(
            billing_month_of(d(2024, 2, 15), 15),
            BillingMonthKey::new(2024, 2)
        );
        assert_eq!(
            billing_month_of(d(2024, 2, 16), 15),
            BillingMonthKey::new(2024, 3)
        );
    }

    #[test]
    fn month_span_crosses_calendar_months() {
        let (start, end) = month_span(BillingMonthKey::new(2024, 3), 15);
        assert_eq!(start, d(2024, 2, 16));
        assert_eq!(end, d(2024, 3, 15));
        assert_eq!(span_days(start, end), 29);
    }

    #[test]
    fn short_months_clamp_the_closing_day() {
        // billing_day 31 closes February on the 29th in a leap year.
        assert_eq!(
            billing_month_of(d(2024, 2, 29), 31),
            BillingMonthKey::new(2024, 2)
        );
        let (start, end) = month_span(BillingMonthKey::new(2024, 2), 31);
        assert_eq!(start, d(2024, 2, 1));
        assert_eq!(end, d(2024, 2, 29));

        // March then reopens on the 1st.
        let (start, end) = month_span(BillingMonthKey::new(2024, 3), 31);
        assert_eq!(start, d(2024, 3, 1));
        assert_eq!(end, d(2024, 3, 31));
    }

    #[test]
    fn clamped_day_pushes_following_dates_forward() {
        // billing_day 30: March 31 falls after the close, so it opens April's month.
        assert_eq!(
            billing_month_of(d(2024, 3, 31), 30),
            BillingMonthKey::new(2024, 4)
        );
        let (start, end) = month_span(BillingMonthKey::new(2024, 4), 30);
        assert_eq!(start, d(2024, 3, 31));
        assert_eq!(end, d(2024, 4, 30));
    }

    #[test]
    fn year_wrap() {
        assert_eq!(
            billing_month_of(d(2023, 12, 20), 15),
            BillingMonthKey::new(2024, 1)
        );
        let (start, end) = month_span(BillingMonthKey::new(2024, 1), 15);
        assert_eq!(start, d(2023, 12, 16));
        assert_eq!(end, d(2024, 1, 15));
    }
}
