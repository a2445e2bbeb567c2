//! Interval index for a billing computation.
//!
//! The grid steps uniformly in UTC between the resolved local midnights of
//! the request bounds and carries, column-oriented, everything downstream
//! passes need per interval: the projected local wall clock, the day class,
//! and the billing-month assignment. Local labels are projections of the
//! UTC instant, so a spring-forward skip produces no intervals for the
//! missing local hour and a fall-back repeat stays distinct by UTC time.

use std::collections::BTreeSet;

use chrono::{
    DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc,
    Weekday,
};
use chrono_tz::Tz;

use crate::calendar::{billing_month_of, BillingMonthKey};
use crate::error::{BillingError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayClass {
    Weekday,
    Weekend,
    Holiday,
}

#[derive(Debug, Clone)]
pub struct TimeGrid {
    tz: Tz,
    step: Duration,
    billing_day: u8,
    request_start: NaiveDate,
    request_end: NaiveDate,
    starts_utc: Vec<DateTime<Utc>>,
    local_starts: Vec<NaiveDateTime>,
    day_classes: Vec<DayClass>,
    month_keys: Vec<BillingMonthKey>,
}

impl TimeGrid {
    /// Build the ordered interval index covering `[start_date, end_date]`
    /// inclusive in the customer's local calendar.
    pub fn build(
        start_date: NaiveDate,
        end_date: NaiveDate,
        tz: Tz,
        step_minutes: u32,
        billing_day: u8,
        holidays: &BTreeSet<NaiveDate>,
    ) -> Result<Self> {
        if start_date > end_date {
            return Err(BillingError::InputValidation(format!(
                "request start {start_date} is after request end {end_date}"
            )));
        }
        if step_minutes == 0 || 1440 % step_minutes != 0 {
            return Err(BillingError::InputValidation(format!(
                "interval step must divide 24h evenly (got {step_minutes} minutes)"
            )));
        }
        let step = Duration::minutes(i64::from(step_minutes));

        let midnight = NaiveTime::from_hms_opt(0, 0, 0).expect("midnight is a valid time");
        let first = first_instant_at_or_after(tz, start_date.and_time(midnight))?;
        let end_exclusive = end_date.succ_opt().ok_or_else(|| {
            BillingError::InputValidation(format!("request end {end_date} is out of range"))
        })?;
        let last = first_instant_at_or_after(tz, end_exclusive.and_time(midnight))?;

        let start_utc = first.with_timezone(&Utc);
        let end_utc = last.with_timezone(&Utc);

        let capacity = ((end_utc - start_utc).num_minutes() / step.num_minutes()).max(0) as usize;
        let mut starts_utc = Vec::with_capacity(capacity);
        let mut local_starts = Vec::with_capacity(capacity);
        let mut day_classes = Vec::with_capacity(capacity);
        let mut month_keys = Vec::with_capacity(capacity);

        let mut t = start_utc;
        while t < end_utc {
            let local = t.with_timezone(&tz).naive_local();
            let date = local.date();
            let class = if holidays.contains(&date) {
                DayClass::Holiday
            } else if matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
                DayClass::Weekend
            } else {
                DayClass::Weekday
            };
            starts_utc.push(t);
            local_starts.push(local);
            day_classes.push(class);
            month_keys.push(billing_month_of(date, billing_day));
            t += step;
        }

        tracing::debug!(
            intervals = starts_utc.len(),
            %start_date,
            %end_date,
            tz = %tz,
            "built interval grid"
        );

        Ok(Self {
            tz,
            step,
            billing_day,
            request_start: start_date,
            request_end: end_date,
            starts_utc,
            local_starts,
            day_classes,
            month_keys,
        })
    }

    pub fn len(&self) -> usize {
        self.starts_utc.len()
    }

    pub fn is_empty(&self) -> bool {
        self.starts_utc.is_empty()
    }

    pub fn step(&self) -> Duration {
        self.step
    }

    pub fn billing_day(&self) -> u8 {
        self.billing_day
    }

    pub fn request_start(&self) -> NaiveDate {
        self.request_start
    }

    pub fn request_end(&self) -> NaiveDate {
        self.request_end
    }

    pub fn utc_start(&self, i: usize) -> DateTime<Utc> {
        self.starts_utc[i]
    }

    pub fn utc_end(&self, i: usize) -> DateTime<Utc> {
        self.starts_utc[i] + self.step
    }

    pub fn starts_utc(&self) -> &[DateTime<Utc>] {
        &self.starts_utc
    }

    /// Projected local wall clock of the interval start, under the tz rules
    /// in force at that UTC instant.
    pub fn local_start(&self, i: usize) -> NaiveDateTime {
        self.local_starts[i]
    }

    pub fn local_date(&self, i: usize) -> NaiveDate {
        self.local_starts[i].date()
    }

    pub fn local_time(&self, i: usize) -> NaiveTime {
        self.local_starts[i].time()
    }

    pub fn day_class(&self, i: usize) -> DayClass {
        self.day_classes[i]
    }

    pub fn month_key(&self, i: usize) -> BillingMonthKey {
        self.month_keys[i]
    }

    /// Grid slot holding the given UTC instant as its start, if any.
    pub fn index_of(&self, utc: DateTime<Utc>) -> Option<usize> {
        let first = *self.starts_utc.first()?;
        let delta = (utc - first).num_seconds();
        let step = self.step.num_seconds();
        if delta < 0 || delta % step != 0 {
            return None;
        }
        let idx = (delta / step) as usize;
        (idx < self.starts_utc.len()).then_some(idx)
    }

    /// Whether `utc` falls inside the grid's half-open UTC span, regardless
    /// of slot alignment.
    pub fn covers(&self, utc: DateTime<Utc>) -> bool {
        match (self.starts_utc.first(), self.starts_utc.last()) {
            (Some(first), Some(last)) => utc >= *first && utc < *last + self.step,
            _ => false,
        }
    }

    /// Distinct billing months in grid order, each with its contiguous
    /// index range. Month keys are nondecreasing along the grid, so one
    /// range per key suffices.
    pub fn month_ranges(&self) -> Vec<(BillingMonthKey, std::ops::Range<usize>)> {
        contiguous_ranges(&self.month_keys)
    }

    /// Local calendar days in grid order with their contiguous index
    /// ranges.
    pub fn day_ranges(&self) -> Vec<(NaiveDate, std::ops::Range<usize>)> {
        let dates: Vec<NaiveDate> = self.local_starts.iter().map(|l| l.date()).collect();
        contiguous_ranges(&dates)
    }

    /// Interval count of the complete local day, DST-aware (23h, 24h, or
    /// 25h of slots depending on the date).
    pub fn intervals_in_full_local_day(&self, date: NaiveDate) -> Result<u64> {
        let midnight = NaiveTime::from_hms_opt(0, 0, 0).expect("midnight is a valid time");
        let start = first_instant_at_or_after(self.tz, date.and_time(midnight))?;
        let next = date.succ_opt().ok_or_else(|| {
            BillingError::InputValidation(format!("date {date} is out of range"))
        })?;
        let end = first_instant_at_or_after(self.tz, next.and_time(midnight))?;
        let seconds = (end.with_timezone(&Utc) - start.with_timezone(&Utc)).num_seconds();
        Ok((seconds / self.step.num_seconds()) as u64)
    }
}

fn contiguous_ranges<K: Copy + PartialEq>(keys: &[K]) -> Vec<(K, std::ops::Range<usize>)> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < keys.len() {
        let key = keys[i];
        let mut j = i + 1;
        while j < keys.len() && keys[j] == key {
            j += 1;
        }
        out.push((key, i..j));
        i = j;
    }
    out
}

/// Earliest valid instant whose local wall clock is at or after `naive`.
/// Ambiguous times (fall-back) take the earlier offset; skipped times
/// (spring-forward) advance to the first time that exists again.
fn first_instant_at_or_after(tz: Tz, naive: NaiveDateTime) -> Result<DateTime<Tz>> {
    let mut probe = naive;
    // A DST gap is at most a couple of hours; 26h of 15-minute probes is
    // far beyond any real zone transition.
    for _ in 0..(26 * 4) {
        match tz.from_local_datetime(&probe) {
            LocalResult::Single(dt) => return Ok(dt),
            LocalResult::Ambiguous(earliest, _) => return Ok(earliest),
            LocalResult::None => probe += Duration::minutes(15),
        }
    }
    Err(BillingError::InputValidation(format!(
        "local time {naive} cannot be resolved in zone {tz}"
    )))
}
