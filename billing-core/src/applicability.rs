//! Per-rule applicability masks over the interval grid.
//!
//! Each rule evaluates to a packed bitmask; a charge's effective mask is
//! the bitwise OR of its rules. All predicates read the projected local
//! wall clock, never UTC.

use crate::domain::{ApplicabilityRule, MonthDay};
use crate::grid::{DayClass, TimeGrid};

/// Packed boolean vector, one bit per grid interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmask {
    words: Vec<u64>,
    len: usize,
}

impl Bitmask {
    pub fn zeros(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(64)],
            len,
        }
    }

    pub fn ones(len: usize) -> Self {
        let mut mask = Self {
            words: vec![u64::MAX; len.div_ceil(64)],
            len,
        };
        mask.clear_tail();
        mask
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn set(&mut self, i: usize) {
        debug_assert!(i < self.len);
        self.words[i / 64] |= 1 << (i % 64);
    }

    pub fn get(&self, i: usize) -> bool {
        debug_assert!(i < self.len);
        self.words[i / 64] >> (i % 64) & 1 == 1
    }

    pub fn or_assign(&mut self, other: &Bitmask) {
        debug_assert_eq!(self.len, other.len);
        for (w, o) in self.words.iter_mut().zip(&other.words) {
            *w |= o;
        }
    }

    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    fn clear_tail(&mut self) {
        let tail = self.len % 64;
        if tail != 0 {
            if let Some(last) = self.words.last_mut() {
                *last &= (1u64 << tail) - 1;
            }
        }
    }
}

/// Evaluate one rule against every grid interval.
pub fn rule_mask(grid: &TimeGrid, rule: &ApplicabilityRule) -> Bitmask {
    let mut mask = Bitmask::zeros(grid.len());
    for i in 0..grid.len() {
        if interval_matches(grid, rule, i) {
            mask.set(i);
        }
    }
    mask
}

/// Effective mask for a charge: OR over its rules, all-ones when it
/// declares none.
pub fn charge_mask(grid: &TimeGrid, rules: &[ApplicabilityRule]) -> Bitmask {
    if rules.is_empty() {
        return Bitmask::ones(grid.len());
    }
    let mut mask = Bitmask::zeros(grid.len());
    for rule in rules {
        mask.or_assign(&rule_mask(grid, rule));
    }
    mask
}

fn interval_matches(grid: &TimeGrid, rule: &ApplicabilityRule, i: usize) -> bool {
    let class_ok = match grid.day_class(i) {
        DayClass::Weekday => rule.weekdays,
        DayClass::Weekend => rule.weekends,
        DayClass::Holiday => rule.holidays,
    };
    if !class_ok {
        return false;
    }

    if !rule.all_day() {
        let t = grid.local_time(i);
        if t < rule.period_start_local || t >= rule.period_end_local {
            return false;
        }
    }

    match rule.season {
        Some(window) => window.contains(MonthDay::from_date(grid.local_date(i))),
        None => true,
    }
}
