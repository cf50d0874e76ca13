//! Recurring payment detection
//!
//! A merchant is recurring when the median gap between its distinct charge dates,
//! in whole days, falls in one of the frequency bands. Everything else is
//! irregular and dropped.

use chrono::NaiveDate;

use super::types::{Frequency, RecurringItem};

/// Amount spread (relative to the median) above which a charge is "variable".
const VARIABILITY_THRESHOLD: f64 = 0.10;

/// Median of a slice, averaging the two middle values for even lengths.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Band a median gap in whole days into a frequency.
pub fn classify_gap(median_gap: i64) -> Option<Frequency> {
    match median_gap {
        5..=9 => Some(Frequency::Weekly),
        10..=18 => Some(Frequency::Biweekly),
        25..=35 => Some(Frequency::Monthly),
        80..=100 => Some(Frequency::Quarterly),
        _ => None,
    }
}

impl Frequency {
    /// Normalize one charge of this cadence to an average monthly cost.
    pub fn monthly_equivalent(self, amount: f64) -> f64 {
        match self {
            Frequency::Weekly => amount * 4.33,
            Frequency::Biweekly => amount * 2.17,
            Frequency::Monthly => amount,
            Frequency::Quarterly => amount / 3.0,
        }
    }
}

pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Charges seen for one merchant inside the queried range.
#[derive(Debug, Clone, Default)]
pub struct MerchantCharges {
    pub currency: String,
    pub charges: Vec<(NaiveDate, f64)>,
}

impl MerchantCharges {
    pub fn push(&mut self, date: NaiveDate, amount: f64, currency: &str) {
        if self.currency.is_empty() && !currency.is_empty() {
            self.currency = currency.to_string();
        }
        self.charges.push((date, amount));
    }

    /// Day gaps between consecutive distinct dates, ascending by date.
    fn gaps(&self) -> Vec<f64> {
        let mut dates: Vec<NaiveDate> = self.charges.iter().map(|(date, _)| *date).collect();
        dates.sort();
        dates.dedup();
        dates
            .windows(2)
            .map(|pair| (pair[1] - pair[0]).num_days() as f64)
            .collect()
    }

    /// Median gap truncated to whole days. An even number of gaps can
    /// average to a half day, which would otherwise sit between two bands.
    fn median_gap(&self) -> Option<i64> {
        median(&self.gaps()).map(|gap| gap.floor() as i64)
    }

    /// Classify this merchant, or `None` when it is not recurring.
    pub fn detect(&self, merchant: &str) -> Option<RecurringItem> {
        if self.charges.len() < 2 {
            return None;
        }

        let frequency = classify_gap(self.median_gap()?)?;

        let amounts: Vec<f64> = self.charges.iter().map(|(_, amount)| *amount).collect();
        let typical = median(&amounts)?;
        let max = amounts.iter().copied().fold(f64::MIN, f64::max);
        let min = amounts.iter().copied().fold(f64::MAX, f64::min);
        let amount_is_variable = typical != 0.0 && (max - min) / typical.abs() > VARIABILITY_THRESHOLD;

        let last_date = self.charges.iter().map(|(date, _)| *date).max()?;

        Some(RecurringItem {
            merchant: merchant.to_string(),
            frequency,
            typical_amount: typical,
            amount_is_variable,
            currency: self.currency.clone(),
            occurrence_count: self.charges.len(),
            last_date,
            monthly_equivalent: round_cents(frequency.monthly_equivalent(typical)),
        })
    }
}
