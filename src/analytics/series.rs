//! Time-bucketed series for moving averages

use chrono::{Datelike, NaiveDate};
use std::collections::BTreeMap;

use super::types::{Granularity, SeriesPoint};

/// Bucket key of a date: `YYYY-MM-DD`, ISO `YYYY-Www`, or `YYYY-MM`.
pub fn period_key(date: NaiveDate, granularity: Granularity) -> String {
    match granularity {
        Granularity::Day => date.format("%Y-%m-%d").to_string(),
        Granularity::Week => {
            let week = date.iso_week();
            format!("{}-W{:02}", week.year(), week.week())
        }
        Granularity::Month => date.format("%Y-%m").to_string(),
    }
}

/// How many units of `granularity` a span of `days` covers (real-valued).
pub fn unit_count(days: i64, granularity: Granularity) -> f64 {
    let days = days.max(1) as f64;
    match granularity {
        Granularity::Day => days,
        Granularity::Week => days / 7.0,
        Granularity::Month => days / 30.0,
    }
}

/// Running total/count per period key; keys iterate in chronological order.
#[derive(Debug, Clone, Default)]
pub struct SeriesAccumulator {
    pub total: f64,
    pub count: usize,
    buckets: BTreeMap<String, (f64, usize)>,
}

impl SeriesAccumulator {
    pub fn add(&mut self, period: String, amount: f64) {
        self.total += amount;
        self.count += 1;
        let bucket = self.buckets.entry(period).or_insert((0.0, 0));
        bucket.0 += amount;
        bucket.1 += 1;
    }

    pub fn into_points(self) -> Vec<SeriesPoint> {
        self.buckets
            .into_iter()
            .map(|(period, (total, count))| SeriesPoint { period, total, count })
            .collect()
    }
}
