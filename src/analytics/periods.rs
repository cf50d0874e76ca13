//! Calendar-aware period resolution
//!
//! Turns "this month", "last quarter", "week over week" and friends into concrete
//! inclusive date ranges relative to a given day.

use chrono::{Datelike, Duration, Months, NaiveDate};
use std::str::FromStr;

use crate::error::FinanceError;
use crate::models::DateRange;

fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
    // Callers only pass day 1 or Dec 31 with month 1..=12.
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(NaiveDate::MIN)
}

pub fn first_of_month(day: NaiveDate) -> NaiveDate {
    ymd(day.year(), day.month(), 1)
}

pub fn first_of_quarter(day: NaiveDate) -> NaiveDate {
    let start_month = ((day.month() - 1) / 3) * 3 + 1;
    ymd(day.year(), start_month, 1)
}

/// Monday of the ISO week containing `day`.
pub fn monday_of_week(day: NaiveDate) -> NaiveDate {
    day - Duration::days(day.weekday().num_days_from_monday() as i64)
}

/// First of the month through `today`.
pub fn month_to_date(today: NaiveDate) -> DateRange {
    DateRange {
        from: first_of_month(today),
        to: today,
    }
}

fn previous_month(today: NaiveDate) -> DateRange {
    let last = first_of_month(today) - Duration::days(1);
    DateRange {
        from: first_of_month(last),
        to: last,
    }
}

fn previous_quarter(today: NaiveDate) -> DateRange {
    let last = first_of_quarter(today) - Duration::days(1);
    DateRange {
        from: first_of_quarter(last),
        to: last,
    }
}

//
// ================= Date presets =================
//

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatePreset {
    ThisMonth,
    LastMonth,
    ThisQuarter,
    LastQuarter,
    ThisYear,
    LastYear,
}

impl DatePreset {
    pub fn resolve(self, today: NaiveDate) -> DateRange {
        match self {
            DatePreset::ThisMonth => month_to_date(today),
            DatePreset::LastMonth => previous_month(today),
            DatePreset::ThisQuarter => DateRange {
                from: first_of_quarter(today),
                to: today,
            },
            DatePreset::LastQuarter => previous_quarter(today),
            DatePreset::ThisYear => DateRange {
                from: ymd(today.year(), 1, 1),
                to: today,
            },
            DatePreset::LastYear => DateRange {
                from: ymd(today.year() - 1, 1, 1),
                to: ymd(today.year() - 1, 12, 31),
            },
        }
    }
}

impl FromStr for DatePreset {
    type Err = FinanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "thisMonth" => Ok(DatePreset::ThisMonth),
            "lastMonth" => Ok(DatePreset::LastMonth),
            "thisQuarter" => Ok(DatePreset::ThisQuarter),
            "lastQuarter" => Ok(DatePreset::LastQuarter),
            "thisYear" => Ok(DatePreset::ThisYear),
            "lastYear" => Ok(DatePreset::LastYear),
            other => Err(FinanceError::Validation(format!("unknown date range preset: {}", other))),
        }
    }
}

//
// ================= Trailing windows =================
//

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    Days7,
    Days30,
    Days60,
    Days90,
}

impl Window {
    pub fn days(self) -> i64 {
        match self {
            Window::Days7 => 7,
            Window::Days30 => 30,
            Window::Days60 => 60,
            Window::Days90 => 90,
        }
    }

    pub fn resolve(self, today: NaiveDate) -> DateRange {
        DateRange {
            from: today - Duration::days(self.days()),
            to: today,
        }
    }
}

impl FromStr for Window {
    type Err = FinanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "7day" => Ok(Window::Days7),
            "30day" => Ok(Window::Days30),
            "60day" => Ok(Window::Days60),
            "90day" => Ok(Window::Days90),
            other => Err(FinanceError::Validation(format!("unknown window: {}", other))),
        }
    }
}

//
// ================= Comparison presets =================
//

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonPreset {
    MonthOverMonth,
    WeekOverWeek,
    QuarterOverQuarter,
    YearOverYear,
}

impl ComparisonPreset {
    /// Returns `(current, previous)`. Current periods always end today.
    pub fn resolve(self, today: NaiveDate) -> (DateRange, DateRange) {
        match self {
            ComparisonPreset::MonthOverMonth => (month_to_date(today), previous_month(today)),
            ComparisonPreset::WeekOverWeek => {
                let monday = monday_of_week(today);
                (
                    DateRange { from: monday, to: today },
                    DateRange {
                        from: monday - Duration::days(7),
                        to: monday - Duration::days(1),
                    },
                )
            }
            ComparisonPreset::QuarterOverQuarter => (
                DateRange {
                    from: first_of_quarter(today),
                    to: today,
                },
                previous_quarter(today),
            ),
            ComparisonPreset::YearOverYear => {
                // Feb 29 maps to Feb 28 of the previous year.
                let same_day_last_year = today
                    .checked_sub_months(Months::new(12))
                    .unwrap_or(today - Duration::days(365));
                (
                    DateRange {
                        from: ymd(today.year(), 1, 1),
                        to: today,
                    },
                    DateRange {
                        from: ymd(today.year() - 1, 1, 1),
                        to: same_day_last_year,
                    },
                )
            }
        }
    }
}

impl FromStr for ComparisonPreset {
    type Err = FinanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monthOverMonth" => Ok(ComparisonPreset::MonthOverMonth),
            "weekOverWeek" => Ok(ComparisonPreset::WeekOverWeek),
            "quarterOverQuarter" => Ok(ComparisonPreset::QuarterOverQuarter),
            "yearOverYear" => Ok(ComparisonPreset::YearOverYear),
            other => Err(FinanceError::Validation(format!("unknown period preset: {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_month_to_date() {
        let range = month_to_date(d(2025, 2, 15));
        assert_eq!(range.from, d(2025, 2, 1));
        assert_eq!(range.to, d(2025, 2, 15));
    }

    #[test]
    fn test_last_month_crosses_year() {
        let range = DatePreset::LastMonth.resolve(d(2025, 1, 10));
        assert_eq!(range.from, d(2024, 12, 1));
        assert_eq!(range.to, d(2024, 12, 31));
    }

    #[test]
    fn test_quarters() {
        let today = d(2025, 5, 20);
        assert_eq!(DatePreset::ThisQuarter.resolve(today).from, d(2025, 4, 1));
        let last = DatePreset::LastQuarter.resolve(today);
        assert_eq!(last.from, d(2025, 1, 1));
        assert_eq!(last.to, d(2025, 3, 31));

        let last = DatePreset::LastQuarter.resolve(d(2025, 2, 1));
        assert_eq!(last.from, d(2024, 10, 1));
        assert_eq!(last.to, d(2024, 12, 31));
    }

    #[test]
    fn test_week_over_week_starts_monday() {
        // 2025-02-13 is a Thursday
        let (current, previous) = ComparisonPreset::WeekOverWeek.resolve(d(2025, 2, 13));
        assert_eq!(current.from, d(2025, 2, 10));
        assert_eq!(previous.from, d(2025, 2, 3));
        assert_eq!(previous.to, d(2025, 2, 9));

        // Sunday belongs to the week that started the previous Monday
        assert_eq!(monday_of_week(d(2025, 2, 16)), d(2025, 2, 10));
    }

    #[test]
    fn test_year_over_year_leap_day() {
        let (current, previous) = ComparisonPreset::YearOverYear.resolve(d(2024, 2, 29));
        assert_eq!(current.from, d(2024, 1, 1));
        assert_eq!(previous.from, d(2023, 1, 1));
        assert_eq!(previous.to, d(2023, 2, 28));
    }

    #[test]
    fn test_window_and_parse() {
        let window: Window = "30day".parse().unwrap();
        let range = window.resolve(d(2025, 3, 31));
        assert_eq!(range.from, d(2025, 3, 1));
        assert!("14day".parse::<Window>().is_err());
        assert!("lastDecade".parse::<DatePreset>().unwrap_err().is_validation());
        assert_eq!(
            "monthOverMonth".parse::<ComparisonPreset>().unwrap(),
            ComparisonPreset::MonthOverMonth
        );
    }
}
