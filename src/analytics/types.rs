//! Argument and result types of the analytics operations
//!
//! Results serialize to the camelCase JSON objects handed back to the language
//! model and the dashboard.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::FinanceError;
use crate::models::{DateRange, OrderField, Transaction};

//
// ================= Enums =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum GroupBy {
    #[serde(alias = "pfcPrimary")]
    Category,
    Merchant,
    Day,
}

impl FromStr for GroupBy {
    type Err = FinanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "category" | "pfcPrimary" => Ok(GroupBy::Category),
            "merchant" => Ok(GroupBy::Merchant),
            "day" => Ok(GroupBy::Day),
            other => Err(FinanceError::UnsupportedGroupBy(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    #[default]
    Day,
    Week,
    Month,
}

impl FromStr for Granularity {
    type Err = FinanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day" => Ok(Granularity::Day),
            "week" => Ok(Granularity::Week),
            "month" => Ok(Granularity::Month),
            other => Err(FinanceError::Validation(format!("unsupported granularity: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    #[default]
    Overall,
    Category,
    Merchant,
}

impl FromStr for Scope {
    type Err = FinanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "overall" => Ok(Scope::Overall),
            "category" => Ok(Scope::Category),
            "merchant" => Ok(Scope::Merchant),
            other => Err(FinanceError::Validation(format!("unsupported scope: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Merchant,
    Category,
}

impl FromStr for Dimension {
    type Err = FinanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "merchant" => Ok(Dimension::Merchant),
            "category" => Ok(Dimension::Category),
            other => Err(FinanceError::Validation(format!("unsupported dimension: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Top,
    Bottom,
}

impl FromStr for Direction {
    type Err = FinanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "top" => Ok(Direction::Top),
            "bottom" => Ok(Direction::Bottom),
            other => Err(FinanceError::Validation(format!("unsupported direction: {}", other))),
        }
    }
}

/// Recurring frequency band
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Weekly,
    Biweekly,
    Monthly,
    Quarterly,
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Frequency::Weekly => "weekly",
            Frequency::Biweekly => "biweekly",
            Frequency::Monthly => "monthly",
            Frequency::Quarterly => "quarterly",
        };
        write!(f, "{}", s)
    }
}

//
// ================= Arguments =================
//

/// Filters shared by total, breakdown and transaction listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpendFilters {
    pub pending: Option<bool>,
    pub category: Option<String>,
    pub bank_id: Option<String>,
    pub merchant: Option<String>,
    pub range: Option<DateRange>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionsArgs {
    pub filters: SpendFilters,
    pub order_by: Option<OrderField>,
    pub desc: bool,
    pub limit: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PeriodComparisonArgs {
    /// Filters applied to both periods; any range inside is ignored.
    pub filters: SpendFilters,
    pub current: DateRange,
    pub previous: DateRange,
    pub group_by: Option<GroupBy>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecurringArgs {
    pub range: DateRange,
    pub bank_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MovingAverageArgs {
    pub range: DateRange,
    pub granularity: Granularity,
    pub scope: Scope,
    pub category: Option<String>,
    pub merchant: Option<String>,
    pub bank_id: Option<String>,
    /// `None` includes pending charges
    pub pending: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TopNArgs {
    pub range: DateRange,
    pub dimension: Dimension,
    pub direction: Direction,
    /// 0 = no truncation
    pub limit: usize,
    pub min_count: usize,
    pub category: Option<String>,
    pub bank_id: Option<String>,
    pub pending: Option<bool>,
}

//
// ================= Results =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SpendTotalResult {
    pub total: f64,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BreakdownItem {
    pub key: String,
    pub total: f64,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SpendBreakdownResult {
    pub group_by: GroupBy,
    pub items: Vec<BreakdownItem>,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionsResult {
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PeriodSummary {
    pub total: f64,
    pub count: usize,
    pub currency: String,
    pub from: NaiveDate,
    pub to: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<BreakdownItem>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChangeItem {
    pub key: String,
    pub absolute_change: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentage_change: Option<f64>,
    pub count_change: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    pub absolute_change: f64,
    /// Absent when the previous total is zero.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentage_change: Option<f64>,
    pub count_change: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<ChangeItem>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PeriodComparisonResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_by: Option<GroupBy>,
    pub current: PeriodSummary,
    pub previous: PeriodSummary,
    pub change: Change,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecurringItem {
    pub merchant: String,
    pub frequency: Frequency,
    pub typical_amount: f64,
    pub amount_is_variable: bool,
    pub currency: String,
    pub occurrence_count: usize,
    pub last_date: NaiveDate,
    pub monthly_equivalent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecurringResult {
    pub items: Vec<RecurringItem>,
    pub total_monthly_equivalent: f64,
    pub currency: String,
    pub from: NaiveDate,
    pub to: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SeriesPoint {
    pub period: String,
    pub total: f64,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScopedSeries {
    pub key: String,
    pub total: f64,
    pub count: usize,
    pub average_per_unit: f64,
    pub series: Vec<SeriesPoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MovingAverageResult {
    pub granularity: Granularity,
    pub scope: Scope,
    pub average_per_unit: f64,
    pub total: f64,
    pub transaction_count: usize,
    pub days_analyzed: i64,
    pub currency: String,
    pub from: NaiveDate,
    pub to: NaiveDate,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub series: Vec<SeriesPoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<ScopedSeries>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TopNItem {
    pub key: String,
    pub total: f64,
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TopNResult {
    pub dimension: Dimension,
    pub direction: Direction,
    pub total_spend: f64,
    pub currency: String,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub items: Vec<TopNItem>,
}
