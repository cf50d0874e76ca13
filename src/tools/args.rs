//! Typed tool arguments
//!
//! Raw model arguments decode into one input struct per tool, then resolve into
//! engine arguments with defaults applied. Resolution is pure: it never mutates
//! the decoded input and takes "today" as a parameter.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::analytics::periods::{first_of_month, month_to_date};
use crate::analytics::{
    Dimension, Direction, GroupBy, MovingAverageArgs, PeriodComparisonArgs, RecurringArgs, SpendFilters, TopNArgs,
    TransactionsArgs,
};
use crate::error::FinanceError;
use crate::models::{parse_date, DateRange};
use crate::taxonomy;
use crate::Result;

pub const DEFAULT_TRANSACTIONS_LIMIT: usize = 25;
pub const DEFAULT_TOP_N_LIMIT: usize = 5;

/// Models tend to send `5.0` or `"5"` for integers; accept all of them.
fn lenient_count<'de, D>(deserializer: D) -> std::result::Result<Option<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let count = match value {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64)),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(None),
        Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
        Some(_) => None,
    };
    match count {
        Some(c) => Ok(Some(c as usize)),
        None => Err(serde::de::Error::custom("expected a non-negative integer")),
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn checked_category(value: &Option<String>) -> Result<Option<String>> {
    match non_empty(value) {
        Some(category) if !taxonomy::is_primary_allowed(&category) => {
            Err(FinanceError::Validation(format!("unsupported category: {}", category)))
        }
        other => Ok(other),
    }
}

fn parse_enum<T>(value: &Option<String>) -> Result<Option<T>>
where
    T: std::str::FromStr<Err = FinanceError>,
{
    non_empty(value).map(|v| v.parse::<T>()).transpose()
}

/// Both bounds absent: month to date. Only `from`: through today. Only `to`:
/// from the first of that month.
pub fn resolve_range(from: &Option<String>, to: &Option<String>, today: NaiveDate) -> Result<DateRange> {
    let from = non_empty(from).map(|v| parse_date(&v)).transpose()?;
    let to = non_empty(to).map(|v| parse_date(&v)).transpose()?;
    match (from, to) {
        (None, None) => Ok(month_to_date(today)),
        (Some(from), None) => DateRange::new(from, today),
        (None, Some(to)) => DateRange::new(first_of_month(to), to),
        (Some(from), Some(to)) => DateRange::new(from, to),
    }
}

fn required_range(
    from_field: &str,
    from: &Option<String>,
    to_field: &str,
    to: &Option<String>,
) -> Result<DateRange> {
    let from = non_empty(from).ok_or_else(|| FinanceError::InvalidToolInput(format!("{} is required", from_field)))?;
    let to = non_empty(to).ok_or_else(|| FinanceError::InvalidToolInput(format!("{} is required", to_field)))?;
    DateRange::parse(&from, &to)
}

//
// ================= Shared filters =================
//

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FilterArgs {
    pub pending: Option<bool>,
    #[serde(alias = "pfcPrimary")]
    pub category: Option<String>,
    pub bank_id: Option<String>,
    pub merchant: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
}

impl FilterArgs {
    /// Everything except the date range. `pending` defaults to false.
    pub fn resolve_common(&self) -> Result<SpendFilters> {
        Ok(SpendFilters {
            pending: Some(self.pending.unwrap_or(false)),
            category: checked_category(&self.category)?,
            bank_id: non_empty(&self.bank_id),
            merchant: non_empty(&self.merchant),
            range: None,
        })
    }

    pub fn resolve(&self, today: NaiveDate) -> Result<SpendFilters> {
        Ok(SpendFilters {
            range: Some(resolve_range(&self.date_from, &self.date_to, today)?),
            ..self.resolve_common()?
        })
    }
}

//
// ================= Per-tool inputs =================
//

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendTotalInput {
    #[serde(flatten)]
    pub filters: FilterArgs,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendBreakdownInput {
    #[serde(flatten)]
    pub filters: FilterArgs,
    pub group_by: Option<String>,
}

impl SpendBreakdownInput {
    /// Group-by is checked before the filters so an unknown bucket is reported first.
    pub fn resolve(&self, today: NaiveDate) -> Result<(SpendFilters, GroupBy)> {
        let group_by = parse_enum::<GroupBy>(&self.group_by)?
            .ok_or_else(|| FinanceError::InvalidToolInput("groupBy is required".to_string()))?;
        Ok((self.filters.resolve(today)?, group_by))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionsInput {
    #[serde(flatten)]
    pub filters: FilterArgs,
    pub order_by: Option<String>,
    pub desc: Option<bool>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub limit: Option<usize>,
}

impl TransactionsInput {
    pub fn resolve(&self, today: NaiveDate) -> Result<TransactionsArgs> {
        Ok(TransactionsArgs {
            filters: self.filters.resolve(today)?,
            order_by: parse_enum(&self.order_by)?,
            desc: self.desc.unwrap_or(false),
            limit: self
                .limit
                .filter(|l| *l > 0)
                .unwrap_or(DEFAULT_TRANSACTIONS_LIMIT),
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodComparisonInput {
    pub current_from: Option<String>,
    pub current_to: Option<String>,
    pub previous_from: Option<String>,
    pub previous_to: Option<String>,
    pub group_by: Option<String>,
    #[serde(flatten)]
    pub filters: FilterArgs,
}

impl PeriodComparisonInput {
    pub fn resolve(&self) -> Result<PeriodComparisonArgs> {
        let group_by = parse_enum::<GroupBy>(&self.group_by)?;
        let current = required_range("currentFrom", &self.current_from, "currentTo", &self.current_to)?;
        let previous = required_range("previousFrom", &self.previous_from, "previousTo", &self.previous_to)?;
        Ok(PeriodComparisonArgs {
            filters: self.filters.resolve_common()?,
            current,
            previous,
            group_by,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurringInput {
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub bank_id: Option<String>,
}

impl RecurringInput {
    pub fn resolve(&self) -> Result<RecurringArgs> {
        Ok(RecurringArgs {
            range: required_range("dateFrom", &self.date_from, "dateTo", &self.date_to)?,
            bank_id: non_empty(&self.bank_id),
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovingAverageInput {
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub granularity: Option<String>,
    pub scope: Option<String>,
    #[serde(alias = "pfcPrimary")]
    pub category: Option<String>,
    pub merchant: Option<String>,
    pub bank_id: Option<String>,
    pub pending: Option<bool>,
}

impl MovingAverageInput {
    pub fn resolve(&self) -> Result<MovingAverageArgs> {
        let granularity = parse_enum(&self.granularity)?.unwrap_or_default();
        let scope = parse_enum(&self.scope)?.unwrap_or_default();
        Ok(MovingAverageArgs {
            range: required_range("dateFrom", &self.date_from, "dateTo", &self.date_to)?,
            granularity,
            scope,
            category: checked_category(&self.category)?,
            merchant: non_empty(&self.merchant),
            bank_id: non_empty(&self.bank_id),
            pending: Some(self.pending.unwrap_or(false)),
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopNInput {
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub dimension: Option<String>,
    pub direction: Option<String>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub limit: Option<usize>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub min_count: Option<usize>,
    #[serde(alias = "pfcPrimary")]
    pub category: Option<String>,
    pub bank_id: Option<String>,
    pub pending: Option<bool>,
}

impl TopNInput {
    pub fn resolve(&self) -> Result<TopNArgs> {
        let dimension = parse_enum::<Dimension>(&self.dimension)?
            .ok_or_else(|| FinanceError::InvalidToolInput("dimension is required".to_string()))?;
        let direction = parse_enum::<Direction>(&self.direction)?.unwrap_or_default();
        Ok(TopNArgs {
            range: required_range("dateFrom", &self.date_from, "dateTo", &self.date_to)?,
            dimension,
            direction,
            limit: self.limit.filter(|l| *l > 0).unwrap_or(DEFAULT_TOP_N_LIMIT),
            min_count: self.min_count.unwrap_or(1),
            category: checked_category(&self.category)?,
            bank_id: non_empty(&self.bank_id),
            pending: Some(self.pending.unwrap_or(false)),
        })
    }
}
