//! Core data models: transactions, queries and date ranges

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::FinanceError;

/// Calendar dates travel as `YYYY-MM-DD` everywhere.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

//
// ================= Transaction =================
//

/// A synced bank transaction. Owned by storage; analytics only reads it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub transaction_id: String,
    pub bank_id: String,
    /// Merchant name
    pub name: String,
    pub amount: f64,
    pub currency: String,
    pub pending: bool,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorized_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pfc_primary: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pfc_detailed: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pfc_confidence: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pfc_icon_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//
// ================= Query =================
//

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrderField {
    #[default]
    Date,
    Amount,
    Name,
}

impl FromStr for OrderField {
    type Err = FinanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "date" => Ok(OrderField::Date),
            "amount" => Ok(OrderField::Amount),
            "name" | "merchant" => Ok(OrderField::Name),
            other => Err(FinanceError::Validation(format!("invalid orderBy: {}", other))),
        }
    }
}

/// Filter handed to a `TransactionSource`. Built once, passed by reference, never mutated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionQuery {
    pub pending: Option<bool>,
    /// Primary category (PFC primary)
    pub category: Option<String>,
    pub bank_id: Option<String>,
    /// Case-insensitive substring of the merchant name
    pub merchant: Option<String>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub order_by: Option<OrderField>,
    pub desc: bool,
    /// 0 = unbounded
    pub limit: usize,
}

impl TransactionQuery {
    pub fn within(range: &DateRange) -> Self {
        Self {
            date_from: Some(range.from),
            date_to: Some(range.to),
            ..Default::default()
        }
    }

    /// Whether a transaction passes every filter (ordering and limit aside).
    pub fn matches(&self, tx: &Transaction) -> bool {
        if let Some(pending) = self.pending {
            if tx.pending != pending {
                return false;
            }
        }
        if let Some(category) = &self.category {
            if &tx.pfc_primary != category {
                return false;
            }
        }
        if let Some(bank_id) = &self.bank_id {
            if &tx.bank_id != bank_id {
                return false;
            }
        }
        if let Some(merchant) = &self.merchant {
            if !tx.name.to_lowercase().contains(&merchant.to_lowercase()) {
                return false;
            }
        }
        if let Some(from) = self.date_from {
            if tx.date < from {
                return false;
            }
        }
        if let Some(to) = self.date_to {
            if tx.date > to {
                return false;
            }
        }
        true
    }
}

//
// ================= Date range =================
//

/// Inclusive calendar range, `from <= to` by construction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> crate::Result<Self> {
        if from > to {
            return Err(FinanceError::Validation(format!(
                "date range start {} is after end {}",
                from, to
            )));
        }
        Ok(Self { from, to })
    }

    pub fn parse(from: &str, to: &str) -> crate::Result<Self> {
        Self::new(parse_date(from)?, parse_date(to)?)
    }

    /// Inclusive day count, never below 1.
    pub fn days(&self) -> i64 {
        ((self.to - self.from).num_days() + 1).max(1)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.from, self.to)
    }
}

pub fn parse_date(value: &str) -> crate::Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|_| {
        FinanceError::Validation(format!("invalid date {:?}, expected YYYY-MM-DD", value))
    })
}
