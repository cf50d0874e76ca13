//! Transaction source
//!
//! The only external boundary the analytics engine reads from. A source streams
//! matching transactions into a visitor; the first visitor error stops the stream
//! and is returned unchanged.

pub mod postgres;

pub use postgres::PgTransactionSource;

use crate::error::FinanceError;
use crate::models::{OrderField, Transaction, TransactionQuery};
use crate::Result;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Visitor invoked once per matching transaction.
pub type Visitor<'a> = &'a mut (dyn FnMut(&Transaction) -> Result<()> + Send);

#[async_trait::async_trait]
pub trait TransactionSource: Send + Sync {
    /// Stream every transaction of `user_id` matching `query` into `visit`.
    ///
    /// Order is date ascending unless the query says otherwise. Stops at the first
    /// error returned by `visit`. I/O errors of the source itself propagate as-is.
    async fn query(&self, user_id: &str, query: &TransactionQuery, visit: Visitor<'_>) -> Result<()>;
}

/// In-memory source for development, the demo binary and tests
pub struct InMemoryTransactionSource {
    by_user: Arc<RwLock<HashMap<String, Vec<Transaction>>>>,
}

impl InMemoryTransactionSource {
    pub fn new() -> Self {
        Self {
            by_user: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn insert(&self, user_id: &str, tx: Transaction) {
        let mut by_user = self.by_user.write().await;
        by_user.entry(user_id.to_string()).or_default().push(tx);
    }

    pub async fn extend(&self, user_id: &str, txs: impl IntoIterator<Item = Transaction>) {
        let mut by_user = self.by_user.write().await;
        by_user.entry(user_id.to_string()).or_default().extend(txs);
    }

    pub async fn count(&self, user_id: &str) -> usize {
        let by_user = self.by_user.read().await;
        by_user.get(user_id).map(Vec::len).unwrap_or(0)
    }

    /// Build from a JSON object mapping user ids to transaction arrays.
    pub fn from_json(raw: &str) -> Result<Self> {
        let by_user: HashMap<String, Vec<Transaction>> = serde_json::from_str(raw)?;
        Ok(Self {
            by_user: Arc::new(RwLock::new(by_user)),
        })
    }

    pub fn from_file(path: &str) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| FinanceError::ConfigError(format!("cannot read {}: {}", path, e)))?;
        Self::from_json(&raw)
    }
}

impl Default for InMemoryTransactionSource {
    fn default() -> Self {
        Self::new()
    }
}

fn compare(a: &Transaction, b: &Transaction, field: OrderField) -> Ordering {
    match field {
        OrderField::Date => a.date.cmp(&b.date),
        OrderField::Amount => a.amount.total_cmp(&b.amount),
        OrderField::Name => a.name.cmp(&b.name),
    }
}

#[async_trait::async_trait]
impl TransactionSource for InMemoryTransactionSource {
    async fn query(&self, user_id: &str, query: &TransactionQuery, visit: Visitor<'_>) -> Result<()> {
        // Snapshot under the read lock; visiting happens without holding it.
        let mut matched: Vec<Transaction> = {
            let by_user = self.by_user.read().await;
            by_user
                .get(user_id)
                .map(|txs| txs.iter().filter(|tx| query.matches(tx)).cloned().collect())
                .unwrap_or_default()
        };

        let field = query.order_by.unwrap_or_default();
        matched.sort_by(|a, b| {
            let ord = compare(a, b, field);
            if query.desc {
                ord.reverse()
            } else {
                ord
            }
        });

        if query.limit > 0 {
            matched.truncate(query.limit);
        }

        debug!(user_id, matched = matched.len(), "in-memory transaction query");

        for tx in &matched {
            visit(tx)?;
        }

        Ok(())
    }
}
