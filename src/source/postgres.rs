//! Postgres-backed transaction source
//!
//! Reads the `transactions` table that bank sync writes to. Filters, ordering
//! and limit are pushed down into SQL; rows are visited in result order.

use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::{TransactionSource, Visitor};
use crate::error::FinanceError;
use crate::models::{OrderField, Transaction, TransactionQuery};
use crate::Result;

const COLUMNS: &str = "transaction_id, bank_id, name, amount, currency, pending, date, authorized_date, \
     pfc_primary, pfc_detailed, pfc_confidence, pfc_icon_url, created_at, updated_at";

pub struct PgTransactionSource {
    pool: PgPool,
    schema_ready: Arc<OnceCell<()>>,
}

fn db_error(context: &str) -> impl Fn(sqlx::Error) -> FinanceError + '_ {
    move |e| FinanceError::DatabaseError(format!("{}: {}", context, e))
}

fn order_column(field: OrderField) -> &'static str {
    match field {
        OrderField::Date => "date",
        OrderField::Amount => "amount",
        OrderField::Name => "name",
    }
}

/// `ILIKE` pattern matching `merchant` as a literal substring.
fn like_pattern(merchant: &str) -> String {
    let mut pattern = String::with_capacity(merchant.len() + 2);
    pattern.push('%');
    for c in merchant.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn select_query<'a>(user_id: &'a str, query: &'a TransactionQuery) -> QueryBuilder<'a, Postgres> {
    let mut sql = QueryBuilder::new(format!("SELECT {} FROM transactions WHERE user_id = ", COLUMNS));
    sql.push_bind(user_id);

    if let Some(pending) = query.pending {
        sql.push(" AND pending = ").push_bind(pending);
    }
    if let Some(category) = &query.category {
        sql.push(" AND pfc_primary = ").push_bind(category.as_str());
    }
    if let Some(bank_id) = &query.bank_id {
        sql.push(" AND bank_id = ").push_bind(bank_id.as_str());
    }
    if let Some(merchant) = &query.merchant {
        sql.push(" AND name ILIKE ").push_bind(like_pattern(merchant));
    }
    if let Some(from) = query.date_from {
        sql.push(" AND date >= ").push_bind(from);
    }
    if let Some(to) = query.date_to {
        sql.push(" AND date <= ").push_bind(to);
    }

    sql.push(" ORDER BY ")
        .push(order_column(query.order_by.unwrap_or_default()))
        .push(if query.desc { " DESC" } else { " ASC" })
        .push(", transaction_id ASC");

    if query.limit > 0 {
        sql.push(" LIMIT ").push_bind(query.limit as i64);
    }
    sql
}

fn transaction_from_row(row: &PgRow) -> std::result::Result<Transaction, sqlx::Error> {
    Ok(Transaction {
        transaction_id: row.try_get("transaction_id")?,
        bank_id: row.try_get("bank_id")?,
        name: row.try_get("name")?,
        amount: row.try_get("amount")?,
        currency: row.try_get("currency")?,
        pending: row.try_get("pending")?,
        date: row.try_get("date")?,
        authorized_date: row.try_get("authorized_date")?,
        pfc_primary: row.try_get("pfc_primary")?,
        pfc_detailed: row.try_get("pfc_detailed")?,
        pfc_confidence: row.try_get("pfc_confidence")?,
        pfc_icon_url: row.try_get("pfc_icon_url")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

impl PgTransactionSource {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            schema_ready: Arc::new(OnceCell::new()),
        }
    }

    /// Lazy pool; no connection is made until the first query.
    pub fn connect_lazy(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(url)
            .map_err(db_error("Invalid DATABASE_URL"))?;
        Ok(Self::new(pool))
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.schema_ready
            .get_or_try_init(|| async {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS transactions (
                      user_id TEXT NOT NULL,
                      transaction_id TEXT NOT NULL,
                      bank_id TEXT NOT NULL,
                      name TEXT NOT NULL,
                      amount DOUBLE PRECISION NOT NULL,
                      currency TEXT NOT NULL DEFAULT '',
                      pending BOOLEAN NOT NULL DEFAULT FALSE,
                      date DATE NOT NULL,
                      authorized_date DATE,
                      pfc_primary TEXT NOT NULL DEFAULT '',
                      pfc_detailed TEXT NOT NULL DEFAULT '',
                      pfc_confidence TEXT NOT NULL DEFAULT '',
                      pfc_icon_url TEXT NOT NULL DEFAULT '',
                      created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                      updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                      PRIMARY KEY (user_id, transaction_id)
                    );
                    "#,
                )
                .execute(&self.pool)
                .await?;

                sqlx::query(
                    r#"
                    CREATE INDEX IF NOT EXISTS idx_transactions_user_date
                    ON transactions (user_id, date);
                    "#,
                )
                .execute(&self.pool)
                .await?;

                info!("transactions schema ready");
                Ok::<(), sqlx::Error>(())
            })
            .await
            .map_err(db_error("Failed to initialize transactions schema"))?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl TransactionSource for PgTransactionSource {
    async fn query(&self, user_id: &str, query: &TransactionQuery, visit: Visitor<'_>) -> Result<()> {
        self.ensure_schema().await?;

        let mut sql = select_query(user_id, query);
        let rows = sql
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("Failed to query transactions"))?;

        debug!(user_id, matched = rows.len(), "postgres transaction query");

        for row in &rows {
            let tx = transaction_from_row(row).map_err(db_error("Failed to decode transaction"))?;
            visit(&tx)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DateRange;

    #[test]
    fn test_unfiltered_query_orders_by_date() {
        let query = TransactionQuery::default();
        let sql = select_query("user", &query);
        assert_eq!(
            sql.sql(),
            format!(
                "SELECT {} FROM transactions WHERE user_id = $1 ORDER BY date ASC, transaction_id ASC",
                COLUMNS
            )
        );
    }

    #[test]
    fn test_every_filter_is_bound() {
        let range = DateRange::parse("2025-02-01", "2025-02-28").unwrap();
        let query = TransactionQuery {
            pending: Some(false),
            category: Some("FOOD_AND_DRINK".into()),
            bank_id: Some("bank-1".into()),
            merchant: Some("coffee".into()),
            order_by: Some(OrderField::Amount),
            desc: true,
            limit: 10,
            ..TransactionQuery::within(&range)
        };
        let sql = select_query("user", &query);
        let text = sql.sql();
        assert!(text.ends_with(
            "WHERE user_id = $1 AND pending = $2 AND pfc_primary = $3 AND bank_id = $4 \
             AND name ILIKE $5 AND date >= $6 AND date <= $7 \
             ORDER BY amount DESC, transaction_id ASC LIMIT $8"
        ));
        assert!(!text.contains("coffee"));
    }

    #[test]
    fn test_zero_limit_is_unbounded() {
        let query = TransactionQuery {
            order_by: Some(OrderField::Name),
            ..Default::default()
        };
        let sql = select_query("user", &query);
        assert!(sql.sql().ends_with("ORDER BY name ASC, transaction_id ASC"));
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("Coffee"), "%Coffee%");
        assert_eq!(like_pattern("100%_off\\"), "%100\\%\\_off\\\\%");
    }
}
