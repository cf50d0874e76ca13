//! Analytics query engine
//!
//! Stateless computations over a `TransactionSource`. Every operation builds a
//! `TransactionQuery`, streams matching transactions through an accumulator and
//! returns a result DTO. Nothing is retried; source errors propagate unchanged.
//!
//! Monetary aggregates carry a single currency label: the first non-empty
//! currency observed. Currencies are never converted or mixed.

pub mod periods;
pub mod recurring;
pub mod series;
pub mod types;

pub use types::*;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::debug;

use crate::error::FinanceError;
use crate::models::{DateRange, Transaction, TransactionQuery};
use crate::source::TransactionSource;
use crate::Result;
use recurring::{round_cents, MerchantCharges};
use series::{period_key, unit_count, SeriesAccumulator};

fn note_currency(currency: &mut String, tx: &Transaction) {
    if currency.is_empty() && !tx.currency.is_empty() {
        *currency = tx.currency.clone();
    }
}

/// `None` when the previous value is zero: there is no meaningful percentage.
pub fn percentage_change(current: f64, previous: f64) -> Option<f64> {
    if previous == 0.0 {
        None
    } else {
        Some((current - previous) / previous * 100.0)
    }
}

fn breakdown_key(tx: &Transaction, group_by: GroupBy) -> String {
    match group_by {
        GroupBy::Category => tx.pfc_primary.clone(),
        GroupBy::Merchant => tx.name.clone(),
        GroupBy::Day => tx.date.to_string(),
    }
}

fn base_query(filters: &SpendFilters) -> TransactionQuery {
    TransactionQuery {
        pending: filters.pending,
        category: filters.category.clone(),
        bank_id: filters.bank_id.clone(),
        merchant: filters.merchant.clone(),
        date_from: filters.range.map(|r| r.from),
        date_to: filters.range.map(|r| r.to),
        ..Default::default()
    }
}

/// Accumulator for one query period. Lives for a single aggregation call.
#[derive(Debug, Default)]
struct PeriodData {
    total: f64,
    count: usize,
    currency: String,
    groups: Option<HashMap<String, (f64, usize)>>,
}

impl PeriodData {
    fn grouped(group_by: Option<GroupBy>) -> Self {
        Self {
            groups: group_by.map(|_| HashMap::new()),
            ..Default::default()
        }
    }

    /// Totals see every transaction. When grouped, a transaction without a key
    /// joins no bucket and does not set the currency.
    fn observe(&mut self, tx: &Transaction, group_by: Option<GroupBy>) {
        self.total += tx.amount;
        self.count += 1;

        if let (Some(groups), Some(group_by)) = (self.groups.as_mut(), group_by) {
            let key = breakdown_key(tx, group_by);
            if key.is_empty() {
                return;
            }
            let bucket = groups.entry(key).or_insert((0.0, 0));
            bucket.0 += tx.amount;
            bucket.1 += 1;
        }
        note_currency(&mut self.currency, tx);
    }
}

/// Day buckets read best chronologically; everything else largest first.
fn sorted_items(groups: HashMap<String, (f64, usize)>, group_by: GroupBy) -> Vec<BreakdownItem> {
    let mut items: Vec<BreakdownItem> = groups
        .into_iter()
        .map(|(key, (total, count))| BreakdownItem { key, total, count })
        .collect();

    match group_by {
        GroupBy::Day => items.sort_by(|a, b| a.key.cmp(&b.key)),
        _ => items.sort_by(|a, b| b.total.total_cmp(&a.total).then_with(|| a.key.cmp(&b.key))),
    }
    items
}

/// One independent accumulation task of a period comparison.
async fn accumulate_period(
    source: Arc<dyn TransactionSource>,
    user_id: String,
    query: TransactionQuery,
    group_by: Option<GroupBy>,
) -> Result<PeriodData> {
    let mut data = PeriodData::grouped(group_by);
    source
        .query(&user_id, &query, &mut |tx: &Transaction| {
            data.observe(tx, group_by);
            Ok(())
        })
        .await?;
    Ok(data)
}

fn diff_items(current: &HashMap<String, (f64, usize)>, previous: &HashMap<String, (f64, usize)>) -> Vec<ChangeItem> {
    let keys: BTreeSet<&String> = current.keys().chain(previous.keys()).collect();
    keys.into_iter()
        .map(|key| {
            let (cur_total, cur_count) = current.get(key).copied().unwrap_or((0.0, 0));
            let (prev_total, prev_count) = previous.get(key).copied().unwrap_or((0.0, 0));
            ChangeItem {
                key: key.clone(),
                absolute_change: cur_total - prev_total,
                percentage_change: percentage_change(cur_total, prev_total),
                count_change: cur_count as i64 - prev_count as i64,
            }
        })
        .collect()
}

/// Deterministic analytics over a user's transactions. Holds no mutable state.
#[derive(Clone)]
pub struct AnalyticsEngine {
    source: Arc<dyn TransactionSource>,
}

impl AnalyticsEngine {
    pub fn new(source: Arc<dyn TransactionSource>) -> Self {
        Self { source }
    }

    /// Sum of amounts matching the filters.
    pub async fn spend_total(&self, user_id: &str, filters: &SpendFilters) -> Result<SpendTotalResult> {
        let query = base_query(filters);
        let mut data = PeriodData::default();
        self.source
            .query(user_id, &query, &mut |tx: &Transaction| {
                data.observe(tx, None);
                Ok(())
            })
            .await?;

        debug!(user_id, count = data.count, "spend total computed");

        Ok(SpendTotalResult {
            total: data.total,
            currency: data.currency,
            from: filters.range.map(|r| r.from),
            to: filters.range.map(|r| r.to),
        })
    }

    /// Totals bucketed by category, merchant or calendar day.
    pub async fn spend_breakdown(
        &self,
        user_id: &str,
        filters: &SpendFilters,
        group_by: GroupBy,
    ) -> Result<SpendBreakdownResult> {
        let query = base_query(filters);
        let mut data = PeriodData::grouped(Some(group_by));
        self.source
            .query(user_id, &query, &mut |tx: &Transaction| {
                data.observe(tx, Some(group_by));
                Ok(())
            })
            .await?;

        let items = sorted_items(data.groups.unwrap_or_default(), group_by);
        debug!(user_id, ?group_by, buckets = items.len(), "spend breakdown computed");

        Ok(SpendBreakdownResult {
            group_by,
            items,
            currency: data.currency,
            from: filters.range.map(|r| r.from),
            to: filters.range.map(|r| r.to),
        })
    }

    /// Filtered listing. Ordering and limit are delegated to the source.
    pub async fn transactions(&self, user_id: &str, args: &TransactionsArgs) -> Result<TransactionsResult> {
        let query = TransactionQuery {
            order_by: args.order_by,
            desc: args.desc,
            limit: args.limit,
            ..base_query(&args.filters)
        };

        let mut transactions = Vec::new();
        self.source
            .query(user_id, &query, &mut |tx: &Transaction| {
                transactions.push(tx.clone());
                Ok(())
            })
            .await?;

        Ok(TransactionsResult { transactions })
    }

    /// Current vs previous period. Both periods aggregate concurrently on their
    /// own tasks; the diff is computed once both have joined.
    pub async fn period_comparison(
        &self,
        user_id: &str,
        args: &PeriodComparisonArgs,
    ) -> Result<PeriodComparisonResult> {
        let common = TransactionQuery {
            date_from: None,
            date_to: None,
            ..base_query(&args.filters)
        };
        let current_query = TransactionQuery {
            date_from: Some(args.current.from),
            date_to: Some(args.current.to),
            ..common.clone()
        };
        let previous_query = TransactionQuery {
            date_from: Some(args.previous.from),
            date_to: Some(args.previous.to),
            ..common
        };

        let current = tokio::spawn(accumulate_period(
            self.source.clone(),
            user_id.to_string(),
            current_query,
            args.group_by,
        ));
        let previous = tokio::spawn(accumulate_period(
            self.source.clone(),
            user_id.to_string(),
            previous_query,
            args.group_by,
        ));

        let (current, previous) = tokio::join!(current, previous);
        let current = current.map_err(|e| FinanceError::TaskError(format!("current period: {}", e)))??;
        let previous = previous.map_err(|e| FinanceError::TaskError(format!("previous period: {}", e)))??;

        let items = match (&current.groups, &previous.groups) {
            (Some(cur), Some(prev)) => Some(diff_items(cur, prev)),
            _ => None,
        };

        let change = Change {
            absolute_change: current.total - previous.total,
            percentage_change: percentage_change(current.total, previous.total),
            count_change: current.count as i64 - previous.count as i64,
            items,
        };

        debug!(
            user_id,
            current = %args.current,
            previous = %args.previous,
            absolute_change = change.absolute_change,
            "period comparison computed"
        );

        let summarize = |data: PeriodData, range: DateRange| PeriodSummary {
            total: data.total,
            count: data.count,
            currency: data.currency,
            from: range.from,
            to: range.to,
            items: match (data.groups, args.group_by) {
                (Some(groups), Some(group_by)) => Some(sorted_items(groups, group_by)),
                _ => None,
            },
        };

        Ok(PeriodComparisonResult {
            group_by: args.group_by,
            current: summarize(current, args.current),
            previous: summarize(previous, args.previous),
            change,
        })
    }

    /// Merchants charging on a weekly, biweekly, monthly or quarterly cadence.
    /// Only posted (non-pending) transactions are considered.
    pub async fn recurring_transactions(&self, user_id: &str, args: &RecurringArgs) -> Result<RecurringResult> {
        let query = TransactionQuery {
            pending: Some(false),
            bank_id: args.bank_id.clone(),
            ..TransactionQuery::within(&args.range)
        };

        let mut merchants: HashMap<String, MerchantCharges> = HashMap::new();
        let mut currency = String::new();
        self.source
            .query(user_id, &query, &mut |tx: &Transaction| {
                note_currency(&mut currency, tx);
                if !tx.name.is_empty() {
                    merchants
                        .entry(tx.name.clone())
                        .or_default()
                        .push(tx.date, tx.amount, &tx.currency);
                }
                Ok(())
            })
            .await?;

        let mut items: Vec<RecurringItem> = merchants
            .iter()
            .filter_map(|(merchant, charges)| charges.detect(merchant))
            .collect();
        items.sort_by(|a, b| {
            b.monthly_equivalent
                .total_cmp(&a.monthly_equivalent)
                .then_with(|| a.merchant.cmp(&b.merchant))
        });

        let total_monthly_equivalent = round_cents(items.iter().map(|i| i.monthly_equivalent).sum());

        debug!(
            user_id,
            merchants = merchants.len(),
            recurring = items.len(),
            "recurring transactions detected"
        );

        Ok(RecurringResult {
            items,
            total_monthly_equivalent,
            currency,
            from: args.range.from,
            to: args.range.to,
        })
    }

    /// Average spend per day/week/month plus a chronological series, optionally
    /// split per category or merchant. Every split averages against the same
    /// overall unit count.
    pub async fn moving_average(&self, user_id: &str, args: &MovingAverageArgs) -> Result<MovingAverageResult> {
        let query = TransactionQuery {
            pending: args.pending,
            category: args.category.clone(),
            merchant: args.merchant.clone(),
            bank_id: args.bank_id.clone(),
            ..TransactionQuery::within(&args.range)
        };

        let days_analyzed = args.range.days();
        let units = unit_count(days_analyzed, args.granularity);

        let mut overall = SeriesAccumulator::default();
        let mut scoped: BTreeMap<String, SeriesAccumulator> = BTreeMap::new();
        let mut currency = String::new();

        self.source
            .query(user_id, &query, &mut |tx: &Transaction| {
                note_currency(&mut currency, tx);
                let period = period_key(tx.date, args.granularity);

                let scope_key = match args.scope {
                    Scope::Overall => None,
                    Scope::Category => Some(&tx.pfc_primary),
                    Scope::Merchant => Some(&tx.name),
                };
                if let Some(key) = scope_key.filter(|k| !k.is_empty()) {
                    scoped.entry(key.clone()).or_default().add(period.clone(), tx.amount);
                }

                overall.add(period, tx.amount);
                Ok(())
            })
            .await?;

        let items = match args.scope {
            Scope::Overall => None,
            _ => Some(
                scoped
                    .into_iter()
                    .map(|(key, acc)| {
                        let (total, count) = (acc.total, acc.count);
                        ScopedSeries {
                            key,
                            total,
                            count,
                            average_per_unit: total / units,
                            series: acc.into_points(),
                        }
                    })
                    .collect(),
            ),
        };

        let (total, transaction_count) = (overall.total, overall.count);

        debug!(
            user_id,
            granularity = ?args.granularity,
            scope = ?args.scope,
            days_analyzed,
            transaction_count,
            "moving average computed"
        );

        Ok(MovingAverageResult {
            granularity: args.granularity,
            scope: args.scope,
            average_per_unit: total / units,
            total,
            transaction_count,
            days_analyzed,
            currency,
            from: args.range.from,
            to: args.range.to,
            series: overall.into_points(),
            items,
        })
    }

    /// Highest (or lowest) spending merchants or categories. Percentages are
    /// shares of everything that matched, before `min_count` and `limit` apply.
    pub async fn top_n(&self, user_id: &str, args: &TopNArgs) -> Result<TopNResult> {
        let query = TransactionQuery {
            pending: args.pending,
            category: args.category.clone(),
            bank_id: args.bank_id.clone(),
            ..TransactionQuery::within(&args.range)
        };

        let mut grand_total = 0.0;
        let mut currency = String::new();
        let mut buckets: HashMap<String, (f64, usize)> = HashMap::new();

        self.source
            .query(user_id, &query, &mut |tx: &Transaction| {
                grand_total += tx.amount;
                note_currency(&mut currency, tx);
                let key = match args.dimension {
                    Dimension::Merchant => &tx.name,
                    Dimension::Category => &tx.pfc_primary,
                };
                if !key.is_empty() {
                    let bucket = buckets.entry(key.clone()).or_insert((0.0, 0));
                    bucket.0 += tx.amount;
                    bucket.1 += 1;
                }
                Ok(())
            })
            .await?;

        let mut items: Vec<TopNItem> = buckets
            .into_iter()
            .filter(|(_, (_, count))| *count >= args.min_count)
            .map(|(key, (total, count))| TopNItem {
                key,
                total,
                count,
                percentage: if grand_total != 0.0 {
                    total * 100.0 / grand_total
                } else {
                    0.0
                },
            })
            .collect();

        match args.direction {
            Direction::Top => items.sort_by(|a, b| b.total.total_cmp(&a.total).then_with(|| a.key.cmp(&b.key))),
            Direction::Bottom => items.sort_by(|a, b| a.total.total_cmp(&b.total).then_with(|| a.key.cmp(&b.key))),
        }
        if args.limit > 0 {
            items.truncate(args.limit);
        }

        Ok(TopNResult {
            dimension: args.dimension,
            direction: args.direction,
            total_spend: grand_total,
            currency,
            from: args.range.from,
            to: args.range.to,
            items,
        })
    }
}
