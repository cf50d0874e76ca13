//! Tool catalog and registry
//!
//! The fixed set of analytics operations the language model (and the dashboard)
//! may call. A call is decoded into a typed `ToolInvocation`, resolved against
//! "today", run on the `AnalyticsEngine` and serialized back to a JSON map.

pub mod args;
pub mod schema;

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

use crate::analytics::{
    AnalyticsEngine, GroupBy, MovingAverageArgs, PeriodComparisonArgs, RecurringArgs, SpendFilters, TopNArgs,
    TransactionsArgs,
};
use crate::clock::Clock;
use crate::error::FinanceError;
use crate::llm::{ToolCall, ToolResult};
use crate::Result;
use args::{
    MovingAverageInput, PeriodComparisonInput, RecurringInput, SpendBreakdownInput, SpendTotalInput, TopNInput,
    TransactionsInput,
};
use schema::ToolSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    SpendTotal,
    SpendBreakdown,
    Transactions,
    PeriodComparison,
    Recurring,
    MovingAverage,
    TopN,
}

impl ToolKind {
    pub const ALL: [ToolKind; 7] = [
        ToolKind::SpendTotal,
        ToolKind::SpendBreakdown,
        ToolKind::Transactions,
        ToolKind::PeriodComparison,
        ToolKind::Recurring,
        ToolKind::MovingAverage,
        ToolKind::TopN,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ToolKind::SpendTotal => "get_spend_total",
            ToolKind::SpendBreakdown => "get_spend_breakdown",
            ToolKind::Transactions => "get_transactions",
            ToolKind::PeriodComparison => "get_period_comparison",
            ToolKind::Recurring => "get_recurring_transactions",
            ToolKind::MovingAverage => "get_moving_average",
            ToolKind::TopN => "get_top_n",
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ToolKind {
    type Err = FinanceError;

    fn from_str(s: &str) -> Result<Self> {
        ToolKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| FinanceError::ToolNotFound(s.to_string()))
    }
}

/// A fully validated tool call, ready to run
#[derive(Debug, Clone, PartialEq)]
pub enum ToolInvocation {
    SpendTotal(SpendFilters),
    SpendBreakdown(SpendFilters, GroupBy),
    Transactions(TransactionsArgs),
    PeriodComparison(PeriodComparisonArgs),
    Recurring(RecurringArgs),
    MovingAverage(MovingAverageArgs),
    TopN(TopNArgs),
}

fn decode_input<T: DeserializeOwned>(kind: ToolKind, args: &Map<String, Value>) -> Result<T> {
    serde_json::from_value(Value::Object(args.clone()))
        .map_err(|e| FinanceError::InvalidToolInput(format!("{}: {}", kind, e)))
}

fn into_map<T: Serialize>(result: &T) -> Result<Map<String, Value>> {
    match serde_json::to_value(result)? {
        Value::Object(map) => Ok(map),
        other => {
            let mut map = Map::new();
            map.insert("result".to_string(), other);
            Ok(map)
        }
    }
}

impl ToolInvocation {
    /// Decode and validate raw arguments. Nothing touches the store here.
    pub fn decode(kind: ToolKind, args: &Map<String, Value>, today: NaiveDate) -> Result<Self> {
        Ok(match kind {
            ToolKind::SpendTotal => {
                let input: SpendTotalInput = decode_input(kind, args)?;
                ToolInvocation::SpendTotal(input.filters.resolve(today)?)
            }
            ToolKind::SpendBreakdown => {
                let input: SpendBreakdownInput = decode_input(kind, args)?;
                let (filters, group_by) = input.resolve(today)?;
                ToolInvocation::SpendBreakdown(filters, group_by)
            }
            ToolKind::Transactions => {
                let input: TransactionsInput = decode_input(kind, args)?;
                ToolInvocation::Transactions(input.resolve(today)?)
            }
            ToolKind::PeriodComparison => {
                let input: PeriodComparisonInput = decode_input(kind, args)?;
                ToolInvocation::PeriodComparison(input.resolve()?)
            }
            ToolKind::Recurring => {
                let input: RecurringInput = decode_input(kind, args)?;
                ToolInvocation::Recurring(input.resolve()?)
            }
            ToolKind::MovingAverage => {
                let input: MovingAverageInput = decode_input(kind, args)?;
                ToolInvocation::MovingAverage(input.resolve()?)
            }
            ToolKind::TopN => {
                let input: TopNInput = decode_input(kind, args)?;
                ToolInvocation::TopN(input.resolve()?)
            }
        })
    }

    pub async fn run(&self, engine: &AnalyticsEngine, user_id: &str) -> Result<Map<String, Value>> {
        match self {
            ToolInvocation::SpendTotal(filters) => into_map(&engine.spend_total(user_id, filters).await?),
            ToolInvocation::SpendBreakdown(filters, group_by) => {
                into_map(&engine.spend_breakdown(user_id, filters, *group_by).await?)
            }
            ToolInvocation::Transactions(args) => into_map(&engine.transactions(user_id, args).await?),
            ToolInvocation::PeriodComparison(args) => into_map(&engine.period_comparison(user_id, args).await?),
            ToolInvocation::Recurring(args) => into_map(&engine.recurring_transactions(user_id, args).await?),
            ToolInvocation::MovingAverage(args) => into_map(&engine.moving_average(user_id, args).await?),
            ToolInvocation::TopN(args) => into_map(&engine.top_n(user_id, args).await?),
        }
    }
}

/// Registry for looking up and executing the analytics tools
#[derive(Clone)]
pub struct ToolRegistry {
    engine: AnalyticsEngine,
    clock: Arc<dyn Clock>,
}

impl ToolRegistry {
    pub fn new(engine: AnalyticsEngine, clock: Arc<dyn Clock>) -> Self {
        Self { engine, clock }
    }

    pub fn get(&self, name: &str) -> Option<ToolKind> {
        name.parse().ok()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn list(&self) -> Vec<&'static str> {
        ToolKind::ALL.iter().map(|kind| kind.name()).collect()
    }

    /// Declarations handed to the language model
    pub fn schemas(&self) -> Vec<ToolSchema> {
        ToolKind::ALL.into_iter().map(schema::schema_for).collect()
    }

    /// Validate and run one call for `user_id`.
    pub async fn execute(&self, user_id: &str, call: &ToolCall) -> Result<ToolResult> {
        let kind: ToolKind = call.name.parse()?;
        let invocation = ToolInvocation::decode(kind, &call.args, self.clock.today())?;
        debug!(tool = %kind, ?invocation, "tool arguments resolved");

        info!(tool = %kind, user_id, "executing tool");
        let response = invocation.run(&self.engine, user_id).await?;

        Ok(ToolResult {
            name: kind.name().to_string(),
            response,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixed_clock, tx, CountingSource};
    use serde_json::json;

    async fn registry_with(txs: Vec<crate::models::Transaction>) -> (ToolRegistry, Arc<CountingSource>) {
        let source = Arc::new(CountingSource::with_transactions("user", txs).await);
        let engine = AnalyticsEngine::new(source.clone());
        (ToolRegistry::new(engine, fixed_clock()), source)
    }

    fn call(name: &str, args: Value) -> ToolCall {
        ToolCall {
            name: name.to_string(),
            args: args.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn test_catalog() {
        let names: Vec<&str> = ToolKind::ALL.iter().map(|k| k.name()).collect();
        assert_eq!(names.len(), 7);
        for name in names {
            assert_eq!(name.parse::<ToolKind>().unwrap().name(), name);
        }
        assert!(matches!(
            "get_weather".parse::<ToolKind>().unwrap_err(),
            FinanceError::ToolNotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_schemas_cover_every_tool() {
        let (registry, _) = registry_with(vec![]).await;
        let schemas = registry.schemas();
        assert_eq!(schemas.len(), 7);
        assert!(schemas.iter().all(|s| registry.contains(&s.name)));
        assert_eq!(registry.list()[0], "get_spend_total");
    }

    #[tokio::test]
    async fn test_spend_total_defaults_to_month_to_date() {
        let (registry, source) = registry_with(vec![
            tx("Coffee", 4.0, "2025-02-10").build(),
            tx("Coffee", 6.0, "2025-02-14").build(),
            tx("Old", 100.0, "2025-01-20").build(),
            tx("Pending", 50.0, "2025-02-11").pending(true).build(),
        ])
        .await;

        let result = registry.execute("user", &call("get_spend_total", json!({}))).await.unwrap();
        assert_eq!(result.name, "get_spend_total");
        assert_eq!(result.response["total"], 10.0);
        assert_eq!(result.response["from"], "2025-02-01");
        assert_eq!(result.response["to"], "2025-02-15");

        let query = source.last_query().unwrap();
        assert_eq!(query.pending, Some(false));
    }

    #[tokio::test]
    async fn test_unknown_group_by_never_queries() {
        let (registry, source) = registry_with(vec![tx("Coffee", 4.0, "2025-02-10").build()]).await;

        let err = registry
            .execute("user", &call("get_spend_breakdown", json!({"groupBy": "unknown"})))
            .await
            .unwrap_err();
        assert!(matches!(err, FinanceError::UnsupportedGroupBy(_)));
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_tool_and_bad_args_never_query() {
        let (registry, source) = registry_with(vec![]).await;

        let err = registry.execute("user", &call("get_weather", json!({}))).await.unwrap_err();
        assert!(matches!(err, FinanceError::ToolNotFound(_)));

        let err = registry
            .execute("user", &call("get_transactions", json!({"desc": "very"})))
            .await
            .unwrap_err();
        assert!(matches!(err, FinanceError::InvalidToolInput(ref m) if m.starts_with("get_transactions")));

        let err = registry
            .execute("user", &call("get_spend_total", json!({"category": "GROCERIES"})))
            .await
            .unwrap_err();
        assert!(err.is_validation());

        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn test_top_n_tool_round_trip() {
        let (registry, _) = registry_with(vec![
            tx("A", 60.0, "2025-02-01").build(),
            tx("B", 30.0, "2025-02-02").build(),
            tx("C", 10.0, "2025-02-03").build(),
        ])
        .await;

        let result = registry
            .execute(
                "user",
                &call(
                    "get_top_n",
                    json!({"dimension": "merchant", "dateFrom": "2025-02-01", "dateTo": "2025-02-28", "limit": 2}),
                ),
            )
            .await
            .unwrap();
        let items = result.response["items"].as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["key"], "A");
        assert_eq!(result.response["totalSpend"], 100.0);
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let source = Arc::new(CountingSource::failing("connection reset"));
        let registry = ToolRegistry::new(AnalyticsEngine::new(source), fixed_clock());
        let err = registry.execute("user", &call("get_spend_total", json!({}))).await.unwrap_err();
        assert!(matches!(err, FinanceError::StoreError(ref m) if m == "connection reset"));
    }
}
