use chrono::{Duration, NaiveDate, Utc};
use finance_analytics_assistant::{
    analytics::{
        periods::{ComparisonPreset, DatePreset, Window},
        AnalyticsEngine, Dimension, Direction, Granularity, GroupBy, MovingAverageArgs, PeriodComparisonArgs,
        RecurringArgs, Scope, SpendFilters, TopNArgs,
    },
    clock::{Clock, SystemClock},
    models::Transaction,
    source::InMemoryTransactionSource,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

const USER: &str = "demo-user";

fn seed(name: &str, amount: f64, date: NaiveDate, category: &str) -> Transaction {
    let now = Utc::now();
    Transaction {
        transaction_id: format!("{}-{}", name.to_lowercase().replace(' ', "-"), date),
        bank_id: "demo-bank".to_string(),
        name: name.to_string(),
        amount,
        currency: "USD".to_string(),
        pending: false,
        date,
        authorized_date: None,
        pfc_primary: category.to_string(),
        pfc_detailed: String::new(),
        pfc_confidence: String::new(),
        pfc_icon_url: String::new(),
        created_at: now,
        updated_at: now,
    }
}

/// About four months of history ending today.
fn seed_history(today: NaiveDate) -> Vec<Transaction> {
    let mut txs = Vec::new();
    for month in 0..4 {
        let base = today - Duration::days(30 * month);
        txs.push(seed("Netflix", 15.49, base, "ENTERTAINMENT"));
        txs.push(seed("City Rent", 1450.0, base - Duration::days(2), "RENT_AND_UTILITIES"));
        txs.push(seed("Power Co", 80.0 + 12.5 * month as f64, base - Duration::days(5), "RENT_AND_UTILITIES"));
    }
    for week in 0..16 {
        let day = today - Duration::days(7 * week);
        txs.push(seed("Green Grocer", 62.0 + (week % 3) as f64 * 9.0, day, "FOOD_AND_DRINK"));
        txs.push(seed("Corner Coffee", 4.75, day - Duration::days(1), "FOOD_AND_DRINK"));
    }
    txs.push(seed("Skyway Air", 389.0, today - Duration::days(20), "TRAVEL"));
    txs.push(seed("Hardware Hub", 54.2, today - Duration::days(3), "HOME_IMPROVEMENT"));
    let mut pending = seed("Gas Station", 41.0, today, "TRANSPORTATION");
    pending.pending = true;
    txs.push(pending);
    txs
}

fn print<T: Serialize>(title: &str, value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("\n=== {} ===", title);
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let today = SystemClock.today();
    let source = Arc::new(InMemoryTransactionSource::new());
    source.extend(USER, seed_history(today)).await;
    info!(user_id = USER, count = source.count(USER).await, "seeded demo transactions");

    let engine = AnalyticsEngine::new(source);

    let this_month = SpendFilters {
        pending: Some(false),
        range: Some(DatePreset::ThisMonth.resolve(today)),
        ..Default::default()
    };
    print("Spend this month", &engine.spend_total(USER, &this_month).await?)?;
    print(
        "This month by category",
        &engine.spend_breakdown(USER, &this_month, GroupBy::Category).await?,
    )?;

    let (current, previous) = ComparisonPreset::MonthOverMonth.resolve(today);
    let comparison = PeriodComparisonArgs {
        filters: SpendFilters {
            pending: Some(false),
            ..Default::default()
        },
        current,
        previous,
        group_by: Some(GroupBy::Merchant),
    };
    print("Month over month", &engine.period_comparison(USER, &comparison).await?)?;

    let last_90 = Window::Days90.resolve(today);
    let recurring = RecurringArgs {
        range: last_90,
        bank_id: None,
    };
    print("Recurring charges", &engine.recurring_transactions(USER, &recurring).await?)?;

    let weekly = MovingAverageArgs {
        range: last_90,
        granularity: Granularity::Week,
        scope: Scope::Overall,
        category: None,
        merchant: None,
        bank_id: None,
        pending: Some(false),
    };
    print("Weekly average", &engine.moving_average(USER, &weekly).await?)?;

    let top = TopNArgs {
        range: Window::Days30.resolve(today),
        dimension: Dimension::Merchant,
        direction: Direction::Top,
        limit: 3,
        min_count: 1,
        category: None,
        bank_id: None,
        pending: Some(false),
    };
    print("Top merchants, last 30 days", &engine.top_n(USER, &top).await?)?;

    Ok(())
}
