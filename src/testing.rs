//! Shared test fixtures

use chrono::{TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::clock::FixedClock;
use crate::error::FinanceError;
use crate::llm::{GenerateRequest, GenerateResponse, LanguageModel};
use crate::models::{parse_date, Transaction, TransactionQuery};
use crate::source::{InMemoryTransactionSource, TransactionSource, Visitor};
use crate::Result;

//
// ================= Transactions =================
//

pub struct TxBuilder(Transaction);

/// Posted USD transaction on `bank-1`.
pub fn tx(name: &str, amount: f64, date: &str) -> TxBuilder {
    let created = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    TxBuilder(Transaction {
        transaction_id: format!("tx-{}-{}-{}", name, date, amount),
        bank_id: "bank-1".to_string(),
        name: name.to_string(),
        amount,
        currency: "USD".to_string(),
        pending: false,
        date: parse_date(date).unwrap(),
        authorized_date: None,
        pfc_primary: String::new(),
        pfc_detailed: String::new(),
        pfc_confidence: String::new(),
        pfc_icon_url: String::new(),
        created_at: created,
        updated_at: created,
    })
}

impl TxBuilder {
    pub fn category(mut self, category: &str) -> Self {
        self.0.pfc_primary = category.to_string();
        self
    }

    pub fn bank(mut self, bank_id: &str) -> Self {
        self.0.bank_id = bank_id.to_string();
        self
    }

    pub fn pending(mut self, pending: bool) -> Self {
        self.0.pending = pending;
        self
    }

    pub fn currency(mut self, currency: &str) -> Self {
        self.0.currency = currency.to_string();
        self
    }

    pub fn build(self) -> Transaction {
        self.0
    }
}

//
// ================= Sources =================
//

/// In-memory source that counts queries and remembers the last one,
/// or fails every query when built with `failing`.
pub struct CountingSource {
    inner: InMemoryTransactionSource,
    calls: AtomicUsize,
    last: Mutex<Option<TransactionQuery>>,
    fail_with: Option<String>,
}

impl CountingSource {
    pub async fn with_transactions(user_id: &str, txs: Vec<Transaction>) -> Self {
        let inner = InMemoryTransactionSource::new();
        inner.extend(user_id, txs).await;
        Self {
            inner,
            calls: AtomicUsize::new(0),
            last: Mutex::new(None),
            fail_with: None,
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            inner: InMemoryTransactionSource::new(),
            calls: AtomicUsize::new(0),
            last: Mutex::new(None),
            fail_with: Some(message.to_string()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_query(&self) -> Option<TransactionQuery> {
        self.last.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl TransactionSource for CountingSource {
    async fn query(&self, user_id: &str, query: &TransactionQuery, visit: Visitor<'_>) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = Some(query.clone());
        if let Some(message) = &self.fail_with {
            return Err(FinanceError::StoreError(message.clone()));
        }
        self.inner.query(user_id, query, visit).await
    }
}

//
// ================= Language model =================
//

/// Replays queued responses in order and records every request it receives.
#[derive(Default)]
pub struct ScriptedModel {
    responses: Mutex<VecDeque<Result<GenerateResponse>>>,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl ScriptedModel {
    pub fn new(responses: Vec<Result<GenerateResponse>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(FinanceError::LlmError("script exhausted".to_string())))
    }
}

//
// ================= Clock =================
//

/// Saturday 2025-02-15, noon UTC
pub fn fixed_clock() -> Arc<FixedClock> {
    Arc::new(FixedClock(Utc.with_ymd_and_hms(2025, 2, 15, 12, 0, 0).unwrap()))
}
