//! Surrogate identity allocation.
//!
//! Counters live in `vitrine_sequences`, one row per counter. Bulk loads reserve a
//! whole batch per round trip and hand ids out from memory; once the catalog is
//! live every call reserves exactly one id.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};

use sea_orm::sea_query::{Expr, OnConflict, Query};
use sea_orm::{DatabaseConnection, TransactionTrait};
use tokio::sync::Mutex;

use crate::db::VitrineSequences;
use crate::sql::{col_name, exec, query_one};
use vitrine_core::{VitrineError, VitrineResult};

const ENTITY_SEQUENCE: &str = "entity";
const REFERENCE_SEQUENCE: &str = "reference";
const ATTRIBUTE_SEQUENCE: &str = "attribute";
const PRICE_SEQUENCE: &str = "price";

pub struct SurrogateIdAllocator {
    conn: DatabaseConnection,
    batch_size: usize,
    transactional: AtomicBool,
    queues: Mutex<HashMap<String, VecDeque<i64>>>,
}

impl SurrogateIdAllocator {
    pub(crate) fn new(conn: DatabaseConnection, batch_size: usize, transactional: bool) -> Self {
        Self {
            conn,
            batch_size: batch_size.max(1),
            transactional: AtomicBool::new(transactional),
            queues: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_transactional(&self) -> bool {
        self.transactional.load(Ordering::Acquire)
    }

    /// Switches to single-id reservation. Ids still queued are abandoned, never reissued.
    pub(crate) async fn set_transactional(&self, transactional: bool) {
        let mut queues = self.queues.lock().await;
        self.transactional.store(transactional, Ordering::Release);
        if transactional {
            queues.clear();
        }
    }

    pub async fn next_entity_id(&self) -> VitrineResult<i64> {
        self.next(ENTITY_SEQUENCE).await
    }

    pub async fn next_reference_id(&self) -> VitrineResult<i64> {
        self.next(REFERENCE_SEQUENCE).await
    }

    pub(crate) async fn next_attribute_id(&self) -> VitrineResult<i64> {
        self.next(ATTRIBUTE_SEQUENCE).await
    }

    pub(crate) async fn next_price_row_id(&self) -> VitrineResult<i64> {
        self.next(PRICE_SEQUENCE).await
    }

    /// External primary keys are always issued one by one so they stay dense.
    pub async fn next_primary_key(&self, entity_type: &str) -> VitrineResult<i64> {
        reserve(&self.conn, &format!("pk:{entity_type}"), 1).await
    }

    async fn next(&self, sequence: &str) -> VitrineResult<i64> {
        if self.is_transactional() {
            return reserve(&self.conn, sequence, 1).await;
        }
        let mut queues = self.queues.lock().await;
        let queue = queues.entry(sequence.to_string()).or_default();
        if queue.is_empty() {
            let start = reserve(&self.conn, sequence, self.batch_size).await?;
            queue.extend(start..start + self.batch_size as i64);
        }
        queue
            .pop_front()
            .ok_or_else(|| VitrineError::storage(format!("sequence `{sequence}` exhausted")))
    }
}

/// Reserves `count` consecutive values and returns the first one.
async fn reserve(conn: &DatabaseConnection, sequence: &str, count: usize) -> VitrineResult<i64> {
    let count = count as i64;
    let tx = conn.begin().await?;
    let seed = Query::insert()
        .into_table(VitrineSequences::Table)
        .columns([VitrineSequences::Name, VitrineSequences::NextValue])
        .values_panic([sequence.into(), 1i64.into()])
        .on_conflict(
            OnConflict::column(VitrineSequences::Name)
                .do_nothing()
                .to_owned(),
        )
        .to_owned();
    exec(&tx, &seed).await?;
    let bump = Query::update()
        .table(VitrineSequences::Table)
        .value(
            VitrineSequences::NextValue,
            Expr::col(VitrineSequences::NextValue).add(count),
        )
        .and_where(Expr::col(VitrineSequences::Name).eq(sequence))
        .to_owned();
    exec(&tx, &bump).await?;
    let select = Query::select()
        .column(VitrineSequences::NextValue)
        .from(VitrineSequences::Table)
        .and_where(Expr::col(VitrineSequences::Name).eq(sequence))
        .to_owned();
    let row = query_one(&tx, &select)
        .await?
        .ok_or_else(|| VitrineError::storage(format!("sequence `{sequence}` missing")))?;
    let next: i64 = row.try_get("", &col_name(VitrineSequences::NextValue))?;
    tx.commit().await?;
    Ok(next - count)
}
