use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use wardrobe_types::Entity;

use crate::error::{SourceError, SourceResult};
use crate::traits::{EntitySource, Filter};

/// The data-source calls an [`InMemorySource`] counts and can fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SourceOp {
    FetchAll,
    FetchByIds,
    Create,
    Delete,
    Count,
}

/// In-memory data source.
///
/// Intended for tests, demos, and the CLI. Records live behind a `RwLock`
/// and are cloned out on every read. Ids are assigned as `{prefix}-{n}`
/// from a monotonically increasing counter. Latency and one-shot failures
/// can be injected per call.
pub struct InMemorySource<E: Entity> {
    prefix: String,
    next_id: AtomicU64,
    records: RwLock<Vec<E>>,
    latency: Option<Duration>,
    op_latency: HashMap<SourceOp, Duration>,
    failures: Mutex<HashMap<SourceOp, VecDeque<SourceError>>>,
    calls: Mutex<HashMap<SourceOp, usize>>,
}

impl<E: Entity> InMemorySource<E> {
    /// Create an empty source assigning ids with `prefix`.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next_id: AtomicU64::new(1),
            records: RwLock::new(Vec::new()),
            latency: None,
            op_latency: HashMap::new(),
            failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Create a source pre-populated with `records`.
    pub fn with_records(prefix: impl Into<String>, records: Vec<E>) -> Self {
        let source = Self::new(prefix);
        let next = records.len() as u64 + 1;
        *source.records.write().unwrap_or_else(PoisonError::into_inner) = records;
        source.next_id.store(next, Ordering::SeqCst);
        source
    }

    /// Number the next created record `n`.
    pub fn with_next_id(self, n: u64) -> Self {
        self.next_id.store(n, Ordering::SeqCst);
        self
    }

    /// Delay every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Delay calls of `op` by `latency`, in place of any blanket latency.
    pub fn with_op_latency(mut self, op: SourceOp, latency: Duration) -> Self {
        self.op_latency.insert(op, latency);
        self
    }

    /// Make the next call of `op` fail with `err`. Queued failures are
    /// consumed in order.
    pub fn fail_next(&self, op: SourceOp, err: SourceError) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(op)
            .or_default()
            .push_back(err);
    }

    /// How many times `op` has been called, including failed calls.
    pub fn calls(&self, op: SourceOp) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&op)
            .copied()
            .unwrap_or(0)
    }

    /// Current records, in insertion order.
    pub fn records(&self) -> Vec<E> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Insert or replace a record behind the caches' backs, as another
    /// client would.
    pub fn insert(&self, record: E) {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        match records.iter().position(|r| r.id() == record.id()) {
            Some(pos) => records[pos] = record,
            None => records.push(record),
        }
    }

    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn enter(&self, op: SourceOp) -> SourceResult<()> {
        *self
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(op)
            .or_insert(0) += 1;
        if let Some(latency) = self.op_latency.get(&op).copied().or(self.latency) {
            tokio::time::sleep(latency).await;
        }
        let injected = self
            .failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&op)
            .and_then(VecDeque::pop_front);
        match injected {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn assign_id(&self) -> String {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        format!("{}-{n}", self.prefix)
    }
}

#[async_trait]
impl<E: Entity> EntitySource<E> for InMemorySource<E> {
    async fn fetch_all(&self, filter: Option<&Filter>) -> SourceResult<Vec<E>> {
        self.enter(SourceOp::FetchAll).await?;
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Ok(records
            .iter()
            .filter(|r| filter.map_or(true, |f| f.matches(*r)))
            .cloned()
            .collect())
    }

    async fn fetch_by_ids(&self, ids: &[String]) -> SourceResult<Vec<E>> {
        self.enter(SourceOp::FetchByIds).await?;
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Ok(records
            .iter()
            .filter(|r| ids.iter().any(|id| id == r.id()))
            .cloned()
            .collect())
    }

    async fn create(&self, draft: E::Draft) -> SourceResult<E> {
        self.enter(SourceOp::Create).await?;
        E::validate(&draft)?;
        let record = E::from_draft(self.assign_id(), &draft, Utc::now());
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        if records.iter().any(|r| r.id() == record.id()) {
            return Err(SourceError::Conflict(format!(
                "{} {} already exists",
                E::COLLECTION,
                record.id()
            )));
        }
        records.push(record.clone());
        Ok(record)
    }

    async fn delete(&self, id: &str) -> SourceResult<()> {
        self.enter(SourceOp::Delete).await?;
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let Some(pos) = records.iter().position(|r| r.id() == id) else {
            return Err(SourceError::NotFound(format!("{} {id} not found", E::COLLECTION)));
        };
        records.remove(pos);
        Ok(())
    }

    async fn count(&self) -> SourceResult<Option<u64>> {
        self.enter(SourceOp::Count).await?;
        Ok(Some(self.len() as u64))
    }
}

impl<E: Entity> std::fmt::Debug for InMemorySource<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemorySource")
            .field("collection", &E::COLLECTION)
            .field("prefix", &self.prefix)
            .field("record_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use wardrobe_types::{OwnershipEvent, OwnershipEventDraft, Player, PlayerDraft};

    #[tokio::test]
    async fn create_assigns_sequential_ids() {
        let source = InMemorySource::<Player>::new("real").with_next_id(42);
        let a = source.create(PlayerDraft::new("Aurora")).await.unwrap();
        let b = source.create(PlayerDraft::new("Ember")).await.unwrap();
        assert_eq!(a.id, "real-42");
        assert_eq!(b.id, "real-43");
        assert_eq!(source.len(), 2);
        assert_eq!(source.calls(SourceOp::Create), 2);
    }

    #[tokio::test]
    async fn create_rejects_invalid_drafts() {
        let source = InMemorySource::<OwnershipEvent>::new("evt");
        let mut draft = OwnershipEventDraft::grant("p-1", "i-1");
        draft.quantity = 0;
        let err = source.create(draft).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(source.is_empty());
    }

    #[tokio::test]
    async fn delete_missing_is_not_found() {
        let source = InMemorySource::<Player>::new("p");
        let err = source.delete("p-9").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn injected_failures_are_one_shot() {
        let source = InMemorySource::<Player>::new("p");
        source.fail_next(SourceOp::FetchAll, SourceError::Network("offline".into()));
        assert_eq!(
            source.fetch_all(None).await.unwrap_err(),
            SourceError::Network("offline".into())
        );
        assert!(source.fetch_all(None).await.unwrap().is_empty());
        assert_eq!(source.calls(SourceOp::FetchAll), 2);
    }

    #[tokio::test]
    async fn fetch_by_ids_and_filter() {
        let source = InMemorySource::<Player>::new("p");
        for name in ["nova", "vega", "lyra"] {
            source.create(PlayerDraft::new(name)).await.unwrap();
        }
        let some = source
            .fetch_by_ids(&["p-3".to_string(), "p-1".to_string(), "p-8".to_string()])
            .await
            .unwrap();
        assert_eq!(some.len(), 2);

        let vega = source
            .fetch_all(Some(&Filter::eq("username", "vega")))
            .await
            .unwrap();
        assert_eq!(vega.len(), 1);
        assert_eq!(vega[0].id, "p-2");
        assert_eq!(source.count().await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn external_insert_replaces_by_id() {
        let source = InMemorySource::<Player>::new("p");
        let nova = source.create(PlayerDraft::new("nova")).await.unwrap();
        source.insert(Player {
            username: "supernova".into(),
            ..nova
        });
        let records = source.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].username, "supernova");
    }
}
