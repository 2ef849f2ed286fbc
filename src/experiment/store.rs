//! Experiment store - injected storage for experiment records
//!
//! The pipeline only sees the [`ExperimentStore`] trait; the default backend
//! is [`MemoryExperimentStore`], whose records live as long as the process.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use super::{ExperimentRecord, ExperimentRequest, ExperimentResult, ExperimentStatus};
use crate::{Error, Result};

/// Storage for experiment records.
///
/// Ids are allocated by the store, start at 0, increase strictly and are
/// never reused. Status changes go through
/// [`ExperimentRecord::advance`], so an illegal transition is rejected
/// here rather than silently stored.
pub trait ExperimentStore: Send + Sync {
    /// Allocate an id and record a new experiment in `Starting`.
    fn create(&self, request: ExperimentRequest) -> impl Future<Output = Result<ExperimentRecord>> + Send;

    /// Fetch a record.
    ///
    /// Unknown ids are [`Error::NotFound`].
    fn get(&self, id: u64) -> impl Future<Output = Result<ExperimentRecord>> + Send;

    /// Move a record to `status`, returning the updated record.
    fn set_status(
        &self,
        id: u64,
        status: ExperimentStatus,
    ) -> impl Future<Output = Result<ExperimentRecord>> + Send;

    /// Attach the result and mark the record completed.
    fn complete(&self, id: u64, result: ExperimentResult) -> impl Future<Output = Result<ExperimentRecord>> + Send;

    /// All records, ascending by id.
    fn list(&self) -> impl Future<Output = Result<Vec<ExperimentRecord>>> + Send;
}

/// In-memory experiment store using `DashMap`.
///
/// # Example
///
/// ```rust
/// use cluster_testbed::experiment::{
///     ExperimentRequest, ExperimentStatus, ExperimentStore, MemoryExperimentStore,
/// };
///
/// # async fn example() -> cluster_testbed::Result<()> {
/// let store = MemoryExperimentStore::new();
/// let record = store.create(ExperimentRequest::new("ring")).await?;
/// store.set_status(record.id(), ExperimentStatus::Provisioning).await?;
/// assert_eq!(store.get(record.id()).await?.status(), ExperimentStatus::Provisioning);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MemoryExperimentStore {
    records: DashMap<u64, ExperimentRecord>,
    next_id: AtomicU64,
}

impl MemoryExperimentStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no experiment was ever started.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn update(&self, id: u64, f: impl FnOnce(&mut ExperimentRecord) -> Result<()>) -> Result<ExperimentRecord> {
        let mut entry = self
            .records
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("experiment {id}")))?;
        f(entry.value_mut())?;
        Ok(entry.value().clone())
    }
}

impl ExperimentStore for MemoryExperimentStore {
    async fn create(&self, request: ExperimentRequest) -> Result<ExperimentRecord> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let record = ExperimentRecord::new(id, request);
        self.records.insert(id, record.clone());
        Ok(record)
    }

    async fn get(&self, id: u64) -> Result<ExperimentRecord> {
        self.records
            .get(&id)
            .map(|r| r.value().clone())
            .ok_or_else(|| Error::NotFound(format!("experiment {id}")))
    }

    async fn set_status(&self, id: u64, status: ExperimentStatus) -> Result<ExperimentRecord> {
        self.update(id, |record| record.advance(status))
    }

    async fn complete(&self, id: u64, result: ExperimentResult) -> Result<ExperimentRecord> {
        self.update(id, |record| record.complete(result))
    }

    async fn list(&self) -> Result<Vec<ExperimentRecord>> {
        let mut records: Vec<ExperimentRecord> = self.records.iter().map(|r| r.value().clone()).collect();
        records.sort_by_key(ExperimentRecord::id);
        Ok(records)
    }
}
