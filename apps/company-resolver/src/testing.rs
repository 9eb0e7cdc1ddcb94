//! Test doubles shared by the resolver, orchestrator and batch tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::cache::store::CacheStore;
use crate::directory::DirectoryClient;
use crate::errors::{CacheError, DirectoryError};
use crate::models::cache::{CacheEntry, CacheKey, CacheStats};
use crate::models::company::{CompanyId, DirectoryRecord};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CallCounts {
    pub website: u32,
    pub name: u32,
    pub fetch: u32,
    pub fallback: u32,
}

impl CallCounts {
    pub fn total(&self) -> u32 {
        self.website + self.name + self.fetch + self.fallback
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Website,
    Name,
    Fetch,
    Fallback,
}

#[derive(Default)]
struct FakeState {
    websites: HashMap<String, Vec<CompanyId>>,
    names: HashMap<String, Vec<DirectoryRecord>>,
    records: HashMap<CompanyId, DirectoryRecord>,
    fallback: HashMap<String, Vec<DirectoryRecord>>,
    transient_failures: Vec<DirectoryError>,
    broken: HashMap<Operation, DirectoryError>,
    calls: CallCounts,
}

/// In-memory directory with call counters and scripted failures.
#[derive(Clone, Default)]
pub struct FakeDirectory {
    state: Arc<Mutex<FakeState>>,
}

impl FakeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_website(self, website: &str, id: CompanyId) -> Self {
        self.state
            .lock()
            .unwrap()
            .websites
            .entry(website.to_string())
            .or_default()
            .push(id);
        self
    }

    /// Name-search hits for a query, matched case-insensitively.
    pub fn with_name_hits(self, query: &str, hits: Vec<DirectoryRecord>) -> Self {
        self.state
            .lock()
            .unwrap()
            .names
            .insert(query.trim().to_lowercase(), hits);
        self
    }

    pub fn with_record(self, record: DirectoryRecord) -> Self {
        self.state.lock().unwrap().records.insert(record.id, record);
        self
    }

    pub fn with_fallback_hits(self, normalized_name: &str, hits: Vec<DirectoryRecord>) -> Self {
        self.state
            .lock()
            .unwrap()
            .fallback
            .insert(normalized_name.to_string(), hits);
        self
    }

    /// The next `count` calls of any kind fail with `err`.
    pub fn fail_next_calls(&self, err: DirectoryError, count: usize) {
        let mut state = self.state.lock().unwrap();
        state
            .transient_failures
            .extend(std::iter::repeat(err).take(count));
    }

    /// Every call of `op` fails with `err` from now on.
    pub fn break_operation(&self, op: Operation, err: DirectoryError) {
        self.state.lock().unwrap().broken.insert(op, err);
    }

    pub fn calls(&self) -> CallCounts {
        self.state.lock().unwrap().calls
    }

    fn enter(&self, op: Operation) -> Result<(), DirectoryError> {
        let mut state = self.state.lock().unwrap();
        match op {
            Operation::Website => state.calls.website += 1,
            Operation::Name => state.calls.name += 1,
            Operation::Fetch => state.calls.fetch += 1,
            Operation::Fallback => state.calls.fallback += 1,
        }
        if let Some(err) = state.broken.get(&op) {
            return Err(err.clone());
        }
        if !state.transient_failures.is_empty() {
            return Err(state.transient_failures.remove(0));
        }
        Ok(())
    }
}

pub fn record(id: i64, name: &str, score: f64) -> DirectoryRecord {
    DirectoryRecord {
        id: CompanyId(id),
        name: name.to_string(),
        relevance_score: score,
        ..Default::default()
    }
}

#[async_trait]
impl DirectoryClient for FakeDirectory {
    async fn search_by_website(&self, website: &str) -> Result<Vec<CompanyId>, DirectoryError> {
        self.enter(Operation::Website)?;
        let state = self.state.lock().unwrap();
        Ok(state.websites.get(website).cloned().unwrap_or_default())
    }

    async fn search_by_name(
        &self,
        name: &str,
        limit: usize,
    ) -> Result<Vec<DirectoryRecord>, DirectoryError> {
        self.enter(Operation::Name)?;
        let state = self.state.lock().unwrap();
        let mut hits = state
            .names
            .get(&name.trim().to_lowercase())
            .cloned()
            .unwrap_or_default();
        hits.truncate(limit);
        Ok(hits)
    }

    async fn fetch_by_id(&self, id: CompanyId) -> Result<Option<DirectoryRecord>, DirectoryError> {
        self.enter(Operation::Fetch)?;
        Ok(self.state.lock().unwrap().records.get(&id).cloned())
    }

    async fn search_fallback(
        &self,
        normalized_name: &str,
    ) -> Result<Vec<DirectoryRecord>, DirectoryError> {
        self.enter(Operation::Fallback)?;
        let state = self.state.lock().unwrap();
        Ok(state.fallback.get(normalized_name).cloned().unwrap_or_default())
    }
}

/// A cache store whose backend is always down.
pub struct UnreachableStore;

#[async_trait]
impl CacheStore for UnreachableStore {
    async fn find(&self, _key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }

    async fn upsert(&self, _entry: &CacheEntry) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }

    async fn record_hit(
        &self,
        _entry: &CacheEntry,
        _at: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }

    async fn stats(&self) -> Result<CacheStats, CacheError> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }
}
