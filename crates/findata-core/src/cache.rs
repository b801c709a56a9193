//! Entity-scoped in-memory cache for decoded record batches.
//!
//! One entry per (record family, ticker, variant). Writes merge by natural
//! key and record a [`Coverage`] window: the date range the fetch proved
//! complete. A lookup is only answered when a window proves the cached answer
//! is as wide as a fresh fetch with the same parameters would be; anything
//! else is a miss.

use std::collections::{BTreeMap, HashMap};
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedMutexGuard, RwLock};
use tracing::debug;

use crate::persistence::CachePersistence;
use crate::{
    CompanyNews, Day, FinancialMetric, InsiderTrade, LineItem, PersistenceError, Price, Record,
    RecordFamily, Ticker,
};

/// Per-client cache behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// Answer from the cache when coverage allows; otherwise fetch and write. (Default)
    #[default]
    Use,
    /// Always fetch, then write the result.
    Refresh,
    /// Always fetch; never read or write.
    Bypass,
}

/// Records held for one cache entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", content = "records", rename_all = "snake_case")]
pub enum CachedBatch {
    Prices(Vec<Price>),
    FinancialMetrics(Vec<FinancialMetric>),
    LineItems(Vec<LineItem>),
    InsiderTrades(Vec<InsiderTrade>),
    CompanyNews(Vec<CompanyNews>),
}

impl CachedBatch {
    pub fn len(&self) -> usize {
        match self {
            Self::Prices(records) => records.len(),
            Self::FinancialMetrics(records) => records.len(),
            Self::LineItems(records) => records.len(),
            Self::InsiderTrades(records) => records.len(),
            Self::CompanyNews(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Identifies a cache entry: the entity plus whatever changes the record set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub family: RecordFamily,
    pub ticker: Ticker,
    /// Period for fundamentals, period and requested names for line items.
    pub variant: String,
}

impl CacheKey {
    pub fn new(family: RecordFamily, ticker: &Ticker) -> Self {
        Self {
            family,
            ticker: ticker.clone(),
            variant: String::new(),
        }
    }

    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = variant.into();
        self
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.ticker, self.family)?;
        if !self.variant.is_empty() {
            write!(f, "_{}", self.variant)?;
        }
        Ok(())
    }
}

/// Shape of a query against the provider's date axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowQuery {
    /// Every record dated within `[start, end]`.
    Range { start: Day, end: Day },
    /// The `limit` most recent records dated on or before `end`.
    Latest { end: Day, limit: usize },
}

/// Lower edge of a coverage window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "day", rename_all = "snake_case")]
pub enum LowerBound {
    /// Everything up to the upper edge is held.
    Unbounded,
    /// Every record from this day on is held.
    Complete(Day),
    /// Every record after this day is held; this day itself may be partial.
    Partial(Day),
}

impl LowerBound {
    fn rank(self) -> (u8, Option<Day>, u8) {
        match self {
            Self::Unbounded => (0, None, 0),
            Self::Complete(day) => (1, Some(day), 0),
            Self::Partial(day) => (1, Some(day), 1),
        }
    }

    /// All records dated `start` or later are held.
    fn covers_from(self, start: Day) -> bool {
        match self {
            Self::Unbounded => true,
            Self::Complete(day) => day <= start,
            Self::Partial(day) => day < start,
        }
    }

    fn reaches(self, day: Day) -> bool {
        match self {
            Self::Unbounded => true,
            Self::Complete(edge) | Self::Partial(edge) => edge <= day,
        }
    }

    fn edge(self) -> Option<Day> {
        match self {
            Self::Unbounded => None,
            Self::Complete(day) | Self::Partial(day) => Some(day),
        }
    }
}

/// Date range a cache entry is known to hold completely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coverage {
    pub lower: LowerBound,
    pub upper: Day,
}

impl Coverage {
    /// Window proven by a successful fetch of `query` that returned `records`.
    pub fn from_fetch<T: Record>(query: &WindowQuery, records: &[T]) -> Self {
        match *query {
            WindowQuery::Range { start, end } => Self {
                lower: LowerBound::Complete(start),
                upper: end,
            },
            WindowQuery::Latest { end, limit } => {
                let lower = match records.iter().map(Record::day).min() {
                    Some(oldest) if records.len() >= limit => LowerBound::Partial(oldest),
                    _ => LowerBound::Unbounded,
                };
                Self { lower, upper: end }
            }
        }
    }

    fn overlaps(&self, other: &Self) -> bool {
        self.lower.reaches(other.upper) && other.lower.reaches(self.upper)
    }

    fn union(self, other: Self) -> Self {
        let lower = if self.lower.rank() <= other.lower.rank() {
            self.lower
        } else {
            other.lower
        };
        Self {
            lower,
            upper: self.upper.max(other.upper),
        }
    }
}

fn add_coverage(windows: &mut Vec<Coverage>, window: Coverage) {
    let mut merged = window;
    loop {
        let before = windows.len();
        windows.retain(|existing| {
            if existing.overlaps(&merged) {
                merged = merged.union(*existing);
                false
            } else {
                true
            }
        });
        if windows.len() == before {
            break;
        }
    }
    windows.push(merged);
    windows.sort_by_key(|w| w.upper);
}

/// Answer `query` from `records` (sorted newest first) if `windows` allow it.
fn answer<T: Record>(records: &[T], windows: &[Coverage], query: &WindowQuery) -> Option<Vec<T>> {
    match *query {
        WindowQuery::Range { start, end } => {
            windows
                .iter()
                .find(|w| w.upper >= end && w.lower.covers_from(start))?;
            let hits: Vec<T> = records
                .iter()
                .filter(|r| r.day() >= start && r.day() <= end)
                .cloned()
                .collect();
            (!hits.is_empty()).then_some(hits)
        }
        WindowQuery::Latest { end, limit } => {
            let window = windows
                .iter()
                .find(|w| w.upper >= end && w.lower.reaches(end))?;
            let floor = window.lower.edge();
            let candidates: Vec<&T> = records
                .iter()
                .filter(|r| r.day() <= end && floor.map_or(true, |edge| r.day() >= edge))
                .collect();

            let complete = floor.is_none() || candidates.len() >= limit;
            if candidates.is_empty() || !complete {
                return None;
            }
            Some(candidates.into_iter().take(limit).cloned().collect())
        }
    }
}

/// Union by natural key, newest write winning, sorted newest first.
fn merge_records<T: Record>(existing: &[T], incoming: Vec<T>) -> Vec<T> {
    let mut merged: BTreeMap<(Day, String), T> = existing
        .iter()
        .map(|record| (record.natural_key(), record.clone()))
        .collect();
    for record in incoming {
        merged.insert(record.natural_key(), record);
    }
    merged.into_values().rev().collect()
}

#[derive(Debug, Clone)]
struct CacheEntry {
    batch: CachedBatch,
    coverage: Vec<Coverage>,
    written_at: Instant,
}

#[derive(Debug)]
struct CacheInner {
    map: HashMap<CacheKey, CacheEntry>,
    ttl: Option<Duration>,
}

impl CacheInner {
    fn live(&self, key: &CacheKey) -> Option<&CacheEntry> {
        self.map
            .get(key)
            .filter(|entry| self.ttl.map_or(true, |ttl| entry.written_at.elapsed() <= ttl))
    }
}

/// Serializable copy of the whole store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub version: u32,
    pub entries: Vec<SnapshotEntry>,
}

impl CacheSnapshot {
    pub const VERSION: u32 = 1;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub key: CacheKey,
    pub coverage: Vec<Coverage>,
    pub batch: CachedBatch,
}

type Gates = HashMap<CacheKey, Arc<tokio::sync::Mutex<()>>>;
type FetchGates = Arc<Mutex<Gates>>;

fn lock_gates(gates: &FetchGates) -> MutexGuard<'_, Gates> {
    gates.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Guard held while a fetch for one cache key is in flight.
///
/// The key's gate is dropped from the in-flight map once the last holder or
/// waiter lets go, so the map only holds keys with work pending.
#[derive(Debug)]
pub struct FetchSlot {
    guard: Option<OwnedMutexGuard<()>>,
    key: CacheKey,
    in_flight: FetchGates,
}

impl Drop for FetchSlot {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut in_flight = lock_gates(&self.in_flight);
        // Waiters hold a clone of the gate, so a count of one means only the map does.
        if in_flight
            .get(&self.key)
            .is_some_and(|gate| Arc::strong_count(gate) == 1)
        {
            in_flight.remove(&self.key);
        }
    }
}

/// Thread-safe, process-lifetime cache shared by every clone.
///
/// Entries never expire unless a TTL is configured. Reads and writes hold
/// the store lock only for the in-memory work; network calls and backoff
/// sleeps happen outside it.
#[derive(Debug, Clone)]
pub struct CacheStore {
    inner: Arc<RwLock<CacheInner>>,
    in_flight: FetchGates,
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheStore {
    /// Unbounded store: entries live for the life of the process.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Store whose entries read as misses once older than `ttl`.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self::build(Some(ttl))
    }

    fn build(ttl: Option<Duration>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(CacheInner {
                map: HashMap::new(),
                ttl,
            })),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Cached answer for `query`, or `None` when coverage cannot prove it
    /// complete or it would be empty.
    pub async fn lookup<T: Record>(&self, key: &CacheKey, query: &WindowQuery) -> Option<Vec<T>> {
        let store = self.inner.read().await;
        let entry = store.live(key)?;
        let records = T::from_batch(&entry.batch)?;
        let hit = answer(records, &entry.coverage, query);
        debug!(key = %key, hit = hit.is_some(), "cache lookup");
        hit
    }

    /// Merge the result of a single fetch for `query` into the entry for
    /// `key`. Empty batches are not written.
    pub async fn store<T: Record>(&self, key: CacheKey, query: &WindowQuery, records: Vec<T>) {
        let coverage = Coverage::from_fetch(query, &records);
        self.store_with_coverage(key, coverage, records).await;
    }

    /// Merge `records` into the entry for `key`, recording `coverage` as the
    /// window the caller proved complete. Empty batches are not written.
    pub async fn store_with_coverage<T: Record>(
        &self,
        key: CacheKey,
        coverage: Coverage,
        records: Vec<T>,
    ) {
        if records.is_empty() {
            return;
        }

        let mut store = self.inner.write().await;
        let (merged, mut windows) = match store
            .live(&key)
            .and_then(|entry| T::from_batch(&entry.batch).map(|held| (held, &entry.coverage)))
        {
            Some((held, windows)) => (merge_records(held, records), windows.clone()),
            None => (merge_records(&[], records), Vec::new()),
        };
        add_coverage(&mut windows, coverage);

        debug!(key = %key, records = merged.len(), windows = windows.len(), "cache write");
        store.map.insert(
            key,
            CacheEntry {
                batch: T::into_batch(merged),
                coverage: windows,
                written_at: Instant::now(),
            },
        );
    }

    /// Every record held for `key`, newest first.
    pub async fn records<T: Record>(&self, key: &CacheKey) -> Option<Vec<T>> {
        let store = self.inner.read().await;
        let entry = store.live(key)?;
        T::from_batch(&entry.batch).map(<[T]>::to_vec)
    }

    pub async fn coverage(&self, key: &CacheKey) -> Vec<Coverage> {
        let store = self.inner.read().await;
        store
            .live(key)
            .map(|entry| entry.coverage.clone())
            .unwrap_or_default()
    }

    /// Wait until no other fetch for `key` is in flight. Hold the returned
    /// slot for the duration of the fetch and cache write.
    pub async fn acquire_fetch_slot(&self, key: &CacheKey) -> FetchSlot {
        let gate = {
            let mut in_flight = lock_gates(&self.in_flight);
            in_flight
                .entry(key.clone())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        FetchSlot {
            guard: Some(gate.lock_owned().await),
            key: key.clone(),
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    /// Keys with a fetch in flight or queued behind one.
    pub fn pending_fetches(&self) -> usize {
        lock_gates(&self.in_flight).len()
    }

    pub async fn clear_expired(&self) {
        let mut store = self.inner.write().await;
        if let Some(ttl) = store.ttl {
            store.map.retain(|_, entry| entry.written_at.elapsed() <= ttl);
        }
    }

    pub async fn clear(&self) {
        let mut store = self.inner.write().await;
        store.map.clear();
    }

    /// Number of entries, including expired ones not yet cleared.
    pub async fn len(&self) -> usize {
        let store = self.inner.read().await;
        store.map.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn snapshot(&self) -> CacheSnapshot {
        let store = self.inner.read().await;
        let mut entries: Vec<SnapshotEntry> = store
            .map
            .iter()
            .filter(|(key, _)| store.live(key).is_some())
            .map(|(key, entry)| SnapshotEntry {
                key: key.clone(),
                coverage: entry.coverage.clone(),
                batch: entry.batch.clone(),
            })
            .collect();
        entries.sort_by(|a, b| a.key.to_string().cmp(&b.key.to_string()));
        CacheSnapshot {
            version: CacheSnapshot::VERSION,
            entries,
        }
    }

    /// Replace the store's contents with `snapshot`.
    pub async fn restore(&self, snapshot: CacheSnapshot) -> Result<(), PersistenceError> {
        if snapshot.version != CacheSnapshot::VERSION {
            return Err(PersistenceError::Version {
                found: snapshot.version,
                expected: CacheSnapshot::VERSION,
            });
        }

        let now = Instant::now();
        let mut store = self.inner.write().await;
        store.map = snapshot
            .entries
            .into_iter()
            .filter(|entry| entry.batch.key_family() == entry.key.family)
            .map(|entry| {
                (
                    entry.key,
                    CacheEntry {
                        batch: entry.batch,
                        coverage: entry.coverage,
                        written_at: now,
                    },
                )
            })
            .collect();
        Ok(())
    }

    /// Restore from `persistence` if it holds a snapshot. Returns whether one was loaded.
    pub async fn load_from(
        &self,
        persistence: &dyn CachePersistence,
    ) -> Result<bool, PersistenceError> {
        match persistence.load()? {
            Some(snapshot) => {
                self.restore(snapshot).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn save_to(&self, persistence: &dyn CachePersistence) -> Result<(), PersistenceError> {
        let snapshot = self.snapshot().await;
        persistence.save(&snapshot)
    }
}

impl CachedBatch {
    fn key_family(&self) -> RecordFamily {
        match self {
            Self::Prices(_) => RecordFamily::Prices,
            Self::FinancialMetrics(_) => RecordFamily::FinancialMetrics,
            Self::LineItems(_) => RecordFamily::LineItems,
            Self::InsiderTrades(_) => RecordFamily::InsiderTrades,
            Self::CompanyNews(_) => RecordFamily::CompanyNews,
        }
    }
}
