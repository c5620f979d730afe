//! Keyed query cache with in-flight request deduplication.
//!
//! A query key identifies the request parameters plus a client-side refresh counter. Equal keys
//! share one underlying request while it is in flight and one cached result after it settles.
//! Bumping the refresh counter produces a new key, which is the only way to force a refetch
//! besides [`QueryClient::refetch`]. Nothing is retried automatically.

use crate::error::QueryError;
use futures::{
    FutureExt,
    future::{self, BoxFuture, Either, Ready, Shared},
};
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    fmt::Debug,
    future::Future,
    hash::Hash,
    sync::{
        Arc, Weak,
        atomic::{AtomicU64, Ordering},
    },
};
use tracing::debug;

mod observer;

pub use observer::QueryObserver;

/// Outcome of a query, shared between every waiter of the same request.
pub type QueryResult<T> = Result<Arc<T>, QueryError>;

type SharedFetch<T> = Shared<BoxFuture<'static, QueryResult<T>>>;

/// Future returned by [`QueryClient::fetch`]: either an immediately available cached outcome
/// or a handle onto the shared in-flight request.
pub type QueryFuture<T> = Either<Ready<QueryResult<T>>, SharedFetch<T>>;

/// Snapshot of a cache entry as a view would render it.
#[derive(Debug)]
pub struct QueryState<T> {
    /// Last successful result.
    pub data: Option<Arc<T>>,
    pub is_loading: bool,
    pub error: Option<QueryError>,
}

impl<T> QueryState<T> {
    pub fn idle() -> Self {
        Self {
            data: None,
            is_loading: false,
            error: None,
        }
    }
}

impl<T> Default for QueryState<T> {
    fn default() -> Self {
        Self::idle()
    }
}

impl<T> Clone for QueryState<T> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            is_loading: self.is_loading,
            error: self.error.clone(),
        }
    }
}

struct CacheEntry<T> {
    generation: u64,
    data: Option<Arc<T>>,
    error: Option<QueryError>,
    in_flight: Option<SharedFetch<T>>,
}

impl<T> CacheEntry<T> {
    fn state(&self) -> QueryState<T> {
        QueryState {
            data: self.data.clone(),
            is_loading: self.in_flight.is_some(),
            error: self.error.clone(),
        }
    }
}

struct Inner<K, T> {
    entries: Mutex<HashMap<K, CacheEntry<T>>>,
    next_generation: AtomicU64,
}

impl<K, T> Inner<K, T>
where
    K: Eq + Hash + Debug,
{
    /// Store a settled outcome, unless the entry was invalidated or replaced by a newer
    /// request while this one was in flight.
    fn settle(&self, key: &K, generation: u64, result: &QueryResult<T>) {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(key).filter(|entry| entry.generation == generation)
        else {
            debug!(?key, generation, "discarding superseded query result");
            return;
        };

        entry.in_flight = None;
        match result {
            Ok(data) => {
                entry.data = Some(Arc::clone(data));
                entry.error = None;
            }
            Err(error) => {
                debug!(?key, generation, %error, "query failed");
                entry.error = Some(error.clone());
            }
        }
    }
}

/// Shared, cloneable query cache for results of type `T` keyed by `K`.
pub struct QueryClient<K, T> {
    inner: Arc<Inner<K, T>>,
}

impl<K, T> Clone for QueryClient<K, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, T> Default for QueryClient<K, T> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(0),
            }),
        }
    }
}

enum Lookup<T> {
    Hit(Arc<T>),
    Failed(QueryError),
    Join(SharedFetch<T>),
    Miss,
}

impl<K, T> QueryClient<K, T>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a query for `key`.
    ///
    /// The request is registered immediately: a cached success or failure is returned as is,
    /// an in-flight request for the same key is joined, otherwise `fetcher` is invoked to
    /// start a new one. `fetcher` runs under the cache lock and must only build the future.
    pub fn fetch<F, Fut, E>(&self, key: K, fetcher: F) -> QueryFuture<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<QueryError>,
    {
        let mut entries = self.inner.entries.lock();

        let lookup = match entries.get(&key) {
            Some(entry) => match (&entry.in_flight, &entry.data, &entry.error) {
                (Some(in_flight), _, _) => Lookup::Join(in_flight.clone()),
                (None, _, Some(error)) => Lookup::Failed(error.clone()),
                (None, Some(data), None) => Lookup::Hit(Arc::clone(data)),
                (None, None, None) => Lookup::Miss,
            },
            None => Lookup::Miss,
        };

        match lookup {
            Lookup::Hit(data) => {
                debug!(?key, "query cache hit");
                Either::Left(future::ready(Ok(data)))
            }
            Lookup::Failed(error) => Either::Left(future::ready(Err(error))),
            Lookup::Join(in_flight) => {
                debug!(?key, "joining in-flight query");
                Either::Right(in_flight)
            }
            Lookup::Miss => Either::Right(self.start(&mut entries, key, fetcher)),
        }
    }

    /// Start a new request for `key` regardless of what is cached, keeping the last
    /// successful result visible until the new one settles. A request already in flight for
    /// the key is superseded and its outcome discarded.
    pub fn refetch<F, Fut, E>(&self, key: K, fetcher: F) -> QueryFuture<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<QueryError>,
    {
        let mut entries = self.inner.entries.lock();
        Either::Right(self.start(&mut entries, key, fetcher))
    }

    fn start<F, Fut, E>(
        &self,
        entries: &mut HashMap<K, CacheEntry<T>>,
        key: K,
        fetcher: F,
    ) -> SharedFetch<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<QueryError>,
    {
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        debug!(?key, generation, "starting query");

        let request = fetcher();
        let inner: Weak<Inner<K, T>> = Arc::downgrade(&self.inner);
        let settle_key = key.clone();

        let in_flight = async move {
            let result: QueryResult<T> = request
                .await
                .map(Arc::new)
                .map_err(Into::into);

            if let Some(inner) = inner.upgrade() {
                inner.settle(&settle_key, generation, &result);
            }

            result
        }
        .boxed()
        .shared();

        let entry = entries.entry(key).or_insert_with(|| CacheEntry {
            generation,
            data: None,
            error: None,
            in_flight: None,
        });
        entry.generation = generation;
        entry.in_flight = Some(in_flight.clone());

        in_flight
    }

    /// Snapshot of the entry for `key`; idle if nothing was ever fetched.
    pub fn state(&self, key: &K) -> QueryState<T> {
        self.inner
            .entries
            .lock()
            .get(key)
            .map(CacheEntry::state)
            .unwrap_or_default()
    }

    /// Drop the entry for `key`. An in-flight request keeps running but its outcome is
    /// discarded.
    pub fn invalidate(&self, key: &K) {
        if self.inner.entries.lock().remove(key).is_some() {
            debug!(?key, "invalidated query");
        }
    }

    /// Drop every entry whose key matches `predicate`, returning how many were removed.
    pub fn invalidate_matching<P>(&self, mut predicate: P) -> usize
    where
        P: FnMut(&K) -> bool,
    {
        let mut entries = self.inner.entries.lock();
        let before = entries.len();
        entries.retain(|key, _| !predicate(key));
        let removed = before - entries.len();
        debug!(removed, "invalidated matching queries");
        removed
    }

    pub fn clear(&self) {
        self.inner.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.lock().is_empty()
    }
}
