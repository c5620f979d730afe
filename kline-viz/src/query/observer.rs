use super::{QueryClient, QueryResult, QueryState};
use crate::error::QueryError;
use futures::{
    FutureExt,
    future::{self, BoxFuture},
};
use parking_lot::Mutex;
use std::{
    fmt::Debug,
    future::Future,
    hash::Hash,
    sync::Arc,
};
use tracing::debug;

struct ObserverState<K, T> {
    current: Option<K>,
    /// Sequence number of the most recently issued request; only its outcome is displayed.
    latest: u64,
    displayed: QueryState<T>,
}

/// Per-view handle onto a [`QueryClient`] that tracks which key the view currently shows.
///
/// Results are applied latest-request-wins: once a newer request is issued, whether for another
/// key, a refetch, or the same key after invalidation, the outcome of an older request is still
/// returned to its caller but never replaces what the view shows.
pub struct QueryObserver<K, T> {
    client: QueryClient<K, T>,
    state: Arc<Mutex<ObserverState<K, T>>>,
}

impl<K, T> Clone for QueryObserver<K, T> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            state: Arc::clone(&self.state),
        }
    }
}

impl<K, T> QueryObserver<K, T>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    pub fn new(client: QueryClient<K, T>) -> Self {
        Self {
            client,
            state: Arc::new(Mutex::new(ObserverState {
                current: None,
                latest: 0,
                displayed: QueryState::idle(),
            })),
        }
    }

    pub fn client(&self) -> &QueryClient<K, T> {
        &self.client
    }

    /// Key most recently passed to [`Self::observe`].
    pub fn current_key(&self) -> Option<K> {
        self.state.lock().current.clone()
    }

    /// What the view should render right now.
    pub fn snapshot(&self) -> QueryState<T> {
        self.state.lock().displayed.clone()
    }

    /// Switch the view to `key` and issue its query.
    ///
    /// Previously displayed data stays visible, flagged as loading, until the new key
    /// resolves.
    pub fn observe<F, Fut, E>(
        &self,
        key: K,
        fetcher: F,
    ) -> BoxFuture<'static, QueryResult<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<QueryError>,
    {
        let request = self.client.fetch(key.clone(), fetcher);
        self.track(key, request)
    }

    /// Manually re-run the query for the current key, e.g. from a retry button.
    pub fn refetch<F, Fut, E>(
        &self,
        fetcher: F,
    ) -> BoxFuture<'static, QueryResult<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<QueryError>,
    {
        let Some(key) = self.current_key() else {
            return future::ready(Err(QueryError::new(
                "nothing to refetch: no query observed yet",
            )))
            .boxed();
        };

        let request = self.client.refetch(key.clone(), fetcher);
        self.track(key, request)
    }

    fn track<Fut>(
        &self,
        key: K,
        request: Fut,
    ) -> BoxFuture<'static, QueryResult<T>>
    where
        Fut: Future<Output = QueryResult<T>> + Send + 'static,
    {
        let sequence = {
            let mut state = self.state.lock();
            state.latest += 1;
            state.current = Some(key.clone());
            state.displayed.is_loading = true;
            state.latest
        };

        let state = Arc::clone(&self.state);
        async move {
            let result = request.await;
            apply(&state, sequence, &key, &result);
            result
        }
        .boxed()
    }
}

fn apply<K, T>(
    state: &Mutex<ObserverState<K, T>>,
    sequence: u64,
    key: &K,
    result: &QueryResult<T>,
) where
    K: Debug,
{
    let mut state = state.lock();
    if state.latest != sequence {
        debug!(?key, sequence, latest = state.latest, "ignoring result of superseded request");
        return;
    }

    state.displayed.is_loading = false;
    match result {
        Ok(data) => {
            state.displayed.data = Some(Arc::clone(data));
            state.displayed.error = None;
        }
        Err(error) => state.displayed.error = Some(error.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_stale_key_result_never_replaces_newer_key() {
        let observer = QueryObserver::<(&'static str, u64), u32>::new(QueryClient::new());
        let (stale_tx, stale_rx) = oneshot::channel::<u32>();

        let stale = observer.observe(("IF2403", 0), move || async move {
            stale_rx.await.map_err(|error| error.to_string())
        });
        let fresh = observer.observe(("IF2403", 1), || future::ready(Ok::<_, String>(2)));

        assert_eq!(*fresh.await.unwrap(), 2);
        assert_eq!(observer.snapshot().data.as_deref(), Some(&2));

        stale_tx.send(1).unwrap();
        assert_eq!(*stale.await.unwrap(), 1);

        let snapshot = observer.snapshot();
        assert_eq!(snapshot.data.as_deref(), Some(&2));
        assert!(!snapshot.is_loading);
        assert_eq!(observer.current_key(), Some(("IF2403", 1)));
    }

    #[tokio::test]
    async fn test_refetch_supersedes_in_flight_request_for_same_key() {
        let observer = QueryObserver::<u64, u32>::new(QueryClient::new());
        let (slow_tx, slow_rx) = oneshot::channel::<u32>();

        let slow = observer.observe(0, move || async move {
            slow_rx.await.map_err(|error| error.to_string())
        });
        let retried = observer
            .refetch(|| future::ready(Ok::<_, String>(2)))
            .await
            .unwrap();
        assert_eq!(*retried, 2);

        slow_tx.send(1).unwrap();
        assert_eq!(*slow.await.unwrap(), 1);

        assert_eq!(observer.client().state(&0).data.as_deref(), Some(&2));
        assert_eq!(observer.snapshot().data.as_deref(), Some(&2));
        assert!(!observer.snapshot().is_loading);
    }

    #[tokio::test]
    async fn test_request_issued_before_invalidation_never_replaces_newer_one() {
        let observer = QueryObserver::<u64, u32>::new(QueryClient::new());
        let (slow_tx, slow_rx) = oneshot::channel::<u32>();

        let slow = observer.observe(0, move || async move {
            slow_rx.await.map_err(|error| error.to_string())
        });
        observer.client().invalidate(&0);
        observer
            .observe(0, || future::ready(Ok::<_, String>(2)))
            .await
            .unwrap();

        slow_tx.send(1).unwrap();
        assert_eq!(*slow.await.unwrap(), 1);

        assert_eq!(observer.client().state(&0).data.as_deref(), Some(&2));
        assert_eq!(observer.snapshot().data.as_deref(), Some(&2));
    }

    #[tokio::test]
    async fn test_previous_data_stays_visible_while_new_key_loads() {
        let observer = QueryObserver::<u64, u32>::new(QueryClient::new());

        observer
            .observe(0, || future::ready(Ok::<_, String>(10)))
            .await
            .unwrap();

        let (tx, rx) = oneshot::channel::<u32>();
        let pending = observer.observe(1, move || async move {
            rx.await.map_err(|error| error.to_string())
        });

        let loading = observer.snapshot();
        assert!(loading.is_loading);
        assert_eq!(loading.data.as_deref(), Some(&10));

        tx.send(20).unwrap();
        pending.await.unwrap();

        let loaded = observer.snapshot();
        assert!(!loaded.is_loading);
        assert_eq!(loaded.data.as_deref(), Some(&20));
    }

    #[tokio::test]
    async fn test_error_is_displayed_and_manual_refetch_recovers() {
        let observer = QueryObserver::<u64, u32>::new(QueryClient::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let failed = observer
            .observe(0, || future::ready(Err::<u32, _>("network error".to_string())))
            .await;
        assert!(failed.is_err());
        assert_eq!(
            observer.snapshot().error,
            Some(QueryError::new("network error"))
        );

        let retried = {
            let calls = Arc::clone(&calls);
            observer
                .refetch(move || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    future::ready(Ok::<_, String>(3))
                })
                .await
        };

        assert_eq!(*retried.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(observer.snapshot().error.is_none());
        assert_eq!(observer.snapshot().data.as_deref(), Some(&3));
    }

    #[tokio::test]
    async fn test_refetch_without_observed_key_fails() {
        let observer = QueryObserver::<u64, u32>::new(QueryClient::new());
        let result = observer
            .refetch(|| future::ready(Ok::<_, String>(1)))
            .await;
        assert!(result.is_err());
    }
}
