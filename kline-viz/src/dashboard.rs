//! Instrument selector plus chart panel, wired to the query layer.
//!
//! Both queries are keyed by a client-side refresh counter. Bumping it (e.g. after an upload
//! completes) is what forces fresh data; chart-type changes never reach the data source.

use crate::{
    api::ApiClient,
    chart::{ChartKind, ChartView},
    error::ApiError,
    model::{ChartDataRequest, ChartDataResponse},
    query::{QueryClient, QueryObserver, QueryResult, QueryState},
    session::SessionManager,
};
use futures::{FutureExt, future::BoxFuture};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

/// Where dashboard data comes from.
pub trait KlineSource: Send + Sync + 'static {
    fn instruments(&self) -> BoxFuture<'static, Result<Vec<String>, ApiError>>;

    fn chart_data(
        &self,
        request: ChartDataRequest,
    ) -> BoxFuture<'static, Result<ChartDataResponse, ApiError>>;
}

/// [`KlineSource`] backed by the REST API, attaching the session's current credentials to
/// each request. A response rejecting those credentials ends the session.
#[derive(Debug, Clone)]
pub struct ApiSource {
    session: Arc<SessionManager>,
}

impl ApiSource {
    pub fn new(session: Arc<SessionManager>) -> Self {
        Self { session }
    }

    fn api(&self) -> ApiClient {
        self.session.api().clone()
    }
}

impl KlineSource for ApiSource {
    fn instruments(&self) -> BoxFuture<'static, Result<Vec<String>, ApiError>> {
        let api = self.api();
        let session = Arc::clone(&self.session);
        let credentials = session.credentials();
        async move {
            api.instruments(credentials.as_ref())
                .await
                .inspect_err(|error| end_rejected_session(&session, error))
        }
        .boxed()
    }

    fn chart_data(
        &self,
        request: ChartDataRequest,
    ) -> BoxFuture<'static, Result<ChartDataResponse, ApiError>> {
        let api = self.api();
        let session = Arc::clone(&self.session);
        let credentials = session.credentials();
        async move {
            api.chart_data(&request, credentials.as_ref())
                .await
                .inspect_err(|error| end_rejected_session(&session, error))
        }
        .boxed()
    }
}

fn end_rejected_session(session: &SessionManager, error: &ApiError) {
    match session.handle_api_error(error) {
        Ok(true) => warn!(%error, "session rejected by backend, please log in again"),
        Ok(false) => {}
        Err(store_error) => warn!(%store_error, "failed to clear rejected session"),
    }
}

/// Cache key of a chart query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChartKey {
    pub instrument: String,
    pub refresh: u64,
}

pub struct Dashboard {
    source: Arc<dyn KlineSource>,
    refresh: u64,
    instrument: Option<String>,
    instruments: QueryObserver<u64, Vec<String>>,
    chart: QueryObserver<ChartKey, ChartDataResponse>,
    view: ChartView,
}

impl Dashboard {
    pub fn new(source: Arc<dyn KlineSource>) -> Self {
        Self::with_view(source, ChartView::default())
    }

    pub fn with_view(source: Arc<dyn KlineSource>, view: ChartView) -> Self {
        Self {
            source,
            refresh: 0,
            instrument: None,
            instruments: QueryObserver::new(QueryClient::new()),
            chart: QueryObserver::new(QueryClient::new()),
            view,
        }
    }

    pub fn refresh_token(&self) -> u64 {
        self.refresh
    }

    pub fn instrument(&self) -> Option<&str> {
        self.instrument.as_deref()
    }

    /// Query the instrument list for the current refresh token.
    pub fn load_instruments(&self) -> BoxFuture<'static, QueryResult<Vec<String>>> {
        let source = Arc::clone(&self.source);
        self.instruments
            .observe(self.refresh, move || source.instruments())
    }

    pub fn instruments_state(&self) -> QueryState<Vec<String>> {
        self.instruments.snapshot()
    }

    /// Switch the chart to `instrument` and query its data.
    pub fn select_instrument(
        &mut self,
        instrument: impl Into<String>,
    ) -> BoxFuture<'static, QueryResult<ChartDataResponse>> {
        let instrument = instrument.into();
        self.view.set_title(instrument.clone());
        self.instrument = Some(instrument.clone());
        self.observe_chart(instrument)
    }

    /// Query chart data for the selected instrument and current refresh token, if an
    /// instrument is selected.
    pub fn load_chart(&self) -> Option<BoxFuture<'static, QueryResult<ChartDataResponse>>> {
        let instrument = self.instrument.clone()?;
        Some(self.observe_chart(instrument))
    }

    fn observe_chart(&self, instrument: String) -> BoxFuture<'static, QueryResult<ChartDataResponse>> {
        let key = ChartKey {
            instrument: instrument.clone(),
            refresh: self.refresh,
        };

        let source = Arc::clone(&self.source);
        self.chart.observe(key, move || {
            source.chart_data(ChartDataRequest::new(instrument))
        })
    }

    /// Manual retry of the chart query after a failure.
    pub fn retry_chart(&self) -> BoxFuture<'static, QueryResult<ChartDataResponse>> {
        let source = Arc::clone(&self.source);
        let instrument = self
            .chart
            .current_key()
            .map(|key| key.instrument)
            .unwrap_or_default();

        self.chart
            .refetch(move || source.chart_data(ChartDataRequest::new(instrument)))
    }

    /// Advance the refresh token, dropping entries cached under older tokens. Call
    /// [`Self::load_instruments`] and [`Self::load_chart`] afterwards to fetch fresh data.
    pub fn bump_refresh(&mut self) -> u64 {
        self.refresh += 1;
        let refresh = self.refresh;

        self.instruments
            .client()
            .invalidate_matching(|token| *token < refresh);
        self.chart
            .client()
            .invalidate_matching(|key| key.refresh < refresh);

        info!(refresh, "refresh token advanced");
        refresh
    }

    pub fn chart_state(&self) -> QueryState<ChartDataResponse> {
        self.chart.snapshot()
    }

    pub fn chart_kind(&self) -> ChartKind {
        self.view.kind()
    }

    pub fn set_chart_kind(&mut self, kind: ChartKind) -> bool {
        self.view.set_kind(kind)
    }

    pub fn toggle_chart_kind(&mut self) -> ChartKind {
        self.view.toggle()
    }

    /// Chart option for what the panel currently displays; a placeholder while nothing has
    /// loaded.
    pub fn chart_option(&self) -> Value {
        let records = self
            .chart
            .snapshot()
            .data
            .map(|response| response.records())
            .unwrap_or_default();

        self.view.option(&records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        chart::PLACEHOLDER_TITLE,
        config::ClientConfig,
        session::{MemoryTokenStore, TokenStore},
        test_util::{MockResponse, serve_once},
    };
    use futures::future;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSource {
        instrument_calls: AtomicUsize,
        chart_calls: AtomicUsize,
    }

    impl KlineSource for CountingSource {
        fn instruments(&self) -> BoxFuture<'static, Result<Vec<String>, ApiError>> {
            let call = self.instrument_calls.fetch_add(1, Ordering::SeqCst);
            let mut instruments = vec!["IF2403".to_string()];
            if call > 0 {
                instruments.push("IC2403".to_string());
            }
            future::ready(Ok(instruments)).boxed()
        }

        fn chart_data(
            &self,
            request: ChartDataRequest,
        ) -> BoxFuture<'static, Result<ChartDataResponse, ApiError>> {
            let call = self.chart_calls.fetch_add(1, Ordering::SeqCst) as f64;
            future::ready(Ok(ChartDataResponse {
                instrument: request.instrument,
                data: vec![
                    vec![Some(1_704_067_200_000.0), Some(1.0), Some(2.0 + call), Some(0.5), Some(3.0), Some(10.0)],
                    vec![Some(1_704_153_600_000.0), Some(2.0), Some(3.0 + call), Some(1.5), Some(4.0), Some(20.0)],
                ],
            }))
            .boxed()
        }
    }

    #[tokio::test]
    async fn test_toggling_chart_kind_never_refetches() {
        let source = Arc::new(CountingSource::default());
        let mut dashboard = Dashboard::new(source.clone());

        dashboard.select_instrument("IF2403").await.unwrap();
        assert_eq!(source.chart_calls.load(Ordering::SeqCst), 1);

        let candles = dashboard.chart_option();
        dashboard.toggle_chart_kind();
        let line = dashboard.chart_option();
        dashboard.set_chart_kind(ChartKind::Candlestick);
        let _ = dashboard.chart_option();

        assert_eq!(source.chart_calls.load(Ordering::SeqCst), 1);
        assert_eq!(candles["series"][0]["type"], "candlestick");
        assert_eq!(line["series"][0]["type"], "line");
    }

    #[tokio::test]
    async fn test_refresh_token_triggers_one_new_fetch_and_replaces_data() {
        let source = Arc::new(CountingSource::default());
        let mut dashboard = Dashboard::new(source.clone());

        dashboard.select_instrument("IF2403").await.unwrap();
        // Same key again is served from cache
        dashboard.load_chart().unwrap().await.unwrap();
        assert_eq!(source.chart_calls.load(Ordering::SeqCst), 1);

        dashboard.bump_refresh();
        let reload = dashboard.load_chart().unwrap();
        let duplicate = dashboard.load_chart().unwrap();
        let (reload, duplicate) = tokio::join!(reload, duplicate);

        assert_eq!(source.chart_calls.load(Ordering::SeqCst), 2);
        assert!(Arc::ptr_eq(&reload.unwrap(), &duplicate.unwrap()));

        let displayed = dashboard.chart_state().data.unwrap();
        assert_eq!(displayed.records()[0].close, 3.0);
    }

    #[tokio::test]
    async fn test_upload_refresh_reloads_instrument_list() {
        let source = Arc::new(CountingSource::default());
        let mut dashboard = Dashboard::new(source.clone());

        let before = dashboard.load_instruments().await.unwrap();
        assert_eq!(before.len(), 1);

        dashboard.bump_refresh();
        let after = dashboard.load_instruments().await.unwrap();

        assert_eq!(after.len(), 2);
        assert_eq!(source.instrument_calls.load(Ordering::SeqCst), 2);
        assert_eq!(dashboard.instruments_state().data.unwrap().len(), 2);
    }

    #[test]
    fn test_chart_option_before_load_is_placeholder() {
        let dashboard = Dashboard::new(Arc::new(CountingSource::default()));
        assert!(dashboard.load_chart().is_none());
        assert_eq!(dashboard.chart_option()["title"]["text"], PLACEHOLDER_TITLE);
    }

    #[tokio::test]
    async fn test_retry_chart_refetches_current_key() {
        let source = Arc::new(CountingSource::default());
        let mut dashboard = Dashboard::new(source.clone());

        dashboard.select_instrument("IF2403").await.unwrap();
        dashboard.retry_chart().await.unwrap();

        assert_eq!(source.chart_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_rejected_credentials_end_session() {
        let (base_url, request) = serve_once(MockResponse::status(
            401,
            r#"{"detail":"Token expired"}"#,
        ))
        .await;

        let store = Arc::new(MemoryTokenStore::default());
        store.set("expired-token").unwrap();
        let api = ApiClient::new(&ClientConfig::new(base_url)).unwrap();
        let session = Arc::new(SessionManager::new(api, store.clone()).unwrap());
        assert!(session.is_authenticated());

        let mut dashboard = Dashboard::new(Arc::new(ApiSource::new(Arc::clone(&session))));
        let error = dashboard.select_instrument("IF2403").await.unwrap_err();

        assert!(error.is_auth_failure());
        assert_eq!(error.message, "not authorised: Token expired");
        assert!(dashboard.chart_state().error.is_some_and(|error| error.is_auth_failure()));
        assert!(!session.is_authenticated());
        assert_eq!(store.get().unwrap(), None);
        assert!(request.await.unwrap().contains("Bearer expired-token"));
    }
}
