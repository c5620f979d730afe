#![warn(unused, clippy::cloned_instead_of_copied)]
#![allow(clippy::type_complexity)]

//! # Kline Viz
//! Client-side pipeline for a futures kline service: upload CSV datasets, pick an instrument,
//! and render its candles as an ECharts option.
//!
//! The library includes:
//! - REST client for the kline service ([`api::ApiClient`])
//! - Explicit per-request credentials and a persisted session ([`session::SessionManager`])
//! - Keyed query cache with in-flight de-duplication ([`query::QueryClient`])
//! - OHLCV transforms and simple moving averages ([`transform`])
//! - Chart option builders plus the chart-type state machine ([`chart`])
//! - Instrument selector and chart panel wired together ([`dashboard::Dashboard`])

/// REST endpoints of the kline service.
pub mod api;

/// ECharts option construction.
pub mod chart;

/// Client configuration sourced from the environment.
pub mod config;

/// Instrument list and chart panel state.
pub mod dashboard;

/// All [`Error`](std::error::Error)s generated in Kline Viz.
pub mod error;

/// Wire and domain data types.
pub mod model;

/// Keyed async query cache.
pub mod query;

/// Credentials, token persistence and the session lifecycle.
pub mod session;

/// Record-to-series transforms.
pub mod transform;

#[cfg(test)]
mod test_util;

// Re-export commonly used types for convenience
pub use api::ApiClient;
pub use chart::{ChartKind, ChartOptionBuilder, ChartView, MaOverlay, build_chart_option};
pub use config::ClientConfig;
pub use dashboard::{ApiSource, ChartKey, Dashboard, KlineSource};
pub use error::{ApiError, QueryError, SessionError, TransformError};
pub use model::{ChartDataRequest, ChartDataResponse, OhlcvRecord};
pub use query::{QueryClient, QueryObserver, QueryState};
pub use session::{Credentials, FileTokenStore, MemoryTokenStore, SessionManager, TokenStore};
pub use transform::{MaPoint, moving_average, to_candlestick_series, to_line_series};
