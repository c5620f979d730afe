//! Core data types exchanged with the kline backend.
//!
//! These types match the JSON payloads served under `/api` by the backend.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Deserializer, Serialize};

/// Open/High/Low/Close/Volume record for one time interval.
///
/// The `low <= min(open, close) <= max(open, close) <= high` relation is assumed valid from
/// upstream and never checked. Missing or malformed numeric fields are carried as `NaN`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct OhlcvRecord {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl OhlcvRecord {
    /// Decode a positional chart-data row `[timestamp_ms, open, close, low, high, volume]`.
    ///
    /// Absent or `null` fields become `NaN`. A non-finite timestamp saturates to the epoch.
    pub fn from_row(row: &[Option<f64>]) -> Self {
        let field = |index: usize| row.get(index).copied().flatten().unwrap_or(f64::NAN);

        Self {
            timestamp: timestamp_from_millis(field(0)),
            open: field(1),
            close: field(2),
            low: field(3),
            high: field(4),
            volume: field(5),
        }
    }

    /// Milliseconds since the unix epoch, the time unit used by every chart series.
    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }
}

fn timestamp_from_millis(millis: f64) -> DateTime<Utc> {
    // `as` saturates and maps NaN to 0
    DateTime::from_timestamp_millis(millis as i64).unwrap_or(DateTime::UNIX_EPOCH)
}

/// Body of `POST /futures/chart-data`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChartDataRequest {
    pub instrument: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
}

impl ChartDataRequest {
    pub fn new(instrument: impl Into<String>) -> Self {
        Self {
            instrument: instrument.into(),
            ..Default::default()
        }
    }

    pub fn with_range(mut self, start_time: Option<String>, end_time: Option<String>) -> Self {
        self.start_time = start_time;
        self.end_time = end_time;
        self
    }

    pub fn with_interval(mut self, interval: impl Into<String>) -> Self {
        self.interval = Some(interval.into());
        self
    }
}

/// Response of `POST /futures/chart-data`.
///
/// Each row of `data` is `[timestamp_ms, open, close, low, high, volume]`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ChartDataResponse {
    pub instrument: String,
    #[serde(default)]
    pub data: Vec<Vec<Option<f64>>>,
}

impl ChartDataResponse {
    /// Decode every positional row into an [`OhlcvRecord`], preserving order.
    pub fn records(&self) -> Vec<OhlcvRecord> {
        self.data.iter().map(|row| OhlcvRecord::from_row(row)).collect()
    }
}

/// One raw futures row from the paged `GET /futures/data` listing.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FuturesData {
    pub instrument: String,
    pub time: String,
    #[serde(default, alias = "interface")]
    pub interval: Option<String>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    #[serde(default)]
    pub open_interest: Option<f64>,
}

/// Query parameters of `GET /futures/data`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FuturesDataQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instrument: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
}

/// Response of `GET /futures/data`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FuturesDataPage {
    pub data: Vec<FuturesData>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

/// Response of `POST /futures/upload`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub filename: String,
    pub records_count: u64,
}

/// Response of `POST /data/upload-csv`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DatasetUploadResponse {
    pub filename: String,
    #[serde(default)]
    pub file_size: u64,
    #[serde(default)]
    pub dataset_id: Option<String>,
}

/// Response of `DELETE /futures/data`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ClearDataResponse {
    pub message: String,
    pub deleted_count: u64,
}

/// Identifier of an uploaded dataset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, Deserialize, Serialize)]
#[serde(transparent)]
pub struct DatasetId(pub String);

impl From<&str> for DatasetId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Uploaded dataset summary from `GET /data/datasets`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Dataset {
    pub id: DatasetId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(deserialize_with = "de_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub record_count: u64,
}

/// Stored kline row from `GET /data/datasets/{id}/kline-data`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct KlineData {
    #[serde(deserialize_with = "de_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub open_price: f64,
    pub high_price: f64,
    pub low_price: f64,
    pub close_price: f64,
    pub volume: f64,
}

impl From<KlineData> for OhlcvRecord {
    fn from(kline: KlineData) -> Self {
        Self {
            timestamp: kline.timestamp,
            open: kline.open_price,
            high: kline.high_price,
            low: kline.low_price,
            close: kline.close_price,
            volume: kline.volume,
        }
    }
}

/// Authenticated user profile.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(deserialize_with = "de_timestamp")]
    pub created_at: DateTime<Utc>,
}

/// Body of `POST /auth/login`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Body of `POST /auth/register`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Response of `POST /auth/login` and `POST /auth/register`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    pub user: User,
}

/// Deserialize a timestamp that may be RFC3339, a naive ISO datetime (assumed UTC) or a bare
/// date.
pub fn de_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
}

/// Parse the timestamp formats the backend emits.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
        return Some(timestamp.with_timezone(&Utc));
    }

    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .map(|naive| naive.and_utc())
}
