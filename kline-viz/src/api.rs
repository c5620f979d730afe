//! Typed REST client for the kline backend.
//!
//! Authenticated endpoints take the caller's [`Credentials`] explicitly; the client itself
//! holds no session state.

use crate::{
    config::ClientConfig,
    error::ApiError,
    model::{
        AuthResponse, ChartDataRequest, ChartDataResponse, ClearDataResponse, Dataset,
        DatasetId, DatasetUploadResponse, FuturesDataPage, FuturesDataQuery, KlineData,
        LoginRequest, RegisterRequest, UploadResponse, User,
    },
    session::Credentials,
};
use reqwest::{
    Client, Method, RequestBuilder,
    header::AUTHORIZATION,
    multipart::{Form, Part},
};
use serde::de::DeserializeOwned;
use std::path::Path;
use tracing::{debug, info, warn};
use url::Url;

/// Default row limit of the dataset preview endpoint.
pub const DEFAULT_PREVIEW_LIMIT: u32 = 100;

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        // endpoints are joined onto this base as plain strings
        Url::parse(&config.base_url)
            .map_err(|error| ApiError::Transport(format!("invalid base url: {error}")))?;

        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(ApiError::from)?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(
        &self,
        method: Method,
        path: &str,
        credentials: Option<&Credentials>,
    ) -> RequestBuilder {
        let builder = self.http.request(method, self.endpoint(path));
        match credentials {
            Some(credentials) => builder.header(AUTHORIZATION, credentials.authorization()),
            None => builder,
        }
    }

    async fn execute(builder: RequestBuilder) -> Result<String, ApiError> {
        let response = builder.send().await?;
        let status = response.status();
        let url = response.url().clone();
        let body = response.text().await?;

        if status.is_success() {
            debug!(%url, %status, bytes = body.len(), "request succeeded");
            Ok(body)
        } else {
            let error = ApiError::from_status(status, &body);
            warn!(%url, %status, %error, "request failed");
            Err(error)
        }
    }

    async fn send<R>(builder: RequestBuilder) -> Result<R, ApiError>
    where
        R: DeserializeOwned,
    {
        let body = Self::execute(builder).await?;
        serde_json::from_str(&body).map_err(|error| ApiError::Decode(error.to_string()))
    }

    /// `GET /futures/instruments`
    pub async fn instruments(
        &self,
        credentials: Option<&Credentials>,
    ) -> Result<Vec<String>, ApiError> {
        Self::send(self.request(Method::GET, "futures/instruments", credentials)).await
    }

    /// `POST /futures/chart-data`
    pub async fn chart_data(
        &self,
        request: &ChartDataRequest,
        credentials: Option<&Credentials>,
    ) -> Result<ChartDataResponse, ApiError> {
        debug!(instrument = %request.instrument, "fetching chart data");
        Self::send(
            self.request(Method::POST, "futures/chart-data", credentials)
                .json(request),
        )
        .await
    }

    /// `GET /futures/data`, the paged raw-row listing.
    pub async fn futures_data(
        &self,
        query: &FuturesDataQuery,
        credentials: Option<&Credentials>,
    ) -> Result<FuturesDataPage, ApiError> {
        Self::send(
            self.request(Method::GET, "futures/data", credentials)
                .query(query),
        )
        .await
    }

    /// `DELETE /futures/data`, optionally restricted to one instrument.
    pub async fn clear_data(
        &self,
        instrument: Option<&str>,
        credentials: Option<&Credentials>,
    ) -> Result<ClearDataResponse, ApiError> {
        let mut builder = self.request(Method::DELETE, "futures/data", credentials);
        if let Some(instrument) = instrument {
            builder = builder.query(&[("instrument", instrument)]);
        }
        Self::send(builder).await
    }

    /// `POST /futures/upload` with the CSV at `path` as multipart field `file`.
    ///
    /// Non-CSV files are rejected before any request is made.
    pub async fn upload_csv(
        &self,
        path: &Path,
        credentials: Option<&Credentials>,
    ) -> Result<UploadResponse, ApiError> {
        let form = Form::new().part("file", csv_part(path).await?);
        let response: UploadResponse = Self::send(
            self.request(Method::POST, "futures/upload", credentials)
                .multipart(form),
        )
        .await?;

        info!(
            filename = %response.filename,
            records = response.records_count,
            "uploaded futures csv"
        );
        Ok(response)
    }

    /// `POST /data/upload-csv`, creating a named dataset from the CSV at `path`.
    ///
    /// The dataset name defaults to the file stem.
    pub async fn upload_dataset(
        &self,
        path: &Path,
        name: Option<&str>,
        description: Option<&str>,
        credentials: Option<&Credentials>,
    ) -> Result<DatasetUploadResponse, ApiError> {
        let part = csv_part(path).await?;
        let file_name = validate_csv_path(path)?;
        let name = name
            .map(str::to_string)
            .unwrap_or_else(|| default_dataset_name(path, &file_name));
        let description = description
            .map(str::to_string)
            .unwrap_or_else(|| format!("Imported from file {file_name}"));

        let form = Form::new()
            .part("file", part)
            .text("name", name)
            .text("description", description);

        Self::send(
            self.request(Method::POST, "data/upload-csv", credentials)
                .multipart(form),
        )
        .await
    }

    /// `GET /data/datasets`
    pub async fn datasets(
        &self,
        credentials: Option<&Credentials>,
    ) -> Result<Vec<Dataset>, ApiError> {
        Self::send(self.request(Method::GET, "data/datasets", credentials)).await
    }

    /// `DELETE /data/datasets/{id}`
    pub async fn delete_dataset(
        &self,
        id: &DatasetId,
        credentials: Option<&Credentials>,
    ) -> Result<(), ApiError> {
        Self::execute(self.request(
            Method::DELETE,
            &format!("data/datasets/{id}"),
            credentials,
        ))
        .await?;

        info!(dataset = %id, "deleted dataset");
        Ok(())
    }

    /// `GET /data/datasets/{id}/kline-data?limit=N`
    pub async fn dataset_klines(
        &self,
        id: &DatasetId,
        limit: u32,
        credentials: Option<&Credentials>,
    ) -> Result<Vec<KlineData>, ApiError> {
        Self::send(
            self.request(
                Method::GET,
                &format!("data/datasets/{id}/kline-data"),
                credentials,
            )
            .query(&[("limit", limit)]),
        )
        .await
    }

    /// `POST /auth/login`
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ApiError> {
        let body = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        Self::send(self.request(Method::POST, "auth/login", None).json(&body)).await
    }

    /// `POST /auth/register`
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthResponse, ApiError> {
        let body = RegisterRequest {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        };
        Self::send(self.request(Method::POST, "auth/register", None).json(&body)).await
    }

    /// `GET /auth/me`
    pub async fn me(&self, credentials: &Credentials) -> Result<User, ApiError> {
        Self::send(self.request(Method::GET, "auth/me", Some(credentials))).await
    }
}

/// Check that `path` names a `.csv` file and return its file name.
pub fn validate_csv_path(path: &Path) -> Result<String, ApiError> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| ApiError::InvalidFileType(path.display().to_string()))?;

    let is_csv = path
        .extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| extension.eq_ignore_ascii_case("csv"));

    if is_csv {
        Ok(file_name.to_string())
    } else {
        Err(ApiError::InvalidFileType(file_name.to_string()))
    }
}

/// File stem of an upload, e.g. `IF2403` for both `IF2403.csv` and `IF2403.CSV`.
fn default_dataset_name(path: &Path, file_name: &str) -> String {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| file_name.to_string())
}

async fn csv_part(path: &Path) -> Result<Part, ApiError> {
    let file_name = validate_csv_path(path)?;
    let bytes = tokio::fs::read(path).await?;

    Part::bytes(bytes)
        .file_name(file_name)
        .mime_str("text/csv")
        .map_err(ApiError::from)
}
