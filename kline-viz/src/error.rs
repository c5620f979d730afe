use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// All errors generated by the REST [`ApiClient`](crate::api::ApiClient).
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("not authorised: {0}")]
    Unauthorized(String),

    #[error("{detail}")]
    Status { status: u16, detail: String },

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("please select a CSV file (got {0})")]
    InvalidFileType(String),

    #[error("io error: {0}")]
    Io(String),
}

impl ApiError {
    /// Determine if an error means the current credentials are missing or expired and the
    /// user must log in again.
    pub fn is_auth_failure(&self) -> bool {
        match self {
            ApiError::Unauthorized(_) => true,
            ApiError::Status { status, .. } => *status == 401 || *status == 403,
            _ => false,
        }
    }

    /// Build an error from a non-success HTTP status, preferring the backend `detail` message.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let detail = extract_detail(body).unwrap_or_else(|| {
            status
                .canonical_reason()
                .map(str::to_string)
                .unwrap_or_else(|| format!("request failed with status {}", status.as_u16()))
        });

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::Unauthorized(detail),
            _ => ApiError::Status {
                status: status.as_u16(),
                detail,
            },
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout(error.to_string())
        } else if error.is_decode() {
            Self::Decode(error.to_string())
        } else {
            Self::Transport(error.to_string())
        }
    }
}

impl From<std::io::Error> for ApiError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

/// Backend error bodies look like `{"detail": "..."}`; `detail` may also be a list of
/// validation objects, in which case their `msg` fields are joined.
fn extract_detail(body: &str) -> Option<String> {
    let value = serde_json::from_str::<serde_json::Value>(body).ok()?;
    match value.get("detail")? {
        serde_json::Value::String(detail) => Some(detail.clone()),
        serde_json::Value::Array(items) => {
            let messages = items
                .iter()
                .filter_map(|item| item.get("msg").and_then(|msg| msg.as_str()))
                .collect::<Vec<_>>();
            (!messages.is_empty()).then(|| messages.join("; "))
        }
        _ => None,
    }
}

/// Human-readable failure of a query, shared between every waiter of one request.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Error)]
#[error("{message}")]
pub struct QueryError {
    pub message: String,
    /// The backend rejected the credentials the request was made with.
    #[serde(default)]
    pub auth_failure: bool,
}

impl QueryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            auth_failure: false,
        }
    }

    pub fn is_auth_failure(&self) -> bool {
        self.auth_failure
    }
}

impl From<ApiError> for QueryError {
    fn from(error: ApiError) -> Self {
        Self {
            message: error.to_string(),
            auth_failure: error.is_auth_failure(),
        }
    }
}

impl From<String> for QueryError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for QueryError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Errors generated by the transform layer on programmer error (never on data content).
#[derive(Debug, Clone, Copy, Eq, PartialEq, Error)]
pub enum TransformError {
    #[error("moving average window must be at least 1")]
    InvalidWindow,
}

/// Errors generated by the [`SessionManager`](crate::session::SessionManager).
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("token store error: {0}")]
    Store(String),

    #[error("no active session")]
    NotLoggedIn,
}

impl From<std::io::Error> for SessionError {
    fn from(error: std::io::Error) -> Self {
        Self::Store(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_is_auth_failure() {
        struct TestCase {
            input: ApiError,
            expected: bool,
        }

        let tests = vec![
            TestCase {
                // TC0: Unauthorized is an auth failure
                input: ApiError::Unauthorized("token expired".to_string()),
                expected: true,
            },
            TestCase {
                // TC1: raw 403 status is an auth failure
                input: ApiError::Status {
                    status: 403,
                    detail: "forbidden".to_string(),
                },
                expected: true,
            },
            TestCase {
                // TC2: 500 status is not an auth failure
                input: ApiError::Status {
                    status: 500,
                    detail: "boom".to_string(),
                },
                expected: false,
            },
            TestCase {
                // TC3: transport failure is not an auth failure
                input: ApiError::Transport("connection refused".to_string()),
                expected: false,
            },
            TestCase {
                // TC4: client-side validation is not an auth failure
                input: ApiError::InvalidFileType("data.xlsx".to_string()),
                expected: false,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = test.input.is_auth_failure();
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_api_error_from_status() {
        struct TestCase {
            status: StatusCode,
            body: &'static str,
            expected: ApiError,
        }

        let tests = vec![
            TestCase {
                // TC0: string detail is surfaced verbatim
                status: StatusCode::BAD_REQUEST,
                body: r#"{"detail":"CSV is missing column: volume"}"#,
                expected: ApiError::Status {
                    status: 400,
                    detail: "CSV is missing column: volume".to_string(),
                },
            },
            TestCase {
                // TC1: 401 maps to Unauthorized
                status: StatusCode::UNAUTHORIZED,
                body: r#"{"detail":"Could not validate credentials"}"#,
                expected: ApiError::Unauthorized("Could not validate credentials".to_string()),
            },
            TestCase {
                // TC2: validation list details are joined
                status: StatusCode::UNPROCESSABLE_ENTITY,
                body: r#"{"detail":[{"msg":"field required"},{"msg":"value is not a valid email"}]}"#,
                expected: ApiError::Status {
                    status: 422,
                    detail: "field required; value is not a valid email".to_string(),
                },
            },
            TestCase {
                // TC3: non-JSON body falls back to the canonical reason
                status: StatusCode::INTERNAL_SERVER_ERROR,
                body: "<html>oops</html>",
                expected: ApiError::Status {
                    status: 500,
                    detail: "Internal Server Error".to_string(),
                },
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = ApiError::from_status(test.status, test.body);
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_query_error_from_api_error_keeps_message() {
        let error = QueryError::from(ApiError::Status {
            status: 404,
            detail: "instrument not found".to_string(),
        });
        assert_eq!(error.to_string(), "instrument not found");
    }

    #[test]
    fn test_query_error_keeps_auth_failure_from_api_error() {
        struct TestCase {
            input: ApiError,
            expected: QueryError,
        }

        let tests = vec![
            TestCase {
                // TC0: rejected credentials survive the conversion
                input: ApiError::Unauthorized("Token expired".to_string()),
                expected: QueryError {
                    message: "not authorised: Token expired".to_string(),
                    auth_failure: true,
                },
            },
            TestCase {
                // TC1: raw 401 status also counts
                input: ApiError::Status {
                    status: 401,
                    detail: "expired".to_string(),
                },
                expected: QueryError {
                    message: "expired".to_string(),
                    auth_failure: true,
                },
            },
            TestCase {
                // TC2: transport failures are not auth failures
                input: ApiError::Transport("connection refused".to_string()),
                expected: QueryError::new("request failed: connection refused"),
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = QueryError::from(test.input);
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }
}
