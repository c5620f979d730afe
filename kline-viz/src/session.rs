//! Session lifecycle: credentials, token persistence and login/logout.
//!
//! The [`SessionManager`] is created at start-up, updated on login/register and torn down on
//! logout. Callers read [`Credentials`] from it and pass them into each
//! [`ApiClient`](crate::api::ApiClient) request; there is no process-wide auth header.

use crate::{
    api::ApiClient,
    error::{ApiError, SessionError},
    model::{AuthResponse, User},
};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, info, warn};

/// Bearer credential attached to authenticated requests.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    token: String,
}

impl Credentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Value of the `Authorization` header.
    pub fn authorization(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Persisted-session capability: somewhere a token survives between runs.
pub trait TokenStore: Send + Sync {
    fn get(&self) -> Result<Option<String>, SessionError>;
    fn set(&self, token: &str) -> Result<(), SessionError>;
    fn clear(&self) -> Result<(), SessionError>;
}

/// Token store that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<String>>,
}

impl TokenStore for MemoryTokenStore {
    fn get(&self) -> Result<Option<String>, SessionError> {
        Ok(self.token.lock().clone())
    }

    fn set(&self, token: &str) -> Result<(), SessionError> {
        *self.token.lock() = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionError> {
        *self.token.lock() = None;
        Ok(())
    }
}

#[derive(Debug, Deserialize, Serialize)]
struct PersistedToken {
    token: String,
}

/// Token store backed by a small JSON file.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self) -> Result<Option<String>, SessionError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(error.into()),
        };

        match serde_json::from_str::<PersistedToken>(&contents) {
            Ok(persisted) => Ok(Some(persisted.token)),
            Err(error) => {
                warn!(path = %self.path.display(), %error, "ignoring unreadable token file");
                Ok(None)
            }
        }
    }

    fn set(&self, token: &str) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let contents = serde_json::to_string(&PersistedToken {
            token: token.to_string(),
        })
        .map_err(|error| SessionError::Store(error.to_string()))?;

        std::fs::write(&self.path, contents)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
    }
}

#[derive(Debug, Default)]
struct SessionState {
    credentials: Option<Credentials>,
    user: Option<User>,
}

/// Owner of the credential lifecycle.
pub struct SessionManager {
    api: ApiClient,
    store: Arc<dyn TokenStore>,
    state: RwLock<SessionState>,
}

impl SessionManager {
    /// Create a manager, picking up any token persisted by a previous run. The token is not
    /// verified until [`Self::restore`] is called.
    pub fn new(api: ApiClient, store: Arc<dyn TokenStore>) -> Result<Self, SessionError> {
        let credentials = store.get()?.map(Credentials::new);
        if credentials.is_some() {
            debug!("loaded persisted session token");
        }

        Ok(Self {
            api,
            store,
            state: RwLock::new(SessionState {
                credentials,
                user: None,
            }),
        })
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn credentials(&self) -> Option<Credentials> {
        self.state.read().credentials.clone()
    }

    /// Credentials for an endpoint that requires a logged-in user.
    pub fn require(&self) -> Result<Credentials, SessionError> {
        self.credentials().ok_or(SessionError::NotLoggedIn)
    }

    pub fn user(&self) -> Option<User> {
        self.state.read().user.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.read().credentials.is_some()
    }

    /// Verify a persisted token against `GET /auth/me`.
    ///
    /// A rejected token ends the session; a transport failure leaves it in place.
    pub async fn restore(&self) -> Result<Option<User>, SessionError> {
        let Some(credentials) = self.credentials() else {
            return Ok(None);
        };

        match self.api.me(&credentials).await {
            Ok(user) => {
                info!(username = %user.username, "restored session");
                self.state.write().user = Some(user.clone());
                Ok(Some(user))
            }
            Err(error) if error.is_auth_failure() => {
                warn!(%error, "persisted session rejected, logging out");
                self.logout()?;
                Ok(None)
            }
            Err(error) => Err(error.into()),
        }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<User, SessionError> {
        let response = self.api.login(email, password).await?;
        self.establish(response)
    }

    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<User, SessionError> {
        let response = self.api.register(username, email, password).await?;
        self.establish(response)
    }

    fn establish(&self, response: AuthResponse) -> Result<User, SessionError> {
        self.store.set(&response.access_token)?;

        let mut state = self.state.write();
        state.credentials = Some(Credentials::new(response.access_token));
        state.user = Some(response.user.clone());

        info!(username = %response.user.username, "session established");
        Ok(response.user)
    }

    /// End the session; subsequent requests carry no credentials.
    pub fn logout(&self) -> Result<(), SessionError> {
        *self.state.write() = SessionState::default();
        self.store.clear()?;
        info!("session cleared");
        Ok(())
    }

    /// End the session if `error` shows the backend rejected our credentials.
    /// Returns whether the session was ended.
    pub fn handle_api_error(&self, error: &ApiError) -> Result<bool, SessionError> {
        if error.is_auth_failure() && self.is_authenticated() {
            self.logout()?;
            return Ok(true);
        }
        Ok(false)
    }
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("api", &self.api)
            .field("state", &*self.state.read())
            .finish()
    }
}
