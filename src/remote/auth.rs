//! Ambient Google credentials
//!
//! Credentials are resolved once at startup from the environment:
//! - `GOOGLE_OAUTH_ACCESS_TOKEN`: a bearer token used as-is
//! - `GOOGLE_APPLICATION_CREDENTIALS`, or gcloud's default
//!   `application_default_credentials.json`, of type `authorized_user`
//!
//! Refreshed access tokens are cached until shortly before they expire.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Deserialize;

use crate::error::{MirrorError, Result};

pub const ACCESS_TOKEN_ENV: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";
pub const CREDENTIALS_FILE_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Refresh this long before the reported expiry
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Where access tokens come from
#[derive(Debug, Clone)]
pub enum Credentials {
    /// Fixed bearer token, never refreshed
    Static(String),
    /// OAuth user credentials exchanged for access tokens on demand
    AuthorizedUser {
        client_id: String,
        client_secret: String,
        refresh_token: String,
        token_uri: String,
    },
}

#[derive(Debug, Deserialize)]
struct CredentialsFile {
    #[serde(rename = "type")]
    kind: String,
    client_id: Option<String>,
    client_secret: Option<String>,
    refresh_token: Option<String>,
    token_uri: Option<String>,
}

impl Credentials {
    /// Resolve credentials from the process environment
    pub fn from_env() -> Result<Self> {
        if let Ok(token) = std::env::var(ACCESS_TOKEN_ENV) {
            if !token.trim().is_empty() {
                tracing::debug!("Using access token from {}", ACCESS_TOKEN_ENV);
                return Ok(Credentials::Static(token.trim().to_string()));
            }
        }

        let path = match std::env::var_os(CREDENTIALS_FILE_ENV) {
            Some(path) => PathBuf::from(path),
            None => default_credentials_path().ok_or_else(|| {
                MirrorError::Auth(format!(
                    "no credentials: set {} or {}",
                    ACCESS_TOKEN_ENV, CREDENTIALS_FILE_ENV
                ))
            })?,
        };

        Self::from_file(&path)
    }

    /// Load an `authorized_user` credentials file
    pub fn from_file(path: &Path) -> Result<Self> {
        tracing::debug!("Loading credentials from {}", path.display());

        let text = std::fs::read_to_string(path).map_err(|e| {
            MirrorError::Auth(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let file: CredentialsFile = serde_json::from_str(text)
            .map_err(|e| MirrorError::Auth(format!("invalid credentials file: {}", e)))?;

        if file.kind != "authorized_user" {
            return Err(MirrorError::Auth(format!(
                "unsupported credentials type '{}', expected 'authorized_user'",
                file.kind
            )));
        }

        let missing = |field: &str| MirrorError::Auth(format!("credentials file lacks {}", field));

        Ok(Credentials::AuthorizedUser {
            client_id: file.client_id.ok_or_else(|| missing("client_id"))?,
            client_secret: file.client_secret.ok_or_else(|| missing("client_secret"))?,
            refresh_token: file.refresh_token.ok_or_else(|| missing("refresh_token"))?,
            token_uri: file
                .token_uri
                .unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string()),
        })
    }
}

/// gcloud's application default credentials location
fn default_credentials_path() -> Option<PathBuf> {
    let path = dirs::config_dir()?
        .join("gcloud")
        .join("application_default_credentials.json");
    path.exists().then_some(path)
}

/// A bearer token and when it stops being usable
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: Option<Instant>,
}

impl AccessToken {
    fn is_fresh(&self) -> bool {
        match self.expires_at {
            Some(at) => Instant::now() + EXPIRY_MARGIN < at,
            None => true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<u64>,
}

/// Hands out access tokens, refreshing when needed
pub struct TokenSource {
    http: reqwest::Client,
    credentials: Credentials,
    cached: Mutex<Option<AccessToken>>,
}

impl TokenSource {
    pub fn new(http: reqwest::Client, credentials: Credentials) -> Self {
        Self {
            http,
            credentials,
            cached: Mutex::new(None),
        }
    }

    /// Current bearer token. A failed refresh is a transport failure.
    pub async fn token(&self) -> Result<String> {
        let (client_id, client_secret, refresh_token, token_uri) = match &self.credentials {
            Credentials::Static(token) => return Ok(token.clone()),
            Credentials::AuthorizedUser {
                client_id,
                client_secret,
                refresh_token,
                token_uri,
            } => (client_id, client_secret, refresh_token, token_uri),
        };

        let cached = self.cached.lock().clone();
        if let Some(cached) = cached.filter(AccessToken::is_fresh) {
            return Ok(cached.token);
        }

        tracing::debug!("Refreshing access token");

        let response = self
            .http
            .post(token_uri)
            .form(&[
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
                ("refresh_token", refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MirrorError::Transport(format!(
                "token refresh failed ({}): {}",
                status, body
            )));
        }

        let parsed: TokenResponse = response.json().await?;
        let token = AccessToken {
            token: parsed.access_token,
            expires_at: parsed
                .expires_in
                .map(|secs| Instant::now() + Duration::from_secs(secs)),
        };
        let value = token.token.clone();
        *self.cached.lock() = Some(token);
        Ok(value)
    }

    /// Forget the cached token after the server rejected it
    pub fn invalidate(&self) {
        self.cached.lock().take();
    }
}
