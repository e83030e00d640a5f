//! Strava OAuth 2 token handling.
//!
//! The token is kept in a JSON file. A stored token is refreshed before it
//! expires; without one the user is sent through the authorization code flow
//! served by the loopback listener in [`redirect`].

pub mod redirect;

use crate::config::{Config, Credentials};
use crate::strava::StravaError;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::io::IsTerminal;
use std::path::Path;

/// Strava authorization endpoint.
pub const AUTHORIZE_URL: &str = "https://www.strava.com/oauth/authorize";

/// Strava token endpoint.
pub const TOKEN_URL: &str = "https://www.strava.com/oauth/token";

/// Scopes needed to read bikes and every activity, private ones included.
pub const SCOPES: &str = "read,profile:read_all,activity:read_all";

/// Seconds before expiry at which a token is refreshed.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// An OAuth 2 token as returned by Strava.
///
/// Extra response fields such as the embedded athlete are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix timestamp in seconds
    pub expires_at: i64,
}

impl Token {
    /// Whether the token expires within the refresh margin of `now`.
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at <= now + EXPIRY_MARGIN_SECS
    }
}

/// Read the token file, if there is one.
pub async fn load_token(path: &Path) -> Result<Option<Token>, StravaError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write the token file, creating its directory.
///
/// The file is written beside the target and renamed over it.
pub async fn save_token(path: &Path, token: &Token) -> Result<(), StravaError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, serde_json::to_vec_pretty(token)?).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// OAuth 2 client for the registered Strava application.
#[derive(Debug, Clone)]
pub struct OAuth {
    http: reqwest::Client,
    credentials: Credentials,
    authorize_url: String,
    token_url: String,
}

impl OAuth {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            http: reqwest::Client::new(),
            credentials,
            authorize_url: AUTHORIZE_URL.to_string(),
            token_url: TOKEN_URL.to_string(),
        }
    }

    /// Use another token endpoint.
    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self
    }

    /// URL the user visits to grant access.
    pub fn authorization_url(&self, redirect_uri: &str, state: &str) -> Result<String, StravaError> {
        let url = reqwest::Url::parse_with_params(
            &self.authorize_url,
            &[
                ("client_id", self.credentials.client_id.as_str()),
                ("redirect_uri", redirect_uri),
                ("response_type", "code"),
                ("approval_prompt", "auto"),
                ("scope", SCOPES),
                ("state", state),
            ],
        )
        .map_err(|e| StravaError::Authorization(e.to_string()))?;

        Ok(url.into())
    }

    /// Exchange an authorization code for a token.
    pub async fn exchange_code(&self, code: &str) -> Result<Token, StravaError> {
        self.request_token(&[("grant_type", "authorization_code"), ("code", code)])
            .await
    }

    /// Obtain a fresh token from a refresh token.
    pub async fn refresh(&self, token: &Token) -> Result<Token, StravaError> {
        self.request_token(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", token.refresh_token.as_str()),
        ])
        .await
    }

    async fn request_token(&self, grant: &[(&str, &str)]) -> Result<Token, StravaError> {
        let mut form = vec![
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
        ];
        form.extend_from_slice(grant);

        let token = self
            .http
            .post(&self.token_url)
            .form(&form)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(token)
    }
}

/// Get a valid access token, refreshing or authorizing as needed.
///
/// The resulting token is written back to the token file.
pub async fn access_token(config: &Config) -> crate::error::Result<String> {
    let oauth = OAuth::new(config.credentials()?);

    let token = match load_token(&config.token_file).await? {
        Some(token) if !token.is_expired(Utc::now().timestamp()) => token,
        Some(token) => {
            tracing::info!("Refreshing Strava access token");
            oauth.refresh(&token).await?
        }
        None => authorize(config, &oauth).await?,
    };

    save_token(&config.token_file, &token).await?;
    Ok(token.access_token)
}

async fn authorize(config: &Config, oauth: &OAuth) -> Result<Token, StravaError> {
    if !std::io::stdin().is_terminal() {
        return Err(StravaError::NotInteractive);
    }

    let state = uuid::Uuid::new_v4().to_string();
    let url = oauth.authorization_url(&config.redirect_uri(), &state)?;
    let listener = tokio::net::TcpListener::bind((config.http_host.as_str(), config.http_port)).await?;

    let start = config.listener_url();
    if let Err(e) = open::that(&start) {
        tracing::warn!("Failed to open a browser: {}", e);
    }
    eprintln!("Open {} in a browser to authorize access to Strava", start);

    let code = redirect::wait_for_code(listener, url, state).await?;
    oauth.exchange_code(&code).await
}
