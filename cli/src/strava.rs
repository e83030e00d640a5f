//! Strava API v3 client.
//!
//! Only the two read endpoints the mirror needs are wrapped: the athlete
//! profile, which embeds the bikes, and the paged activity list. Activities are
//! exposed as a lazy stream so a sync that stops early never requests the
//! remaining pages.
//!
//! GPX exports are not part of the API; [`StravaWeb`] fetches them from the
//! website with the user's session cookie.

use crate::sync::RecordSource;
use chrono::{DateTime, Utc};
use futures::{stream, Stream, TryStreamExt};
use serde_json::Value;
use std::future::Future;

/// Base URL of the Strava API.
pub const API_BASE: &str = "https://www.strava.com/api/v3";

/// Activities requested per page, the maximum Strava allows.
pub const PER_PAGE: u32 = 200;

/// Base URL of the Strava website.
pub const WEB_BASE: &str = "https://www.strava.com";

/// Name of the Strava website session cookie.
pub const SESSION_COOKIE: &str = "_strava4_session";

/// Errors talking to Strava.
#[derive(Debug, thiserror::Error)]
pub enum StravaError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Authorization failed: {0}")]
    Authorization(String),

    #[error("Authorization needs an interactive terminal")]
    NotInteractive,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid token file: {0}")]
    InvalidToken(#[from] serde_json::Error),
}

/// An authenticated Strava API client.
#[derive(Debug, Clone)]
pub struct StravaClient {
    http: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl StravaClient {
    /// Create a client using a bearer `access_token`.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: API_BASE.to_string(),
            access_token: access_token.into(),
        }
    }

    /// Point the client at another API root.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Value, StravaError> {
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), path);
        tracing::debug!("GET {}", url);

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .query(query)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }

    /// The authenticated athlete's profile.
    pub async fn athlete(&self) -> Result<Value, StravaError> {
        self.get("/athlete", &[]).await
    }

    /// One page of activities started before `before`, newest first.
    ///
    /// Pages are numbered from 1; an empty page marks the end.
    pub async fn activities_page(
        &self,
        before: DateTime<Utc>,
        page: u32,
    ) -> Result<Vec<Value>, StravaError> {
        let query = [
            ("before", before.timestamp().to_string()),
            ("page", page.to_string()),
            ("per_page", PER_PAGE.to_string()),
        ];

        match self.get("/athlete/activities", &query).await? {
            Value::Array(items) => Ok(items),
            other => Err(StravaError::UnexpectedResponse(format!(
                "expected an activity list, got {}",
                other
            ))),
        }
    }
}

/// Strava website client authenticated by a session cookie.
#[derive(Debug, Clone)]
pub struct StravaWeb {
    http: reqwest::Client,
    base_url: String,
    session: String,
}

impl StravaWeb {
    /// Create a client using the `_strava4_session` cookie value.
    pub fn new(session: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: WEB_BASE.to_string(),
            session: session.into(),
        }
    }

    /// Point the client at another site root.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Download the GPX export of an activity.
    ///
    /// A rejected session is redirected to the login page, so anything that
    /// is not an XML document is an error.
    pub async fn gpx(&self, activity_id: i64) -> Result<Vec<u8>, StravaError> {
        let url = format!(
            "{}/activities/{}/export_gpx",
            self.base_url.trim_end_matches('/'),
            activity_id
        );
        tracing::debug!("GET {}", url);

        let body = self
            .http
            .get(&url)
            .header(
                reqwest::header::COOKIE,
                format!("{}={}", SESSION_COOKIE, self.session),
            )
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        if !looks_like_xml(&body) {
            return Err(StravaError::UnexpectedResponse(format!(
                "activity {} export is not a GPX document, check the session cookie",
                activity_id
            )));
        }

        Ok(body.to_vec())
    }
}

fn looks_like_xml(body: &[u8]) -> bool {
    let body = body.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(body);
    let start = body
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(body.len());
    body[start..].starts_with(b"<?xml") || body[start..].starts_with(b"<gpx")
}

impl RecordSource for StravaClient {
    fn bikes(&self) -> impl Future<Output = Result<Vec<Value>, StravaError>> {
        async move {
            let mut athlete = self.athlete().await?;
            match athlete.get_mut("bikes").map(Value::take) {
                Some(Value::Array(bikes)) => Ok(bikes),
                Some(Value::Null) => Ok(Vec::new()),
                _ => Err(StravaError::UnexpectedResponse(
                    "athlete profile has no bike list".to_string(),
                )),
            }
        }
    }

    fn activities(
        &self,
        before: DateTime<Utc>,
    ) -> impl Stream<Item = Result<Value, StravaError>> + '_ {
        let pages = stream::try_unfold(1u32, move |page| async move {
            let items = self.activities_page(before, page).await?;
            tracing::debug!("Activity page {}: {} records", page, items.len());

            if items.is_empty() {
                Ok::<_, StravaError>(None)
            } else {
                Ok(Some((items, page + 1)))
            }
        });

        pages
            .map_ok(|items| stream::iter(items.into_iter().map(Ok::<_, StravaError>)))
            .try_flatten()
    }
}
