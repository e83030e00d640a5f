//! Loopback listener for the OAuth 2 authorization code flow.
//!
//! `/` and `/authorize` redirect the browser to Strava; Strava sends it back
//! to `/code` with the authorization code, which is handed to the waiting
//! caller before the listener shuts down.

use crate::strava::StravaError;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Redirect;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tower_http::trace::TraceLayer;

type CodeSender = oneshot::Sender<Result<String, String>>;

/// State shared by the loopback handlers.
#[derive(Clone)]
struct RedirectState {
    authorization_url: Arc<String>,
    expected_state: Arc<String>,
    sender: Arc<Mutex<Option<CodeSender>>>,
}

/// Query Strava appends to the redirect URI.
#[derive(Debug, Deserialize)]
struct CodeQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

fn routes(state: RedirectState) -> Router {
    Router::new()
        .route("/", get(authorize))
        .route("/authorize", get(authorize))
        .route("/code", get(code))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn authorize(State(state): State<RedirectState>) -> Redirect {
    Redirect::to(&state.authorization_url)
}

async fn code(
    State(state): State<RedirectState>,
    Query(query): Query<CodeQuery>,
) -> (StatusCode, &'static str) {
    let outcome = match query {
        CodeQuery {
            error: Some(error), ..
        } => Err(error),
        CodeQuery {
            state: Some(ref s), ..
        } if s != state.expected_state.as_str() => Err("state mismatch".to_string()),
        CodeQuery {
            code: Some(code),
            state: Some(_),
            ..
        } => Ok(code),
        _ => Err("missing code or state".to_string()),
    };

    let response = match &outcome {
        Ok(_) => (StatusCode::OK, "Authorized, you can close this window."),
        Err(_) => (StatusCode::BAD_REQUEST, "Authorization failed."),
    };

    if let Some(sender) = state.sender.lock().await.take() {
        let _ = sender.send(outcome);
    }

    response
}

/// Serve the loopback flow on `listener` until Strava redirects back.
///
/// Returns the authorization code once `/code` has been hit with a matching
/// `state`. Only the first redirect counts.
pub async fn wait_for_code(
    listener: TcpListener,
    authorization_url: String,
    expected_state: String,
) -> Result<String, StravaError> {
    let (code_tx, code_rx) = oneshot::channel();
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let app = routes(RedirectState {
        authorization_url: Arc::new(authorization_url),
        expected_state: Arc::new(expected_state),
        sender: Arc::new(Mutex::new(Some(code_tx))),
    });

    if let Ok(addr) = listener.local_addr() {
        tracing::info!("OAuth listener on {}", addr);
    }

    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
    });

    let outcome = code_rx.await;
    let _ = shutdown_tx.send(());

    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!("OAuth listener error: {}", e),
        Err(e) => tracing::warn!("OAuth listener task failed: {}", e),
    }

    match outcome {
        Ok(result) => result.map_err(StravaError::Authorization),
        Err(_) => Err(StravaError::Authorization(
            "listener stopped before a code arrived".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn start(state: &str) -> (String, tokio::task::JoinHandle<Result<String, StravaError>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(wait_for_code(
            listener,
            "https://www.strava.com/oauth/authorize?client_id=1".to_string(),
            state.to_string(),
        ));
        (base, handle)
    }

    #[tokio::test]
    async fn root_redirects_to_strava() {
        let (base, handle) = start("xyz").await;
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();

        for path in ["/", "/authorize"] {
            let response = client.get(format!("{}{}", base, path)).send().await.unwrap();
            assert!(response.status().is_redirection());
            assert_eq!(
                response.headers()["location"],
                "https://www.strava.com/oauth/authorize?client_id=1"
            );
        }

        reqwest::get(format!("{}/code?code=abc&state=xyz", base))
            .await
            .unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn code_is_returned() {
        let (base, handle) = start("xyz").await;

        let response = reqwest::get(format!("{}/code?code=abc&state=xyz", base))
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);

        assert_eq!(handle.await.unwrap().unwrap(), "abc");
    }

    #[tokio::test]
    async fn state_mismatch_is_rejected() {
        let (base, handle) = start("xyz").await;

        let response = reqwest::get(format!("{}/code?code=abc&state=forged", base))
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, StravaError::Authorization(msg) if msg == "state mismatch"));
    }

    #[tokio::test]
    async fn denied_access_is_reported() {
        let (base, handle) = start("xyz").await;

        reqwest::get(format!("{}/code?error=access_denied&state=xyz", base))
            .await
            .unwrap();

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, StravaError::Authorization(msg) if msg == "access_denied"));
    }
}
