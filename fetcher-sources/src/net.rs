//! reqwest plumbing shared by the HTTP-speaking sessions.

use fetcher_core::FetchError;
use reqwest::{Response, StatusCode};

pub(crate) fn connectivity(context: &str, err: reqwest::Error) -> FetchError {
    FetchError::TransientConnectivity(format!("{context}: {err}"))
}

/// Map an HTTP status onto the error taxonomy.
pub(crate) fn check_status(context: &str, response: Response) -> Result<Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            FetchError::Authentication(format!("{context}: {status}"))
        }
        StatusCode::NOT_FOUND => FetchError::DocumentNotFound(format!("{context}: {status}")),
        s if s.is_server_error() || s == StatusCode::TOO_MANY_REQUESTS || s == StatusCode::REQUEST_TIMEOUT => {
            FetchError::TransientConnectivity(format!("{context}: {status}"))
        }
        _ => FetchError::Configuration(format!("{context}: request rejected with {status}")),
    })
}

pub(crate) async fn bytes(context: &str, response: Response) -> Result<Vec<u8>, FetchError> {
    let response = check_status(context, response)?;
    let body = response.bytes().await.map_err(|e| connectivity(context, e))?;
    Ok(body.to_vec())
}

pub(crate) async fn json(context: &str, response: Response) -> Result<serde_json::Value, FetchError> {
    let body = bytes(context, response).await?;
    serde_json::from_slice(&body).map_err(|e| {
        FetchError::unrecognized(format!("{context}: invalid JSON: {e}"), &String::from_utf8_lossy(&body))
    })
}

/// Serve `app` on an ephemeral local port for the duration of a test.
#[cfg(test)]
pub(crate) async fn serve(app: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    format!("http://{addr}")
}
