//! Usage: One-shot localhost callback listener for the OAuth authorization code flow.

use crate::shared::error::AppResult;
use crate::shared::security::constant_time_eq;
use reqwest::Url;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

pub(crate) const CALLBACK_PATH: &str = "/oauth2callback";

const SUCCESS_HTML: &str =
    "<html><body><h1>Authorization successful</h1><p>You can close this tab.</p></body></html>";
const ERROR_HTML: &str =
    "<html><body><h1>Authorization failed</h1><p>You can close this tab and retry.</p></body></html>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CallbackPayload {
    pub(crate) code: Option<String>,
    pub(crate) state: Option<String>,
    pub(crate) error: Option<String>,
    pub(crate) error_description: Option<String>,
}

#[derive(Debug)]
pub(crate) struct BoundCallbackListener {
    port: u16,
    listener: TcpListener,
}

impl BoundCallbackListener {
    pub(crate) fn port(&self) -> u16 {
        self.port
    }
}

/// Bind on the preferred loopback port, falling back to a dynamic port when it
/// is taken (the redirect URI is rebuilt from the bound port either way).
pub(crate) async fn bind_callback_listener(
    preferred_port: u16,
) -> AppResult<BoundCallbackListener> {
    match try_bind_on_port(preferred_port).await {
        Ok(bound) => Ok(bound),
        Err(preferred_err) if preferred_port == 0 => Err(format!(
            "SYSTEM_ERROR: oauth callback bind failed: {preferred_err}"
        )
        .into()),
        Err(preferred_err) => match try_bind_on_port(0).await {
            Ok(bound) => {
                tracing::debug!(
                    preferred_port = preferred_port,
                    bound_port = bound.port,
                    "preferred oauth callback port unavailable; using dynamic port"
                );
                Ok(bound)
            }
            Err(fallback_err) => Err(format!(
                "SYSTEM_ERROR: oauth callback bind failed: {preferred_err}; fallback_dynamic_port: {fallback_err}"
            )
            .into()),
        },
    }
}

async fn try_bind_on_port(port: u16) -> Result<BoundCallbackListener, String> {
    let listener = TcpListener::bind(("127.0.0.1", port))
        .await
        .map_err(|err| format!("127.0.0.1:{port} ({err})"))?;
    let port = listener
        .local_addr()
        .map_err(|e| format!("127.0.0.1:{port} (local_addr failed: {e})"))?
        .port();
    Ok(BoundCallbackListener { port, listener })
}

/// Accept exactly one callback request, answer the browser, and return the
/// parsed query payload after validating `state`.
pub(crate) async fn wait_for_callback(
    listener: BoundCallbackListener,
    expected_state: &str,
    timeout: Duration,
) -> AppResult<CallbackPayload> {
    let (mut socket, _) = tokio::time::timeout(timeout, listener.listener.accept())
        .await
        .map_err(|_| "SYSTEM_ERROR: oauth callback timed out".to_string())?
        .map_err(|e| format!("SYSTEM_ERROR: oauth callback accept failed: {e}"))?;

    let mut buffer = vec![0u8; 8192];
    let size = socket
        .read(&mut buffer)
        .await
        .map_err(|e| format!("SYSTEM_ERROR: oauth callback read failed: {e}"))?;
    if size == 0 {
        return Err("SYSTEM_ERROR: oauth callback request is empty"
            .to_string()
            .into());
    }

    let request = String::from_utf8_lossy(&buffer[..size]);
    let parsed = extract_request_target(request.as_ref())
        .and_then(parse_callback_target)
        .and_then(|payload| {
            validate_state(&payload, expected_state)?;
            Ok(payload)
        });

    // The browser gets an answer even when the request is rejected.
    let ok = matches!(&parsed, Ok(payload) if payload.error.is_none());
    let (status, body) = if ok {
        ("HTTP/1.1 200 OK", SUCCESS_HTML)
    } else {
        ("HTTP/1.1 400 Bad Request", ERROR_HTML)
    };
    let response = format!(
        "{status}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;

    parsed
}

fn extract_request_target(request: &str) -> AppResult<&str> {
    let mut lines = request.lines();
    let first = lines
        .next()
        .ok_or_else(|| "SYSTEM_ERROR: oauth callback malformed request".to_string())?;
    let mut parts = first.split_whitespace();
    let method = parts.next().unwrap_or_default();
    let target = parts.next().unwrap_or_default();
    if method != "GET" || target.is_empty() {
        return Err("SYSTEM_ERROR: oauth callback must be GET"
            .to_string()
            .into());
    }
    Ok(target)
}

pub(crate) fn parse_callback_target(target: &str) -> AppResult<CallbackPayload> {
    let url = Url::parse(&format!("http://127.0.0.1{target}"))
        .map_err(|e| format!("SYSTEM_ERROR: invalid oauth callback target: {e}"))?;

    if url.path() != CALLBACK_PATH {
        return Err("SYSTEM_ERROR: invalid oauth callback path"
            .to_string()
            .into());
    }

    let mut code: Option<String> = None;
    let mut state: Option<String> = None;
    let mut error: Option<String> = None;
    let mut error_description: Option<String> = None;

    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.to_string()),
            "state" => state = Some(value.to_string()),
            "error" => error = Some(value.to_string()),
            "error_description" => error_description = Some(value.to_string()),
            _ => {}
        }
    }

    if code.is_none() && error.is_none() {
        return Err("SYSTEM_ERROR: oauth callback missing code/error"
            .to_string()
            .into());
    }

    Ok(CallbackPayload {
        code,
        state,
        error,
        error_description,
    })
}

fn validate_state(payload: &CallbackPayload, expected_state: &str) -> AppResult<()> {
    let state = payload
        .state
        .as_deref()
        .ok_or_else(|| "SYSTEM_ERROR: oauth callback missing state".to_string())?;
    if !constant_time_eq(state.as_bytes(), expected_state.as_bytes()) {
        return Err("SEC_INVALID_INPUT: oauth callback state mismatch"
            .to_string()
            .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_callback_target_extracts_code_and_state() {
        let payload =
            parse_callback_target("/oauth2callback?code=4%2FabcDEF&state=xyz").expect("payload");
        assert_eq!(payload.code.as_deref(), Some("4/abcDEF"));
        assert_eq!(payload.state.as_deref(), Some("xyz"));
        assert!(payload.error.is_none());
    }

    #[test]
    fn parse_callback_target_accepts_provider_error() {
        let payload = parse_callback_target(
            "/oauth2callback?error=access_denied&error_description=nope&state=xyz",
        )
        .expect("payload");
        assert_eq!(payload.error.as_deref(), Some("access_denied"));
        assert_eq!(payload.error_description.as_deref(), Some("nope"));
        assert_eq!(payload.state.as_deref(), Some("xyz"));
    }

    #[test]
    fn parse_callback_target_rejects_other_paths() {
        let err = parse_callback_target("/favicon.ico?code=abc").expect_err("should fail");
        assert!(err.to_string().contains("invalid oauth callback path"));
    }

    #[test]
    fn parse_callback_target_rejects_empty_query() {
        let err = parse_callback_target("/oauth2callback").expect_err("should fail");
        assert!(err.to_string().contains("missing code/error"));
    }

    #[test]
    fn validate_state_rejects_mismatch() {
        let payload = CallbackPayload {
            code: Some("abc".to_string()),
            state: Some("foo".to_string()),
            error: None,
            error_description: None,
        };
        let err = validate_state(&payload, "bar").expect_err("should fail");
        assert!(err.to_string().contains("state mismatch"));
    }

    #[tokio::test]
    async fn wait_for_callback_round_trips_a_browser_redirect() {
        let listener = bind_callback_listener(0).await.expect("bind");
        let port = listener.port();
        let server = tokio::spawn(async move {
            wait_for_callback(listener, "expected-state", Duration::from_secs(5)).await
        });

        let mut stream = tokio::net::TcpStream::connect(("127.0.0.1", port))
            .await
            .expect("connect");
        let request = format!(
            "GET /oauth2callback?code=abc&state=expected-state HTTP/1.1\r\nHost: 127.0.0.1:{port}\r\n\r\n"
        );
        stream.write_all(request.as_bytes()).await.expect("send");

        let mut response = String::new();
        stream.read_to_string(&mut response).await.expect("read");
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.contains("Authorization successful"));

        let payload = server.await.expect("join").expect("payload");
        assert_eq!(payload.code.as_deref(), Some("abc"));
        assert_eq!(payload.state.as_deref(), Some("expected-state"));
    }

    #[tokio::test]
    async fn rejected_callback_still_answers_the_browser() {
        let listener = bind_callback_listener(0).await.expect("bind");
        let port = listener.port();
        let server = tokio::spawn(async move {
            wait_for_callback(listener, "expected-state", Duration::from_secs(5)).await
        });

        let mut stream = tokio::net::TcpStream::connect(("127.0.0.1", port))
            .await
            .expect("connect");
        let request = format!(
            "GET /oauth2callback?code=abc&state=wrong HTTP/1.1\r\nHost: 127.0.0.1:{port}\r\n\r\n"
        );
        stream.write_all(request.as_bytes()).await.expect("send");

        let mut response = String::new();
        stream.read_to_string(&mut response).await.expect("read");
        assert!(response.starts_with("HTTP/1.1 400 Bad Request"));
        assert!(response.contains("Authorization failed"));

        let err = server.await.expect("join").expect_err("state mismatch");
        assert!(err.to_string().contains("state mismatch"));
    }

    #[tokio::test]
    async fn bind_falls_back_to_dynamic_port_when_preferred_is_taken() {
        let occupied = TcpListener::bind(("127.0.0.1", 0)).await.expect("occupy");
        let taken = occupied.local_addr().expect("addr").port();

        let bound = bind_callback_listener(taken).await.expect("bind");
        assert_ne!(bound.port(), taken);
        assert_ne!(bound.port(), 0);
    }

    #[test]
    fn extract_request_target_requires_get() {
        assert!(extract_request_target("POST /oauth2callback HTTP/1.1\r\n").is_err());
        assert_eq!(
            extract_request_target("GET /oauth2callback?code=x HTTP/1.1\r\nHost: x\r\n\r\n")
                .expect("target"),
            "/oauth2callback?code=x"
        );
    }
}
