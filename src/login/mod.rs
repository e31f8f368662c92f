//! Usage: One-shot interactive browser login that mints a Google refresh token.
//!
//! Flow: bind localhost listener -> open browser to the consent screen ->
//! capture the authorization code via redirect -> exchange for tokens.

pub(crate) mod callback_server;
pub(crate) mod pkce;

use crate::auth::token_exchange::{exchange_authorization_code, TokenExchangeRequest};
use crate::auth::{Credentials, GOOGLE_AUTH_URL, GOOGLE_TOKEN_URL, SHEETS_SCOPE};
use crate::shared::error::AppResult;
use rand::RngCore;
use std::process::Command;
use tokio::time::Duration;

const DEFAULT_CALLBACK_PORT: u16 = 3847;
const CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

/// Credentials to persist after a successful login.
#[derive(Debug, Clone)]
pub struct LoginResult {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

fn build_oauth_state() -> String {
    use rand::rngs::OsRng;
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn make_redirect_uri(port: u16) -> String {
    format!("http://127.0.0.1:{port}{}", callback_server::CALLBACK_PATH)
}

fn build_authorize_url(
    client_id: &str,
    redirect_uri: &str,
    state: &str,
    code_challenge: &str,
) -> AppResult<String> {
    let mut url = reqwest::Url::parse(GOOGLE_AUTH_URL)
        .map_err(|e| format!("SYSTEM_ERROR: invalid oauth auth url: {e}"))?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("response_type", "code");
        query.append_pair("client_id", client_id);
        query.append_pair("redirect_uri", redirect_uri);
        query.append_pair("scope", SHEETS_SCOPE);
        query.append_pair("state", state);
        query.append_pair("code_challenge", code_challenge);
        query.append_pair("code_challenge_method", "S256");
        // Offline access + forced consent so Google returns a refresh token
        // even when the app was authorized before.
        query.append_pair("access_type", "offline");
        query.append_pair("prompt", "consent");
    }
    Ok(url.to_string())
}

fn open_browser(url: &str) -> AppResult<()> {
    #[cfg(target_os = "windows")]
    {
        Command::new("rundll32.exe")
            .arg("url.dll,FileProtocolHandler")
            .arg(url)
            .spawn()
            .map_err(|e| format!("SYSTEM_ERROR: failed to open browser: {e}"))?;
        return Ok(());
    }

    #[cfg(target_os = "macos")]
    {
        Command::new("open")
            .arg(url)
            .spawn()
            .map_err(|e| format!("SYSTEM_ERROR: failed to open browser: {e}"))?;
        return Ok(());
    }

    #[cfg(all(unix, not(target_os = "macos")))]
    {
        Command::new("xdg-open")
            .arg(url)
            .spawn()
            .map_err(|e| format!("SYSTEM_ERROR: failed to open browser: {e}"))?;
        return Ok(());
    }

    #[allow(unreachable_code)]
    Err("SYSTEM_ERROR: browser open is unsupported on this platform"
        .to_string()
        .into())
}

/// Login flow state between binding the listener and completing the exchange.
struct StartedLogin {
    auth_url: String,
    redirect_uri: String,
    state: String,
    pkce: pkce::PkcePair,
    listener: callback_server::BoundCallbackListener,
}

async fn start_login(client_id: &str, preferred_port: u16) -> AppResult<StartedLogin> {
    let pkce = pkce::generate_pkce_pair();
    let state = build_oauth_state();
    let listener = callback_server::bind_callback_listener(preferred_port).await?;
    let redirect_uri = make_redirect_uri(listener.port());
    let auth_url = build_authorize_url(client_id, &redirect_uri, &state, &pkce.code_challenge)?;
    Ok(StartedLogin {
        auth_url,
        redirect_uri,
        state,
        pkce,
        listener,
    })
}

/// Run the interactive login flow using the client id/secret from the
/// environment and return the credentials to store.
pub async fn login() -> AppResult<LoginResult> {
    let (client_id, client_secret) = Credentials::client_from_env()?;
    let started = start_login(&client_id, DEFAULT_CALLBACK_PORT).await?;

    println!(
        "\nOpen this URL in your browser to authorize:\n\n{}\n",
        started.auth_url
    );
    if let Err(err) = open_browser(&started.auth_url) {
        // Not fatal: the URL was printed and can be opened manually.
        tracing::warn!("could not open browser automatically: {}", err);
    }

    finish_login(started, client_id, client_secret, GOOGLE_TOKEN_URL).await
}

async fn finish_login(
    started: StartedLogin,
    client_id: String,
    client_secret: String,
    token_url: &str,
) -> AppResult<LoginResult> {
    // A redirect arriving before accept() is held by the listener backlog.
    let payload =
        callback_server::wait_for_callback(started.listener, &started.state, CALLBACK_TIMEOUT)
            .await?;
    if let Some(err_code) = payload.error.as_deref() {
        let description = payload
            .error_description
            .as_deref()
            .unwrap_or("oauth login failed");
        return Err(format!(
            "SYSTEM_ERROR: oauth provider returned error={err_code}: {description}"
        )
        .into());
    }
    let code = payload
        .code
        .ok_or_else(|| "SYSTEM_ERROR: oauth callback missing code".to_string())?;

    tracing::info!("authorization code received; exchanging for tokens");

    let client = crate::sheets::build_http_client()?;
    let token_set = exchange_authorization_code(
        &client,
        &TokenExchangeRequest {
            token_uri: token_url.to_string(),
            client_id: client_id.clone(),
            client_secret: Some(client_secret.clone()),
            code,
            redirect_uri: started.redirect_uri,
            code_verifier: started.pkce.code_verifier,
        },
    )
    .await?;

    let refresh_token = token_set.refresh_token.ok_or_else(|| {
        "AUTH_RELOGIN_REQUIRED: no refresh token received; revoke access at \
         https://myaccount.google.com/permissions and try again"
            .to_string()
    })?;

    Ok(LoginResult {
        client_id,
        client_secret,
        refresh_token,
    })
}
