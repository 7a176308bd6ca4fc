use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::Deserialize;
use tiny_http::{Response, Server};
use url::Url;

use super::pkce::{self, PkceChallenge};
use crate::storage::{AuthConfig, CredentialStore, Organization, PlatformInfo};

pub const DEFAULT_HOST: &str = "https://dashboard.quantcdn.io";
pub const DEFAULT_CALLBACK_PORT: u16 = 8484;

const CLIENT_ID: &str = "quant-cli";
const SCOPES: &[&str] = &["read", "write"];
const CALLBACK_PATH: &str = "/callback";
const CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

const SUCCESS_HTML: &str = "<html><body><h1>Authentication successful!</h1>\
    <p>You can close this window and return to your terminal.</p></body></html>";
const FAILURE_HTML: &str = "<html><body><h1>Authentication failed</h1>\
    <p>Return to your terminal for details.</p></body></html>";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorBody {
    error: Option<String>,
    error_description: Option<String>,
}

/// Authenticated profile from `/api/oauth/user`.
#[derive(Debug, Deserialize)]
pub struct UserProfile {
    pub email: Option<String>,
    #[serde(default)]
    pub organizations: Vec<Organization>,
}

/// Run the PKCE browser login against `host` and persist the resulting
/// session. Nothing is written to the store until the token exchange and
/// profile fetch have both succeeded, so a failed attempt never leaves a
/// half-populated entry behind.
pub fn login(store: &CredentialStore, host: &str, port: u16, force: bool) -> Result<()> {
    let host = host.trim_end_matches('/').to_string();
    let platform_info = PlatformInfo::for_host(&host);

    if !force {
        let config = store.load();
        if let Some(entry) = config.platforms.get(&platform_info.id) {
            if entry.auth.is_authenticated() {
                eprintln!(
                    "Already authenticated with {} as {}.",
                    platform_info.name,
                    entry.auth.email.as_deref().unwrap_or("unknown")
                );
                eprintln!("Use --force to re-authenticate.");
                return Ok(());
            }
        }
    }

    let pkce = PkceChallenge::generate();
    let state = pkce::state_token();
    let redirect_uri = format!("http://localhost:{}{}", port, CALLBACK_PATH);
    let auth_url = build_authorize_url(&host, &redirect_uri, &state, &pkce.challenge)?;

    // The listener must be up before the browser navigates, or a fast
    // redirect can land on a closed port.
    let server = Server::http(("127.0.0.1", port)).map_err(|e| {
        anyhow::anyhow!("Failed to start local callback server on port {}: {}", port, e)
    })?;

    eprintln!("Opening browser for {} authentication...", platform_info.name);
    eprintln!("If the browser doesn't open, visit:\n{}", auth_url);
    if let Err(e) = open_browser(auth_url.as_str()) {
        eprintln!("Could not launch a browser ({}); use the URL above.", e);
    }

    eprintln!("Waiting for authorization...");
    let code = wait_for_callback(&server, &state, CALLBACK_TIMEOUT)?;
    drop(server);

    let tokens = exchange_code(&host, &code, &pkce.verifier, &redirect_uri)?;
    let profile = fetch_user(&host, &tokens.access_token)?;

    let expires_at = tokens.expires_in.map(|secs| {
        (chrono::Utc::now() + chrono::Duration::seconds(secs as i64)).to_rfc3339()
    });
    let active_organization = profile
        .organizations
        .first()
        .map(|org| org.machine_name.clone());

    let auth = AuthConfig {
        token: Some(tokens.access_token),
        refresh_token: tokens.refresh_token,
        expires_at,
        email: profile.email.clone(),
        host: host.clone(),
        organizations: Some(profile.organizations),
        active_organization,
        ..Default::default()
    };

    store.save_platform_config(&platform_info.id, auth, platform_info.clone())?;

    eprintln!(
        "Logged in to {} as {}.",
        platform_info.name,
        profile.email.as_deref().unwrap_or("unknown")
    );
    Ok(())
}

fn build_authorize_url(
    host: &str,
    redirect_uri: &str,
    state: &str,
    challenge: &str,
) -> Result<Url> {
    let mut auth_url =
        Url::parse(&format!("{}/oauth/authorize", host)).context("Invalid platform host")?;
    auth_url
        .query_pairs_mut()
        .append_pair("client_id", CLIENT_ID)
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("response_type", "code")
        .append_pair("scope", &SCOPES.join(" "))
        .append_pair("state", state)
        .append_pair("code_challenge", challenge)
        .append_pair("code_challenge_method", "S256");
    Ok(auth_url)
}

#[derive(Debug, PartialEq)]
enum CallbackOutcome {
    Code(String),
    Denied(String),
    StateMismatch,
}

fn evaluate_callback(
    params: &HashMap<String, String>,
    expected_state: &str,
) -> CallbackOutcome {
    if let Some(error) = params.get("error") {
        let desc = params.get("error_description").cloned().unwrap_or_default();
        return CallbackOutcome::Denied(if desc.is_empty() {
            error.clone()
        } else {
            format!("{}: {}", error, desc)
        });
    }

    if params.get("state").map(String::as_str) != Some(expected_state) {
        return CallbackOutcome::StateMismatch;
    }

    match params.get("code") {
        Some(code) => CallbackOutcome::Code(code.clone()),
        None => CallbackOutcome::Denied("callback carried no authorization code".to_string()),
    }
}

/// Block until the redirect arrives on the callback route, the provider
/// reports an error, or the timeout elapses. The caller owns the server
/// and drops it on every outcome.
fn wait_for_callback(server: &Server, expected_state: &str, timeout: Duration) -> Result<String> {
    let deadline = Instant::now() + timeout;

    loop {
        let remaining = match deadline.checked_duration_since(Instant::now()) {
            Some(d) if !d.is_zero() => d,
            _ => anyhow::bail!("Timed out waiting for the browser callback"),
        };

        let request = match server.recv_timeout(remaining) {
            Ok(Some(request)) => request,
            Ok(None) => anyhow::bail!("Timed out waiting for the browser callback"),
            Err(e) => anyhow::bail!("Callback server error: {}", e),
        };

        let url = format!("http://localhost{}", request.url());
        let parsed = Url::parse(&url)?;

        if parsed.path() != CALLBACK_PATH {
            let _ = request.respond(Response::from_string("Not found").with_status_code(404));
            continue;
        }

        let params: HashMap<String, String> = parsed
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        match evaluate_callback(&params, expected_state) {
            CallbackOutcome::Code(code) => {
                let _ = request.respond(html_response(SUCCESS_HTML));
                return Ok(code);
            }
            CallbackOutcome::Denied(reason) => {
                let _ = request.respond(html_response(FAILURE_HTML));
                anyhow::bail!("Authorization failed: {}", reason);
            }
            CallbackOutcome::StateMismatch => {
                let _ = request.respond(html_response(FAILURE_HTML));
                anyhow::bail!("OAuth state mismatch; rejected a stale or forged redirect");
            }
        }
    }
}

fn html_response(body: &str) -> Response<std::io::Cursor<Vec<u8>>> {
    Response::from_string(body).with_header(
        tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"text/html; charset=utf-8"[..])
            .unwrap(),
    )
}

fn exchange_code(
    host: &str,
    code: &str,
    verifier: &str,
    redirect_uri: &str,
) -> Result<TokenResponse> {
    let client = reqwest::blocking::Client::new();

    let mut params = HashMap::new();
    params.insert("grant_type", "authorization_code");
    params.insert("client_id", CLIENT_ID);
    params.insert("code", code);
    params.insert("redirect_uri", redirect_uri);
    params.insert("code_verifier", verifier);

    let response = client
        .post(format!("{}/oauth/token", host))
        .form(&params)
        .send()
        .context("Token endpoint unreachable")?;

    let status = response.status();
    let body = response.text().unwrap_or_default();

    if !status.is_success() {
        // Prefer structured error detail when the endpoint provides it.
        if let Ok(err) = serde_json::from_str::<TokenErrorBody>(&body) {
            if let Some(error) = err.error {
                let desc = err.error_description.unwrap_or_default();
                if desc.is_empty() {
                    anyhow::bail!("Token exchange failed: {}", error);
                }
                anyhow::bail!("Token exchange failed: {}: {}", error, desc);
            }
        }
        anyhow::bail!("Token exchange failed ({}): {}", status, body);
    }

    serde_json::from_str(&body).context("Token endpoint returned an unexpected payload")
}

/// Fetch the authenticated profile (email plus organization memberships)
/// from the platform's user-info endpoint. Also serves as the post-login
/// verification call.
pub fn fetch_user(host: &str, access_token: &str) -> Result<UserProfile> {
    let client = reqwest::blocking::Client::new();

    let response = client
        .get(format!("{}/api/oauth/user", host.trim_end_matches('/')))
        .bearer_auth(access_token)
        .send()
        .context("User info endpoint unreachable")?;

    if !response.status().is_success() {
        anyhow::bail!("Failed to fetch user profile ({})", response.status());
    }

    response
        .json()
        .context("User info endpoint returned an unexpected payload")
}

fn open_browser(url: &str) -> Result<()> {
    #[cfg(target_os = "macos")]
    std::process::Command::new("open").arg(url).spawn()?;

    #[cfg(target_os = "linux")]
    std::process::Command::new("xdg-open").arg(url).spawn()?;

    #[cfg(target_os = "windows")]
    std::process::Command::new("cmd")
        .args(["/C", "start", url])
        .spawn()?;

    Ok(())
}
