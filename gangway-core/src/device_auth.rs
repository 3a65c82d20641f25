//! SSO OIDC device authorization flow.
//!
//! Drives the three-step handshake (register client, start device
//! authorization, poll for a token) and reports progress through
//! caller-supplied callbacks. The flow never touches a terminal directly.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::cancel::racing_cancel;
use crate::error::{GangwayError, Result};

/// Client name announced during registration.
pub(crate) const CLIENT_NAME: &str = "gangway";
/// Registration type for a public client with no secret channel.
pub(crate) const CLIENT_TYPE: &str = "public";
/// OAuth2 grant type for the device authorization flow.
pub(crate) const DEVICE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";
/// Poll interval used when the provider does not suggest one.
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
/// Extra wait applied on top of the base interval after a slow-down signal.
const SLOW_DOWN_PENALTY_SECS: u64 = 5;
/// Absolute wall-clock bound on the poll loop.
const AUTH_TIMEOUT: Duration = Duration::from_secs(300);

/// Client id/secret pair issued by the provider for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredClient {
    /// Identifier used for all subsequent OIDC calls in the session.
    pub client_id: String,
    /// Secret paired with the identifier.
    pub client_secret: String,
}

/// Device authorization issued by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceAuthorization {
    /// Opaque code the poll loop exchanges for a token.
    pub device_code: String,
    /// Short code the user enters on the verification page.
    pub user_code: String,
    /// Page where the user approves the request.
    pub verification_uri: String,
    /// Verification page with the user code pre-filled.
    pub verification_uri_complete: Option<String>,
    /// Provider-suggested seconds between polls.
    pub interval: Option<u64>,
}

/// Raw token endpoint response: either a token or an error identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateTokenResponse {
    /// Issued bearer token, when authorization succeeded.
    pub access_token: Option<String>,
    /// Seconds until the issued token expires.
    pub expires_in: Option<i64>,
    /// OAuth error identifier string, when authorization did not succeed.
    pub error: Option<String>,
    /// Optional human-readable error detail.
    pub error_description: Option<String>,
}

/// Access token minted by a completed device flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenResult {
    /// Bearer token accepted by the role catalog APIs.
    pub access_token: String,
    /// Instant the token expires.
    pub expires_at: DateTime<Utc>,
}

/// Verification details shown to the user while they approve the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceAuthInfo {
    /// URL the user must open to approve the request.
    pub verification_uri: String,
    /// Code the user enters on the verification page.
    pub user_code: String,
}

/// Transport abstraction for the SSO OIDC endpoints.
pub trait OidcClient: Send + Sync {
    /// Announce this application to the identity provider.
    fn register_client<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<RegisteredClient>> + Send + 'a>>;

    /// Obtain a device/user code pair for the given start URL.
    fn start_device_authorization<'a>(
        &'a self,
        client: &'a RegisteredClient,
        start_url: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<DeviceAuthorization>> + Send + 'a>>;

    /// Attempt to exchange the device code for a token.
    fn create_token<'a>(
        &'a self,
        client: &'a RegisteredClient,
        device_code: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<CreateTokenResponse>> + Send + 'a>>;
}

/// Async sleep abstraction for polling tests.
pub trait Sleeper: Send + Sync {
    /// Suspend the current task for the given duration.
    fn sleep<'a>(&'a self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;
}

/// Tokio-backed sleeper used in production.
#[derive(Debug, Default, Clone)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep<'a>(&'a self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Opens verification URLs in the user's browser.
#[cfg_attr(test, mockall::automock)]
pub trait BrowserOpener: Send + Sync {
    /// Open the URL; failures are never fatal to the flow.
    fn open(&self, url: &str) -> std::io::Result<()>;
}

/// Browser opener backed by the `open` crate.
#[derive(Debug, Default, Clone)]
pub struct SystemBrowser;

impl BrowserOpener for SystemBrowser {
    fn open(&self, url: &str) -> std::io::Result<()> {
        open::that(url)
    }
}

/// Parsed state of one token endpoint attempt.
#[derive(Debug, PartialEq, Eq)]
enum PollOutcome {
    Issued {
        access_token: String,
        expires_in: i64,
    },
    Pending,
    SlowDown,
    Denied(String),
    Fatal(String),
}

/// Interpret a token endpoint response into an actionable outcome.
///
/// Classification matches the provider's error identifier string; no other
/// error taxonomy is consulted.
fn interpret_create_token(response: CreateTokenResponse) -> PollOutcome {
    if let Some(access_token) = response.access_token {
        return PollOutcome::Issued {
            access_token,
            expires_in: response.expires_in.unwrap_or(0),
        };
    }
    let Some(error) = response.error else {
        return PollOutcome::Fatal(
            "token response carried neither a token nor an error".to_string(),
        );
    };
    match error.as_str() {
        "authorization_pending" => PollOutcome::Pending,
        "slow_down" => PollOutcome::SlowDown,
        "access_denied" => PollOutcome::Denied("authorization denied by the user".to_string()),
        "expired_token" => {
            PollOutcome::Denied("device code expired before approval".to_string())
        }
        _ => PollOutcome::Fatal(
            response
                .error_description
                .unwrap_or_else(|| format!("token endpoint error: {error}")),
        ),
    }
}

/// Perform the full SSO OIDC device authorization flow.
///
/// `on_device_auth` receives the verification URL and user code for display;
/// `on_status` receives free-text progress updates. The verification URL is
/// also opened in a browser best-effort.
///
/// The poll loop issues its first token request immediately, then waits one
/// poll interval between attempts. It ends on token issuance, terminal
/// refusal, the absolute five-minute timeout, or cancellation.
pub async fn authenticate<C, B, S>(
    client: &C,
    browser: &B,
    sleeper: &S,
    start_url: &str,
    cancel: &CancellationToken,
    mut on_device_auth: impl FnMut(&DeviceAuthInfo),
    mut on_status: impl FnMut(&str),
) -> Result<TokenResult>
where
    C: OidcClient + ?Sized,
    B: BrowserOpener + ?Sized,
    S: Sleeper + ?Sized,
{
    on_status("Registering client...");
    let registered = match racing_cancel(cancel, client.register_client()).await {
        Ok(registered) => registered,
        Err(GangwayError::Cancelled) => return Err(GangwayError::Cancelled),
        Err(err) => {
            return Err(GangwayError::Config(format!(
                "client registration rejected: {err}"
            )));
        }
    };

    on_status("Starting device authorization...");
    let authorization = racing_cancel(
        cancel,
        client.start_device_authorization(&registered, start_url),
    )
    .await?;

    let verification_uri = authorization
        .verification_uri_complete
        .clone()
        .unwrap_or_else(|| authorization.verification_uri.clone());
    let info = DeviceAuthInfo {
        verification_uri,
        user_code: authorization.user_code.clone(),
    };
    on_device_auth(&info);
    if let Err(err) = browser.open(&info.verification_uri) {
        log::warn!("could not open browser for device authorization: {err}");
    }

    let base_interval = Duration::from_secs(
        authorization
            .interval
            .unwrap_or(DEFAULT_POLL_INTERVAL_SECS)
            .max(1),
    );
    let mut interval = base_interval;
    let deadline = tokio::time::Instant::now() + AUTH_TIMEOUT;

    on_status("Waiting for browser authorization...");
    let mut first = true;
    loop {
        if !first {
            // Three-way race: whichever fires first wins and is the only
            // branch taken. Terminal conditions outrank the interval timer.
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(GangwayError::Cancelled),
                _ = tokio::time::sleep_until(deadline) => return Err(GangwayError::AuthTimedOut),
                _ = sleeper.sleep(interval) => {}
            }
        }
        first = false;

        let response = racing_cancel(
            cancel,
            client.create_token(&registered, &authorization.device_code),
        )
        .await?;
        match interpret_create_token(response) {
            PollOutcome::Issued {
                access_token,
                expires_in,
            } => {
                return Ok(TokenResult {
                    access_token,
                    expires_at: Utc::now() + chrono::Duration::seconds(expires_in),
                });
            }
            PollOutcome::Pending => {
                log::debug!("device authorization still pending");
            }
            PollOutcome::SlowDown => {
                interval = base_interval + Duration::from_secs(SLOW_DOWN_PENALTY_SECS);
                log::debug!("provider asked to slow down; polling every {interval:?}");
            }
            PollOutcome::Denied(message) => return Err(GangwayError::AuthDenied(message)),
            PollOutcome::Fatal(message) => return Err(GangwayError::Transport(message)),
        }
    }
}
