//! Composition of the credential-acquisition pipeline.
//!
//! The cache supplies a token when it can; otherwise the device flow mints
//! one and the cache persists it. Discovery then enumerates every binding the
//! token authorizes and the allocator names them. All progress is reported
//! through caller-supplied callbacks; nothing here writes to a terminal.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::device_auth::{
    BrowserOpener, DeviceAuthInfo, OidcClient, Sleeper, TokenResult, authenticate,
};
use crate::discovery::{CatalogClient, discover_role_bindings, list_all_accounts};
use crate::error::{GangwayError, Result};
use crate::naming::allocate_unique_names;
use crate::profile::SsoProfile;
use crate::token_cache::{CachedToken, TokenCache};

/// Callbacks through which the pipeline reports progress to its caller.
pub struct PipelineEvents<'a> {
    /// Receives verification details when the device flow starts.
    pub on_device_auth: Box<dyn FnMut(&DeviceAuthInfo) + Send + 'a>,
    /// Receives free-text status updates.
    pub on_status: Box<dyn FnMut(&str) + Send + 'a>,
    /// Receives non-fatal degradation notices, such as cache write failures.
    pub on_warning: Box<dyn FnMut(&str) + Send + 'a>,
}

/// Obtain a usable bearer token for the start URL.
///
/// A valid cached token short-circuits the device flow entirely. After a
/// fresh authentication the token is written back to the cache; a write
/// failure degrades to a warning because credential issuance can proceed
/// without the cache.
pub async fn acquire_token<O, B, S>(
    cache: &TokenCache,
    oidc: &O,
    browser: &B,
    sleeper: &S,
    start_url: &str,
    region: &str,
    cancel: &CancellationToken,
    events: &mut PipelineEvents<'_>,
) -> Result<TokenResult>
where
    O: OidcClient + ?Sized,
    B: BrowserOpener + ?Sized,
    S: Sleeper + ?Sized,
{
    let PipelineEvents {
        on_device_auth,
        on_status,
        on_warning,
    } = events;

    if let Some(cached) = cache.read(start_url).await {
        on_status("Using cached SSO token (still valid)");
        return Ok(TokenResult {
            access_token: cached.access_token,
            expires_at: cached.expires_at,
        });
    }

    let token = authenticate(
        oidc,
        browser,
        sleeper,
        start_url,
        cancel,
        |info| on_device_auth(info),
        |status| on_status(status),
    )
    .await?;
    on_status("Authentication successful!");

    let record = CachedToken {
        start_url: start_url.to_string(),
        region: region.to_string(),
        access_token: token.access_token.clone(),
        expires_at: token.expires_at,
    };
    if let Err(err) = cache.write(&record).await {
        log::warn!("could not write SSO token cache: {err}");
        on_warning(&format!("could not write SSO token cache: {err}"));
    }

    Ok(token)
}

/// Enumerate and name every profile the token authorizes.
///
/// Accounts and roles are discovered with the bounded fan-out, then each
/// binding receives a unique name. The returned profiles are in discovery
/// order and ready for the external store.
pub async fn discover_profiles<C>(
    catalog: Arc<C>,
    access_token: &str,
    start_url: &str,
    region: &str,
    cancel: &CancellationToken,
    on_status: &mut (dyn FnMut(&str) + Send),
) -> Result<Vec<SsoProfile>>
where
    C: CatalogClient + ?Sized + 'static,
{
    on_status("Discovering accounts...");
    let accounts = list_all_accounts(catalog.as_ref(), access_token, cancel).await?;
    if accounts.is_empty() {
        return Err(GangwayError::Discovery(
            "no AWS accounts found for this SSO user".to_string(),
        ));
    }
    on_status(&format!("Found {} account(s)", accounts.len()));

    on_status("Discovering roles...");
    let bindings =
        discover_role_bindings(Arc::clone(&catalog), access_token, &accounts, cancel).await?;
    if bindings.is_empty() {
        return Err(GangwayError::Discovery(
            "no roles found across any accounts".to_string(),
        ));
    }

    let names = allocate_unique_names(&bindings);
    let profiles: Vec<SsoProfile> = bindings
        .iter()
        .zip(names)
        .map(|(binding, name)| SsoProfile::from_binding(start_url, region, binding, name))
        .collect();
    on_status(&format!(
        "Found {} profile(s) across {} account(s)",
        profiles.len(),
        accounts.len()
    ));
    Ok(profiles)
}
