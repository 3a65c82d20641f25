//! Temporary role credentials for a selected profile.

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::cancel::racing_cancel;
use crate::discovery::CatalogClient;
use crate::error::Result;

/// Temporary AWS credentials for one account/role pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleCredentials {
    /// Access key identifier.
    pub access_key_id: String,
    /// Secret access key.
    pub secret_access_key: String,
    /// Session token accompanying the key pair.
    pub session_token: String,
    /// Instant the credentials expire.
    pub expiration: DateTime<Utc>,
}

/// Fetch temporary credentials for the given account and role.
pub async fn fetch_role_credentials<C>(
    client: &C,
    access_token: &str,
    account_id: &str,
    role_name: &str,
    cancel: &CancellationToken,
) -> Result<RoleCredentials>
where
    C: CatalogClient + ?Sized,
{
    racing_cancel(
        cancel,
        client.get_role_credentials(access_token, account_id, role_name),
    )
    .await
}

/// Shell export commands for the credentials, one per line.
pub fn format_export_commands(credentials: &RoleCredentials) -> String {
    format!(
        "export AWS_ACCESS_KEY_ID={}\nexport AWS_SECRET_ACCESS_KEY={}\nexport AWS_SESSION_TOKEN={}",
        credentials.access_key_id, credentials.secret_access_key, credentials.session_token
    )
}

/// Shorten a session token for display.
pub fn truncate_session_token(token: &str) -> String {
    if token.len() <= 40 {
        return token.to_string();
    }
    format!("{}...{}", &token[..20], &token[token.len() - 20..])
}
