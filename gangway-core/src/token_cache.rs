//! Filesystem cache for SSO bearer tokens.
//!
//! Tokens are stored under `~/.aws/sso/cache/<sha1(startUrl)>.json` in the
//! same shape other AWS tooling reads, so a token minted here is immediately
//! usable by the AWS CLI and SDKs via `AWS_PROFILE`.

use std::path::PathBuf;

use chrono::{DateTime, Duration, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{GangwayError, Result};

/// Tokens closer than this to expiry are treated as absent on read.
const EXPIRY_BUFFER_SECS: i64 = 300;

/// Legacy AWS CLI timestamp form with a literal `UTC` suffix.
const LEGACY_EXPIRES_FORMAT: &str = "%Y-%m-%dT%H:%M:%SUTC";

/// A cached SSO access token in the standard AWS CLI cache shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedToken {
    /// The SSO start URL the token was minted for.
    pub start_url: String,
    /// Region of the identity provider that minted the token.
    pub region: String,
    /// Bearer token accepted by the role catalog APIs.
    pub access_token: String,
    /// Instant after which the provider rejects the token.
    pub expires_at: DateTime<Utc>,
}

/// On-disk JSON shape of a cached token (`expiresAt` as text).
#[derive(Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct CachedTokenWire {
    #[serde(default)]
    start_url: String,
    #[serde(default)]
    region: String,
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    expires_at: String,
}

/// Parse an `expiresAt` value in either the RFC 3339 form or the legacy
/// `2020-06-17T10:02:08UTC` form. Both denote the same semantic instant.
fn parse_expires_at(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, LEGACY_EXPIRES_FORMAT)
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Reads and writes cached SSO tokens under the AWS CLI cache directory.
///
/// One file per start URL; the writer assumes a single local process owns the
/// file, so no cross-process locking is performed.
#[derive(Debug, Clone)]
pub struct TokenCache {
    root: PathBuf,
}

impl TokenCache {
    /// Build a cache rooted at `~/.aws/sso/cache`.
    pub fn new() -> Result<Self> {
        let home = std::env::var("HOME")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| {
                GangwayError::Config("cannot determine home directory".to_string())
            })?;
        Ok(Self {
            root: PathBuf::from(home).join(".aws").join("sso").join("cache"),
        })
    }

    /// Build a cache rooted at an explicit directory.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Cache file path for a start URL: the lowercase hex SHA-1 of the URL,
    /// matching the AWS CLI naming convention byte for byte.
    pub fn cache_path(&self, start_url: &str) -> PathBuf {
        let digest = ring::digest::digest(
            &ring::digest::SHA1_FOR_LEGACY_USE_ONLY,
            start_url.as_bytes(),
        );
        let name: String = digest
            .as_ref()
            .iter()
            .map(|byte| format!("{byte:02x}"))
            .collect();
        self.root.join(format!("{name}.json"))
    }

    /// Persist a token, creating the cache directory if needed.
    ///
    /// The file is written to a temporary sibling and renamed into place, so a
    /// reader never observes a partially written token.
    pub async fn write(&self, token: &CachedToken) -> Result<()> {
        self.ensure_root().await?;

        let wire = CachedTokenWire {
            start_url: token.start_url.clone(),
            region: token.region.clone(),
            access_token: token.access_token.clone(),
            expires_at: token
                .expires_at
                .to_rfc3339_opts(SecondsFormat::Secs, true),
        };
        let payload = serde_json::to_vec(&wire).map_err(std::io::Error::other)?;

        let path = self.cache_path(&token.start_url);
        let staging = path.with_extension("json.tmp");
        write_private_file(&staging, &payload).await?;
        tokio::fs::rename(&staging, &path).await?;
        Ok(())
    }

    /// Read the cached token for a start URL.
    ///
    /// Returns `None` (never an error) when the file is missing, unparseable,
    /// missing an access token, or within five minutes of expiry: callers
    /// must never receive a token that could expire mid-use.
    pub async fn read(&self, start_url: &str) -> Option<CachedToken> {
        let path = self.cache_path(start_url);
        let raw = tokio::fs::read_to_string(&path).await.ok()?;
        let wire: CachedTokenWire = serde_json::from_str(&raw).ok()?;
        if wire.access_token.is_empty() {
            return None;
        }
        let expires_at = parse_expires_at(&wire.expires_at)?;
        if expires_at <= Utc::now() + Duration::seconds(EXPIRY_BUFFER_SECS) {
            log::debug!("cached token for {start_url} is expired or about to expire");
            return None;
        }
        Some(CachedToken {
            start_url: wire.start_url,
            region: wire.region,
            access_token: wire.access_token,
            expires_at,
        })
    }

    /// Create the cache directory with owner-only permissions if absent.
    async fn ensure_root(&self) -> Result<()> {
        if tokio::fs::metadata(&self.root).await.is_ok() {
            return Ok(());
        }
        tokio::fs::create_dir_all(&self.root).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&self.root, std::fs::Permissions::from_mode(0o700))
                .await?;
        }
        Ok(())
    }
}

/// Write a file readable and writable by the owner only.
async fn write_private_file(path: &std::path::Path, payload: &[u8]) -> Result<()> {
    use tokio::io::AsyncWriteExt;

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);
    let mut file = options.open(path).await?;
    file.write_all(payload).await?;
    file.flush().await?;
    Ok(())
}
