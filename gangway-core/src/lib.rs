#![deny(missing_docs)]
//! Gangway core library.
//!
//! This crate contains the credential-acquisition pipeline behind the
//! `gangway` CLI: a filesystem cache for SSO bearer tokens, the OIDC device
//! authorization flow, bounded-concurrency account/role discovery, and
//! deterministic profile naming. Components depend on transport traits, not
//! concrete clients, so everything is testable with in-memory fakes.

mod cancel;
pub mod credentials;
pub mod device_auth;
pub mod discovery;
pub mod error;
pub mod naming;
pub mod pipeline;
pub mod profile;
pub mod token_cache;
pub mod transport;

pub use credentials::{
    RoleCredentials, fetch_role_credentials, format_export_commands, truncate_session_token,
};
pub use device_auth::{
    BrowserOpener, CreateTokenResponse, DeviceAuthInfo, DeviceAuthorization, OidcClient,
    RegisteredClient, Sleeper, SystemBrowser, TokenResult, TokioSleeper, authenticate,
};
pub use discovery::{
    AccountPage, CatalogClient, DiscoveredAccount, DiscoveredRole, RoleBinding, RolePage,
    discover_role_bindings, list_all_account_roles, list_all_accounts,
};
pub use error::{GangwayError, Result};
pub use naming::{allocate_unique_names, suggest_profile_name};
pub use pipeline::{PipelineEvents, acquire_token, discover_profiles};
pub use profile::{
    AWS_REGIONS, SsoProfile, validate_account_id, validate_profile_name, validate_region,
    validate_role_name, validate_start_url,
};
pub use token_cache::{CachedToken, TokenCache};
pub use transport::{HttpCatalogClient, HttpOidcClient};
