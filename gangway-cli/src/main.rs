#![deny(missing_docs)]
//! Gangway command-line interface.
//!
//! Discovers AWS SSO accounts and roles behind a start URL, caches the SSO
//! bearer token for reuse by other AWS tooling, and mints temporary role
//! credentials for saved profiles.

mod store;

use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use gangway_core::{
    DeviceAuthInfo, HttpCatalogClient, HttpOidcClient, PipelineEvents, RoleCredentials,
    SsoProfile, SystemBrowser, TokenCache, TokioSleeper, acquire_token, discover_profiles,
    fetch_role_credentials, format_export_commands, truncate_session_token, validate_region,
    validate_start_url,
};
use tokio_util::sync::CancellationToken;

pub(crate) type CliResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[cfg_attr(test, allow(dead_code))]
#[derive(Parser)]
#[command(name = "gangway", version, about = "AWS SSO profile and credential helper")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[cfg_attr(test, allow(dead_code))]
#[derive(Args, Clone)]
struct ConnectionArgs {
    /// SSO start URL of your identity provider portal.
    #[arg(long, env = "GANGWAY_START_URL")]
    start_url: String,
    /// Region hosting the identity provider instance.
    #[arg(long, env = "GANGWAY_SSO_REGION")]
    sso_region: String,
}

#[cfg_attr(test, allow(dead_code))]
#[derive(Subcommand)]
enum Commands {
    /// Discover every account and role behind a start URL and save profiles.
    Discover {
        #[command(flatten)]
        connection: ConnectionArgs,
        /// Default region recorded on the saved profiles (defaults to the
        /// SSO region).
        #[arg(long)]
        region: Option<String>,
    },
    /// List saved SSO profiles.
    List,
    /// Mint temporary credentials for a saved profile.
    Creds {
        /// Profile name to use.
        #[arg(long)]
        profile: String,
        /// Print export commands for shell eval; display moves to stderr so
        /// stdout stays clean.
        #[arg(long)]
        export: bool,
    },
}

#[cfg(not(test))]
#[tokio::main]
async fn main() -> CliResult<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Discover { connection, region } => run_discover(connection, region).await?,
        Commands::List => run_list().await?,
        Commands::Creds { profile, export } => run_creds(profile, export).await?,
    }

    Ok(())
}

#[cfg(test)]
fn main() {}

#[cfg_attr(test, allow(dead_code))]
/// Cancellation token that fires on Ctrl-C, governing the whole pipeline.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });
    cancel
}

#[cfg_attr(test, allow(dead_code))]
/// Route a display line to stdout, or stderr in export mode.
fn emit(to_stderr: bool, message: &str) {
    if to_stderr {
        eprintln!("{message}");
    } else {
        println!("{message}");
    }
}

/// Human-facing instructions for completing the device authorization.
fn device_instructions(info: &DeviceAuthInfo) -> String {
    format!(
        "\nVerification URL: {}\nUser code:        {}\n\nA browser window should open automatically.\nIf not, open the URL above and enter the code.\n",
        info.verification_uri, info.user_code
    )
}

#[cfg_attr(test, allow(dead_code))]
/// Pipeline callbacks that print to the chosen stream.
fn printing_events(to_stderr: bool) -> PipelineEvents<'static> {
    PipelineEvents {
        on_device_auth: Box::new(move |info| emit(to_stderr, &device_instructions(info))),
        on_status: Box::new(move |status| emit(to_stderr, &format!("  {status}"))),
        on_warning: Box::new(move |warning| eprintln!("Warning: {warning}")),
    }
}

/// Find a saved profile by name.
fn find_profile(profiles: &[SsoProfile], name: &str) -> Option<SsoProfile> {
    profiles.iter().find(|profile| profile.name == name).cloned()
}

#[cfg_attr(test, allow(dead_code))]
async fn run_discover(connection: ConnectionArgs, region: Option<String>) -> CliResult<()> {
    validate_start_url(&connection.start_url)?;
    validate_region(&connection.sso_region)?;
    let region = region.unwrap_or_else(|| connection.sso_region.clone());
    validate_region(&region)?;

    let cancel = cancel_on_ctrl_c();
    let cache = TokenCache::new()?;
    let oidc = HttpOidcClient::new(&connection.sso_region)?;
    let mut events = printing_events(false);

    let token = acquire_token(
        &cache,
        &oidc,
        &SystemBrowser,
        &TokioSleeper,
        &connection.start_url,
        &connection.sso_region,
        &cancel,
        &mut events,
    )
    .await?;

    let catalog = Arc::new(HttpCatalogClient::new(&connection.sso_region)?);
    let mut on_status = |status: &str| println!("  {status}");
    let profiles = discover_profiles(
        catalog,
        &token.access_token,
        &connection.start_url,
        &region,
        &cancel,
        &mut on_status,
    )
    .await?;

    store::save_profiles(&profiles).await?;

    println!();
    println!("Saved {} profile(s) to ~/.aws/config:", profiles.len());
    for profile in &profiles {
        println!("  {}", profile.display_name());
    }
    println!();
    println!("Run `gangway creds --profile <name>` to log in with one of them.");
    Ok(())
}

#[cfg_attr(test, allow(dead_code))]
async fn run_list() -> CliResult<()> {
    let profiles = store::load_profiles().await?;
    if profiles.is_empty() {
        println!("No saved SSO profiles found. Run `gangway discover` to set some up.");
        return Ok(());
    }
    for profile in &profiles {
        println!("{}", profile.display_name());
    }
    Ok(())
}

#[cfg_attr(test, allow(dead_code))]
async fn run_creds(profile_name: String, export: bool) -> CliResult<()> {
    let profiles = store::load_profiles().await?;
    let profile = find_profile(&profiles, &profile_name)
        .ok_or_else(|| format!("profile {profile_name:?} not found in ~/.aws/config"))?;

    let cancel = cancel_on_ctrl_c();
    let cache = TokenCache::new()?;
    let oidc = HttpOidcClient::new(&profile.region)?;
    let mut events = printing_events(export);

    let token = acquire_token(
        &cache,
        &oidc,
        &SystemBrowser,
        &TokioSleeper,
        &profile.start_url,
        &profile.region,
        &cancel,
        &mut events,
    )
    .await?;

    let catalog = HttpCatalogClient::new(&profile.region)?;
    let credentials = fetch_role_credentials(
        &catalog,
        &token.access_token,
        &profile.account_id,
        &profile.role_name,
        &cancel,
    )
    .await?;

    if let Err(err) = store::write_credentials(&profile.name, &credentials).await {
        eprintln!("Warning: could not write to ~/.aws/credentials: {err}");
    } else {
        emit(export, "  Credentials written to ~/.aws/credentials");
    }

    emit(export, &credentials_summary(&profile, &credentials));

    if export {
        println!("{}", format_export_commands(&credentials));
        emit(true, "  Credentials exported to shell environment");
    } else {
        emit(false, "To use this profile in other tools:");
        emit(false, &format!("  export AWS_PROFILE={}", profile.name));
    }
    Ok(())
}

/// Readable credential summary for the terminal.
fn credentials_summary(profile: &SsoProfile, credentials: &RoleCredentials) -> String {
    format!(
        "\nProfile:           {}\nAccess key ID:     {}\nSession token:     {}\nExpires:           {}\n",
        profile.name,
        credentials.access_key_id,
        truncate_session_token(&credentials.session_token),
        credentials.expiration.to_rfc3339()
    )
}
