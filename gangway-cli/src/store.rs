//! AWS config and credentials file persistence for SSO profiles.
//!
//! The files use the AWS CLI's sectioned key/value layout. Saving replaces
//! managed sections by name and leaves everything else in the file exactly as
//! it was found, comments and unrecognized lines included.

use std::path::{Path, PathBuf};

use gangway_core::{RoleCredentials, SsoProfile};

use crate::CliResult;

/// Comment attached to every section this tool writes.
const MANAGED_MARKER: &str = "# managed by gangway";

/// Resolve the AWS config file path, honoring `AWS_CONFIG_FILE`.
pub(crate) fn config_path() -> CliResult<PathBuf> {
    if let Ok(path) = std::env::var("AWS_CONFIG_FILE") {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }
    Ok(home_dir()?.join(".aws").join("config"))
}

/// Resolve the AWS credentials file path, honoring `AWS_SHARED_CREDENTIALS_FILE`.
pub(crate) fn credentials_path() -> CliResult<PathBuf> {
    if let Ok(path) = std::env::var("AWS_SHARED_CREDENTIALS_FILE") {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }
    Ok(home_dir()?.join(".aws").join("credentials"))
}

fn home_dir() -> CliResult<PathBuf> {
    match std::env::var("HOME") {
        Ok(home) if !home.trim().is_empty() => Ok(PathBuf::from(home)),
        _ => Err("cannot determine home directory".into()),
    }
}

/// A sectioned key/value file, parsed just enough to edit sections while
/// preserving unrecognized content byte for byte.
#[derive(Debug, Default)]
struct SectionedFile {
    preamble: Vec<String>,
    sections: Vec<Section>,
}

#[derive(Debug)]
struct Section {
    name: String,
    lines: Vec<String>,
}

impl Section {
    fn value_of(&self, key: &str) -> Option<String> {
        self.lines.iter().find_map(|line| {
            let (candidate, value) = line.split_once('=')?;
            if candidate.trim() == key {
                Some(value.trim().to_string())
            } else {
                None
            }
        })
    }

    fn has_key(&self, key: &str) -> bool {
        self.value_of(key).is_some()
    }
}

impl SectionedFile {
    fn parse(contents: &str) -> Self {
        let mut file = Self::default();
        for raw in contents.lines() {
            let trimmed = raw.trim();
            if trimmed.starts_with('[') && trimmed.ends_with(']') {
                file.sections.push(Section {
                    name: trimmed[1..trimmed.len() - 1].trim().to_string(),
                    lines: Vec::new(),
                });
                continue;
            }
            match file.sections.last_mut() {
                Some(section) => section.lines.push(raw.to_string()),
                None => file.preamble.push(raw.to_string()),
            }
        }
        file
    }

    fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.preamble {
            out.push_str(line);
            out.push('\n');
        }
        for section in &self.sections {
            out.push_str(&format!("[{}]\n", section.name));
            for line in &section.lines {
                out.push_str(line);
                out.push('\n');
            }
        }
        out
    }

    /// Replace the named section's contents, or append a new section.
    fn replace_section(&mut self, name: &str, pairs: &[(&str, &str)]) {
        let mut lines = vec![MANAGED_MARKER.to_string()];
        lines.extend(
            pairs
                .iter()
                .map(|(key, value)| format!("{key} = {value}")),
        );
        if let Some(section) = self.sections.iter_mut().find(|s| s.name == name) {
            section.lines = lines;
        } else {
            self.sections.push(Section {
                name: name.to_string(),
                lines,
            });
        }
    }
}

/// Section name for a profile: the AWS config file uses `profile <name>` for
/// everything except the default profile.
fn section_name(profile_name: &str) -> String {
    if profile_name == "default" {
        "default".to_string()
    } else {
        format!("profile {profile_name}")
    }
}

fn profile_name_from_section(section: &str) -> &str {
    section.strip_prefix("profile ").unwrap_or(section)
}

/// A section counts as an SSO profile when it carries the SSO key set.
fn is_sso_section(section: &Section) -> bool {
    section.has_key("sso_start_url")
        && section.has_key("sso_region")
        && section.has_key("sso_account_id")
        && section.has_key("sso_role_name")
}

async fn load_file(path: &Path) -> CliResult<SectionedFile> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(SectionedFile::parse(&contents)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(SectionedFile::default()),
        Err(err) => Err(format!("cannot read {}: {err}", path.display()).into()),
    }
}

async fn write_file(path: &Path, file: &SectionedFile) -> CliResult<()> {
    ensure_parent_dir(path).await?;
    tokio::fs::write(path, file.render()).await?;
    Ok(())
}

/// Create the parent directory with owner-only permissions if absent.
async fn ensure_parent_dir(path: &Path) -> CliResult<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if tokio::fs::metadata(parent).await.is_ok() {
        return Ok(());
    }
    tokio::fs::create_dir_all(parent).await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(parent, std::fs::Permissions::from_mode(0o700)).await?;
    }
    Ok(())
}

/// Read all SSO profiles from the AWS config file.
pub(crate) async fn load_profiles() -> CliResult<Vec<SsoProfile>> {
    load_profiles_from(&config_path()?).await
}

pub(crate) async fn load_profiles_from(path: &Path) -> CliResult<Vec<SsoProfile>> {
    let file = load_file(path).await?;
    let profiles = file
        .sections
        .iter()
        .filter(|section| is_sso_section(section))
        .map(|section| SsoProfile {
            name: profile_name_from_section(&section.name).to_string(),
            start_url: section.value_of("sso_start_url").unwrap_or_default(),
            region: section.value_of("sso_region").unwrap_or_default(),
            account_id: section.value_of("sso_account_id").unwrap_or_default(),
            account_name: section.value_of("sso_account_name").unwrap_or_default(),
            role_name: section.value_of("sso_role_name").unwrap_or_default(),
        })
        .collect();
    Ok(profiles)
}

/// Write profiles to the AWS config file in a single read/write cycle,
/// replacing managed sections by name.
pub(crate) async fn save_profiles(profiles: &[SsoProfile]) -> CliResult<()> {
    save_profiles_to(&config_path()?, profiles).await
}

pub(crate) async fn save_profiles_to(path: &Path, profiles: &[SsoProfile]) -> CliResult<()> {
    let mut file = load_file(path).await?;
    for profile in profiles {
        let mut pairs = vec![
            ("sso_start_url", profile.start_url.as_str()),
            ("sso_region", profile.region.as_str()),
            ("sso_account_id", profile.account_id.as_str()),
        ];
        if !profile.account_name.is_empty() {
            pairs.push(("sso_account_name", profile.account_name.as_str()));
        }
        pairs.push(("sso_role_name", profile.role_name.as_str()));
        file.replace_section(&section_name(&profile.name), &pairs);
    }
    write_file(path, &file).await
}

/// Write temporary credentials under the profile's section in the AWS
/// credentials file.
pub(crate) async fn write_credentials(
    profile_name: &str,
    credentials: &RoleCredentials,
) -> CliResult<()> {
    write_credentials_to(&credentials_path()?, profile_name, credentials).await
}

pub(crate) async fn write_credentials_to(
    path: &Path,
    profile_name: &str,
    credentials: &RoleCredentials,
) -> CliResult<()> {
    let mut file = load_file(path).await?;
    file.replace_section(
        profile_name,
        &[
            ("aws_access_key_id", credentials.access_key_id.as_str()),
            (
                "aws_secret_access_key",
                credentials.secret_access_key.as_str(),
            ),
            ("aws_session_token", credentials.session_token.as_str()),
        ],
    );
    write_file(path, &file).await
}
