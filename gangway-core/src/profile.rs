//! SSO profile records and field validation.

use crate::discovery::RoleBinding;
use crate::error::{GangwayError, Result};

/// Valid AWS regions offered for selection.
pub const AWS_REGIONS: &[&str] = &[
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
    "af-south-1",
    "ap-east-1",
    "ap-south-1",
    "ap-south-2",
    "ap-southeast-1",
    "ap-southeast-2",
    "ap-southeast-3",
    "ap-northeast-1",
    "ap-northeast-2",
    "ap-northeast-3",
    "ca-central-1",
    "eu-central-1",
    "eu-central-2",
    "eu-west-1",
    "eu-west-2",
    "eu-west-3",
    "eu-south-1",
    "eu-south-2",
    "eu-north-1",
    "me-south-1",
    "me-central-1",
    "sa-east-1",
];

/// A persisted, named role binding plus its region.
///
/// Profiles are immutable value records; updating one means replacing the
/// record stored under the same name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsoProfile {
    /// Profile name, unique within the store.
    pub name: String,
    /// SSO start URL the profile authenticates against.
    pub start_url: String,
    /// Region for both the identity provider and the credentials.
    pub region: String,
    /// Twelve-digit account identifier.
    pub account_id: String,
    /// Human-friendly account alias; may be empty.
    pub account_name: String,
    /// Role assumed within the account.
    pub role_name: String,
}

impl SsoProfile {
    /// Build a profile from a discovered binding and its allocated name.
    pub fn from_binding(start_url: &str, region: &str, binding: &RoleBinding, name: String) -> Self {
        Self {
            name,
            start_url: start_url.to_string(),
            region: region.to_string(),
            account_id: binding.account.account_id.clone(),
            account_name: binding.account.account_name.clone(),
            role_name: binding.role.role_name.clone(),
        }
    }

    /// Formatted line for listings: the name plus its account and role.
    pub fn display_name(&self) -> String {
        if self.account_name.is_empty() {
            format!("{} ({} / {})", self.name, self.account_id, self.role_name)
        } else {
            format!("{} ({} / {})", self.name, self.account_name, self.role_name)
        }
    }

    /// Check every field of the profile.
    pub fn validate(&self) -> Result<()> {
        validate_profile_name(&self.name)?;
        validate_start_url(&self.start_url)?;
        validate_region(&self.region)?;
        validate_account_id(&self.account_id)?;
        validate_role_name(&self.role_name)?;
        Ok(())
    }
}

/// Check that the SSO start URL is a plausible HTTPS URL.
pub fn validate_start_url(url: &str) -> Result<()> {
    let url = url.trim();
    if url.is_empty() {
        return Err(GangwayError::Config("SSO start URL is required".to_string()));
    }
    if !url.starts_with("https://") && !url.starts_with("http://") {
        return Err(GangwayError::Config(
            "SSO start URL must begin with https://".to_string(),
        ));
    }
    Ok(())
}

/// Check that the account ID is a twelve-digit number.
pub fn validate_account_id(id: &str) -> Result<()> {
    let id = id.trim();
    if id.is_empty() {
        return Err(GangwayError::Config("account ID is required".to_string()));
    }
    if id.len() != 12 || !id.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(GangwayError::Config(
            "account ID must be exactly 12 digits".to_string(),
        ));
    }
    Ok(())
}

/// Check that the role name is non-empty.
pub fn validate_role_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(GangwayError::Config("role name is required".to_string()));
    }
    Ok(())
}

/// Check that the profile name is non-empty and safe for a sectioned store.
pub fn validate_profile_name(name: &str) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        return Err(GangwayError::Config("profile name is required".to_string()));
    }
    if name.contains('[') || name.contains(']') {
        return Err(GangwayError::Config(
            "profile name cannot contain '[' or ']'".to_string(),
        ));
    }
    Ok(())
}

/// Check that the region is in the known list.
pub fn validate_region(region: &str) -> Result<()> {
    let region = region.trim();
    if region.is_empty() {
        return Err(GangwayError::Config("region is required".to_string()));
    }
    if !AWS_REGIONS.contains(&region) {
        return Err(GangwayError::Config(format!("unknown AWS region: {region}")));
    }
    Ok(())
}
