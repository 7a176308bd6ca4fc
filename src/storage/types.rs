use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Known platform brands, matched by substring against the host.
/// (needle, id, name, description)
const KNOWN_PLATFORMS: &[(&str, &str, &str, &str)] = &[
    (
        "quantgov",
        "quantgov",
        "Quant Government Cloud",
        "Quant government cloud deployment",
    ),
    (
        "quantcdn",
        "quantcdn",
        "QuantCDN",
        "Quant commercial cloud platform",
    ),
];

/// Identity of one distinct API endpoint (a host plus its brand).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformInfo {
    pub id: String,
    pub name: String,
    pub host: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl PlatformInfo {
    /// Derive platform identity from a host. Known brands map to fixed
    /// slugs; anything else becomes a slugified custom endpoint.
    pub fn for_host(host: &str) -> Self {
        for (needle, id, name, description) in KNOWN_PLATFORMS {
            if host.contains(needle) {
                return Self {
                    id: id.to_string(),
                    name: name.to_string(),
                    host: host.to_string(),
                    description: Some(description.to_string()),
                };
            }
        }

        Self {
            id: slugify_host(host),
            name: "Custom Endpoint".to_string(),
            host: host.to_string(),
            description: None,
        }
    }
}

/// Strip the protocol and collapse non-alphanumeric runs to hyphens.
pub fn slugify_host(host: &str) -> String {
    let stripped = host.split("://").last().unwrap_or(host);
    let mut slug = String::with_capacity(stripped.len());
    let mut pending_dash = false;

    for ch in stripped.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    slug
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationRole {
    pub name: String,
    pub display_name: String,
}

/// Organization membership as returned by the user-info endpoint.
/// Field names stay snake_case to match the API payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: u64,
    pub name: String,
    pub machine_name: String,
    #[serde(default)]
    pub roles: Vec<OrganizationRole>,
}

/// One authenticated session against one platform. Serialized camelCase
/// for compatibility with credential files written by earlier releases.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Absolute expiry as an RFC 3339 timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub host: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organizations: Option<Vec<Organization>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_organization: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_application: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_environment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_project: Option<String>,
}

impl AuthConfig {
    /// True when `expires_at` is present and elapsed (or unparsable).
    pub fn token_expired(&self) -> bool {
        match &self.expires_at {
            Some(ts) => match chrono::DateTime::parse_from_rfc3339(ts) {
                Ok(t) => chrono::Utc::now() >= t,
                Err(_) => true,
            },
            None => false,
        }
    }

    /// A record with no token, or with an elapsed expiry, is stale.
    /// Stale records stay in the store; they just can't be used.
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some() && !self.token_expired()
    }
}

/// One store entry: the session plus the platform identity it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformEntry {
    #[serde(flatten)]
    pub auth: AuthConfig,
    #[serde(rename = "platformInfo")]
    pub platform_info: PlatformInfo,
}

/// The persisted credential store shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiPlatformConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_platform: Option<String>,
    #[serde(default)]
    pub platforms: HashMap<String, PlatformEntry>,
}

/// Partial update for the active platform's session fields. An outer
/// `None` leaves the field untouched; for the navigational fields,
/// `Some(None)` clears the stored value. `platformInfo` is never a merge
/// target and is preserved verbatim by the store.
#[derive(Debug, Clone, Default)]
pub struct AuthUpdate {
    pub token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: Option<String>,
    pub email: Option<String>,
    pub organizations: Option<Vec<Organization>>,
    pub active_organization: Option<Option<String>>,
    pub active_application: Option<Option<String>>,
    pub active_environment: Option<Option<String>>,
}

impl AuthUpdate {
    pub fn apply(self, auth: &mut AuthConfig) {
        if let Some(token) = self.token {
            auth.token = Some(token);
        }
        if let Some(refresh_token) = self.refresh_token {
            auth.refresh_token = Some(refresh_token);
        }
        if let Some(expires_at) = self.expires_at {
            auth.expires_at = Some(expires_at);
        }
        if let Some(email) = self.email {
            auth.email = Some(email);
        }
        if let Some(organizations) = self.organizations {
            auth.organizations = Some(organizations);
        }
        if let Some(org) = self.active_organization {
            auth.active_organization = org;
        }
        if let Some(app) = self.active_application {
            auth.active_application = app;
        }
        if let Some(env) = self.active_environment {
            auth.active_environment = env;
        }
    }
}

/// One row of `platform list` output.
#[derive(Debug, Clone)]
pub struct PlatformListing {
    pub id: String,
    pub info: PlatformInfo,
    pub is_active: bool,
}
