//! The routing rule document: the typed shape of the persisted YAML config
//! that drives C3 (router/auth) and C4 (forwarder). Distinct from
//! [`crate::config::Config`], which holds process-level settings.

use crate::transform::Transform;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Root config document: `version`, `defaults`, `routes`, optional `auth`
/// and `patterns`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case", default)]
pub struct RuleSet {
    pub version: u32,
    pub defaults: Defaults,
    pub routes: Vec<Route>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<Auth>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub patterns: Vec<crate::pattern::Pattern>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Defaults {
    pub target_timeout_connect_sec: u64,
    pub target_timeout_read_sec: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            target_timeout_connect_sec: 5,
            target_timeout_read_sec: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Route {
    pub name: String,
    #[serde(rename = "match")]
    pub r#match: RouteMatch,
    pub target: Target,
    #[serde(default)]
    pub transform: Transform,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify_hmac: Option<Hmac>,
    #[serde(default)]
    pub unroll_alerts: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RouteMatch {
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Target {
    pub url: Option<String>,
    pub url_env: Option<String>,
    pub auth_header_env: Option<String>,
    pub api_key_header: Option<String>,
    pub api_key: Option<String>,
    pub api_key_env: Option<String>,
    #[serde(default = "default_true")]
    pub verify_tls: bool,
    pub ca_cert: Option<String>,
    pub ca_cert_env: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for Target {
    fn default() -> Self {
        Self {
            url: None,
            url_env: None,
            auth_header_env: None,
            api_key_header: None,
            api_key: None,
            api_key_env: None,
            verify_tls: true,
            ca_cert: None,
            ca_cert_env: None,
        }
    }
}

impl Target {
    /// Resolve the effective outbound URL: a literal `url` wins over
    /// `url_env`. Returns `None` when neither yields a non-empty value.
    pub fn resolve_url(&self) -> Option<String> {
        if let Some(u) = &self.url
            && !u.is_empty()
        {
            return Some(u.clone());
        }
        if let Some(var) = &self.url_env
            && let Ok(v) = std::env::var(var)
            && !v.is_empty()
        {
            return Some(v);
        }
        None
    }

    /// Resolve the API key value: `api_key_env` wins when set and
    /// non-empty, otherwise the literal `api_key`.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(var) = &self.api_key_env
            && let Ok(v) = std::env::var(var)
            && !v.is_empty()
        {
            return Some(v);
        }
        self.api_key.clone()
    }

    /// Resolve the custom CA bundle path, if any trust override is configured.
    pub fn resolve_ca_cert(&self) -> Option<String> {
        if let Some(p) = &self.ca_cert
            && !p.is_empty()
        {
            return Some(p.clone());
        }
        if let Some(var) = &self.ca_cert_env {
            return std::env::var(var).ok().filter(|v| !v.is_empty());
        }
        None
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Hmac {
    pub secret_env: String,
    #[serde(default = "default_hmac_header")]
    pub header: String,
    #[serde(default)]
    pub algorithm: HmacAlgorithm,
}

fn default_hmac_header() -> String {
    "X-Signature-256".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HmacAlgorithm {
    #[default]
    Sha256,
    Sha1,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case", default)]
pub struct Auth {
    pub basic: Option<BasicAuth>,
    pub api_keys: Option<ApiKeys>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case", default)]
pub struct BasicAuth {
    pub users: Vec<BasicAuthUser>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BasicAuthUser {
    pub username: String,
    pub password_env: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case", default)]
pub struct ApiKeys {
    pub keys: Vec<ApiKeyEntry>,
    pub required: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ApiKeyEntry {
    pub name: String,
    pub key: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Validate the invariants of §3: unique route names, unique sources, and
/// syntactically-sane paths/selectors. Returns a list of human-readable
/// violations; an empty list means the document is well-formed.
pub fn validate(rules: &RuleSet) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen_names = HashSet::new();
    let mut seen_sources = HashSet::new();

    for route in &rules.routes {
        if !seen_names.insert(route.name.clone()) {
            errors.push(format!("duplicate route name {:?}", route.name));
        }
        if !seen_sources.insert(route.r#match.source.to_lowercase()) {
            errors.push(format!(
                "duplicate route match.source {:?}",
                route.r#match.source
            ));
        }
        if route.target.url.is_none() && route.target.url_env.is_none() {
            errors.push(format!(
                "route {:?} has no target.url nor target.url_env",
                route.name
            ));
        }
        for selector in route.transform.output_template.iter().flat_map(|t| t.fields.values()) {
            if selector != "$" && !selector.starts_with("$.") {
                errors.push(format!(
                    "route {:?} has malformed output selector {:?}",
                    route.name, selector
                ));
            }
        }
    }

    errors
}

/// Route resolution per §4.3: exact match, then case-insensitive, then
/// (if the suffix contains `-`) an exact match against the prefix.
pub fn resolve_route<'a>(routes: &'a [Route], source: &str) -> Option<&'a Route> {
    if let Some(r) = routes.iter().find(|r| r.r#match.source == source) {
        return Some(r);
    }
    let lower = source.to_lowercase();
    if let Some(r) = routes
        .iter()
        .find(|r| r.r#match.source.to_lowercase() == lower)
    {
        return Some(r);
    }
    if let Some((prefix, _)) = source.split_once('-') {
        return routes.iter().find(|r| r.r#match.source == prefix);
    }
    None
}
