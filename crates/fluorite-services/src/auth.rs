//! Credential resolution for provider adapters
//!
//! Each provider reads one token-style variable (with optional aliases) plus a
//! few provider-specific fields. Missing credentials are not fatal: a warning
//! names the variable to set and the adapter proceeds unauthenticated.

use fluorite_core::AuthConfig;
use std::env;
use tracing::{debug, warn};

/// Where a provider's credentials live in the environment
#[derive(Debug, Clone, Copy)]
pub struct CredentialSpec {
    pub service: &'static str,
    /// Token variables in priority order; the first one is the canonical name
    pub token_vars: &'static [&'static str],
    /// `(field name, env var)` pairs copied into [`AuthConfig::fields`]
    pub field_vars: &'static [(&'static str, &'static str)],
}

impl CredentialSpec {
    /// Variable to mention in "not authenticated" guidance
    pub fn primary_var(&self) -> &'static str {
        self.token_vars.first().copied().unwrap_or("")
    }
}

const CREDENTIALS: &[CredentialSpec] = &[
    CredentialSpec {
        service: "vercel",
        token_vars: &["VERCEL_TOKEN"],
        field_vars: &[("teamId", "VERCEL_TEAM_ID")],
    },
    CredentialSpec {
        service: "cloudflare",
        token_vars: &["CLOUDFLARE_API_TOKEN"],
        field_vars: &[("accountId", "CLOUDFLARE_ACCOUNT_ID")],
    },
    CredentialSpec {
        service: "supabase",
        token_vars: &["SUPABASE_ACCESS_TOKEN"],
        field_vars: &[],
    },
    CredentialSpec {
        service: "turso",
        token_vars: &["TURSO_TOKEN", "TURSO_API_TOKEN"],
        field_vars: &[("organization", "TURSO_ORG")],
    },
    CredentialSpec {
        service: "aws",
        token_vars: &["AWS_ACCESS_KEY_ID"],
        field_vars: &[
            ("secretAccessKey", "AWS_SECRET_ACCESS_KEY"),
            ("sessionToken", "AWS_SESSION_TOKEN"),
            ("region", "AWS_REGION"),
            ("profile", "AWS_PROFILE"),
        ],
    },
    CredentialSpec {
        service: "github",
        token_vars: &["GITHUB_TOKEN", "GH_TOKEN"],
        field_vars: &[],
    },
];

/// Credential layout for a provider, if it has one
pub fn credential_spec(service: &str) -> Option<&'static CredentialSpec> {
    CREDENTIALS.iter().find(|spec| spec.service == service)
}

/// Canonical token variable for a provider
pub fn token_env_var(service: &str) -> &'static str {
    credential_spec(service)
        .map(CredentialSpec::primary_var)
        .unwrap_or("")
}

/// Resolve credentials using an arbitrary variable lookup
pub fn resolve_with<F>(service: &str, lookup: F) -> AuthConfig
where
    F: Fn(&str) -> Option<String>,
{
    let Some(spec) = credential_spec(service) else {
        return AuthConfig::default();
    };

    let mut auth = AuthConfig::default();
    for var in spec.token_vars {
        if let Some(value) = lookup(var).filter(|v| !v.trim().is_empty()) {
            debug!("Using {} for {}", var, service);
            auth.token = Some(value);
            break;
        }
    }
    for (field, var) in spec.field_vars {
        if let Some(value) = lookup(var).filter(|v| !v.trim().is_empty()) {
            auth.fields.insert((*field).to_string(), value);
        }
    }

    if auth.token.is_none() {
        warn!(
            "No credentials found for {}; set {} to authenticate",
            service,
            spec.primary_var()
        );
    }

    auth
}

/// Resolve credentials from the process environment
pub fn resolve_from_env(service: &str) -> AuthConfig {
    resolve_with(service, |var| env::var(var).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    // Mutex to prevent concurrent env var modifications
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_every_provider_has_a_token_var() {
        for service in ["vercel", "cloudflare", "supabase", "turso", "aws", "github"] {
            assert!(!token_env_var(service).is_empty(), "{} has no token var", service);
        }
        assert_eq!(token_env_var("vercel"), "VERCEL_TOKEN");
        assert_eq!(token_env_var("nope"), "");
    }

    #[test]
    fn test_token_alias_priority() {
        let auth = resolve_with(
            "github",
            lookup_from(&[("GITHUB_TOKEN", "primary"), ("GH_TOKEN", "alias")]),
        );
        assert_eq!(auth.token.as_deref(), Some("primary"));

        let auth = resolve_with("github", lookup_from(&[("GH_TOKEN", "alias")]));
        assert_eq!(auth.token.as_deref(), Some("alias"));
    }

    #[test]
    fn test_fields_are_collected() {
        let auth = resolve_with(
            "aws",
            lookup_from(&[
                ("AWS_ACCESS_KEY_ID", "AKIA123"),
                ("AWS_SECRET_ACCESS_KEY", "shh"),
                ("AWS_REGION", "eu-west-1"),
            ]),
        );
        assert_eq!(auth.token.as_deref(), Some("AKIA123"));
        assert_eq!(auth.field("secretAccessKey"), Some("shh"));
        assert_eq!(auth.field("region"), Some("eu-west-1"));
        assert_eq!(auth.field("profile"), None);
    }

    #[test]
    fn test_missing_credentials_are_not_fatal() {
        let auth = resolve_with("supabase", lookup_from(&[]));
        assert!(auth.is_empty());

        let auth = resolve_with("vercel", lookup_from(&[("VERCEL_TOKEN", "   ")]));
        assert!(auth.token.is_none());
    }

    #[test]
    fn test_resolve_from_env() {
        let _guard = ENV_LOCK.lock().unwrap();
        let original = env::var("TURSO_TOKEN").ok();

        env::set_var("TURSO_TOKEN", "from-env");
        let auth = resolve_from_env("turso");
        assert_eq!(auth.token.as_deref(), Some("from-env"));

        match original {
            Some(v) => env::set_var("TURSO_TOKEN", v),
            None => env::remove_var("TURSO_TOKEN"),
        }
    }
}
