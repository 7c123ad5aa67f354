//! Provider adapters
//!
//! One module per provider. Each exposes `info()` (its static [`ServiceInfo`])
//! and a `create` constructor that the registry stores.

mod aws;
mod base;
mod cloudflare;
mod github;
mod supabase;
mod turso;
mod vercel;

pub use aws::AwsAdapter;
pub use base::AdapterBase;
pub use cloudflare::CloudflareAdapter;
pub use github::GitHubAdapter;
pub use supabase::SupabaseAdapter;
pub use turso::TursoAdapter;
pub use vercel::VercelAdapter;

use chrono::{DateTime, TimeZone, Utc};
use fluorite_core::ServiceInfo;
use serde_json::Value;

/// Static descriptors for every built-in provider
pub fn builtin_infos() -> Vec<ServiceInfo> {
    vec![
        vercel::info(),
        cloudflare::info(),
        supabase::info(),
        turso::info(),
        aws::info(),
        github::info(),
    ]
}

/// Accepts epoch milliseconds or an RFC 3339 string
pub(crate) fn parse_time(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        _ => None,
    }
}

/// String field or an empty string
pub(crate) fn str_field(value: &Value, key: &str) -> String {
    match &value[key] {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
