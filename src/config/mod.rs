//! Configuration document model
//!
//! Parses the JSON config document and provides typed access to providers,
//! the route table, router groups, and operational knobs. Unrecognized
//! fields are captured verbatim so a read-modify-write cycle round-trips
//! operator content untouched.

pub mod store;
pub mod validator;
pub mod versions;
pub mod watcher;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::{AppError, AppResult};

/// Default long-context threshold in estimated tokens.
pub const DEFAULT_LONG_CONTEXT_THRESHOLD: u64 = 60_000;

/// Root configuration document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigDocument {
    #[serde(rename = "Providers", default)]
    pub providers: Vec<Provider>,

    #[serde(rename = "Router", default)]
    pub router: RouteTable,

    #[serde(
        rename = "RouterGroups",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub router_groups: Option<IndexMap<String, RouterGroup>>,

    /// Path to an operator-supplied routing-rules file.
    #[serde(
        rename = "CUSTOM_ROUTER_PATH",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub custom_router_path: Option<String>,

    #[serde(rename = "APIKEY", default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Tokens granted mutating access on the control API. When empty, the
    /// primary `APIKEY` carries full access.
    #[serde(
        rename = "FULL_ACCESS_KEYS",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub full_access_keys: Vec<String>,

    #[serde(rename = "HOST", default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(rename = "PORT", default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    #[serde(rename = "PROXY_URL", default, skip_serializing_if = "Option::is_none")]
    pub proxy_url: Option<String>,

    #[serde(
        rename = "API_TIMEOUT_MS",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub api_timeout_ms: Option<u64>,

    #[serde(rename = "LOG", default, skip_serializing_if = "Option::is_none")]
    pub log: Option<bool>,

    #[serde(
        rename = "NON_INTERACTIVE_MODE",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub non_interactive_mode: Option<bool>,

    /// Unrecognized top-level fields, preserved for round-trip.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Upstream provider entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    pub name: String,
    #[serde(default)]
    pub api_base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub models: Vec<String>,
    /// Opaque transformer configuration, passed through to the transformer
    /// pipeline untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transformer: Option<Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Route table: which `"provider,model"` target serves each request class
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteTable {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub think: Option<String>,

    #[serde(
        rename = "longContext",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub long_context: Option<String>,

    #[serde(rename = "webSearch", default, skip_serializing_if = "Option::is_none")]
    pub web_search: Option<String>,

    #[serde(
        rename = "longContextThreshold",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub long_context_threshold: Option<u64>,

    /// Only meaningful on the base `Router` record; stripped from merged
    /// views.
    #[serde(
        rename = "activeGroup",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub active_group: Option<String>,
}

impl RouteTable {
    /// Effective long-context threshold, applying the default when unset.
    pub fn threshold(&self) -> u64 {
        self.long_context_threshold
            .unwrap_or(DEFAULT_LONG_CONTEXT_THRESHOLD)
    }

    /// Overlay `other`'s set fields on top of this table, dropping the
    /// group marker. This is the merged routing view a group produces.
    pub fn overlay(&self, other: &RouteTable) -> RouteTable {
        RouteTable {
            default: other.default.clone().or_else(|| self.default.clone()),
            background: other.background.clone().or_else(|| self.background.clone()),
            think: other.think.clone().or_else(|| self.think.clone()),
            long_context: other
                .long_context
                .clone()
                .or_else(|| self.long_context.clone()),
            web_search: other
                .web_search
                .clone()
                .or_else(|| self.web_search.clone()),
            long_context_threshold: other
                .long_context_threshold
                .or(self.long_context_threshold),
            active_group: None,
        }
    }

    /// All `(field, target)` route pairs that are set, for validation.
    pub fn routes(&self) -> Vec<(&'static str, &str)> {
        let mut out = Vec::new();
        if let Some(v) = self.default.as_deref() {
            out.push(("default", v));
        }
        if let Some(v) = self.background.as_deref() {
            out.push(("background", v));
        }
        if let Some(v) = self.think.as_deref() {
            out.push(("think", v));
        }
        if let Some(v) = self.long_context.as_deref() {
            out.push(("longContext", v));
        }
        if let Some(v) = self.web_search.as_deref() {
            out.push(("webSearch", v));
        }
        out
    }
}

/// Named routing profile overlaying the base route table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouterGroup {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub routes: RouteTable,
}

impl ConfigDocument {
    /// Parse a config document from JSON text.
    pub fn from_json_str(content: &str) -> AppResult<Self> {
        serde_json::from_str(content)
            .map_err(|e| AppError::Schema(format!("invalid config document: {e}")))
    }

    /// Parse a config document from an already-deserialized JSON value.
    pub fn from_value(value: Value) -> AppResult<Self> {
        serde_json::from_value(value)
            .map_err(|e| AppError::Schema(format!("invalid config document: {e}")))
    }

    /// Serialize to a JSON value.
    pub fn to_value(&self) -> AppResult<Value> {
        serde_json::to_value(self)
            .map_err(|e| AppError::Internal(format!("config serialization failed: {e}")))
    }

    /// SHA-256 over the canonical form of this document.
    pub fn checksum(&self) -> AppResult<String> {
        let value = self.to_value()?;
        Ok(checksum_value(&value))
    }

    /// Look up a provider by name.
    pub fn find_provider(&self, name: &str) -> Option<&Provider> {
        self.providers.iter().find(|p| p.name == name)
    }
}

/// Deterministic serialization: object keys recursively sorted, array
/// order preserved, scalars rendered by serde_json. Used for checksums so
/// semantically equal documents hash identically regardless of field
/// order.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key).expect("string serializes"));
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => {
            out.push_str(&serde_json::to_string(scalar).expect("scalar serializes"));
        }
    }
}

/// Hex SHA-256 of the canonical form of a JSON value.
pub fn checksum_value(value: &Value) -> String {
    let canonical = canonical_json(value);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}
