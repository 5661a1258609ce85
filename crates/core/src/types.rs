//! Shared types: the loosely-typed event data bag, the browser context that
//! replaces ambient page state, and the platform identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::identity;

/// Currency applied when an event does not carry one.
pub const DEFAULT_CURRENCY: &str = "BRL";

/// Target advertising platform.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Facebook,
    TikTok,
    Pinterest,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Facebook => "facebook",
            Platform::TikTok => "tiktok",
            Platform::Pinterest => "pinterest",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "facebook" | "meta" | "fb" => Ok(Platform::Facebook),
            "tiktok" => Ok(Platform::TikTok),
            "pinterest" => Ok(Platform::Pinterest),
            other => Err(format!("unknown platform '{other}'")),
        }
    }
}

/// Open mapping of caller-supplied event fields.
///
/// Lookups follow "or-default" semantics: a key that is missing, `null`,
/// `false`, `0` or `""` counts as absent and the caller's default is used.
/// Present values pass through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventData(Map<String, Value>);

impl EventData {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Wrap a JSON value. Anything other than an object yields an empty bag.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Value for `key` if present and not falsy.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| is_truthy(v))
    }

    /// Value for `key` if present and not falsy, otherwise `default`.
    pub fn value_or(&self, key: &str, default: impl Into<Value>) -> Value {
        self.get(key).cloned().unwrap_or_else(|| default.into())
    }

    /// Non-empty string value for `key`.
    pub fn text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn array(&self, key: &str) -> Option<&Vec<Value>> {
        self.0.get(key).and_then(Value::as_array)
    }

    pub fn object(&self, key: &str) -> Option<&Map<String, Value>> {
        self.0.get(key).and_then(Value::as_object)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl From<Map<String, Value>> for EventData {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Value)> for EventData {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Loose truthiness: `null`, `false`, zero, NaN and `""` are falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Page-level state a browser would expose: location, referrer, user agent
/// and the raw `Cookie` header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserContext {
    pub page_url: String,
    #[serde(default)]
    pub referrer: String,
    #[serde(default)]
    pub user_agent: String,
    #[serde(default)]
    pub cookie_header: String,
}

impl BrowserContext {
    pub fn new(page_url: impl Into<String>) -> Self {
        Self {
            page_url: page_url.into(),
            ..Default::default()
        }
    }

    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = referrer.into();
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_cookies(mut self, cookie_header: impl Into<String>) -> Self {
        self.cookie_header = cookie_header.into();
        self
    }

    /// Cookie value by name, `""` when unavailable.
    pub fn cookie(&self, name: &str) -> String {
        identity::read_cookie(&self.cookie_header, name)
    }

    /// Whether the page was served over http(s).
    pub fn is_http(&self) -> bool {
        url::Url::parse(&self.page_url)
            .map(|u| matches!(u.scheme(), "http" | "https"))
            .unwrap_or(false)
    }

    /// Path component of the page URL, `""` when it cannot be parsed.
    pub fn path(&self) -> String {
        url::Url::parse(&self.page_url)
            .map(|u| u.path().to_string())
            .unwrap_or_default()
    }
}
