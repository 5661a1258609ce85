use std::path::Path;

use serde::Deserialize;

use crate::error::{CapiError, CapiResult};

/// Root configuration. Loaded from an optional TOML file and environment
/// variables with the prefix `CAPI_BRIDGE__`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub facebook: FacebookConfig,
    #[serde(default)]
    pub tiktok: TikTokConfig,
    #[serde(default)]
    pub pinterest: PinterestConfig,
    #[serde(default)]
    pub quality: QualityConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Facebook Conversions API.
#[derive(Debug, Clone, Deserialize)]
pub struct FacebookConfig {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub pixel_id: String,
    #[serde(default = "default_facebook_api_base_url")]
    pub api_base_url: String,
    #[serde(default)]
    pub test_mode: bool,
    #[serde(default = "default_test_event_code")]
    pub test_event_code: String,
    #[serde(default = "default_country")]
    pub country: String,
}

/// TikTok Events API.
#[derive(Debug, Clone, Deserialize)]
pub struct TikTokConfig {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub pixel_id: String,
    #[serde(default = "default_tiktok_api_url")]
    pub api_url: String,
    #[serde(default = "default_tiktok_stats_url")]
    pub stats_url: String,
    #[serde(default)]
    pub test_mode: bool,
    #[serde(default = "default_test_event_code")]
    pub test_event_code: String,
    #[serde(default)]
    pub partner_name: String,
}

/// Pinterest Conversions API.
#[derive(Debug, Clone, Deserialize)]
pub struct PinterestConfig {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub ad_account_id: String,
    #[serde(default = "default_pinterest_api_base_url")]
    pub api_base_url: String,
    #[serde(default)]
    pub test_mode: bool,
    #[serde(default)]
    pub partner_name: String,
    #[serde(default)]
    pub default_product: ProductDefaults,
}

/// Catalogue entry used when a Pinterest commerce event omits product fields.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductDefaults {
    #[serde(default)]
    pub content_id: String,
    #[serde(default)]
    pub content_name: String,
    #[serde(default)]
    pub content_category: String,
    #[serde(default)]
    pub content_brand: String,
    #[serde(default = "default_product_price")]
    pub price: String,
}

/// Facebook Dataset Quality API.
#[derive(Debug, Clone, Deserialize)]
pub struct QualityConfig {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub dataset_id: String,
    #[serde(default = "default_quality_api_base_url")]
    pub api_base_url: String,
    #[serde(default)]
    pub agent_name: Option<String>,
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
    #[serde(default = "default_enable_auto_refresh")]
    pub enable_auto_refresh: bool,
}

// Default functions
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_user_agent() -> String {
    concat!("capi-bridge/", env!("CARGO_PKG_VERSION")).to_string()
}
fn default_facebook_api_base_url() -> String {
    "https://graph.facebook.com/v18.0".to_string()
}
fn default_test_event_code() -> String {
    "TEST12345".to_string()
}
fn default_country() -> String {
    "BR".to_string()
}
fn default_tiktok_api_url() -> String {
    "https://business-api.tiktok.com/open_api/v1.3/event/track".to_string()
}
fn default_tiktok_stats_url() -> String {
    "https://business-api.tiktok.com/open_api/v1.3/event/stats".to_string()
}
fn default_pinterest_api_base_url() -> String {
    "https://api.pinterest.com/v5/ad_accounts".to_string()
}
fn default_product_price() -> String {
    "0.00".to_string()
}
fn default_quality_api_base_url() -> String {
    "https://graph.facebook.com/v23.0".to_string()
}
fn default_refresh_interval_ms() -> u64 {
    300_000
}
fn default_enable_auto_refresh() -> bool {
    true
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for FacebookConfig {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            pixel_id: String::new(),
            api_base_url: default_facebook_api_base_url(),
            test_mode: false,
            test_event_code: default_test_event_code(),
            country: default_country(),
        }
    }
}

impl Default for TikTokConfig {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            pixel_id: String::new(),
            api_url: default_tiktok_api_url(),
            stats_url: default_tiktok_stats_url(),
            test_mode: false,
            test_event_code: default_test_event_code(),
            partner_name: String::new(),
        }
    }
}

impl Default for PinterestConfig {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            ad_account_id: String::new(),
            api_base_url: default_pinterest_api_base_url(),
            test_mode: false,
            partner_name: String::new(),
            default_product: ProductDefaults::default(),
        }
    }
}

impl Default for ProductDefaults {
    fn default() -> Self {
        Self {
            content_id: String::new(),
            content_name: String::new(),
            content_category: String::new(),
            content_brand: String::new(),
            price: default_product_price(),
        }
    }
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            dataset_id: String::new(),
            api_base_url: default_quality_api_base_url(),
            agent_name: None,
            refresh_interval_ms: default_refresh_interval_ms(),
            enable_auto_refresh: default_enable_auto_refresh(),
        }
    }
}

fn require(value: &str, field: &str) -> CapiResult<()> {
    if value.trim().is_empty() {
        return Err(CapiError::Config(format!("{field} must not be empty")));
    }
    Ok(())
}

fn require_url(value: &str, field: &str) -> CapiResult<()> {
    url::Url::parse(value)
        .map(|_| ())
        .map_err(|e| CapiError::Config(format!("{field} is not a valid URL: {e}")))
}

impl FacebookConfig {
    pub fn validate(&self) -> CapiResult<()> {
        require(&self.access_token, "facebook.access_token")?;
        require(&self.pixel_id, "facebook.pixel_id")?;
        require_url(&self.api_base_url, "facebook.api_base_url")
    }
}

impl TikTokConfig {
    pub fn validate(&self) -> CapiResult<()> {
        require(&self.access_token, "tiktok.access_token")?;
        require(&self.pixel_id, "tiktok.pixel_id")?;
        require_url(&self.api_url, "tiktok.api_url")?;
        require_url(&self.stats_url, "tiktok.stats_url")
    }
}

impl PinterestConfig {
    pub fn validate(&self) -> CapiResult<()> {
        require(&self.access_token, "pinterest.access_token")?;
        require(&self.ad_account_id, "pinterest.ad_account_id")?;
        require_url(&self.api_base_url, "pinterest.api_base_url")
    }
}

impl QualityConfig {
    pub fn validate(&self) -> CapiResult<()> {
        require(&self.access_token, "quality.access_token")?;
        require(&self.dataset_id, "quality.dataset_id")?;
        require_url(&self.api_base_url, "quality.api_base_url")?;
        if self.refresh_interval_ms == 0 {
            return Err(CapiError::Config(
                "quality.refresh_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl AppConfig {
    /// Load configuration from an optional TOML file, then environment
    /// variables (`CAPI_BRIDGE__FACEBOOK__PIXEL_ID=...`).
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let builder = builder.add_source(
            config::Environment::with_prefix("CAPI_BRIDGE")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.http.request_timeout_secs, 30);
        assert_eq!(config.facebook.api_base_url, "https://graph.facebook.com/v18.0");
        assert_eq!(config.facebook.test_event_code, "TEST12345");
        assert_eq!(config.facebook.country, "BR");
        assert_eq!(config.quality.refresh_interval_ms, 300_000);
        assert!(config.quality.enable_auto_refresh);
        assert_eq!(config.pinterest.default_product.price, "0.00");
    }

    #[test]
    fn test_validate_rejects_missing_credentials() {
        let config = AppConfig::default();
        assert!(config.facebook.validate().is_err());
        assert!(config.tiktok.validate().is_err());
        assert!(config.pinterest.validate().is_err());
        assert!(config.quality.validate().is_err());

        let facebook = FacebookConfig {
            access_token: "token".into(),
            pixel_id: "123".into(),
            ..Default::default()
        };
        assert!(facebook.validate().is_ok());

        let bad_url = FacebookConfig {
            api_base_url: "not a url".into(),
            ..facebook
        };
        assert!(matches!(bad_url.validate(), Err(CapiError::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[facebook]
access_token = "fb-token"
pixel_id = "1085353383617030"
test_mode = true

[pinterest.default_product]
content_id = "sku-1"
price = "89.90"

[quality]
refresh_interval_ms = 1000
agent_name = "storefront"
"#
        )
        .unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.facebook.access_token, "fb-token");
        assert_eq!(config.facebook.pixel_id, "1085353383617030");
        assert!(config.facebook.test_mode);
        assert_eq!(config.pinterest.default_product.content_id, "sku-1");
        assert_eq!(config.pinterest.default_product.price, "89.90");
        assert_eq!(config.quality.refresh_interval_ms, 1000);
        assert_eq!(config.quality.agent_name.as_deref(), Some("storefront"));
        // untouched sections keep their defaults
        assert_eq!(config.tiktok.test_event_code, "TEST12345");
    }
}
