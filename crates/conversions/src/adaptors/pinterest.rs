//! Pinterest Conversions API adaptor. Events are posted to
//! `{api_base_url}/{ad_account_id}/events` with a bearer token; test mode
//! adds `?test=true`.

use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use capi_core::config::{PinterestConfig, ProductDefaults};
use capi_core::identity::{self, unix_now};
use capi_core::types::DEFAULT_CURRENCY;
use capi_core::{BrowserContext, CapiResult, Delivery, EventData, HttpRequest, Platform, Transport};

use super::{event_id_for, ConversionAdaptor};
use crate::client::ConversionsClient;

const PII_KEYS: [&str; 2] = ["email", "phone"];

/// Pinterest event names. Anything else is sent as `custom` with its name
/// in `custom_data.custom_event_name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PinterestEvent {
    Checkout,
    AddToCart,
    PageVisit,
    Lead,
    Custom(String),
}

impl PinterestEvent {
    /// Name sent in `event_name`.
    pub fn wire_name(&self) -> &'static str {
        match self {
            PinterestEvent::Checkout => "checkout",
            PinterestEvent::AddToCart => "add_to_cart",
            PinterestEvent::PageVisit => "page_visit",
            PinterestEvent::Lead => "lead",
            PinterestEvent::Custom(_) => "custom",
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            PinterestEvent::Custom(name) => name,
            other => other.wire_name(),
        }
    }
}

impl From<&str> for PinterestEvent {
    fn from(name: &str) -> Self {
        match name {
            "checkout" => PinterestEvent::Checkout,
            "add_to_cart" => PinterestEvent::AddToCart,
            "page_visit" => PinterestEvent::PageVisit,
            "lead" => PinterestEvent::Lead,
            other => PinterestEvent::Custom(other.to_string()),
        }
    }
}

/// Page categories recognised from the URL path for automatic page visits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    Checkout,
    Product,
    Landing,
}

impl PageKind {
    pub fn from_path(path: &str) -> Self {
        let path = path.to_ascii_lowercase();
        if path.contains("checkout") {
            PageKind::Checkout
        } else if path.contains("produto") || path.contains("product") {
            PageKind::Product
        } else {
            PageKind::Landing
        }
    }

    /// Page-visit fields for this kind of page.
    pub fn page_data(&self, product: &ProductDefaults) -> EventData {
        let (prefix, category) = match self {
            PageKind::Checkout => ("Checkout", "checkout"),
            PageKind::Product => ("Product", "product"),
            PageKind::Landing => ("Landing", "quiz"),
        };
        let name = if product.content_name.is_empty() {
            prefix.to_string()
        } else {
            format!("{prefix} - {}", product.content_name)
        };
        EventData::new()
            .with("content_name", name)
            .with("content_category", category)
    }
}

pub struct PinterestAdaptor {
    config: PinterestConfig,
}

impl PinterestAdaptor {
    pub fn new(config: PinterestConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PinterestConfig {
        &self.config
    }

    fn user_data(context: &BrowserContext, data: &EventData) -> Value {
        let mut user = json!({
            "client_ip_address": "",
            "client_user_agent": context.user_agent,
        });
        if let Some(em) = data.text("email").and_then(identity::hash_email) {
            user["em"] = json!([em]);
        }
        if let Some(ph) = data.text("phone").and_then(identity::hash_phone) {
            user["ph"] = json!([ph]);
        }
        user
    }

    /// Product-level fields shared by checkout and add-to-cart.
    fn commerce_data(&self, data: &EventData) -> Map<String, Value> {
        let product = &self.config.default_product;
        let content_ids = if product.content_id.is_empty() {
            json!([])
        } else {
            json!([product.content_id])
        };
        let fields = json!({
            "currency": data.value_or("currency", DEFAULT_CURRENCY),
            "value": data.value_or("value", product.price.as_str()),
            "content_ids": data.value_or("content_ids", content_ids),
            "content_name": data.value_or("content_name", product.content_name.as_str()),
            "content_category": data.value_or("content_category", product.content_category.as_str()),
            "content_brand": data.value_or("content_brand", product.content_brand.as_str()),
            "contents": data.value_or(
                "contents",
                json!([{ "item_price": product.price, "quantity": 1 }]),
            ),
            "num_items": data.value_or("num_items", 1),
        });
        match fields {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn custom_data(&self, event: &PinterestEvent, data: &EventData, event_id: &str) -> Value {
        let product = &self.config.default_product;
        match event {
            PinterestEvent::Checkout => {
                let mut fields = self.commerce_data(data);
                fields.insert("order_id".to_string(), data.value_or("order_id", event_id));
                Value::Object(fields)
            }
            PinterestEvent::AddToCart => Value::Object(self.commerce_data(data)),
            PinterestEvent::PageVisit => json!({
                "content_name": data.value_or("content_name", product.content_name.as_str()),
                "content_category": data.value_or("content_category", product.content_category.as_str()),
                "content_brand": product.content_brand,
            }),
            PinterestEvent::Lead => json!({
                "lead_type": data.value_or("lead_type", "quiz_completion"),
                "value": data.value_or("value", "0"),
                "currency": data.value_or("currency", DEFAULT_CURRENCY),
            }),
            PinterestEvent::Custom(name) => {
                let mut fields = Map::new();
                fields.insert("custom_event_name".to_string(), json!(name));
                for (key, value) in data.as_map() {
                    if key != "event_id" && !PII_KEYS.contains(&key.as_str()) {
                        fields.insert(key.clone(), value.clone());
                    }
                }
                Value::Object(fields)
            }
        }
    }
}

impl ConversionAdaptor for PinterestAdaptor {
    fn platform(&self) -> Platform {
        Platform::Pinterest
    }

    fn test_mode(&self) -> bool {
        self.config.test_mode
    }

    fn format(&self, event_name: &str, data: &EventData, context: &BrowserContext) -> Value {
        let event = PinterestEvent::from(event_name);
        let event_id = event_id_for(data);

        let mut formatted = json!({
            "event_name": event.wire_name(),
            "action_source": "web",
            "event_time": unix_now(),
            "event_id": event_id,
            "event_source_url": context.page_url,
            "opt_out": false,
            "user_data": Self::user_data(context, data),
            "custom_data": self.custom_data(&event, data, &event_id),
        });
        if !self.config.partner_name.is_empty() {
            formatted["partner_name"] = json!(self.config.partner_name);
        }

        debug!(
            event_name = event.as_str(),
            ad_account_id = %self.config.ad_account_id,
            "Pinterest event formatted"
        );
        formatted
    }

    fn build_request(&self, events: Vec<Value>, test: bool) -> HttpRequest {
        let url = format!(
            "{}/{}/events",
            self.config.api_base_url.trim_end_matches('/'),
            self.config.ad_account_id
        );
        let mut request =
            HttpRequest::post(url, json!({ "data": events })).bearer(&self.config.access_token);
        if test {
            request = request.query("test", "true");
        }
        request
    }

    fn validate_config(&self) -> CapiResult<()> {
        self.config.validate()
    }
}

pub type PinterestClient<T = capi_core::HttpTransport> = ConversionsClient<PinterestAdaptor, T>;

impl<T: Transport> ConversionsClient<PinterestAdaptor, T> {
    pub async fn track_event(&self, event: PinterestEvent, data: &EventData) -> Delivery {
        match &event {
            PinterestEvent::Custom(_) => self.track(event.as_str(), data).await,
            _ => self.track(event.wire_name(), data).await,
        }
    }

    /// Checkout; `email` / `phone` in the bag are hashed into `user_data`.
    pub async fn track_checkout(&self, order: &EventData) -> Delivery {
        self.track_event(PinterestEvent::Checkout, order).await
    }

    pub async fn track_add_to_cart(&self, product: &EventData) -> Delivery {
        self.track_event(PinterestEvent::AddToCart, product).await
    }

    pub async fn track_page_visit(&self, page: &EventData) -> Delivery {
        self.track_event(PinterestEvent::PageVisit, page).await
    }

    pub async fn track_lead(&self, lead: &EventData) -> Delivery {
        self.track_event(PinterestEvent::Lead, lead).await
    }

    pub async fn track_custom(&self, event_name: &str, data: &EventData) -> Delivery {
        self.track_event(PinterestEvent::Custom(event_name.to_string()), data)
            .await
    }

    /// Page visit derived from the current page path. Pages not served over
    /// http(s) are skipped and yield `None`.
    pub async fn track_current_page(&self) -> Option<Delivery> {
        if !self.context().is_http() {
            warn!(
                page_url = %self.context().page_url,
                "skipping automatic Pinterest page visit outside http(s)"
            );
            return None;
        }
        let kind = PageKind::from_path(&self.context().path());
        let data = kind.page_data(&self.adaptor().config().default_product);
        Some(self.track_page_visit(&data).await)
    }
}
