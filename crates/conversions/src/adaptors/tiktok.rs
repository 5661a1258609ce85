//! TikTok Events API adaptor. Events are posted to the configured track
//! endpoint with an `Access-Token` header.

use serde_json::{json, Map, Value};
use tracing::debug;

use capi_core::config::TikTokConfig;
use capi_core::identity::{self, unix_now};
use capi_core::types::DEFAULT_CURRENCY;
use capi_core::{BrowserContext, CapiResult, Delivery, EventData, HttpRequest, Platform, Transport};

use super::{event_id_for, BatchEvent, ConversionAdaptor};
use crate::client::{ConversionsClient, Operation};

const ACCESS_TOKEN_HEADER: &str = "Access-Token";

/// Standard TikTok event names, with free-form custom events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TikTokEvent {
    ViewContent,
    AddToWishlist,
    Search,
    AddPaymentInfo,
    AddToCart,
    InitiateCheckout,
    PlaceAnOrder,
    CompleteRegistration,
    Purchase,
    Custom(String),
}

impl TikTokEvent {
    pub fn as_str(&self) -> &str {
        match self {
            TikTokEvent::ViewContent => "ViewContent",
            TikTokEvent::AddToWishlist => "AddToWishlist",
            TikTokEvent::Search => "Search",
            TikTokEvent::AddPaymentInfo => "AddPaymentInfo",
            TikTokEvent::AddToCart => "AddToCart",
            TikTokEvent::InitiateCheckout => "InitiateCheckout",
            TikTokEvent::PlaceAnOrder => "PlaceAnOrder",
            TikTokEvent::CompleteRegistration => "CompleteRegistration",
            TikTokEvent::Purchase => "Purchase",
            TikTokEvent::Custom(name) => name,
        }
    }
}

impl From<&str> for TikTokEvent {
    fn from(name: &str) -> Self {
        match name {
            "ViewContent" => TikTokEvent::ViewContent,
            "AddToWishlist" => TikTokEvent::AddToWishlist,
            "Search" => TikTokEvent::Search,
            "AddPaymentInfo" => TikTokEvent::AddPaymentInfo,
            "AddToCart" => TikTokEvent::AddToCart,
            "InitiateCheckout" => TikTokEvent::InitiateCheckout,
            "PlaceAnOrder" => TikTokEvent::PlaceAnOrder,
            "CompleteRegistration" => TikTokEvent::CompleteRegistration,
            "Purchase" => TikTokEvent::Purchase,
            other => TikTokEvent::Custom(other.to_string()),
        }
    }
}

/// Identifiers TikTok matches on. Unknown values are `""`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TikTokUserData {
    pub ip: String,
    pub user_agent: String,
    pub ttclid: String,
    pub ttp: String,
    pub email: String,
    pub phone: String,
    pub external_id: String,
}

impl TikTokUserData {
    /// User agent plus the `ttclid` click id and `ttp` cookies.
    pub fn collect(context: &BrowserContext) -> Self {
        Self {
            user_agent: context.user_agent.clone(),
            ttclid: context.cookie("ttclid"),
            ttp: context.cookie("ttp"),
            ..Default::default()
        }
    }

    pub fn apply_pii(&mut self, data: &EventData) {
        if let Some(email) = data.text("email").and_then(identity::hash_email) {
            self.email = email;
        }
        if let Some(phone) = data.text("phone").and_then(identity::hash_phone) {
            self.phone = phone;
        }
        if let Some(external_id) = data.text("external_id") {
            self.external_id = external_id.to_string();
        }
    }

    fn context_json(&self, context: &BrowserContext) -> Value {
        let mut user = json!({
            "user_agent": self.user_agent,
            "ip": self.ip,
            "external_id": self.external_id,
        });
        if !self.email.is_empty() {
            user["email"] = json!(self.email);
        }
        if !self.phone.is_empty() {
            user["phone"] = json!(self.phone);
        }
        json!({
            "page": {
                "url": context.page_url,
                "referrer": context.referrer,
            },
            "user": user,
            "ad": {
                "ttclid": self.ttclid,
                "ttp": self.ttp,
            },
        })
    }
}

pub struct TikTokAdaptor {
    config: TikTokConfig,
}

impl TikTokAdaptor {
    pub fn new(config: TikTokConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TikTokConfig {
        &self.config
    }

    /// `GET {stats_url}?pixel_code=...` for the configured pixel.
    pub fn stats_request(&self) -> HttpRequest {
        HttpRequest::get(&self.config.stats_url)
            .query("pixel_code", &self.config.pixel_id)
            .header(ACCESS_TOKEN_HEADER, &self.config.access_token)
    }

    fn event(
        &self,
        event_name: &str,
        event_id: &str,
        user: &TikTokUserData,
        context: &BrowserContext,
        properties: Value,
    ) -> Value {
        json!({
            "event": event_name,
            "event_id": event_id,
            "timestamp": unix_now().to_string(),
            "context": user.context_json(context),
            "properties": properties,
        })
    }

    fn base_properties(data: &EventData, event_id: &str) -> Value {
        json!({
            "value": data.value_or("value", 0),
            "currency": data.value_or("currency", DEFAULT_CURRENCY),
            "event_id": event_id,
        })
    }

    fn formatted(
        &self,
        event_name: &str,
        data: &EventData,
        context: &BrowserContext,
        event_id: String,
        with_search: bool,
    ) -> Value {
        let mut user = TikTokUserData::collect(context);
        user.apply_pii(data);

        let mut properties = Self::base_properties(data, &event_id);
        apply_content_fields(&mut properties, data);
        if with_search {
            if let Some(search) = data.get("search_string") {
                properties["search_string"] = search.clone();
            }
        }

        debug!(event_name, pixel_id = %self.config.pixel_id, "TikTok event formatted");
        self.event(event_name, &event_id, &user, context, properties)
    }
}

/// E-commerce content: a `contents` array wins; otherwise the older flat
/// `content_id` / `content_type` / `content_name` fields.
fn apply_content_fields(properties: &mut Value, data: &EventData) {
    if let Some(contents) = data.array("contents") {
        properties["contents"] = Value::Array(contents.clone());
    } else if let Some(content_id) = data.get("content_id") {
        properties["content_id"] = content_id.clone();
        properties["content_type"] = data.value_or("content_type", "");
        properties["content_name"] = data.value_or("content_name", "");
    }
}

impl ConversionAdaptor for TikTokAdaptor {
    fn platform(&self) -> Platform {
        Platform::TikTok
    }

    fn test_mode(&self) -> bool {
        self.config.test_mode
    }

    fn format(&self, event_name: &str, data: &EventData, context: &BrowserContext) -> Value {
        self.formatted(event_name, data, context, event_id_for(data), true)
    }

    /// Batch entries always get a fresh id; `additional_properties` is merged
    /// over the base properties. The content fallback is not applied here.
    fn format_batch_entry(&self, entry: &BatchEvent, context: &BrowserContext) -> Value {
        let event_id = identity::generate_event_id();
        let user = TikTokUserData::collect(context);

        let mut properties = Self::base_properties(&entry.data, &event_id);
        if let (Some(extra), Some(props)) = (
            entry.data.object("additional_properties"),
            properties.as_object_mut(),
        ) {
            for (key, value) in extra {
                props.insert(key.clone(), value.clone());
            }
        }

        self.event(&entry.event_name, &event_id, &user, context, properties)
    }

    fn format_validation(&self, event_name: &str, data: &EventData, context: &BrowserContext) -> Value {
        self.formatted(
            event_name,
            data,
            context,
            identity::generate_event_id(),
            false,
        )
    }

    fn build_request(&self, events: Vec<Value>, test: bool) -> HttpRequest {
        let mut body = Map::new();
        body.insert("data".to_string(), Value::Array(events));
        if !self.config.partner_name.is_empty() {
            body.insert("partner_name".to_string(), json!(self.config.partner_name));
        }
        if test {
            body.insert(
                "test_event_code".to_string(),
                json!(self.config.test_event_code),
            );
        }
        HttpRequest::post(&self.config.api_url, Value::Object(body))
            .header(ACCESS_TOKEN_HEADER, &self.config.access_token)
    }

    fn validate_config(&self) -> CapiResult<()> {
        self.config.validate()
    }
}

pub type TikTokClient<T = capi_core::HttpTransport> = ConversionsClient<TikTokAdaptor, T>;

impl<T: Transport> ConversionsClient<TikTokAdaptor, T> {
    pub async fn track_event(&self, event: TikTokEvent, data: &EventData) -> Delivery {
        self.track(event.as_str(), data).await
    }

    pub async fn track_view_content(&self, data: &EventData) -> Delivery {
        self.track_event(TikTokEvent::ViewContent, data).await
    }

    pub async fn track_add_to_wishlist(&self, data: &EventData) -> Delivery {
        self.track_event(TikTokEvent::AddToWishlist, data).await
    }

    pub async fn track_search(&self, data: &EventData) -> Delivery {
        self.track_event(TikTokEvent::Search, data).await
    }

    pub async fn track_add_payment_info(&self, data: &EventData) -> Delivery {
        self.track_event(TikTokEvent::AddPaymentInfo, data).await
    }

    pub async fn track_add_to_cart(&self, data: &EventData) -> Delivery {
        self.track_event(TikTokEvent::AddToCart, data).await
    }

    pub async fn track_initiate_checkout(&self, data: &EventData) -> Delivery {
        self.track_event(TikTokEvent::InitiateCheckout, data).await
    }

    pub async fn track_place_an_order(&self, data: &EventData) -> Delivery {
        self.track_event(TikTokEvent::PlaceAnOrder, data).await
    }

    pub async fn track_complete_registration(&self, data: &EventData) -> Delivery {
        self.track_event(TikTokEvent::CompleteRegistration, data)
            .await
    }

    pub async fn track_purchase(&self, data: &EventData) -> Delivery {
        self.track_event(TikTokEvent::Purchase, data).await
    }

    /// Aggregate event statistics for the configured pixel.
    pub async fn event_stats(&self) -> Delivery {
        let request = self.adaptor().stats_request();
        self.deliver(request, Operation::Stats, "stats", 0).await
    }
}
