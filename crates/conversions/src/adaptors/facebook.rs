//! Facebook Conversions API adaptor. Events are posted to
//! `{api_base_url}/{pixel_id}/events` with a bearer token.

use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use capi_core::config::FacebookConfig;
use capi_core::identity::{self, unix_now};
use capi_core::types::DEFAULT_CURRENCY;
use capi_core::{BrowserContext, CapiResult, Delivery, EventData, HttpRequest, Platform, Transport};

use super::{event_id_for, BatchEvent, ConversionAdaptor};
use crate::client::ConversionsClient;

/// Keys of the data bag that carry plaintext PII and never reach `custom_data`.
const PII_KEYS: [&str; 8] = [
    "email",
    "phone",
    "first_name",
    "last_name",
    "city",
    "state",
    "zip",
    "external_id",
];

/// Standard Facebook event names, with free-form custom events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FacebookEvent {
    PageView,
    ViewContent,
    AddToCart,
    InitiateCheckout,
    Purchase,
    Lead,
    Custom(String),
}

impl FacebookEvent {
    pub fn as_str(&self) -> &str {
        match self {
            FacebookEvent::PageView => "PageView",
            FacebookEvent::ViewContent => "ViewContent",
            FacebookEvent::AddToCart => "AddToCart",
            FacebookEvent::InitiateCheckout => "InitiateCheckout",
            FacebookEvent::Purchase => "Purchase",
            FacebookEvent::Lead => "Lead",
            FacebookEvent::Custom(name) => name,
        }
    }
}

impl From<&str> for FacebookEvent {
    fn from(name: &str) -> Self {
        match name {
            "PageView" => FacebookEvent::PageView,
            "ViewContent" => FacebookEvent::ViewContent,
            "AddToCart" => FacebookEvent::AddToCart,
            "InitiateCheckout" => FacebookEvent::InitiateCheckout,
            "Purchase" => FacebookEvent::Purchase,
            "Lead" => FacebookEvent::Lead,
            other => FacebookEvent::Custom(other.to_string()),
        }
    }
}

/// `user_data` block. Unknown identifiers are `""`, never absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FacebookUserData {
    pub client_ip_address: String,
    pub client_user_agent: String,
    pub fbc: String,
    pub fbp: String,
    pub em: String,
    pub ph: String,
    #[serde(rename = "fn")]
    pub first_name: String,
    pub ln: String,
    pub ct: String,
    pub st: String,
    pub zp: String,
    pub country: String,
    pub external_id: String,
}

impl FacebookUserData {
    /// Identifiers available from the page: user agent plus the `_fbc` click
    /// id and `_fbp` browser id cookies. The IP is filled in by the server.
    pub fn collect(context: &BrowserContext, country: &str) -> Self {
        Self {
            client_user_agent: context.user_agent.clone(),
            fbc: context.cookie("_fbc"),
            fbp: context.cookie("_fbp"),
            country: country.to_string(),
            ..Default::default()
        }
    }

    /// Hash whatever PII the data bag carries into the matching fields.
    pub fn apply_pii(&mut self, data: &EventData) {
        let text = |key: &str| data.text(key).unwrap_or_default();
        if let Some(em) = identity::hash_email(text("email")) {
            self.em = em;
        }
        if let Some(ph) = identity::hash_phone(text("phone")) {
            self.ph = ph;
        }
        for (key, slot) in [
            ("first_name", &mut self.first_name),
            ("last_name", &mut self.ln),
            ("city", &mut self.ct),
            ("state", &mut self.st),
            ("zip", &mut self.zp),
        ] {
            if let Some(hashed) = identity::hash_text(text(key)) {
                *slot = hashed;
            }
        }
        if let Some(external_id) = data.text("external_id") {
            self.external_id = external_id.to_string();
        }
    }
}

pub struct FacebookAdaptor {
    config: FacebookConfig,
}

impl FacebookAdaptor {
    pub fn new(config: FacebookConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FacebookConfig {
        &self.config
    }

    fn user_data(&self, context: &BrowserContext, data: Option<&EventData>) -> Value {
        let mut user = FacebookUserData::collect(context, &self.config.country);
        if let Some(data) = data {
            user.apply_pii(data);
        }
        serde_json::to_value(user).unwrap_or_else(|_| json!({}))
    }

    fn envelope(
        &self,
        event_name: &str,
        event_id: String,
        context: &BrowserContext,
        user_data: Value,
        custom_data: Value,
    ) -> Value {
        json!({
            "event_name": event_name,
            "event_time": unix_now(),
            "event_id": event_id,
            "event_source_url": context.page_url,
            "action_source": "website",
            "user_data": user_data,
            "custom_data": custom_data,
        })
    }
}

impl ConversionAdaptor for FacebookAdaptor {
    fn platform(&self) -> Platform {
        Platform::Facebook
    }

    fn test_mode(&self) -> bool {
        self.config.test_mode
    }

    fn format(&self, event_name: &str, data: &EventData, context: &BrowserContext) -> Value {
        let custom_data = json!({
            "content_name": data.value_or("content_name", ""),
            "content_category": data.value_or("content_category", ""),
            "content_brand": data.value_or("content_brand", ""),
            "content_ids": data.value_or("content_ids", json!([])),
            "value": data.value_or("value", 0),
            "currency": data.value_or("currency", DEFAULT_CURRENCY),
            "order_id": data.value_or("order_id", ""),
            "num_items": data.value_or("num_items", 1),
        });

        debug!(event_name, pixel_id = %self.config.pixel_id, "Facebook event formatted");

        self.envelope(
            event_name,
            event_id_for(data),
            context,
            self.user_data(context, Some(data)),
            custom_data,
        )
    }

    /// Batch entries carry their own `custom_data` object verbatim.
    fn format_batch_entry(&self, entry: &BatchEvent, context: &BrowserContext) -> Value {
        let custom_data = entry.data.value_or("custom_data", json!({}));
        self.envelope(
            &entry.event_name,
            event_id_for(&entry.data),
            context,
            self.user_data(context, None),
            custom_data,
        )
    }

    /// Validation sends the data bag itself as `custom_data` under a fresh id.
    fn format_validation(&self, event_name: &str, data: &EventData, context: &BrowserContext) -> Value {
        let custom_data: serde_json::Map<String, Value> = data
            .as_map()
            .iter()
            .filter(|(k, _)| !PII_KEYS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        self.envelope(
            event_name,
            identity::generate_event_id(),
            context,
            self.user_data(context, Some(data)),
            Value::Object(custom_data),
        )
    }

    fn build_request(&self, events: Vec<Value>, test: bool) -> HttpRequest {
        let mut body = json!({ "data": events });
        if test {
            body["test_event_code"] = json!(self.config.test_event_code);
        }
        let url = format!(
            "{}/{}/events",
            self.config.api_base_url.trim_end_matches('/'),
            self.config.pixel_id
        );
        HttpRequest::post(url, body).bearer(&self.config.access_token)
    }

    fn validate_config(&self) -> CapiResult<()> {
        self.config.validate()
    }
}

pub type FacebookClient<T = capi_core::HttpTransport> = ConversionsClient<FacebookAdaptor, T>;

impl<T: Transport> ConversionsClient<FacebookAdaptor, T> {
    pub async fn track_event(&self, event: FacebookEvent, data: &EventData) -> Delivery {
        self.track(event.as_str(), data).await
    }

    pub async fn track_page_view(&self, data: &EventData) -> Delivery {
        self.track_event(FacebookEvent::PageView, data).await
    }

    pub async fn track_view_content(&self, data: &EventData) -> Delivery {
        self.track_event(FacebookEvent::ViewContent, data).await
    }

    pub async fn track_add_to_cart(&self, data: &EventData) -> Delivery {
        self.track_event(FacebookEvent::AddToCart, data).await
    }

    pub async fn track_initiate_checkout(&self, data: &EventData) -> Delivery {
        self.track_event(FacebookEvent::InitiateCheckout, data).await
    }

    pub async fn track_purchase(&self, data: &EventData) -> Delivery {
        self.track_event(FacebookEvent::Purchase, data).await
    }

    pub async fn track_lead(&self, data: &EventData) -> Delivery {
        self.track_event(FacebookEvent::Lead, data).await
    }

    pub async fn track_custom(&self, event_name: &str, data: &EventData) -> Delivery {
        self.track_event(FacebookEvent::Custom(event_name.to_string()), data)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capi_core::{HttpMethod, MemoryTransport, TransportError};
    use std::sync::Arc;

    fn test_config() -> FacebookConfig {
        FacebookConfig {
            access_token: "fb-token".into(),
            pixel_id: "1085353383617030".into(),
            ..Default::default()
        }
    }

    fn test_context() -> BrowserContext {
        BrowserContext::new("https://shop.example.com/product/42")
            .with_referrer("https://google.com")
            .with_user_agent("Mozilla/5.0")
            .with_cookies("_fbp=fb.1.1700000000.111; _fbc=fb.1.1700000000.AbC")
    }

    fn test_client(transport: Arc<MemoryTransport>) -> FacebookClient<MemoryTransport> {
        ConversionsClient::new(FacebookAdaptor::new(test_config()), transport, test_context())
    }

    #[test]
    fn test_empty_bag_has_mandatory_fields() {
        let adaptor = FacebookAdaptor::new(test_config());
        for name in [
            "PageView",
            "ViewContent",
            "AddToCart",
            "InitiateCheckout",
            "Purchase",
            "Lead",
            "QuizCompleted",
        ] {
            let event = adaptor.format(name, &EventData::new(), &test_context());
            assert_eq!(event["event_name"], name);
            assert_eq!(event["action_source"], "website");
            assert_eq!(event["event_source_url"], "https://shop.example.com/product/42");
            assert!(event["event_time"].as_i64().unwrap() <= unix_now());
            assert!(event["event_id"].as_str().unwrap().starts_with("event_"));

            let custom = &event["custom_data"];
            assert_eq!(custom["content_name"], "");
            assert_eq!(custom["content_category"], "");
            assert_eq!(custom["content_brand"], "");
            assert_eq!(custom["content_ids"], json!([]));
            assert_eq!(custom["value"], 0);
            assert_eq!(custom["currency"], "BRL");
            assert_eq!(custom["order_id"], "");
            assert_eq!(custom["num_items"], 1);
        }
    }

    #[test]
    fn test_user_data_from_context() {
        let adaptor = FacebookAdaptor::new(test_config());
        let event = adaptor.format("PageView", &EventData::new(), &test_context());
        let user = &event["user_data"];
        assert_eq!(user["client_ip_address"], "");
        assert_eq!(user["client_user_agent"], "Mozilla/5.0");
        assert_eq!(user["fbp"], "fb.1.1700000000.111");
        assert_eq!(user["fbc"], "fb.1.1700000000.AbC");
        assert_eq!(user["em"], "");
        assert_eq!(user["fn"], "");
        assert_eq!(user["country"], "BR");
    }

    #[test]
    fn test_pii_is_hashed() {
        let adaptor = FacebookAdaptor::new(test_config());
        let data = EventData::new()
            .with("email", "Buyer@Example.COM")
            .with("phone", "+55 (11) 98765-4321")
            .with("first_name", " Ana ")
            .with("external_id", "cust-9");
        let event = adaptor.format("Purchase", &data, &test_context());
        let user = &event["user_data"];
        assert_eq!(user["em"], identity::sha256_hex("buyer@example.com"));
        assert_eq!(user["ph"], identity::sha256_hex("5511987654321"));
        assert_eq!(user["fn"], identity::sha256_hex("ana"));
        assert_eq!(user["external_id"], "cust-9");
    }

    #[test]
    fn test_supplied_values_pass_through() {
        let adaptor = FacebookAdaptor::new(test_config());
        let data = EventData::new()
            .with("event_id", "order-77")
            .with("value", 149.9)
            .with("currency", "USD")
            .with("content_ids", json!(["sku-1", "sku-2"]))
            .with("num_items", 2);
        let event = adaptor.format("Purchase", &data, &test_context());
        assert_eq!(event["event_id"], "order-77");
        assert_eq!(event["custom_data"]["value"], 149.9);
        assert_eq!(event["custom_data"]["currency"], "USD");
        assert_eq!(event["custom_data"]["content_ids"], json!(["sku-1", "sku-2"]));
        assert_eq!(event["custom_data"]["num_items"], 2);
    }

    #[test]
    fn test_event_taxonomy() {
        assert_eq!(FacebookEvent::from("Purchase"), FacebookEvent::Purchase);
        assert_eq!(
            FacebookEvent::from("QuizCompleted"),
            FacebookEvent::Custom("QuizCompleted".into())
        );
        assert_eq!(FacebookEvent::Custom("X".into()).as_str(), "X");
    }

    #[tokio::test]
    async fn test_track_request_shape() {
        let transport = Arc::new(MemoryTransport::new());
        let client = test_client(transport.clone());

        let delivery = client.track_purchase(&EventData::new().with("value", 10)).await;
        assert!(delivery.is_sent());

        let request = transport.last_request().unwrap();
        assert_eq!(request.method, HttpMethod::Post);
        assert_eq!(
            request.url,
            "https://graph.facebook.com/v18.0/1085353383617030/events"
        );
        assert_eq!(request.header_value("Authorization"), Some("Bearer fb-token"));
        assert_eq!(request.header_value("Content-Type"), Some("application/json"));

        let body = request.body.unwrap();
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
        assert_eq!(body["data"][0]["event_name"], "Purchase");
        assert!(body.get("test_event_code").is_none());
    }

    #[tokio::test]
    async fn test_test_mode_adds_test_event_code() {
        let transport = Arc::new(MemoryTransport::new());
        let client = ConversionsClient::new(
            FacebookAdaptor::new(FacebookConfig {
                test_mode: true,
                ..test_config()
            }),
            transport.clone(),
            test_context(),
        );
        let _ = client.track_page_view(&EventData::new()).await;
        let body = transport.last_request().unwrap().body.unwrap();
        assert_eq!(body["test_event_code"], "TEST12345");
    }

    #[tokio::test]
    async fn test_batch_is_one_ordered_request() {
        let transport = Arc::new(MemoryTransport::new());
        let client = test_client(transport.clone());

        let events = vec![
            BatchEvent::new("PageView", EventData::new()),
            BatchEvent::new(
                "AddToCart",
                EventData::new()
                    .with("event_id", "cart-1")
                    .with("custom_data", json!({"value": 20, "currency": "BRL"})),
            ),
            BatchEvent::new("Purchase", EventData::new()),
        ];
        let delivery = client.send_batch(&events).await;
        assert!(delivery.is_sent());
        assert_eq!(transport.request_count(), 1);

        let body = transport.last_request().unwrap().body.unwrap();
        let data = body["data"].as_array().unwrap();
        assert_eq!(data.len(), 3);
        assert_eq!(data[0]["event_name"], "PageView");
        assert_eq!(data[1]["event_name"], "AddToCart");
        assert_eq!(data[2]["event_name"], "Purchase");
        assert_eq!(data[1]["event_id"], "cart-1");
        assert_eq!(data[1]["custom_data"], json!({"value": 20, "currency": "BRL"}));
        assert_eq!(data[0]["custom_data"], json!({}));
    }

    #[tokio::test]
    async fn test_validate_uses_test_code_and_raw_data() {
        let transport = Arc::new(MemoryTransport::new());
        let client = test_client(transport.clone());

        let data = EventData::new()
            .with("event_id", "ignored")
            .with("value", 5)
            .with("email", "a@b.com");
        let _ = client.validate("Lead", &data).await;

        let body = transport.last_request().unwrap().body.unwrap();
        assert_eq!(body["test_event_code"], "TEST12345");
        let event = &body["data"][0];
        assert_ne!(event["event_id"], "ignored");
        assert_eq!(event["custom_data"], json!({"event_id": "ignored", "value": 5}));
        assert_eq!(event["user_data"]["em"], identity::sha256_hex("a@b.com"));
    }

    #[tokio::test]
    async fn test_server_error_is_returned_not_raised() {
        let transport = Arc::new(MemoryTransport::failing(500, "internal error"));
        let client = test_client(transport.clone());

        let delivery = client.track_lead(&EventData::new()).await;
        assert_eq!(
            delivery,
            Delivery::Failed(TransportError::Status {
                status: 500,
                body: "internal error".into()
            })
        );
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_event_name_is_refused() {
        let transport = Arc::new(MemoryTransport::new());
        let client = test_client(transport.clone());
        let delivery = client.track_custom("  ", &EventData::new()).await;
        assert!(matches!(
            delivery,
            Delivery::Failed(TransportError::InvalidRequest(_))
        ));
        assert_eq!(transport.request_count(), 0);

        let batch = client.send_batch(&[]).await;
        assert!(!batch.is_sent());
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_dispatch_runs_in_background() {
        let transport = Arc::new(MemoryTransport::new());
        let client = test_client(transport.clone());

        let handles: Vec<_> = (0..5)
            .map(|i| client.dispatch("ViewContent", EventData::new().with("value", i + 1)))
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap().is_sent());
        }
        assert_eq!(transport.request_count(), 5);
    }

    #[test]
    fn test_validate_config() {
        assert!(FacebookAdaptor::new(test_config()).validate_config().is_ok());
        assert!(FacebookAdaptor::new(FacebookConfig::default())
            .validate_config()
            .is_err());
    }
}
