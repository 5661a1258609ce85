//! Adaptors translating conversion events into each platform's Conversions
//! API payload.
//!
//! Each adaptor implements [`ConversionAdaptor`] to turn an event name plus an
//! [`EventData`] bag into the JSON event object its platform expects, and to
//! wrap formatted events into the request for that platform's endpoint.

pub mod facebook;
pub mod pinterest;
pub mod tiktok;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use capi_core::{BrowserContext, CapiResult, EventData, HttpRequest, Platform};

/// One entry of a batch send. Everything besides the name lives in `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchEvent {
    pub event_name: String,
    #[serde(flatten)]
    pub data: EventData,
}

impl BatchEvent {
    pub fn new(event_name: impl Into<String>, data: EventData) -> Self {
        Self {
            event_name: event_name.into(),
            data,
        }
    }
}

/// Adaptor trait: formats events into a platform-specific JSON payload.
pub trait ConversionAdaptor: Send + Sync + 'static {
    fn platform(&self) -> Platform;

    /// Whether the configuration routes every send to the test channel.
    fn test_mode(&self) -> bool;

    /// Format a single event. Every mandatory vendor field is present even
    /// when `data` is empty.
    fn format(&self, event_name: &str, data: &EventData, context: &BrowserContext) -> Value;

    /// Format one batch entry. Defaults to the single-event path.
    fn format_batch_entry(&self, entry: &BatchEvent, context: &BrowserContext) -> Value {
        self.format(&entry.event_name, &entry.data, context)
    }

    /// Format an event for the validation channel. Defaults to the
    /// single-event path.
    fn format_validation(&self, event_name: &str, data: &EventData, context: &BrowserContext) -> Value {
        self.format(event_name, data, context)
    }

    /// Wrap formatted events into the request for the ingestion endpoint.
    /// `test` routes the events to the vendor's test channel.
    fn build_request(&self, events: Vec<Value>, test: bool) -> HttpRequest;

    /// Validate that the adaptor configuration is usable.
    fn validate_config(&self) -> CapiResult<()>;
}

/// Event identifier: the caller's `event_id` when present, else a fresh one.
/// Non-string ids such as order numbers are sent in their JSON text form.
pub(crate) fn event_id_for(data: &EventData) -> String {
    match data.get("event_id") {
        Some(Value::String(id)) => id.clone(),
        Some(other) => other.to_string(),
        None => capi_core::identity::generate_event_id(),
    }
}
