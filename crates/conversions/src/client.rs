//! Vendor-agnostic conversions client: formats through an adaptor, sends
//! through a transport, logs the outcome and hands it back as a [`Delivery`].

use std::sync::Arc;

use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use capi_core::{
    BrowserContext, Delivery, EventData, HttpRequest, HttpTransport, Platform, Transport,
    TransportError,
};

use crate::adaptors::{BatchEvent, ConversionAdaptor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Operation {
    Event,
    Batch,
    Validation,
    Stats,
}

impl Operation {
    fn as_str(&self) -> &'static str {
        match self {
            Operation::Event => "event",
            Operation::Batch => "batch",
            Operation::Validation => "validation",
            Operation::Stats => "stats",
        }
    }
}

/// Capability object for one platform. Cheap to clone; clones share the
/// adaptor, transport and page context.
pub struct ConversionsClient<A, T = HttpTransport> {
    adaptor: Arc<A>,
    transport: Arc<T>,
    context: Arc<BrowserContext>,
}

impl<A, T> Clone for ConversionsClient<A, T> {
    fn clone(&self) -> Self {
        Self {
            adaptor: Arc::clone(&self.adaptor),
            transport: Arc::clone(&self.transport),
            context: Arc::clone(&self.context),
        }
    }
}

impl<A: ConversionAdaptor, T: Transport> ConversionsClient<A, T> {
    pub fn new(adaptor: A, transport: Arc<T>, context: BrowserContext) -> Self {
        Self {
            adaptor: Arc::new(adaptor),
            transport,
            context: Arc::new(context),
        }
    }

    pub fn platform(&self) -> Platform {
        self.adaptor.platform()
    }

    pub fn adaptor(&self) -> &A {
        &self.adaptor
    }

    pub fn context(&self) -> &BrowserContext {
        &self.context
    }

    /// Same adaptor and transport, different page.
    pub fn with_context(&self, context: BrowserContext) -> Self {
        Self {
            adaptor: Arc::clone(&self.adaptor),
            transport: Arc::clone(&self.transport),
            context: Arc::new(context),
        }
    }

    /// Format an event without sending it.
    pub fn format(&self, event_name: &str, data: &EventData) -> Value {
        self.adaptor.format(event_name, data, &self.context)
    }

    /// Send a single event.
    pub async fn track(&self, event_name: &str, data: &EventData) -> Delivery {
        if event_name.trim().is_empty() {
            return self.refuse(Operation::Event, "event name must not be empty");
        }
        let event = self.adaptor.format(event_name, data, &self.context);
        let request = self.adaptor.build_request(vec![event], self.adaptor.test_mode());
        self.deliver(request, Operation::Event, event_name, 1).await
    }

    /// Send pre-described events in one request, preserving input order.
    /// The vendor reports on the batch as a whole.
    pub async fn send_batch(&self, events: &[BatchEvent]) -> Delivery {
        if events.is_empty() {
            return self.refuse(Operation::Batch, "batch must contain at least one event");
        }
        if events.iter().any(|e| e.event_name.trim().is_empty()) {
            return self.refuse(Operation::Batch, "every batch entry needs an event name");
        }
        let formatted: Vec<Value> = events
            .iter()
            .map(|entry| self.adaptor.format_batch_entry(entry, &self.context))
            .collect();
        let request = self.adaptor.build_request(formatted, self.adaptor.test_mode());
        self.deliver(request, Operation::Batch, "batch", events.len())
            .await
    }

    /// Send an event to the vendor's test channel regardless of test mode.
    pub async fn validate(&self, event_name: &str, data: &EventData) -> Delivery {
        if event_name.trim().is_empty() {
            return self.refuse(Operation::Validation, "event name must not be empty");
        }
        let event = self
            .adaptor
            .format_validation(event_name, data, &self.context);
        let request = self.adaptor.build_request(vec![event], true);
        self.deliver(request, Operation::Validation, event_name, 1)
            .await
    }

    /// Send on a background task. The caller may await the handle or drop
    /// it; the send completes and logs either way.
    pub fn dispatch(&self, event_name: impl Into<String>, data: EventData) -> JoinHandle<Delivery> {
        let client = self.clone();
        let event_name = event_name.into();
        tokio::spawn(async move { client.track(&event_name, &data).await })
    }

    pub fn dispatch_batch(&self, events: Vec<BatchEvent>) -> JoinHandle<Delivery> {
        let client = self.clone();
        tokio::spawn(async move { client.send_batch(&events).await })
    }

    pub(crate) async fn deliver(
        &self,
        request: HttpRequest,
        operation: Operation,
        label: &str,
        count: usize,
    ) -> Delivery {
        let platform = self.platform();
        match self.transport.execute(request).await {
            Ok(response) => {
                metrics::counter!("capi.events.sent", "platform" => platform.as_str())
                    .increment(count as u64);
                info!(
                    platform = %platform,
                    operation = operation.as_str(),
                    event_name = label,
                    count,
                    "conversion request accepted"
                );
                Delivery::Sent(response)
            }
            Err(err) => {
                metrics::counter!("capi.events.failed", "platform" => platform.as_str())
                    .increment(count as u64);
                error!(
                    platform = %platform,
                    operation = operation.as_str(),
                    event_name = label,
                    count,
                    status = ?err.status(),
                    error = %err,
                    "conversion request failed"
                );
                Delivery::Failed(err)
            }
        }
    }

    fn refuse(&self, operation: Operation, reason: &str) -> Delivery {
        warn!(
            platform = %self.platform(),
            operation = operation.as_str(),
            reason,
            "conversion request refused"
        );
        Delivery::Failed(TransportError::InvalidRequest(reason.to_string()))
    }
}
