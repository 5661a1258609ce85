pub mod config;
pub mod error;
pub mod identity;
pub mod transport;
pub mod types;

pub use config::AppConfig;
pub use error::{CapiError, CapiResult, TransportError};
pub use transport::{Delivery, HttpMethod, HttpRequest, HttpTransport, MemoryTransport, Transport};
pub use types::{BrowserContext, EventData, Platform};
