//! Conversion event delivery to advertising platforms' server-side APIs.
//!
//! # Modules
//!
//! - [`adaptors`]: platform adaptors (Facebook Conversions API, TikTok
//!   Events API, Pinterest Conversions API)
//! - [`client`]: generic client that formats, sends and logs through an adaptor
//! - [`suite`]: all three platform clients composed from one configuration

pub mod adaptors;
pub mod client;
pub mod suite;

pub use adaptors::facebook::{FacebookAdaptor, FacebookClient, FacebookEvent};
pub use adaptors::pinterest::{PageKind, PinterestAdaptor, PinterestClient, PinterestEvent};
pub use adaptors::tiktok::{TikTokAdaptor, TikTokClient, TikTokEvent};
pub use adaptors::{BatchEvent, ConversionAdaptor};
pub use client::ConversionsClient;
pub use suite::Integrations;
