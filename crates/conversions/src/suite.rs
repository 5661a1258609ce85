//! Composition of the three platform clients built from one configuration.

use std::sync::Arc;

use tracing::info;

use capi_core::{AppConfig, BrowserContext, CapiError, CapiResult, HttpTransport, Platform, Transport};

use crate::adaptors::facebook::{FacebookAdaptor, FacebookClient};
use crate::adaptors::pinterest::{PinterestAdaptor, PinterestClient};
use crate::adaptors::tiktok::{TikTokAdaptor, TikTokClient};
use crate::adaptors::ConversionAdaptor;
use crate::client::ConversionsClient;

/// One capability object per platform, sharing a transport.
pub struct Integrations<T = HttpTransport> {
    pub facebook: FacebookClient<T>,
    pub tiktok: TikTokClient<T>,
    pub pinterest: PinterestClient<T>,
}

impl<T> Clone for Integrations<T> {
    fn clone(&self) -> Self {
        Self {
            facebook: self.facebook.clone(),
            tiktok: self.tiktok.clone(),
            pinterest: self.pinterest.clone(),
        }
    }
}

impl Integrations<HttpTransport> {
    /// Build all clients over a reqwest transport configured from `config.http`.
    pub fn from_config(config: &AppConfig, context: BrowserContext) -> CapiResult<Self> {
        let transport = Arc::new(HttpTransport::new(&config.http)?);
        Ok(Self::with_transport(config, transport, context))
    }
}

impl<T: Transport> Integrations<T> {
    pub fn with_transport(config: &AppConfig, transport: Arc<T>, context: BrowserContext) -> Self {
        let integrations = Self {
            facebook: ConversionsClient::new(
                FacebookAdaptor::new(config.facebook.clone()),
                Arc::clone(&transport),
                context.clone(),
            ),
            tiktok: ConversionsClient::new(
                TikTokAdaptor::new(config.tiktok.clone()),
                Arc::clone(&transport),
                context.clone(),
            ),
            pinterest: ConversionsClient::new(
                PinterestAdaptor::new(config.pinterest.clone()),
                transport,
                context,
            ),
        };
        info!(
            facebook_test_mode = config.facebook.test_mode,
            tiktok_test_mode = config.tiktok.test_mode,
            pinterest_test_mode = config.pinterest.test_mode,
            "conversion integrations initialized"
        );
        integrations
    }

    /// Same clients, different page.
    pub fn with_context(&self, context: BrowserContext) -> Self {
        Self {
            facebook: self.facebook.with_context(context.clone()),
            tiktok: self.tiktok.with_context(context.clone()),
            pinterest: self.pinterest.with_context(context),
        }
    }

    /// Configuration problems per platform; empty when every platform is usable.
    pub fn validate_config(&self) -> Vec<(Platform, CapiError)> {
        [
            (Platform::Facebook, self.facebook.adaptor().validate_config()),
            (Platform::TikTok, self.tiktok.adaptor().validate_config()),
            (Platform::Pinterest, self.pinterest.adaptor().validate_config()),
        ]
        .into_iter()
        .filter_map(|(platform, result)| result.err().map(|e| (platform, e)))
        .collect()
    }
}
