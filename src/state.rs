//! Shared state of the HTTP handlers.

use forward_x402_axum::PaygateConfig;
use std::sync::Arc;

use crate::mailer::Mailer;
use crate::store::{EmailEndpoint, EndpointStore};

/// Settings resolved once from [`crate::config::Config`].
#[derive(Debug, Clone)]
pub struct ForwardSettings {
    /// Public origin used in links, without a trailing slash.
    pub server_url: String,
    /// Address receiving the payments.
    pub pay_to: String,
    pub max_timeout_seconds: u64,
    pub testnet: bool,
    pub paywall_html: Option<String>,
}

impl ForwardSettings {
    /// Gate options for a message sent through `endpoint`.
    pub fn paygate_config(&self, endpoint: &EmailEndpoint) -> PaygateConfig {
        PaygateConfig {
            description: format!("Send email to {}", endpoint.label),
            mime_type: "application/json".to_string(),
            max_timeout_seconds: self.max_timeout_seconds,
            testnet: self.testnet,
            custom_paywall_html: self.paywall_html.clone(),
            resource: Some(format!("/forward/{}", endpoint.short_url)),
            ..Default::default()
        }
    }

    /// Public link of `endpoint`.
    pub fn forward_url(&self, endpoint: &EmailEndpoint) -> String {
        format!("{}/forward/{}", self.server_url, endpoint.short_url)
    }
}

/// Everything a request needs, generic over the facilitator so tests can swap it out.
pub struct AppState<F> {
    pub facilitator: Arc<F>,
    pub store: Arc<dyn EndpointStore>,
    pub mailer: Arc<dyn Mailer>,
    pub settings: ForwardSettings,
}

impl<F> AppState<F> {
    pub fn new(
        facilitator: F,
        store: Arc<dyn EndpointStore>,
        mailer: Arc<dyn Mailer>,
        settings: ForwardSettings,
    ) -> Self {
        Self {
            facilitator: Arc::new(facilitator),
            store,
            mailer,
            settings,
        }
    }
}
