//! Storage boundary for forwarding endpoints.
//!
//! An endpoint maps a public short URL to the inbox that receives paid messages.
//! [`EndpointStore`] is the seam; [`MemoryStore`] keeps everything in a [`DashMap`] so
//! counters can be bumped from concurrent requests without a global lock.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use forward_x402_types::util::MoneyAmount;
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

/// A published forwarding endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmailEndpoint {
    pub id: String,
    /// Inbox the paid messages are delivered to. Never shown to payers.
    #[serde(skip_serializing)]
    pub email: String,
    pub label: String,
    pub short_url: String,
    pub base_price: MoneyAmount,
    pub is_active: bool,
    pub hit_count: u64,
    pub payment_count: u64,
    /// Unix seconds.
    pub created_at: u64,
}

/// Input for [`EndpointStore::create`].
#[derive(Debug, Clone)]
pub struct NewEndpoint {
    pub email: String,
    pub label: String,
    pub base_price: MoneyAmount,
    /// Requested short URL. A random one is generated when `None`.
    pub short_url: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Endpoint {0} not found")]
    NotFound(String),
    #[error("Short URL {0:?} is already taken")]
    DuplicateShortUrl(String),
    #[error("Invalid short URL {0:?}")]
    InvalidShortUrl(String),
    #[error("Invalid email address {0:?}")]
    InvalidEmail(String),
}

pub trait EndpointStore: Send + Sync {
    fn create(&self, endpoint: NewEndpoint) -> Result<EmailEndpoint, StoreError>;

    /// Looks up an active endpoint. Deactivated endpoints are invisible here.
    fn get_by_short_url(&self, short_url: &str) -> Option<EmailEndpoint>;

    fn record_hit(&self, id: &str) -> Result<(), StoreError>;

    fn record_payment(&self, id: &str) -> Result<(), StoreError>;

    fn set_active(&self, id: &str, active: bool) -> Result<(), StoreError>;

    /// All endpoints, oldest first.
    fn list(&self) -> Vec<EmailEndpoint>;
}

/// 8 random bytes, base64url without padding.
pub fn generate_short_url() -> String {
    URL_SAFE_NO_PAD.encode(rand::random::<[u8; 8]>())
}

fn generate_id() -> String {
    hex::encode(rand::random::<[u8; 16]>())
}

fn is_valid_short_url(short_url: &str) -> bool {
    !short_url.is_empty()
        && short_url
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    endpoints: DashMap<String, EmailEndpoint>,
    /// short URL -> endpoint id
    short_urls: DashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn update(&self, id: &str, f: impl FnOnce(&mut EmailEndpoint)) -> Result<(), StoreError> {
        let mut endpoint = self
            .endpoints
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        f(&mut endpoint);
        Ok(())
    }
}

impl EndpointStore for MemoryStore {
    fn create(&self, new: NewEndpoint) -> Result<EmailEndpoint, StoreError> {
        if !new.email.contains('@') {
            return Err(StoreError::InvalidEmail(new.email));
        }
        let short_url = new.short_url.unwrap_or_else(generate_short_url);
        if !is_valid_short_url(&short_url) {
            return Err(StoreError::InvalidShortUrl(short_url));
        }

        let id = generate_id();
        match self.short_urls.entry(short_url.clone()) {
            Entry::Occupied(_) => return Err(StoreError::DuplicateShortUrl(short_url)),
            Entry::Vacant(slot) => {
                slot.insert(id.clone());
            }
        }

        let endpoint = EmailEndpoint {
            id: id.clone(),
            email: new.email,
            label: new.label,
            short_url,
            base_price: new.base_price,
            is_active: true,
            hit_count: 0,
            payment_count: 0,
            created_at: now_unix(),
        };
        self.endpoints.insert(id, endpoint.clone());
        Ok(endpoint)
    }

    fn get_by_short_url(&self, short_url: &str) -> Option<EmailEndpoint> {
        let id = self.short_urls.get(short_url)?;
        let endpoint = self.endpoints.get(id.value())?;
        endpoint.is_active.then(|| endpoint.clone())
    }

    fn record_hit(&self, id: &str) -> Result<(), StoreError> {
        self.update(id, |endpoint| endpoint.hit_count += 1)
    }

    fn record_payment(&self, id: &str) -> Result<(), StoreError> {
        self.update(id, |endpoint| endpoint.payment_count += 1)
    }

    fn set_active(&self, id: &str, active: bool) -> Result<(), StoreError> {
        self.update(id, |endpoint| endpoint.is_active = active)
    }

    fn list(&self) -> Vec<EmailEndpoint> {
        let mut endpoints: Vec<EmailEndpoint> =
            self.endpoints.iter().map(|e| e.value().clone()).collect();
        endpoints.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        endpoints
    }
}
