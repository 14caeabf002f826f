//! Credentials consumed by the bearer policy.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use tracing::debug;

use crate::Result;
use crate::error::{BoxError, Error};
use crate::util::lock_unpoisoned;

/// Source of `Authorization` header values.
///
/// May perform network I/O, such as a call to a token endpoint, and should
/// be treated as slow.
#[async_trait]
pub trait Credential: Send + Sync {
    /// Header value valid for a request to `resource_url`.
    ///
    /// Failures surface as [`Error::Auth`].
    async fn auth_header_value(&self, resource_url: &str) -> Result<String>;
}

/// A fixed header value.
#[derive(Clone)]
pub struct StaticCredential {
    value: String,
}

impl StaticCredential {
    /// Uses `value` as the whole header value.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    pub fn bearer(token: impl AsRef<str>) -> Self {
        Self::new(format!("Bearer {}", token.as_ref()))
    }
}

impl std::fmt::Debug for StaticCredential {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("StaticCredential")
            .field("value", &crate::util::REDACTED)
            .finish()
    }
}

#[async_trait]
impl Credential for StaticCredential {
    async fn auth_header_value(&self, _resource_url: &str) -> Result<String> {
        Ok(self.value.clone())
    }
}

/// HTTP basic authentication.
#[derive(Clone)]
pub struct BasicCredential {
    header_value: String,
}

impl BasicCredential {
    pub fn new(username: &str, password: &str) -> Self {
        let encoded = STANDARD.encode(format!("{username}:{password}"));
        Self {
            header_value: format!("Basic {encoded}"),
        }
    }
}

impl std::fmt::Debug for BasicCredential {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("BasicCredential")
            .field("header_value", &crate::util::REDACTED)
            .finish()
    }
}

#[async_trait]
impl Credential for BasicCredential {
    async fn auth_header_value(&self, _resource_url: &str) -> Result<String> {
        Ok(self.header_value.clone())
    }
}

/// A bearer token and the moment it stops being valid.
#[derive(Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: SystemTime,
}

impl AccessToken {
    pub fn new(token: impl Into<String>, expires_at: SystemTime) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    fn is_fresh(&self, now: SystemTime, refresh_margin: Duration) -> bool {
        now.checked_add(refresh_margin)
            .is_some_and(|refresh_at| refresh_at < self.expires_at)
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("AccessToken")
            .field("token", &crate::util::REDACTED)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Fetches tokens for a resource, e.g. from an OAuth token endpoint.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// `resource` is the origin (`scheme://host[:port]`) of the request.
    async fn fetch_token(&self, resource: &str) -> std::result::Result<AccessToken, BoxError>;
}

/// Bearer credential caching tokens per resource origin.
///
/// Cached tokens are reused until `refresh_margin` before they expire.
/// Concurrent callers missing the cache wait for a single refresh instead
/// of each calling the token source.
pub struct CachedTokenCredential {
    source: Arc<dyn TokenSource>,
    refresh_margin: Duration,
    tokens: Mutex<HashMap<String, AccessToken>>,
    refresh: tokio::sync::Mutex<()>,
}

impl CachedTokenCredential {
    pub fn new(source: Arc<dyn TokenSource>) -> Self {
        Self {
            source,
            refresh_margin: Duration::from_secs(300),
            tokens: Mutex::new(HashMap::new()),
            refresh: tokio::sync::Mutex::new(()),
        }
    }

    pub fn refresh_margin(mut self, refresh_margin: Duration) -> Self {
        self.refresh_margin = refresh_margin;
        self
    }

    fn cached(&self, resource: &str) -> Option<String> {
        let now = SystemTime::now();
        lock_unpoisoned(&self.tokens)
            .get(resource)
            .filter(|token| token.is_fresh(now, self.refresh_margin))
            .map(|token| token.token.clone())
    }

    /// Drops every cached token.
    pub fn clear(&self) {
        lock_unpoisoned(&self.tokens).clear();
    }
}

impl std::fmt::Debug for CachedTokenCredential {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("CachedTokenCredential")
            .field("refresh_margin", &self.refresh_margin)
            .field("cached_resources", &lock_unpoisoned(&self.tokens).len())
            .finish_non_exhaustive()
    }
}

fn resource_origin(resource_url: &str) -> Result<String> {
    let parsed = url::Url::parse(resource_url)
        .map_err(|source| Error::malformed_url(resource_url, source.to_string()))?;
    Ok(parsed.origin().ascii_serialization())
}

#[async_trait]
impl Credential for CachedTokenCredential {
    async fn auth_header_value(&self, resource_url: &str) -> Result<String> {
        let resource = resource_origin(resource_url)?;
        if let Some(token) = self.cached(&resource) {
            return Ok(format!("Bearer {token}"));
        }

        let _refresh = self.refresh.lock().await;
        if let Some(token) = self.cached(&resource) {
            return Ok(format!("Bearer {token}"));
        }

        debug!(resource = %resource, "fetching access token");
        let token = self
            .source
            .fetch_token(&resource)
            .await
            .map_err(|source| Error::auth(resource_url, source))?;
        let header_value = format!("Bearer {}", token.token);
        lock_unpoisoned(&self.tokens).insert(resource, token);
        Ok(header_value)
    }
}
