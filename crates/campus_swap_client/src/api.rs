//! REST client for the marketplace backend.
//!
//! [`ApiClient::request`] is the single HTTP entry point: it attaches the
//! bearer token read from the session at call time and maps responses to
//! `ClientError::{Api, Network}`. The endpoint methods below it only bind
//! parameters, decode the payload and keep the fetch cache coherent.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
pub use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::cache::FetchCache;
use crate::config::Config;
use crate::error::ClientError;
use crate::models::{
    AuthResponse, Credentials, Listing, ListingDraft, Profile, ProfileUpdate, Registration,
};
use crate::session::SessionStore;

const ITEMS_KEY: &str = "items";
const PROFILE_KEY: &str = "users/profile";

fn item_key(id: &str) -> String {
    format!("items/{}", id)
}

/// Pull a human-readable message out of an error body, if there is one.
fn error_message(status: u16, body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("message")
                .or_else(|| v.get("error"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| format!("API Error: {}", status))
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, ClientError> {
    serde_json::from_value(value).map_err(ClientError::from)
}

fn to_body<T: Serialize>(body: &T) -> Result<Value, ClientError> {
    serde_json::to_value(body).map_err(|e| ClientError::validation(e.to_string()))
}

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    session: Arc<SessionStore>,
    cache: FetchCache,
}

impl ApiClient {
    pub fn new(
        base_url: impl Into<String>,
        session: Arc<SessionStore>,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session,
            cache: FetchCache::new(),
        })
    }

    pub fn from_config(config: &Config, session: Arc<SessionStore>) -> Result<Self, ClientError> {
        Self::new(config.api_base_url(), session, config.request_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    /// Send one request. `path` starts with `/` and is relative to the base URL.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, ClientError> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(%method, %url, "api request");

        let mut builder = self
            .http
            .request(method.clone(), &url)
            .header(CONTENT_TYPE, "application/json");
        if let Some(token) = self.session.token() {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        if let Some(body) = body {
            builder = builder.body(body.to_string());
        }

        let response = builder.send().await.inspect_err(|e| {
            tracing::error!(%method, %url, error = %e, "api request failed");
        })?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let message = error_message(status.as_u16(), &text);
            tracing::warn!(%method, %url, status = status.as_u16(), %message, "api error");
            return Err(ClientError::Api {
                status: status.as_u16(),
                message,
            });
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(ClientError::from)
    }

    async fn cached_get(&self, key: &str) -> Result<Value, ClientError> {
        let path = format!("/{}", key);
        self.cache
            .get_or_fetch(key, || self.request(Method::GET, &path, None))
            .await
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    // ── auth ────────────────────────────────────────────────────────────

    pub async fn login(&self, credentials: &Credentials) -> Result<AuthResponse, ClientError> {
        let body = to_body(credentials)?;
        decode(self.request(Method::POST, "/auth/login", Some(&body)).await?)
    }

    pub async fn register(&self, registration: &Registration) -> Result<AuthResponse, ClientError> {
        let body = to_body(registration)?;
        decode(self.request(Method::POST, "/auth/register", Some(&body)).await?)
    }

    // ── items ───────────────────────────────────────────────────────────

    pub async fn list_items(&self) -> Result<Vec<Listing>, ClientError> {
        decode(self.cached_get(ITEMS_KEY).await?)
    }

    pub async fn refresh_items(&self) -> Result<Vec<Listing>, ClientError> {
        self.cache.invalidate(ITEMS_KEY);
        self.list_items().await
    }

    pub async fn get_item(&self, id: &str) -> Result<Listing, ClientError> {
        decode(self.cached_get(&item_key(id)).await?)
    }

    pub async fn refresh_item(&self, id: &str) -> Result<Listing, ClientError> {
        self.cache.invalidate(&item_key(id));
        self.get_item(id).await
    }

    pub async fn create_item(&self, draft: &ListingDraft) -> Result<Listing, ClientError> {
        let body = to_body(draft)?;
        let created = self.request(Method::POST, "/items", Some(&body)).await?;
        self.cache.invalidate(ITEMS_KEY);
        decode(created)
    }

    pub async fn update_item(&self, id: &str, draft: &ListingDraft) -> Result<Listing, ClientError> {
        let body = to_body(draft)?;
        let updated = self
            .request(Method::PUT, &format!("/items/{}", id), Some(&body))
            .await?;
        self.cache.invalidate(ITEMS_KEY);
        self.cache.invalidate(&item_key(id));
        decode(updated)
    }

    pub async fn delete_item(&self, id: &str) -> Result<(), ClientError> {
        self.request(Method::DELETE, &format!("/items/{}", id), None)
            .await?;
        self.cache.invalidate(ITEMS_KEY);
        self.cache.invalidate(&item_key(id));
        Ok(())
    }

    // ── profile ─────────────────────────────────────────────────────────

    pub async fn get_profile(&self) -> Result<Profile, ClientError> {
        decode(self.cached_get(PROFILE_KEY).await?)
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<Profile, ClientError> {
        let body = to_body(update)?;
        let saved = self
            .request(Method::PUT, "/users/profile", Some(&body))
            .await?;
        self.cache.invalidate(PROFILE_KEY);
        decode(saved)
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}
