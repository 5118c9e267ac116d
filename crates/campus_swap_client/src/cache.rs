//! Fetch cache keyed by resource path.
//!
//! Concurrent reads of one key share a single in-flight request. Failed
//! fetches leave the slot empty so the next caller retries.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tokio::sync::OnceCell;

use crate::error::ClientError;

#[derive(Debug, Default)]
pub struct FetchCache {
    slots: Mutex<HashMap<String, Arc<OnceCell<Value>>>>,
}

impl FetchCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_fetch<F, Fut>(&self, key: &str, fetch: F) -> Result<Value, ClientError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, ClientError>>,
    {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.entry(key.to_string()).or_default().clone()
        };
        if slot.initialized() {
            tracing::debug!(key, "cache hit");
        }
        slot.get_or_try_init(fetch).await.cloned()
    }

    pub fn invalidate(&self, key: &str) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if slots.remove(key).is_some() {
            tracing::debug!(key, "cache invalidated");
        }
    }

    pub fn clear(&self) {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn contains(&self, key: &str) -> bool {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .is_some_and(|slot| slot.initialized())
    }
}
