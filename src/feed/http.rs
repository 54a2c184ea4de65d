//! HTTP feed source.
//!
//! Plain GET against the configured URL (normally WhatToMine's
//! `coins.json`). Auth: none. The response must be JSON.

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::FeedSource;
use crate::types::GruveError;

const REQUEST_TIMEOUT_SECS: u64 = 30;

pub struct HttpFeed {
    http: Client,
}

impl HttpFeed {
    pub fn new() -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent("GRUVE/0.1.0")
            .build()
            .context("Failed to build feed HTTP client")?;
        Ok(Self { http })
    }
}

#[async_trait]
impl FeedSource for HttpFeed {
    async fn fetch(&self, url: &str) -> Result<Value, GruveError> {
        let fetch_err = |message: String| GruveError::FeedFetch {
            url: url.to_string(),
            message,
        };

        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| fetch_err(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(fetch_err(format!("HTTP {}", resp.status())));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| GruveError::FeedParse(format!("response is not JSON: {e}")))?;

        debug!(url, "Feed response decoded");
        Ok(body)
    }
}
