//! Pushover push channel.
//!
//! API: `POST https://api.pushover.net/1/messages.json` (form-encoded)
//! Auth: application token + user key in the form body.

use anyhow::{Context, Result};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

const MESSAGES_URL: &str = "https://api.pushover.net/1/messages.json";

pub struct PushoverClient {
    http: Client,
    url: String,
}

impl PushoverClient {
    pub fn new(http: Client) -> Self {
        Self {
            http,
            url: MESSAGES_URL.to_string(),
        }
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }

    pub async fn push(
        &self,
        token: &SecretString,
        user: &SecretString,
        title: &str,
        message: &str,
    ) -> Result<()> {
        let form = [
            ("token", token.expose_secret().as_str()),
            ("user", user.expose_secret().as_str()),
            ("title", title),
            ("message", message),
        ];

        let resp = self
            .http
            .post(&self.url)
            .form(&form)
            .send()
            .await
            .context("Pushover request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            anyhow::bail!("Pushover API error: {status}");
        }

        debug!("Pushover notification sent");
        Ok(())
    }
}
