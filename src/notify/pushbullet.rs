//! Pushbullet push channel.
//!
//! API: `POST https://api.pushbullet.com/v2/pushes`
//! Auth: access token as HTTP basic-auth user.

use anyhow::{Context, Result};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::debug;

const PUSHES_URL: &str = "https://api.pushbullet.com/v2/pushes";

#[derive(Debug, Serialize)]
struct NotePush<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    title: &'a str,
    body: &'a str,
}

pub struct PushbulletClient {
    http: Client,
    url: String,
}

impl PushbulletClient {
    pub fn new(http: Client) -> Self {
        Self {
            http,
            url: PUSHES_URL.to_string(),
        }
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }

    /// Send a note push.
    pub async fn push(&self, token: &SecretString, title: &str, body: &str) -> Result<()> {
        let note = NotePush {
            kind: "note",
            title,
            body,
        };

        let resp = self
            .http
            .post(&self.url)
            .basic_auth(token.expose_secret(), None::<&str>)
            .json(&note)
            .send()
            .await
            .context("Pushbullet request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            anyhow::bail!("Pushbullet API error: {status}");
        }

        debug!("Pushbullet notification sent");
        Ok(())
    }
}
