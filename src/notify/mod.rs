//! Switch notifications.
//!
//! Two push channels, each enabled only when its credentials are present
//! in settings:
//! - Pushbullet (`pushbullet_token`)
//! - Pushover (`pushover_token` + `pushover_user`)
//!
//! Delivery is best effort; failures are logged and dropped.

pub mod pushbullet;
pub mod pushover;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

use crate::settings::Settings;

pub use pushbullet::PushbulletClient;
pub use pushover::PushoverClient;

/// Title shown on the push notification.
pub const NOTIFICATION_TITLE: &str = "Gruve";

/// Sink for human-readable switch alerts.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str);
}

/// Sends to every channel whose credentials are configured, re-reading
/// them from settings on each message.
pub struct PushNotifier {
    settings: Settings,
    rig: String,
    pushbullet: PushbulletClient,
    pushover: PushoverClient,
}

impl PushNotifier {
    pub fn new(settings: Settings, rig: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent("GRUVE/0.1.0")
            .build()
            .context("Failed to build notification HTTP client")?;
        Ok(Self {
            settings,
            rig: rig.to_string(),
            pushbullet: PushbulletClient::new(http.clone()),
            pushover: PushoverClient::new(http),
        })
    }

    /// Point both channels at other endpoints (local test servers).
    pub fn with_endpoints(mut self, pushbullet_url: &str, pushover_url: &str) -> Self {
        self.pushbullet = self.pushbullet.with_url(pushbullet_url);
        self.pushover = self.pushover.with_url(pushover_url);
        self
    }

    fn alert_text(&self, message: &str) -> String {
        format!("[{}] {message}", self.rig)
    }
}

#[async_trait]
impl Notifier for PushNotifier {
    async fn notify(&self, message: &str) {
        let text = self.alert_text(message);

        match self.settings.pushbullet_token() {
            Ok(Some(token)) => {
                if let Err(e) = self.pushbullet.push(&token, NOTIFICATION_TITLE, &text).await {
                    warn!(error = %e, "Pushbullet notification failed");
                }
            }
            Ok(None) => debug!("Pushbullet not configured"),
            Err(e) => warn!(error = %e, "Could not read Pushbullet credentials"),
        }

        match (self.settings.pushover_token(), self.settings.pushover_user()) {
            (Ok(Some(token)), Ok(Some(user))) => {
                if let Err(e) = self
                    .pushover
                    .push(&token, &user, NOTIFICATION_TITLE, &text)
                    .await
                {
                    warn!(error = %e, "Pushover notification failed");
                }
            }
            (Err(e), _) | (_, Err(e)) => warn!(error = %e, "Could not read Pushover credentials"),
            _ => debug!("Pushover not configured"),
        }
    }
}
