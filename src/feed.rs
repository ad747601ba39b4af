//! Live telemetry feeds.
//!
//! A feed delivers partial samples and connection-status changes over an
//! unbounded channel until its [`Subscription`] is dropped or unsubscribed.

use crate::error::{AppError, Result};
use crate::models::{FarmSettings, SensorUpdate};
use crate::parser::Parser;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Idle,
    Connecting,
    Connected,
    Disconnected,
    Error,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionStatus::Idle => "idle",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Error => "error",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    Data(SensorUpdate),
    Status(ConnectionStatus),
}

pub type FeedSender = mpsc::UnboundedSender<FeedEvent>;

/// Handle on a running feed. Unsubscribing stops the feed task; doing it
/// again (or dropping the handle afterwards) is a no-op.
#[derive(Debug, Default)]
pub struct Subscription {
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Subscription with nothing behind it
    pub fn idle() -> Self {
        Self { task: None }
    }

    pub fn from_task(task: JoinHandle<()>) -> Self {
        Self { task: Some(task) }
    }

    /// Stop the feed. Returns whether anything was running.
    pub fn unsubscribe(&mut self) -> bool {
        match self.task.take() {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

pub trait PushFeed: Send + Sync {
    /// Start delivering events for `settings` into `events`. Must be called
    /// from within a tokio runtime.
    fn subscribe(&self, settings: &FarmSettings, events: FeedSender) -> Subscription;
}

/// Polls a realtime-database style REST endpoint:
/// `GET {url}/{path}.json?auth={api_key}`.
///
/// Data events are emitted only when the stored value changes.
pub struct HttpPollingFeed {
    client: Client,
    poll_interval: Duration,
}

impl HttpPollingFeed {
    pub fn new(poll_interval: Duration, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("agroflow-engine/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            poll_interval,
        })
    }
}

enum PollFailure {
    /// Could not reach the endpoint
    Unreachable(AppError),
    /// Reached it but the answer was unusable
    Rejected(AppError),
}

async fn poll_once(client: &Client, url: &str, api_key: Option<&str>) -> std::result::Result<Value, PollFailure> {
    let mut request = client.get(url);
    if let Some(key) = api_key {
        request = request.query(&[("auth", key)]);
    }

    let response = request
        .send()
        .await
        .map_err(|e| PollFailure::Unreachable(e.into()))?;
    let response = response
        .error_for_status()
        .map_err(|e| PollFailure::Rejected(e.into()))?;
    response
        .json::<Value>()
        .await
        .map_err(|e| PollFailure::Rejected(e.into()))
}

impl PushFeed for HttpPollingFeed {
    fn subscribe(&self, settings: &FarmSettings, events: FeedSender) -> Subscription {
        let Some(base) = settings.feed.url.as_deref().filter(|_| settings.feed.is_configured()) else {
            debug!("No feed URL configured, live feed stays idle");
            let _ = events.send(FeedEvent::Status(ConnectionStatus::Idle));
            return Subscription::idle();
        };

        let url = format!(
            "{}/{}.json",
            base.trim().trim_end_matches('/'),
            settings.feed.data_path()
        );
        let api_key = settings.feed.api_key.clone().filter(|k| !k.is_empty());
        let client = self.client.clone();
        let poll_interval = self.poll_interval;

        info!("Subscribing to live feed at {}", url);
        let task = tokio::spawn(async move {
            if events.send(FeedEvent::Status(ConnectionStatus::Connecting)).is_err() {
                return;
            }

            let mut ticker = tokio::time::interval(poll_interval);
            let mut status = ConnectionStatus::Connecting;
            let mut last_value: Option<Value> = None;

            loop {
                ticker.tick().await;

                let next_status = match poll_once(&client, &url, api_key.as_deref()).await {
                    Ok(value) => {
                        if last_value.as_ref() != Some(&value) {
                            match Parser::parse_feed_value(&value) {
                                Ok(Some(update)) => {
                                    debug!("Feed data received from {}: {:?}", url, update);
                                    if events.send(FeedEvent::Data(update)).is_err() {
                                        return;
                                    }
                                }
                                Ok(None) => {}
                                Err(e) => warn!("Ignoring feed payload from {}: {}", url, e),
                            }
                            last_value = Some(value);
                        }
                        ConnectionStatus::Connected
                    }
                    Err(PollFailure::Unreachable(e)) => {
                        warn!("Live feed unreachable: {}", e);
                        ConnectionStatus::Disconnected
                    }
                    Err(PollFailure::Rejected(e)) => {
                        warn!("Live feed read error: {}", e);
                        ConnectionStatus::Error
                    }
                };

                if next_status != status {
                    status = next_status;
                    if events.send(FeedEvent::Status(status)).is_err() {
                        return;
                    }
                }
            }
        });

        Subscription::from_task(task)
    }
}

/// Replays a recorded feed, one payload per interval, then reports
/// `Disconnected`.
#[derive(Debug, Clone)]
pub struct ReplayFeed {
    updates: Vec<SensorUpdate>,
    interval: Duration,
}

impl ReplayFeed {
    pub fn new(updates: Vec<SensorUpdate>, interval: Duration) -> Self {
        Self { updates, interval }
    }

    pub fn from_file<P: AsRef<Path>>(path: P, interval: Duration) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let (updates, stats) = Parser::parse_replay(&content)?;
        info!(
            "Loaded {} feed payloads from {} ({} skipped, {} failures)",
            updates.len(),
            path.as_ref().display(),
            stats.skipped_lines,
            stats.parse_failures
        );
        Ok(Self::new(updates, interval))
    }

    pub fn len(&self) -> usize {
        self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }
}

impl PushFeed for ReplayFeed {
    fn subscribe(&self, _settings: &FarmSettings, events: FeedSender) -> Subscription {
        let updates = self.updates.clone();
        let interval = self.interval;

        let task = tokio::spawn(async move {
            if events.send(FeedEvent::Status(ConnectionStatus::Connected)).is_err() {
                return;
            }
            for update in updates {
                tokio::time::sleep(interval).await;
                if events.send(FeedEvent::Data(update)).is_err() {
                    return;
                }
            }
            let _ = events.send(FeedEvent::Status(ConnectionStatus::Disconnected));
        });

        Subscription::from_task(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unconfigured_feed_reports_idle() {
        let feed = HttpPollingFeed::new(Duration::from_secs(5), Duration::from_secs(5)).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut subscription = feed.subscribe(&FarmSettings::default(), tx);

        assert_eq!(rx.recv().await, Some(FeedEvent::Status(ConnectionStatus::Idle)));
        assert!(!subscription.is_active());
        assert!(!subscription.unsubscribe());
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_delivers_in_order_then_disconnects() {
        let feed = ReplayFeed::new(
            vec![SensorUpdate::soil_moisture(40.0), SensorUpdate::soil_moisture(41.0)],
            Duration::from_secs(10),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _subscription = feed.subscribe(&FarmSettings::default(), tx);

        assert_eq!(rx.recv().await, Some(FeedEvent::Status(ConnectionStatus::Connected)));
        assert_eq!(rx.recv().await, Some(FeedEvent::Data(SensorUpdate::soil_moisture(40.0))));
        assert_eq!(rx.recv().await, Some(FeedEvent::Data(SensorUpdate::soil_moisture(41.0))));
        assert_eq!(
            rx.recv().await,
            Some(FeedEvent::Status(ConnectionStatus::Disconnected))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsubscribe_is_idempotent_and_stops_delivery() {
        let feed = ReplayFeed::new(vec![SensorUpdate::soil_moisture(40.0)], Duration::from_secs(10));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut subscription = feed.subscribe(&FarmSettings::default(), tx);

        assert_eq!(rx.recv().await, Some(FeedEvent::Status(ConnectionStatus::Connected)));
        assert!(subscription.unsubscribe());
        assert!(!subscription.unsubscribe());

        // The aborted task drops its sender, closing the channel
        assert_eq!(rx.recv().await, None);
    }
}
