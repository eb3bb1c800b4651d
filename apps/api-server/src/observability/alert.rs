//! Critical error alerting layer for tracing.
//!
//! ERROR events (storage outages, a failing counter backend, broken sign-in
//! exchanges) are handed to a console or webhook sender on a background task.
//! A counter backend that is down logs once per request, so repeats of the
//! same alert inside `repeat_window` are collapsed into a count.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::{Layer, layer::Context};

#[derive(Debug, Clone)]
pub struct AlertMessage {
    pub level: Level,
    pub target: String,
    pub message: String,
    pub fields: Vec<(String, String)>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Identical alerts folded into this one.
    pub suppressed: u32,
}

impl AlertMessage {
    fn fingerprint(&self) -> (String, String) {
        (self.target.clone(), self.message.clone())
    }

    pub fn summary(&self) -> String {
        let mut text = format!(
            "[{}] {}: {} ({})",
            self.level, self.target, self.message, self.timestamp
        );
        for (name, value) in &self.fields {
            text.push_str(&format!("\n  {name} = {value}"));
        }
        if self.suppressed > 0 {
            text.push_str(&format!("\n  (+{} identical since last alert)", self.suppressed));
        }
        text
    }
}

#[derive(Debug, Clone)]
pub struct AlertConfig {
    /// Least severe level that triggers an alert.
    pub min_level: Level,
    /// Alerts beyond this many in flight are dropped.
    pub buffer_size: usize,
    pub repeat_window: Duration,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            min_level: Level::ERROR,
            buffer_size: 100,
            repeat_window: Duration::from_secs(60),
        }
    }
}

#[async_trait::async_trait]
pub trait AlertSender: Send + Sync {
    async fn send(&self, alert: AlertMessage) -> Result<(), AlertError>;
}

#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    #[error("Failed to send alert: {0}")]
    SendError(String),
}

/// Writes alerts to stderr (for development).
pub struct ConsoleAlertSender;

#[async_trait::async_trait]
impl AlertSender for ConsoleAlertSender {
    async fn send(&self, alert: AlertMessage) -> Result<(), AlertError> {
        eprintln!("\nALERT {}\n", alert.summary());
        Ok(())
    }
}

/// Posts alerts to a chat webhook (Slack, Discord, ...).
pub struct WebhookAlertSender {
    url: String,
    client: reqwest::Client,
}

impl WebhookAlertSender {
    pub fn new(url: String) -> Self {
        Self {
            url,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait::async_trait]
impl AlertSender for WebhookAlertSender {
    async fn send(&self, alert: AlertMessage) -> Result<(), AlertError> {
        let response = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "text": alert.summary() }))
            .send()
            .await
            .map_err(|e| AlertError::SendError(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(AlertError::SendError(format!("webhook answered {status}")))
        }
    }
}

/// Collapses repeats of one alert within a window.
struct RepeatFilter {
    window: Duration,
    last_sent: HashMap<(String, String), (Instant, u32)>,
}

impl RepeatFilter {
    fn new(window: Duration) -> Self {
        Self {
            window,
            last_sent: HashMap::new(),
        }
    }

    /// `Some` with the number of swallowed repeats when the alert should go out.
    fn admit(&mut self, alert: &AlertMessage, now: Instant) -> Option<u32> {
        let window = self.window;
        self.last_sent.retain(|_, (sent, _)| now.duration_since(*sent) < window);

        match self.last_sent.get_mut(&alert.fingerprint()) {
            Some((_, swallowed)) => {
                *swallowed += 1;
                None
            }
            None => {
                self.last_sent.insert(alert.fingerprint(), (now, 0));
                Some(0)
            }
        }
    }

    /// Repeats swallowed since the last delivery of this alert, if its window has closed.
    fn pending(&mut self, alert: &AlertMessage, now: Instant) -> u32 {
        match self.last_sent.get(&alert.fingerprint()) {
            Some((sent, swallowed)) if now.duration_since(*sent) >= self.window => *swallowed,
            _ => 0,
        }
    }
}

async fn deliver(
    mut rx: mpsc::Receiver<AlertMessage>,
    sender: Arc<dyn AlertSender>,
    repeat_window: Duration,
) {
    let mut filter = RepeatFilter::new(repeat_window);
    while let Some(mut alert) = rx.recv().await {
        let now = Instant::now();
        let carried = filter.pending(&alert, now);
        if filter.admit(&alert, now).is_none() {
            continue;
        }
        alert.suppressed = carried;
        if let Err(e) = sender.send(alert).await {
            // Not through tracing: that would alert again.
            eprintln!("{e}");
        }
    }
}

/// Tracing layer that sends alerts on severe events.
pub struct AlertLayer {
    queue: mpsc::Sender<AlertMessage>,
    min_level: Level,
}

impl AlertLayer {
    /// Must be called inside a Tokio runtime.
    pub fn new(sender: Arc<dyn AlertSender>, config: AlertConfig) -> Self {
        let (queue, rx) = mpsc::channel(config.buffer_size.max(1));
        tokio::spawn(deliver(rx, sender, config.repeat_window));
        Self {
            queue,
            min_level: config.min_level,
        }
    }

    pub fn console() -> Self {
        Self::new(Arc::new(ConsoleAlertSender), AlertConfig::default())
    }

    pub fn webhook(url: String) -> Self {
        Self::new(Arc::new(WebhookAlertSender::new(url)), AlertConfig::default())
    }
}

#[derive(Default)]
struct EventFields {
    message: String,
    fields: Vec<(String, String)>,
}

impl EventFields {
    fn push(&mut self, field: &Field, value: String) {
        match field.name() {
            "message" => self.message = value,
            name => self.fields.push((name.to_string(), value)),
        }
    }
}

impl Visit for EventFields {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.push(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.push(field, format!("{value:?}"));
    }
}

impl<S: Subscriber> Layer<S> for AlertLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        // ERROR sorts lowest: anything greater is less severe.
        if *meta.level() > self.min_level {
            return;
        }

        let mut visited = EventFields::default();
        event.record(&mut visited);

        // A full queue drops the alert rather than blocking the request.
        let _ = self.queue.try_send(AlertMessage {
            level: *meta.level(),
            target: meta.target().to_string(),
            message: visited.message,
            fields: visited.fields,
            timestamp: chrono::Utc::now(),
            suppressed: 0,
        });
    }
}
