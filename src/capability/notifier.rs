//! Notifier implementations: an HTTP webhook and the local desktop.

use reqwest::blocking::Client;
use reqwest::{StatusCode, Url};
use serde::Serialize;
use std::process::Command;
use std::time::Duration;
use uuid::Uuid;

use super::checker::transport_error;
use super::Notifier;
use crate::error::MonitorError;
use crate::models::{AlertContext, DeliveryReceipt, SummaryStats};

/// Desktop notification bodies are cut to this many characters.
const MAX_DESKTOP_BODY: usize = 200;

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
enum MessageKind {
    Alert,
    Summary,
}

#[derive(Debug, Serialize)]
struct WebhookMessage<'a, T: Serialize> {
    kind: MessageKind,
    sender: &'a str,
    recipient: &'a str,
    subject: String,
    body: String,
    data: &'a T,
}

/// Posts JSON messages to a webhook with a bearer credential.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: Url,
    credential: Option<String>,
    sender: String,
    recipient: String,
}

impl WebhookNotifier {
    pub fn new(
        url: &str,
        credential: Option<String>,
        sender: impl Into<String>,
        recipient: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, MonitorError> {
        let url = Url::parse(url)
            .map_err(|e| MonitorError::Validation(format!("invalid webhook URL '{url}': {e}")))?;
        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .user_agent(concat!("watchkeep/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| MonitorError::Validation(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            url,
            credential: credential.filter(|c| !c.is_empty()),
            sender: sender.into(),
            recipient: recipient.into(),
        })
    }

    fn post<T: Serialize>(
        &self,
        kind: MessageKind,
        subject: String,
        body: String,
        data: &T,
    ) -> Result<DeliveryReceipt, MonitorError> {
        let message = WebhookMessage {
            kind,
            sender: &self.sender,
            recipient: &self.recipient,
            subject,
            body,
            data,
        };

        let mut request = self.client.post(self.url.clone()).json(&message);
        if let Some(credential) = &self.credential {
            request = request.bearer_auth(credential);
        }

        let response = request.send().map_err(|e| match transport_error(e) {
            MonitorError::Validation(msg) => MonitorError::notify_permanent(msg),
            other => MonitorError::notify(other.to_string()),
        })?;

        let code = response.status();
        if !code.is_success() {
            return Err(delivery_error(code));
        }

        // The body is optional; anything unparseable falls back to a local id
        let body = response.text().unwrap_or_default();
        Ok(DeliveryReceipt {
            message_id: message_id_from(&body),
        })
    }
}

impl Notifier for WebhookNotifier {
    fn send_alert(&self, context: &AlertContext) -> Result<DeliveryReceipt, MonitorError> {
        self.post(MessageKind::Alert, context.subject(), context.body(), context)
    }

    fn send_summary(&self, stats: &SummaryStats) -> Result<DeliveryReceipt, MonitorError> {
        self.post(MessageKind::Summary, stats.subject(), stats.body(), stats)
    }
}

/// 5xx, 408 and 429 can succeed later; any other rejection will not.
fn delivery_error(code: StatusCode) -> MonitorError {
    let message = format!(
        "webhook answered HTTP {} {}",
        code.as_u16(),
        code.canonical_reason().unwrap_or("Unknown")
    );
    if code.is_server_error()
        || code == StatusCode::REQUEST_TIMEOUT
        || code == StatusCode::TOO_MANY_REQUESTS
    {
        MonitorError::notify(message)
    } else {
        MonitorError::notify_permanent(message)
    }
}

fn message_id_from(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| match value.get("id")? {
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Shows notifications with `notify-send` on Linux and `osascript` on macOS.
#[derive(Debug, Clone, Default)]
pub struct DesktopNotifier;

impl DesktopNotifier {
    pub fn new() -> Self {
        Self
    }

    fn show(&self, title: &str, body: &str) -> Result<DeliveryReceipt, MonitorError> {
        let body = truncate_body(body, MAX_DESKTOP_BODY);
        if cfg!(target_os = "macos") {
            send_macos_notification(title, &body)?;
        } else {
            send_linux_notification(title, &body)?;
        }
        Ok(DeliveryReceipt {
            message_id: Uuid::new_v4().to_string(),
        })
    }
}

impl Notifier for DesktopNotifier {
    fn send_alert(&self, context: &AlertContext) -> Result<DeliveryReceipt, MonitorError> {
        self.show(&format!("watchkeep: {}", context.subject()), &context.body())
    }

    fn send_summary(&self, stats: &SummaryStats) -> Result<DeliveryReceipt, MonitorError> {
        self.show(&format!("watchkeep: {}", stats.subject()), &stats.body())
    }
}

fn send_linux_notification(title: &str, body: &str) -> Result<(), MonitorError> {
    run_notification_command(
        Command::new("notify-send")
            .arg("--urgency=critical")
            .arg("--app-name=watchkeep")
            .arg(title)
            .arg(body),
        "notify-send",
    )
}

fn send_macos_notification(title: &str, body: &str) -> Result<(), MonitorError> {
    let script = format!(
        r#"display notification "{}" with title "{}""#,
        body.replace('"', r#"\""#),
        title.replace('"', r#"\""#)
    );
    run_notification_command(Command::new("osascript").arg("-e").arg(&script), "osascript")
}

fn run_notification_command(command: &mut Command, program: &str) -> Result<(), MonitorError> {
    let output = command.output().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            MonitorError::notify_permanent(format!("{program} is not installed"))
        } else {
            MonitorError::notify(format!("{program} failed: {e}"))
        }
    })?;
    if output.status.success() {
        Ok(())
    } else {
        Err(MonitorError::notify(format!(
            "{program} exited with: {}",
            output.status
        )))
    }
}

/// Truncate to `max_len` characters, adding an ellipsis if needed.
fn truncate_body(body: &str, max_len: usize) -> String {
    if body.chars().count() <= max_len {
        body.to_string()
    } else {
        let kept: String = body.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}
