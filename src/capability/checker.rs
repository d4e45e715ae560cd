//! HTTP availability checker

use reqwest::blocking::Client;
use reqwest::{StatusCode, Url};
use std::time::Duration;

use super::Checker;
use crate::error::MonitorError;
use crate::models::{AvailabilityStatus, CheckOutcome};

/// Upper bound on the body read when looking for the unavailable marker.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Availability over HTTP: a 2xx answer means available.
#[derive(Debug, Clone)]
pub struct HttpChecker {
    client: Client,
    unavailable_marker: Option<String>,
}

impl HttpChecker {
    pub fn new(timeout: Duration, unavailable_marker: Option<String>) -> Result<Self, MonitorError> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .user_agent(concat!("watchkeep/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| MonitorError::Validation(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            unavailable_marker: unavailable_marker.filter(|m| !m.is_empty()),
        })
    }
}

impl Checker for HttpChecker {
    fn check(&self, target: &str) -> Result<CheckOutcome, MonitorError> {
        let url = Url::parse(target)
            .map_err(|e| MonitorError::Validation(format!("invalid target URL '{target}': {e}")))?;

        let response = self.client.get(url).send().map_err(transport_error)?;
        let code = response.status();
        let body = if code.is_success() && self.unavailable_marker.is_some() {
            let text = response.text().map_err(transport_error)?;
            truncate_body(text)
        } else {
            String::new()
        };

        let status = availability(code, &body, self.unavailable_marker.as_deref());
        tracing::debug!(%target, http_status = code.as_u16(), %status, "check response");
        Ok(CheckOutcome::now(status))
    }
}

fn truncate_body(mut text: String) -> String {
    if text.len() > MAX_BODY_BYTES {
        let mut end = MAX_BODY_BYTES;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
    }
    text
}

/// Map an HTTP answer to an availability status.
fn availability(code: StatusCode, body: &str, marker: Option<&str>) -> AvailabilityStatus {
    if !code.is_success() {
        return AvailabilityStatus::Unavailable;
    }
    match marker {
        Some(marker) if body.contains(marker) => AvailabilityStatus::Unavailable,
        _ => AvailabilityStatus::Available,
    }
}

pub(super) fn transport_error(err: reqwest::Error) -> MonitorError {
    if err.is_timeout() {
        MonitorError::Timeout(err.to_string())
    } else if err.is_builder() {
        MonitorError::Validation(err.to_string())
    } else {
        MonitorError::Network(err.to_string())
    }
}
