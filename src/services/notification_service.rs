// services/notification_service.rs
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{info, warn};

use crate::errors::{AppError, Result};

#[derive(Debug, Clone, Copy)]
pub enum NotificationKind {
    BookingReceived,
    PaymentReceived,
    DriverAssigned,
    TransferStarted,
    TransferCompleted,
    BookingCancelled,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::BookingReceived => "booking_received",
            NotificationKind::PaymentReceived => "payment_received",
            NotificationKind::DriverAssigned => "driver_assigned",
            NotificationKind::TransferStarted => "transfer_started",
            NotificationKind::TransferCompleted => "transfer_completed",
            NotificationKind::BookingCancelled => "booking_cancelled",
        }
    }
}

/// Fire-and-forget delivery channel. Implementations report errors; the
/// service above them decides those errors never propagate.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, kind: NotificationKind, recipient: &str, message: &str) -> Result<()>;
}

/// Africa's Talking style SMS sender.
pub struct SmsSink {
    api_key: String,
    username: String,
    from: String,
    client: Client,
}

impl SmsSink {
    pub fn new(api_key: String, username: String, from: String) -> Self {
        Self {
            api_key,
            username,
            from,
            client: Client::new(),
        }
    }
}

#[async_trait]
impl NotificationSink for SmsSink {
    async fn send(&self, _kind: NotificationKind, recipient: &str, message: &str) -> Result<()> {
        let url = "https://api.africastalking.com/version1/messaging";

        let response = self
            .client
            .post(url)
            .header("apiKey", &self.api_key)
            .header("Accept", "application/json")
            .form(&[
                ("username", self.username.as_str()),
                ("to", recipient),
                ("message", message),
                ("from", self.from.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AppError::ExternalApi(format!("SMS API error: {}", e)))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(AppError::ExternalApi(format!(
                "SMS sending failed with status: {}",
                response.status()
            )))
        }
    }
}

/// Logs instead of sending. Used in dev and by the test suite.
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn send(&self, kind: NotificationKind, recipient: &str, message: &str) -> Result<()> {
        info!(kind = kind.as_str(), recipient, message, "notification (log sink)");
        Ok(())
    }
}

/// Wraps a sink and swallows every failure after logging it. Booking,
/// payment, and activation must succeed even when the sender is down.
#[derive(Clone)]
pub struct NotificationService {
    sink: Arc<dyn NotificationSink>,
}

impl NotificationService {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        NotificationService { sink }
    }

    pub async fn notify(&self, kind: NotificationKind, recipient: &str, message: &str) {
        if let Err(e) = self.sink.send(kind, recipient, message).await {
            warn!(
                kind = kind.as_str(),
                recipient,
                error = %e,
                "notification delivery failed; continuing"
            );
        }
    }
}
