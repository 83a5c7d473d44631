//! Security event log
//!
//! A coarse audit channel for external monitoring, separate from the attempt
//! ledger. Producers hand events to a bounded channel and return immediately;
//! a background worker delivers them to a [`SecurityEventSink`]. A slow or
//! failing sink can only cause events to be dropped, never a login to stall.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityEventKind {
    LoginSuccess,
    LoginFailed,
    RateLimited,
    AccountLocked,
    BotDetected,
}

impl SecurityEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SecurityEventKind::LoginSuccess => "LOGIN_SUCCESS",
            SecurityEventKind::LoginFailed => "LOGIN_FAILED",
            SecurityEventKind::RateLimited => "RATE_LIMITED",
            SecurityEventKind::AccountLocked => "ACCOUNT_LOCKED",
            SecurityEventKind::BotDetected => "BOT_DETECTED",
        }
    }
}

impl fmt::Display for SecurityEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SecurityEvent {
    pub kind: SecurityEventKind,
    pub network_identity: String,
    pub account_name: Option<String>,
    pub user_agent: Option<String>,
    /// Free-form context, e.g. the failure reason or lock duration
    pub detail: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl SecurityEvent {
    pub fn new(kind: SecurityEventKind, network_identity: &str) -> Self {
        Self {
            kind,
            network_identity: network_identity.to_string(),
            account_name: None,
            user_agent: None,
            detail: None,
            occurred_at: Utc::now(),
        }
    }

    pub fn account(mut self, account_name: &str) -> Self {
        self.account_name = Some(account_name.to_string());
        self
    }

    pub fn user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = Some(user_agent.to_string());
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Destination for security events
#[async_trait]
pub trait SecurityEventSink: Send + Sync {
    async fn deliver(&self, event: &SecurityEvent) -> anyhow::Result<()>;
}

/// Default sink: structured log lines under the `security` target.
pub struct TracingSink;

#[async_trait]
impl SecurityEventSink for TracingSink {
    async fn deliver(&self, event: &SecurityEvent) -> anyhow::Result<()> {
        let account = event.account_name.as_deref().unwrap_or("-");
        let detail = event.detail.as_deref().unwrap_or("");
        match event.kind {
            SecurityEventKind::LoginSuccess | SecurityEventKind::LoginFailed => {
                tracing::info!(
                    target: "security",
                    event = event.kind.as_str(),
                    identity = %event.network_identity,
                    account = %account,
                    detail = %detail,
                    at = %event.occurred_at.to_rfc3339(),
                );
            }
            _ => {
                tracing::warn!(
                    target: "security",
                    event = event.kind.as_str(),
                    identity = %event.network_identity,
                    account = %account,
                    detail = %detail,
                    at = %event.occurred_at.to_rfc3339(),
                );
            }
        }
        Ok(())
    }
}

/// Producer handle for the security event channel
#[derive(Clone)]
pub struct SecurityEventLog {
    sender: mpsc::Sender<SecurityEvent>,
}

impl SecurityEventLog {
    /// Start the delivery worker and return the producer handle.
    ///
    /// The worker exits once every handle has been dropped and the queue drained.
    pub fn spawn(capacity: usize, sink: Arc<dyn SecurityEventSink>) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::channel::<SecurityEvent>(capacity.max(1));
        let worker = tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                if let Err(e) = sink.deliver(&event).await {
                    tracing::warn!("Failed to deliver security event {}: {}", event.kind, e);
                }
            }
            tracing::debug!("Security event worker stopped");
        });
        (Self { sender }, worker)
    }

    /// Queue an event without waiting. Returns `false` if it was dropped.
    pub fn record(&self, event: SecurityEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                tracing::warn!("Security event queue full, dropping {}", event.kind);
                false
            }
            Err(TrySendError::Closed(event)) => {
                tracing::warn!("Security event worker gone, dropping {}", event.kind);
                false
            }
        }
    }
}
