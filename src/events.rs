//! Switch event log
//!
//! Bounded, append-only record of provider switches. Backed by a ring buffer:
//! once full, every append evicts the oldest event.

use crate::classifier::ErrorKind;
use crate::models::ProviderId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use tokio::sync::RwLock;

/// Default number of events retained
pub const DEFAULT_EVENT_LOG_CAPACITY: usize = 100;

/// A move from one provider to another
///
/// Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwitchEvent {
    timestamp: DateTime<Utc>,
    from_provider_id: ProviderId,
    to_provider_id: ProviderId,
    reason: String,
    error_kind: Option<ErrorKind>,
}

impl SwitchEvent {
    /// Create an event stamped with the current time
    pub fn new(
        from: ProviderId,
        to: ProviderId,
        reason: impl Into<String>,
        error_kind: Option<ErrorKind>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            from_provider_id: from,
            to_provider_id: to,
            reason: reason.into(),
            error_kind,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn from_provider_id(&self) -> &ProviderId {
        &self.from_provider_id
    }

    pub fn to_provider_id(&self) -> &ProviderId {
        &self.to_provider_id
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error_kind
    }
}

/// Fixed-capacity ring buffer of [`SwitchEvent`]s
#[derive(Debug)]
pub struct EventLog {
    capacity: usize,
    entries: RwLock<VecDeque<SwitchEvent>>,
}

impl EventLog {
    /// Create a log holding at most `capacity` events (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: RwLock::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append an event, evicting the oldest if the log is full
    pub async fn append(&self, event: SwitchEvent) {
        tracing::info!(
            from = %event.from_provider_id,
            to = %event.to_provider_id,
            reason = %event.reason,
            error_kind = ?event.error_kind,
            "Provider switch"
        );

        let mut entries = self.entries.write().await;
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(event);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// The `n` most recent events, oldest first
    pub async fn recent(&self, n: usize) -> Vec<SwitchEvent> {
        let entries = self.entries.read().await;
        let skip = entries.len().saturating_sub(n);
        entries.iter().skip(skip).cloned().collect()
    }

    /// Every retained event, oldest first
    pub async fn all(&self) -> Vec<SwitchEvent> {
        self.entries.read().await.iter().cloned().collect()
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_LOG_CAPACITY)
    }
}
