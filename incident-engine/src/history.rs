//! Remediation History: per-device action log with per-key serialization
//!
//! The store hands out a [`HistoryLease`] per `ap_id`. The lease holds an
//! async mutex for that device only, so the guardrail check, the action and
//! the write-back happen as one serialized sequence while pipelines for other
//! devices proceed untouched.
//!
//! Daily counters roll over on the UTC calendar day.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::error::HistoryError;

/// Remediation record for one access point.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemediationHistory {
    /// When the last successful action completed.
    pub last_action_time: Option<DateTime<Utc>>,
    /// Actions taken on `count_day`.
    pub daily_count: u32,
    /// UTC day `daily_count` refers to.
    pub count_day: NaiveDate,
}

impl RemediationHistory {
    /// History with a single action at `at`.
    pub fn with_last_action(at: DateTime<Utc>) -> Self {
        let mut history = Self::default();
        history.record_action(at);
        history
    }

    /// Actions counted against `day`; zero once the day has rolled over.
    pub fn daily_count_on(&self, day: NaiveDate) -> u32 {
        if self.count_day == day {
            self.daily_count
        } else {
            0
        }
    }

    /// Record a completed action at `now`.
    pub fn record_action(&mut self, now: DateTime<Utc>) {
        let today = now.date_naive();
        if self.count_day != today {
            self.count_day = today;
            self.daily_count = 0;
        }
        self.daily_count += 1;
        self.last_action_time = Some(now);
    }
}

/// Durable backing for the history store.
pub trait HistoryPersistence: Send + Sync {
    fn load(&self) -> Result<HashMap<String, RemediationHistory>, HistoryError>;

    fn save(&self, ap_id: &str, history: &RemediationHistory) -> Result<(), HistoryError>;
}

/// Shared reference to the history store.
pub type SharedHistoryStore = Arc<RemediationHistoryStore>;

type Slot = Arc<AsyncMutex<RemediationHistory>>;

/// Keyed store of [`RemediationHistory`] records.
pub struct RemediationHistoryStore {
    slots: Mutex<HashMap<String, Slot>>,
    persistence: Option<Arc<dyn HistoryPersistence>>,
}

impl RemediationHistoryStore {
    /// Volatile store; history lives as long as the process.
    pub fn in_memory() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            persistence: None,
        }
    }

    /// Store primed from and written through to `persistence`.
    pub fn with_persistence(persistence: Arc<dyn HistoryPersistence>) -> Result<Self, HistoryError> {
        let loaded = persistence.load()?;
        debug!(devices = loaded.len(), "remediation history loaded");
        let slots = loaded
            .into_iter()
            .map(|(ap_id, history)| (ap_id, Arc::new(AsyncMutex::new(history))))
            .collect();
        Ok(Self {
            slots: Mutex::new(slots),
            persistence: Some(persistence),
        })
    }

    pub fn shared(self) -> SharedHistoryStore {
        Arc::new(self)
    }

    fn slot(&self, ap_id: &str) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots
            .entry(ap_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(RemediationHistory::default())))
            .clone()
    }

    /// Replace the record for `ap_id` (bootstrapping and tests).
    pub async fn seed(&self, ap_id: &str, history: RemediationHistory) {
        *self.slot(ap_id).lock().await = history;
    }

    /// Copy of the current record, waiting for any in-flight lease.
    pub async fn snapshot(&self, ap_id: &str) -> RemediationHistory {
        self.slot(ap_id).lock().await.clone()
    }

    /// Exclusive access to one device's record until the lease is dropped.
    pub async fn lease(&self, ap_id: &str) -> HistoryLease {
        let guard = self.slot(ap_id).lock_owned().await;
        HistoryLease {
            ap_id: ap_id.to_string(),
            guard,
            persistence: self.persistence.clone(),
        }
    }
}

/// Exclusive, write-through handle on one device's history.
pub struct HistoryLease {
    ap_id: String,
    guard: OwnedMutexGuard<RemediationHistory>,
    persistence: Option<Arc<dyn HistoryPersistence>>,
}

impl HistoryLease {
    pub fn ap_id(&self) -> &str {
        &self.ap_id
    }

    pub fn history(&self) -> &RemediationHistory {
        &self.guard
    }

    /// Record a completed action and write it through.
    ///
    /// The in-memory record is updated even if persistence fails; the
    /// error is returned so the caller can report it.
    pub fn record_action(&mut self, now: DateTime<Utc>) -> Result<(), HistoryError> {
        self.guard.record_action(now);
        debug!(
            ap_id = %self.ap_id,
            daily_count = self.guard.daily_count,
            "remediation history updated"
        );
        if let Some(persistence) = &self.persistence {
            if let Err(e) = persistence.save(&self.ap_id, &self.guard) {
                warn!(ap_id = %self.ap_id, error = %e, "failed to persist remediation history");
                return Err(e);
            }
        }
        Ok(())
    }
}
