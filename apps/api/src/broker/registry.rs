//! Correlation registry: maps an in-flight correlation id to the caller waiting on it.
//!
//! Three triggers race to finish an entry: a matching reply, the caller's deadline
//! timer, and a connection-failure sweep. The entry is removed under the lock and
//! whoever removes it sends the outcome, so each id gets exactly one terminal action.
//! Sends happen after the lock is released.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

use crate::broker::family::{JobFamily, JobType, ResponseKind};
use crate::broker::BrokerError;

pub type Outcome = Result<Value, BrokerError>;

struct PendingEntry {
    job_type: JobType,
    created_at: Instant,
    deadline: Option<Instant>,
    completion: oneshot::Sender<Outcome>,
}

impl PendingEntry {
    fn complete(self, outcome: Outcome) {
        // The receiver is gone if the caller stopped waiting; nothing left to notify.
        let _ = self.completion.send(outcome);
    }
}

/// Snapshot of a registry, reported on `/health`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PendingStats {
    pub pending: usize,
    pub oldest_age_ms: Option<u64>,
    /// Entries past their deadline whose timer has not fired yet.
    pub overdue: usize,
}

pub struct CorrelationRegistry {
    family: JobFamily,
    entries: Mutex<HashMap<String, PendingEntry>>,
}

impl CorrelationRegistry {
    pub fn new(family: JobFamily) -> Self {
        Self {
            family,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Registers `id` and returns the receiving half of its completion handle.
    pub fn register(
        &self,
        id: &str,
        job_type: JobType,
        timeout: Option<Duration>,
    ) -> Result<oneshot::Receiver<Outcome>, BrokerError> {
        let (completion, handle) = oneshot::channel();
        let created_at = Instant::now();

        let mut entries = self.lock();
        if entries.contains_key(id) {
            return Err(BrokerError::DuplicateId(id.to_string()));
        }
        entries.insert(
            id.to_string(),
            PendingEntry {
                job_type,
                created_at,
                deadline: timeout.map(|t| created_at + t),
                completion,
            },
        );
        Ok(handle)
    }

    /// Completes `id` with a reply payload. Returns false if nothing was pending under that id.
    pub fn resolve(&self, id: &str, payload: Value) -> bool {
        match self.take(id) {
            Some(entry) => {
                debug!(
                    family = %self.family,
                    job_type = %entry.job_type,
                    id,
                    elapsed_ms = entry.created_at.elapsed().as_millis() as u64,
                    "Job resolved"
                );
                entry.complete(Ok(payload));
                true
            }
            None => false,
        }
    }

    /// Deadline expiry for `id`. A no-op if a reply or a sweep got there first.
    pub fn timeout(&self, id: &str) -> bool {
        match self.take(id) {
            Some(entry) => {
                let after = entry
                    .deadline
                    .map(|deadline| deadline.saturating_duration_since(entry.created_at))
                    .unwrap_or_else(|| entry.created_at.elapsed());
                entry.complete(Err(BrokerError::Timeout {
                    id: id.to_string(),
                    after,
                }));
                true
            }
            None => false,
        }
    }

    /// Rejects a single entry, e.g. when its reply could not be decoded or its publish failed.
    pub fn fail(&self, id: &str, error: BrokerError) -> bool {
        match self.take(id) {
            Some(entry) => {
                entry.complete(Err(error));
                true
            }
            None => false,
        }
    }

    /// Drops an entry without completing it. Used when the waiting future itself was dropped.
    pub fn forget(&self, id: &str) -> bool {
        self.take(id).is_some()
    }

    /// Rejects every pending entry with `error` and empties the registry.
    pub fn fail_all(&self, error: BrokerError) -> usize {
        let drained: Vec<PendingEntry> = {
            let mut entries = self.lock();
            entries.drain().map(|(_, entry)| entry).collect()
        };

        let count = drained.len();
        for entry in drained {
            entry.complete(Err(error.clone()));
        }
        count
    }

    /// The reply tag a worker should echo for `id`, while it is still pending.
    pub fn expected_reply(&self, id: &str) -> Option<ResponseKind> {
        self.lock().get(id).map(|entry| entry.job_type.reply_kind())
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn stats(&self) -> PendingStats {
        let now = Instant::now();
        let entries = self.lock();

        PendingStats {
            pending: entries.len(),
            oldest_age_ms: entries
                .values()
                .map(|e| now.saturating_duration_since(e.created_at).as_millis() as u64)
                .max(),
            overdue: entries
                .values()
                .filter(|e| e.deadline.is_some_and(|d| d <= now))
                .count(),
        }
    }

    fn take(&self, id: &str) -> Option<PendingEntry> {
        self.lock().remove(id)
    }

    // A panic while holding the lock can only interrupt a map insert/remove,
    // which leaves the map itself consistent.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, PendingEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
