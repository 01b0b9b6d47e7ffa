//! Per-family broker client: publish a job, await its correlated reply.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::broker::connection::ChannelConnection;
use crate::broker::envelope;
use crate::broker::family::{JobFamily, JobType};
use crate::broker::registry::CorrelationRegistry;
use crate::broker::transport::Transport;
use crate::broker::{BrokerError, BrokerSettings};

/// One per job family, shared by every request handler through `BrokerHub`.
///
/// Owns the family's correlation registry and channel connection outright; no
/// other component publishes on its request channel or reads its reply channel.
pub struct BrokerClient {
    family: JobFamily,
    registry: Arc<CorrelationRegistry>,
    connection: Arc<ChannelConnection>,
    default_timeout: Duration,
    fan_out_concurrency: usize,
}

/// Forgets the entry if the awaiting future is dropped mid-flight (e.g. the HTTP
/// client went away). After a terminal action the entry is already gone and this is a no-op.
struct PendingGuard<'a> {
    registry: &'a CorrelationRegistry,
    id: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.registry.forget(self.id);
    }
}

impl BrokerClient {
    pub fn new(family: JobFamily, transport: Arc<dyn Transport>, settings: &BrokerSettings) -> Self {
        let registry = Arc::new(CorrelationRegistry::new(family));
        let connection = Arc::new(ChannelConnection::new(
            family,
            transport,
            registry.clone(),
            settings,
        ));

        Self {
            family,
            registry,
            connection,
            default_timeout: settings.request_timeout,
            fan_out_concurrency: settings.fan_out_concurrency.max(1),
        }
    }

    pub fn family(&self) -> JobFamily {
        self.family
    }

    pub fn connection(&self) -> &Arc<ChannelConnection> {
        &self.connection
    }

    pub fn registry(&self) -> &CorrelationRegistry {
        &self.registry
    }

    /// Publishes one job and waits for its reply payload, the deadline, or a connection failure.
    ///
    /// `timeout` falls back to the configured default. Never retries: some jobs have
    /// side effects on the worker, so resending is the caller's call.
    pub async fn submit_and_await(
        &self,
        job_type: JobType,
        data: Value,
        timeout: Option<Duration>,
    ) -> Result<Value, BrokerError> {
        if job_type.family() != self.family {
            return Err(BrokerError::UnsupportedJobType {
                job_type,
                family: self.family,
            });
        }

        let timeout = timeout.unwrap_or(self.default_timeout);
        let id = Uuid::new_v4().to_string();
        let wire = envelope::encode(job_type, &data, &id)?;

        let mut handle = self.registry.register(&id, job_type, Some(timeout))?;
        let _guard = PendingGuard {
            registry: &self.registry,
            id: &id,
        };

        // The deadline covers the publish too, and a reply or sweep that lands
        // while the publish is still in flight ends the call straight away.
        let deadline = Instant::now() + timeout;
        let publish = self.connection.publish(wire);
        tokio::pin!(publish);
        let mut published = false;

        let finished = loop {
            tokio::select! {
                received = &mut handle => break Some(received),
                result = &mut publish, if !published => {
                    published = true;
                    match result {
                        Ok(()) => debug!(family = %self.family, %job_type, id = %id, "Job published"),
                        Err(e) => {
                            self.registry.fail(&id, e);
                        }
                    }
                }
                _ = tokio::time::sleep_until(deadline) => break None,
            }
        };

        let received = match finished {
            Some(received) => received,
            None => {
                if !published {
                    warn!(family = %self.family, %job_type, id = %id, "Publish still pending at deadline");
                }
                // Loses harmlessly if a reply or sweep already finished the entry;
                // either way the handle now holds the winning outcome.
                self.registry.timeout(&id);
                (&mut handle).await
            }
        };

        // A closed handle means the entry was dropped without an outcome.
        let outcome = received.unwrap_or(Err(BrokerError::ConnectionLost));
        if let Err(e) = &outcome {
            warn!(family = %self.family, %job_type, id = %id, "Job failed: {e}");
        }
        outcome
    }

    /// Submits one job per payload with at most `concurrency` outstanding at once.
    ///
    /// Results come back in input order. Each call is correlated independently, so
    /// one failure does not affect the others.
    pub async fn submit_many(
        &self,
        job_type: JobType,
        payloads: Vec<Value>,
        concurrency: Option<usize>,
        timeout: Option<Duration>,
    ) -> Vec<Result<Value, BrokerError>> {
        let limit = concurrency.unwrap_or(self.fan_out_concurrency).max(1);
        debug!(family = %self.family, %job_type, jobs = payloads.len(), limit, "Fanning out jobs");

        stream::iter(payloads)
            .map(|data| self.submit_and_await(job_type, data, timeout))
            .buffered(limit)
            .collect()
            .await
    }
}
