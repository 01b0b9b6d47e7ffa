// Broker client: hands AI jobs to external workers over pub/sub channels and
// turns their fire-and-forget replies back into one awaited result per call.
// Route handlers only talk to `BrokerHub`; nothing else publishes on a
// family's request channel or reads its reply channel.

pub mod client;
pub mod connection;
pub mod envelope;
pub mod family;
pub mod hub;
pub mod registry;
pub mod transport;

#[cfg(test)]
pub mod testing;

use std::time::Duration;

use thiserror::Error;

pub use connection::ConnectionState;
pub use family::{JobFamily, JobType};
pub use hub::BrokerHub;
pub use transport::RedisTransport;

/// Every way a `submit_and_await` call can fail.
///
/// `Clone` so one connection failure can be fanned out to every pending caller.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BrokerError {
    #[error("No response for job {id} within {}ms", .after.as_millis())]
    Timeout { id: String, after: Duration },

    #[error("Broker connection lost while the job was in flight")]
    ConnectionLost,

    #[error("Broker channel for {0} is not connected")]
    NotConnected(JobFamily),

    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Correlation id {0} is already pending")]
    DuplicateId(String),

    #[error("Job type {job_type} is not handled by the {family} client")]
    UnsupportedJobType { job_type: JobType, family: JobFamily },
}

/// Tunables shared by every family's client and connection.
#[derive(Debug, Clone)]
pub struct BrokerSettings {
    /// Deadline applied when a caller does not pass one. AI jobs are slow.
    pub request_timeout: Duration,
    pub reconnect_base: Duration,
    pub reconnect_max: Duration,
    /// How often the reply subscription is checked with a round-trip heartbeat.
    /// `None` disables the check.
    pub heartbeat_interval: Option<Duration>,
    /// Upper bound on outstanding correlation ids per `submit_many` call.
    pub fan_out_concurrency: usize,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            reconnect_base: Duration::from_millis(500),
            reconnect_max: Duration::from_secs(30),
            heartbeat_interval: Some(Duration::from_secs(15)),
            fan_out_concurrency: 8,
        }
    }
}
