//! Process-wide table of one `BrokerClient` per job family.
//!
//! Built once in `main` and shared through `AppState`; there are no lazily
//! initialised globals. `shutdown` stops every connection and fails anything
//! still waiting.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::broker::client::BrokerClient;
use crate::broker::connection::ConnectionState;
use crate::broker::family::{JobFamily, JobType};
use crate::broker::registry::PendingStats;
use crate::broker::transport::Transport;
use crate::broker::{BrokerError, BrokerSettings};

#[derive(Debug, Clone, Serialize)]
pub struct FamilyStatus {
    pub family: JobFamily,
    pub state: ConnectionState,
    pub since: DateTime<Utc>,
    pub request_channel: &'static str,
    pub reply_channel: &'static str,
    pub pending: PendingStats,
}

pub struct BrokerHub {
    clients: [Arc<BrokerClient>; JobFamily::COUNT],
    shutdown: CancellationToken,
    supervisors: Mutex<Vec<JoinHandle<()>>>,
}

impl BrokerHub {
    /// Builds every family's client and starts its connection supervisor.
    /// Must be called from within a Tokio runtime.
    pub fn start(transport: Arc<dyn Transport>, settings: BrokerSettings) -> Self {
        let shutdown = CancellationToken::new();
        let clients = JobFamily::ALL
            .map(|family| Arc::new(BrokerClient::new(family, transport.clone(), &settings)));

        let supervisors: Vec<JoinHandle<()>> = clients
            .iter()
            .map(|client| tokio::spawn(client.connection().clone().run(shutdown.child_token())))
            .collect();

        info!(
            families = JobFamily::COUNT,
            timeout_secs = settings.request_timeout.as_secs(),
            "Broker hub started"
        );

        Self {
            clients,
            shutdown,
            supervisors: Mutex::new(supervisors),
        }
    }

    pub fn client(&self, family: JobFamily) -> &Arc<BrokerClient> {
        &self.clients[family.index()]
    }

    /// Routes `job_type` to its family's client with the default deadline.
    pub async fn submit(&self, job_type: JobType, data: Value) -> Result<Value, BrokerError> {
        self.client(job_type.family())
            .submit_and_await(job_type, data, None)
            .await
    }

    /// Typed variant of `submit`: serialises the request and deserialises the reply payload.
    pub async fn call<Req, Resp>(&self, job_type: JobType, request: &Req) -> Result<Resp, BrokerError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let data = serde_json::to_value(request).map_err(|e| {
            BrokerError::MalformedEnvelope(format!("{job_type} request is not encodable: {e}"))
        })?;

        let payload = self.submit(job_type, data).await?;

        serde_json::from_value(payload).map_err(|e| {
            BrokerError::MalformedEnvelope(format!(
                "{job_type} reply payload has an unexpected shape: {e}"
            ))
        })
    }

    /// Fans out one job per payload on `job_type`'s family with the configured concurrency bound.
    pub async fn submit_many(
        &self,
        job_type: JobType,
        payloads: Vec<Value>,
    ) -> Vec<Result<Value, BrokerError>> {
        self.client(job_type.family())
            .submit_many(job_type, payloads, None, None)
            .await
    }

    /// Waits up to `within` for every family's reply subscription. Returns false on timeout.
    pub async fn wait_until_connected(&self, within: Duration) -> bool {
        let all = futures::future::join_all(
            self.clients
                .iter()
                .map(|client| client.connection().wait_connected()),
        );
        tokio::time::timeout(within, all).await.is_ok()
    }

    pub fn status(&self) -> Vec<FamilyStatus> {
        self.clients
            .iter()
            .map(|client| {
                let family = client.family();
                let snapshot = client.connection().snapshot();
                FamilyStatus {
                    family,
                    state: snapshot.state,
                    since: snapshot.since,
                    request_channel: family.request_channel(),
                    reply_channel: family.reply_channel(),
                    pending: client.registry().stats(),
                }
            })
            .collect()
    }

    /// Closes every subscription and fails all pending calls with `ConnectionLost`.
    /// Calls made afterwards fail with `NotConnected`.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let supervisors = std::mem::take(
            &mut *self
                .supervisors
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for supervisor in supervisors {
            if let Err(e) = supervisor.await {
                warn!("Connection supervisor ended abnormally: {e}");
            }
        }

        info!("Broker hub stopped");
    }
}

impl Drop for BrokerHub {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
