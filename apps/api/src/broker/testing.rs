//! In-memory pub/sub broker and worker stubs for tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::task::JoinHandle;

use crate::broker::family::{JobFamily, JobType, ResponseKind};
use crate::broker::transport::{MessageStream, Transport, TransportError};

/// Fan-out to every live subscriber of a channel, in publish order, like Redis pub/sub.
#[derive(Default)]
pub struct InMemoryBroker {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    subscribers: HashMap<String, Vec<mpsc::UnboundedSender<String>>>,
    subscribe_calls: HashMap<String, usize>,
    stalled: Vec<mpsc::UnboundedSender<String>>,
    offline: bool,
}

impl InMemoryBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// While offline, subscribe and publish both fail.
    pub fn set_offline(&self, offline: bool) {
        self.inner.lock().unwrap().offline = offline;
    }

    /// Ends every subscription on `channel`, as a dropped connection would.
    pub fn sever(&self, channel: &str) {
        self.inner.lock().unwrap().subscribers.remove(channel);
    }

    /// Keeps `channel` subscriptions open but stops delivering to them, like a half-open socket.
    pub fn stall(&self, channel: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(senders) = inner.subscribers.remove(channel) {
            inner.stalled.extend(senders);
        }
    }

    pub fn subscribe_calls(&self, channel: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .subscribe_calls
            .get(channel)
            .copied()
            .unwrap_or(0)
    }

    /// Delivers a raw message to `channel` subscribers, bypassing the offline flag.
    pub fn inject(&self, channel: &str, message: impl Into<String>) {
        let message = message.into();
        let mut inner = self.inner.lock().unwrap();
        if let Some(senders) = inner.subscribers.get_mut(channel) {
            senders.retain(|tx| tx.unbounded_send(message.clone()).is_ok());
        }
    }
}

#[async_trait]
impl Transport for InMemoryBroker {
    async fn publish(&self, channel: &str, payload: String) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.offline {
            return Err(TransportError::Unavailable("broker offline".to_string()));
        }
        if let Some(senders) = inner.subscribers.get_mut(channel) {
            senders.retain(|tx| tx.unbounded_send(payload.clone()).is_ok());
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<MessageStream, TransportError> {
        let mut inner = self.inner.lock().unwrap();
        *inner.subscribe_calls.entry(channel.to_string()).or_default() += 1;
        if inner.offline {
            return Err(TransportError::Unavailable("broker offline".to_string()));
        }
        let (tx, rx) = mpsc::unbounded();
        inner
            .subscribers
            .entry(channel.to_string())
            .or_default()
            .push(tx);
        Ok(rx.boxed())
    }
}

/// A job envelope as a worker sees it.
#[derive(Debug, Clone, Deserialize)]
pub struct ReceivedJob {
    pub id: String,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub data: Value,
}

pub fn parse_job(wire: &str) -> ReceivedJob {
    serde_json::from_str(wire).expect("client published an invalid job envelope")
}

pub fn reply_wire(id: &str, kind: ResponseKind, payload: Value) -> String {
    json!({ "id": id, "type": kind, "payload": payload }).to_string()
}

/// Subscribes to `family`'s request channel and hands back the raw job stream.
pub async fn job_stream(broker: &InMemoryBroker, family: JobFamily) -> MessageStream {
    broker.subscribe(family.request_channel()).await.unwrap()
}

/// Spawns a worker that answers each job with `respond`'s payload under the
/// job's own reply tag. Returning `None` leaves the job unanswered.
pub async fn spawn_worker<F>(
    broker: Arc<InMemoryBroker>,
    family: JobFamily,
    respond: F,
) -> JoinHandle<()>
where
    F: Fn(&ReceivedJob) -> Option<Value> + Send + 'static,
{
    let mut jobs = job_stream(&broker, family).await;
    tokio::spawn(async move {
        while let Some(wire) = jobs.next().await {
            let job = parse_job(&wire);
            if let Some(payload) = respond(&job) {
                broker.inject(
                    family.reply_channel(),
                    reply_wire(&job.id, job.job_type.reply_kind(), payload),
                );
            }
        }
    })
}
