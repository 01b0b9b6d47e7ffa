//! Channel connection: one reply-channel subscription plus the publish path for one family.
//!
//! A single persistent dispatcher reads the reply channel and routes each message
//! by correlation id. Callers never install per-call handlers.
//!
//! Pub/sub sockets can go half-open without the stream ever ending, so the
//! dispatcher periodically publishes a heartbeat on its own reply channel and
//! treats the subscription as lost if the heartbeat does not come back.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::broker::envelope::{self, DecodeError};
use crate::broker::family::JobFamily;
use crate::broker::registry::CorrelationRegistry;
use crate::broker::transport::{MessageStream, Transport};
use crate::broker::{BrokerError, BrokerSettings};

/// Prefix of heartbeat messages on reply channels. Never a valid envelope.
const HEARTBEAT_PREFIX: &str = "hirewire:heartbeat:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct StateSnapshot {
    pub state: ConnectionState,
    pub since: DateTime<Utc>,
}

/// Bounded exponential backoff: `base * 2^attempt`, capped at `max`.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    base: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(16);
        self.base.saturating_mul(factor).min(self.max)
    }
}

pub struct ChannelConnection {
    family: JobFamily,
    transport: Arc<dyn Transport>,
    registry: Arc<CorrelationRegistry>,
    state: watch::Sender<StateSnapshot>,
    backoff: Backoff,
    heartbeat: Option<Duration>,
}

impl ChannelConnection {
    pub fn new(
        family: JobFamily,
        transport: Arc<dyn Transport>,
        registry: Arc<CorrelationRegistry>,
        settings: &BrokerSettings,
    ) -> Self {
        let (state, _) = watch::channel(StateSnapshot {
            state: ConnectionState::Disconnected,
            since: Utc::now(),
        });

        Self {
            family,
            transport,
            registry,
            state,
            backoff: Backoff::new(settings.reconnect_base, settings.reconnect_max),
            heartbeat: settings.heartbeat_interval,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state.borrow().state
    }

    pub fn snapshot(&self) -> StateSnapshot {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Resolves once the reply subscription is live.
    pub async fn wait_connected(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives as long as `self`, so this cannot observe a closed channel.
        let _ = rx
            .wait_for(|s| s.state == ConnectionState::Connected)
            .await;
    }

    /// Publishes an encoded job envelope. Fails fast while the reply subscription is down,
    /// since a reply published now would have nobody listening for it.
    pub async fn publish(&self, wire: String) -> Result<(), BrokerError> {
        if !self.is_connected() {
            return Err(BrokerError::NotConnected(self.family));
        }

        self.transport
            .publish(self.family.request_channel(), wire)
            .await
            .map_err(|e| {
                warn!(family = %self.family, "Publish failed: {e}");
                BrokerError::ConnectionLost
            })
    }

    /// Supervisor loop: subscribe, dispatch replies, and reconnect with backoff until
    /// `shutdown` fires. On exit every pending call is failed with `ConnectionLost`.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let reply_channel = self.family.reply_channel();
        let mut attempt: u32 = 0;

        loop {
            self.set_state(ConnectionState::Connecting);

            let subscribed = tokio::select! {
                _ = shutdown.cancelled() => break,
                result = self.transport.subscribe(reply_channel) => result,
            };

            match subscribed {
                Ok(stream) => {
                    attempt = 0;
                    self.set_state(ConnectionState::Connected);
                    info!(family = %self.family, channel = reply_channel, "Reply subscription established");

                    if self.pump(stream, &shutdown).await {
                        break;
                    }

                    warn!(family = %self.family, channel = reply_channel, "Reply subscription dropped");
                    self.mark_lost();
                }
                Err(e) => {
                    self.set_state(ConnectionState::Disconnected);
                    warn!(family = %self.family, attempt, "Subscribe to {reply_channel} failed: {e}");
                }
            }

            let delay = self.backoff.delay(attempt);
            attempt = attempt.saturating_add(1);
            debug!(family = %self.family, delay_ms = delay.as_millis() as u64, "Reconnecting after backoff");

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.mark_lost();
        info!(family = %self.family, "Channel connection stopped");
    }

    /// Feeds replies to the registry until the stream ends or goes silent (false)
    /// or shutdown fires (true).
    async fn pump(&self, mut stream: MessageStream, shutdown: &CancellationToken) -> bool {
        let mut ticker = self.heartbeat.map(|period| {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });
        // The heartbeat published on the last tick, until it is read back.
        let mut awaiting: Option<String> = None;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return true,
                next = stream.next() => match next {
                    Some(wire) if wire.starts_with(HEARTBEAT_PREFIX) => {
                        // Other processes share the reply channel; only our own beat counts.
                        if awaiting.as_deref() == Some(wire.as_str()) {
                            awaiting = None;
                        }
                    }
                    Some(wire) => self.dispatch(&wire),
                    None => return false,
                },
                period = next_tick(&mut ticker) => {
                    if !self.beat(&mut awaiting, period).await {
                        return false;
                    }
                }
            }
        }
    }

    /// Publishes the next heartbeat. Returns false if the previous one never came back
    /// or this one cannot be sent within `period`.
    async fn beat(&self, awaiting: &mut Option<String>, period: Duration) -> bool {
        if awaiting.is_some() {
            warn!(family = %self.family, "Heartbeat was not echoed on the reply channel");
            return false;
        }

        let token = format!("{HEARTBEAT_PREFIX}{}", Uuid::new_v4());
        let sent = tokio::time::timeout(
            period,
            self.transport
                .publish(self.family.reply_channel(), token.clone()),
        )
        .await;

        match sent {
            Ok(Ok(())) => {
                *awaiting = Some(token);
                true
            }
            Ok(Err(e)) => {
                warn!(family = %self.family, "Heartbeat publish failed: {e}");
                false
            }
            Err(_) => {
                warn!(family = %self.family, "Heartbeat publish timed out");
                false
            }
        }
    }

    fn dispatch(&self, wire: &str) {
        match envelope::decode(wire) {
            Ok(reply) if !self.family.accepts(reply.kind) => {
                warn!(family = %self.family, id = %reply.id, kind = ?reply.kind, "Reply tag belongs to another family");
                self.registry.fail(
                    &reply.id,
                    BrokerError::MalformedEnvelope(format!(
                        "reply type {:?} is not a {} reply",
                        reply.kind, self.family
                    )),
                );
            }
            Ok(reply) => match self.registry.expected_reply(&reply.id) {
                Some(expected) if expected != reply.kind => {
                    warn!(family = %self.family, id = %reply.id, kind = ?reply.kind, ?expected, "Reply tag does not match the job");
                    self.registry.fail(
                        &reply.id,
                        BrokerError::MalformedEnvelope(format!(
                            "expected a {expected:?} reply, got {:?}",
                            reply.kind
                        )),
                    );
                }
                _ => {
                    if !self.registry.resolve(&reply.id, reply.payload) {
                        debug!(family = %self.family, id = %reply.id, "Discarding reply with no pending job");
                    }
                }
            },
            Err(DecodeError {
                id: Some(id),
                reason,
            }) => {
                warn!(family = %self.family, id = %id, "Malformed reply: {reason}");
                self.registry
                    .fail(&id, BrokerError::MalformedEnvelope(reason));
            }
            Err(err) => {
                warn!(family = %self.family, "Discarding undecodable reply: {}", err.reason);
            }
        }
    }

    // State flips before the sweep: a submit that registers after the sweep
    // sees Disconnected on its publish check and fails itself.
    fn mark_lost(&self) {
        self.set_state(ConnectionState::Disconnected);
        let failed = self.registry.fail_all(BrokerError::ConnectionLost);
        if failed > 0 {
            warn!(family = %self.family, failed, "Failed in-flight jobs after connection loss");
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_if_modified(|current| {
            if current.state == state {
                return false;
            }
            *current = StateSnapshot {
                state,
                since: Utc::now(),
            };
            true
        });
    }
}

async fn next_tick(ticker: &mut Option<Interval>) -> Duration {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
            ticker.period()
        }
        None => std::future::pending().await,
    }
}
