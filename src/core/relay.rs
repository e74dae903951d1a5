//! Fire-and-forget forwarding of inbound messages to the sink.
//!
//! [`OutboundRelay::submit`] queues the message and returns immediately, so a
//! slow or failing publish never holds up the receive loop. A single
//! dispatcher task takes messages off the queue in receipt order and starts
//! each publish before looking at the next one. Publishes then run
//! concurrently inside the dispatcher, so the sink sees calls in receipt
//! order while a stalled publish never delays the ones behind it.
//!
//! The outcome is logged when it arrives and is never fed back: a failed
//! message is reported at ERROR and dropped.
//!
//! In-flight publishes are counted by a [`PublishDrain`] so shutdown can wait
//! for them, bounded by a timeout.
//!
//! ```text
//! submit() ──► queue ──► dispatcher ──► FuturesUnordered ──► Sink::publish
//!                                             │
//!                                             └──► log, counters, PendingPublish
//! ```

use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use bridge_mqtt::Message;
use bridge_pubsub::Sink;
use futures_util::{stream::FuturesUnordered, StreamExt};
use tokio::sync::{mpsc, oneshot, Notify};
use tracing::{debug, error, info, Instrument};

/// Counts publishes that have been submitted but not yet resolved.
#[derive(Debug, Default)]
pub struct PublishDrain {
    inflight: AtomicUsize,
    notify: Notify,
}

impl PublishDrain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(self: &Arc<Self>) -> PublishGuard {
        self.inflight.fetch_add(1, Ordering::AcqRel);
        PublishGuard {
            drain: self.clone(),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.inflight.load(Ordering::Acquire)
    }

    /// Resolves once no publish is in flight.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a release in between is not missed.
            notified.as_mut().enable();

            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Held by a publish task for as long as it runs.
pub struct PublishGuard {
    drain: Arc<PublishDrain>,
}

impl Drop for PublishGuard {
    fn drop(&mut self) {
        if self.drain.inflight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.drain.notify.notify_waiters();
        }
    }
}

/// Result of one publish, as reported by the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishResult {
    Success { message_id: String },
    Failure(String),
}

/// Outcome of relaying one message. Observability only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOutcome {
    /// Inbound topic the message arrived on.
    pub topic: String,
    pub result: PublishResult,
}

impl PublishOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.result, PublishResult::Success { .. })
    }
}

/// Handle to a submitted publish.
///
/// Dropping it does not cancel the publish.
pub struct PendingPublish {
    topic: String,
    outcome: oneshot::Receiver<PublishOutcome>,
}

impl PendingPublish {
    /// Waits for the publish to resolve.
    ///
    /// Reports a failure if the dispatcher stopped before the publish
    /// resolved.
    pub async fn outcome(self) -> PublishOutcome {
        match self.outcome.await {
            Ok(outcome) => outcome,
            Err(_) => PublishOutcome {
                topic: self.topic,
                result: PublishResult::Failure("relay stopped before the publish resolved".into()),
            },
        }
    }
}

/// Relay counters.
#[derive(Debug, Default)]
pub struct RelayStats {
    submitted: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

impl RelayStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub submitted: u64,
    pub succeeded: u64,
    pub failed: u64,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "submitted={} succeeded={} failed={}",
            self.submitted, self.succeeded, self.failed
        )
    }
}

/// A message on its way to the dispatcher.
struct PublishJob {
    message: Message,
    guard: PublishGuard,
    reply: oneshot::Sender<PublishOutcome>,
}

/// Submits messages to a [`Sink`] without waiting for the result.
///
/// Cloning is cheap; clones share the dispatcher, counters and drain.
#[derive(Clone)]
pub struct OutboundRelay {
    /// Queue feeding the dispatcher, in receipt order
    jobs: mpsc::UnboundedSender<PublishJob>,

    /// Pub/Sub topic path every message is published to
    destination: Arc<str>,

    /// Publish drain barrier (delays shutdown until publishes resolve)
    drain: Arc<PublishDrain>,

    stats: Arc<RelayStats>,
}

impl OutboundRelay {
    /// Creates the relay and spawns its dispatcher task.
    ///
    /// The dispatcher runs until every clone of the relay has been dropped
    /// and the publishes it started have resolved.
    ///
    /// # Arguments
    /// - `sink`: Destination client every payload is handed to
    /// - `destination`: Full topic path, `projects/{project}/topics/{topic}`
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime.
    pub fn new(sink: Arc<dyn Sink>, destination: impl Into<Arc<str>>) -> Self {
        let destination = destination.into();
        let stats = Arc::new(RelayStats::default());
        let (jobs, queue) = mpsc::unbounded_channel();

        let dispatcher = Dispatcher {
            sink,
            destination: destination.clone(),
            stats: stats.clone(),
        };
        tokio::spawn(dispatcher.run(queue).in_current_span());

        Self {
            jobs,
            destination,
            drain: Arc::new(PublishDrain::new()),
            stats,
        }
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Queues the payload for the sink and returns at once.
    ///
    /// Messages reach the sink in the order they were submitted.
    pub fn submit(&self, message: Message) -> PendingPublish {
        self.stats.submitted.fetch_add(1, Ordering::Relaxed);

        let topic = message.topic.clone();
        let (reply, outcome) = oneshot::channel();
        let job = PublishJob {
            message,
            guard: self.drain.enter(),
            reply,
        };

        if self.jobs.send(job).is_err() {
            self.stats.failed.fetch_add(1, Ordering::Relaxed);
            error!(
                "Relay dispatcher stopped, dropping message from '{}' for {}",
                topic, self.destination
            );
        }

        PendingPublish { topic, outcome }
    }

    pub fn in_flight(&self) -> usize {
        self.drain.in_flight()
    }

    /// Waits up to `timeout` for in-flight publishes. Returns whether the
    /// relay went idle in time.
    ///
    /// Publishes still running at the deadline are left to finish on their
    /// own; they are not cancelled.
    pub async fn drain(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.drain.wait_idle())
            .await
            .is_ok()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

/// Starts publishes in queue order and drives them to completion.
struct Dispatcher {
    sink: Arc<dyn Sink>,
    destination: Arc<str>,
    stats: Arc<RelayStats>,
}

impl Dispatcher {
    async fn run(self, mut queue: mpsc::UnboundedReceiver<PublishJob>) {
        // Futures are first polled in push order.
        let mut in_flight = FuturesUnordered::new();

        loop {
            tokio::select! {
                job = queue.recv() => match job {
                    Some(job) => in_flight.push(self.publish(job)),
                    None => break,
                },
                Some(()) = in_flight.next(), if !in_flight.is_empty() => {}
            }
        }

        while in_flight.next().await.is_some() {}
        debug!("Relay dispatcher for {} stopped", self.destination);
    }

    async fn publish(&self, job: PublishJob) {
        let PublishJob {
            message,
            guard,
            reply,
        } = job;

        let result = match self.sink.publish(&self.destination, message.payload).await {
            Ok(message_id) => {
                self.stats.succeeded.fetch_add(1, Ordering::Relaxed);
                info!(
                    "Published message from '{}' to {} (message id {})",
                    message.topic, self.destination, message_id
                );
                PublishResult::Success { message_id }
            }
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                if e.is_timeout() {
                    error!(
                        "Failed to publish message from '{}' to {}: timed out, message dropped",
                        message.topic, self.destination
                    );
                } else {
                    error!(
                        "Failed to publish message from '{}' to {}: {}",
                        message.topic, self.destination, e
                    );
                }
                PublishResult::Failure(e.to_string())
            }
        };

        // Resolved before anyone is told about it.
        drop(guard);

        // Nobody may be waiting for the outcome.
        let _ = reply.send(PublishOutcome {
            topic: message.topic,
            result,
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use bridge_mqtt::QoS;
    use bridge_pubsub::SinkError;
    use bytes::Bytes;
    use tokio::sync::Semaphore;
    use tracing_test::traced_test;

    use super::*;

    const DESTINATION: &str = "projects/plant/topics/floor";

    /// Records every publish. Payloads ending in `fail` are rejected,
    /// payloads starting with `hold` wait for a permit first.
    struct MockSink {
        published: Mutex<Vec<(String, Bytes)>>,
        gate: Semaphore,
    }

    #[async_trait]
    impl Sink for MockSink {
        async fn publish(&self, destination: &str, payload: Bytes) -> Result<String, SinkError> {
            if payload.starts_with(b"hold") {
                let permit = self.gate.acquire().await.unwrap();
                permit.forget();
            }

            let mut published = self.published.lock().unwrap();
            published.push((destination.to_string(), payload.clone()));

            if payload.ends_with(b"fail") {
                return Err(SinkError::Rejected {
                    status: 404,
                    body: "Resource not found".into(),
                });
            }
            Ok(format!("id-{}", published.len()))
        }
    }

    impl MockSink {
        fn new() -> Self {
            Self {
                published: Mutex::new(Vec::new()),
                gate: Semaphore::new(0),
            }
        }

        fn published(&self) -> Vec<(String, Bytes)> {
            self.published.lock().unwrap().clone()
        }
    }

    fn relay(sink: &Arc<MockSink>) -> OutboundRelay {
        OutboundRelay::new(sink.clone() as Arc<dyn Sink>, DESTINATION)
    }

    #[tokio::test]
    async fn test_submit_forwards_payload_unchanged() {
        let sink = Arc::new(MockSink::new());
        let relay = relay(&sink);

        let payload = Bytes::from_static(&[0x00, 0xff, 0x34, 0x32, 0x2e, 0x30]);
        let outcome = relay
            .submit(Message::new("plant-floor/data/line1", payload.clone(), QoS::AtLeastOnce))
            .outcome()
            .await;

        assert_eq!(outcome.topic, "plant-floor/data/line1");
        assert_eq!(
            outcome.result,
            PublishResult::Success {
                message_id: "id-1".into()
            }
        );
        assert_eq!(sink.published(), vec![(DESTINATION.to_string(), payload)]);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_failure_is_logged_and_not_retried() {
        let sink = Arc::new(MockSink::new());
        let relay = relay(&sink);

        let failed = relay
            .submit(Message::new("plant-floor/data/line1", "fail", QoS::AtLeastOnce))
            .outcome()
            .await;
        assert!(!failed.is_success());

        let next = relay
            .submit(Message::new("plant-floor/data/line1", "43.5", QoS::AtLeastOnce))
            .outcome()
            .await;
        assert!(next.is_success());

        assert_eq!(sink.published().len(), 2);
        assert_eq!(
            relay.stats(),
            StatsSnapshot {
                submitted: 2,
                succeeded: 1,
                failed: 1
            }
        );
        assert!(logs_contain("Failed to publish message from 'plant-floor/data/line1'"));
        assert!(logs_contain("Publish rejected with status 404"));
    }

    #[tokio::test]
    async fn test_pending_failure_does_not_block_next_message() {
        let sink = Arc::new(MockSink::new());
        let relay = relay(&sink);

        let slow = relay.submit(Message::new("line1", "hold-fail", QoS::AtLeastOnce));
        let fast = relay.submit(Message::new("line2", "42.0", QoS::AtLeastOnce));

        let fast = tokio::time::timeout(Duration::from_secs(1), fast.outcome())
            .await
            .expect("second message waited for the first");
        assert!(fast.is_success());
        assert_eq!(relay.in_flight(), 1);

        sink.gate.add_permits(1);
        assert!(!slow.outcome().await.is_success());
        assert_eq!(relay.in_flight(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_sink_is_called_in_receipt_order() {
        let sink = Arc::new(MockSink::new());
        let relay = relay(&sink);

        let pending: Vec<_> = (0..5000u32)
            .map(|i| relay.submit(Message::new("line1", i.to_string(), QoS::AtLeastOnce)))
            .collect();
        for publish in pending {
            assert!(publish.outcome().await.is_success());
        }

        let order: Vec<u32> = sink
            .published()
            .iter()
            .map(|(_, payload)| std::str::from_utf8(payload).unwrap().parse().unwrap())
            .collect();
        assert_eq!(order, (0..5000).collect::<Vec<_>>());
        assert_eq!(relay.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_drain_waits_for_in_flight() {
        let sink = Arc::new(MockSink::new());
        let relay = relay(&sink);

        let _pending = relay.submit(Message::new("line1", "hold", QoS::AtLeastOnce));
        assert!(!relay.drain(Duration::from_millis(50)).await);

        sink.gate.add_permits(1);
        assert!(relay.drain(Duration::from_secs(1)).await);
        assert_eq!(sink.published().len(), 1);
    }

    #[tokio::test]
    async fn test_drain_when_idle() {
        let sink = Arc::new(MockSink::new());
        assert!(relay(&sink).drain(Duration::from_millis(10)).await);
    }
}
