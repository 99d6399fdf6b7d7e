//! Single-worker notification queue with two delivery modes: fire-and-
//! forget while the shutdown latch is unset, synchronous once it is set.
//!
//! Built on a hand-rolled bounded ring (`Mutex<VecDeque>` + `Notify`)
//! rather than `tokio::sync::mpsc` because the required spill policy is
//! drop-oldest-with-a-warning, not backpressure — a full `mpsc` channel
//! would make the sampler block on a slow sink, which §9 explicitly rules
//! out.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

use ups_core::event::Severity;
use ups_core::ShutdownLatch;

use crate::sink::NotificationSink;

#[derive(Debug, Clone)]
struct QueuedMessage {
    text: String,
    severity: Severity,
}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Max messages held before the oldest is dropped.
    pub queue_capacity: usize,
    /// Per-sink timeout in normal (fire-and-forget) mode.
    pub normal_sink_timeout: Duration,
    /// Per-sink timeout once the shutdown latch is set.
    pub latched_sink_timeout: Duration,
    /// Extra delay after a latched send completes, to give the sink's TCP
    /// write a moment to actually leave the machine before poweroff.
    pub post_latch_settle: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            normal_sink_timeout: Duration::from_secs(5),
            latched_sink_timeout: Duration::from_secs(15),
            post_latch_settle: Duration::from_millis(500),
        }
    }
}

struct Queue {
    messages: Mutex<VecDeque<QueuedMessage>>,
    notify: Notify,
    stopped: AtomicBool,
}

/// Async single-producer (conceptually; the API is `Send + Sync` so
/// multiple callers may enqueue), single-consumer notification dispatcher.
pub struct Dispatcher {
    sinks: Vec<Arc<dyn NotificationSink>>,
    latch: ShutdownLatch,
    config: DispatcherConfig,
    queue: Arc<Queue>,
    worker: Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
}

impl Dispatcher {
    pub fn new(sinks: Vec<Arc<dyn NotificationSink>>, latch: ShutdownLatch, config: DispatcherConfig) -> Self {
        Self {
            sinks,
            latch,
            config,
            queue: Arc::new(Queue {
                messages: Mutex::new(VecDeque::new()),
                notify: Notify::new(),
                stopped: AtomicBool::new(false),
            }),
            worker: Mutex::new(None),
            started: AtomicBool::new(false),
        }
    }

    /// Idempotent; a no-op when disabled (no sinks configured) or already
    /// started.
    pub async fn start(self: &Arc<Self>) {
        if self.sinks.is_empty() {
            debug!("notification dispatcher has no sinks configured, not starting");
            return;
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.worker_loop().await });
        *self.worker.lock().await = Some(handle);
    }

    async fn worker_loop(self: Arc<Self>) {
        loop {
            let next = {
                let mut messages = self.queue.messages.lock().await;
                messages.pop_front()
            };
            let Some(msg) = next else {
                if self.queue.stopped.load(Ordering::SeqCst) {
                    return;
                }
                self.queue.notify.notified().await;
                continue;
            };
            self.deliver(&msg, self.config.normal_sink_timeout).await;
        }
    }

    async fn deliver(&self, msg: &QueuedMessage, per_sink_timeout: Duration) {
        for sink in &self.sinks {
            let result = timeout(
                per_sink_timeout,
                sink.send(&msg.text, msg.severity, per_sink_timeout),
            )
            .await;
            match result {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(sink = sink.name(), error = %err, "notification sink failed"),
                Err(_) => warn!(sink = sink.name(), "notification sink timed out"),
            }
        }
    }

    /// Enqueue a notification. `blocking` is accepted for API parity with
    /// the distilled spec but is superseded by the latch: once the latch
    /// is set, every send is synchronous regardless of `blocking`.
    pub async fn send(&self, message: impl Into<String>, severity: Severity, blocking: bool) {
        let text = message.into();

        if self.latch.is_set() {
            self.deliver(
                &QueuedMessage {
                    text,
                    severity,
                },
                self.config.latched_sink_timeout,
            )
            .await;
            tokio::time::sleep(self.config.post_latch_settle).await;
            return;
        }

        if blocking {
            self.deliver(
                &QueuedMessage {
                    text,
                    severity,
                },
                self.config.normal_sink_timeout,
            )
            .await;
            return;
        }

        let mut messages = self.queue.messages.lock().await;
        if messages.len() >= self.config.queue_capacity {
            if let Some(dropped) = messages.pop_front() {
                warn!(message = %dropped.text, "notification queue full, dropping oldest message");
            }
        }
        messages.push_back(QueuedMessage { text, severity });
        drop(messages);
        self.queue.notify.notify_one();
    }

    /// Graceful drain: signal the worker to exit once the queue empties,
    /// then wait for it with a hard timeout so a wedged sink can never
    /// hang process shutdown.
    pub async fn stop(&self) {
        self.queue.stopped.store(true, Ordering::SeqCst);
        self.queue.notify.notify_one();

        let handle = self.worker.lock().await.take();
        if let Some(handle) = handle {
            let _ = timeout(Duration::from_secs(10), handle).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingSink {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl NotificationSink for CountingSink {
        fn name(&self) -> &str {
            "counting"
        }

        async fn send(&self, _message: &str, _severity: Severity, _timeout: Duration) -> Result<(), String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn normal_send_returns_quickly_and_delivers_async() {
        let calls = Arc::new(AtomicUsize::new(0));
        let latch = ShutdownLatch::new();
        let dispatcher = Arc::new(Dispatcher::new(
            vec![Arc::new(CountingSink { calls: calls.clone() })],
            latch,
            DispatcherConfig::default(),
        ));
        dispatcher.start().await;

        let started = tokio::time::Instant::now();
        dispatcher.send("hello", Severity::Info, false).await;
        assert!(started.elapsed() < Duration::from_millis(100));

        dispatcher.stop().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn latched_send_is_synchronous_before_returning() {
        let calls = Arc::new(AtomicUsize::new(0));
        let latch = ShutdownLatch::new();
        latch.set();
        let dispatcher = Arc::new(Dispatcher::new(
            vec![Arc::new(CountingSink { calls: calls.clone() })],
            latch,
            DispatcherConfig {
                post_latch_settle: Duration::from_millis(1),
                ..DispatcherConfig::default()
            },
        ));
        dispatcher.send("shutting down", Severity::Failure, false).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn queue_drops_oldest_when_full() {
        let calls = Arc::new(AtomicUsize::new(0));
        let latch = ShutdownLatch::new();
        let dispatcher = Arc::new(Dispatcher::new(
            vec![Arc::new(CountingSink { calls: calls.clone() })],
            latch,
            DispatcherConfig {
                queue_capacity: 2,
                ..DispatcherConfig::default()
            },
        ));
        // Don't start the worker so messages pile up in the queue.
        dispatcher.send("one", Severity::Info, false).await;
        dispatcher.send("two", Severity::Info, false).await;
        dispatcher.send("three", Severity::Info, false).await;
        let messages = dispatcher.queue.messages.lock().await;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages.front().unwrap().text, "two");
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let latch = ShutdownLatch::new();
        let dispatcher = Arc::new(Dispatcher::new(
            vec![Arc::new(CountingSink {
                calls: Arc::new(AtomicUsize::new(0)),
            })],
            latch,
            DispatcherConfig::default(),
        ));
        dispatcher.start().await;
        dispatcher.start().await;
        assert!(dispatcher.worker.lock().await.is_some());
        dispatcher.stop().await;
    }

    #[tokio::test]
    async fn stop_without_start_does_not_hang() {
        let latch = ShutdownLatch::new();
        let dispatcher = Arc::new(Dispatcher::new(Vec::new(), latch, DispatcherConfig::default()));
        dispatcher.stop().await;
    }
}
