//! Best-effort fan-out of session events
//!
//! Two audiences:
//! - UI surfaces subscribe to a `tokio::sync::broadcast` channel.
//! - Observer contexts register an `ObserverLink`; a single dispatcher task
//!   delivers to them one event at a time, in publish order.
//!
//! Delivery is never confirmed or retried. An unreachable observer, one that
//! does not answer within the delivery timeout, or a lagging surface simply
//! misses the event.

use super::events::SessionEvent;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};

const SURFACE_CAPACITY: usize = 64;

/// How long the dispatcher waits on one observer before skipping it.
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("observer unreachable: {0}")]
    Unreachable(String),
    #[error("delivery failed: {0}")]
    Failed(String),
}

/// A message channel into one observer context.
#[async_trait]
pub trait ObserverLink: Send + Sync {
    /// Stable identifier of the observer context.
    fn id(&self) -> &str;

    async fn deliver(&self, event: &SessionEvent) -> Result<(), DeliveryError>;
}

enum Envelope {
    Broadcast(Arc<SessionEvent>),
    Direct {
        observer_id: String,
        event: SessionEvent,
    },
    Flush(oneshot::Sender<()>),
}

type Observers = Arc<DashMap<String, Arc<dyn ObserverLink>>>;

pub struct BroadcastBus {
    surfaces: broadcast::Sender<SessionEvent>,
    observers: Observers,
    queue: mpsc::UnboundedSender<Envelope>,
}

impl BroadcastBus {
    /// Create the bus and spawn its dispatcher. Must be called inside a
    /// tokio runtime; the dispatcher exits when the bus is dropped.
    pub fn new() -> Self {
        Self::with_delivery_timeout(DEFAULT_DELIVERY_TIMEOUT)
    }

    /// Like `new`, with a custom bound on each observer delivery.
    pub fn with_delivery_timeout(timeout: Duration) -> Self {
        let (surfaces, _) = broadcast::channel(SURFACE_CAPACITY);
        let observers: Observers = Arc::new(DashMap::new());
        let (queue, rx) = mpsc::unbounded_channel();
        tokio::spawn(dispatch(rx, Arc::clone(&observers), timeout));
        Self {
            surfaces,
            observers,
            queue,
        }
    }

    /// Listen as a UI surface. Only events published after this call arrive.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.surfaces.subscribe()
    }

    /// Register an observer, replacing any previous link with the same id.
    pub fn attach_observer(&self, link: Arc<dyn ObserverLink>) {
        let id = link.id().to_string();
        tracing::debug!(observer = %id, "observer attached");
        self.observers.insert(id, link);
    }

    pub fn detach_observer(&self, id: &str) -> bool {
        self.observers.remove(id).is_some()
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Fan `event` out to every surface and observer. Never blocks.
    pub fn publish(&self, event: SessionEvent) {
        tracing::debug!(kind = event.kind(), "publishing event");
        // No subscribers is not an error
        let _ = self.surfaces.send(event.clone());
        let _ = self.queue.send(Envelope::Broadcast(Arc::new(event)));
    }

    /// Deliver `event` to one observer only, if it is attached.
    pub fn send_to(&self, observer_id: &str, event: SessionEvent) {
        let _ = self.queue.send(Envelope::Direct {
            observer_id: observer_id.to_string(),
            event,
        });
    }

    /// Wait until every event queued before this call has been handed to
    /// the observers.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.queue.send(Envelope::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }
}

async fn dispatch(
    mut rx: mpsc::UnboundedReceiver<Envelope>,
    observers: Observers,
    timeout: Duration,
) {
    while let Some(envelope) = rx.recv().await {
        match envelope {
            Envelope::Broadcast(event) => {
                // Snapshot the links so no map guard is held across an await
                let links: Vec<Arc<dyn ObserverLink>> =
                    observers.iter().map(|entry| Arc::clone(entry.value())).collect();
                for link in links {
                    deliver(&*link, &event, timeout).await;
                }
            }
            Envelope::Direct { observer_id, event } => {
                let link = observers.get(&observer_id).map(|entry| Arc::clone(entry.value()));
                match link {
                    Some(link) => deliver(&*link, &event, timeout).await,
                    None => tracing::debug!(observer = %observer_id, "no such observer, skipped"),
                }
            }
            Envelope::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

async fn deliver(link: &dyn ObserverLink, event: &SessionEvent, timeout: Duration) {
    match tokio::time::timeout(timeout, link.deliver(event)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::debug!(observer = link.id(), kind = event.kind(), error = %e, "delivery skipped");
        }
        Err(_) => {
            tracing::warn!(
                observer = link.id(),
                kind = event.kind(),
                timeout_ms = timeout.as_millis() as u64,
                "observer did not answer, delivery skipped"
            );
        }
    }
}
