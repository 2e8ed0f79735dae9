//! Stream publishing
//!
//! The publisher numbers every observation it receives and fans the resulting
//! events out through a [`Hub`]. Subscribers each get their own broadcast
//! receiver, so a slow one lags and loses events instead of holding up the
//! others or the extraction loop.

use log::{debug, info, warn};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use crate::engine::Observation;

const BROADCAST_CAPACITY: usize = 1024;
const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(1);
/// Upper bound on replayed events, whatever `steps` says
pub const MAX_BACKLOG: usize = 100_000;

/// Replay window for `steps` values of `fields` series
pub fn backlog_len(steps: usize, fields: usize) -> usize {
    steps.saturating_mul(fields).min(MAX_BACKLOG)
}

/// One numbered, serialized observation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEvent {
    pub id: u64,
    pub data: String,
}

struct HubInner {
    tx: broadcast::Sender<StreamEvent>,
    backlog: VecDeque<StreamEvent>,
    backlog_capacity: usize,
}

/// Fan-out point shared by the publisher and the transport
///
/// Keeps up to `backlog_capacity` recent events (at most [`MAX_BACKLOG`]) so late
/// subscribers can replay them.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<Mutex<HubInner>>,
}

impl Hub {
    pub fn new(backlog_capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            inner: Arc::new(Mutex::new(HubInner {
                tx,
                backlog: VecDeque::new(),
                backlog_capacity: backlog_capacity.min(MAX_BACKLOG),
            })),
        }
    }

    /// Recent events plus a receiver for everything published afterwards
    pub fn subscribe(&self) -> (Vec<StreamEvent>, broadcast::Receiver<StreamEvent>) {
        let inner = self.lock();
        let backlog = inner.backlog.iter().cloned().collect();
        (backlog, inner.tx.subscribe())
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().tx.receiver_count()
    }

    fn publish(&self, event: StreamEvent) {
        let mut inner = self.lock();
        if inner.backlog_capacity > 0 {
            if inner.backlog.len() == inner.backlog_capacity {
                inner.backlog.pop_front();
            }
            inner.backlog.push_back(event.clone());
        }
        // No subscribers is not an error; the event is simply not delivered.
        let _ = inner.tx.send(event);
    }

    fn lock(&self) -> MutexGuard<'_, HubInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Turns observations into stream events with ids 1, 2, 3, ...
pub struct Publisher {
    hub: Hub,
    next_id: u64,
}

impl Publisher {
    pub fn new(hub: Hub) -> Self {
        Self { hub, next_id: 1 }
    }

    /// Number and publish one observation, returning its event id
    ///
    /// An observation that cannot be serialized is logged and dropped without
    /// consuming an id.
    pub fn publish(&mut self, observation: &Observation) -> Option<u64> {
        let data = match serde_json::to_string(observation) {
            Ok(data) => data,
            Err(e) => {
                warn!("Failed to JSONify value {:?}: {}", observation, e);
                return None;
            }
        };

        let id = self.next_id;
        self.next_id += 1;
        self.hub.publish(StreamEvent { id, data });
        Some(id)
    }

    /// Publish until the observation queue closes
    ///
    /// Once `shutdown` fires the publisher stops its housekeeping and keeps draining
    /// the queue until the producer drops its sender, so a document being handed
    /// over is published whole. Returns the number of events published.
    pub async fn run(mut self, mut observations: mpsc::Receiver<Observation>, shutdown: CancellationToken) -> u64 {
        let mut housekeeping = tokio::time::interval(HOUSEKEEPING_INTERVAL);
        housekeeping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut draining = false;

        loop {
            tokio::select! {
                observation = observations.recv() => match observation {
                    Some(observation) => {
                        self.publish(&observation);
                    }
                    None => {
                        debug!("observation queue closed");
                        break;
                    }
                },
                _ = shutdown.cancelled(), if !draining => {
                    info!("Publisher shutting down, draining queue");
                    draining = true;
                }
                _ = housekeeping.tick(), if !draining => {
                    debug!(
                        "published {} events to {} subscribers",
                        self.published(),
                        self.hub.subscriber_count()
                    );
                }
            }
        }

        self.published()
    }

    pub fn published(&self) -> u64 {
        self.next_id - 1
    }
}
