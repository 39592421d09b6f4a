//! Event processor
//!
//! The one piece of shared mutable state in the crate. Events arrive from the
//! delivery path on their own schedule; command issuers ask for the event that
//! completes a command they sent. The two meet in a registry keyed by
//! (call connection id, operation context).
//!
//! # Delivery rules
//!
//! - An event that finds a matching waiter is handed to exactly one of them,
//!   oldest waiter first.
//! - An event that finds no waiter is retained, so a wait registered after the
//!   event arrived still resolves. Retention is bounded by count (oldest
//!   evicted first) and by age.
//! - A waiter that times out or is cancelled is removed. If an event reached it
//!   in the same instant, that event goes back into the registry instead of
//!   being lost.
//!
//! Insert, match and removal all happen under one mutex, which is never held
//! across an await point.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use rvoip_call_automation::events::{CallAutomationEventKind, EventProcessor, InboundEvent};
//! use rvoip_call_automation::config::EventRetentionConfig;
//! use rvoip_call_automation::types::{CallConnectionId, OperationContext};
//!
//! # tokio_test_block_on(async {
//! let processor = EventProcessor::new(EventRetentionConfig::default(), 16);
//! let call = CallConnectionId::new("call-1");
//! let context = OperationContext::from("op-1");
//!
//! processor.ingest(InboundEvent::new(
//!     CallAutomationEventKind::AddParticipantSucceeded,
//!     call.clone(),
//!     Some(context.clone()),
//! ));
//!
//! let event = processor.wait_for(&call, &context, Duration::from_secs(1)).await.unwrap();
//! assert_eq!(event.kind, CallAutomationEventKind::AddParticipantSucceeded);
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{broadcast, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::EventRetentionConfig;
use crate::errors::{CallAutomationError, Result};
use crate::types::{CallConnectionId, CorrelationKey, OperationContext};

use super::parser;
use super::types::{CallAutomationEventKind, InboundEvent};

/// Predicate narrowing which events under a key a waiter accepts
pub type EventFilter = Arc<dyn Fn(&InboundEvent) -> bool + Send + Sync>;

/// Handler invoked for every matching event on a call
pub type OngoingHandler = Arc<dyn Fn(&InboundEvent) + Send + Sync>;

type EventCallback = Box<dyn FnOnce(InboundEvent) + Send>;

/// Handle for a registered callback or ongoing handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Point-in-time counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventProcessorStats {
    pub retained_events: usize,
    pub pending_waiters: usize,
    pub ongoing_handlers: usize,
    pub delivered: u64,
    pub evicted: u64,
    pub expired: u64,
}

enum Delivery {
    Channel(oneshot::Sender<InboundEvent>),
    Callback(EventCallback),
}

struct Waiter {
    id: u64,
    filter: Option<EventFilter>,
    delivery: Delivery,
}

impl Waiter {
    fn accepts(&self, event: &InboundEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }
}

struct RetainedEvent {
    seq: u64,
    event: InboundEvent,
    retained_at: Instant,
}

#[derive(Default)]
struct Registry {
    retained: HashMap<CorrelationKey, VecDeque<RetainedEvent>>,
    /// Arrival order for eviction; may hold entries that were already claimed
    arrival: VecDeque<(u64, CorrelationKey)>,
    retained_count: usize,
    waiters: HashMap<CorrelationKey, Vec<Waiter>>,
    waiter_keys: HashMap<u64, CorrelationKey>,
    next_seq: u64,
}

impl Registry {
    fn is_live(&self, seq: u64, key: &CorrelationKey) -> bool {
        self.retained
            .get(key)
            .map_or(false, |queue| queue.iter().any(|r| r.seq == seq))
    }

    fn remove_retained(&mut self, seq: u64, key: &CorrelationKey) -> Option<RetainedEvent> {
        let queue = self.retained.get_mut(key)?;
        let position = queue.iter().position(|r| r.seq == seq)?;
        let removed = queue.remove(position);
        if queue.is_empty() {
            self.retained.remove(key);
        }
        if removed.is_some() {
            self.retained_count -= 1;
        }
        removed
    }

    fn take_matching(&mut self, key: &CorrelationKey, filter: Option<&EventFilter>) -> Option<InboundEvent> {
        let queue = self.retained.get(key)?;
        let seq = queue
            .iter()
            .find(|r| filter.map_or(true, |f| f(&r.event)))
            .map(|r| r.seq)?;
        self.remove_retained(seq, key).map(|r| r.event)
    }

    fn retain(&mut self, key: CorrelationKey, event: InboundEvent, now: Instant) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.arrival.push_back((seq, key.clone()));
        self.retained.entry(key).or_default().push_back(RetainedEvent {
            seq,
            event,
            retained_at: now,
        });
        self.retained_count += 1;
    }

    fn add_waiter(&mut self, key: CorrelationKey, waiter: Waiter) {
        self.waiter_keys.insert(waiter.id, key.clone());
        self.waiters.entry(key).or_default().push(waiter);
    }

    fn remove_waiter(&mut self, id: u64) -> Option<Waiter> {
        let key = self.waiter_keys.remove(&id)?;
        let waiters = self.waiters.get_mut(&key)?;
        let position = waiters.iter().position(|w| w.id == id)?;
        let waiter = waiters.remove(position);
        if waiters.is_empty() {
            self.waiters.remove(&key);
        }
        Some(waiter)
    }

    /// Pop the oldest waiter under `key` that accepts `event`
    fn take_waiter(&mut self, key: &CorrelationKey, event: &InboundEvent) -> Option<Waiter> {
        let waiters = self.waiters.get_mut(key)?;
        let position = waiters.iter().position(|w| w.accepts(event))?;
        let waiter = waiters.remove(position);
        if waiters.is_empty() {
            self.waiters.remove(key);
        }
        self.waiter_keys.remove(&waiter.id);
        Some(waiter)
    }

    fn pending_waiters(&self) -> usize {
        self.waiter_keys.len()
    }
}

struct ProcessorInner {
    registry: Mutex<Registry>,
    retention: EventRetentionConfig,
    ongoing: DashMap<CallConnectionId, Vec<(u64, CallAutomationEventKind, OngoingHandler)>>,
    broadcast: broadcast::Sender<InboundEvent>,
    next_id: AtomicU64,
    delivered: AtomicU64,
    evicted: AtomicU64,
    expired: AtomicU64,
}

impl ProcessorInner {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Drop expired entries and enforce the count bound; caller holds the lock
    fn enforce_retention(&self, registry: &mut Registry, now: Instant) {
        while let Some((seq, key)) = registry.arrival.front().cloned() {
            let live = registry.is_live(seq, &key);
            if !live {
                registry.arrival.pop_front();
                continue;
            }
            let over_capacity = registry.retained_count > self.retention.max_retained_events;
            let expired = registry
                .retained
                .get(&key)
                .and_then(|queue| queue.iter().find(|r| r.seq == seq))
                .map_or(false, |r| now.duration_since(r.retained_at) >= self.retention.retention_ttl);
            if !over_capacity && !expired {
                break;
            }
            registry.arrival.pop_front();
            if registry.remove_retained(seq, &key).is_some() {
                if over_capacity {
                    self.evicted.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!("Evicted unclaimed event for {} (retention full)", key);
                } else {
                    self.expired.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!("Expired unclaimed event for {}", key);
                }
            }
        }

        // Claimed entries behind a live one are only skipped lazily; compact
        // when they start to dominate.
        if registry.arrival.len() > registry.retained_count.saturating_mul(2).max(64) {
            let Registry { arrival, retained, .. } = registry;
            arrival.retain(|(seq, key)| {
                retained
                    .get(key)
                    .map_or(false, |queue| queue.iter().any(|r| r.seq == *seq))
            });
        }
    }

    /// Hand an event to a waiter or retain it. Returns a callback to run once
    /// the lock has been released.
    fn deliver_or_retain(&self, key: CorrelationKey, mut event: InboundEvent) -> Option<(EventCallback, InboundEvent)> {
        let mut registry = self.registry.lock();
        let now = Instant::now();
        self.enforce_retention(&mut registry, now);

        while let Some(waiter) = registry.take_waiter(&key, &event) {
            match waiter.delivery {
                Delivery::Channel(sender) => match sender.send(event) {
                    Ok(()) => {
                        self.delivered.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!("Delivered event for {} to waiter {}", key, waiter.id);
                        return None;
                    }
                    // The waiter went away between registering and now.
                    Err(returned) => event = returned,
                },
                Delivery::Callback(callback) => {
                    self.delivered.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!("Delivered event for {} to callback {}", key, waiter.id);
                    return Some((callback, event));
                }
            }
        }

        tracing::debug!("Retaining unclaimed {} event for {}", event.kind, key);
        registry.retain(key, event, now);
        self.enforce_retention(&mut registry, now);
        None
    }
}

/// Shared registry matching asynchronously delivered events to the commands
/// that caused them
///
/// Cheap to clone; all clones share one registry. Construct one per client
/// and hand it to every call connection.
#[derive(Clone)]
pub struct EventProcessor {
    inner: Arc<ProcessorInner>,
}

impl std::fmt::Debug for EventProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventProcessor")
            .field("retention", &self.inner.retention)
            .field("stats", &self.stats())
            .finish()
    }
}

impl EventProcessor {
    pub fn new(retention: EventRetentionConfig, broadcast_capacity: usize) -> Self {
        let (broadcast, _) = broadcast::channel(broadcast_capacity.max(1));
        Self {
            inner: Arc::new(ProcessorInner {
                registry: Mutex::new(Registry::default()),
                retention,
                ongoing: DashMap::new(),
                broadcast,
                next_id: AtomicU64::new(1),
                delivered: AtomicU64::new(0),
                evicted: AtomicU64::new(0),
                expired: AtomicU64::new(0),
            }),
        }
    }

    /// Record an arriving event.
    ///
    /// The event is published to broadcast subscribers and ongoing handlers
    /// first, then correlated if it carries an operation context.
    pub fn ingest(&self, event: InboundEvent) {
        tracing::debug!(
            "Ingesting {} for call {} (operation context {:?})",
            event.kind,
            event.call_connection_id,
            event.operation_context.as_ref().map(OperationContext::as_str)
        );

        let _ = self.inner.broadcast.send(event.clone());
        self.run_ongoing_handlers(&event);

        let Some(key) = event.correlation_key() else {
            return;
        };
        if let Some((callback, event)) = self.inner.deliver_or_retain(key, event) {
            callback(event);
        }
    }

    /// Normalise a raw webhook body and ingest every event in it.
    ///
    /// Returns the number of events ingested. Nothing is ingested if any entry
    /// fails to parse.
    pub fn process_events(&self, body: &str) -> Result<usize> {
        let events = parser::parse_events(body).map_err(|e| {
            tracing::warn!("Dropping undecodable event delivery: {}", e);
            e
        })?;
        let count = events.len();
        for event in events {
            self.ingest(event);
        }
        Ok(count)
    }

    /// Wait for the next event under (call, context)
    pub async fn wait_for(
        &self,
        call_connection_id: &CallConnectionId,
        operation_context: &OperationContext,
        timeout: Duration,
    ) -> Result<InboundEvent> {
        self.wait(call_connection_id, operation_context, None, timeout, None).await
    }

    /// Wait for the next event under (call, context) accepted by `filter`
    pub async fn wait_for_event(
        &self,
        call_connection_id: &CallConnectionId,
        operation_context: &OperationContext,
        filter: EventFilter,
        timeout: Duration,
    ) -> Result<InboundEvent> {
        self.wait(call_connection_id, operation_context, Some(filter), timeout, None)
            .await
    }

    /// Like [`wait_for_event`](Self::wait_for_event), released early when
    /// `cancel` fires
    pub async fn wait_for_event_with_cancellation(
        &self,
        call_connection_id: &CallConnectionId,
        operation_context: &OperationContext,
        filter: Option<EventFilter>,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Result<InboundEvent> {
        self.wait(call_connection_id, operation_context, filter, timeout, Some(cancel))
            .await
    }

    async fn wait(
        &self,
        call_connection_id: &CallConnectionId,
        operation_context: &OperationContext,
        filter: Option<EventFilter>,
        timeout: Duration,
        cancel: Option<CancellationToken>,
    ) -> Result<InboundEvent> {
        let key = CorrelationKey::new(call_connection_id.clone(), operation_context.clone());
        let id = self.inner.next_id();

        let receiver = {
            let mut registry = self.inner.registry.lock();
            self.inner.enforce_retention(&mut registry, Instant::now());
            if let Some(event) = registry.take_matching(&key, filter.as_ref()) {
                self.inner.delivered.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Event for {} was already retained", key);
                return Ok(event);
            }
            let (sender, receiver) = oneshot::channel();
            registry.add_waiter(
                key.clone(),
                Waiter {
                    id,
                    filter,
                    delivery: Delivery::Channel(sender),
                },
            );
            receiver
        };

        let mut pending = PendingWait {
            inner: Arc::clone(&self.inner),
            key: key.clone(),
            id,
            receiver,
        };

        let cancelled = async {
            match &cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            received = &mut pending.receiver => match received {
                Ok(event) => Ok(event),
                Err(_) => Err(CallAutomationError::Cancelled {
                    call_connection_id: key.call_connection_id,
                    operation_context: key.operation_context,
                }),
            },
            _ = tokio::time::sleep(timeout) => {
                tracing::debug!("Wait for {} timed out after {:?}", key, timeout);
                Err(CallAutomationError::CorrelationTimeout {
                    call_connection_id: key.call_connection_id,
                    operation_context: key.operation_context,
                    timeout,
                })
            }
            _ = cancelled => {
                tracing::debug!("Wait for {} cancelled", key);
                Err(CallAutomationError::Cancelled {
                    call_connection_id: key.call_connection_id,
                    operation_context: key.operation_context,
                })
            }
        }
    }

    /// Run `callback` once with the next event under (call, context).
    ///
    /// Fires immediately if a matching event is already retained. The
    /// callback runs on the thread that ingests the event and must not block.
    pub fn on_operation_event<F>(
        &self,
        call_connection_id: &CallConnectionId,
        operation_context: &OperationContext,
        filter: Option<EventFilter>,
        callback: F,
    ) -> SubscriptionId
    where
        F: FnOnce(InboundEvent) + Send + 'static,
    {
        let key = CorrelationKey::new(call_connection_id.clone(), operation_context.clone());
        let id = self.inner.next_id();

        let retained = {
            let mut registry = self.inner.registry.lock();
            self.inner.enforce_retention(&mut registry, Instant::now());
            match registry.take_matching(&key, filter.as_ref()) {
                Some(event) => Some(event),
                None => {
                    registry.add_waiter(
                        key,
                        Waiter {
                            id,
                            filter,
                            delivery: Delivery::Callback(Box::new(callback)),
                        },
                    );
                    return SubscriptionId(id);
                }
            }
        };

        if let Some(event) = retained {
            self.inner.delivered.fetch_add(1, Ordering::Relaxed);
            callback(event);
        }
        SubscriptionId(id)
    }

    /// Cancel a pending callback; false if it already fired or never existed
    pub fn cancel_subscription(&self, subscription: SubscriptionId) -> bool {
        self.inner.registry.lock().remove_waiter(subscription.0).is_some()
    }

    /// Invoke `handler` for every `kind` event on a call until detached or the
    /// call disconnects
    pub fn attach_ongoing_handler<F>(
        &self,
        call_connection_id: &CallConnectionId,
        kind: CallAutomationEventKind,
        handler: F,
    ) -> SubscriptionId
    where
        F: Fn(&InboundEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_id();
        self.inner
            .ongoing
            .entry(call_connection_id.clone())
            .or_default()
            .push((id, kind, Arc::new(handler)));
        SubscriptionId(id)
    }

    pub fn detach_ongoing_handler(&self, call_connection_id: &CallConnectionId, subscription: SubscriptionId) -> bool {
        let mut removed = false;
        if let Some(mut handlers) = self.inner.ongoing.get_mut(call_connection_id) {
            let before = handlers.len();
            handlers.retain(|(id, _, _)| *id != subscription.0);
            removed = handlers.len() != before;
        }
        self.inner
            .ongoing
            .remove_if(call_connection_id, |_, handlers| handlers.is_empty());
        removed
    }

    fn run_ongoing_handlers(&self, event: &InboundEvent) {
        let handlers: Vec<OngoingHandler> = match self.inner.ongoing.get(&event.call_connection_id) {
            Some(entry) => entry
                .iter()
                .filter(|(_, kind, _)| *kind == event.kind)
                .map(|(_, _, handler)| Arc::clone(handler))
                .collect(),
            None => Vec::new(),
        };
        for handler in handlers {
            handler(event);
        }

        if event.kind == CallAutomationEventKind::CallDisconnected
            && self.inner.ongoing.remove(&event.call_connection_id).is_some()
        {
            tracing::debug!("Detached ongoing handlers for disconnected call {}", event.call_connection_id);
        }
    }

    /// Receive a copy of every ingested event
    pub fn subscribe(&self) -> broadcast::Receiver<InboundEvent> {
        self.inner.broadcast.subscribe()
    }

    pub fn stats(&self) -> EventProcessorStats {
        let (retained_events, pending_waiters) = {
            let registry = self.inner.registry.lock();
            (registry.retained_count, registry.pending_waiters())
        };
        EventProcessorStats {
            retained_events,
            pending_waiters,
            ongoing_handlers: self.inner.ongoing.iter().map(|entry| entry.len()).sum(),
            delivered: self.inner.delivered.load(Ordering::Relaxed),
            evicted: self.inner.evicted.load(Ordering::Relaxed),
            expired: self.inner.expired.load(Ordering::Relaxed),
        }
    }
}

/// Registration of one in-flight wait; cleans up on every exit path
struct PendingWait {
    inner: Arc<ProcessorInner>,
    key: CorrelationKey,
    id: u64,
    receiver: oneshot::Receiver<InboundEvent>,
}

impl Drop for PendingWait {
    fn drop(&mut self) {
        self.inner.registry.lock().remove_waiter(self.id);

        // An event may have been sent after we stopped listening. Put it back
        // so a later wait can still claim it.
        self.receiver.close();
        if let Ok(event) = self.receiver.try_recv() {
            tracing::debug!("Returning undelivered event for {} to the registry", self.key);
            self.inner.delivered.fetch_sub(1, Ordering::Relaxed);
            if let Some((callback, event)) = self.inner.deliver_or_retain(self.key.clone(), event) {
                callback(event);
            }
        }
    }
}
