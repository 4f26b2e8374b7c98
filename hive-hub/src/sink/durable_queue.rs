/********************************************************************************
 * Copyright (c) 2024 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

//! Append-only outbound queue shared by every subscription of one session.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};
use tracing::{debug, trace};

use crate::error::HubError;
use crate::model::{HubMessage, MessageIdentity};
use crate::observability::{events, fields};
use crate::registry::{SubscriptionId, SubscriptionRegistry, WeakRegistry};
use crate::session::OutboundFrame;

const COMPONENT: &str = "durable_queue_sink";

/// Receiving half drained by the transport writer.
pub type OutboundReceiver = mpsc::UnboundedReceiver<OutboundFrame>;

/// Exclusive access to the queue. Holding it serializes enqueue order for the session.
pub struct OutboundQueue {
    sender: mpsc::UnboundedSender<OutboundFrame>,
}

impl OutboundQueue {
    /// Appends a frame. Returns `false` when the writer has gone away.
    pub fn enqueue(&mut self, frame: OutboundFrame) -> bool {
        self.sender.send(frame).is_ok()
    }
}

/// Backlog identities enqueued for one subscription, kept until live traffic passes the
/// newest of them.
#[derive(Default)]
struct DeliveredBacklog {
    identities: HashSet<MessageIdentity>,
    horizon: Option<DateTime<Utc>>,
}

impl DeliveredBacklog {
    fn record(&mut self, messages: &[HubMessage]) {
        for message in messages {
            self.identities.insert(message.identity());
            let at = message.timestamp();
            if self.horizon.map_or(true, |horizon| at > horizon) {
                self.horizon = Some(at);
            }
        }
    }

    /// `true` when `message` was already delivered with the backlog.
    fn suppress(&mut self, message: &HubMessage) -> bool {
        if self.identities.remove(&message.identity()) {
            return true;
        }
        if self.horizon.is_some_and(|horizon| message.timestamp() > horizon) {
            self.identities = HashSet::new();
            self.horizon = None;
        }
        false
    }
}

/// Durable sink: `push` appends, it never completes. `close` is permanent.
pub struct DurableQueueSink {
    label: String,
    queue: AsyncMutex<OutboundQueue>,
    closed: AtomicBool,
    bindings: Mutex<HashMap<SubscriptionId, DeliveredBacklog>>,
    registry: WeakRegistry,
}

impl DurableQueueSink {
    pub fn new(
        label: impl Into<String>,
        registry: &SubscriptionRegistry,
    ) -> (Arc<Self>, OutboundReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                label: label.into(),
                queue: AsyncMutex::new(OutboundQueue { sender }),
                closed: AtomicBool::new(false),
                bindings: Mutex::new(HashMap::new()),
                registry: registry.downgrade(),
            }),
            receiver,
        )
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn lock_bindings(&self) -> MutexGuard<'_, HashMap<SubscriptionId, DeliveredBacklog>> {
        self.bindings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Acquires the session-scoped lock.
    pub async fn lock(&self) -> Result<AsyncMutexGuard<'_, OutboundQueue>, HubError> {
        let queue = self.queue.lock().await;
        if self.is_closed() {
            return Err(HubError::SessionClosed);
        }
        Ok(queue)
    }

    /// Binds a subscription id so live pushes for it are accepted.
    pub(crate) fn bind(&self, id: SubscriptionId) -> Result<(), HubError> {
        if self.is_closed() {
            return Err(HubError::SessionClosed);
        }
        self.lock_bindings().entry(id).or_default();
        Ok(())
    }

    pub(crate) fn unbind(&self, id: &SubscriptionId) -> bool {
        self.lock_bindings().remove(id).is_some()
    }

    pub fn is_bound(&self, id: &SubscriptionId) -> bool {
        self.lock_bindings().contains_key(id)
    }

    pub fn bound_ids(&self) -> Vec<SubscriptionId> {
        self.lock_bindings().keys().copied().collect()
    }

    /// Number of backlog identities still held for `id`.
    #[cfg(test)]
    pub(crate) fn pending_backlog(&self, id: &SubscriptionId) -> usize {
        self.lock_bindings()
            .get(id)
            .map_or(0, |seen| seen.identities.len())
    }

    /// Enqueues backlog messages in timestamp order and remembers their identities, so a
    /// live push of the same message is suppressed. The identities are dropped on the first
    /// live push newer than the whole backlog.
    ///
    /// The caller holds the queue lock, so no live push can interleave ahead of these.
    pub fn enqueue_backlog(
        &self,
        queue: &mut OutboundQueue,
        subscription_id: SubscriptionId,
        mut messages: Vec<HubMessage>,
    ) -> usize {
        messages.sort_by(|left, right| {
            left.timestamp()
                .cmp(&right.timestamp())
                .then_with(|| left.id().cmp(&right.id()))
        });
        self.record_delivered(subscription_id, &messages);
        let count = messages.len();
        for message in messages {
            queue.enqueue(OutboundFrame::push(subscription_id, message));
        }
        count
    }

    /// Remembers messages handed to the client outside this queue, so live pushes of the
    /// same identity are suppressed. Call with the queue lock held.
    pub(crate) fn record_delivered(&self, subscription_id: SubscriptionId, messages: &[HubMessage]) {
        let mut bindings = self.lock_bindings();
        if let Some(seen) = bindings.get_mut(&subscription_id) {
            seen.record(messages);
        }
    }

    /// Appends one live message for `subscription_id`.
    ///
    /// Dropped when the sink is closed or the subscription is no longer bound; skipped when
    /// the backlog already carried it.
    pub async fn push(&self, subscription_id: SubscriptionId, message: HubMessage) -> bool {
        let mut queue = self.queue.lock().await;
        if self.is_closed() {
            trace!(
                event = events::SINK_PUSH_DROPPED,
                component = COMPONENT,
                session_id = %self.label,
                subscription_id = %subscription_id,
                reason = fields::REASON_SINK_CLOSED,
                "push dropped"
            );
            return false;
        }

        {
            let mut bindings = self.lock_bindings();
            let Some(seen) = bindings.get_mut(&subscription_id) else {
                trace!(
                    event = events::SINK_PUSH_DROPPED,
                    component = COMPONENT,
                    session_id = %self.label,
                    subscription_id = %subscription_id,
                    reason = fields::REASON_UNBOUND,
                    "push dropped"
                );
                return false;
            };
            if seen.suppress(&message) {
                debug!(
                    event = events::SINK_PUSH_DUPLICATE,
                    component = COMPONENT,
                    session_id = %self.label,
                    subscription_id = %subscription_id,
                    msg_id = message.id(),
                    "live push already delivered with backlog"
                );
                return false;
            }
        }

        queue.enqueue(OutboundFrame::push(subscription_id, message))
    }

    /// Marks the sink inactive and removes every bound subscription in one registry batch.
    ///
    /// Returns the number of subscriptions removed. Later calls are no-ops.
    pub fn close(&self) -> usize {
        if self.closed.swap(true, Ordering::AcqRel) {
            return 0;
        }
        let ids: Vec<SubscriptionId> = self.lock_bindings().drain().map(|(id, _)| id).collect();
        let removed = match self.registry.upgrade() {
            Some(registry) => registry.remove_subscriptions(&ids),
            None => 0,
        };
        debug!(
            event = events::SINK_CLOSED,
            component = COMPONENT,
            session_id = %self.label,
            bound = ids.len(),
            removed,
            "durable sink closed"
        );
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::DurableQueueSink;
    use crate::model::{DeviceNotification, HubMessage, MessageKind, Principal, SubscriptionFilter};
    use crate::registry::{Subscription, SubscriptionId, SubscriptionRegistry};
    use crate::session::OutboundFrame;
    use crate::sink::DeliverySink;
    use chrono::{TimeZone, Utc};

    fn notification(id: i64, at: i64) -> HubMessage {
        HubMessage::Notification(DeviceNotification {
            id,
            device_id: "dev1".to_string(),
            notification: "foo".to_string(),
            timestamp: Utc.timestamp_opt(at, 0).unwrap(),
            parameters: None,
            network_id: None,
            device_type_id: None,
        })
    }

    fn pushed_ids(frames: Vec<OutboundFrame>) -> Vec<i64> {
        frames
            .into_iter()
            .filter_map(|frame| match frame {
                OutboundFrame::Push(push) => Some(push.message.id()),
                OutboundFrame::Reply(_) => None,
            })
            .collect()
    }

    fn drain(receiver: &mut super::OutboundReceiver) -> Vec<OutboundFrame> {
        let mut frames = Vec::new();
        while let Ok(frame) = receiver.try_recv() {
            frames.push(frame);
        }
        frames
    }

    #[tokio::test]
    async fn push_requires_binding() {
        let registry = SubscriptionRegistry::new();
        let (sink, mut receiver) = DurableQueueSink::new("s1", &registry);
        let id = SubscriptionId::new();

        assert!(!sink.push(id, notification(1, 1)).await);
        sink.bind(id).expect("bind open sink");
        assert!(sink.push(id, notification(2, 2)).await);

        assert_eq!(pushed_ids(drain(&mut receiver)), vec![2]);
    }

    #[tokio::test]
    async fn backlog_is_ordered_and_suppresses_boundary_duplicate() {
        let registry = SubscriptionRegistry::new();
        let (sink, mut receiver) = DurableQueueSink::new("s1", &registry);
        let id = SubscriptionId::new();
        sink.bind(id).expect("bind open sink");

        {
            let mut queue = sink.lock().await.expect("open sink");
            sink.enqueue_backlog(
                &mut queue,
                id,
                vec![notification(3, 30), notification(1, 10), notification(2, 20)],
            );
        }
        assert!(!sink.push(id, notification(3, 30)).await);
        assert!(sink.push(id, notification(4, 40)).await);

        assert_eq!(pushed_ids(drain(&mut receiver)), vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn backlog_identities_are_dropped_once_live_traffic_passes_them() {
        let registry = SubscriptionRegistry::new();
        let (sink, mut receiver) = DurableQueueSink::new("s1", &registry);
        let id = SubscriptionId::new();
        sink.bind(id).expect("bind open sink");

        {
            let mut queue = sink.lock().await.expect("open sink");
            sink.enqueue_backlog(
                &mut queue,
                id,
                vec![notification(1, 10), notification(2, 20), notification(3, 30)],
            );
        }
        assert_eq!(sink.pending_backlog(&id), 3);

        assert!(!sink.push(id, notification(2, 20)).await);
        assert_eq!(sink.pending_backlog(&id), 2);
        assert!(sink.push(id, notification(4, 30)).await);
        assert_eq!(sink.pending_backlog(&id), 2);

        assert!(sink.push(id, notification(5, 31)).await);
        assert_eq!(sink.pending_backlog(&id), 0);
        assert!(sink.push(id, notification(6, 40)).await);

        assert_eq!(pushed_ids(drain(&mut receiver)), vec![1, 2, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn close_removes_bound_subscriptions_and_rejects_pushes() {
        let registry = SubscriptionRegistry::new();
        let (sink, _receiver) = DurableQueueSink::new("s1", &registry);
        let ids: Vec<SubscriptionId> = (0..3).map(|_| SubscriptionId::new()).collect();
        for id in &ids {
            sink.bind(*id).expect("bind open sink");
        }
        registry.insert_all(
            ids.iter()
                .map(|id| {
                    Subscription::new(
                        *id,
                        SubscriptionFilter::new(MessageKind::Notification),
                        Principal::new("alice"),
                        DeliverySink::Queue(sink.clone()),
                    )
                })
                .collect(),
        );
        assert_eq!(registry.count(), 3);

        assert_eq!(sink.close(), 3);
        assert_eq!(sink.close(), 0);
        assert_eq!(registry.count(), 0);
        assert!(!sink.push(ids[0], notification(1, 1)).await);
        assert!(sink.lock().await.is_err());
        assert!(sink.bind(SubscriptionId::new()).is_err());
    }
}
