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

//! Core subscribe/poll orchestration shared by long-poll, duplex and RPC callers.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::HubConfig;
use crate::engine::registration_guard::RegistrationGuard;
use crate::error::HubError;
use crate::gateway::{MessageQuery, MessageStore};
use crate::model::{
    CommandUpdate, DeviceCommand, DeviceRef, HubMessage, MessageId, NewMessage, Principal,
    SubscriptionFilter,
};
use crate::observability::{events, fields};
use crate::registry::{Subscription, SubscriptionId, SubscriptionRegistry};
use crate::sink::{DeliverySink, DurableQueueSink, Resolution, SingleResolutionSink};

const COMPONENT: &str = "subscription_engine";

/// A bounded wait for messages matching `filter` newer than `cursor`.
#[derive(Clone, Debug)]
pub struct PollRequest {
    pub filter: SubscriptionFilter,
    /// `None` means "now": only messages stored after registration.
    pub cursor: Option<DateTime<Utc>>,
    pub wait: Duration,
    pub take: usize,
    pub owner: Principal,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PollOutcome {
    Delivered(Vec<HubMessage>),
    TimedOut,
    Cancelled,
}

impl PollOutcome {
    /// Timeouts and cancellations carry no messages.
    pub fn into_messages(self) -> Vec<HubMessage> {
        match self {
            PollOutcome::Delivered(messages) => messages,
            PollOutcome::TimedOut | PollOutcome::Cancelled => Vec::new(),
        }
    }
}

/// A durable registration bound to a queue sink.
#[derive(Clone, Debug)]
pub struct SubscribeRequest {
    /// Caller-chosen id; generated when absent.
    pub subscription_id: Option<SubscriptionId>,
    pub filter: SubscriptionFilter,
    pub cursor: Option<DateTime<Utc>>,
    pub take: usize,
    pub owner: Principal,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Subscribed {
    pub subscription_id: SubscriptionId,
    /// Stored messages newer than the cursor, oldest first.
    pub backlog: Vec<HubMessage>,
}

enum Wake {
    Resolved(Result<Resolution, tokio::sync::oneshot::error::RecvError>),
    Elapsed,
    Disconnected,
}

/// Orchestrates registration, backlog and dispatch over one shared registry.
pub struct SubscriptionEngine {
    registry: SubscriptionRegistry,
    store: Arc<dyn MessageStore>,
    config: HubConfig,
}

impl SubscriptionEngine {
    pub fn new(store: Arc<dyn MessageStore>, config: HubConfig) -> Self {
        Self::with_registry(SubscriptionRegistry::new(), store, config)
    }

    pub fn with_registry(
        registry: SubscriptionRegistry,
        store: Arc<dyn MessageStore>,
        config: HubConfig,
    ) -> Self {
        Self {
            registry,
            store,
            config,
        }
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    fn register(&self, subscriptions: Vec<Subscription>) -> Result<RegistrationGuard, HubError> {
        let ids = subscriptions.iter().map(Subscription::id).collect();
        self.registry.try_insert_all(subscriptions)?;
        Ok(RegistrationGuard::new(self.registry.clone(), ids))
    }

    /// Waits for matching messages, resolving exactly once.
    pub async fn poll(&self, request: PollRequest) -> Result<PollOutcome, HubError> {
        self.poll_until(request, std::future::pending()).await
    }

    /// Like [`poll`](Self::poll), but `disconnected` completing cancels the wait.
    ///
    /// Dropping the returned future also cancels and unregisters.
    pub async fn poll_until<F>(
        &self,
        request: PollRequest,
        disconnected: F,
    ) -> Result<PollOutcome, HubError>
    where
        F: Future<Output = ()> + Send,
    {
        request.filter.validate()?;
        let PollRequest {
            filter,
            cursor,
            wait,
            take,
            owner,
        } = request;

        let query = MessageQuery::backlog(&filter, cursor.unwrap_or_else(Utc::now), take);
        let kind = filter.kind;

        // A zero wait never receives dispatch; the store alone answers it.
        if wait.is_zero() {
            let backlog = self.store.find(&query).await?;
            debug!(
                event = events::POLL_IMMEDIATE,
                component = COMPONENT,
                kind = %kind,
                count = backlog.len(),
                "zero-wait poll answered from store"
            );
            return Ok(if backlog.is_empty() {
                PollOutcome::TimedOut
            } else {
                PollOutcome::Delivered(backlog)
            });
        }

        let subscription_id = SubscriptionId::new();
        let (sink, mut receiver) = SingleResolutionSink::new(subscription_id, &self.registry);

        // Registration precedes the backlog read so nothing stored afterwards is missed.
        let _guard = self.register(vec![Subscription::new(
            subscription_id,
            filter,
            owner,
            DeliverySink::Single(sink.clone()),
        )])?;
        debug!(
            event = events::POLL_REGISTERED,
            component = COMPONENT,
            subscription_id = %subscription_id,
            kind = %kind,
            wait_ms = wait.as_millis() as u64,
            "poll registered"
        );

        match self.store.find(&query).await {
            Ok(backlog) if !backlog.is_empty() => {
                debug!(
                    event = events::POLL_BACKLOG_HIT,
                    component = COMPONENT,
                    subscription_id = %subscription_id,
                    count = backlog.len(),
                    "backlog resolves poll"
                );
                sink.resolve(backlog);
            }
            Ok(_) => {}
            Err(err) => {
                warn!(
                    event = events::POLL_BACKLOG_FAILED,
                    component = COMPONENT,
                    subscription_id = %subscription_id,
                    err = %err,
                    "backlog read failed"
                );
                sink.fail(err.clone());
                return Err(err);
            }
        }

        let disconnected = disconnected;
        tokio::pin!(disconnected);
        let wake = tokio::select! {
            resolution = &mut receiver => Wake::Resolved(resolution),
            _ = tokio::time::sleep(wait) => Wake::Elapsed,
            _ = &mut disconnected => Wake::Disconnected,
        };
        let resolution = match wake {
            Wake::Resolved(resolution) => resolution,
            Wake::Elapsed => {
                sink.time_out();
                receiver.await
            }
            Wake::Disconnected => {
                sink.cancel();
                receiver.await
            }
        };

        let outcome = match resolution {
            Ok(Resolution::Delivered(messages)) => PollOutcome::Delivered(messages),
            Ok(Resolution::TimedOut) => PollOutcome::TimedOut,
            Ok(Resolution::Cancelled) | Err(_) => PollOutcome::Cancelled,
            Ok(Resolution::Failed(err)) => return Err(err),
        };
        debug!(
            event = events::POLL_COMPLETE,
            component = COMPONENT,
            subscription_id = %subscription_id,
            outcome = outcome_label(&outcome),
            "poll complete"
        );
        Ok(outcome)
    }

    /// Registers a durable subscription on `sink` and reads its backlog.
    ///
    /// The backlog is returned, not enqueued; duplex sessions enqueue it while holding the
    /// session lock. Messages stored between registration and the backlog read may arrive
    /// both ways and are deduplicated by message identity downstream.
    pub async fn subscribe(
        &self,
        request: SubscribeRequest,
        sink: &Arc<DurableQueueSink>,
    ) -> Result<Subscribed, HubError> {
        request.filter.validate()?;
        let SubscribeRequest {
            subscription_id,
            filter,
            cursor,
            take,
            owner,
        } = request;
        let subscription_id = subscription_id.unwrap_or_default();
        if sink.is_bound(&subscription_id) {
            return Err(HubError::Conflict(format!(
                "subscription id {subscription_id} is already in use"
            )));
        }

        let query = MessageQuery::backlog(&filter, cursor.unwrap_or_else(Utc::now), take);
        sink.bind(subscription_id)?;
        let guard = match self.register(vec![Subscription::new(
            subscription_id,
            filter,
            owner,
            DeliverySink::Queue(sink.clone()),
        )]) {
            Ok(guard) => guard,
            Err(err) => {
                sink.unbind(&subscription_id);
                return Err(err);
            }
        };
        if sink.is_closed() {
            return Err(HubError::SessionClosed);
        }

        let backlog = match self.store.find(&query).await {
            Ok(backlog) => backlog,
            Err(err) => {
                warn!(
                    event = events::SUBSCRIBE_FAILED,
                    component = COMPONENT,
                    subscription_id = %subscription_id,
                    session_id = sink.label(),
                    err = %err,
                    "backlog read failed; registration rolled back"
                );
                return Err(err);
            }
        };

        guard.commit();
        info!(
            event = events::SUBSCRIBE_OK,
            component = COMPONENT,
            subscription_id = %subscription_id,
            session_id = sink.label(),
            backlog = backlog.len(),
            "durable subscription registered"
        );
        Ok(Subscribed {
            subscription_id,
            backlog,
        })
    }

    /// Removes subscriptions as one batch. Unknown ids are ignored.
    pub fn unsubscribe(&self, ids: &[SubscriptionId]) -> usize {
        let removed = self.registry.remove_subscriptions(ids);
        debug!(
            event = events::UNSUBSCRIBE_OK,
            component = COMPONENT,
            requested = ids.len(),
            removed,
            "unsubscribe applied"
        );
        removed
    }

    /// Persists a message and fans it out to every matching subscription.
    pub async fn publish(
        &self,
        message: NewMessage,
        device: &DeviceRef,
    ) -> Result<HubMessage, HubError> {
        let stored = match self.store.insert(message, device).await {
            Ok(stored) => stored,
            Err(err) => {
                warn!(
                    event = events::PUBLISH_FAILED,
                    component = COMPONENT,
                    err = %err,
                    "message insert failed"
                );
                return Err(err);
            }
        };
        debug!(
            event = events::PUBLISH_OK,
            component = COMPONENT,
            msg_id = stored.id(),
            message = %fields::format_message(&stored),
            "message stored"
        );
        self.dispatch(&stored).await;
        Ok(stored)
    }

    /// Persists a command status/result update and dispatches it on the update stream.
    pub async fn update_command(&self, update: CommandUpdate) -> Result<DeviceCommand, HubError> {
        let updated = self.store.update_command(update).await?;
        self.dispatch(&HubMessage::CommandUpdate(updated.clone()))
            .await;
        Ok(updated)
    }

    /// Delivers `message` to every matching active subscription. Returns deliveries made.
    pub async fn dispatch(&self, message: &HubMessage) -> usize {
        let targets = self.registry.lookup(message.kind(), message);
        if targets.is_empty() {
            return 0;
        }
        let delivered = join_all(
            targets
                .iter()
                .map(|subscription| subscription.deliver(message)),
        )
        .await
        .into_iter()
        .filter(|delivered| *delivered)
        .count();
        debug!(
            event = events::DISPATCH_FANOUT,
            component = COMPONENT,
            message = %fields::format_message(message),
            matched = targets.len(),
            delivered,
            "message dispatched"
        );
        delivered
    }

    pub async fn search(&self, query: &MessageQuery) -> Result<Vec<HubMessage>, HubError> {
        if query.take == 0 || query.take > self.config.max_take {
            return Err(HubError::validation(format!(
                "take must be between 1 and {}",
                self.config.max_take
            )));
        }
        self.store.find(query).await
    }

    pub async fn find_command(
        &self,
        command_id: MessageId,
    ) -> Result<Option<DeviceCommand>, HubError> {
        self.store.find_command(command_id).await
    }
}

fn outcome_label(outcome: &PollOutcome) -> &'static str {
    match outcome {
        PollOutcome::Delivered(_) => "delivered",
        PollOutcome::TimedOut => "timed_out",
        PollOutcome::Cancelled => "cancelled",
    }
}

#[cfg(test)]
mod tests {
    use super::{PollOutcome, PollRequest, SubscribeRequest, SubscriptionEngine};
    use crate::config::HubConfig;
    use crate::gateway::MessageStore;
    use crate::model::{MessageKind, Principal, SubscriptionFilter};
    use crate::session::OutboundFrame;
    use crate::sink::DurableQueueSink;
    use crate::testing::{device, notify, FailingStore, VecStore};
    use chrono::{Duration as ChronoDuration, Utc};
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Duration;

    fn poll_request(wait: Duration) -> PollRequest {
        PollRequest {
            filter: SubscriptionFilter::new(MessageKind::Notification)
                .with_devices(["dev1"])
                .with_names(["foo"]),
            cursor: None,
            wait,
            take: 100,
            owner: Principal::new("alice"),
        }
    }

    fn engine_with(store: Arc<dyn MessageStore>) -> Arc<SubscriptionEngine> {
        Arc::new(SubscriptionEngine::new(store, HubConfig::default()))
    }

    #[tokio::test(start_paused = true)]
    async fn zero_wait_with_empty_backlog_times_out_immediately() {
        let engine = engine_with(Arc::new(VecStore::default()));
        let outcome = engine
            .poll(poll_request(Duration::ZERO))
            .await
            .expect("poll succeeds");
        assert_eq!(outcome, PollOutcome::TimedOut);
        assert_eq!(engine.registry().version(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn live_event_resolves_waiting_poll() {
        let engine = engine_with(Arc::new(VecStore::default()));
        let waiter = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.poll(poll_request(Duration::from_secs(30))).await })
        };
        while engine.registry().count() == 0 {
            tokio::task::yield_now().await;
        }

        tokio::time::sleep(Duration::from_secs(2)).await;
        engine
            .publish(notify("dev1", "bar"), &device("dev1"))
            .await
            .expect("insert");
        let stored = engine
            .publish(notify("dev1", "foo"), &device("dev1"))
            .await
            .expect("insert");

        let outcome = waiter.await.expect("join").expect("poll succeeds");
        assert_eq!(outcome, PollOutcome::Delivered(vec![stored]));
        assert_eq!(engine.registry().count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn backlog_resolves_without_waiting() {
        let store = Arc::new(VecStore::default());
        let engine = engine_with(store.clone());
        let cursor = Utc::now() - ChronoDuration::seconds(10);
        let first = engine
            .publish(notify("dev1", "foo"), &device("dev1"))
            .await
            .expect("insert");

        let mut request = poll_request(Duration::from_secs(30));
        request.cursor = Some(cursor);
        let outcome = engine.poll(request).await.expect("poll succeeds");

        assert_eq!(outcome, PollOutcome::Delivered(vec![first]));
        assert_eq!(engine.registry().count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_yields_empty_and_unregisters() {
        let engine = engine_with(Arc::new(VecStore::default()));
        let outcome = engine
            .poll(poll_request(Duration::from_secs(5)))
            .await
            .expect("poll succeeds");
        assert_eq!(outcome, PollOutcome::TimedOut);
        assert!(outcome.into_messages().is_empty());
        assert_eq!(engine.registry().count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_cancels_and_unregisters() {
        let engine = engine_with(Arc::new(VecStore::default()));
        let (disconnect, disconnected) = tokio::sync::oneshot::channel::<()>();
        let waiter = {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .poll_until(poll_request(Duration::from_secs(30)), async move {
                        let _ = disconnected.await;
                    })
                    .await
            })
        };
        while engine.registry().count() == 0 {
            tokio::task::yield_now().await;
        }

        disconnect.send(()).expect("poll still waiting");
        let outcome = waiter.await.expect("join").expect("poll succeeds");
        assert_eq!(outcome, PollOutcome::Cancelled);
        assert_eq!(engine.registry().count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_poll_future_unregisters() {
        let engine = engine_with(Arc::new(VecStore::default()));
        let waiter = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.poll(poll_request(Duration::from_secs(30))).await })
        };
        while engine.registry().count() == 0 {
            tokio::task::yield_now().await;
        }

        waiter.abort();
        let _ = waiter.await;
        assert_eq!(engine.registry().count(), 0);
    }

    #[tokio::test]
    async fn store_failure_surfaces_and_unregisters() {
        let engine = engine_with(Arc::new(FailingStore));
        let err = engine
            .poll(poll_request(Duration::from_secs(30)))
            .await
            .expect_err("store failure propagates");
        assert_eq!(err.status_code(), 500);
        assert_eq!(engine.registry().count(), 0);
    }

    #[tokio::test]
    async fn invalid_filter_is_rejected_before_registration() {
        let store = Arc::new(VecStore::default());
        let engine = engine_with(store.clone());
        let mut request = poll_request(Duration::from_secs(30));
        request.filter = SubscriptionFilter::new(MessageKind::Notification)
            .with_names(Vec::<String>::new());

        let err = engine.poll(request).await.expect_err("validation fails");
        assert_eq!(err.status_code(), 400);
        assert_eq!(store.finds.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn durable_subscribe_rolls_back_on_store_failure() {
        let engine = engine_with(Arc::new(FailingStore));
        let (sink, _receiver) = DurableQueueSink::new("s1", engine.registry());

        let result = engine
            .subscribe(
                SubscribeRequest {
                    subscription_id: None,
                    filter: SubscriptionFilter::new(MessageKind::Notification),
                    cursor: None,
                    take: 10,
                    owner: Principal::new("alice"),
                },
                &sink,
            )
            .await;

        assert!(result.is_err());
        assert_eq!(engine.registry().count(), 0);
        assert!(sink.bound_ids().is_empty());
    }

    #[tokio::test]
    async fn two_queue_sinks_each_receive_a_copy() {
        let engine = engine_with(Arc::new(VecStore::default()));
        let (first, mut first_rx) = DurableQueueSink::new("s1", engine.registry());
        let (second, mut second_rx) = DurableQueueSink::new("s2", engine.registry());
        for sink in [&first, &second] {
            engine
                .subscribe(
                    SubscribeRequest {
                        subscription_id: None,
                        filter: SubscriptionFilter::new(MessageKind::Notification),
                        cursor: None,
                        take: 10,
                        owner: Principal::new("alice"),
                    },
                    sink,
                )
                .await
                .expect("subscribe");
        }

        let stored = engine
            .publish(notify("dev1", "foo"), &device("dev1"))
            .await
            .expect("insert");

        for receiver in [&mut first_rx, &mut second_rx] {
            match receiver.try_recv() {
                Ok(OutboundFrame::Push(push)) => assert_eq!(push.message, stored),
                other => panic!("expected push frame, got {other:?}"),
            }
        }
    }
}
