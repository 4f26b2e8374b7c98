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

//! One-shot delivery target for long-poll requests.

use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::error::HubError;
use crate::model::HubMessage;
use crate::observability::{events, fields};
use crate::registry::{SubscriptionId, SubscriptionRegistry, WeakRegistry};
use crate::sink::lifecycle::{Lifecycle, SubscriptionState};

const COMPONENT: &str = "single_resolution_sink";

/// The value handed to the waiting caller.
#[derive(Debug, PartialEq)]
pub enum Resolution {
    Delivered(Vec<HubMessage>),
    /// Equivalent to an empty delivery.
    TimedOut,
    Cancelled,
    Failed(HubError),
}

impl Resolution {
    fn outcome(&self) -> SubscriptionState {
        match self {
            Resolution::Delivered(_) => SubscriptionState::Delivered,
            Resolution::TimedOut => SubscriptionState::TimedOut,
            Resolution::Cancelled | Resolution::Failed(_) => SubscriptionState::Cancelled,
        }
    }
}

/// Resolves exactly once. Safe to call from any thread; later calls are no-ops.
///
/// The first resolution also removes the subscription from the registry through a weak
/// back-reference, so the registry never dispatches into a sink nobody will read.
pub struct SingleResolutionSink {
    subscription_id: SubscriptionId,
    lifecycle: Arc<Lifecycle>,
    sender: Mutex<Option<oneshot::Sender<Resolution>>>,
    registry: WeakRegistry,
}

impl SingleResolutionSink {
    pub fn new(
        subscription_id: SubscriptionId,
        registry: &SubscriptionRegistry,
    ) -> (Arc<Self>, oneshot::Receiver<Resolution>) {
        let (sender, receiver) = oneshot::channel();
        (
            Arc::new(Self {
                subscription_id,
                lifecycle: Arc::new(Lifecycle::new()),
                sender: Mutex::new(Some(sender)),
                registry: registry.downgrade(),
            }),
            receiver,
        )
    }

    pub fn subscription_id(&self) -> SubscriptionId {
        self.subscription_id
    }

    pub(crate) fn lifecycle(&self) -> &Arc<Lifecycle> {
        &self.lifecycle
    }

    pub fn is_resolved(&self) -> bool {
        !self.lifecycle.is_registered()
    }

    /// Delivers `messages`. Returns `true` only for the call that resolved the sink.
    pub fn resolve(&self, messages: Vec<HubMessage>) -> bool {
        self.finish(Resolution::Delivered(messages), true)
    }

    pub fn time_out(&self) -> bool {
        self.finish(Resolution::TimedOut, true)
    }

    pub fn cancel(&self) -> bool {
        self.finish(Resolution::Cancelled, true)
    }

    pub fn fail(&self, err: HubError) -> bool {
        self.finish(Resolution::Failed(err), true)
    }

    /// Settles as cancelled on behalf of the registry, which already removed the entry.
    pub(crate) fn detach(&self) -> bool {
        self.finish(Resolution::Cancelled, false)
    }

    fn finish(&self, resolution: Resolution, remove_from_registry: bool) -> bool {
        let outcome = resolution.outcome();
        if !self.lifecycle.settle(outcome) {
            trace!(
                event = events::SINK_RESOLVE_IGNORED,
                component = COMPONENT,
                subscription_id = %self.subscription_id,
                state = ?self.lifecycle.state(),
                reason = fields::REASON_NOT_REGISTERED,
                "sink already resolved"
            );
            return false;
        }

        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(sender) = sender {
            if sender.send(resolution).is_err() {
                trace!(
                    event = events::SINK_RECEIVER_CLOSED,
                    component = COMPONENT,
                    subscription_id = %self.subscription_id,
                    "waiting caller is gone"
                );
            }
        }

        debug!(
            event = events::SINK_RESOLVED,
            component = COMPONENT,
            subscription_id = %self.subscription_id,
            outcome = ?outcome,
            "sink resolved"
        );

        if remove_from_registry {
            if let Some(registry) = self.registry.upgrade() {
                registry.remove_by_subscription_id(&self.subscription_id);
            }
        }
        true
    }
}
