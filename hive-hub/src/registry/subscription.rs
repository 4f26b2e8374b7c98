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

use crate::error::HubError;
use crate::model::{HubMessage, Principal, SubscriptionFilter};
use crate::sink::{DeliverySink, Lifecycle, SubscriptionState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

/// Opaque subscription token, caller-visible for duplex sessions.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for SubscriptionId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl Display for SubscriptionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SubscriptionId {
    type Err = HubError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(value)
            .map(Self)
            .map_err(|err| HubError::validation(format!("invalid subscription id {value}: {err}")))
    }
}

/// A live registration binding a filter to a delivery sink.
pub struct Subscription {
    id: SubscriptionId,
    filter: SubscriptionFilter,
    owner: Principal,
    sink: DeliverySink,
    created_at: DateTime<Utc>,
    lifecycle: Arc<Lifecycle>,
}

impl Subscription {
    pub fn new(
        id: SubscriptionId,
        filter: SubscriptionFilter,
        owner: Principal,
        sink: DeliverySink,
    ) -> Self {
        let lifecycle = sink.lifecycle_for_new_subscription();
        Self {
            id,
            filter,
            owner,
            sink,
            created_at: Utc::now(),
            lifecycle,
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn filter(&self) -> &SubscriptionFilter {
        &self.filter
    }

    pub fn owner(&self) -> &Principal {
        &self.owner
    }

    pub fn sink(&self) -> &DeliverySink {
        &self.sink
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn state(&self) -> SubscriptionState {
        self.lifecycle.state()
    }

    /// Only registered subscriptions accept dispatch.
    pub fn is_active(&self) -> bool {
        self.lifecycle.is_registered()
    }

    pub(crate) fn lifecycle(&self) -> &Arc<Lifecycle> {
        &self.lifecycle
    }

    /// Hands one dispatched message to the sink. Returns `false` when it was dropped.
    pub(crate) async fn deliver(&self, message: &HubMessage) -> bool {
        if !self.is_active() {
            return false;
        }
        match &self.sink {
            DeliverySink::Single(sink) => sink.resolve(vec![message.clone()]),
            DeliverySink::Queue(sink) => sink.push(self.id, message.clone()).await,
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("filter", &self.filter)
            .field("owner", &self.owner)
            .field("created_at", &self.created_at)
            .field("state", &self.state())
            .finish()
    }
}
