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

use tracing::debug;

use crate::observability::events;
use crate::registry::{SubscriptionId, SubscriptionRegistry};

const COMPONENT: &str = "registration_guard";

/// Scoped ownership of freshly registered subscriptions.
///
/// Dropping an armed guard removes the subscriptions from the registry, which also cancels
/// any unresolved single-resolution sink. This covers every exit path: success, error, and
/// the owning future being dropped mid-wait.
#[must_use = "dropping the guard immediately unregisters the subscriptions"]
pub struct RegistrationGuard {
    registry: SubscriptionRegistry,
    ids: Vec<SubscriptionId>,
    armed: bool,
}

impl RegistrationGuard {
    pub(crate) fn new(registry: SubscriptionRegistry, ids: Vec<SubscriptionId>) -> Self {
        Self {
            registry,
            ids,
            armed: true,
        }
    }

    pub fn ids(&self) -> &[SubscriptionId] {
        &self.ids
    }

    /// Transfers ownership of the registrations to the caller; nothing is removed on drop.
    pub fn commit(mut self) -> Vec<SubscriptionId> {
        self.armed = false;
        std::mem::take(&mut self.ids)
    }
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        if !self.armed || self.ids.is_empty() {
            return;
        }
        let removed = self.registry.remove_subscriptions(&self.ids);
        debug!(
            event = events::GUARD_RELEASE,
            component = COMPONENT,
            guarded = self.ids.len(),
            removed,
            "registration guard released"
        );
    }
}
