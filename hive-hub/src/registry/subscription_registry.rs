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

//! Lock-guarded subscription registry.
//!
//! Every batch is applied in place under one write lock, touching only the buckets its
//! keys name. Readers share the read lock, so a lookup never observes half of a batch.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use tracing::{debug, trace};

use crate::error::HubError;
use crate::model::{HubMessage, MessageKind};
use crate::observability::events;
use crate::registry::filter_key::{EntityKey, FilterKey};
use crate::registry::subscription::{Subscription, SubscriptionId};
use crate::sink::{DeliverySink, SubscriptionState};

const COMPONENT: &str = "subscription_registry";

type KeyIndex = HashMap<FilterKey, HashMap<SubscriptionId, Arc<Subscription>>>;

struct RegistryEntry {
    subscription: Arc<Subscription>,
    keys: HashSet<FilterKey>,
}

#[derive(Default)]
struct RegistryIndex {
    version: u64,
    commands: KeyIndex,
    command_updates: KeyIndex,
    notifications: KeyIndex,
    by_id: HashMap<SubscriptionId, RegistryEntry>,
}

impl RegistryIndex {
    fn index(&self, kind: MessageKind) -> &KeyIndex {
        match kind {
            MessageKind::Command => &self.commands,
            MessageKind::CommandUpdate => &self.command_updates,
            MessageKind::Notification => &self.notifications,
        }
    }

    fn index_mut(&mut self, kind: MessageKind) -> &mut KeyIndex {
        match kind {
            MessageKind::Command => &mut self.commands,
            MessageKind::CommandUpdate => &mut self.command_updates,
            MessageKind::Notification => &mut self.notifications,
        }
    }

    fn attach(&mut self, key: FilterKey, subscription: &Arc<Subscription>) {
        self.index_mut(key.kind)
            .entry(key)
            .or_default()
            .insert(subscription.id(), subscription.clone());
    }

    fn detach(&mut self, key: &FilterKey, id: &SubscriptionId) {
        let index = self.index_mut(key.kind);
        if let Some(bucket) = index.get_mut(key) {
            bucket.remove(id);
            if bucket.is_empty() {
                index.remove(key);
            }
        }
    }

    fn remove_entry(&mut self, id: &SubscriptionId) -> Option<Arc<Subscription>> {
        let entry = self.by_id.remove(id)?;
        for key in &entry.keys {
            self.detach(key, id);
        }
        Some(entry.subscription)
    }
}

struct RegistryShared {
    index: RwLock<RegistryIndex>,
}

/// Thread-safe store of active subscriptions, shared by reference.
#[derive(Clone)]
pub struct SubscriptionRegistry {
    shared: Arc<RegistryShared>,
}

/// Non-owning handle held by sinks to run registry cleanup.
#[derive(Clone, Default)]
pub(crate) struct WeakRegistry(Weak<RegistryShared>);

impl WeakRegistry {
    pub(crate) fn upgrade(&self) -> Option<SubscriptionRegistry> {
        self.0
            .upgrade()
            .map(|shared| SubscriptionRegistry { shared })
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(RegistryShared {
                index: RwLock::new(RegistryIndex::default()),
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> WeakRegistry {
        WeakRegistry(Arc::downgrade(&self.shared))
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryIndex> {
        self.shared
            .index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryIndex> {
        self.shared
            .index
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies `mutate` as one batch and advances the version.
    ///
    /// The write lock is released before this returns, so callers retire removed
    /// subscriptions outside it.
    fn mutate<R>(&self, mutate: impl FnOnce(&mut RegistryIndex) -> R) -> R {
        let mut index = self.write();
        let result = mutate(&mut *index);
        index.version += 1;
        result
    }

    /// Inserts a batch; visible to `lookup` once this returns.
    ///
    /// A subscription whose id is already registered replaces the previous registration.
    pub fn insert_all(&self, subscriptions: Vec<Subscription>) {
        if subscriptions.is_empty() {
            return;
        }
        let count = subscriptions.len();
        let replaced = self.mutate(|index| Self::apply_inserts(index, subscriptions));
        self.finish_insert(count, replaced);
    }

    /// Like [`insert_all`](Self::insert_all), but rejects the whole batch when any id is
    /// already registered.
    pub fn try_insert_all(&self, subscriptions: Vec<Subscription>) -> Result<(), HubError> {
        if subscriptions.is_empty() {
            return Ok(());
        }
        let count = subscriptions.len();
        let replaced = self.mutate(|index| {
            if let Some(taken) = subscriptions
                .iter()
                .find(|subscription| index.by_id.contains_key(&subscription.id()))
            {
                return Err(HubError::Conflict(format!(
                    "subscription id {} is already in use",
                    taken.id()
                )));
            }
            Ok(Self::apply_inserts(index, subscriptions))
        })?;
        self.finish_insert(count, replaced);
        Ok(())
    }

    fn apply_inserts(
        index: &mut RegistryIndex,
        subscriptions: Vec<Subscription>,
    ) -> Vec<Arc<Subscription>> {
        let mut replaced = Vec::new();
        for subscription in subscriptions {
            let subscription = Arc::new(subscription);
            let id = subscription.id();
            if let Some(previous) = index.remove_entry(&id) {
                replaced.push(previous);
            }
            let keys: HashSet<FilterKey> =
                FilterKey::expand(subscription.filter()).into_iter().collect();
            for key in &keys {
                index.attach(key.clone(), &subscription);
            }
            index.by_id.insert(id, RegistryEntry { subscription, keys });
        }
        replaced
    }

    fn finish_insert(&self, count: usize, replaced: Vec<Arc<Subscription>>) {
        debug!(
            event = events::REGISTRY_INSERT,
            component = COMPONENT,
            count,
            replaced = replaced.len(),
            "subscription batch inserted"
        );
        for previous in replaced {
            trace!(
                event = events::REGISTRY_REPLACE,
                component = COMPONENT,
                subscription_id = %previous.id(),
                "subscription registration replaced"
            );
            Self::retire(&previous, false);
        }
    }

    /// Removes the given `(entity, subscription)` registrations as one batch.
    ///
    /// A subscription left without any registration is removed entirely. Absent pairs are
    /// ignored.
    pub fn remove_pairs(&self, pairs: &[(EntityKey, SubscriptionId)]) {
        if pairs.is_empty() {
            return;
        }
        let removed = self.mutate(|index| {
            let mut emptied = Vec::new();
            for (entity, id) in pairs {
                let Some(entry) = index.by_id.get_mut(id) else {
                    continue;
                };
                let matching: Vec<FilterKey> = entry
                    .keys
                    .iter()
                    .filter(|key| &key.entity == entity)
                    .cloned()
                    .collect();
                for key in &matching {
                    entry.keys.remove(key);
                }
                let now_empty = entry.keys.is_empty();
                for key in &matching {
                    index.detach(key, id);
                }
                if now_empty {
                    emptied.push(*id);
                }
            }
            emptied
                .into_iter()
                .filter_map(|id| index.remove_entry(&id))
                .collect::<Vec<_>>()
        });

        debug!(
            event = events::REGISTRY_REMOVE_PAIRS,
            component = COMPONENT,
            pairs = pairs.len(),
            removed = removed.len(),
            "subscription pairs removed"
        );
        for subscription in removed {
            Self::retire(&subscription, true);
        }
    }

    /// Removes one subscription. Returns `true` only when it was registered.
    pub fn remove_by_subscription_id(&self, id: &SubscriptionId) -> bool {
        self.remove_subscriptions(std::slice::from_ref(id)) == 1
    }

    /// Removes every listed subscription as one batch. Returns how many were registered.
    pub fn remove_subscriptions(&self, ids: &[SubscriptionId]) -> usize {
        if ids.is_empty() || !self.any_registered(ids) {
            return 0;
        }
        let removed = self.mutate(|index| {
            ids.iter()
                .filter_map(|id| index.remove_entry(id))
                .collect::<Vec<_>>()
        });

        for subscription in &removed {
            debug!(
                event = events::REGISTRY_REMOVE,
                component = COMPONENT,
                subscription_id = %subscription.id(),
                "subscription removed"
            );
            Self::retire(subscription, true);
        }
        removed.len()
    }

    fn any_registered(&self, ids: &[SubscriptionId]) -> bool {
        let index = self.read();
        ids.iter().any(|id| index.by_id.contains_key(id))
    }

    /// Settles and retires a subscription that left the registry.
    ///
    /// Runs once the batch is applied, outside the write lock.
    fn retire(subscription: &Subscription, unbind: bool) {
        match subscription.sink() {
            DeliverySink::Single(sink) => {
                sink.detach();
            }
            DeliverySink::Queue(sink) => {
                if unbind {
                    sink.unbind(&subscription.id());
                }
            }
        }
        subscription.lifecycle().settle(SubscriptionState::Cancelled);
        subscription.lifecycle().retire();
    }

    /// Every active subscription whose filter matches `message`.
    pub fn lookup(&self, kind: MessageKind, message: &HubMessage) -> Vec<Arc<Subscription>> {
        if kind != message.kind() {
            return Vec::new();
        }
        let candidates = FilterKey::candidates(message);
        let registry = self.read();
        let index = registry.index(kind);

        let mut seen = HashSet::new();
        let mut matched = Vec::new();
        for key in &candidates {
            let Some(bucket) = index.get(key) else {
                continue;
            };
            for (id, subscription) in bucket {
                if seen.insert(*id)
                    && subscription.is_active()
                    && subscription.filter().matches(message)
                {
                    matched.push(subscription.clone());
                }
            }
        }
        let version = registry.version;
        drop(registry);

        if matched.is_empty() {
            trace!(
                event = events::REGISTRY_LOOKUP_EMPTY,
                component = COMPONENT,
                kind = %kind,
                msg_id = message.id(),
                registry_version = version,
                "no subscriptions matched"
            );
        }
        matched
    }

    pub fn get(&self, id: &SubscriptionId) -> Option<Arc<Subscription>> {
        self.read()
            .by_id
            .get(id)
            .map(|entry| entry.subscription.clone())
    }

    pub fn contains(&self, id: &SubscriptionId) -> bool {
        self.read().by_id.contains_key(id)
    }

    /// Number of registrations held for `id`: 0 or 1.
    pub fn count_by_id(&self, id: &SubscriptionId) -> usize {
        usize::from(self.contains(id))
    }

    /// Number of distinct active subscriptions.
    pub fn count(&self) -> usize {
        self.read().by_id.len()
    }

    /// Registry version; advances on every mutation.
    pub fn version(&self) -> u64 {
        self.read().version
    }
}
