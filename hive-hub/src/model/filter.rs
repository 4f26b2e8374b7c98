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

//! Subscription filters: wildcard-or-explicit selectors plus optional scoping.

use crate::error::HubError;
use crate::model::message::{HubMessage, MessageId, MessageKind};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::BTreeSet;

/// Either every value (wildcard) or membership in an explicit set.
///
/// Serialized as `null` for the wildcard and as an array otherwise.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(
    from = "Option<BTreeSet<T>>",
    into = "Option<BTreeSet<T>>",
    bound(
        serialize = "T: Serialize + Ord + Clone",
        deserialize = "T: DeserializeOwned + Ord"
    )
)]
pub enum Selector<T: Ord> {
    #[default]
    Any,
    Only(BTreeSet<T>),
}

impl<T: Ord> Selector<T> {
    pub fn only<I: IntoIterator<Item = T>>(values: I) -> Self {
        Selector::Only(values.into_iter().collect())
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Selector::Any)
    }

    pub fn matches<Q>(&self, value: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        match self {
            Selector::Any => true,
            Selector::Only(values) => values.contains(value),
        }
    }

    /// Explicit values, or `None` for the wildcard.
    pub fn values(&self) -> Option<&BTreeSet<T>> {
        match self {
            Selector::Any => None,
            Selector::Only(values) => Some(values),
        }
    }
}

impl<T: Ord> From<Option<BTreeSet<T>>> for Selector<T> {
    fn from(value: Option<BTreeSet<T>>) -> Self {
        match value {
            None => Selector::Any,
            Some(values) => Selector::Only(values),
        }
    }
}

impl<T: Ord> From<Selector<T>> for Option<BTreeSet<T>> {
    fn from(value: Selector<T>) -> Self {
        match value {
            Selector::Any => None,
            Selector::Only(values) => Some(values),
        }
    }
}

/// What a subscription wants to receive.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionFilter {
    pub kind: MessageKind,
    #[serde(default)]
    pub devices: Selector<String>,
    #[serde(default)]
    pub names: Selector<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_ids: Option<BTreeSet<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_type_ids: Option<BTreeSet<i64>>,
    /// Restricts a command-update subscription to one command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_id: Option<MessageId>,
}

impl SubscriptionFilter {
    pub fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            devices: Selector::Any,
            names: Selector::Any,
            network_ids: None,
            device_type_ids: None,
            command_id: None,
        }
    }

    pub fn with_devices<I, S>(mut self, devices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.devices = Selector::only(devices.into_iter().map(Into::into));
        self
    }

    pub fn with_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.names = Selector::only(names.into_iter().map(Into::into));
        self
    }

    pub fn with_network_ids<I: IntoIterator<Item = i64>>(mut self, ids: I) -> Self {
        self.network_ids = Some(ids.into_iter().collect());
        self
    }

    pub fn with_device_type_ids<I: IntoIterator<Item = i64>>(mut self, ids: I) -> Self {
        self.device_type_ids = Some(ids.into_iter().collect());
        self
    }

    pub fn with_command_id(mut self, command_id: MessageId) -> Self {
        self.command_id = Some(command_id);
        self
    }

    /// Rejects filters that can never match or mix unrelated options.
    pub fn validate(&self) -> Result<(), HubError> {
        if matches!(&self.names, Selector::Only(names) if names.is_empty()) {
            return Err(HubError::validation("names must not be empty when provided"));
        }
        if matches!(&self.names, Selector::Only(names) if names.iter().any(|n| n.is_empty())) {
            return Err(HubError::validation("names must not contain empty values"));
        }
        if matches!(&self.devices, Selector::Only(devices) if devices.is_empty()) {
            return Err(HubError::validation("device list must not be empty when provided"));
        }
        if self.command_id.is_some() && self.kind != MessageKind::CommandUpdate {
            return Err(HubError::validation(
                "commandId is only valid for command update subscriptions",
            ));
        }
        Ok(())
    }

    /// Full match check, including the scoping sets that the registry key ignores.
    pub fn matches(&self, message: &HubMessage) -> bool {
        if message.kind() != self.kind {
            return false;
        }
        if let Some(command_id) = self.command_id {
            if message.id() != command_id {
                return false;
            }
        }
        if !self.devices.matches(message.device_id()) {
            return false;
        }
        if !self.names.matches(message.name()) {
            return false;
        }
        if let Some(network_ids) = &self.network_ids {
            match message.network_id() {
                Some(network_id) if network_ids.contains(&network_id) => {}
                _ => return false,
            }
        }
        if let Some(device_type_ids) = &self.device_type_ids {
            match message.device_type_id() {
                Some(device_type_id) if device_type_ids.contains(&device_type_id) => {}
                _ => return false,
            }
        }
        true
    }
}
