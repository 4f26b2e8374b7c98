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

//! Contracts for the collaborators the hub consumes: message storage and access control.

use crate::error::HubError;
use crate::model::{
    CommandUpdate, DeviceAccess, DeviceCommand, DeviceRef, DeviceScope, HubMessage, MessageId,
    MessageKind, NewMessage, Principal, Selector, SubscriptionFilter,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    #[default]
    Timestamp,
    Id,
    Name,
}

impl FromStr for SortField {
    type Err = HubError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "timestamp" => Ok(SortField::Timestamp),
            "id" => Ok(SortField::Id),
            "notification" | "command" | "name" => Ok(SortField::Name),
            other => Err(HubError::validation(format!("unknown sort field: {other}"))),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl FromStr for SortOrder {
    type Err = HubError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(HubError::validation(format!("unknown sort order: {other}"))),
        }
    }
}

/// Search criteria handed to the store, for both backlog reads and searches.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageQuery {
    pub kind: MessageKind,
    #[serde(default)]
    pub devices: Selector<String>,
    #[serde(default)]
    pub names: Selector<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_ids: Option<BTreeSet<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_type_ids: Option<BTreeSet<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_id: Option<MessageId>,
    /// Exclusive lower bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<DateTime<Utc>>,
    /// Inclusive upper bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default)]
    pub sort_field: SortField,
    #[serde(default)]
    pub sort_order: SortOrder,
    pub take: usize,
    #[serde(default)]
    pub skip: usize,
}

impl MessageQuery {
    /// Backlog read for a subscription filter: everything newer than `cursor`, oldest first.
    pub fn backlog(filter: &SubscriptionFilter, cursor: DateTime<Utc>, take: usize) -> Self {
        Self::from_filter(filter, Some(cursor), take)
    }

    pub fn search(kind: MessageKind, take: usize) -> Self {
        Self::from_filter(&SubscriptionFilter::new(kind), None, take)
    }

    fn from_filter(filter: &SubscriptionFilter, since: Option<DateTime<Utc>>, take: usize) -> Self {
        Self {
            kind: filter.kind,
            devices: filter.devices.clone(),
            names: filter.names.clone(),
            network_ids: filter.network_ids.clone(),
            device_type_ids: filter.device_type_ids.clone(),
            command_id: filter.command_id,
            since,
            until: None,
            status: None,
            sort_field: SortField::Timestamp,
            sort_order: SortOrder::Asc,
            take,
            skip: 0,
        }
    }

    /// Predicate a store applies per message, before sorting and paging.
    pub fn matches(&self, message: &HubMessage) -> bool {
        let filter = SubscriptionFilter {
            kind: self.kind,
            devices: self.devices.clone(),
            names: self.names.clone(),
            network_ids: self.network_ids.clone(),
            device_type_ids: self.device_type_ids.clone(),
            command_id: self.command_id,
        };
        if !filter.matches(message) {
            return false;
        }
        let timestamp = message.timestamp();
        if matches!(self.since, Some(since) if timestamp <= since) {
            return false;
        }
        if matches!(self.until, Some(until) if timestamp > until) {
            return false;
        }
        match (&self.status, message) {
            (None, _) => true,
            (Some(status), HubMessage::Command(command))
            | (Some(status), HubMessage::CommandUpdate(command)) => {
                command.status.as_deref() == Some(status.as_str())
            }
            (Some(_), HubMessage::Notification(_)) => false,
        }
    }

    /// Ordering implied by `sort_field` and `sort_order`. Ties break on id.
    pub fn compare(&self, left: &HubMessage, right: &HubMessage) -> Ordering {
        let ordering = match self.sort_field {
            SortField::Timestamp => left.timestamp().cmp(&right.timestamp()),
            SortField::Id => left.id().cmp(&right.id()),
            SortField::Name => left.name().cmp(right.name()),
        }
        .then_with(|| left.id().cmp(&right.id()));
        match self.sort_order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    }
}

/// Persistent message storage.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Returns stored messages matching `query`, sorted and paged as requested.
    async fn find(&self, query: &MessageQuery) -> Result<Vec<HubMessage>, HubError>;

    /// Persists a new message for `device` and returns it with id and timestamp assigned.
    async fn insert(&self, message: NewMessage, device: &DeviceRef) -> Result<HubMessage, HubError>;

    /// Applies a status/result update to an existing command.
    async fn update_command(&self, update: CommandUpdate) -> Result<DeviceCommand, HubError>;

    /// Looks up a single command regardless of device.
    async fn find_command(&self, command_id: MessageId) -> Result<Option<DeviceCommand>, HubError>;
}

/// Permission evaluation for device, network and device-type scopes.
#[async_trait]
pub trait AccessControl: Send + Sync {
    /// Resolves the devices a principal may observe within `scope`.
    ///
    /// Fails with `NotFound` for unknown device ids and `Forbidden` for inaccessible ones.
    /// An unrestricted scope resolves to every device the principal may access.
    async fn resolve_accessible_devices(
        &self,
        scope: &DeviceScope,
        principal: &Principal,
    ) -> Result<DeviceAccess, HubError>;

    /// Resolves a single device for writes (insert, update).
    async fn resolve_device(
        &self,
        device_id: &str,
        principal: &Principal,
    ) -> Result<DeviceRef, HubError>;
}
