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

//! `HiveHub` facade: the engine plus access control, shared by every surface.

use std::sync::Arc;
use tracing::debug;

use crate::config::HubConfig;
use crate::engine::SubscriptionEngine;
use crate::error::HubError;
use crate::gateway::{AccessControl, MessageQuery, MessageStore};
use crate::longpoll::LongPollAdapter;
use crate::model::{
    CommandUpdate, DeviceAccess, DeviceCommand, DeviceScope, HubMessage, MessageKind,
    NewMessage, Principal, Selector, SubscriptionFilter,
};
use crate::registry::SubscriptionRegistry;
use crate::rpc::{RpcEvents, RpcServer};
use crate::session::DuplexSession;
use crate::sink::OutboundReceiver;

const COMPONENT: &str = "hive_hub";

/// Notification names the hub emits itself; clients may not insert them.
pub const RESERVED_NOTIFICATIONS: [&str; 2] = ["$device-add", "$device-update"];

/// Cheaply cloneable handle over one engine and its collaborators.
#[derive(Clone)]
pub struct HiveHub {
    engine: Arc<SubscriptionEngine>,
    access: Arc<dyn AccessControl>,
}

impl HiveHub {
    pub fn new(
        store: Arc<dyn MessageStore>,
        access: Arc<dyn AccessControl>,
        config: HubConfig,
    ) -> Result<Self, HubError> {
        config.validate()?;
        Ok(Self {
            engine: Arc::new(SubscriptionEngine::new(store, config)),
            access,
        })
    }

    pub fn engine(&self) -> &Arc<SubscriptionEngine> {
        &self.engine
    }

    pub fn access(&self) -> &Arc<dyn AccessControl> {
        &self.access
    }

    pub fn config(&self) -> &HubConfig {
        self.engine.config()
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        self.engine.registry()
    }

    pub fn long_poll(&self) -> LongPollAdapter {
        LongPollAdapter::new(self.clone())
    }

    /// Opens a duplex session; the receiver is drained by the transport writer.
    pub fn open_session(&self, principal: Principal) -> (DuplexSession, OutboundReceiver) {
        DuplexSession::open(self.clone(), principal)
    }

    /// Builds an RPC server; `RpcEvents` carries live events for its subscriptions.
    pub fn rpc_server(&self) -> (RpcServer, RpcEvents) {
        RpcServer::new(self.clone())
    }

    /// Builds a subscription filter limited to what `principal` may observe.
    ///
    /// Returns `None` when the principal can see no device at all in `scope`.
    pub async fn resolve_filter(
        &self,
        principal: &Principal,
        kind: MessageKind,
        scope: &DeviceScope,
        names: Option<Vec<String>>,
    ) -> Result<Option<SubscriptionFilter>, HubError> {
        let access = self
            .access
            .resolve_accessible_devices(scope, principal)
            .await?;

        let mut filter = SubscriptionFilter::new(kind);
        match access {
            DeviceAccess::All => {}
            DeviceAccess::Only(devices) if devices.is_empty() => return Ok(None),
            DeviceAccess::Only(devices) => {
                filter = filter.with_devices(devices.into_iter().map(|device| device.device_id));
            }
        }
        if let Some(names) = names {
            filter = filter.with_names(names);
        }
        if !scope.network_ids.is_empty() {
            filter = filter.with_network_ids(scope.network_ids.iter().copied());
        }
        if !scope.device_type_ids.is_empty() {
            filter = filter.with_device_type_ids(scope.device_type_ids.iter().copied());
        }
        filter.validate()?;
        Ok(Some(filter))
    }

    /// Validates, persists and dispatches a client-submitted message.
    pub async fn insert(
        &self,
        principal: &Principal,
        message: NewMessage,
    ) -> Result<HubMessage, HubError> {
        if message.name().trim().is_empty() {
            return Err(HubError::validation(format!(
                "{} name is required",
                message.kind()
            )));
        }
        if message.kind() == MessageKind::Notification
            && RESERVED_NOTIFICATIONS.contains(&message.name())
        {
            return Err(HubError::forbidden(format!(
                "notification name {} is reserved",
                message.name()
            )));
        }

        let device = self
            .access
            .resolve_device(message.device_id(), principal)
            .await?;
        if device.network_id.is_none() {
            return Err(HubError::forbidden(format!(
                "device {} is not assigned to a network",
                device.device_id
            )));
        }
        self.engine.publish(message, &device).await
    }

    /// Applies a status/result update to a command of a device the principal can access.
    pub async fn update_command(
        &self,
        principal: &Principal,
        update: CommandUpdate,
    ) -> Result<DeviceCommand, HubError> {
        self.access
            .resolve_device(&update.device_id, principal)
            .await?;
        match self.engine.find_command(update.command_id).await? {
            Some(command) if command.device_id == update.device_id => {}
            _ => {
                return Err(HubError::not_found(format!(
                    "command {} for device {}",
                    update.command_id, update.device_id
                )))
            }
        }
        self.engine.update_command(update).await
    }

    /// Searches stored messages within the principal's accessible devices.
    pub async fn search(
        &self,
        principal: &Principal,
        mut query: MessageQuery,
    ) -> Result<Vec<HubMessage>, HubError> {
        let scope = DeviceScope {
            device_ids: query
                .devices
                .values()
                .map(|devices| devices.iter().cloned().collect())
                .unwrap_or_default(),
            ..DeviceScope::default()
        };
        match self
            .access
            .resolve_accessible_devices(&scope, principal)
            .await?
        {
            DeviceAccess::All => {}
            DeviceAccess::Only(devices) if devices.is_empty() => {
                debug!(
                    component = COMPONENT,
                    principal = %principal,
                    "search over empty device set"
                );
                return Ok(Vec::new());
            }
            DeviceAccess::Only(devices) => {
                query.devices = Selector::only(devices.into_iter().map(|device| device.device_id));
            }
        }
        self.engine.search(&query).await
    }
}
