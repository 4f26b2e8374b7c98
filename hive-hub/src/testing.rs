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


//! In-crate fakes for the store and access-control seams.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::HubConfig;
use crate::error::HubError;
use crate::gateway::{AccessControl, MessageQuery, MessageStore};
use crate::hub::HiveHub;
use crate::model::{
    CommandUpdate, DeviceAccess, DeviceCommand, DeviceNotification, DeviceRef, DeviceScope,
    HubMessage, MessageId, NewCommand, NewMessage, NewNotification, Principal,
};
use crate::session::OutboundFrame;
use crate::sink::OutboundReceiver;

#[derive(Default)]
pub(crate) struct VecStore {
    messages: Mutex<Vec<HubMessage>>,
    next_id: AtomicUsize,
    pub(crate) finds: AtomicUsize,
}

#[async_trait]
impl MessageStore for VecStore {
    async fn find(&self, query: &MessageQuery) -> Result<Vec<HubMessage>, HubError> {
        self.finds.fetch_add(1, Ordering::SeqCst);
        let messages = self.messages.lock().expect("store lock");
        let mut found: Vec<HubMessage> = messages
            .iter()
            .filter(|message| query.matches(message))
            .cloned()
            .collect();
        found.sort_by(|left, right| query.compare(left, right));
        Ok(found.into_iter().skip(query.skip).take(query.take).collect())
    }

    async fn insert(&self, message: NewMessage, device: &DeviceRef) -> Result<HubMessage, HubError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) as MessageId + 1;
        let stored = match message {
            NewMessage::Notification(new) => HubMessage::Notification(DeviceNotification {
                id,
                device_id: new.device_id,
                notification: new.notification,
                timestamp: Utc::now(),
                parameters: new.parameters,
                network_id: device.network_id,
                device_type_id: device.device_type_id,
            }),
            NewMessage::Command(new) => HubMessage::Command(DeviceCommand {
                id,
                device_id: new.device_id,
                command: new.command,
                timestamp: Utc::now(),
                last_updated: None,
                user_id: new.user_id,
                parameters: new.parameters,
                lifetime: new.lifetime,
                status: new.status,
                result: None,
                is_updated: false,
                network_id: device.network_id,
                device_type_id: device.device_type_id,
            }),
        };
        self.messages.lock().expect("store lock").push(stored.clone());
        Ok(stored)
    }

    async fn update_command(&self, update: CommandUpdate) -> Result<DeviceCommand, HubError> {
        let mut messages = self.messages.lock().expect("store lock");
        let updated = messages
            .iter_mut()
            .find_map(|message| match message {
                HubMessage::Command(command) if command.id == update.command_id => {
                    command.status = update.status.clone().or(command.status.take());
                    command.result = update.result.clone().or(command.result.take());
                    command.last_updated = Some(Utc::now());
                    command.is_updated = true;
                    Some(command.clone())
                }
                _ => None,
            })
            .ok_or_else(|| HubError::not_found(format!("command {}", update.command_id)))?;
        messages.push(HubMessage::CommandUpdate(updated.clone()));
        Ok(updated)
    }

    async fn find_command(&self, command_id: MessageId) -> Result<Option<DeviceCommand>, HubError> {
        let messages = self.messages.lock().expect("store lock");
        Ok(messages.iter().find_map(|message| match message {
            HubMessage::Command(command) if command.id == command_id => Some(command.clone()),
            _ => None,
        }))
    }
}

pub(crate) struct FailingStore;

#[async_trait]
impl MessageStore for FailingStore {
    async fn find(&self, _query: &MessageQuery) -> Result<Vec<HubMessage>, HubError> {
        Err(HubError::upstream("find failed", "storage offline"))
    }

    async fn insert(
        &self,
        _message: NewMessage,
        _device: &DeviceRef,
    ) -> Result<HubMessage, HubError> {
        Err(HubError::upstream("insert failed", "storage offline"))
    }

    async fn update_command(&self, _update: CommandUpdate) -> Result<DeviceCommand, HubError> {
        Err(HubError::upstream("update failed", "storage offline"))
    }

    async fn find_command(&self, _command_id: MessageId) -> Result<Option<DeviceCommand>, HubError> {
        Err(HubError::upstream("find failed", "storage offline"))
    }
}

/// Devices dev1..dev3 on network 1 plus an unassigned `orphan`.
///
/// `admin` sees everything, `alice` sees dev1 and dev2, `bob` sees dev3, anyone else nothing.
pub(crate) struct TableAccess {
    devices: HashMap<String, DeviceRef>,
    grants: HashMap<String, Option<HashSet<String>>>,
}

impl Default for TableAccess {
    fn default() -> Self {
        let devices = [
            device("dev1"),
            device("dev2"),
            DeviceRef {
                device_id: "dev3".to_string(),
                network_id: Some(1),
                device_type_id: Some(7),
            },
            DeviceRef {
                device_id: "orphan".to_string(),
                network_id: None,
                device_type_id: None,
            },
        ]
        .into_iter()
        .map(|device| (device.device_id.clone(), device))
        .collect();
        let grants = HashMap::from([
            ("admin".to_string(), None),
            (
                "alice".to_string(),
                Some(HashSet::from(["dev1".to_string(), "dev2".to_string(), "orphan".to_string()])),
            ),
            ("bob".to_string(), Some(HashSet::from(["dev3".to_string()]))),
        ]);
        Self { devices, grants }
    }
}

impl TableAccess {
    fn can_see(&self, principal: &Principal, device_id: &str) -> bool {
        match self.grants.get(&principal.name) {
            Some(None) => true,
            Some(Some(granted)) => granted.contains(device_id),
            None => false,
        }
    }
}

#[async_trait]
impl AccessControl for TableAccess {
    async fn resolve_accessible_devices(
        &self,
        scope: &DeviceScope,
        principal: &Principal,
    ) -> Result<DeviceAccess, HubError> {
        if scope.is_unrestricted() && matches!(self.grants.get(&principal.name), Some(None)) {
            return Ok(DeviceAccess::All);
        }
        let mut visible = Vec::new();
        if scope.device_ids.is_empty() {
            visible.extend(
                self.devices
                    .values()
                    .filter(|device| self.can_see(principal, &device.device_id))
                    .cloned(),
            );
        } else {
            for device_id in &scope.device_ids {
                visible.push(self.resolve_device(device_id, principal).await?);
            }
        }
        visible.retain(|device| {
            (scope.network_ids.is_empty()
                || device.network_id.is_some_and(|id| scope.network_ids.contains(&id)))
                && (scope.device_type_ids.is_empty()
                    || device
                        .device_type_id
                        .is_some_and(|id| scope.device_type_ids.contains(&id)))
        });
        Ok(DeviceAccess::Only(visible))
    }

    async fn resolve_device(
        &self,
        device_id: &str,
        principal: &Principal,
    ) -> Result<DeviceRef, HubError> {
        let device = self
            .devices
            .get(device_id)
            .ok_or_else(|| HubError::not_found(format!("device {device_id}")))?;
        if !self.can_see(principal, device_id) {
            return Err(HubError::forbidden(format!("device {device_id}")));
        }
        Ok(device.clone())
    }
}

pub(crate) fn device(device_id: &str) -> DeviceRef {
    DeviceRef {
        device_id: device_id.to_string(),
        network_id: Some(1),
        device_type_id: None,
    }
}

pub(crate) fn notify(device: &str, name: &str) -> NewMessage {
    NewMessage::Notification(NewNotification {
        device_id: device.to_string(),
        notification: name.to_string(),
        parameters: None,
    })
}

pub(crate) fn command(device: &str, name: &str) -> NewMessage {
    NewMessage::Command(NewCommand {
        device_id: device.to_string(),
        command: name.to_string(),
        parameters: None,
        lifetime: None,
        status: None,
        user_id: None,
    })
}

pub(crate) fn test_hub() -> HiveHub {
    HiveHub::new(
        Arc::new(VecStore::default()),
        Arc::new(TableAccess::default()),
        HubConfig::default(),
    )
    .expect("default config is valid")
}

pub(crate) fn drain(receiver: &mut OutboundReceiver) -> Vec<OutboundFrame> {
    let mut frames = Vec::new();
    while let Ok(frame) = receiver.try_recv() {
        frames.push(frame);
    }
    frames
}
