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


use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use hive_hub::{
    CommandUpdate, DeviceCommand, DeviceNotification, DeviceRef, HubError, HubMessage, MessageId,
    MessageKind, MessageQuery, MessageStore, NewMessage,
};
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use tracing::debug;

const COMPONENT: &str = "memory_store";

#[derive(Default)]
struct StoreState {
    next_id: MessageId,
    last_timestamp: Option<DateTime<Utc>>,
    notifications: Vec<DeviceNotification>,
    commands: BTreeMap<MessageId, DeviceCommand>,
    /// Every applied command update, in order.
    updates: Vec<DeviceCommand>,
}

impl StoreState {
    fn next_id(&mut self) -> MessageId {
        self.next_id += 1;
        self.next_id
    }

    /// Strictly increasing, so a cursor never skips a message stored in the same tick.
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let timestamp = match self.last_timestamp {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_timestamp = Some(timestamp);
        timestamp
    }
}

/// Message store held entirely in memory. Ids start at 1 and are shared by both kinds.
#[derive(Default)]
pub struct InMemoryMessageStore {
    state: RwLock<StoreState>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        let state = self.state.read().await;
        state.notifications.len() + state.commands.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn find(&self, query: &MessageQuery) -> Result<Vec<HubMessage>, HubError> {
        let state = self.state.read().await;
        let candidates: Vec<HubMessage> = match query.kind {
            MessageKind::Notification => state
                .notifications
                .iter()
                .cloned()
                .map(HubMessage::Notification)
                .collect(),
            MessageKind::Command => state
                .commands
                .values()
                .cloned()
                .map(HubMessage::Command)
                .collect(),
            MessageKind::CommandUpdate => state
                .updates
                .iter()
                .cloned()
                .map(HubMessage::CommandUpdate)
                .collect(),
        };
        drop(state);

        let mut found: Vec<HubMessage> = candidates
            .into_iter()
            .filter(|message| query.matches(message))
            .collect();
        found.sort_by(|left, right| query.compare(left, right));
        let found: Vec<HubMessage> = found
            .into_iter()
            .skip(query.skip)
            .take(query.take)
            .collect();
        debug!(
            component = COMPONENT,
            kind = %query.kind,
            count = found.len(),
            "find"
        );
        Ok(found)
    }

    async fn insert(&self, message: NewMessage, device: &DeviceRef) -> Result<HubMessage, HubError> {
        let mut state = self.state.write().await;
        let id = state.next_id();
        let timestamp = state.next_timestamp();
        let stored = match message {
            NewMessage::Notification(new) => {
                let notification = DeviceNotification {
                    id,
                    device_id: new.device_id,
                    notification: new.notification,
                    timestamp,
                    parameters: new.parameters,
                    network_id: device.network_id,
                    device_type_id: device.device_type_id,
                };
                state.notifications.push(notification.clone());
                HubMessage::Notification(notification)
            }
            NewMessage::Command(new) => {
                let command = DeviceCommand {
                    id,
                    device_id: new.device_id,
                    command: new.command,
                    timestamp,
                    last_updated: None,
                    user_id: new.user_id,
                    parameters: new.parameters,
                    lifetime: new.lifetime,
                    status: new.status,
                    result: None,
                    is_updated: false,
                    network_id: device.network_id,
                    device_type_id: device.device_type_id,
                };
                state.commands.insert(id, command.clone());
                HubMessage::Command(command)
            }
        };
        debug!(
            component = COMPONENT,
            msg_id = id,
            device_id = %stored.device_id(),
            kind = %stored.kind(),
            "insert"
        );
        Ok(stored)
    }

    async fn update_command(&self, update: CommandUpdate) -> Result<DeviceCommand, HubError> {
        let mut state = self.state.write().await;
        let timestamp = state.next_timestamp();
        let command = state
            .commands
            .get_mut(&update.command_id)
            .filter(|command| command.device_id == update.device_id)
            .ok_or_else(|| {
                HubError::not_found(format!(
                    "command {} for device {}",
                    update.command_id, update.device_id
                ))
            })?;
        if update.status.is_some() {
            command.status = update.status;
        }
        if update.result.is_some() {
            command.result = update.result;
        }
        command.last_updated = Some(timestamp);
        command.is_updated = true;
        let updated = command.clone();
        state.updates.push(updated.clone());
        debug!(
            component = COMPONENT,
            msg_id = updated.id,
            device_id = %updated.device_id,
            "command updated"
        );
        Ok(updated)
    }

    async fn find_command(&self, command_id: MessageId) -> Result<Option<DeviceCommand>, HubError> {
        Ok(self.state.read().await.commands.get(&command_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::InMemoryMessageStore;
    use hive_hub::{
        CommandUpdate, DeviceRef, HubMessage, MessageKind, MessageQuery, MessageStore, NewCommand,
        NewMessage, NewNotification, SortField, SortOrder, SubscriptionFilter,
    };

    fn device(device_id: &str) -> DeviceRef {
        DeviceRef {
            device_id: device_id.to_string(),
            network_id: Some(1),
            device_type_id: Some(10),
        }
    }

    fn notification(device_id: &str, name: &str) -> NewMessage {
        NewMessage::Notification(NewNotification {
            device_id: device_id.to_string(),
            notification: name.to_string(),
            parameters: None,
        })
    }

    #[tokio::test]
    async fn insert_assigns_increasing_ids_and_timestamps() {
        let store = InMemoryMessageStore::new();
        let first = store
            .insert(notification("dev1", "foo"), &device("dev1"))
            .await
            .expect("insert");
        let second = store
            .insert(notification("dev1", "foo"), &device("dev1"))
            .await
            .expect("insert");

        assert!(second.id() > first.id());
        assert!(second.timestamp() > first.timestamp());
        assert_eq!(store.len().await, 2);
        match &first {
            HubMessage::Notification(stored) => assert_eq!(stored.network_id, Some(1)),
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[tokio::test]
    async fn backlog_query_is_exclusive_of_cursor() {
        let store = InMemoryMessageStore::new();
        let first = store
            .insert(notification("dev1", "foo"), &device("dev1"))
            .await
            .expect("insert");
        let second = store
            .insert(notification("dev1", "foo"), &device("dev1"))
            .await
            .expect("insert");
        store
            .insert(notification("dev2", "foo"), &device("dev2"))
            .await
            .expect("insert");

        let filter = SubscriptionFilter::new(MessageKind::Notification).with_devices(["dev1"]);
        let found = store
            .find(&MessageQuery::backlog(&filter, first.timestamp(), 10))
            .await
            .expect("find");
        assert_eq!(found, vec![second]);
    }

    #[tokio::test]
    async fn search_sorts_and_pages() {
        let store = InMemoryMessageStore::new();
        for name in ["b", "c", "a"] {
            store
                .insert(notification("dev1", name), &device("dev1"))
                .await
                .expect("insert");
        }

        let mut query = MessageQuery::search(MessageKind::Notification, 2);
        query.sort_field = SortField::Name;
        query.sort_order = SortOrder::Desc;
        query.skip = 1;
        let names: Vec<String> = store
            .find(&query)
            .await
            .expect("find")
            .iter()
            .map(|message| message.name().to_string())
            .collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn command_updates_form_their_own_stream() {
        let store = InMemoryMessageStore::new();
        let issued = store
            .insert(
                NewMessage::Command(NewCommand {
                    device_id: "dev1".to_string(),
                    command: "reboot".to_string(),
                    parameters: None,
                    lifetime: None,
                    status: Some("pending".to_string()),
                    user_id: None,
                }),
                &device("dev1"),
            )
            .await
            .expect("insert");

        let updated = store
            .update_command(CommandUpdate {
                device_id: "dev1".to_string(),
                command_id: issued.id(),
                status: Some("done".to_string()),
                result: Some(serde_json::json!({"ok": true})),
            })
            .await
            .expect("update");
        assert!(updated.is_updated);
        assert_eq!(updated.status.as_deref(), Some("done"));

        let updates = store
            .find(&MessageQuery::search(MessageKind::CommandUpdate, 10))
            .await
            .expect("find");
        assert_eq!(updates, vec![HubMessage::CommandUpdate(updated.clone())]);
        assert_eq!(
            store.find_command(issued.id()).await.expect("lookup"),
            Some(updated)
        );
    }

    #[tokio::test]
    async fn updating_another_devices_command_is_not_found() {
        let store = InMemoryMessageStore::new();
        let err = store
            .update_command(CommandUpdate {
                device_id: "dev1".to_string(),
                command_id: 42,
                status: None,
                result: None,
            })
            .await
            .expect_err("missing command");
        assert_eq!(err.status_code(), 404);
    }
}
