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

//! Commands, notifications and command updates as a closed tagged union.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{Display, Formatter};

pub type MessageId = i64;

/// Stream a message travels on. Each kind has its own registry index.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Command,
    CommandUpdate,
    Notification,
}

impl MessageKind {
    pub const ALL: [MessageKind; 3] = [
        MessageKind::Command,
        MessageKind::CommandUpdate,
        MessageKind::Notification,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Command => "command",
            MessageKind::CommandUpdate => "command_update",
            MessageKind::Notification => "notification",
        }
    }
}

impl Display for MessageKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceNotification {
    pub id: MessageId,
    pub device_id: String,
    pub notification: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_type_id: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceCommand {
    pub id: MessageId,
    pub device_id: String,
    pub command: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifetime: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default)]
    pub is_updated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_type_id: Option<i64>,
}

/// A stored message as it flows through dispatch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message", rename_all = "snake_case")]
pub enum HubMessage {
    Command(DeviceCommand),
    CommandUpdate(DeviceCommand),
    Notification(DeviceNotification),
}

/// Identity used to suppress duplicates between backlog and live delivery.
///
/// Command updates reuse the command id, so the revision timestamp is part of the identity.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct MessageIdentity {
    pub kind: MessageKind,
    pub id: MessageId,
    pub revision: DateTime<Utc>,
}

impl HubMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            HubMessage::Command(_) => MessageKind::Command,
            HubMessage::CommandUpdate(_) => MessageKind::CommandUpdate,
            HubMessage::Notification(_) => MessageKind::Notification,
        }
    }

    pub fn id(&self) -> MessageId {
        match self {
            HubMessage::Command(command) | HubMessage::CommandUpdate(command) => command.id,
            HubMessage::Notification(notification) => notification.id,
        }
    }

    pub fn device_id(&self) -> &str {
        match self {
            HubMessage::Command(command) | HubMessage::CommandUpdate(command) => {
                &command.device_id
            }
            HubMessage::Notification(notification) => &notification.device_id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            HubMessage::Command(command) | HubMessage::CommandUpdate(command) => &command.command,
            HubMessage::Notification(notification) => &notification.notification,
        }
    }

    /// Ordering timestamp. For command updates this is the time of the update.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            HubMessage::Command(command) => command.timestamp,
            HubMessage::CommandUpdate(command) => command.last_updated.unwrap_or(command.timestamp),
            HubMessage::Notification(notification) => notification.timestamp,
        }
    }

    pub fn network_id(&self) -> Option<i64> {
        match self {
            HubMessage::Command(command) | HubMessage::CommandUpdate(command) => {
                command.network_id
            }
            HubMessage::Notification(notification) => notification.network_id,
        }
    }

    pub fn device_type_id(&self) -> Option<i64> {
        match self {
            HubMessage::Command(command) | HubMessage::CommandUpdate(command) => {
                command.device_type_id
            }
            HubMessage::Notification(notification) => notification.device_type_id,
        }
    }

    pub fn identity(&self) -> MessageIdentity {
        MessageIdentity {
            kind: self.kind(),
            id: self.id(),
            revision: self.timestamp(),
        }
    }
}

/// A notification submitted by a device, before the store assigns id and timestamp.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNotification {
    pub device_id: String,
    pub notification: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

/// A command submitted by a client, before the store assigns id and timestamp.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCommand {
    pub device_id: String,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifetime: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message", rename_all = "snake_case")]
pub enum NewMessage {
    Command(NewCommand),
    Notification(NewNotification),
}

impl NewMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            NewMessage::Command(_) => MessageKind::Command,
            NewMessage::Notification(_) => MessageKind::Notification,
        }
    }

    pub fn device_id(&self) -> &str {
        match self {
            NewMessage::Command(command) => &command.device_id,
            NewMessage::Notification(notification) => &notification.device_id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            NewMessage::Command(command) => &command.command,
            NewMessage::Notification(notification) => &notification.notification,
        }
    }
}

/// Status/result update for a previously inserted command.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandUpdate {
    pub device_id: String,
    pub command_id: MessageId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}
