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

//! Duplex request and frame shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::HubError;
use crate::model::{DeviceCommand, HubMessage, MessageId, MessageKind};
use crate::registry::SubscriptionId;

pub(crate) const NOTIFICATION_SUBSCRIBE: &str = "notification/subscribe";
pub(crate) const NOTIFICATION_UNSUBSCRIBE: &str = "notification/unsubscribe";
pub(crate) const NOTIFICATION_INSERT: &str = "notification/insert";
pub(crate) const COMMAND_SUBSCRIBE: &str = "command/subscribe";
pub(crate) const COMMAND_UNSUBSCRIBE: &str = "command/unsubscribe";
pub(crate) const COMMAND_INSERT: &str = "command/insert";
pub(crate) const COMMAND_UPDATE: &str = "command/update";
pub(crate) const COMMAND_UPDATE_SUBSCRIBE: &str = "command/update/subscribe";

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeParams {
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub subscription_id: Option<SubscriptionId>,
    #[serde(default)]
    pub device_guid: Option<String>,
    #[serde(default)]
    pub device_guids: Option<Vec<String>>,
    #[serde(default)]
    pub network_ids: Option<Vec<i64>>,
    #[serde(default)]
    pub device_type_ids: Option<Vec<i64>>,
    #[serde(default)]
    pub names: Option<Vec<String>>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    /// Only for `command/update/subscribe`.
    #[serde(default)]
    pub command_id: Option<MessageId>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UnsubscribeParams {
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub subscription_id: Option<SubscriptionId>,
    /// Legacy mode: resolves the ids recorded for this device set.
    #[serde(default)]
    pub device_guids: Option<Vec<String>>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationBody {
    pub notification: String,
    #[serde(default)]
    pub parameters: Option<Value>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InsertNotificationParams {
    #[serde(default)]
    pub request_id: Option<String>,
    pub device_guid: String,
    pub notification: NotificationBody,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CommandBody {
    pub command: String,
    #[serde(default)]
    pub parameters: Option<Value>,
    #[serde(default)]
    pub lifetime: Option<i32>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InsertCommandParams {
    #[serde(default)]
    pub request_id: Option<String>,
    pub device_guid: String,
    pub command: CommandBody,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CommandStatusBody {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub result: Option<Value>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCommandParams {
    #[serde(default)]
    pub request_id: Option<String>,
    pub device_guid: String,
    pub command_id: MessageId,
    pub command: CommandStatusBody,
}

/// One inbound duplex message, tagged by `action`.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "action")]
pub enum SessionRequest {
    #[serde(rename = "notification/subscribe")]
    NotificationSubscribe(SubscribeParams),
    #[serde(rename = "notification/unsubscribe")]
    NotificationUnsubscribe(UnsubscribeParams),
    #[serde(rename = "notification/insert")]
    NotificationInsert(InsertNotificationParams),
    #[serde(rename = "command/subscribe")]
    CommandSubscribe(SubscribeParams),
    #[serde(rename = "command/unsubscribe")]
    CommandUnsubscribe(UnsubscribeParams),
    #[serde(rename = "command/insert")]
    CommandInsert(InsertCommandParams),
    #[serde(rename = "command/update")]
    CommandUpdate(UpdateCommandParams),
    #[serde(rename = "command/update/subscribe")]
    CommandUpdateSubscribe(SubscribeParams),
}

impl SessionRequest {
    pub fn action(&self) -> &'static str {
        match self {
            SessionRequest::NotificationSubscribe(_) => NOTIFICATION_SUBSCRIBE,
            SessionRequest::NotificationUnsubscribe(_) => NOTIFICATION_UNSUBSCRIBE,
            SessionRequest::NotificationInsert(_) => NOTIFICATION_INSERT,
            SessionRequest::CommandSubscribe(_) => COMMAND_SUBSCRIBE,
            SessionRequest::CommandUnsubscribe(_) => COMMAND_UNSUBSCRIBE,
            SessionRequest::CommandInsert(_) => COMMAND_INSERT,
            SessionRequest::CommandUpdate(_) => COMMAND_UPDATE,
            SessionRequest::CommandUpdateSubscribe(_) => COMMAND_UPDATE_SUBSCRIBE,
        }
    }

    pub fn request_id(&self) -> Option<&str> {
        match self {
            SessionRequest::NotificationSubscribe(params)
            | SessionRequest::CommandSubscribe(params)
            | SessionRequest::CommandUpdateSubscribe(params) => params.request_id.as_deref(),
            SessionRequest::NotificationUnsubscribe(params)
            | SessionRequest::CommandUnsubscribe(params) => params.request_id.as_deref(),
            SessionRequest::NotificationInsert(params) => params.request_id.as_deref(),
            SessionRequest::CommandInsert(params) => params.request_id.as_deref(),
            SessionRequest::CommandUpdate(params) => params.request_id.as_deref(),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    Success,
    Error,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ReplyBody {
    #[serde(rename_all = "camelCase")]
    Subscribed { subscription_id: SubscriptionId },
    #[serde(rename_all = "camelCase")]
    Unsubscribed { subscription_ids: Vec<SubscriptionId> },
    Inserted { message: HubMessage },
    Updated { command: DeviceCommand },
    Failed { code: u16, error: String },
}

/// Response to one inbound request, echoing its action and request id.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub status: ReplyStatus,
    #[serde(flatten)]
    pub body: ReplyBody,
}

impl Reply {
    pub fn success(action: &str, request_id: Option<String>, body: ReplyBody) -> Self {
        Self {
            action: action.to_string(),
            request_id,
            status: ReplyStatus::Success,
            body,
        }
    }

    pub fn failure(action: &str, request_id: Option<String>, err: &HubError) -> Self {
        Self {
            action: action.to_string(),
            request_id,
            status: ReplyStatus::Error,
            body: ReplyBody::Failed {
                code: err.status_code(),
                error: err.to_string(),
            },
        }
    }
}

/// A live or backlog message pushed to the client for one subscription.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Push {
    pub action: &'static str,
    pub subscription_id: SubscriptionId,
    pub message: HubMessage,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutboundFrame {
    Reply(Reply),
    Push(Push),
}

impl OutboundFrame {
    pub fn push(subscription_id: SubscriptionId, message: HubMessage) -> Self {
        let action = match message.kind() {
            MessageKind::Command => COMMAND_INSERT,
            MessageKind::CommandUpdate => COMMAND_UPDATE,
            MessageKind::Notification => NOTIFICATION_INSERT,
        };
        OutboundFrame::Push(Push {
            action,
            subscription_id,
            message,
        })
    }
}
