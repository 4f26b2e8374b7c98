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


//! Typed RPC requests and responses and their JSON wire form.
//!
//! On the wire every envelope is `{action, correlationId, subscriptionId?, partitionKey?,
//! singleReply, body}`; the body's shape is implied by the action.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{Fault, HubError};
use crate::gateway::MessageQuery;
use crate::model::{
    CommandUpdate, DeviceCommand, HubMessage, MessageKind, NewMessage, Principal,
    SubscriptionFilter,
};
use crate::registry::SubscriptionId;
use crate::rpc::Action;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RequestBody {
    Subscribe {
        principal: Principal,
        filter: SubscriptionFilter,
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<DateTime<Utc>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        take: Option<usize>,
    },
    Unsubscribe {
        #[serde(skip)]
        kind: MessageKind,
    },
    Insert {
        principal: Principal,
        message: NewMessage,
    },
    CommandUpdate {
        principal: Principal,
        update: CommandUpdate,
    },
    Search {
        principal: Principal,
        query: MessageQuery,
    },
}

impl RequestBody {
    pub fn action(&self) -> Action {
        match self {
            RequestBody::Subscribe { filter, .. } => Action::subscribe(filter.kind).0,
            RequestBody::Unsubscribe { kind } => Action::unsubscribe(*kind).0,
            RequestBody::Insert { message, .. } => Action::insert(message.kind()).0,
            RequestBody::CommandUpdate { .. } => Action::CommandUpdateRequest,
            RequestBody::Search { query, .. } => Action::search(query.kind).0,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Request {
    pub correlation_id: Uuid,
    /// Routing hint for partitioned transports; opaque to the hub.
    pub partition_key: Option<String>,
    /// Whether the caller expects exactly one response.
    pub single_reply: bool,
    /// Caller-chosen id for subscribe, target id for unsubscribe.
    pub subscription_id: Option<SubscriptionId>,
    pub body: RequestBody,
}

impl Request {
    pub fn new(body: RequestBody) -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            partition_key: None,
            single_reply: true,
            subscription_id: None,
            body,
        }
    }

    pub fn with_subscription_id(mut self, subscription_id: SubscriptionId) -> Self {
        self.subscription_id = Some(subscription_id);
        self
    }

    pub fn with_partition_key(mut self, partition_key: impl Into<String>) -> Self {
        self.partition_key = Some(partition_key.into());
        self
    }

    pub fn action(&self) -> Action {
        self.body.action()
    }
}

/// Generic failure body any request may resolve to.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
    pub fault: Fault,
    pub status: u16,
}

impl From<&HubError> for ErrorBody {
    fn from(err: &HubError) -> Self {
        Self {
            message: err.message().to_string(),
            cause: err.cause().map(str::to_string),
            fault: err.fault(),
            status: err.status_code(),
        }
    }
}

impl ErrorBody {
    /// Rebuilds the hub error on the calling side.
    pub fn into_error(self) -> HubError {
        match self.status {
            400 => HubError::Validation(self.message),
            403 => HubError::Forbidden(self.message),
            404 => HubError::NotFound(self.message),
            409 => HubError::Conflict(self.message),
            410 => HubError::SessionClosed,
            _ => HubError::Upstream {
                message: self.message,
                cause: self.cause,
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResponseBody {
    Subscribed {
        #[serde(skip)]
        kind: MessageKind,
        backlog: Vec<HubMessage>,
    },
    Unsubscribed {
        #[serde(skip)]
        kind: MessageKind,
    },
    Inserted {
        message: HubMessage,
    },
    Updated {
        command: DeviceCommand,
    },
    SearchResult {
        #[serde(skip)]
        kind: MessageKind,
        messages: Vec<HubMessage>,
    },
    Event {
        message: HubMessage,
    },
    Error(ErrorBody),
}

impl ResponseBody {
    pub fn action(&self) -> Action {
        match self {
            ResponseBody::Subscribed { kind, .. } => Action::subscribe(*kind).1,
            ResponseBody::Unsubscribed { kind } => Action::unsubscribe(*kind).1,
            ResponseBody::Inserted { message } => Action::insert(message.kind()).1,
            ResponseBody::Updated { .. } => Action::CommandUpdateResponse,
            ResponseBody::SearchResult { kind, .. } => Action::search(*kind).1,
            ResponseBody::Event { message } => Action::event(message.kind()),
            ResponseBody::Error(_) => Action::ErrorResponse,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Response {
    pub correlation_id: Uuid,
    pub subscription_id: Option<SubscriptionId>,
    pub body: ResponseBody,
}

impl Response {
    /// Response correlated with `request`.
    pub fn reply(request: &Request, body: ResponseBody) -> Self {
        Self {
            correlation_id: request.correlation_id,
            subscription_id: request.subscription_id,
            body,
        }
    }

    pub fn failure(request: &Request, err: &HubError) -> Self {
        Self::reply(request, ResponseBody::Error(ErrorBody::from(err)))
    }

    /// Unsolicited event for a live RPC subscription.
    pub fn event(subscription_id: SubscriptionId, message: HubMessage) -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            subscription_id: Some(subscription_id),
            body: ResponseBody::Event { message },
        }
    }

    pub fn with_subscription_id(mut self, subscription_id: SubscriptionId) -> Self {
        self.subscription_id = Some(subscription_id);
        self
    }

    pub fn action(&self) -> Action {
        self.body.action()
    }

    pub fn is_error(&self) -> bool {
        matches!(self.body, ResponseBody::Error(_))
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEnvelope {
    action: Action,
    correlation_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    subscription_id: Option<SubscriptionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    partition_key: Option<String>,
    #[serde(default)]
    single_reply: bool,
    #[serde(default)]
    body: Value,
}

#[derive(Deserialize)]
struct SubscribeWire {
    principal: Principal,
    filter: SubscriptionFilter,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    take: Option<usize>,
}

#[derive(Deserialize)]
struct InsertWire {
    principal: Principal,
    message: NewMessage,
}

#[derive(Deserialize)]
struct UpdateWire {
    principal: Principal,
    update: CommandUpdate,
}

#[derive(Deserialize)]
struct SearchWire {
    principal: Principal,
    query: MessageQuery,
}

#[derive(Deserialize)]
struct BacklogWire {
    backlog: Vec<HubMessage>,
}

#[derive(Deserialize)]
struct MessageWire {
    message: HubMessage,
}

#[derive(Deserialize)]
struct CommandWire {
    command: DeviceCommand,
}

#[derive(Deserialize)]
struct MessagesWire {
    messages: Vec<HubMessage>,
}

fn body_as<T: DeserializeOwned>(action: Action, body: Value) -> Result<T, HubError> {
    serde_json::from_value(body)
        .map_err(|err| HubError::validation(format!("malformed {action} body: {err}")))
}

fn stream_of(action: Action) -> Result<MessageKind, HubError> {
    action
        .kind()
        .ok_or_else(|| HubError::validation(format!("{action} has no message stream")))
}

fn to_wire(envelope: &WireEnvelope) -> Result<String, HubError> {
    serde_json::to_string(envelope)
        .map_err(|err| HubError::upstream("envelope encoding failed", err))
}

fn from_wire(raw: &str) -> Result<WireEnvelope, HubError> {
    serde_json::from_str(raw)
        .map_err(|err| HubError::validation(format!("malformed envelope: {err}")))
}

pub fn encode_request(request: &Request) -> Result<String, HubError> {
    let body = serde_json::to_value(&request.body)
        .map_err(|err| HubError::upstream("request body encoding failed", err))?;
    to_wire(&WireEnvelope {
        action: request.action(),
        correlation_id: request.correlation_id,
        subscription_id: request.subscription_id,
        partition_key: request.partition_key.clone(),
        single_reply: request.single_reply,
        body,
    })
}

pub fn decode_request(raw: &str) -> Result<Request, HubError> {
    let envelope = from_wire(raw)?;
    let action = envelope.action;
    let body = match action {
        Action::NotificationSubscribeRequest
        | Action::CommandSubscribeRequest
        | Action::CommandUpdateSubscribeRequest => {
            let wire: SubscribeWire = body_as(action, envelope.body)?;
            RequestBody::Subscribe {
                principal: wire.principal,
                filter: wire.filter,
                timestamp: wire.timestamp,
                take: wire.take,
            }
        }
        Action::NotificationUnsubscribeRequest | Action::CommandUnsubscribeRequest => {
            RequestBody::Unsubscribe {
                kind: stream_of(action)?,
            }
        }
        Action::NotificationInsertRequest | Action::CommandInsertRequest => {
            let wire: InsertWire = body_as(action, envelope.body)?;
            RequestBody::Insert {
                principal: wire.principal,
                message: wire.message,
            }
        }
        Action::CommandUpdateRequest => {
            let wire: UpdateWire = body_as(action, envelope.body)?;
            RequestBody::CommandUpdate {
                principal: wire.principal,
                update: wire.update,
            }
        }
        Action::NotificationSearchRequest | Action::CommandSearchRequest => {
            let wire: SearchWire = body_as(action, envelope.body)?;
            RequestBody::Search {
                principal: wire.principal,
                query: wire.query,
            }
        }
        other => {
            return Err(HubError::validation(format!("{other} is not a request action")));
        }
    };
    if body.action() != action {
        return Err(HubError::validation(format!(
            "{action} body belongs to {}",
            body.action()
        )));
    }
    Ok(Request {
        correlation_id: envelope.correlation_id,
        partition_key: envelope.partition_key,
        single_reply: envelope.single_reply,
        subscription_id: envelope.subscription_id,
        body,
    })
}

pub fn encode_response(response: &Response) -> Result<String, HubError> {
    let body = serde_json::to_value(&response.body)
        .map_err(|err| HubError::upstream("response body encoding failed", err))?;
    to_wire(&WireEnvelope {
        action: response.action(),
        correlation_id: response.correlation_id,
        subscription_id: response.subscription_id,
        partition_key: None,
        single_reply: false,
        body,
    })
}

pub fn decode_response(raw: &str) -> Result<Response, HubError> {
    let envelope = from_wire(raw)?;
    let action = envelope.action;
    let body = match action {
        Action::NotificationSubscribeResponse
        | Action::CommandSubscribeResponse
        | Action::CommandUpdateSubscribeResponse => {
            let wire: BacklogWire = body_as(action, envelope.body)?;
            ResponseBody::Subscribed {
                kind: stream_of(action)?,
                backlog: wire.backlog,
            }
        }
        Action::NotificationUnsubscribeResponse | Action::CommandUnsubscribeResponse => {
            ResponseBody::Unsubscribed {
                kind: stream_of(action)?,
            }
        }
        Action::NotificationInsertResponse | Action::CommandInsertResponse => {
            let wire: MessageWire = body_as(action, envelope.body)?;
            ResponseBody::Inserted {
                message: wire.message,
            }
        }
        Action::CommandUpdateResponse => {
            let wire: CommandWire = body_as(action, envelope.body)?;
            ResponseBody::Updated {
                command: wire.command,
            }
        }
        Action::NotificationSearchResponse | Action::CommandSearchResponse => {
            let wire: MessagesWire = body_as(action, envelope.body)?;
            ResponseBody::SearchResult {
                kind: stream_of(action)?,
                messages: wire.messages,
            }
        }
        Action::NotificationEvent | Action::CommandEvent | Action::CommandUpdateEvent => {
            let wire: MessageWire = body_as(action, envelope.body)?;
            ResponseBody::Event {
                message: wire.message,
            }
        }
        Action::ErrorResponse => ResponseBody::Error(body_as(action, envelope.body)?),
        other => {
            return Err(HubError::validation(format!("{other} is not a response action")));
        }
    };
    if body.action() != action {
        return Err(HubError::validation(format!(
            "{action} body belongs to {}",
            body.action()
        )));
    }
    Ok(Response {
        correlation_id: envelope.correlation_id,
        subscription_id: envelope.subscription_id,
        body,
    })
}
