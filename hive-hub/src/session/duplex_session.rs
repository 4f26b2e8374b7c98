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

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::SubscribeRequest;
use crate::error::HubError;
use crate::hub::HiveHub;
use crate::model::{
    CommandUpdate, DeviceCommand, DeviceScope, HubMessage, MessageKind, NewCommand, NewMessage,
    NewNotification, Principal,
};
use crate::observability::events;
use crate::registry::SubscriptionId;
use crate::session::protocol::{
    self, InsertCommandParams, InsertNotificationParams, OutboundFrame, Reply, ReplyBody,
    SessionRequest, SubscribeParams, UnsubscribeParams, UpdateCommandParams,
};
use crate::sink::{DurableQueueSink, OutboundReceiver};

const COMPONENT: &str = "duplex_session";

/// Legacy subscriptions are tracked by the device set they named; `None` is all devices.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
struct LegacyKey {
    kind: MessageKind,
    devices: Option<BTreeSet<String>>,
}

/// State of one persistent connection.
///
/// The durable sink's queue lock is the session lock: subscribe holds it across
/// registration, backlog read and backlog enqueue, and every live push takes it, so no live
/// message can overtake the backlog.
pub struct DuplexSession {
    id: String,
    hub: HiveHub,
    principal: Principal,
    sink: Arc<DurableQueueSink>,
    legacy: Mutex<HashMap<LegacyKey, HashSet<SubscriptionId>>>,
}

fn subscribe_action(kind: MessageKind) -> &'static str {
    match kind {
        MessageKind::Command => protocol::COMMAND_SUBSCRIBE,
        MessageKind::CommandUpdate => protocol::COMMAND_UPDATE_SUBSCRIBE,
        MessageKind::Notification => protocol::NOTIFICATION_SUBSCRIBE,
    }
}

fn unsubscribe_action(kind: MessageKind) -> &'static str {
    match kind {
        MessageKind::Command | MessageKind::CommandUpdate => protocol::COMMAND_UNSUBSCRIBE,
        MessageKind::Notification => protocol::NOTIFICATION_UNSUBSCRIBE,
    }
}

impl DuplexSession {
    pub(crate) fn open(hub: HiveHub, principal: Principal) -> (Self, OutboundReceiver) {
        let id = Uuid::new_v4().to_string();
        let (sink, receiver) = DurableQueueSink::new(id.clone(), hub.registry());
        info!(
            event = events::SESSION_OPEN,
            component = COMPONENT,
            session_id = %id,
            principal = %principal,
            "duplex session opened"
        );
        (
            Self {
                id,
                hub,
                principal,
                sink,
                legacy: Mutex::new(HashMap::new()),
            },
            receiver,
        )
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn is_closed(&self) -> bool {
        self.sink.is_closed()
    }

    /// Ids of every subscription this session currently owns.
    pub fn subscription_ids(&self) -> Vec<SubscriptionId> {
        self.sink.bound_ids()
    }

    fn lock_legacy(&self) -> MutexGuard<'_, HashMap<LegacyKey, HashSet<SubscriptionId>>> {
        self.legacy.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a subscription, then enqueues its acknowledgement and backlog.
    pub async fn subscribe(
        &self,
        kind: MessageKind,
        params: SubscribeParams,
    ) -> Result<SubscriptionId, HubError> {
        if params.device_guid.is_some() && params.device_guids.is_some() {
            return Err(HubError::validation(
                "deviceGuid and deviceGuids cannot be combined",
            ));
        }
        if matches!(&params.names, Some(names) if names.is_empty()) {
            return Err(HubError::validation("names must not be empty"));
        }
        if params.command_id.is_some() && kind != MessageKind::CommandUpdate {
            return Err(HubError::validation(
                "commandId is only valid for command update subscriptions",
            ));
        }
        if self.is_closed() {
            return Err(HubError::SessionClosed);
        }

        let SubscribeParams {
            request_id,
            subscription_id,
            device_guid,
            device_guids,
            network_ids,
            device_type_ids,
            names,
            timestamp,
            command_id,
        } = params;
        let device_ids: Option<Vec<String>> = device_guid.map(|guid| vec![guid]).or(device_guids);
        let legacy_key = names.is_none().then(|| LegacyKey {
            kind,
            devices: device_ids
                .as_ref()
                .map(|ids| ids.iter().cloned().collect()),
        });
        let scope = DeviceScope {
            device_ids: device_ids.unwrap_or_default(),
            network_ids: network_ids.unwrap_or_default(),
            device_type_ids: device_type_ids.unwrap_or_default(),
        };

        let Some(mut filter) = self
            .hub
            .resolve_filter(&self.principal, kind, &scope, names)
            .await?
        else {
            return Err(HubError::forbidden("no accessible devices to subscribe to"));
        };
        if let Some(command_id) = command_id {
            filter = filter.with_command_id(command_id);
        }

        let mut queue = self.sink.lock().await?;
        let subscribed = self
            .hub
            .engine()
            .subscribe(
                SubscribeRequest {
                    subscription_id,
                    filter,
                    cursor: timestamp,
                    take: self.hub.config().default_take,
                    owner: self.principal.clone(),
                },
                &self.sink,
            )
            .await?;
        let subscription_id = subscribed.subscription_id;

        queue.enqueue(OutboundFrame::Reply(Reply::success(
            subscribe_action(kind),
            request_id,
            ReplyBody::Subscribed { subscription_id },
        )));
        let backlog = self
            .sink
            .enqueue_backlog(&mut queue, subscription_id, subscribed.backlog);
        if let Some(key) = legacy_key {
            self.lock_legacy()
                .entry(key)
                .or_default()
                .insert(subscription_id);
        }
        drop(queue);

        debug!(
            component = COMPONENT,
            session_id = %self.id,
            subscription_id = %subscription_id,
            kind = %kind,
            backlog,
            "session subscription active"
        );
        Ok(subscription_id)
    }

    /// Removes subscriptions by explicit id or, without one, by the legacy device set.
    ///
    /// Unknown ids are acknowledged with an empty list.
    pub async fn unsubscribe(
        &self,
        kind: MessageKind,
        params: UnsubscribeParams,
    ) -> Result<Vec<SubscriptionId>, HubError> {
        let UnsubscribeParams {
            request_id,
            subscription_id,
            device_guids,
        } = params;

        let mut queue = self.sink.lock().await?;
        let ids: Vec<SubscriptionId> = {
            let mut legacy = self.lock_legacy();
            match subscription_id {
                Some(id) => {
                    for ids in legacy.values_mut() {
                        ids.remove(&id);
                    }
                    legacy.retain(|_, ids| !ids.is_empty());
                    if self.sink.is_bound(&id) {
                        vec![id]
                    } else {
                        Vec::new()
                    }
                }
                None => {
                    let devices: Option<BTreeSet<String>> =
                        device_guids.map(|guids| guids.into_iter().collect());
                    // Command unsubscribe also covers command-update streams.
                    let kinds: &[MessageKind] = match kind {
                        MessageKind::Command => &[MessageKind::Command, MessageKind::CommandUpdate],
                        _ => std::slice::from_ref(&kind),
                    };
                    let ids: Vec<SubscriptionId> = kinds
                        .iter()
                        .filter_map(|kind| {
                            legacy.remove(&LegacyKey {
                                kind: *kind,
                                devices: devices.clone(),
                            })
                        })
                        .flatten()
                        .collect();
                    debug!(
                        event = events::SESSION_LEGACY_UNSUBSCRIBE,
                        component = COMPONENT,
                        session_id = %self.id,
                        kind = %kind,
                        count = ids.len(),
                        "legacy unsubscribe resolved"
                    );
                    ids
                }
            }
        };

        self.hub.engine().unsubscribe(&ids);
        queue.enqueue(OutboundFrame::Reply(Reply::success(
            unsubscribe_action(kind),
            request_id,
            ReplyBody::Unsubscribed {
                subscription_ids: ids.clone(),
            },
        )));
        Ok(ids)
    }

    pub async fn insert_notification(
        &self,
        params: InsertNotificationParams,
    ) -> Result<HubMessage, HubError> {
        if self.is_closed() {
            return Err(HubError::SessionClosed);
        }
        self.hub
            .insert(
                &self.principal,
                NewMessage::Notification(NewNotification {
                    device_id: params.device_guid,
                    notification: params.notification.notification,
                    parameters: params.notification.parameters,
                }),
            )
            .await
    }

    pub async fn insert_command(&self, params: InsertCommandParams) -> Result<HubMessage, HubError> {
        if self.is_closed() {
            return Err(HubError::SessionClosed);
        }
        self.hub
            .insert(
                &self.principal,
                NewMessage::Command(NewCommand {
                    device_id: params.device_guid,
                    command: params.command.command,
                    parameters: params.command.parameters,
                    lifetime: params.command.lifetime,
                    status: params.command.status,
                    user_id: None,
                }),
            )
            .await
    }

    pub async fn update_command(
        &self,
        params: UpdateCommandParams,
    ) -> Result<DeviceCommand, HubError> {
        if self.is_closed() {
            return Err(HubError::SessionClosed);
        }
        self.hub
            .update_command(
                &self.principal,
                CommandUpdate {
                    device_id: params.device_guid,
                    command_id: params.command_id,
                    status: params.command.status,
                    result: params.command.result,
                },
            )
            .await
    }

    /// Executes one inbound request and enqueues its reply.
    pub async fn handle(&self, request: SessionRequest) {
        let action = request.action();
        let request_id = request.request_id().map(str::to_string);
        let result: Result<Option<ReplyBody>, HubError> = match request {
            SessionRequest::NotificationSubscribe(params) => self
                .subscribe(MessageKind::Notification, params)
                .await
                .map(|_| None),
            SessionRequest::CommandSubscribe(params) => self
                .subscribe(MessageKind::Command, params)
                .await
                .map(|_| None),
            SessionRequest::CommandUpdateSubscribe(params) => self
                .subscribe(MessageKind::CommandUpdate, params)
                .await
                .map(|_| None),
            SessionRequest::NotificationUnsubscribe(params) => self
                .unsubscribe(MessageKind::Notification, params)
                .await
                .map(|_| None),
            SessionRequest::CommandUnsubscribe(params) => self
                .unsubscribe(MessageKind::Command, params)
                .await
                .map(|_| None),
            SessionRequest::NotificationInsert(params) => self
                .insert_notification(params)
                .await
                .map(|message| Some(ReplyBody::Inserted { message })),
            SessionRequest::CommandInsert(params) => self
                .insert_command(params)
                .await
                .map(|message| Some(ReplyBody::Inserted { message })),
            SessionRequest::CommandUpdate(params) => self
                .update_command(params)
                .await
                .map(|command| Some(ReplyBody::Updated { command })),
        };

        match result {
            Ok(None) => {}
            Ok(Some(body)) => {
                self.reply(Reply::success(action, request_id, body)).await;
            }
            Err(err) => self.reject(action, request_id, &err).await,
        }
    }

    /// Answers a request that failed, or could not be parsed, with an error reply.
    pub async fn reject(&self, action: &str, request_id: Option<String>, err: &HubError) {
        warn!(
            event = events::SESSION_REQUEST_FAILED,
            component = COMPONENT,
            session_id = %self.id,
            action,
            err = %err,
            "session request failed"
        );
        self.reply(Reply::failure(action, request_id, err)).await;
    }

    async fn reply(&self, reply: Reply) {
        if let Ok(mut queue) = self.sink.lock().await {
            queue.enqueue(OutboundFrame::Reply(reply));
        }
    }

    /// Removes every subscription of the session in one batch. Idempotent.
    pub fn close(&self) -> usize {
        if self.sink.is_closed() {
            return 0;
        }
        let removed = self.sink.close();
        self.lock_legacy().clear();
        info!(
            event = events::SESSION_CLOSE,
            component = COMPONENT,
            session_id = %self.id,
            removed,
            "duplex session closed"
        );
        removed
    }
}

impl Drop for DuplexSession {
    fn drop(&mut self) {
        self.close();
    }
}
