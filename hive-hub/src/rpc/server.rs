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


use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::engine::SubscribeRequest;
use crate::error::HubError;
use crate::hub::HiveHub;
use crate::model::{DeviceScope, MessageKind, Principal, SubscriptionFilter};
use crate::observability::{events, fields};
use crate::rpc::envelope::{Request, RequestBody, Response, ResponseBody};
use crate::session::OutboundFrame;
use crate::sink::{DurableQueueSink, OutboundReceiver};

const COMPONENT: &str = "rpc_server";

/// Live events for subscriptions made through one [`RpcServer`].
pub struct RpcEvents {
    receiver: OutboundReceiver,
}

fn event_response(frame: OutboundFrame) -> Option<Response> {
    match frame {
        OutboundFrame::Push(push) => Some(Response::event(push.subscription_id, push.message)),
        OutboundFrame::Reply(_) => None,
    }
}

impl RpcEvents {
    /// Next event envelope; `None` once the server is gone.
    pub async fn recv(&mut self) -> Option<Response> {
        loop {
            if let Some(response) = event_response(self.receiver.recv().await?) {
                return Some(response);
            }
        }
    }

    pub fn try_recv(&mut self) -> Option<Response> {
        while let Ok(frame) = self.receiver.try_recv() {
            if let Some(response) = event_response(frame) {
                return Some(response);
            }
        }
        None
    }
}

/// Executes RPC requests against the hub.
///
/// Subscriptions made here deliver into one durable queue owned by the server; dropping the
/// server removes all of them.
pub struct RpcServer {
    hub: HiveHub,
    events: Arc<DurableQueueSink>,
}

impl RpcServer {
    pub(crate) fn new(hub: HiveHub) -> (Self, RpcEvents) {
        let (events, receiver) =
            DurableQueueSink::new(format!("rpc-{}", Uuid::new_v4()), hub.registry());
        (Self { hub, events }, RpcEvents { receiver })
    }

    pub async fn handle(&self, request: Request) -> Response {
        let action = request.action();
        debug!(
            event = events::RPC_REQUEST,
            component = COMPONENT,
            action = %action,
            correlation_id = %request.correlation_id,
            subscription_id = %fields::format_opt(request.subscription_id),
            "rpc request"
        );
        match self.dispatch(&request).await {
            Ok(response) => response,
            Err(err) => {
                warn!(
                    event = events::RPC_ERROR_RESPONSE,
                    component = COMPONENT,
                    action = %action,
                    correlation_id = %request.correlation_id,
                    fault = ?err.fault(),
                    err = %err,
                    "rpc request failed"
                );
                Response::failure(&request, &err)
            }
        }
    }

    async fn dispatch(&self, request: &Request) -> Result<Response, HubError> {
        match &request.body {
            RequestBody::Subscribe {
                principal,
                filter,
                timestamp,
                take,
            } => {
                self.subscribe(request, principal, filter, *timestamp, *take)
                    .await
            }
            RequestBody::Unsubscribe { kind } => self.unsubscribe(request, *kind),
            RequestBody::Insert { principal, message } => {
                let message = self.hub.insert(principal, message.clone()).await?;
                Ok(Response::reply(request, ResponseBody::Inserted { message }))
            }
            RequestBody::CommandUpdate { principal, update } => {
                let command = self.hub.update_command(principal, update.clone()).await?;
                Ok(Response::reply(request, ResponseBody::Updated { command }))
            }
            RequestBody::Search { principal, query } => {
                let messages = self.hub.search(principal, query.clone()).await?;
                Ok(Response::reply(
                    request,
                    ResponseBody::SearchResult {
                        kind: query.kind,
                        messages,
                    },
                ))
            }
        }
    }

    async fn subscribe(
        &self,
        request: &Request,
        principal: &Principal,
        filter: &SubscriptionFilter,
        timestamp: Option<DateTime<Utc>>,
        take: Option<usize>,
    ) -> Result<Response, HubError> {
        filter.validate()?;
        let take = self.hub.config().resolve_take(take)?;
        let scope = DeviceScope {
            device_ids: filter
                .devices
                .values()
                .map(|devices| devices.iter().cloned().collect())
                .unwrap_or_default(),
            network_ids: filter
                .network_ids
                .iter()
                .flatten()
                .copied()
                .collect(),
            device_type_ids: filter
                .device_type_ids
                .iter()
                .flatten()
                .copied()
                .collect(),
        };
        let names = filter
            .names
            .values()
            .map(|names| names.iter().cloned().collect());
        let Some(mut scoped) = self
            .hub
            .resolve_filter(principal, filter.kind, &scope, names)
            .await?
        else {
            return Err(HubError::forbidden("no accessible devices to subscribe to"));
        };
        if let Some(command_id) = filter.command_id {
            scoped = scoped.with_command_id(command_id);
        }

        let queue = self.events.lock().await?;
        let subscribed = self
            .hub
            .engine()
            .subscribe(
                SubscribeRequest {
                    subscription_id: request.subscription_id,
                    filter: scoped,
                    cursor: timestamp,
                    take,
                    owner: principal.clone(),
                },
                &self.events,
            )
            .await?;
        self.events
            .record_delivered(subscribed.subscription_id, &subscribed.backlog);
        drop(queue);

        Ok(Response::reply(
            request,
            ResponseBody::Subscribed {
                kind: filter.kind,
                backlog: subscribed.backlog,
            },
        )
        .with_subscription_id(subscribed.subscription_id))
    }

    /// Unknown ids, and ids owned by other servers, are acknowledged without effect.
    fn unsubscribe(&self, request: &Request, kind: MessageKind) -> Result<Response, HubError> {
        let subscription_id = request
            .subscription_id
            .ok_or_else(|| HubError::validation("unsubscribe requires a subscriptionId"))?;
        if self.events.is_bound(&subscription_id) {
            self.hub.engine().unsubscribe(&[subscription_id]);
        }
        Ok(Response::reply(request, ResponseBody::Unsubscribed { kind }))
    }

    /// Removes every subscription made through this server. Idempotent.
    pub fn close(&self) -> usize {
        self.events.close()
    }
}

impl Drop for RpcServer {
    fn drop(&mut self) {
        self.events.close();
    }
}
