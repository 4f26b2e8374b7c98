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


use serde::Serialize;
use std::future::{pending, Future};
use tracing::{debug, warn};

use crate::engine::{PollOutcome, PollRequest};
use crate::error::HubError;
use crate::hub::HiveHub;
use crate::longpoll::params::{PollParams, WaitParams};
use crate::model::{DeviceCommand, HubMessage, MessageKind, Principal, SubscriptionFilter};
use crate::observability::events;

const COMPONENT: &str = "long_poll";

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PollBody {
    Messages(Vec<HubMessage>),
    Command(DeviceCommand),
    Empty,
    Error { message: String },
}

/// Transport-neutral response: an HTTP-style status and a body.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PollResponse {
    pub status: u16,
    pub body: PollBody,
}

impl PollResponse {
    pub fn messages(messages: Vec<HubMessage>) -> Self {
        Self {
            status: 200,
            body: PollBody::Messages(messages),
        }
    }

    pub fn command(command: DeviceCommand) -> Self {
        Self {
            status: 200,
            body: PollBody::Command(command),
        }
    }

    pub fn no_content() -> Self {
        Self {
            status: 204,
            body: PollBody::Empty,
        }
    }

    pub fn error(err: &HubError) -> Self {
        Self {
            status: err.status_code(),
            body: PollBody::Error {
                message: err.to_string(),
            },
        }
    }
}

/// Serves notification, command and command-update polls plus single-command waits.
///
/// Every rejection (bad parameters, inaccessible or unknown devices) is decided before the
/// engine registers anything.
#[derive(Clone)]
pub struct LongPollAdapter {
    hub: HiveHub,
}

impl LongPollAdapter {
    pub(crate) fn new(hub: HiveHub) -> Self {
        Self { hub }
    }

    pub async fn poll(
        &self,
        kind: MessageKind,
        principal: &Principal,
        params: PollParams,
    ) -> PollResponse {
        self.poll_until(kind, principal, params, pending()).await
    }

    /// Like [`poll`](Self::poll); `disconnected` is the transport's cancellation signal.
    pub async fn poll_until<F>(
        &self,
        kind: MessageKind,
        principal: &Principal,
        params: PollParams,
        disconnected: F,
    ) -> PollResponse
    where
        F: Future<Output = ()> + Send,
    {
        let response = match self.try_poll(kind, principal, params, disconnected).await {
            Ok(messages) => PollResponse::messages(messages),
            Err(err) => self.reject(kind, principal, err),
        };
        self.respond(kind, principal, response)
    }

    async fn try_poll<F>(
        &self,
        kind: MessageKind,
        principal: &Principal,
        params: PollParams,
        disconnected: F,
    ) -> Result<Vec<HubMessage>, HubError>
    where
        F: Future<Output = ()> + Send,
    {
        let config = self.hub.config();
        let wait = config.resolve_wait_timeout(params.wait_timeout)?;
        let take = config.resolve_take(params.limit)?;
        let cursor = params.cursor()?;
        let scope = params.scope()?;

        let Some(filter) = self
            .hub
            .resolve_filter(principal, kind, &scope, params.names())
            .await?
        else {
            debug!(
                event = events::LONG_POLL_NO_DEVICES,
                component = COMPONENT,
                kind = %kind,
                principal = %principal,
                "no accessible devices, answering empty"
            );
            return Ok(Vec::new());
        };

        let outcome = self
            .hub
            .engine()
            .poll_until(
                PollRequest {
                    filter,
                    cursor,
                    wait,
                    take,
                    owner: principal.clone(),
                },
                disconnected,
            )
            .await?;
        Ok(outcome.into_messages())
    }

    pub async fn wait_command(&self, principal: &Principal, params: WaitParams) -> PollResponse {
        self.wait_command_until(principal, params, pending()).await
    }

    /// Waits until the command's status or result is set.
    ///
    /// 200 with the command once updated, 204 on timeout, 404 for an unknown device or
    /// command, 400 when the command belongs to another device.
    pub async fn wait_command_until<F>(
        &self,
        principal: &Principal,
        params: WaitParams,
        disconnected: F,
    ) -> PollResponse
    where
        F: Future<Output = ()> + Send,
    {
        let response = match self.try_wait_command(principal, params, disconnected).await {
            Ok(Some(command)) => PollResponse::command(command),
            Ok(None) => PollResponse::no_content(),
            Err(err) => self.reject(MessageKind::CommandUpdate, principal, err),
        };
        self.respond(MessageKind::CommandUpdate, principal, response)
    }

    async fn try_wait_command<F>(
        &self,
        principal: &Principal,
        params: WaitParams,
        disconnected: F,
    ) -> Result<Option<DeviceCommand>, HubError>
    where
        F: Future<Output = ()> + Send,
    {
        let wait = self.hub.config().resolve_wait_timeout(params.wait_timeout)?;
        self.hub
            .access()
            .resolve_device(&params.device_id, principal)
            .await?;
        let Some(command) = self.hub.engine().find_command(params.command_id).await? else {
            return Err(HubError::not_found(format!("command {}", params.command_id)));
        };
        if command.device_id != params.device_id {
            return Err(HubError::validation(format!(
                "command {} does not belong to device {}",
                params.command_id, params.device_id
            )));
        }
        if command.is_updated {
            return Ok(Some(command));
        }

        let filter = SubscriptionFilter::new(MessageKind::CommandUpdate)
            .with_devices([command.device_id.clone()])
            .with_command_id(command.id);
        let outcome = self
            .hub
            .engine()
            .poll_until(
                PollRequest {
                    filter,
                    cursor: Some(command.timestamp),
                    wait,
                    take: 1,
                    owner: principal.clone(),
                },
                disconnected,
            )
            .await?;
        Ok(match outcome {
            PollOutcome::Delivered(messages) => {
                messages.into_iter().find_map(|message| match message {
                    HubMessage::CommandUpdate(command) | HubMessage::Command(command) => {
                        Some(command)
                    }
                    HubMessage::Notification(_) => None,
                })
            }
            PollOutcome::TimedOut | PollOutcome::Cancelled => None,
        })
    }

    fn reject(&self, kind: MessageKind, principal: &Principal, err: HubError) -> PollResponse {
        warn!(
            event = events::LONG_POLL_REJECTED,
            component = COMPONENT,
            kind = %kind,
            principal = %principal,
            status = err.status_code(),
            err = %err,
            "long poll failed"
        );
        PollResponse::error(&err)
    }

    fn respond(&self, kind: MessageKind, principal: &Principal, response: PollResponse) -> PollResponse {
        let count = match &response.body {
            PollBody::Messages(messages) => messages.len(),
            PollBody::Command(_) => 1,
            PollBody::Empty | PollBody::Error { .. } => 0,
        };
        debug!(
            event = events::LONG_POLL_RESPONSE,
            component = COMPONENT,
            kind = %kind,
            principal = %principal,
            status = response.status,
            count,
            "long poll answered"
        );
        response
    }
}

#[cfg(test)]
mod tests {
    use super::{PollBody, PollResponse};
    use crate::longpoll::{PollParams, WaitParams};
    use crate::model::{CommandUpdate, HubMessage, MessageKind, Principal};
    use crate::testing::{command, device, notify, test_hub};
    use chrono::{Duration as ChronoDuration, Utc};
    use std::time::Duration;

    fn params(device: &str, names: &str, wait: i64) -> PollParams {
        PollParams {
            device_id: Some(device.to_string()),
            names: Some(names.to_string()),
            wait_timeout: Some(wait),
            ..PollParams::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn live_notification_answers_waiting_poll() {
        let hub = test_hub();
        let adapter = hub.long_poll();
        let waiter = tokio::spawn(async move {
            adapter
                .poll(
                    MessageKind::Notification,
                    &Principal::new("alice"),
                    params("dev1", "foo", 30),
                )
                .await
        });
        while hub.registry().count() == 0 {
            tokio::task::yield_now().await;
        }

        tokio::time::sleep(Duration::from_secs(2)).await;
        let stored = hub
            .engine()
            .publish(notify("dev1", "foo"), &device("dev1"))
            .await
            .expect("insert");

        let response = waiter.await.expect("join");
        assert_eq!(response, PollResponse::messages(vec![stored]));
        assert_eq!(hub.registry().count(), 0);
    }

    #[tokio::test]
    async fn zero_wait_answers_empty_immediately() {
        let hub = test_hub();
        let response = hub
            .long_poll()
            .poll(
                MessageKind::Command,
                &Principal::new("alice"),
                params("dev1", "", 0),
            )
            .await;
        assert_eq!(response, PollResponse::messages(Vec::new()));
        assert_eq!(hub.registry().count(), 0);
    }

    #[tokio::test]
    async fn access_failures_reject_before_registration() {
        let hub = test_hub();
        let adapter = hub.long_poll();

        let forbidden = adapter
            .poll(
                MessageKind::Notification,
                &Principal::new("bob"),
                params("dev1", "foo", 30),
            )
            .await;
        assert_eq!(forbidden.status, 403);

        let unknown = adapter
            .poll(
                MessageKind::Notification,
                &Principal::new("alice"),
                params("nope", "foo", 30),
            )
            .await;
        assert_eq!(unknown.status, 404);
        assert_eq!(hub.registry().version(), 0);
    }

    #[tokio::test]
    async fn out_of_range_wait_is_a_validation_error() {
        let hub = test_hub();
        let response = hub
            .long_poll()
            .poll(
                MessageKind::Notification,
                &Principal::new("alice"),
                params("dev1", "foo", 61),
            )
            .await;
        assert_eq!(response.status, 400);
        assert!(matches!(response.body, PollBody::Error { .. }));
    }

    #[tokio::test]
    async fn empty_device_set_answers_without_registering() {
        let hub = test_hub();
        let response = hub
            .long_poll()
            .poll(
                MessageKind::Notification,
                &Principal::new("nobody"),
                PollParams {
                    wait_timeout: Some(30),
                    ..PollParams::default()
                },
            )
            .await;
        assert_eq!(response, PollResponse::messages(Vec::new()));
        assert_eq!(hub.registry().version(), 0);
    }

    #[tokio::test]
    async fn backlog_since_cursor_is_returned() {
        let hub = test_hub();
        let cursor = Utc::now() - ChronoDuration::seconds(5);
        let stored = hub
            .engine()
            .publish(notify("dev2", "foo"), &device("dev2"))
            .await
            .expect("insert");

        let response = hub
            .long_poll()
            .poll(
                MessageKind::Notification,
                &Principal::new("alice"),
                PollParams {
                    timestamp: Some(cursor.to_rfc3339()),
                    wait_timeout: Some(30),
                    ..PollParams::default()
                },
            )
            .await;
        assert_eq!(response, PollResponse::messages(vec![stored]));
    }

    #[tokio::test(start_paused = true)]
    async fn command_wait_returns_update_or_no_content() {
        let hub = test_hub();
        let principal = Principal::new("alice");
        let HubMessage::Command(issued) = hub
            .insert(&principal, command("dev1", "reboot"))
            .await
            .expect("insert")
        else {
            panic!("expected a command");
        };

        let timed_out = hub
            .long_poll()
            .wait_command(
                &principal,
                WaitParams {
                    device_id: "dev1".to_string(),
                    command_id: issued.id,
                    wait_timeout: Some(5),
                },
            )
            .await;
        assert_eq!(timed_out, PollResponse::no_content());

        let adapter = hub.long_poll();
        let waiter = {
            let principal = principal.clone();
            tokio::spawn(async move {
                adapter
                    .wait_command(
                        &principal,
                        WaitParams {
                            device_id: "dev1".to_string(),
                            command_id: issued.id,
                            wait_timeout: Some(30),
                        },
                    )
                    .await
            })
        };
        while hub.registry().count() == 0 {
            tokio::task::yield_now().await;
        }
        let updated = hub
            .update_command(
                &principal,
                CommandUpdate {
                    device_id: "dev1".to_string(),
                    command_id: issued.id,
                    status: Some("done".to_string()),
                    result: None,
                },
            )
            .await
            .expect("update");

        assert_eq!(waiter.await.expect("join"), PollResponse::command(updated));
    }

    #[tokio::test]
    async fn command_wait_checks_ownership() {
        let hub = test_hub();
        let principal = Principal::new("alice");
        let issued = hub
            .insert(&principal, command("dev1", "reboot"))
            .await
            .expect("insert");

        let adapter = hub.long_poll();
        let wrong_device = adapter
            .wait_command(
                &principal,
                WaitParams {
                    device_id: "dev2".to_string(),
                    command_id: issued.id(),
                    wait_timeout: Some(0),
                },
            )
            .await;
        assert_eq!(wrong_device.status, 400);

        let unknown = adapter
            .wait_command(
                &principal,
                WaitParams {
                    device_id: "dev1".to_string(),
                    command_id: 999,
                    wait_timeout: Some(0),
                },
            )
            .await;
        assert_eq!(unknown.status, 404);
    }
}
