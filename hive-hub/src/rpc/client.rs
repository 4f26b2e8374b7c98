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
use std::sync::Arc;
use tracing::warn;

use crate::error::HubError;
use crate::observability::events;
use crate::rpc::envelope::{
    decode_request, decode_response, encode_request, encode_response, Request, Response,
    ResponseBody,
};
use crate::rpc::RpcServer;

const COMPONENT: &str = "rpc_client";

/// Sends requests to a hub, wherever it runs.
#[async_trait]
pub trait RpcClient: Send + Sync {
    /// Sends one request. Failures come back as an `ERROR_RESPONSE` envelope.
    async fn call(&self, request: Request) -> Response;

    /// Like [`call`](Self::call), with error envelopes turned back into [`HubError`].
    async fn send(&self, request: Request) -> Result<Response, HubError> {
        let response = self.call(request).await;
        match response.body {
            ResponseBody::Error(error) => Err(error.into_error()),
            _ => Ok(response),
        }
    }
}

/// In-process client. Every call still crosses the wire codec in both directions.
#[derive(Clone)]
pub struct LocalRpcClient {
    server: Arc<RpcServer>,
}

impl LocalRpcClient {
    pub fn new(server: Arc<RpcServer>) -> Self {
        Self { server }
    }

    async fn round_trip(&self, request: &Request) -> Result<Response, HubError> {
        let inbound = decode_request(&encode_request(request)?)?;
        let response = self.server.handle(inbound).await;
        decode_response(&encode_response(&response)?)
    }
}

#[async_trait]
impl RpcClient for LocalRpcClient {
    async fn call(&self, request: Request) -> Response {
        match self.round_trip(&request).await {
            Ok(response) => response,
            Err(err) => {
                warn!(
                    event = events::RPC_DECODE_FAILED,
                    component = COMPONENT,
                    action = %request.action(),
                    correlation_id = %request.correlation_id,
                    err = %err,
                    "rpc envelope rejected"
                );
                Response::failure(&request, &err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{LocalRpcClient, RpcClient};
    use crate::model::{CommandUpdate, HubMessage, MessageKind, Principal, SubscriptionFilter};
    use crate::rpc::{Request, RequestBody, ResponseBody};
    use crate::testing::{command, test_hub};
    use std::sync::Arc;

    #[tokio::test]
    async fn command_lifecycle_over_the_wire() {
        let hub = test_hub();
        let (server, mut events) = hub.rpc_server();
        let client = LocalRpcClient::new(Arc::new(server));
        let alice = Principal::new("alice");

        let subscribed = client
            .send(Request::new(RequestBody::Subscribe {
                principal: alice.clone(),
                filter: SubscriptionFilter::new(MessageKind::CommandUpdate).with_devices(["dev1"]),
                timestamp: None,
                take: None,
            }))
            .await
            .expect("subscribed");
        let subscription_id = subscribed.subscription_id.expect("id assigned");

        let inserted = client
            .send(Request::new(RequestBody::Insert {
                principal: alice.clone(),
                message: command("dev1", "reboot"),
            }))
            .await
            .expect("inserted");
        let command_id = match inserted.body {
            ResponseBody::Inserted {
                message: HubMessage::Command(command),
            } => command.id,
            other => panic!("unexpected body {other:?}"),
        };

        let updated = client
            .send(Request::new(RequestBody::CommandUpdate {
                principal: alice,
                update: CommandUpdate {
                    device_id: "dev1".to_string(),
                    command_id,
                    status: Some("done".to_string()),
                    result: None,
                },
            }))
            .await
            .expect("updated");
        let command = match updated.body {
            ResponseBody::Updated { command } => command,
            other => panic!("unexpected body {other:?}"),
        };
        assert_eq!(command.status.as_deref(), Some("done"));

        let event = events.try_recv().expect("update event");
        assert_eq!(event.subscription_id, Some(subscription_id));
        assert_eq!(
            event.body,
            ResponseBody::Event {
                message: HubMessage::CommandUpdate(command)
            }
        );
    }

    #[tokio::test]
    async fn error_envelopes_become_hub_errors() {
        let hub = test_hub();
        let (server, _events) = hub.rpc_server();
        let client = LocalRpcClient::new(Arc::new(server));

        let err = client
            .send(Request::new(RequestBody::Insert {
                principal: Principal::new("alice"),
                message: command("missing", "reboot"),
            }))
            .await
            .expect_err("unknown device");
        assert_eq!(err.status_code(), 404);
    }
}
