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


mod support;

use hive_hub::rpc::{
    decode_request, Action, LocalRpcClient, Request, RequestBody, ResponseBody, RpcClient,
};
use hive_hub::{
    HubMessage, MessageKind, MessageQuery, NewCommand, NewMessage, SubscriptionFilter,
    SubscriptionId,
};
use std::sync::Arc;
use support::{init_logging, make_hub, notification, principal};

fn reboot(device_id: &str) -> NewMessage {
    NewMessage::Command(NewCommand {
        device_id: device_id.to_string(),
        command: "reboot".to_string(),
        parameters: None,
        lifetime: Some(60),
        status: None,
        user_id: None,
    })
}

#[tokio::test]
async fn subscription_over_the_wire_streams_events() {
    init_logging();
    let hub = make_hub();
    let (server, mut events) = hub.rpc_server();
    let client = LocalRpcClient::new(Arc::new(server));
    let subscription_id = SubscriptionId::new();

    let response = client
        .send(
            Request::new(RequestBody::Subscribe {
                principal: principal("bob"),
                filter: SubscriptionFilter::new(MessageKind::Command).with_network_ids([2]),
                timestamp: None,
                take: None,
            })
            .with_subscription_id(subscription_id),
        )
        .await
        .expect("subscribe should succeed");
    assert_eq!(response.action(), Action::CommandSubscribeResponse);
    assert_eq!(response.subscription_id, Some(subscription_id));

    let inserted = client
        .send(Request::new(RequestBody::Insert {
            principal: principal("admin"),
            message: reboot("dev3"),
        }))
        .await
        .expect("insert should succeed");
    assert_eq!(inserted.action(), Action::CommandInsertResponse);

    client
        .send(Request::new(RequestBody::Insert {
            principal: principal("admin"),
            message: reboot("dev1"),
        }))
        .await
        .expect("insert should succeed");

    let event = events.try_recv().expect("one event for dev3");
    assert_eq!(event.action(), Action::CommandEvent);
    assert_eq!(event.subscription_id, Some(subscription_id));
    match event.body {
        ResponseBody::Event {
            message: HubMessage::Command(command),
        } => assert_eq!(command.device_id, "dev3"),
        other => panic!("unexpected body {other:?}"),
    }
    assert!(events.try_recv().is_none());

    let response = client
        .send(
            Request::new(RequestBody::Unsubscribe {
                kind: MessageKind::Command,
            })
            .with_subscription_id(subscription_id),
        )
        .await
        .expect("unsubscribe should succeed");
    assert_eq!(response.action(), Action::CommandUnsubscribeResponse);
    assert_eq!(hub.registry().count(), 0);
}

#[tokio::test]
async fn failures_come_back_as_error_envelopes() {
    init_logging();
    let hub = make_hub();
    let (server, _events) = hub.rpc_server();
    let client = LocalRpcClient::new(Arc::new(server));

    let response = client
        .call(Request::new(RequestBody::Insert {
            principal: principal("alice"),
            message: notification("dev3", "temperature"),
        }))
        .await;
    assert!(response.is_error());
    assert_eq!(response.action(), Action::ErrorResponse);

    let err = client
        .send(Request::new(RequestBody::Insert {
            principal: principal("alice"),
            message: notification("missing", "temperature"),
        }))
        .await
        .expect_err("unknown device");
    assert_eq!(err.status_code(), 404);
}

#[tokio::test]
async fn search_is_limited_to_accessible_devices() {
    init_logging();
    let hub = make_hub();
    let admin = principal("admin");
    for device in ["dev1", "dev2", "dev3"] {
        hub.insert(&admin, notification(device, "temperature"))
            .await
            .expect("insert should succeed");
    }

    let (server, _events) = hub.rpc_server();
    let client = LocalRpcClient::new(Arc::new(server));
    let response = client
        .send(Request::new(RequestBody::Search {
            principal: principal("bob"),
            query: MessageQuery::search(MessageKind::Notification, 100),
        }))
        .await
        .expect("search should succeed");

    match response.body {
        ResponseBody::SearchResult { messages, .. } => {
            let devices: Vec<&str> = messages.iter().map(HubMessage::device_id).collect();
            assert_eq!(devices, vec!["dev3"]);
        }
        other => panic!("unexpected body {other:?}"),
    }
}

#[test]
fn unknown_wire_action_is_a_validation_error() {
    let raw = r#"{"action":"DEVICE_DELETE_REQUEST","correlationId":"9b1deb4d-3b7d-4bad-9bdd-2b0d7b3dcb6d","body":{}}"#;
    let err = decode_request(raw).expect_err("unknown action");
    assert_eq!(err.status_code(), 400);
}
