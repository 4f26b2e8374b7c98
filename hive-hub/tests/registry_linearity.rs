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

use hive_hub::session::{OutboundFrame, SubscribeParams};
use hive_hub::MessageKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use support::{init_logging, make_hub, notification, principal};

fn dev1_params() -> SubscribeParams {
    SubscribeParams {
        device_guid: Some("dev1".to_string()),
        ..SubscribeParams::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn subscription_is_visible_once_subscribe_returns() {
    init_logging();
    let hub = make_hub();

    let mut tasks = Vec::new();
    for i in 0..16 {
        let hub = hub.clone();
        tasks.push(tokio::spawn(async move {
            let (session, mut outbound) = hub.open_session(principal("admin"));
            let subscription_id = session
                .subscribe(MessageKind::Notification, dev1_params())
                .await
                .expect("subscribe should succeed");

            let name = format!("marker-{i}");
            hub.insert(&principal("admin"), notification("dev1", &name))
                .await
                .expect("insert should succeed");

            let mut seen = false;
            while let Ok(frame) = outbound.try_recv() {
                if let OutboundFrame::Push(push) = frame {
                    assert_eq!(push.subscription_id, subscription_id);
                    seen |= push.message.name() == name;
                }
            }
            assert!(seen, "{name} was published after subscribe returned");
            session
        }));
    }

    let mut sessions = Vec::new();
    for task in tasks {
        sessions.push(task.await.expect("subscriber task"));
    }
    assert_eq!(hub.registry().count(), 16);

    drop(sessions);
    assert_eq!(hub.registry().count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn registry_version_never_goes_backwards() {
    init_logging();
    let hub = make_hub();
    let done = Arc::new(AtomicBool::new(false));

    let reader = {
        let hub = hub.clone();
        let done = done.clone();
        tokio::spawn(async move {
            let mut last = hub.registry().version();
            while !done.load(Ordering::Acquire) {
                let current = hub.registry().version();
                assert!(current >= last, "version moved from {last} to {current}");
                last = current;
                tokio::task::yield_now().await;
            }
        })
    };

    let mut writers = Vec::new();
    for _ in 0..4 {
        let hub = hub.clone();
        writers.push(tokio::spawn(async move {
            for _ in 0..25 {
                let (session, _outbound) = hub.open_session(principal("alice"));
                session
                    .subscribe(MessageKind::Notification, dev1_params())
                    .await
                    .expect("subscribe should succeed");
                session.close();
            }
        }));
    }
    for writer in writers {
        writer.await.expect("writer task");
    }
    done.store(true, Ordering::Release);
    reader.await.expect("reader task");

    assert_eq!(hub.registry().count(), 0);
    assert!(hub.registry().version() >= 200);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn closed_sessions_stop_receiving_while_publishing() {
    init_logging();
    let hub = make_hub();

    let mut sessions = Vec::new();
    for _ in 0..8 {
        let (session, outbound) = hub.open_session(principal("alice"));
        session
            .subscribe(MessageKind::Notification, dev1_params())
            .await
            .expect("subscribe should succeed");
        sessions.push((session, outbound));
    }

    let publisher = {
        let hub = hub.clone();
        tokio::spawn(async move {
            for i in 0..50 {
                hub.insert(&principal("alice"), notification("dev1", &format!("n{i}")))
                    .await
                    .expect("insert should succeed");
            }
        })
    };

    for (session, _) in &sessions {
        session.close();
    }
    publisher.await.expect("publisher task");
    assert_eq!(hub.registry().count(), 0);

    hub.insert(&principal("alice"), notification("dev1", "after-close"))
        .await
        .expect("insert should succeed");
    for (_, mut outbound) in sessions {
        while let Ok(frame) = outbound.try_recv() {
            if let OutboundFrame::Push(push) = frame {
                assert_ne!(push.message.name(), "after-close");
            }
        }
    }
}
