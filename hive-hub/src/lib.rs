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


//! # hive-hub
//!
//! `hive-hub` is the subscription and delivery engine of an IoT message hub. Devices and
//! client applications exchange commands and notifications through it; clients either wait
//! on a bounded long poll or keep a duplex session open and receive pushes.
//!
//! Typical usage starts from [`HiveHub`], built over a [`MessageStore`] and an
//! [`AccessControl`] collaborator.
//!
//! ```
//! use std::sync::Arc;
//! use hive_hub::{HiveHub, HubConfig, MessageKind, PollParams, Principal};
//! use hive_memory_store::{InMemoryMessageStore, StaticAccessControl};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let access = StaticAccessControl::from_file(
//!     "../utils/hive-memory-store/static-configs/testdata.json",
//! )
//! .unwrap();
//! let hub = HiveHub::new(
//!     Arc::new(InMemoryMessageStore::new()),
//!     Arc::new(access),
//!     HubConfig::default(),
//! )
//! .unwrap();
//!
//! // A zero wait answers at once with whatever backlog exists.
//! let response = hub
//!     .long_poll()
//!     .poll(
//!         MessageKind::Notification,
//!         &Principal::new("alice"),
//!         PollParams {
//!             device_id: Some("dev1".to_string()),
//!             wait_timeout: Some(0),
//!             ..PollParams::default()
//!         },
//!     )
//!     .await;
//! assert_eq!(response.status, 200);
//! assert_eq!(hub.registry().count(), 0);
//! # });
//! ```
//!
//! ## Delivery contract
//!
//! A subscription is registered before its backlog is read, so every message stored after
//! registration reaches it by dispatch. Long polls resolve exactly once and always
//! unregister, on delivery, timeout, error, disconnect or a dropped future. Duplex sessions
//! enqueue their backlog under the session lock before any live push for that session.
//!
//! ## Internal architecture map
//!
//! - Model: messages, filters, principals and device scopes
//! - Gateway: message store and access-control seams
//! - Registry: copy-on-write subscription index keyed by kind, device and name
//! - Sinks: single-resolution (long poll) and durable queue (sessions, RPC)
//! - Engine: register, backlog read, live race, bounded wait, guaranteed cleanup
//! - Surfaces: long-poll adapter, duplex session, RPC envelope
//!
//! ## Observability model
//!
//! The workspace uses `tracing` for logs/events.
//! Library code emits events with canonical names from `observability::events` and does not
//! initialize a global subscriber. Binaries and tests are responsible for one-time
//! `tracing_subscriber` initialization at process boundaries.

mod config;
pub use config::{
    HubConfig, DEFAULT_TAKE, DEFAULT_WAIT_TIMEOUT_SECS, MAX_WAIT_TIMEOUT_SECS,
    MIN_WAIT_TIMEOUT_SECS,
};

mod engine;
pub use engine::{
    PollOutcome, PollRequest, RegistrationGuard, SubscribeRequest, Subscribed,
    SubscriptionEngine,
};

mod error;
pub use error::{Fault, HubError};

mod gateway;
pub use gateway::{AccessControl, MessageQuery, MessageStore, SortField, SortOrder};

mod hub;
pub use hub::{HiveHub, RESERVED_NOTIFICATIONS};

mod longpoll;
pub use longpoll::{LongPollAdapter, PollBody, PollParams, PollResponse, WaitParams};

pub mod model;
pub use model::{
    CommandUpdate, DeviceAccess, DeviceCommand, DeviceNotification, DeviceRef, DeviceScope,
    HubMessage, MessageId, MessageKind, NewCommand, NewMessage, NewNotification, Principal,
    SubscriptionFilter,
};

#[doc(hidden)]
pub mod observability;

mod registry;
pub use registry::{EntityKey, Subscription, SubscriptionId, SubscriptionRegistry};

pub mod rpc;

pub mod session;
pub use session::DuplexSession;

mod sink;
pub use sink::{
    DeliverySink, DurableQueueSink, OutboundQueue, OutboundReceiver, Resolution,
    SingleResolutionSink, SubscriptionState,
};

#[cfg(test)]
mod testing;
