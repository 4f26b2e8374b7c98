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

//! Delivery sinks: where dispatched messages end up.

mod durable_queue;
mod lifecycle;
mod single_resolution;

pub use durable_queue::{DurableQueueSink, OutboundQueue, OutboundReceiver};
pub use lifecycle::SubscriptionState;
pub(crate) use lifecycle::Lifecycle;
pub use single_resolution::{Resolution, SingleResolutionSink};

use std::sync::Arc;

/// The two delivery targets a subscription can be bound to.
#[derive(Clone)]
pub enum DeliverySink {
    /// Resolves exactly once; backs long-poll requests.
    Single(Arc<SingleResolutionSink>),
    /// Append-only session queue; backs duplex sessions and RPC subscribers.
    Queue(Arc<DurableQueueSink>),
}

impl DeliverySink {
    /// Single-resolution sinks share their lifecycle with the subscription so that resolving
    /// the sink and leaving the `Registered` state are one atomic step.
    pub(crate) fn lifecycle_for_new_subscription(&self) -> Arc<Lifecycle> {
        match self {
            DeliverySink::Single(sink) => sink.lifecycle().clone(),
            DeliverySink::Queue(_) => Arc::new(Lifecycle::new()),
        }
    }
}
