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

//! Subscription engine: backlog read, live race, bounded wait and guaranteed cleanup.

mod registration_guard;
mod subscription_engine;

pub use registration_guard::RegistrationGuard;
pub use subscription_engine::{
    PollOutcome, PollRequest, SubscribeRequest, Subscribed, SubscriptionEngine,
};
