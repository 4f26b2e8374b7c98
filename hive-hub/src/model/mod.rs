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

//! Domain model shared by every layer of the hub.

mod filter;
mod message;
mod principal;

pub use filter::{Selector, SubscriptionFilter};
pub use message::{
    CommandUpdate, DeviceCommand, DeviceNotification, HubMessage, MessageId, MessageIdentity,
    MessageKind, NewCommand, NewMessage, NewNotification,
};
pub use principal::{DeviceAccess, DeviceRef, DeviceScope, Principal};
