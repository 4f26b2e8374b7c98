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

//! Duplex session state: per-connection subscriptions behind one session lock.

mod duplex_session;
mod protocol;

pub use duplex_session::DuplexSession;
pub use protocol::{
    CommandBody, CommandStatusBody, InsertCommandParams, InsertNotificationParams,
    NotificationBody, OutboundFrame, Push, Reply, ReplyBody, ReplyStatus, SessionRequest,
    SubscribeParams, UnsubscribeParams, UpdateCommandParams,
};
