/********************************************************************************
 * Copyright (c) 2026 Contributors to the Eclipse Foundation
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

//! Canonical structured field keys and value-format helpers.

use crate::model::HubMessage;

pub const EVENT: &str = "event";
pub const COMPONENT: &str = "component";

pub const SUBSCRIPTION_ID: &str = "subscription_id";
pub const SESSION_ID: &str = "session_id";
pub const KIND: &str = "kind";
pub const DEVICE_ID: &str = "device_id";
pub const MSG_ID: &str = "msg_id";
pub const ACTION: &str = "action";
pub const CORRELATION_ID: &str = "correlation_id";
pub const COUNT: &str = "count";
pub const ERR: &str = "err";
pub const REASON: &str = "reason";

pub const NONE: &str = "none";
pub const REASON_NOT_REGISTERED: &str = "not_registered";
pub const REASON_UNBOUND: &str = "unbound";
pub const REASON_SINK_CLOSED: &str = "sink_closed";

/// Compact `kind:id@device` label for log lines.
pub fn format_message(message: &HubMessage) -> String {
    format!(
        "{}:{}@{}",
        message.kind(),
        message.id(),
        message.device_id()
    )
}

/// Formats an optional value, falling back to [`NONE`].
pub fn format_opt<T: std::fmt::Display>(value: Option<T>) -> String {
    value
        .map(|value| value.to_string())
        .unwrap_or_else(|| NONE.to_string())
}
