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

//! Hub-wide error taxonomy and its transport status mapping.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Which side of a request is responsible for a failure.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fault {
    Client,
    Server,
}

/// Failures surfaced by hub operations.
///
/// Validation, authorization and not-found errors are raised before any subscription is
/// registered. Upstream failures may occur after registration; those paths still run the
/// registration guard.
#[derive(Clone, Debug, PartialEq)]
pub enum HubError {
    /// Malformed filter, timeout, limit or sort field.
    Validation(String),
    /// Principal lacks access to a device, network or reserved name.
    Forbidden(String),
    /// Unknown device, command or subscription.
    NotFound(String),
    /// Caller-chosen identifier already in use.
    Conflict(String),
    /// Message store or other collaborator failed.
    Upstream { message: String, cause: Option<String> },
    /// Operation attempted on a closed duplex session.
    SessionClosed,
}

impl HubError {
    pub fn validation(message: impl Into<String>) -> Self {
        HubError::Validation(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        HubError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        HubError::NotFound(message.into())
    }

    pub fn upstream(message: impl Into<String>, cause: impl Display) -> Self {
        HubError::Upstream {
            message: message.into(),
            cause: Some(cause.to_string()),
        }
    }

    pub fn fault(&self) -> Fault {
        match self {
            HubError::Upstream { .. } => Fault::Server,
            _ => Fault::Client,
        }
    }

    /// HTTP-equivalent status code for transport adapters.
    pub fn status_code(&self) -> u16 {
        match self {
            HubError::Validation(_) => 400,
            HubError::Forbidden(_) => 403,
            HubError::NotFound(_) => 404,
            HubError::Conflict(_) => 409,
            HubError::SessionClosed => 410,
            HubError::Upstream { .. } => 500,
        }
    }

    /// Detail text without the category prefix `Display` adds.
    pub fn message(&self) -> &str {
        match self {
            HubError::Validation(message)
            | HubError::Forbidden(message)
            | HubError::NotFound(message)
            | HubError::Conflict(message)
            | HubError::Upstream { message, .. } => message,
            HubError::SessionClosed => "session is closed",
        }
    }

    /// Optional underlying cause, carried on error envelopes.
    pub fn cause(&self) -> Option<&str> {
        match self {
            HubError::Upstream { cause, .. } => cause.as_deref(),
            _ => None,
        }
    }
}

impl Display for HubError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            HubError::Validation(message) => write!(f, "invalid request: {message}"),
            HubError::Forbidden(message) => write!(f, "forbidden: {message}"),
            HubError::NotFound(message) => write!(f, "not found: {message}"),
            HubError::Conflict(message) => write!(f, "conflict: {message}"),
            HubError::Upstream { message, cause } => match cause {
                Some(cause) => write!(f, "upstream failure: {message} ({cause})"),
                None => write!(f, "upstream failure: {message}"),
            },
            HubError::SessionClosed => write!(f, "session is closed"),
        }
    }
}

impl Error for HubError {}
