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

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// The authenticated caller. Opaque to the engine; interpreted by access control.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    pub name: String,
}

impl Principal {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Display for Principal {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRef {
    pub device_id: String,
    #[serde(default)]
    pub network_id: Option<i64>,
    #[serde(default)]
    pub device_type_id: Option<i64>,
}

/// Devices, networks and device types a caller asks about.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DeviceScope {
    pub device_ids: Vec<String>,
    pub network_ids: Vec<i64>,
    pub device_type_ids: Vec<i64>,
}

impl DeviceScope {
    pub fn devices<I, S>(device_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            device_ids: device_ids.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn is_unrestricted(&self) -> bool {
        self.device_ids.is_empty() && self.network_ids.is_empty() && self.device_type_ids.is_empty()
    }
}

/// Outcome of resolving a scope against a principal's permissions.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DeviceAccess {
    /// Every device, including ones created later.
    All,
    Only(Vec<DeviceRef>),
}

impl DeviceAccess {
    pub fn is_empty(&self) -> bool {
        matches!(self, DeviceAccess::Only(devices) if devices.is_empty())
    }
}
