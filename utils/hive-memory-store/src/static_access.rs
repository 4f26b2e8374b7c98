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


use async_trait::async_trait;
use hive_hub::{AccessControl, DeviceAccess, DeviceRef, DeviceScope, HubError, Principal};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;
use tracing::debug;

const COMPONENT: &str = "static_access";

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct Grant {
    #[serde(default)]
    all_devices: bool,
    #[serde(default)]
    devices: HashSet<String>,
    #[serde(default)]
    networks: HashSet<i64>,
    #[serde(default)]
    device_types: HashSet<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AccessFile {
    devices: Vec<DeviceRef>,
    principals: HashMap<String, Grant>,
}

/// Access control read once from a JSON file of devices and per-principal grants.
///
/// ```json
/// {
///   "devices": [{ "deviceId": "dev1", "networkId": 1, "deviceTypeId": 10 }],
///   "principals": {
///     "admin": { "allDevices": true },
///     "alice": { "devices": ["dev1"], "networks": [2], "deviceTypes": [10] }
///   }
/// }
/// ```
///
/// Principals missing from the file see no devices.
#[derive(Debug)]
pub struct StaticAccessControl {
    devices: BTreeMap<String, DeviceRef>,
    grants: HashMap<String, Grant>,
}

impl StaticAccessControl {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, HubError> {
        let path = path.as_ref();
        let path = fs::canonicalize(path).map_err(|err| {
            HubError::upstream(
                format!("access control file {} not found", path.display()),
                err,
            )
        })?;
        debug!(component = COMPONENT, path = %path.display(), "loading access control file");
        let data = fs::read_to_string(&path)
            .map_err(|err| HubError::upstream("unable to read access control file", err))?;
        Self::from_json(&data)
    }

    pub fn from_json(data: &str) -> Result<Self, HubError> {
        let file: AccessFile = serde_json::from_str(data)
            .map_err(|err| HubError::validation(format!("invalid access control file: {err}")))?;
        let devices: BTreeMap<String, DeviceRef> = file
            .devices
            .into_iter()
            .map(|device| (device.device_id.clone(), device))
            .collect();
        debug!(
            component = COMPONENT,
            devices = devices.len(),
            principals = file.principals.len(),
            "access control loaded"
        );
        Ok(Self {
            devices,
            grants: file.principals,
        })
    }

    fn can_see(&self, principal: &Principal, device: &DeviceRef) -> bool {
        let Some(grant) = self.grants.get(&principal.name) else {
            return false;
        };
        grant.all_devices
            || grant.devices.contains(&device.device_id)
            || device
                .network_id
                .is_some_and(|network_id| grant.networks.contains(&network_id))
            || device
                .device_type_id
                .is_some_and(|type_id| grant.device_types.contains(&type_id))
    }
}

fn in_scope(scope: &DeviceScope, device: &DeviceRef) -> bool {
    let network_ok = scope.network_ids.is_empty()
        || device
            .network_id
            .is_some_and(|network_id| scope.network_ids.contains(&network_id));
    let type_ok = scope.device_type_ids.is_empty()
        || device
            .device_type_id
            .is_some_and(|type_id| scope.device_type_ids.contains(&type_id));
    network_ok && type_ok
}

#[async_trait]
impl AccessControl for StaticAccessControl {
    async fn resolve_accessible_devices(
        &self,
        scope: &DeviceScope,
        principal: &Principal,
    ) -> Result<DeviceAccess, HubError> {
        if scope.is_unrestricted()
            && self
                .grants
                .get(&principal.name)
                .is_some_and(|grant| grant.all_devices)
        {
            return Ok(DeviceAccess::All);
        }

        let mut visible = Vec::new();
        if scope.device_ids.is_empty() {
            visible.extend(
                self.devices
                    .values()
                    .filter(|device| self.can_see(principal, device))
                    .cloned(),
            );
        } else {
            for device_id in &scope.device_ids {
                visible.push(self.resolve_device(device_id, principal).await?);
            }
        }
        visible.retain(|device| in_scope(scope, device));
        debug!(
            component = COMPONENT,
            principal = %principal,
            count = visible.len(),
            "devices resolved"
        );
        Ok(DeviceAccess::Only(visible))
    }

    async fn resolve_device(
        &self,
        device_id: &str,
        principal: &Principal,
    ) -> Result<DeviceRef, HubError> {
        let device = self
            .devices
            .get(device_id)
            .ok_or_else(|| HubError::not_found(format!("device {device_id}")))?;
        if !self.can_see(principal, device) {
            return Err(HubError::forbidden(format!(
                "{principal} has no access to device {device_id}"
            )));
        }
        Ok(device.clone())
    }
}
