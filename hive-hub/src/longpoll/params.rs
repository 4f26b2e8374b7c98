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


use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use std::str::FromStr;

use crate::error::HubError;
use crate::model::{DeviceScope, MessageId};

/// Query parameters of a notification or command poll.
///
/// List parameters are comma separated, as they arrive in a query string.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PollParams {
    pub device_id: Option<String>,
    pub device_ids: Option<String>,
    pub network_ids: Option<String>,
    pub device_type_ids: Option<String>,
    pub names: Option<String>,
    pub timestamp: Option<String>,
    pub wait_timeout: Option<i64>,
    pub limit: Option<usize>,
}

/// Parameters of a wait on a single command's status.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WaitParams {
    pub device_id: String,
    pub command_id: MessageId,
    #[serde(default)]
    pub wait_timeout: Option<i64>,
}

fn split_csv(raw: Option<&str>) -> Vec<String> {
    raw.map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

fn parse_ids<T: FromStr>(param: &str, raw: Option<&str>) -> Result<Vec<T>, HubError> {
    split_csv(raw)
        .into_iter()
        .map(|value| {
            value
                .parse()
                .map_err(|_| HubError::validation(format!("{param} contains invalid id {value}")))
        })
        .collect()
}

/// Accepts RFC 3339 and the zone-less `yyyy-MM-ddTHH:mm:ss.SSS` form, read as UTC.
pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, HubError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|_| HubError::validation(format!("timestamp {raw} is not a valid date")))
}

impl PollParams {
    /// Device, network and device-type scope; empty when nothing was named.
    pub fn scope(&self) -> Result<DeviceScope, HubError> {
        let mut device_ids = split_csv(self.device_id.as_deref());
        for device_id in split_csv(self.device_ids.as_deref()) {
            if !device_ids.contains(&device_id) {
                device_ids.push(device_id);
            }
        }
        Ok(DeviceScope {
            device_ids,
            network_ids: parse_ids("networkIds", self.network_ids.as_deref())?,
            device_type_ids: parse_ids("deviceTypeIds", self.device_type_ids.as_deref())?,
        })
    }

    /// `None` matches every name; a blank parameter counts as absent.
    pub fn names(&self) -> Option<Vec<String>> {
        let names = split_csv(self.names.as_deref());
        (!names.is_empty()).then_some(names)
    }

    /// Cursor for the backlog read; `None` means only future events.
    pub fn cursor(&self) -> Result<Option<DateTime<Utc>>, HubError> {
        self.timestamp
            .as_deref()
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .map(parse_timestamp)
            .transpose()
    }
}
