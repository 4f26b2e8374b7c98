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

//! Engine tuning knobs shared by the long-poll adapter and duplex sessions.

use crate::error::HubError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_WAIT_TIMEOUT_SECS: u64 = 30;
pub const MIN_WAIT_TIMEOUT_SECS: u64 = 0;
pub const MAX_WAIT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_TAKE: usize = 1000;

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct HubConfig {
    pub min_wait_timeout_secs: u64,
    pub max_wait_timeout_secs: u64,
    pub default_wait_timeout_secs: u64,
    /// Result limit applied when a caller does not give one.
    pub default_take: usize,
    pub max_take: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            min_wait_timeout_secs: MIN_WAIT_TIMEOUT_SECS,
            max_wait_timeout_secs: MAX_WAIT_TIMEOUT_SECS,
            default_wait_timeout_secs: DEFAULT_WAIT_TIMEOUT_SECS,
            default_take: DEFAULT_TAKE,
            max_take: DEFAULT_TAKE,
        }
    }
}

impl HubConfig {
    /// Checks internal consistency of the configured ranges.
    pub fn validate(&self) -> Result<(), HubError> {
        if self.min_wait_timeout_secs > self.max_wait_timeout_secs {
            return Err(HubError::validation(
                "min_wait_timeout_secs must not exceed max_wait_timeout_secs",
            ));
        }
        if !(self.min_wait_timeout_secs..=self.max_wait_timeout_secs)
            .contains(&self.default_wait_timeout_secs)
        {
            return Err(HubError::validation(
                "default_wait_timeout_secs must lie within the configured range",
            ));
        }
        if self.default_take == 0 || self.default_take > self.max_take {
            return Err(HubError::validation(
                "default_take must be positive and not exceed max_take",
            ));
        }
        Ok(())
    }

    /// Resolves a caller-supplied wait timeout in seconds.
    ///
    /// Absent means the configured default; negative or out-of-range values are rejected.
    pub fn resolve_wait_timeout(&self, requested: Option<i64>) -> Result<Duration, HubError> {
        let secs = match requested {
            None => self.default_wait_timeout_secs,
            Some(value) if value < 0 => {
                return Err(HubError::validation(format!(
                    "waitTimeout must not be negative, got {value}"
                )))
            }
            Some(value) => value as u64,
        };
        if !(self.min_wait_timeout_secs..=self.max_wait_timeout_secs).contains(&secs) {
            return Err(HubError::validation(format!(
                "waitTimeout must be between {} and {} seconds, got {secs}",
                self.min_wait_timeout_secs, self.max_wait_timeout_secs
            )));
        }
        Ok(Duration::from_secs(secs))
    }

    /// Resolves a caller-supplied result limit.
    pub fn resolve_take(&self, requested: Option<usize>) -> Result<usize, HubError> {
        match requested {
            None => Ok(self.default_take),
            Some(0) => Err(HubError::validation("limit must be positive")),
            Some(take) if take > self.max_take => Err(HubError::validation(format!(
                "limit must not exceed {}, got {take}",
                self.max_take
            ))),
            Some(take) => Ok(take),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::HubConfig;
    use std::time::Duration;

    #[test]
    fn wait_timeout_defaults_and_bounds() {
        let config = HubConfig::default();
        assert_eq!(
            config.resolve_wait_timeout(None).expect("default applies"),
            Duration::from_secs(30)
        );
        assert_eq!(
            config.resolve_wait_timeout(Some(0)).expect("zero is allowed"),
            Duration::ZERO
        );
        assert!(config.resolve_wait_timeout(Some(-1)).is_err());
        assert!(config.resolve_wait_timeout(Some(61)).is_err());
    }

    #[test]
    fn take_defaults_and_bounds() {
        let config = HubConfig::default();
        assert_eq!(config.resolve_take(None).expect("default applies"), 1000);
        assert_eq!(config.resolve_take(Some(5)).expect("in range"), 5);
        assert!(config.resolve_take(Some(0)).is_err());
        assert!(config.resolve_take(Some(1001)).is_err());
    }

    #[test]
    fn inconsistent_ranges_are_rejected() {
        let config = HubConfig {
            min_wait_timeout_secs: 10,
            max_wait_timeout_secs: 5,
            ..HubConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(HubConfig::default().validate().is_ok());
    }
}
