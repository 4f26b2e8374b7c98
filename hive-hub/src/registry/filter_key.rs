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

//! Registry index keys derived from filters and from dispatched messages.

use crate::model::{HubMessage, MessageId, MessageKind, Selector, SubscriptionFilter};
use std::fmt::{Display, Formatter};

/// Event source a registration is attached to.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum EntityKey {
    /// Wildcard: every device.
    AnyDevice,
    Device(String),
    /// Updates of one command.
    Command(MessageId),
}

impl Display for EntityKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKey::AnyDevice => f.write_str("*"),
            EntityKey::Device(device_id) => write!(f, "device:{device_id}"),
            EntityKey::Command(command_id) => write!(f, "command:{command_id}"),
        }
    }
}

/// `(kind, entity, name)` triple. `name == None` is the name wildcard.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub(crate) struct FilterKey {
    pub(crate) kind: MessageKind,
    pub(crate) entity: EntityKey,
    pub(crate) name: Option<String>,
}

impl FilterKey {
    /// Every key a filter registers under.
    pub(crate) fn expand(filter: &SubscriptionFilter) -> Vec<FilterKey> {
        let entities: Vec<EntityKey> = match (filter.command_id, &filter.devices) {
            (Some(command_id), _) => vec![EntityKey::Command(command_id)],
            (None, Selector::Any) => vec![EntityKey::AnyDevice],
            (None, Selector::Only(devices)) => devices
                .iter()
                .map(|device_id| EntityKey::Device(device_id.clone()))
                .collect(),
        };
        let names: Vec<Option<String>> = match &filter.names {
            Selector::Any => vec![None],
            Selector::Only(names) => names.iter().cloned().map(Some).collect(),
        };

        let mut keys = Vec::with_capacity(entities.len() * names.len());
        for entity in &entities {
            for name in &names {
                keys.push(FilterKey {
                    kind: filter.kind,
                    entity: entity.clone(),
                    name: name.clone(),
                });
            }
        }
        keys
    }

    /// Every key under which a subscription matching `message` could be registered.
    pub(crate) fn candidates(message: &HubMessage) -> Vec<FilterKey> {
        let kind = message.kind();
        let name = message.name().to_string();
        let device = EntityKey::Device(message.device_id().to_string());

        let mut keys = Vec::with_capacity(5);
        for entity in [device, EntityKey::AnyDevice] {
            keys.push(FilterKey {
                kind,
                entity: entity.clone(),
                name: Some(name.clone()),
            });
            keys.push(FilterKey {
                kind,
                entity,
                name: None,
            });
        }
        if kind == MessageKind::CommandUpdate {
            keys.push(FilterKey {
                kind,
                entity: EntityKey::Command(message.id()),
                name: None,
            });
        }
        keys
    }
}
