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
use std::str::FromStr;

use crate::error::HubError;
use crate::model::MessageKind;

/// Wire tag of an RPC envelope.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    NotificationSubscribeRequest,
    NotificationSubscribeResponse,
    NotificationUnsubscribeRequest,
    NotificationUnsubscribeResponse,
    NotificationInsertRequest,
    NotificationInsertResponse,
    NotificationSearchRequest,
    NotificationSearchResponse,
    CommandSubscribeRequest,
    CommandSubscribeResponse,
    CommandUnsubscribeRequest,
    CommandUnsubscribeResponse,
    CommandInsertRequest,
    CommandInsertResponse,
    CommandSearchRequest,
    CommandSearchResponse,
    CommandUpdateSubscribeRequest,
    CommandUpdateSubscribeResponse,
    CommandUpdateRequest,
    CommandUpdateResponse,
    NotificationEvent,
    CommandEvent,
    CommandUpdateEvent,
    ErrorResponse,
}

impl Action {
    pub const ALL: [Action; 24] = [
        Action::NotificationSubscribeRequest,
        Action::NotificationSubscribeResponse,
        Action::NotificationUnsubscribeRequest,
        Action::NotificationUnsubscribeResponse,
        Action::NotificationInsertRequest,
        Action::NotificationInsertResponse,
        Action::NotificationSearchRequest,
        Action::NotificationSearchResponse,
        Action::CommandSubscribeRequest,
        Action::CommandSubscribeResponse,
        Action::CommandUnsubscribeRequest,
        Action::CommandUnsubscribeResponse,
        Action::CommandInsertRequest,
        Action::CommandInsertResponse,
        Action::CommandSearchRequest,
        Action::CommandSearchResponse,
        Action::CommandUpdateSubscribeRequest,
        Action::CommandUpdateSubscribeResponse,
        Action::CommandUpdateRequest,
        Action::CommandUpdateResponse,
        Action::NotificationEvent,
        Action::CommandEvent,
        Action::CommandUpdateEvent,
        Action::ErrorResponse,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::NotificationSubscribeRequest => "NOTIFICATION_SUBSCRIBE_REQUEST",
            Action::NotificationSubscribeResponse => "NOTIFICATION_SUBSCRIBE_RESPONSE",
            Action::NotificationUnsubscribeRequest => "NOTIFICATION_UNSUBSCRIBE_REQUEST",
            Action::NotificationUnsubscribeResponse => "NOTIFICATION_UNSUBSCRIBE_RESPONSE",
            Action::NotificationInsertRequest => "NOTIFICATION_INSERT_REQUEST",
            Action::NotificationInsertResponse => "NOTIFICATION_INSERT_RESPONSE",
            Action::NotificationSearchRequest => "NOTIFICATION_SEARCH_REQUEST",
            Action::NotificationSearchResponse => "NOTIFICATION_SEARCH_RESPONSE",
            Action::CommandSubscribeRequest => "COMMAND_SUBSCRIBE_REQUEST",
            Action::CommandSubscribeResponse => "COMMAND_SUBSCRIBE_RESPONSE",
            Action::CommandUnsubscribeRequest => "COMMAND_UNSUBSCRIBE_REQUEST",
            Action::CommandUnsubscribeResponse => "COMMAND_UNSUBSCRIBE_RESPONSE",
            Action::CommandInsertRequest => "COMMAND_INSERT_REQUEST",
            Action::CommandInsertResponse => "COMMAND_INSERT_RESPONSE",
            Action::CommandSearchRequest => "COMMAND_SEARCH_REQUEST",
            Action::CommandSearchResponse => "COMMAND_SEARCH_RESPONSE",
            Action::CommandUpdateSubscribeRequest => "COMMAND_UPDATE_SUBSCRIBE_REQUEST",
            Action::CommandUpdateSubscribeResponse => "COMMAND_UPDATE_SUBSCRIBE_RESPONSE",
            Action::CommandUpdateRequest => "COMMAND_UPDATE_REQUEST",
            Action::CommandUpdateResponse => "COMMAND_UPDATE_RESPONSE",
            Action::NotificationEvent => "NOTIFICATION_EVENT",
            Action::CommandEvent => "COMMAND_EVENT",
            Action::CommandUpdateEvent => "COMMAND_UPDATE_EVENT",
            Action::ErrorResponse => "ERROR_RESPONSE",
        }
    }

    pub fn is_request(self) -> bool {
        self.response().is_some()
    }

    /// Normal response action for a request action.
    pub fn response(self) -> Option<Action> {
        let response = match self {
            Action::NotificationSubscribeRequest => Action::NotificationSubscribeResponse,
            Action::NotificationUnsubscribeRequest => Action::NotificationUnsubscribeResponse,
            Action::NotificationInsertRequest => Action::NotificationInsertResponse,
            Action::NotificationSearchRequest => Action::NotificationSearchResponse,
            Action::CommandSubscribeRequest => Action::CommandSubscribeResponse,
            Action::CommandUnsubscribeRequest => Action::CommandUnsubscribeResponse,
            Action::CommandInsertRequest => Action::CommandInsertResponse,
            Action::CommandSearchRequest => Action::CommandSearchResponse,
            Action::CommandUpdateSubscribeRequest => Action::CommandUpdateSubscribeResponse,
            Action::CommandUpdateRequest => Action::CommandUpdateResponse,
            _ => return None,
        };
        Some(response)
    }

    /// Message stream an action belongs to; `None` for `ERROR_RESPONSE`.
    pub fn kind(self) -> Option<MessageKind> {
        match self {
            Action::NotificationSubscribeRequest
            | Action::NotificationSubscribeResponse
            | Action::NotificationUnsubscribeRequest
            | Action::NotificationUnsubscribeResponse
            | Action::NotificationInsertRequest
            | Action::NotificationInsertResponse
            | Action::NotificationSearchRequest
            | Action::NotificationSearchResponse
            | Action::NotificationEvent => Some(MessageKind::Notification),
            Action::CommandSubscribeRequest
            | Action::CommandSubscribeResponse
            | Action::CommandUnsubscribeRequest
            | Action::CommandUnsubscribeResponse
            | Action::CommandInsertRequest
            | Action::CommandInsertResponse
            | Action::CommandSearchRequest
            | Action::CommandSearchResponse
            | Action::CommandEvent => Some(MessageKind::Command),
            Action::CommandUpdateSubscribeRequest
            | Action::CommandUpdateSubscribeResponse
            | Action::CommandUpdateRequest
            | Action::CommandUpdateResponse
            | Action::CommandUpdateEvent => Some(MessageKind::CommandUpdate),
            Action::ErrorResponse => None,
        }
    }

    pub(crate) fn subscribe(kind: MessageKind) -> (Action, Action) {
        match kind {
            MessageKind::Notification => (
                Action::NotificationSubscribeRequest,
                Action::NotificationSubscribeResponse,
            ),
            MessageKind::Command => (
                Action::CommandSubscribeRequest,
                Action::CommandSubscribeResponse,
            ),
            MessageKind::CommandUpdate => (
                Action::CommandUpdateSubscribeRequest,
                Action::CommandUpdateSubscribeResponse,
            ),
        }
    }

    /// Command-update subscriptions are removed through the command family.
    pub(crate) fn unsubscribe(kind: MessageKind) -> (Action, Action) {
        match kind {
            MessageKind::Notification => (
                Action::NotificationUnsubscribeRequest,
                Action::NotificationUnsubscribeResponse,
            ),
            MessageKind::Command | MessageKind::CommandUpdate => (
                Action::CommandUnsubscribeRequest,
                Action::CommandUnsubscribeResponse,
            ),
        }
    }

    pub(crate) fn insert(kind: MessageKind) -> (Action, Action) {
        match kind {
            MessageKind::Notification => (
                Action::NotificationInsertRequest,
                Action::NotificationInsertResponse,
            ),
            MessageKind::Command | MessageKind::CommandUpdate => {
                (Action::CommandInsertRequest, Action::CommandInsertResponse)
            }
        }
    }

    pub(crate) fn search(kind: MessageKind) -> (Action, Action) {
        match kind {
            MessageKind::Notification => (
                Action::NotificationSearchRequest,
                Action::NotificationSearchResponse,
            ),
            MessageKind::Command | MessageKind::CommandUpdate => {
                (Action::CommandSearchRequest, Action::CommandSearchResponse)
            }
        }
    }

    pub(crate) fn event(kind: MessageKind) -> Action {
        match kind {
            MessageKind::Notification => Action::NotificationEvent,
            MessageKind::Command => Action::CommandEvent,
            MessageKind::CommandUpdate => Action::CommandUpdateEvent,
        }
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = HubError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|action| action.as_str() == value)
            .ok_or_else(|| HubError::validation(format!("unknown action {value}")))
    }
}

#[cfg(test)]
mod tests {
    use super::Action;
    use crate::model::MessageKind;

    #[test]
    fn wire_names_agree_with_serde() {
        for action in Action::ALL {
            let json = serde_json::to_string(&action).expect("serializes");
            assert_eq!(json, format!("\"{}\"", action.as_str()));
            assert_eq!(action.as_str().parse::<Action>().expect("parses"), action);
        }
    }

    #[test]
    fn requests_map_to_responses_of_the_same_stream() {
        for action in Action::ALL.into_iter().filter(|action| action.is_request()) {
            let response = action.response().expect("request has a response");
            assert!(!response.is_request());
            assert_eq!(response.kind(), action.kind());
        }
        assert_eq!(Action::NotificationEvent.response(), None);
        assert_eq!(Action::ErrorResponse.kind(), None);
    }

    #[test]
    fn unknown_action_is_a_validation_error() {
        let err = "DEVICE_DELETE_REQUEST".parse::<Action>().expect_err("unknown");
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn command_update_stream_unsubscribes_through_commands() {
        assert_eq!(
            Action::unsubscribe(MessageKind::CommandUpdate).0,
            Action::CommandUnsubscribeRequest
        );
        assert_eq!(
            Action::event(MessageKind::CommandUpdate),
            Action::CommandUpdateEvent
        );
    }
}
