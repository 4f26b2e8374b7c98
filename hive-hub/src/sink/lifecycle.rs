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

use serde::Serialize;
use std::sync::atomic::{AtomicU8, Ordering};

/// Per-subscription state machine.
///
/// `Registered -> {Delivered | TimedOut | Cancelled} -> Removed`. `Removed` is terminal.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum SubscriptionState {
    Registered = 0,
    Delivered = 1,
    TimedOut = 2,
    Cancelled = 3,
    Removed = 4,
}

impl SubscriptionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SubscriptionState::Registered,
            1 => SubscriptionState::Delivered,
            2 => SubscriptionState::TimedOut,
            3 => SubscriptionState::Cancelled,
            _ => SubscriptionState::Removed,
        }
    }
}

#[derive(Debug)]
pub(crate) struct Lifecycle {
    state: AtomicU8,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU8::new(SubscriptionState::Registered as u8),
        }
    }

    pub(crate) fn state(&self) -> SubscriptionState {
        SubscriptionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn is_registered(&self) -> bool {
        self.state() == SubscriptionState::Registered
    }

    /// Leaves `Registered` for `outcome`. Only the first caller succeeds.
    pub(crate) fn settle(&self, outcome: SubscriptionState) -> bool {
        debug_assert!(outcome != SubscriptionState::Registered);
        self.state
            .compare_exchange(
                SubscriptionState::Registered as u8,
                outcome as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Moves to the terminal state. Returns `false` if already there.
    pub(crate) fn retire(&self) -> bool {
        self.state
            .swap(SubscriptionState::Removed as u8, Ordering::AcqRel)
            != SubscriptionState::Removed as u8
    }
}

#[cfg(test)]
mod tests {
    use super::{Lifecycle, SubscriptionState};
    use std::sync::Arc;

    #[test]
    fn only_first_settle_wins() {
        let lifecycle = Lifecycle::new();
        assert!(lifecycle.settle(SubscriptionState::TimedOut));
        assert!(!lifecycle.settle(SubscriptionState::Delivered));
        assert_eq!(lifecycle.state(), SubscriptionState::TimedOut);
    }

    #[test]
    fn retire_is_terminal() {
        let lifecycle = Lifecycle::new();
        assert!(lifecycle.retire());
        assert!(!lifecycle.retire());
        assert!(!lifecycle.settle(SubscriptionState::Delivered));
        assert_eq!(lifecycle.state(), SubscriptionState::Removed);
    }

    #[test]
    fn concurrent_settle_has_single_winner() {
        let lifecycle = Arc::new(Lifecycle::new());
        let winners: usize = (0..16)
            .map(|_| {
                let lifecycle = lifecycle.clone();
                std::thread::spawn(move || usize::from(lifecycle.settle(SubscriptionState::Delivered)))
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|handle| handle.join().expect("settle thread"))
            .sum();
        assert_eq!(winners, 1);
    }
}
