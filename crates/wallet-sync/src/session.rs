//! Sync sessions and generations.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;
use wallet_core::AccountKey;

use crate::channel::SubscriptionHandle;
use crate::tasks::TaskRegistry;

/// Monotonic session counter. Work captured under one generation is
/// discarded once a newer generation exists.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Generation(u64);

impl Generation {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u64 {
        self.0
    }

    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen-{}", self.0)
    }
}

/// Everything one account's session owns: its push subscriptions and timers.
#[derive(Debug)]
pub struct SyncSession {
    account: AccountKey,
    generation: Generation,
    subscriptions: Vec<SubscriptionHandle>,
    tasks: TaskRegistry,
}

impl SyncSession {
    pub fn new(account: AccountKey, generation: Generation) -> Self {
        Self {
            account,
            generation,
            subscriptions: Vec::new(),
            tasks: TaskRegistry::new(),
        }
    }

    pub fn account(&self) -> &AccountKey {
        &self.account
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn tasks(&self) -> &TaskRegistry {
        &self.tasks
    }

    pub fn hold(&mut self, handle: SubscriptionHandle) {
        self.subscriptions.push(handle);
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Release every subscription and stop every timer.
    pub fn teardown(self) {
        debug!(
            account = %self.account,
            generation = self.generation.value(),
            subscriptions = self.subscriptions.len(),
            "Tearing down session"
        );
        for handle in self.subscriptions {
            handle.unsubscribe();
        }
        self.tasks.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generations_are_ordered() {
        let first = Generation::default();
        let second = first.next();
        assert!(second > first);
        assert_eq!(second.value(), 1);
        assert_eq!(second.to_string(), "gen-1");
    }
}
