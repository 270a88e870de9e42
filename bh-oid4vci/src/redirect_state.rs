// Copyright (C) 2020-2026  The Blockhouse Technology Limited (TBTL).
//
// This program is free software: you can redistribute it and/or modify it
// under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or (at your
// option) any later version.
//
// This program is distributed in the hope that it will be useful, but
// WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public
// License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex, PoisonError},
};

use rand::RngCore as _;

const STATE_SIZE: usize = 16;

/// Set of OAuth `state` values handed out to pending authorizations.
///
/// Every value is unique among the pending ones, so a redirect can be matched
/// to exactly one session. The lock is only held while the set is mutated.
#[derive(Debug, Clone, Default)]
pub struct RedirectStateRegistry {
    pending: Arc<Mutex<HashSet<String>>>,
}

impl RedirectStateRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves a fresh random `state` value, released when the returned
    /// guard is dropped.
    pub fn reserve(&self) -> RedirectState {
        let mut rng = rand::thread_rng();
        let mut bytes = [0u8; STATE_SIZE];

        loop {
            rng.fill_bytes(&mut bytes);
            let value = bh_jws_utils::base64_url_encode(bytes);

            if self.lock().insert(value.clone()) {
                return RedirectState {
                    value,
                    pending: self.pending.clone(),
                };
            }
        }
    }

    /// Whether `state` is currently reserved.
    pub fn is_pending(&self, state: &str) -> bool {
        self.lock().contains(state)
    }

    /// Number of reserved values.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no value is reserved.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A reserved `state` value, released from its [`RedirectStateRegistry`] on
/// drop.
#[derive(Debug)]
pub struct RedirectState {
    value: String,
    pending: Arc<Mutex<HashSet<String>>>,
}

impl RedirectState {
    /// The `state` value.
    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl Drop for RedirectState {
    fn drop(&mut self) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_states_are_unique_and_released_on_drop() {
        let registry = RedirectStateRegistry::new();

        let first = registry.reserve();
        let second = registry.reserve();
        assert_ne!(first.as_str(), second.as_str());
        assert_eq!(registry.len(), 2);
        assert!(registry.is_pending(first.as_str()));

        let released = first.as_str().to_owned();
        drop(first);
        assert!(!registry.is_pending(&released));
        assert!(registry.is_pending(second.as_str()));

        drop(second);
        assert!(registry.is_empty());
    }

    #[test]
    fn clones_share_the_pending_set() {
        let registry = RedirectStateRegistry::new();
        let clone = registry.clone();

        let state = clone.reserve();
        assert!(registry.is_pending(state.as_str()));
    }

    #[test]
    fn states_reserved_from_many_threads_do_not_collide() {
        let registry = RedirectStateRegistry::new();

        let states: Vec<RedirectState> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| (0..16).map(|_| registry.reserve()).collect::<Vec<_>>()))
                .collect();
            handles
                .into_iter()
                .flat_map(|handle| handle.join().unwrap())
                .collect()
        });

        assert_eq!(registry.len(), states.len());
        drop(states);
        assert!(registry.is_empty());
    }
}
