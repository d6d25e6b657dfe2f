// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Append-only concurrent interner mapping build targets to dense handles.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::ident::TargetHandle;
use crate::target::BuildTarget;

/// Monotonically growing bijection between [`BuildTarget`] values and
/// [`TargetHandle`]s.
///
/// The interner synchronizes itself and is deliberately not covered by the
/// index's reader/writer lock: handle translation happens outside that lock
/// on both the query and commit paths, so queries touching new targets never
/// contend with commit application.
///
/// # Invariants
/// - `lookup(intern(t)) == t` for every `t`.
/// - `intern(t)` returns the same handle for equal `t` regardless of
///   concurrent callers.
/// - Handles form the contiguous range `[0, len)` and are never reused.
pub struct TargetInterner {
    inner: RwLock<InternerState>,
}

struct InternerState {
    handles: FxHashMap<BuildTarget, TargetHandle>,
    targets: Vec<BuildTarget>,
}

impl TargetInterner {
    /// Creates an empty interner.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates an empty interner with room for `capacity` targets.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(InternerState {
                handles: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
                targets: Vec::with_capacity(capacity),
            }),
        }
    }

    /// Returns the handle for `target`, assigning the next dense handle on
    /// first use.
    pub fn intern(&self, target: &BuildTarget) -> TargetHandle {
        if let Some(handle) = self.inner.read().handles.get(target) {
            return *handle;
        }
        let mut state = self.inner.write();
        // Re-check under the write lock: another caller may have interned the
        // same target between the read probe and here.
        if let Some(handle) = state.handles.get(target) {
            return *handle;
        }
        let raw = u32::try_from(state.targets.len()).unwrap_or_else(|_| {
            debug_assert!(false, "target interner exhausted the u32 handle space");
            u32::MAX
        });
        let handle = TargetHandle(raw);
        state.targets.push(target.clone());
        state.handles.insert(target.clone(), handle);
        handle
    }

    /// Returns the handle for `target` without interning it.
    pub fn handle_of(&self, target: &BuildTarget) -> Option<TargetHandle> {
        self.inner.read().handles.get(target).copied()
    }

    /// Returns the target for `handle`, or `None` if the handle was never
    /// assigned.
    pub fn lookup(&self, handle: TargetHandle) -> Option<BuildTarget> {
        self.inner.read().targets.get(handle.as_usize()).cloned()
    }

    /// Translates a batch of handles, skipping any that were never assigned.
    pub fn lookup_all(&self, handles: impl IntoIterator<Item = TargetHandle>) -> Vec<BuildTarget> {
        let state = self.inner.read();
        handles
            .into_iter()
            .filter_map(|h| state.targets.get(h.as_usize()).cloned())
            .collect()
    }

    /// Returns the number of interned targets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().targets.len()
    }

    /// Returns `true` if no target has been interned yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().targets.is_empty()
    }
}

impl Default for TargetInterner {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for TargetInterner {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TargetInterner")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn interns_duplicates_to_same_handle() {
        let interner = TargetInterner::new();
        let a = BuildTarget::new("foo", "a");
        let b = BuildTarget::new("foo", "b");

        let ha0 = interner.intern(&a);
        let ha1 = interner.intern(&a);
        let hb = interner.intern(&b);

        assert_eq!(ha0, ha1);
        assert_ne!(ha0, hb);
        assert_eq!(interner.lookup(ha0).unwrap(), a);
        assert_eq!(interner.lookup(hb).unwrap(), b);
        assert_eq!(interner.len(), 2);
    }

    #[test]
    fn handles_are_dense_and_insertion_ordered() {
        let interner = TargetInterner::new();
        for i in 0..16u32 {
            let t = BuildTarget::new("pkg", format!("rule-{i}"));
            assert_eq!(interner.intern(&t).as_u32(), i);
        }
    }

    #[test]
    fn handle_of_does_not_intern() {
        let interner = TargetInterner::new();
        let t = BuildTarget::new("foo", "a");
        assert!(interner.handle_of(&t).is_none());
        assert!(interner.is_empty());
        let h = interner.intern(&t);
        assert_eq!(interner.handle_of(&t), Some(h));
    }

    #[test]
    fn concurrent_interning_is_consistent() {
        use std::sync::Arc;

        let interner = Arc::new(TargetInterner::new());
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let interner = Arc::clone(&interner);
                std::thread::spawn(move || {
                    (0..64u32)
                        .map(|i| interner.intern(&BuildTarget::new("pkg", format!("r{i}"))))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let handle_sets: Vec<Vec<TargetHandle>> =
            workers.into_iter().map(|w| w.join().unwrap()).collect();

        // Equal targets resolve to equal handles across all threads.
        for handles in &handle_sets[1..] {
            assert_eq!(handles, &handle_sets[0]);
        }
        assert_eq!(interner.len(), 64);
    }
}
