// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! History-preserving key→value maps keyed by generation.
//!
//! A [`GenerationMap`] stores, for every key, the full sequence of values the
//! key has held over the index's linear history. Values are never overwritten:
//! each write appends a `(generation, Option<V>)` entry to the key's
//! timeline, where `None` is a tombstone marking removal at that generation.
//! Reads at any past generation then resolve in `O(log H)` per key (`H` =
//! history length) without copying the keyset.
//!
//! This is the mutable-dictionary-of-append-only-timelines design: a purely
//! persistent map would avoid the caller's reader/writer lock but pays a
//! per-write allocation on the key spine. Here the spine is mutated in place
//! under the caller's write lock while readers at older generations keep
//! resolving against entries that can no longer change.
//!
//! Keys iterate in `Ord` order (`BTreeMap` spine), so whole-map scans at a
//! generation are deterministic.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::ident::Generation;

/// Errors from appending to a key's timeline.
///
/// Both variants indicate a caller bug rather than a recoverable condition:
/// the commit pipeline validates deltas against the current state before any
/// append happens, so a well-formed commit never trips these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimelineError {
    /// The appended generation was not strictly greater than the key's last
    /// recorded generation.
    #[error("generation {attempted} does not advance past {last}")]
    NonMonotonic {
        /// Generation of the rejected append.
        attempted: Generation,
        /// Last generation already recorded for the key.
        last: Generation,
    },
    /// The first entry for a key must carry a value, not a tombstone.
    #[error("first timeline entry at generation {0} is a tombstone")]
    TombstoneFirst(Generation),
}

/// Ordered per-key history of `(generation, value-or-tombstone)` entries.
#[derive(Debug, Clone)]
struct Timeline<V> {
    /// Strictly increasing in generation.
    entries: Vec<(Generation, Option<V>)>,
}

impl<V> Timeline<V> {
    /// Resolves the value visible at `generation`: the latest entry with
    /// `entry.generation <= generation`, with tombstones flattened to `None`.
    fn resolve(&self, generation: Generation) -> Option<&V> {
        let idx = self
            .entries
            .partition_point(|(g, _)| *g <= generation)
            .checked_sub(1)?;
        self.entries[idx].1.as_ref()
    }

    /// Generation of the newest entry. Timelines are never empty.
    fn last_generation(&self) -> Generation {
        self.entries.last().map_or(Generation::ZERO, |(g, _)| *g)
    }

    /// Generation of the oldest entry.
    fn first_generation(&self) -> Generation {
        self.entries.first().map_or(Generation::ZERO, |(g, _)| *g)
    }
}

/// History-preserving dictionary from `K` to versioned `V`.
///
/// See the [module docs](self) for the storage model. All mutation must
/// happen under the owning index's write lock; reads are safe under its read
/// lock at any generation.
#[derive(Debug, Clone)]
pub struct GenerationMap<K, V> {
    timelines: BTreeMap<K, Timeline<V>>,
}

impl<K: Ord, V> GenerationMap<K, V> {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self {
            timelines: BTreeMap::new(),
        }
    }

    /// Returns the value for `key` visible at `generation`.
    ///
    /// Yields `None` when the key has no entry at or before `generation`, or
    /// when the latest such entry is a tombstone. Reading at a generation
    /// beyond the recorded frontier resolves to the frontier value: history
    /// is immutable, so the newest entry stays correct for every later
    /// generation until the next append.
    pub fn get_version(&self, key: &K, generation: Generation) -> Option<&V> {
        self.timelines.get(key)?.resolve(generation)
    }

    /// Appends an entry for `key` at `generation`, creating the timeline on
    /// first use. `None` records a tombstone.
    ///
    /// # Errors
    ///
    /// Returns [`TimelineError::NonMonotonic`] if `generation` is not
    /// strictly greater than the key's last recorded generation, and
    /// [`TimelineError::TombstoneFirst`] if the very first entry for a key
    /// would be a tombstone (a key cannot be removed before it exists).
    pub fn add_version(
        &mut self,
        key: K,
        value: Option<V>,
        generation: Generation,
    ) -> Result<(), TimelineError> {
        match self.timelines.get_mut(&key) {
            Some(timeline) => {
                let last = timeline.last_generation();
                if generation <= last {
                    return Err(TimelineError::NonMonotonic {
                        attempted: generation,
                        last,
                    });
                }
                timeline.entries.push((generation, value));
            }
            None => {
                if value.is_none() {
                    return Err(TimelineError::TombstoneFirst(generation));
                }
                self.timelines.insert(
                    key,
                    Timeline {
                        entries: vec![(generation, value)],
                    },
                );
            }
        }
        Ok(())
    }

    /// Iterates every `(key, value)` pair live at `generation`, in key order.
    ///
    /// Keys whose resolved entry is a tombstone (or that have no entry yet at
    /// `generation`) are skipped.
    pub fn entries_at(&self, generation: Generation) -> impl Iterator<Item = (&K, &V)> + '_ {
        self.entries_at_filtered(generation, |_| true)
    }

    /// Like [`entries_at`](Self::entries_at), restricted to keys accepted by
    /// `predicate`. The predicate runs before timeline resolution, so
    /// rejected keys cost nothing.
    pub fn entries_at_filtered<'a, P>(
        &'a self,
        generation: Generation,
        predicate: P,
    ) -> impl Iterator<Item = (&'a K, &'a V)> + 'a
    where
        P: Fn(&K) -> bool + 'a,
    {
        self.timelines.iter().filter_map(move |(key, timeline)| {
            if !predicate(key) {
                return None;
            }
            // Keys born after `generation` cannot resolve; skip the search.
            if timeline.first_generation() > generation {
                return None;
            }
            timeline.resolve(generation).map(|value| (key, value))
        })
    }

    /// Number of keys that have ever been recorded (live or tombstoned).
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.timelines.len()
    }
}

impl<K: Ord, V> Default for GenerationMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn g(raw: u32) -> Generation {
        Generation::from_raw(raw)
    }

    #[test]
    fn resolves_latest_entry_at_or_before_generation() {
        let mut map = GenerationMap::new();
        map.add_version("k", Some(1), g(1)).unwrap();
        map.add_version("k", Some(2), g(3)).unwrap();

        assert_eq!(map.get_version(&"k", g(0)), None);
        assert_eq!(map.get_version(&"k", g(1)), Some(&1));
        assert_eq!(map.get_version(&"k", g(2)), Some(&1));
        assert_eq!(map.get_version(&"k", g(3)), Some(&2));
        // Future generations read as the frontier.
        assert_eq!(map.get_version(&"k", g(99)), Some(&2));
    }

    #[test]
    fn tombstone_hides_value_from_later_generations() {
        let mut map = GenerationMap::new();
        map.add_version("k", Some(7), g(1)).unwrap();
        map.add_version("k", None, g(2)).unwrap();

        assert_eq!(map.get_version(&"k", g(1)), Some(&7));
        assert_eq!(map.get_version(&"k", g(2)), None);
        assert_eq!(map.get_version(&"k", g(3)), None);
    }

    #[test]
    fn key_can_be_reborn_after_tombstone() {
        let mut map = GenerationMap::new();
        map.add_version("k", Some(1), g(1)).unwrap();
        map.add_version("k", None, g(2)).unwrap();
        map.add_version("k", Some(3), g(4)).unwrap();

        assert_eq!(map.get_version(&"k", g(2)), None);
        assert_eq!(map.get_version(&"k", g(3)), None);
        assert_eq!(map.get_version(&"k", g(4)), Some(&3));
    }

    #[test]
    fn rejects_non_monotonic_appends() {
        let mut map = GenerationMap::new();
        map.add_version("k", Some(1), g(2)).unwrap();

        let err = map.add_version("k", Some(2), g(2)).unwrap_err();
        assert_eq!(
            err,
            TimelineError::NonMonotonic {
                attempted: g(2),
                last: g(2),
            }
        );
        assert!(map.add_version("k", Some(2), g(1)).is_err());
    }

    #[test]
    fn rejects_tombstone_as_first_entry() {
        let mut map: GenerationMap<&str, u32> = GenerationMap::new();
        let err = map.add_version("k", None, g(1)).unwrap_err();
        assert_eq!(err, TimelineError::TombstoneFirst(g(1)));
        // The failed append must not create a timeline.
        assert_eq!(map.key_count(), 0);
    }

    #[test]
    fn entries_at_skips_dead_and_unborn_keys() {
        let mut map = GenerationMap::new();
        map.add_version("live", Some(1), g(1)).unwrap();
        map.add_version("dead", Some(2), g(1)).unwrap();
        map.add_version("dead", None, g(2)).unwrap();
        map.add_version("late", Some(3), g(5)).unwrap();

        let at2: Vec<_> = map.entries_at(g(2)).collect();
        assert_eq!(at2, vec![(&"live", &1)]);

        let at5: Vec<_> = map.entries_at(g(5)).collect();
        assert_eq!(at5, vec![(&"late", &3), (&"live", &1)]);
    }

    #[test]
    fn filtered_entries_respect_predicate() {
        let mut map = GenerationMap::new();
        map.add_version("aa", Some(1), g(1)).unwrap();
        map.add_version("ab", Some(2), g(1)).unwrap();
        map.add_version("b", Some(3), g(1)).unwrap();

        let keys: Vec<_> = map
            .entries_at_filtered(g(1), |k| k.starts_with('a'))
            .map(|(k, _)| *k)
            .collect();
        assert_eq!(keys, vec!["aa", "ab"]);
    }
}
