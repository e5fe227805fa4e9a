//! Conflict resolution and emission.
//!
//! Candidates from every pattern are grouped by destination. Exactly one
//! winner per destination reaches the asset store:
//!
//! - highest `priority` wins
//! - equal priority: the later-declared pattern wins
//!
//! The winner is then written according to the store's state. An asset
//! already in the store counts as this plugin's own only when it carries
//! `copied` and its bytes hash to what the [`WrittenTable`] recorded for
//! that destination; anything else belongs to the host and needs `force`.

use std::collections::BTreeMap;

use dashmap::DashMap;

use crate::asset::{Asset, AssetStore};
use crate::error::CopyError;
use crate::hash::ContentHash;
use crate::pipeline::Materialized;
use crate::debug;

/// Destination → hash of the content this plugin instance last wrote there.
///
/// Lives as long as the plugin, so watch-mode passes can skip rewriting
/// unchanged files.
#[derive(Debug, Default)]
pub struct WrittenTable {
    hashes: DashMap<String, ContentHash>,
}

impl WrittenTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, filename: &str) -> Option<ContentHash> {
        self.hashes.get(filename).map(|entry| *entry.value())
    }

    pub fn record(&self, filename: &str, hash: ContentHash) {
        self.hashes.insert(filename.to_string(), hash);
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}

/// What happened to one destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emission {
    /// New asset added to the store.
    Emitted,
    /// Existing asset replaced.
    Updated,
    /// Existing asset kept because no winner had `force`.
    SkippedExisting,
    /// The store still holds this plugin's own asset with identical content.
    Unchanged,
}

/// Pick one winner per destination.
///
/// Returned in destination order.
pub fn resolve_conflicts(candidates: Vec<Materialized>) -> Vec<Materialized> {
    let mut winners: BTreeMap<String, Materialized> = BTreeMap::new();

    for candidate in candidates {
        match winners.get(&candidate.filename) {
            Some(current) if !beats(&candidate, current) => {
                debug!("conflict"; "'{}' from pattern #{} loses to pattern #{}",
                    candidate.filename, candidate.index, current.index);
            }
            Some(current) => {
                debug!("conflict"; "'{}' from pattern #{} replaces pattern #{}",
                    candidate.filename, candidate.index, current.index);
                winners.insert(candidate.filename.clone(), candidate);
            }
            None => {
                winners.insert(candidate.filename.clone(), candidate);
            }
        }
    }

    winners.into_values().collect()
}

/// Whether `challenger` takes a destination from `current`.
///
/// Later declaration wins ties, and among files of one pattern the later
/// file wins.
#[inline]
fn beats(challenger: &Materialized, current: &Materialized) -> bool {
    (challenger.priority, challenger.index) >= (current.priority, current.index)
}

/// Write winners into the store.
///
/// Store failures are returned per destination; they never stop the
/// remaining writes.
pub fn emit(
    winners: Vec<Materialized>,
    store: &mut dyn AssetStore,
    written: &WrittenTable,
) -> (Vec<(String, Emission)>, Vec<CopyError>) {
    let mut outcomes = Vec::with_capacity(winners.len());
    let mut errors = Vec::new();

    for winner in winners {
        let filename = winner.filename;
        let hash = ContentHash::of(&winner.source);
        let existing = store
            .get(&filename)
            .map(|asset| (asset.info.copied, ContentHash::of(&asset.source)));
        let exists = existing.is_some() || store.has(&filename);
        let stored = match existing {
            Some((true, stored)) if written.get(&filename) == Some(stored) => Some(stored),
            _ => None,
        };
        let ours = stored.is_some();

        if stored == Some(hash) {
            debug!("emit"; "'{}' unchanged, skipping", filename);
            outcomes.push((filename, Emission::Unchanged));
            continue;
        }

        let asset = Asset::new(winner.source, winner.info);
        let (result, emission) = if exists && (ours || winner.force) {
            (store.update(&filename, asset), Emission::Updated)
        } else if exists {
            debug!("emit"; "'{}' already exists, skipping (use force to overwrite)", filename);
            outcomes.push((filename, Emission::SkippedExisting));
            continue;
        } else {
            (store.set(&filename, asset), Emission::Emitted)
        };

        match result {
            Ok(()) => {
                written.record(&filename, hash);
                outcomes.push((filename, emission));
            }
            Err(source) => errors.push(CopyError::Emit { filename, source }),
        }
    }

    (outcomes, errors)
}
