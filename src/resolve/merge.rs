use std::collections::{BTreeMap, HashMap, HashSet};
use std::collections::hash_map::Entry;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OwnedMutexGuard;

use crate::coordinates::{CoordinateKey, ModuleCoordinate, ResolvedArtifact};
use crate::error::ResolveError;

/// Groups artifacts by coordinate identity, unioning their URLs in encounter order, and returns
///  them in coordinate order. Artifacts of the same identity must agree on their hash.
pub fn merge(artifacts: impl IntoIterator<Item = ResolvedArtifact>) -> Result<Vec<ResolvedArtifact>, ResolveError> {
    let mut merged: BTreeMap<ModuleCoordinate, ResolvedArtifact> = BTreeMap::new();
    for artifact in artifacts {
        match merged.get_mut(&artifact.coordinate) {
            Some(existing) => existing.merge(&artifact)?,
            None => {
                merged.insert(artifact.coordinate.clone(), artifact);
            }
        }
    }
    Ok(merged.into_values().collect())
}

/// The state shared by all resolutions of one run: resolved artifacts, and which repositories were
///  asked for which coordinate already.
///
/// Locks are never held across an await. Resolutions of the same coordinate are serialized
///  through [ResolutionCache::lock_coordinate] instead.
#[derive(Default)]
pub struct ResolutionCache {
    artifacts: Mutex<HashMap<CoordinateKey, ResolvedArtifact>>,
    probed: Mutex<HashSet<(String, CoordinateKey)>>,
    in_flight: Mutex<HashMap<CoordinateKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl ResolutionCache {
    pub fn new() -> ResolutionCache {
        Default::default()
    }

    pub fn get(&self, key: &CoordinateKey) -> Option<ResolvedArtifact> {
        self.artifacts.lock().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.artifacts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `true` if the repository was not asked for the coordinate before
    pub fn mark_probed(&self, repository_id: &str, key: &CoordinateKey) -> bool {
        self.probed.lock().insert((repository_id.to_string(), key.clone()))
    }

    /// Waits until no other resolution of the coordinate is in flight
    pub async fn lock_coordinate(&self, key: &CoordinateKey) -> CoordinateGuard<'_> {
        let lock = self.in_flight.lock()
            .entry(key.clone())
            .or_default()
            .clone();

        CoordinateGuard {
            cache: self,
            key: key.clone(),
            guard: Some(lock.lock_owned().await),
        }
    }

    #[cfg(test)]
    fn in_flight_len(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// The first artifact for an identity wins, later ones only contribute URLs and must agree on
    ///  the hash. Returns the artifact as it is cached afterwards.
    pub fn insert_or_merge(&self, artifact: ResolvedArtifact) -> Result<ResolvedArtifact, ResolveError> {
        let mut artifacts = self.artifacts.lock();
        match artifacts.entry(artifact.coordinate.key()) {
            Entry::Occupied(mut existing) => {
                existing.get_mut().merge(&artifact)?;
                Ok(existing.get().clone())
            }
            Entry::Vacant(vacant) => Ok(vacant.insert(artifact).clone()),
        }
    }
}

/// Removes the coordinate's lock when it is dropped by the last resolution waiting for it
pub struct CoordinateGuard<'a> {
    cache: &'a ResolutionCache,
    key: CoordinateKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for CoordinateGuard<'_> {
    fn drop(&mut self) {
        // waiters clone the lock only while holding the map, so the count can not rise meanwhile
        let mut in_flight = self.cache.in_flight.lock();
        self.guard.take();
        if let Entry::Occupied(entry) = in_flight.entry(self.key.clone()) {
            if Arc::strong_count(entry.get()) == 1 {
                entry.remove();
            }
        }
    }
}
