use std::sync::{Arc, RwLock};

use chrono::{Duration, NaiveDateTime};
use ulid::Ulid;

use crate::model::Specialty;

/// An active specialty with the active professionals offering it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub specialty: Specialty,
    pub professionals: Vec<(Ulid, String)>,
}

/// Time-boxed snapshot of slowly-changing reference data (specialties and
/// who offers them). Owned by whoever needs it; nothing global.
pub struct ReferenceCache<T> {
    ttl: Duration,
    slot: RwLock<Option<(NaiveDateTime, Arc<T>)>>,
}

impl<T> ReferenceCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: RwLock::new(None),
        }
    }

    /// Return the cached snapshot if it was loaded less than `ttl` before `now`,
    /// otherwise call `load` and cache its result.
    pub fn get_or_load(&self, now: NaiveDateTime, load: impl FnOnce() -> T) -> Arc<T> {
        match self.get(now) {
            Some(hit) => hit,
            None => self.put(now, load()),
        }
    }

    /// Store a snapshot loaded at `now`, for loaders that cannot run inside `get_or_load`.
    pub fn put(&self, now: NaiveDateTime, value: T) -> Arc<T> {
        let value = Arc::new(value);
        let mut slot = self.slot.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some((now, value.clone()));
        value
    }

    /// Drop the snapshot; the next read reloads.
    pub fn refresh(&self) {
        let mut slot = self.slot.write().unwrap_or_else(|e| e.into_inner());
        *slot = None;
    }

    pub fn loaded_at(&self) -> Option<NaiveDateTime> {
        let slot = self.slot.read().unwrap_or_else(|e| e.into_inner());
        slot.as_ref().map(|(at, _)| *at)
    }

    /// The snapshot, if it was loaded less than `ttl` before `now`.
    pub fn get(&self, now: NaiveDateTime) -> Option<Arc<T>> {
        let slot = self.slot.read().unwrap_or_else(|e| e.into_inner());
        match slot.as_ref() {
            Some((at, value)) if now >= *at && now - *at < self.ttl => Some(value.clone()),
            _ => None,
        }
    }
}
