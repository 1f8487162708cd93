//! Spawn persistence collaborator.
//!
//! All spawn mutation funnels through [`SpawnStore::update_spawn`], which
//! validates composite state before persisting and stamps `last_modified`.
//! The engine ships an in-memory implementation backing tests and embedders
//! that keep the profile in process; a browser embedder substitutes its own
//! store over the same trait.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use time::OffsetDateTime;

use crate::spawn::{
    Profile, RandomizationBucket, Spawn, SpawnAsset, SpawnId, Trigger,
};

/// Partial update for one spawn. Absent fields keep their current value;
/// `description: Some(None)` clears the description.
#[derive(Debug, Clone, Default)]
pub struct UpdateSpawnFields {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub trigger: Option<Trigger>,
    pub duration: Option<u64>,
    pub assets: Option<Vec<SpawnAsset>>,
    pub enabled: Option<bool>,
    pub randomization_buckets: Option<Vec<RandomizationBucket>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpdateError {
    #[error("spawn \"{0}\" not found")]
    NotFound(SpawnId),

    /// The requested fields would leave the spawn in an invalid composite
    /// state. Nothing was persisted.
    #[error("invalid spawn state: {0}")]
    Validation(String),
}

pub trait SpawnStore: Send {
    fn get_spawn(&self, id: &SpawnId) -> Option<Spawn>;

    /// Validate and apply a partial update, returning the stored copy with
    /// its fresh `last_modified` stamp.
    fn update_spawn(&mut self, id: &SpawnId, fields: UpdateSpawnFields)
        -> Result<Spawn, UpdateError>;
}

/// `SpawnStore` over a shared in-memory [`Profile`]. Sharing the profile
/// handle with a `ProfileExporter` keeps exports in step with updates.
pub struct InMemorySpawnStore {
    profile: Arc<Mutex<Profile>>,
}

impl InMemorySpawnStore {
    pub fn new(profile: Arc<Mutex<Profile>>) -> Self {
        InMemorySpawnStore { profile }
    }

    pub fn insert_spawn(&mut self, spawn: Spawn) {
        self.profile.lock().unwrap().spawns.push(spawn);
    }

    pub fn profile_handle(&self) -> Arc<Mutex<Profile>> {
        Arc::clone(&self.profile)
    }
}

impl SpawnStore for InMemorySpawnStore {
    fn get_spawn(&self, id: &SpawnId) -> Option<Spawn> {
        self.profile.lock().unwrap().spawn(id).cloned()
    }

    fn update_spawn(
        &mut self,
        id: &SpawnId,
        fields: UpdateSpawnFields,
    ) -> Result<Spawn, UpdateError> {
        let mut profile = self.profile.lock().unwrap();
        let spawn = profile
            .spawn_mut(id)
            .ok_or_else(|| UpdateError::NotFound(id.clone()))?;

        // Build the candidate next state first so validation failures leave
        // the stored spawn untouched.
        let mut next = spawn.clone();
        if let Some(name) = fields.name {
            next.name = name;
        }
        if let Some(description) = fields.description {
            next.description = description;
        }
        if let Some(trigger) = fields.trigger {
            next.trigger = trigger;
        }
        if let Some(duration) = fields.duration {
            next.duration = duration;
        }
        if let Some(enabled) = fields.enabled {
            next.enabled = enabled;
        }
        if let Some(assets) = fields.assets {
            next.assets = assets;
        }
        if let Some(buckets) = fields.randomization_buckets {
            next.randomization_buckets = buckets;
        }

        validate_spawn(&next).map_err(UpdateError::Validation)?;
        normalize_asset_order(&mut next.assets);
        next.last_modified = OffsetDateTime::now_utc();

        log::debug!("spawn {} updated ({} asset(s))", next.id, next.assets.len());
        *spawn = next.clone();
        Ok(next)
    }
}

/// Reject composite states the editor must never persist, most importantly
/// randomization buckets pointing at placements that no longer exist.
fn validate_spawn(spawn: &Spawn) -> Result<(), String> {
    let mut seen = HashSet::new();
    for asset in &spawn.assets {
        if !seen.insert(&asset.id) {
            return Err(format!("duplicate spawn asset id \"{}\"", asset.id));
        }
    }

    for bucket in &spawn.randomization_buckets {
        for member in &bucket.members {
            if !seen.contains(member) {
                return Err(format!(
                    "randomization bucket \"{}\" references missing asset \"{member}\"",
                    bucket.name
                ));
            }
        }
        if bucket.pick as usize > bucket.members.len() {
            return Err(format!(
                "randomization bucket \"{}\" picks {} from {} member(s)",
                bucket.name,
                bucket.pick,
                bucket.members.len()
            ));
        }
    }

    Ok(())
}

/// Renumber asset orders to be 0-based and contiguous, preserving the
/// relative order the caller expressed.
fn normalize_asset_order(assets: &mut [SpawnAsset]) {
    assets.sort_by_key(|asset| asset.order);
    for (index, asset) in assets.iter_mut().enumerate() {
        asset.order = index as u32;
    }
}
