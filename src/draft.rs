//! Editor draft lifecycle.
//!
//! A `DraftSession` is the per-(spawn, placement) working copy behind a
//! settings panel: it holds unsaved field edits, tracks dirtiness for the
//! navigation guard, debounces slider input, validates before save, and
//! talks to the store/event bus on save. The `DraftCache` is the explicit
//! cross-navigation store that lets a user switch between editor views
//! without losing in-progress work.
//!
//! State machine: `Clean → Dirty → Saving → {Clean | Dirty(error)}`, and
//! `Dirty → Discarding → Clean`.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use strum::IntoEnumIterator;
use thiserror::Error;

use crate::event_bus::{EventBus, SpawnEvent};
use crate::override_diff::{build_overrides_diff, DesiredValues};
use crate::persistence::{SpawnStore, UpdateError, UpdateSpawnFields};
use crate::resolution::{
    resolve_effective_duration, resolve_effective_properties, ResolvedProperties,
};
use crate::spawn::{
    AssetOverrides, PropertyKey, PropertyTypeError, PropertyValue, Spawn, SpawnAsset, SpawnAssetId,
    SpawnId,
};

/// Quiet period before a slider's live value folds into the draft.
pub const SLIDER_QUIET_PERIOD: Duration = Duration::from_millis(150);

/// Composite identity of one editing session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DraftKey {
    pub spawn_id: SpawnId,
    pub spawn_asset_id: SpawnAssetId,
}

/// The working copy itself: override-enabled property values plus the
/// separately-tracked duration override.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Draft {
    pub properties: DesiredValues,
    pub duration: Option<u64>,
}

/// A draft parked in the cross-navigation cache, together with whether it
/// still carried unsaved changes when its session went away.
#[derive(Debug, Clone)]
pub struct CachedDraft {
    pub draft: Draft,
    pub dirty: bool,
}

/// Explicit keyed store for drafts that outlive their editor view. Owned by
/// the workspace controller; sessions read on seed and write on unmount.
#[derive(Default)]
pub struct DraftCache {
    entries: HashMap<DraftKey, CachedDraft>,
}

impl DraftCache {
    pub fn new() -> Self {
        DraftCache::default()
    }

    pub fn get(&self, key: &DraftKey) -> Option<&CachedDraft> {
        self.entries.get(key)
    }

    pub fn set(&mut self, key: DraftKey, cached: CachedDraft) {
        self.entries.insert(key, cached);
    }

    pub fn clear(&mut self, key: &DraftKey) {
        self.entries.remove(key);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftState {
    Clean,
    Dirty,
    Saving,
    Discarding,
}

/// What the panel should do with a close/back request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseResponse {
    /// Navigate away now. `skip_prompt` tells the navigation guard that an
    /// explicit discard confirmation already happened.
    Navigate { skip_prompt: bool },
    /// Unsaved changes present: ask the user to confirm discarding first.
    ConfirmDiscard,
}

#[derive(Debug, Error)]
pub enum EditorError {
    /// The (spawn, placement) pair does not resolve to a real instance.
    /// Integration error: surfaced as a blocking "not found", no retry.
    #[error("spawn \"{spawn_id}\" has no asset \"{spawn_asset_id}\"")]
    NotFound {
        spawn_id: SpawnId,
        spawn_asset_id: SpawnAssetId,
    },

    #[error(transparent)]
    PropertyType(#[from] PropertyTypeError),
}

#[derive(Debug, Error)]
pub enum SaveError {
    /// One or more fields failed validation; the store was not called.
    #[error("validation failed for {} field(s)", errors.len())]
    Validation {
        errors: IndexMap<PropertyKey, String>,
    },

    /// The store rejected the update. The draft is retained for retry.
    #[error(transparent)]
    Persist(#[from] UpdateError),

    #[error(transparent)]
    PropertyType(#[from] PropertyTypeError),
}

#[derive(Debug, Clone, Copy)]
struct SliderValue {
    live: f64,
    last_tick: Instant,
}

/// Per-session editing state machine. Constructed through
/// [`DraftSession::seed`] (usually via the workspace controller, which
/// also enforces the once-per-pair seeding guard).
#[derive(Debug)]
pub struct DraftSession {
    key: DraftKey,
    spawn: Spawn,
    asset: SpawnAsset,
    resolved: ResolvedProperties,
    draft: Draft,
    /// Values captured at last successful seed/save; discard restores these.
    baseline: Draft,
    state: DraftState,
    field_errors: IndexMap<PropertyKey, String>,
    sliders: IndexMap<PropertyKey, SliderValue>,
}

impl DraftSession {
    /// Seed a session for one placement, from a cached draft when one
    /// exists, otherwise from the persisted overrides.
    pub fn seed(spawn: Spawn, asset: SpawnAsset, cached: Option<CachedDraft>) -> Self {
        let key = DraftKey {
            spawn_id: spawn.id.clone(),
            spawn_asset_id: asset.id.clone(),
        };
        let resolved =
            resolve_effective_properties(&spawn.default_properties, &asset.overrides.properties);
        let baseline = draft_from_overrides(&asset.overrides);

        let (draft, state) = match cached {
            Some(cached) => {
                log::debug!(
                    "draft session {}/{} restored from cache (dirty: {})",
                    key.spawn_id,
                    key.spawn_asset_id,
                    cached.dirty
                );
                let state = if cached.dirty {
                    DraftState::Dirty
                } else {
                    DraftState::Clean
                };
                (cached.draft, state)
            }
            None => (baseline.clone(), DraftState::Clean),
        };

        DraftSession {
            key,
            spawn,
            asset,
            resolved,
            draft,
            baseline,
            state,
            field_errors: IndexMap::new(),
            sliders: IndexMap::new(),
        }
    }

    pub fn key(&self) -> &DraftKey {
        &self.key
    }

    pub fn state(&self) -> DraftState {
        self.state
    }

    pub fn spawn(&self) -> &Spawn {
        &self.spawn
    }

    pub fn asset(&self) -> &SpawnAsset {
        &self.asset
    }

    pub fn draft(&self) -> &Draft {
        &self.draft
    }

    /// Resolved view of the *persisted* state (spawn defaults layered with
    /// stored overrides), unaffected by draft edits.
    pub fn resolved(&self) -> &ResolvedProperties {
        &self.resolved
    }

    pub fn field_errors(&self) -> &IndexMap<PropertyKey, String> {
        &self.field_errors
    }

    /// Consulted by the navigation guard.
    pub fn has_unsaved_changes(&self) -> bool {
        matches!(self.state, DraftState::Dirty | DraftState::Saving)
    }

    /// The values the panel should display: draft overrides layered over
    /// the current spawn defaults.
    pub fn view(&self) -> ResolvedProperties {
        let patch = build_overrides_diff(&self.draft.properties)
            .expect("draft entries are shape-checked on insert");
        resolve_effective_properties(&self.spawn.default_properties, &patch)
    }

    pub fn effective_duration(&self) -> u64 {
        resolve_effective_duration(self.spawn.duration, self.draft.duration)
    }

    /// Set or clear one override field. `None` reverts the field to
    /// inherit. Marks the session dirty either way.
    pub fn set_property(
        &mut self,
        key: PropertyKey,
        value: Option<PropertyValue>,
    ) -> Result<(), EditorError> {
        match value {
            Some(value) => {
                // Shape-check through the typed accessor before accepting.
                let mut probe = crate::spawn::AssetProperties::default();
                probe.set(key, Some(value.clone()))?;

                match validate_property(key, &value) {
                    Ok(()) => {
                        self.field_errors.shift_remove(&key);
                    }
                    Err(message) => {
                        log::debug!("field {key} invalid: {message}");
                        self.field_errors.insert(key, message);
                    }
                }
                self.draft.properties.insert(key, value);
            }
            None => {
                self.draft.properties.shift_remove(&key);
                self.field_errors.shift_remove(&key);
            }
        }
        self.mark_dirty();
        Ok(())
    }

    pub fn set_duration(&mut self, duration: Option<u64>) {
        self.draft.duration = duration;
        self.mark_dirty();
    }

    /// Record a slider input tick. Does not touch the draft or the dirty
    /// flag; the value commits after [`SLIDER_QUIET_PERIOD`] without a new
    /// tick, or on flush.
    pub fn slider_tick(&mut self, key: PropertyKey, value: f64, now: Instant) {
        self.sliders.insert(
            key,
            SliderValue {
                live: value,
                last_tick: now,
            },
        );
    }

    /// Current live value of a slider, when one is mid-drag.
    pub fn live_value(&self, key: PropertyKey) -> Option<f64> {
        self.sliders.get(&key).map(|slider| slider.live)
    }

    /// Commit slider values whose quiet period has elapsed.
    pub fn poll_sliders(&mut self, now: Instant) {
        let ready: Vec<PropertyKey> = self
            .sliders
            .iter()
            .filter(|(_, slider)| now.duration_since(slider.last_tick) >= SLIDER_QUIET_PERIOD)
            .map(|(&key, _)| key)
            .collect();
        for key in ready {
            self.commit_slider(key);
        }
    }

    /// Commit every pending slider value immediately. Must run before the
    /// diff is computed on save so the last tick is never dropped.
    pub fn flush_sliders(&mut self) {
        let pending: Vec<PropertyKey> = self.sliders.keys().copied().collect();
        for key in pending {
            self.commit_slider(key);
        }
    }

    fn commit_slider(&mut self, key: PropertyKey) {
        if let Some(slider) = self.sliders.shift_remove(&key) {
            // Slider keys are float-valued, so the shape check cannot fail.
            let _ = self.set_property(key, Some(PropertyValue::Float(slider.live)));
        }
    }

    /// Validate, persist the minimal override diff, and broadcast.
    ///
    /// On validation failure the store is never called. On persistence
    /// failure the draft and dirty flag are retained so the user can retry.
    pub fn save(
        &mut self,
        store: &mut dyn SpawnStore,
        cache: &mut DraftCache,
        bus: &EventBus,
    ) -> Result<(), SaveError> {
        self.flush_sliders();

        // A value identical to the spawn default is "inherit", not an
        // override; it never lands in the persisted override set.
        let defaults = self.spawn.default_properties.clone();
        self.draft
            .properties
            .retain(|key, value| defaults.get(*key).as_ref() != Some(&*value));

        let mut errors = IndexMap::new();
        for (&key, value) in &self.draft.properties {
            if let Err(message) = validate_property(key, value) {
                errors.insert(key, message);
            }
        }
        if !errors.is_empty() {
            log::debug!(
                "save blocked: {} invalid field(s) on {}/{}",
                errors.len(),
                self.key.spawn_id,
                self.key.spawn_asset_id
            );
            self.field_errors = errors.clone();
            return Err(SaveError::Validation { errors });
        }
        self.field_errors.clear();

        self.state = DraftState::Saving;
        let patch = build_overrides_diff(&self.draft.properties)?;

        let mut assets = self.spawn.assets.clone();
        if let Some(asset) = assets
            .iter_mut()
            .find(|asset| asset.id == self.key.spawn_asset_id)
        {
            asset.overrides = AssetOverrides {
                duration: self.draft.duration,
                properties: patch,
            };
        }

        let updated = match store.update_spawn(
            &self.key.spawn_id,
            UpdateSpawnFields {
                assets: Some(assets),
                ..Default::default()
            },
        ) {
            Ok(updated) => updated,
            Err(err) => {
                log::warn!("save failed for {}: {err}", self.key.spawn_id);
                self.state = DraftState::Dirty;
                return Err(err.into());
            }
        };

        self.asset = updated
            .asset(&self.key.spawn_asset_id)
            .cloned()
            .expect("store confirmed the updated asset");
        self.spawn = updated.clone();
        self.resolved = resolve_effective_properties(
            &self.spawn.default_properties,
            &self.asset.overrides.properties,
        );
        self.baseline = self.draft.clone();
        self.state = DraftState::Clean;
        cache.clear(&self.key);

        log::info!("saved overrides for {}/{}", self.key.spawn_id, self.key.spawn_asset_id);
        bus.publish(&SpawnEvent::SpawnUpdated {
            spawn_id: self.key.spawn_id.clone(),
            updated_spawn: Some(Box::new(updated)),
        });
        Ok(())
    }

    /// Close/back request. Clean sessions navigate immediately; dirty ones
    /// need a discard confirmation first.
    pub fn request_close(&self) -> CloseResponse {
        if self.has_unsaved_changes() {
            CloseResponse::ConfirmDiscard
        } else {
            CloseResponse::Navigate { skip_prompt: false }
        }
    }

    /// The user confirmed the discard: restore the baseline, clear the
    /// cache entry, and navigate with the guard's own prompt suppressed
    /// (the confirmation already happened here).
    pub fn confirm_discard(&mut self, cache: &mut DraftCache) -> CloseResponse {
        self.state = DraftState::Discarding;
        self.draft = self.baseline.clone();
        self.sliders.clear();
        self.field_errors.clear();
        cache.clear(&self.key);
        self.state = DraftState::Clean;
        log::debug!(
            "discarded draft for {}/{}",
            self.key.spawn_id,
            self.key.spawn_asset_id
        );
        CloseResponse::Navigate { skip_prompt: true }
    }

    /// The view is going away. A dirty session parks its draft in the
    /// cross-navigation cache so reopening the same placement resumes the
    /// unsaved edits; a clean one clears any stale entry.
    pub fn unmount(mut self, cache: &mut DraftCache) {
        self.flush_sliders();
        if self.has_unsaved_changes() {
            log::debug!(
                "caching dirty draft for {}/{}",
                self.key.spawn_id,
                self.key.spawn_asset_id
            );
            cache.set(
                self.key.clone(),
                CachedDraft {
                    draft: self.draft.clone(),
                    dirty: true,
                },
            );
        } else {
            cache.clear(&self.key);
        }
    }

    /// React to a cross-panel "spawn updated" broadcast. Events for other
    /// spawns are ignored; an absent payload means re-fetch from the store.
    /// Fresh defaults flow into the session's resolved view while the
    /// session's own override-enabled draft fields stay untouched.
    pub fn apply_spawn_update(&mut self, event: &SpawnEvent, store: &dyn SpawnStore) {
        let SpawnEvent::SpawnUpdated {
            spawn_id,
            updated_spawn,
        } = event;
        if spawn_id != &self.key.spawn_id {
            return;
        }

        let spawn = match updated_spawn {
            Some(spawn) => (**spawn).clone(),
            None => match store.get_spawn(spawn_id) {
                Some(spawn) => spawn,
                None => {
                    log::warn!("spawn {spawn_id} no longer exists; keeping stale session state");
                    return;
                }
            },
        };

        let asset = match spawn.asset(&self.key.spawn_asset_id) {
            Some(asset) => asset.clone(),
            None => {
                log::warn!(
                    "asset {} removed from spawn {spawn_id}; keeping stale session state",
                    self.key.spawn_asset_id
                );
                return;
            }
        };

        self.resolved =
            resolve_effective_properties(&spawn.default_properties, &asset.overrides.properties);
        self.baseline = draft_from_overrides(&asset.overrides);
        self.spawn = spawn;
        self.asset = asset;
        log::trace!(
            "session {}/{} refreshed from spawn update",
            self.key.spawn_id,
            self.key.spawn_asset_id
        );
    }
}

fn draft_from_overrides(overrides: &AssetOverrides) -> Draft {
    let mut properties = DesiredValues::new();
    for key in PropertyKey::iter() {
        if let Some(value) = overrides.properties.get(key) {
            properties.insert(key, value);
        }
    }
    Draft {
        properties,
        duration: overrides.duration,
    }
}

/// Type-specific validation rule for one field value.
pub fn validate_property(key: PropertyKey, value: &PropertyValue) -> Result<(), String> {
    match (key, value) {
        (PropertyKey::Volume, PropertyValue::Float(v)) => {
            if !v.is_finite() || !(0.0..=1.0).contains(v) {
                return Err("volume must be between 0 and 1".to_owned());
            }
        }
        (PropertyKey::Rotation, PropertyValue::Float(v)) => {
            if !v.is_finite() || !(-360.0..=360.0).contains(v) {
                return Err("rotation must be between -360 and 360 degrees".to_owned());
            }
        }
        (PropertyKey::Dimensions, PropertyValue::Dimensions(d)) => {
            if d.width == 0 || d.height == 0 {
                return Err("dimensions must be at least 1x1".to_owned());
            }
        }
        (PropertyKey::Scale, PropertyValue::Scale(s)) => {
            if !s.x.is_finite() || !s.y.is_finite() || s.x <= 0.0 || s.y <= 0.0 {
                return Err("scale factors must be positive".to_owned());
            }
        }
        (PropertyKey::Crop, PropertyValue::Crop(c)) => {
            if c.width == 0 || c.height == 0 {
                return Err("crop region must not be empty".to_owned());
            }
        }
        _ => {}
    }
    Ok(())
}

impl DraftSession {
    fn mark_dirty(&mut self) {
        if self.state == DraftState::Clean {
            log::trace!(
                "session {}/{} is now dirty",
                self.key.spawn_id,
                self.key.spawn_asset_id
            );
        }
        self.state = DraftState::Dirty;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::EventBus;
    use crate::persistence::InMemorySpawnStore;
    use crate::spawn::{AssetProperties, Dimensions, Profile};
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};

    /// Store wrapper that counts update calls and can fail on demand.
    struct ProbeStore {
        inner: InMemorySpawnStore,
        update_calls: usize,
        fail_next: Option<UpdateError>,
    }

    impl ProbeStore {
        fn new(inner: InMemorySpawnStore) -> Self {
            ProbeStore {
                inner,
                update_calls: 0,
                fail_next: None,
            }
        }
    }

    impl SpawnStore for ProbeStore {
        fn get_spawn(&self, id: &SpawnId) -> Option<Spawn> {
            self.inner.get_spawn(id)
        }

        fn update_spawn(
            &mut self,
            id: &SpawnId,
            fields: UpdateSpawnFields,
        ) -> Result<Spawn, UpdateError> {
            self.update_calls += 1;
            if let Some(err) = self.fail_next.take() {
                return Err(err);
            }
            self.inner.update_spawn(id, fields)
        }
    }

    fn fixture() -> (ProbeStore, SpawnId, SpawnAssetId) {
        let mut spawn = Spawn::new("Fixture");
        spawn.default_properties = AssetProperties {
            volume: Some(0.8),
            dimensions: Some(Dimensions {
                width: 80,
                height: 80,
            }),
            ..Default::default()
        };
        spawn.assets.push(SpawnAsset::new("asset-1", 0));
        let spawn_id = spawn.id.clone();
        let asset_id = spawn.assets[0].id.clone();

        let mut profile = Profile::new("Test");
        profile.spawns.push(spawn);
        let store = InMemorySpawnStore::new(Arc::new(Mutex::new(profile)));
        (ProbeStore::new(store), spawn_id, asset_id)
    }

    fn seed_session(store: &ProbeStore, spawn_id: &SpawnId, asset_id: &SpawnAssetId) -> DraftSession {
        let spawn = store.get_spawn(spawn_id).unwrap();
        let asset = spawn.asset(asset_id).cloned().unwrap();
        DraftSession::seed(spawn, asset, None)
    }

    #[test]
    fn fresh_seed_is_clean_with_empty_draft() {
        let (store, spawn_id, asset_id) = fixture();
        let session = seed_session(&store, &spawn_id, &asset_id);

        assert_eq!(session.state(), DraftState::Clean);
        assert!(session.draft().properties.is_empty());
        assert_eq!(session.view().effective.volume, Some(0.8));
    }

    #[test]
    fn seed_from_cache_restores_draft_and_dirty_flag() {
        let (store, spawn_id, asset_id) = fixture();
        let spawn = store.get_spawn(&spawn_id).unwrap();
        let asset = spawn.asset(&asset_id).cloned().unwrap();

        let mut draft = Draft::default();
        draft
            .properties
            .insert(PropertyKey::Volume, PropertyValue::Float(0.7));
        let cached = CachedDraft { draft, dirty: true };

        let session = DraftSession::seed(spawn, asset, Some(cached));
        assert_eq!(session.state(), DraftState::Dirty);
        assert!(session.has_unsaved_changes());
        assert_eq!(session.view().effective.volume, Some(0.7));
    }

    #[test]
    fn edit_marks_dirty() {
        let (store, spawn_id, asset_id) = fixture();
        let mut session = seed_session(&store, &spawn_id, &asset_id);

        session
            .set_property(PropertyKey::Muted, Some(PropertyValue::Bool(true)))
            .unwrap();
        assert_eq!(session.state(), DraftState::Dirty);
    }

    #[test]
    fn invalid_field_blocks_save_without_store_call() {
        let (mut store, spawn_id, asset_id) = fixture();
        let mut session = seed_session(&store, &spawn_id, &asset_id);
        let mut cache = DraftCache::new();
        let bus = EventBus::new();

        session
            .set_property(PropertyKey::Volume, Some(PropertyValue::Float(1.5)))
            .unwrap();
        assert!(session.field_errors().contains_key(&PropertyKey::Volume));

        let err = session.save(&mut store, &mut cache, &bus).unwrap_err();
        assert!(matches!(err, SaveError::Validation { .. }));
        assert_eq!(store.update_calls, 0);
        assert!(session.has_unsaved_changes());
    }

    #[test]
    fn save_persists_minimal_diff_and_broadcasts() {
        let (mut store, spawn_id, asset_id) = fixture();
        let mut session = seed_session(&store, &spawn_id, &asset_id);
        let mut cache = DraftCache::new();
        let bus = EventBus::new();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let _sub = {
            let seen = Arc::clone(&seen);
            bus.subscribe(move |event| {
                let SpawnEvent::SpawnUpdated { spawn_id, .. } = event;
                seen.lock().unwrap().push(spawn_id.clone());
            })
        };

        session
            .set_property(
                PropertyKey::Dimensions,
                Some(PropertyValue::Dimensions(Dimensions {
                    width: 120,
                    height: 90,
                })),
            )
            .unwrap();
        session.save(&mut store, &mut cache, &bus).unwrap();

        assert_eq!(session.state(), DraftState::Clean);
        assert_eq!(store.update_calls, 1);
        assert_eq!(*seen.lock().unwrap(), vec![spawn_id.clone()]);

        // Persisted overrides carry dimensions only.
        let stored = store.get_spawn(&spawn_id).unwrap();
        let overrides = &stored.asset(&asset_id).unwrap().overrides;
        assert_eq!(
            serde_json::to_value(&overrides.properties).unwrap(),
            serde_json::json!({ "dimensions": { "width": 120, "height": 90 } })
        );
    }

    #[test]
    fn value_equal_to_the_default_is_not_stored_as_an_override() {
        let (mut store, spawn_id, asset_id) = fixture();
        let mut session = seed_session(&store, &spawn_id, &asset_id);
        let mut cache = DraftCache::new();
        let bus = EventBus::new();

        // The fixture default volume is 0.8; "overriding" to 0.8 is inherit.
        session
            .set_property(PropertyKey::Volume, Some(PropertyValue::Float(0.8)))
            .unwrap();
        session
            .set_property(PropertyKey::Muted, Some(PropertyValue::Bool(true)))
            .unwrap();
        session.save(&mut store, &mut cache, &bus).unwrap();

        let stored = store.get_spawn(&spawn_id).unwrap();
        let overrides = &stored.asset(&asset_id).unwrap().overrides.properties;
        assert_eq!(overrides.volume, None);
        assert_eq!(overrides.muted, Some(true));
    }

    #[test]
    fn persist_failure_keeps_draft_for_retry() {
        let (mut store, spawn_id, asset_id) = fixture();
        let mut session = seed_session(&store, &spawn_id, &asset_id);
        let mut cache = DraftCache::new();
        let bus = EventBus::new();

        session
            .set_property(PropertyKey::Muted, Some(PropertyValue::Bool(true)))
            .unwrap();
        store.fail_next = Some(UpdateError::Validation("backend said no".to_owned()));

        let err = session.save(&mut store, &mut cache, &bus).unwrap_err();
        assert!(matches!(err, SaveError::Persist(_)));
        assert!(session.has_unsaved_changes());
        assert_eq!(
            session.draft().properties.get(&PropertyKey::Muted),
            Some(&PropertyValue::Bool(true))
        );

        // Retry succeeds.
        session.save(&mut store, &mut cache, &bus).unwrap();
        assert_eq!(session.state(), DraftState::Clean);
        assert_eq!(store.update_calls, 2);
    }

    #[test]
    fn slider_does_not_commit_inside_quiet_period() {
        let (store, spawn_id, asset_id) = fixture();
        let mut session = seed_session(&store, &spawn_id, &asset_id);
        let start = Instant::now();

        session.slider_tick(PropertyKey::Volume, 0.4, start);
        session.poll_sliders(start + Duration::from_millis(100));

        assert_eq!(session.state(), DraftState::Clean);
        assert_eq!(session.live_value(PropertyKey::Volume), Some(0.4));
        assert!(!session.draft().properties.contains_key(&PropertyKey::Volume));
    }

    #[test]
    fn slider_commits_after_quiet_period() {
        let (store, spawn_id, asset_id) = fixture();
        let mut session = seed_session(&store, &spawn_id, &asset_id);
        let start = Instant::now();

        session.slider_tick(PropertyKey::Volume, 0.4, start);
        session.slider_tick(PropertyKey::Volume, 0.6, start + Duration::from_millis(80));
        // 150 ms from the *last* tick.
        session.poll_sliders(start + Duration::from_millis(200));

        assert!(!session.draft().properties.contains_key(&PropertyKey::Volume));
        session.poll_sliders(start + Duration::from_millis(240));
        assert_eq!(
            session.draft().properties.get(&PropertyKey::Volume),
            Some(&PropertyValue::Float(0.6))
        );
        assert_eq!(session.state(), DraftState::Dirty);
        assert_eq!(session.live_value(PropertyKey::Volume), None);
    }

    #[test]
    fn save_flushes_pending_slider_tick() {
        let (mut store, spawn_id, asset_id) = fixture();
        let mut session = seed_session(&store, &spawn_id, &asset_id);
        let mut cache = DraftCache::new();
        let bus = EventBus::new();

        // Tick then save immediately, well inside the quiet period.
        session.slider_tick(PropertyKey::Volume, 0.35, Instant::now());
        session.save(&mut store, &mut cache, &bus).unwrap();

        let stored = store.get_spawn(&spawn_id).unwrap();
        assert_eq!(
            stored.asset(&asset_id).unwrap().overrides.properties.volume,
            Some(0.35)
        );
    }

    #[test]
    fn discard_restores_baseline_and_skips_prompt() {
        let (store, spawn_id, asset_id) = fixture();
        let mut session = seed_session(&store, &spawn_id, &asset_id);
        let mut cache = DraftCache::new();

        session
            .set_property(PropertyKey::Muted, Some(PropertyValue::Bool(true)))
            .unwrap();
        cache.set(
            session.key().clone(),
            CachedDraft {
                draft: session.draft().clone(),
                dirty: true,
            },
        );

        assert_eq!(session.request_close(), CloseResponse::ConfirmDiscard);
        let response = session.confirm_discard(&mut cache);

        assert_eq!(response, CloseResponse::Navigate { skip_prompt: true });
        assert_eq!(session.state(), DraftState::Clean);
        assert!(session.draft().properties.is_empty());
        assert!(cache.is_empty());
    }

    #[test]
    fn clean_close_navigates_without_prompt() {
        let (store, spawn_id, asset_id) = fixture();
        let session = seed_session(&store, &spawn_id, &asset_id);
        assert_eq!(
            session.request_close(),
            CloseResponse::Navigate { skip_prompt: false }
        );
    }

    #[test]
    fn dirty_unmount_parks_draft_in_cache() {
        let (store, spawn_id, asset_id) = fixture();
        let mut session = seed_session(&store, &spawn_id, &asset_id);
        let mut cache = DraftCache::new();

        session
            .set_property(PropertyKey::Volume, Some(PropertyValue::Float(0.7)))
            .unwrap();
        let key = session.key().clone();
        session.unmount(&mut cache);

        let cached = cache.get(&key).unwrap();
        assert!(cached.dirty);
        assert_eq!(
            cached.draft.properties.get(&PropertyKey::Volume),
            Some(&PropertyValue::Float(0.7))
        );
    }

    #[test]
    fn clean_unmount_clears_cache_entry() {
        let (store, spawn_id, asset_id) = fixture();
        let session = seed_session(&store, &spawn_id, &asset_id);
        let mut cache = DraftCache::new();
        let key = session.key().clone();
        cache.set(
            key.clone(),
            CachedDraft {
                draft: Draft::default(),
                dirty: false,
            },
        );

        session.unmount(&mut cache);
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn spawn_update_for_other_spawn_is_ignored() {
        let (store, spawn_id, asset_id) = fixture();
        let mut session = seed_session(&store, &spawn_id, &asset_id);
        let resolved_before = session.resolved().clone();

        session.apply_spawn_update(
            &SpawnEvent::SpawnUpdated {
                spawn_id: SpawnId::from("someone-else"),
                updated_spawn: None,
            },
            &store,
        );
        assert_eq!(*session.resolved(), resolved_before);
    }

    #[test]
    fn spawn_update_refreshes_defaults_but_keeps_draft_overrides() {
        let (mut store, spawn_id, asset_id) = fixture();
        let mut session = seed_session(&store, &spawn_id, &asset_id);

        // The user override-edits volume while another panel changes the
        // spawn default volume and dimensions.
        session
            .set_property(PropertyKey::Volume, Some(PropertyValue::Float(0.2)))
            .unwrap();

        let updated = store
            .update_spawn(
                &spawn_id,
                UpdateSpawnFields {
                    duration: Some(9000),
                    ..Default::default()
                },
            )
            .unwrap();
        let mut updated = updated;
        updated.default_properties.volume = Some(0.55);

        session.apply_spawn_update(
            &SpawnEvent::SpawnUpdated {
                spawn_id: spawn_id.clone(),
                updated_spawn: Some(Box::new(updated)),
            },
            &store,
        );

        let view = session.view();
        // Overridden field untouched; fresh default visible elsewhere.
        assert_eq!(view.effective.volume, Some(0.2));
        assert_eq!(session.resolved().effective.volume, Some(0.55));
        assert_eq!(session.spawn().duration, 9000);
        assert_eq!(session.asset().id, asset_id);
    }

    #[test]
    fn spawn_update_without_payload_refetches_from_store() {
        let (mut store, spawn_id, asset_id) = fixture();
        let mut session = seed_session(&store, &spawn_id, &asset_id);

        store
            .update_spawn(
                &spawn_id,
                UpdateSpawnFields {
                    name: Some("Renamed elsewhere".to_owned()),
                    ..Default::default()
                },
            )
            .unwrap();

        session.apply_spawn_update(
            &SpawnEvent::SpawnUpdated {
                spawn_id: spawn_id.clone(),
                updated_spawn: None,
            },
            &store,
        );
        assert_eq!(session.spawn().name, "Renamed elsewhere");
    }

    #[test]
    fn validation_rules() {
        assert!(validate_property(PropertyKey::Volume, &PropertyValue::Float(0.0)).is_ok());
        assert!(validate_property(PropertyKey::Volume, &PropertyValue::Float(1.0)).is_ok());
        assert!(validate_property(PropertyKey::Volume, &PropertyValue::Float(-0.1)).is_err());
        assert!(validate_property(PropertyKey::Volume, &PropertyValue::Float(f64::NAN)).is_err());
        assert!(validate_property(PropertyKey::Rotation, &PropertyValue::Float(360.0)).is_ok());
        assert!(validate_property(PropertyKey::Rotation, &PropertyValue::Float(361.0)).is_err());
        assert!(validate_property(
            PropertyKey::Dimensions,
            &PropertyValue::Dimensions(Dimensions {
                width: 0,
                height: 10,
            })
        )
        .is_err());
        assert!(validate_property(PropertyKey::Muted, &PropertyValue::Bool(true)).is_ok());
    }
}
