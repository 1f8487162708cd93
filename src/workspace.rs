//! Editor workspace controller.
//!
//! Owns the pieces one editor surface shares: the spawn store, the event
//! bus, the cross-navigation draft cache, and at most one live
//! [`DraftSession`]. Opening the same (spawn, placement) pair again returns
//! the live session instead of seeding a second one; opening a different
//! pair parks the old session's draft in the cache first.

use std::sync::Arc;

use crate::draft::{CloseResponse, DraftCache, DraftKey, DraftSession, EditorError, SaveError};
use crate::event_bus::{EventBus, SpawnEvent};
use crate::persistence::SpawnStore;
use crate::spawn::{SpawnAssetId, SpawnId};

pub struct Workspace {
    store: Box<dyn SpawnStore>,
    event_bus: Arc<EventBus>,
    draft_cache: DraftCache,
    active: Option<DraftSession>,
}

impl Workspace {
    pub fn new(store: Box<dyn SpawnStore>) -> Self {
        Workspace {
            store,
            event_bus: EventBus::new(),
            draft_cache: DraftCache::new(),
            active: None,
        }
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn store(&self) -> &dyn SpawnStore {
        self.store.as_ref()
    }

    pub fn active_session(&self) -> Option<&DraftSession> {
        self.active.as_ref()
    }

    /// Open the editor for one placement.
    ///
    /// If a session for the same pair is already live it is returned as-is,
    /// unsaved edits and all. Otherwise the current session (if any) is
    /// unmounted into the draft cache and a fresh one is seeded, resuming a
    /// cached draft when the user has been here before.
    pub fn open_editor(
        &mut self,
        spawn_id: &SpawnId,
        spawn_asset_id: &SpawnAssetId,
    ) -> Result<&mut DraftSession, EditorError> {
        let key = DraftKey {
            spawn_id: spawn_id.clone(),
            spawn_asset_id: spawn_asset_id.clone(),
        };

        let reopening = matches!(&self.active, Some(session) if *session.key() == key);
        if !reopening {
            let spawn = self
                .store
                .get_spawn(spawn_id)
                .ok_or_else(|| EditorError::NotFound {
                    spawn_id: spawn_id.clone(),
                    spawn_asset_id: spawn_asset_id.clone(),
                })?;
            let asset = spawn
                .asset(spawn_asset_id)
                .cloned()
                .ok_or_else(|| EditorError::NotFound {
                    spawn_id: spawn_id.clone(),
                    spawn_asset_id: spawn_asset_id.clone(),
                })?;

            if let Some(previous) = self.active.take() {
                previous.unmount(&mut self.draft_cache);
            }

            let cached = self.draft_cache.get(&key).cloned();
            log::debug!("opening editor for {spawn_id}/{spawn_asset_id}");
            self.active = Some(DraftSession::seed(spawn, asset, cached));
        }

        Ok(self
            .active
            .as_mut()
            .expect("a session was live or just seeded"))
    }

    /// Save the open session. No-op when no editor is open.
    pub fn save_active(&mut self) -> Result<(), SaveError> {
        let Some(session) = self.active.as_mut() else {
            return Ok(());
        };
        session.save(self.store.as_mut(), &mut self.draft_cache, &self.event_bus)
    }

    /// Close/back request for the open session. `None` when no editor is
    /// open. A dirty session answers `ConfirmDiscard` and stays open until
    /// [`Workspace::confirm_discard`] (or a save) resolves it.
    pub fn request_close(&mut self) -> Option<CloseResponse> {
        let response = self.active.as_ref()?.request_close();
        if let CloseResponse::Navigate { .. } = response {
            if let Some(session) = self.active.take() {
                session.unmount(&mut self.draft_cache);
            }
        }
        Some(response)
    }

    /// The user confirmed discarding unsaved changes: drop them, close the
    /// session, and navigate.
    pub fn confirm_discard(&mut self) -> Option<CloseResponse> {
        let mut session = self.active.take()?;
        let response = session.confirm_discard(&mut self.draft_cache);
        session.unmount(&mut self.draft_cache);
        Some(response)
    }

    /// Forward a spawn-changed broadcast to the open session. Embedders
    /// bridging from an event bus subscription call this on their own
    /// update loop.
    pub fn handle_event(&mut self, event: &SpawnEvent) {
        if let Some(session) = self.active.as_mut() {
            session.apply_spawn_update(event, self.store.as_ref());
        }
    }

    /// Commit debounced slider values that have gone quiet.
    pub fn poll(&mut self, now: std::time::Instant) {
        if let Some(session) = self.active.as_mut() {
            session.poll_sliders(now);
        }
    }
}
