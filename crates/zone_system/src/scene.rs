//! # Scenes
//!
//! Runtime state for versioned scenes and the registry that resolves it.
//!
//! A scene is resolved at most once per process: the first request loads the
//! model and its stored update history through a [`SceneLoader`], later
//! requests share the resulting [`SceneManager`]. Concurrent resolutions of
//! the same scene wait on the same load. Failed loads are not cached.

use crate::codec::{StoredUpdate, UpdateCodec};
use crate::error::ZoneError;
use crate::types::{PlaceOid, SceneId};
use crate::update::SceneUpdate;
use crate::update_list::UpdateList;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info, warn};

// ============================================================================
// Scene model
// ============================================================================

/// Full snapshot of a scene's persistent state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneModel {
    pub scene_id: SceneId,
    /// Monotonically increasing version, advanced only by applied updates
    pub version: i32,
    pub name: String,
    /// Free-form scene data, always a JSON object
    pub data: serde_json::Value,
}

impl SceneModel {
    /// Creates an empty model at version 0.
    pub fn new(scene_id: SceneId, name: impl Into<String>) -> Self {
        Self {
            scene_id,
            version: 0,
            name: name.into(),
            data: serde_json::Value::Object(serde_json::Map::new()),
        }
    }

    pub fn with_version(mut self, version: i32) -> Self {
        self.version = version;
        self
    }

    /// Sets one key of the data object.
    pub fn set_data(&mut self, key: &str, value: serde_json::Value) {
        if !self.data.is_object() {
            self.data = serde_json::Value::Object(serde_json::Map::new());
        }
        if let Some(map) = self.data.as_object_mut() {
            map.insert(key.to_string(), value);
        }
    }

    /// Removes one key of the data object.
    pub fn remove_data(&mut self, key: &str) {
        if let Some(map) = self.data.as_object_mut() {
            map.remove(key);
        }
    }

    /// Applies an update and advances the version.
    ///
    /// # Errors
    ///
    /// Returns [`ZoneError::VersionMismatch`] unless the update applies from the
    /// model's current version. The model is unchanged on error.
    pub fn apply(&mut self, update: &SceneUpdate) -> Result<(), ZoneError> {
        if update.base_version() != self.version {
            return Err(ZoneError::VersionMismatch {
                scene_id: self.scene_id,
                model_version: self.version,
                update_base: update.base_version(),
            });
        }
        update.payload().apply_to(self)?;
        self.version = update.target_version();
        Ok(())
    }
}

/// Configuration a client needs to enter a place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceConfig {
    /// Client-side controller for the place
    pub place_type: String,
    pub scene_id: SceneId,
}

// ============================================================================
// Scene manager
// ============================================================================

#[derive(Debug)]
struct SceneState {
    model: SceneModel,
    updates: UpdateList,
}

/// Runtime state of a resolved scene: its place, model and update history.
#[derive(Debug)]
pub struct SceneManager {
    place_oid: PlaceOid,
    place_config: PlaceConfig,
    state: RwLock<SceneState>,
}

impl SceneManager {
    /// Creates a manager for a loaded scene.
    ///
    /// If the update history does not end at the model's version it cannot be
    /// used to bring clients up to date, so it is discarded.
    pub fn new(
        place_oid: PlaceOid,
        place_config: PlaceConfig,
        model: SceneModel,
        mut updates: UpdateList,
    ) -> Self {
        if !updates.validate(model.version) {
            warn!(
                "⚠️ Update history for scene {} ends at {:?} but model is at version {}; discarding it",
                model.scene_id,
                updates.latest_version(),
                model.version
            );
            updates = UpdateList::new();
        }
        Self {
            place_oid,
            place_config,
            state: RwLock::new(SceneState { model, updates }),
        }
    }

    pub fn place_oid(&self) -> PlaceOid {
        self.place_oid
    }

    pub fn place_config(&self) -> &PlaceConfig {
        &self.place_config
    }

    pub fn scene_id(&self) -> SceneId {
        self.place_config.scene_id
    }

    /// Returns a snapshot of the current model.
    pub async fn model(&self) -> SceneModel {
        self.state.read().await.model.clone()
    }

    pub async fn version(&self) -> i32 {
        self.state.read().await.model.version
    }

    /// Returns the deltas that bring a copy at `from_version` up to date.
    pub async fn updates_since(&self, from_version: i32) -> Option<Vec<SceneUpdate>> {
        self.state.read().await.updates.get_updates(from_version)
    }

    /// Reads the model and, for an out-of-date client, the bridging deltas
    /// under a single lock so the two are consistent.
    pub async fn sync_state(&self, client_version: i32) -> (SceneModel, Option<Vec<SceneUpdate>>) {
        let state = self.state.read().await;
        let deltas = if client_version < state.model.version {
            state.updates.get_updates(client_version)
        } else {
            None
        };
        (state.model.clone(), deltas)
    }

    /// Applies an update to the model and appends it to the update history.
    ///
    /// Either both happen or neither does.
    pub async fn record_update(&self, update: SceneUpdate) -> Result<(), ZoneError> {
        let mut state = self.state.write().await;

        let mut model = state.model.clone();
        model.apply(&update)?;
        state.updates.add_update(update)?;
        state.model = model;

        debug!(
            "📝 Scene {} advanced to version {}",
            state.model.scene_id, state.model.version
        );
        Ok(())
    }

    /// Checks that the update history ends at the model's version.
    pub async fn validate(&self) -> bool {
        let state = self.state.read().await;
        state.updates.validate(state.model.version)
    }
}

// ============================================================================
// Loading and resolution
// ============================================================================

/// A scene as returned by the persistence layer.
#[derive(Debug, Clone)]
pub struct LoadedScene {
    pub model: SceneModel,
    pub place_config: PlaceConfig,
    /// Stored update history, oldest first
    pub updates: Vec<StoredUpdate>,
}

/// Persistence collaborator that loads scenes.
#[async_trait]
pub trait SceneLoader: Send + Sync {
    async fn load_scene(&self, scene_id: SceneId) -> Result<LoadedScene, ZoneError>;
}

/// In-memory [`SceneLoader`].
#[derive(Debug, Default)]
pub struct MemorySceneStore {
    scenes: DashMap<SceneId, LoadedScene>,
}

impl MemorySceneStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a scene.
    pub fn insert_scene(&self, model: SceneModel, place_type: impl Into<String>) {
        let place_config = PlaceConfig {
            place_type: place_type.into(),
            scene_id: model.scene_id,
        };
        self.scenes.insert(
            model.scene_id,
            LoadedScene {
                model,
                place_config,
                updates: Vec::new(),
            },
        );
    }

    /// Appends a stored update to a scene's history.
    pub fn append_update(&self, stored: StoredUpdate) -> Result<(), ZoneError> {
        let mut scene = self
            .scenes
            .get_mut(&stored.scene_id)
            .ok_or_else(|| ZoneError::ResolutionFailed(format!("no such scene {}", stored.scene_id)))?;
        scene.updates.push(stored);
        Ok(())
    }

    pub fn contains(&self, scene_id: SceneId) -> bool {
        self.scenes.contains_key(&scene_id)
    }
}

#[async_trait]
impl SceneLoader for MemorySceneStore {
    async fn load_scene(&self, scene_id: SceneId) -> Result<LoadedScene, ZoneError> {
        self.scenes
            .get(&scene_id)
            .map(|scene| scene.value().clone())
            .ok_or_else(|| ZoneError::ResolutionFailed(format!("no such scene {scene_id}")))
    }
}

/// Resolves scenes once per scene id and caches the result.
pub struct SceneRegistry {
    loader: Arc<dyn SceneLoader>,
    codec: UpdateCodec,
    scenes: DashMap<SceneId, Arc<OnceCell<Arc<SceneManager>>>>,
    next_place_oid: AtomicI32,
}

impl SceneRegistry {
    pub fn new(loader: Arc<dyn SceneLoader>, codec: UpdateCodec) -> Self {
        Self {
            loader,
            codec,
            scenes: DashMap::new(),
            next_place_oid: AtomicI32::new(1),
        }
    }

    pub fn codec(&self) -> &UpdateCodec {
        &self.codec
    }

    /// Resolves a scene, loading it on first use.
    pub async fn resolve_scene(&self, scene_id: SceneId) -> Result<Arc<SceneManager>, ZoneError> {
        let cell = self.scenes.entry(scene_id).or_default().value().clone();
        match cell.get_or_try_init(|| self.load(scene_id)).await {
            Ok(manager) => Ok(manager.clone()),
            Err(e) => {
                // Failed ids must not pile up in the cache
                self.scenes
                    .remove_if(&scene_id, |_, cell| !cell.initialized());
                Err(e)
            }
        }
    }

    /// Returns a scene only if it is already resolved.
    pub fn get_scene(&self, scene_id: SceneId) -> Option<Arc<SceneManager>> {
        self.scenes
            .get(&scene_id)
            .and_then(|cell| cell.get().cloned())
    }

    /// Drops a resolved scene; the next resolution reloads it.
    pub fn unload_scene(&self, scene_id: SceneId) -> bool {
        self.scenes.remove(&scene_id).is_some()
    }

    pub fn resolved_count(&self) -> usize {
        self.scenes.iter().filter(|cell| cell.initialized()).count()
    }

    async fn load(&self, scene_id: SceneId) -> Result<Arc<SceneManager>, ZoneError> {
        debug!("📂 Loading scene {}", scene_id);
        let loaded = self.loader.load_scene(scene_id).await?;

        let mut updates = UpdateList::new();
        for stored in &loaded.updates {
            let update = self.codec.decode(stored)?;
            updates.add_update(update)?;
        }

        let place_oid = PlaceOid(self.next_place_oid.fetch_add(1, Ordering::Relaxed));
        info!(
            "🏛️ Resolved scene {} '{}' v{} into place {} ({} updates)",
            scene_id,
            loaded.model.name,
            loaded.model.version,
            place_oid,
            updates.len()
        );

        Ok(Arc::new(SceneManager::new(
            place_oid,
            loaded.place_config,
            loaded.model,
            updates,
        )))
    }
}

impl std::fmt::Debug for SceneRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneRegistry")
            .field("scenes", &self.scenes.len())
            .field("loader", &"[loader]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::update::{SetSceneData, SetSceneName};
    use std::sync::atomic::AtomicUsize;

    struct CountingLoader {
        inner: MemorySceneStore,
        loads: AtomicUsize,
    }

    #[async_trait]
    impl SceneLoader for CountingLoader {
        async fn load_scene(&self, scene_id: SceneId) -> Result<LoadedScene, ZoneError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            self.inner.load_scene(scene_id).await
        }
    }

    #[test]
    fn test_model_apply_checks_base_version() {
        let mut model = SceneModel::new(SceneId(1), "Lobby").with_version(3);

        let stale = SceneUpdate::new(SceneId(1), 2, SetSceneName { name: "Old".into() });
        assert!(matches!(
            model.apply(&stale),
            Err(ZoneError::VersionMismatch { model_version: 3, update_base: 2, .. })
        ));
        assert_eq!(model.name, "Lobby");

        let rename = SceneUpdate::new(SceneId(1), 3, SetSceneName { name: "Foyer".into() });
        model.apply(&rename).unwrap();
        assert_eq!(model.name, "Foyer");
        assert_eq!(model.version, 4);
    }

    #[tokio::test]
    async fn test_record_update_keeps_model_and_history_in_step() {
        let model = SceneModel::new(SceneId(4), "Dock").with_version(10);
        let config = PlaceConfig {
            place_type: "dock".into(),
            scene_id: SceneId(4),
        };
        let manager = SceneManager::new(PlaceOid(1), config, model, UpdateList::new());

        manager
            .record_update(SceneUpdate::new(
                SceneId(4),
                10,
                SetSceneData {
                    key: "tide".into(),
                    value: serde_json::json!("high"),
                },
            ))
            .await
            .unwrap();

        assert_eq!(manager.version().await, 11);
        assert!(manager.validate().await);
        assert_eq!(manager.updates_since(10).await.map(|u| u.len()), Some(1));

        let stale = SceneUpdate::new(SceneId(4), 10, SetSceneName { name: "x".into() });
        assert!(manager.record_update(stale).await.is_err());
        assert_eq!(manager.version().await, 11);
        assert_eq!(manager.model().await.name, "Dock");
    }

    #[tokio::test]
    async fn test_inconsistent_history_is_discarded() {
        let model = SceneModel::new(SceneId(2), "Yard").with_version(8);
        let config = PlaceConfig {
            place_type: "yard".into(),
            scene_id: SceneId(2),
        };
        let mut updates = UpdateList::new();
        updates
            .add_update(SceneUpdate::new(SceneId(2), 3, SetSceneName { name: "a".into() }))
            .unwrap();

        let manager = SceneManager::new(PlaceOid(1), config, model, updates);
        assert!(manager.updates_since(3).await.is_none());
        assert!(manager.validate().await);
    }

    #[tokio::test]
    async fn test_registry_loads_history_through_codec() {
        let codec = UpdateCodec::default();
        let store = MemorySceneStore::new();
        store.insert_scene(SceneModel::new(SceneId(5), "Garden").with_version(2), "garden");
        for base in 0..2 {
            let update = SceneUpdate::new(SceneId(5), base, SetSceneName { name: format!("g{base}") });
            store.append_update(codec.encode(&update).unwrap()).unwrap();
        }

        let registry = SceneRegistry::new(Arc::new(store), codec);
        let scene = registry.resolve_scene(SceneId(5)).await.unwrap();
        assert_eq!(scene.version().await, 2);
        assert_eq!(scene.updates_since(0).await.map(|u| u.len()), Some(2));
        assert!(registry.get_scene(SceneId(5)).is_some());
    }

    #[tokio::test]
    async fn test_concurrent_resolution_loads_once() {
        let inner = MemorySceneStore::new();
        inner.insert_scene(SceneModel::new(SceneId(6), "Tower"), "tower");
        let loader = Arc::new(CountingLoader {
            inner,
            loads: AtomicUsize::new(0),
        });
        let registry = Arc::new(SceneRegistry::new(loader.clone(), UpdateCodec::default()));

        let (a, b) = tokio::join!(
            registry.resolve_scene(SceneId(6)),
            registry.resolve_scene(SceneId(6))
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_resolution_is_not_cached() {
        let store = Arc::new(MemorySceneStore::new());
        let registry = SceneRegistry::new(store.clone(), UpdateCodec::default());

        assert!(registry.resolve_scene(SceneId(7)).await.is_err());
        assert_eq!(registry.resolved_count(), 0);
        assert!(registry.scenes.is_empty());

        for raw in 1000..1100 {
            assert!(registry.resolve_scene(SceneId(raw)).await.is_err());
        }
        assert!(registry.scenes.is_empty());

        store.insert_scene(SceneModel::new(SceneId(7), "Late"), "late");
        assert!(registry.resolve_scene(SceneId(7)).await.is_ok());
    }
}
