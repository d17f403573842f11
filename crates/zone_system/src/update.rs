//! # Scene Updates
//!
//! A [`SceneUpdate`] is an immutable delta record describing one incremental
//! change to a scene. Each update applies from a base version and advances the
//! scene by a version increment (almost always 1), so clients holding an older
//! copy of a scene can catch up by replaying updates instead of re-fetching the
//! whole model.
//!
//! Update payloads are strongly typed through [`UpdateKind`]. Any kind is
//! erased into an [`UpdatePayload`] trait object through a blanket
//! implementation, the same way every serde type becomes an event.

use crate::error::ZoneError;
use crate::scene::SceneModel;
use crate::types::SceneId;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::any::Any;
use std::fmt::Debug;
use std::sync::Arc;

// ============================================================================
// Update kinds
// ============================================================================

/// A typed scene update payload.
///
/// Implementors only describe how the payload changes a scene model; version
/// bookkeeping is handled by [`SceneModel::apply`].
///
/// ```rust
/// use serde::{Deserialize, Serialize};
/// use zone_system::{SceneModel, UpdateKind, ZoneError};
///
/// #[derive(Debug, Serialize, Deserialize)]
/// struct SetWeather {
///     raining: bool,
/// }
///
/// impl UpdateKind for SetWeather {
///     const KIND: &'static str = "set_weather";
///
///     fn apply(&self, model: &mut SceneModel) -> Result<(), ZoneError> {
///         model.set_data("raining", serde_json::Value::Bool(self.raining));
///         Ok(())
///     }
/// }
/// ```
pub trait UpdateKind: Serialize + DeserializeOwned + Debug + Send + Sync + 'static {
    /// Stable name of this kind, used as the registry key.
    const KIND: &'static str;

    /// Applies the payload to the model.
    fn apply(&self, model: &mut SceneModel) -> Result<(), ZoneError>;
}

/// Object-safe view of an update payload.
pub trait UpdatePayload: Send + Sync + Any + Debug {
    /// Returns the registry name of the payload's kind.
    fn kind(&self) -> &'static str;

    /// Serializes the payload body.
    fn encode_body(&self) -> Result<serde_json::Value, ZoneError>;

    /// Applies the payload to a scene model.
    fn apply_to(&self, model: &mut SceneModel) -> Result<(), ZoneError>;

    /// Returns this payload as `&dyn Any` for downcasting.
    fn as_any(&self) -> &dyn Any;
}

impl<T> UpdatePayload for T
where
    T: UpdateKind,
{
    fn kind(&self) -> &'static str {
        T::KIND
    }

    fn encode_body(&self) -> Result<serde_json::Value, ZoneError> {
        Ok(serde_json::to_value(self)?)
    }

    fn apply_to(&self, model: &mut SceneModel) -> Result<(), ZoneError> {
        UpdateKind::apply(self, model)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Scene update record
// ============================================================================

/// A versioned delta record for one scene.
#[derive(Debug, Clone)]
pub struct SceneUpdate {
    scene_id: SceneId,
    base_version: i32,
    version_increment: i32,
    payload: Arc<dyn UpdatePayload>,
}

impl SceneUpdate {
    /// Creates an update applying `kind` from `base_version` with an increment of 1.
    pub fn new<K: UpdateKind>(scene_id: SceneId, base_version: i32, kind: K) -> Self {
        Self::from_payload(scene_id, base_version, 1, Arc::new(kind))
    }

    /// Creates an update from an already erased payload.
    pub fn from_payload(
        scene_id: SceneId,
        base_version: i32,
        version_increment: i32,
        payload: Arc<dyn UpdatePayload>,
    ) -> Self {
        Self {
            scene_id,
            base_version,
            version_increment,
            payload,
        }
    }

    /// Overrides the version increment.
    pub fn with_increment(mut self, version_increment: i32) -> Self {
        self.version_increment = version_increment;
        self
    }

    pub fn scene_id(&self) -> SceneId {
        self.scene_id
    }

    /// The scene version this update applies from.
    pub fn base_version(&self) -> i32 {
        self.base_version
    }

    pub fn version_increment(&self) -> i32 {
        self.version_increment
    }

    /// The scene version produced by applying this update.
    pub fn target_version(&self) -> i32 {
        self.base_version + self.version_increment
    }

    pub fn payload(&self) -> &Arc<dyn UpdatePayload> {
        &self.payload
    }

    /// Downcasts the payload to a concrete kind.
    pub fn payload_as<K: UpdateKind>(&self) -> Option<&K> {
        self.payload.as_any().downcast_ref::<K>()
    }
}

// ============================================================================
// Built-in kinds
// ============================================================================

/// Renames a scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetSceneName {
    pub name: String,
}

impl UpdateKind for SetSceneName {
    const KIND: &'static str = "set_scene_name";

    fn apply(&self, model: &mut SceneModel) -> Result<(), ZoneError> {
        model.name = self.name.clone();
        Ok(())
    }
}

/// Sets (or with a null value, removes) one key of the scene's data object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetSceneData {
    pub key: String,
    pub value: serde_json::Value,
}

impl UpdateKind for SetSceneData {
    const KIND: &'static str = "set_scene_data";

    fn apply(&self, model: &mut SceneModel) -> Result<(), ZoneError> {
        if self.value.is_null() {
            model.remove_data(&self.key);
        } else {
            model.set_data(&self.key, self.value.clone());
        }
        Ok(())
    }
}
