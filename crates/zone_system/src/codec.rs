//! # Update Type Registry and Codec
//!
//! Persisted and transmitted updates identify their kind by an integer code.
//! Codes are handed out in registration order starting at 1. Retired kinds keep
//! their slot as a placeholder so a code is never reused for a different kind.
//!
//! The registry is a process-scoped object: build it once at startup, wrap it
//! in an [`UpdateCodec`] and share the codec with whatever needs to encode or
//! decode updates.

use crate::error::ZoneError;
use crate::types::SceneId;
use crate::update::{SceneUpdate, SetSceneData, SetSceneName, UpdateKind, UpdatePayload};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

type DecodeFn = fn(serde_json::Value) -> Result<Arc<dyn UpdatePayload>, ZoneError>;

fn decode_kind<K: UpdateKind>(body: serde_json::Value) -> Result<Arc<dyn UpdatePayload>, ZoneError> {
    let payload: K = serde_json::from_value(body)?;
    Ok(Arc::new(payload))
}

#[derive(Debug, Clone, Copy)]
struct KindEntry {
    name: &'static str,
    decode: DecodeFn,
}

/// Maps update type codes to update kinds.
#[derive(Debug, Default)]
pub struct UpdateTypeRegistry {
    /// Slot `i` holds code `i + 1`; `None` marks a retired code
    slots: Vec<Option<KindEntry>>,
    codes: HashMap<&'static str, u16>,
}

impl UpdateTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the built-in kinds registered as codes 1 and 2.
    pub fn with_builtin_kinds() -> Self {
        let mut registry = Self::new();
        // Fresh registry, neither kind can already be present.
        let _ = registry.register::<SetSceneName>();
        let _ = registry.register::<SetSceneData>();
        registry
    }

    /// Registers an update kind and returns its code.
    ///
    /// # Errors
    ///
    /// Returns [`ZoneError::DuplicateUpdateKind`] if the kind is already registered.
    pub fn register<K: UpdateKind>(&mut self) -> Result<u16, ZoneError> {
        if self.codes.contains_key(K::KIND) {
            return Err(ZoneError::DuplicateUpdateKind(K::KIND));
        }
        self.slots.push(Some(KindEntry {
            name: K::KIND,
            decode: decode_kind::<K>,
        }));
        let code = self.slots.len() as u16;
        self.codes.insert(K::KIND, code);
        Ok(code)
    }

    /// Permanently reserves the next code for a retired kind.
    pub fn reserve_retired(&mut self) -> u16 {
        self.slots.push(None);
        self.slots.len() as u16
    }

    /// Returns the code assigned to a kind name.
    pub fn code_of(&self, kind: &str) -> Option<u16> {
        self.codes.get(kind).copied()
    }

    /// Returns the kind name for a code, or `None` for unknown and retired codes.
    pub fn kind_of(&self, code: u16) -> Option<&'static str> {
        self.entry(code).map(|entry| entry.name)
    }

    /// Number of codes handed out, retired ones included.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn entry(&self, code: u16) -> Option<&KindEntry> {
        let index = (code as usize).checked_sub(1)?;
        self.slots.get(index).and_then(Option::as_ref)
    }
}

// ============================================================================
// Stored form
// ============================================================================

/// Persisted form of a scene update.
///
/// `data` carries the JSON encoding of the version increment and payload
/// body; it is base64 encoded when the record itself is serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredUpdate {
    pub scene_id: SceneId,
    /// Base version the update applies from
    pub scene_version: i32,
    pub update_type: u16,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct EncodedBody {
    version_increment: i32,
    body: serde_json::Value,
}

/// Encodes and decodes updates through a frozen [`UpdateTypeRegistry`].
#[derive(Debug, Clone)]
pub struct UpdateCodec {
    registry: Arc<UpdateTypeRegistry>,
}

impl UpdateCodec {
    pub fn new(registry: UpdateTypeRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub fn registry(&self) -> &UpdateTypeRegistry {
        &self.registry
    }

    /// Encodes an update into its stored form.
    pub fn encode(&self, update: &SceneUpdate) -> Result<StoredUpdate, ZoneError> {
        let kind = update.payload().kind();
        let update_type = self
            .registry
            .code_of(kind)
            .ok_or_else(|| ZoneError::UnregisteredUpdateKind(kind.to_string()))?;

        let data = serde_json::to_vec(&EncodedBody {
            version_increment: update.version_increment(),
            body: update.payload().encode_body()?,
        })?;

        Ok(StoredUpdate {
            scene_id: update.scene_id(),
            scene_version: update.base_version(),
            update_type,
            data,
        })
    }

    /// Decodes a stored update.
    ///
    /// # Errors
    ///
    /// Fails with [`ZoneError::UnknownUpdateType`] for unknown or retired codes
    /// and with [`ZoneError::Codec`] for malformed data.
    pub fn decode(&self, stored: &StoredUpdate) -> Result<SceneUpdate, ZoneError> {
        let entry = self
            .registry
            .entry(stored.update_type)
            .ok_or(ZoneError::UnknownUpdateType(stored.update_type))?;

        let encoded: EncodedBody = serde_json::from_slice(&stored.data)?;
        let payload = (entry.decode)(encoded.body)?;

        Ok(SceneUpdate::from_payload(
            stored.scene_id,
            stored.scene_version,
            encoded.version_increment,
            payload,
        ))
    }
}

impl Default for UpdateCodec {
    fn default() -> Self {
        Self::new(UpdateTypeRegistry::with_builtin_kinds())
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
