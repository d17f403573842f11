//! Wire form of move results.
//!
//! A [`MoveResult`] carries live scene updates; before it goes to a client
//! every update is encoded with the server's [`UpdateCodec`] so the client
//! can decode it with the same type registry.

use serde::{Deserialize, Serialize};
use tracing::error;
use zone_system::{
    MoveResult, NodeName, PlaceConfig, PlaceOid, SceneModel, StoredUpdate, UpdateCodec,
    ZoneSummary, INTERNAL_ERROR,
};

/// Response to a `zone/move_to` request as sent to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MoveResponse {
    /// Reconnect to another node and repeat the move there
    ServerSwitch {
        node: NodeName,
        host: String,
        port: u16,
    },
    Moved {
        place_oid: PlaceOid,
        place_config: PlaceConfig,
        zone: ZoneSummary,
    },
    MovedWithScene {
        place_oid: PlaceOid,
        place_config: PlaceConfig,
        zone: ZoneSummary,
        scene: SceneModel,
    },
    MovedWithUpdates {
        place_oid: PlaceOid,
        place_config: PlaceConfig,
        zone: ZoneSummary,
        updates: Vec<StoredUpdate>,
    },
    Failed {
        reason: String,
    },
}

impl MoveResponse {
    /// Converts a move result, encoding any scene updates it carries.
    ///
    /// An update that cannot be encoded turns the response into an internal
    /// error; the body has already moved, so the client refetches the scene
    /// on its next request.
    pub fn from_result(result: MoveResult, codec: &UpdateCodec) -> Self {
        match result {
            MoveResult::RequiresServerSwitch { node, host, port } => {
                MoveResponse::ServerSwitch { node, host, port }
            }
            MoveResult::Succeeded {
                place_oid,
                place_config,
                summary,
            } => MoveResponse::Moved {
                place_oid,
                place_config,
                zone: summary,
            },
            MoveResult::SucceededWithScene {
                place_oid,
                place_config,
                summary,
                model,
            } => MoveResponse::MovedWithScene {
                place_oid,
                place_config,
                zone: summary,
                scene: model,
            },
            MoveResult::SucceededWithUpdates {
                place_oid,
                place_config,
                summary,
                updates,
            } => {
                let encoded: Result<Vec<_>, _> = updates.iter().map(|u| codec.encode(u)).collect();
                match encoded {
                    Ok(updates) => MoveResponse::MovedWithUpdates {
                        place_oid,
                        place_config,
                        zone: summary,
                        updates,
                    },
                    Err(e) => {
                        error!("❌ Failed to encode scene updates: {}", e);
                        MoveResponse::Failed {
                            reason: INTERNAL_ERROR.to_string(),
                        }
                    }
                }
            }
            MoveResult::Failed { reason } => MoveResponse::Failed { reason },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self,
            MoveResponse::Moved { .. }
                | MoveResponse::MovedWithScene { .. }
                | MoveResponse::MovedWithUpdates { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zone_system::{SceneId, SceneUpdate, SetSceneName, ZoneId, ZoneType};

    fn summary() -> ZoneSummary {
        ZoneSummary {
            zone_id: ZoneId::qualify(ZoneType::new(1).unwrap(), 7),
            name: "Docks".into(),
            default_scene_id: SceneId(100),
        }
    }

    fn place_config() -> PlaceConfig {
        PlaceConfig {
            place_type: "scene".into(),
            scene_id: SceneId(100),
        }
    }

    #[test]
    fn test_server_switch_wire_shape() {
        let response = MoveResponse::from_result(
            MoveResult::RequiresServerSwitch {
                node: NodeName::new("beta"),
                host: "beta.example".into(),
                port: 4002,
            },
            &UpdateCodec::default(),
        );
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["type"], "server_switch");
        assert_eq!(json["host"], "beta.example");
        assert_eq!(json["port"], 4002);
        assert!(!response.is_success());
    }

    #[test]
    fn test_updates_are_encoded_for_the_client() {
        let codec = UpdateCodec::default();
        let update = SceneUpdate::new(SceneId(100), 2, SetSceneName { name: "Pier".into() });
        let response = MoveResponse::from_result(
            MoveResult::SucceededWithUpdates {
                place_oid: PlaceOid(3),
                place_config: place_config(),
                summary: summary(),
                updates: vec![update],
            },
            &codec,
        );

        match &response {
            MoveResponse::MovedWithUpdates { updates, zone, .. } => {
                assert_eq!(zone.name, "Docks");
                assert_eq!(updates.len(), 1);
                let decoded = codec.decode(&updates[0]).unwrap();
                assert_eq!(decoded.base_version(), 2);
                assert_eq!(decoded.payload_as::<SetSceneName>().unwrap().name, "Pier");
            }
            other => panic!("unexpected response: {other:?}"),
        }

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["type"], "moved_with_updates");
        assert_eq!(json["updates"][0]["scene_version"], 2);
    }

    #[test]
    fn test_failure_carries_reason_code() {
        let response = MoveResponse::from_result(
            MoveResult::Failed {
                reason: "m.no_such_zone".into(),
            },
            &UpdateCodec::default(),
        );
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            serde_json::json!({ "type": "failed", "reason": "m.no_such_zone" })
        );
    }
}
