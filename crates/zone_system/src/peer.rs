//! # Cluster Zone Directory
//!
//! Each node publishes the set of zones it currently hosts into a shared
//! [`ClusterStore`]. Other nodes scan those records to decide whether a body
//! has to switch servers before it can enter a zone.
//!
//! The directory is a cache: records from different nodes are updated
//! independently, so a zone may briefly appear on no node or on two. The
//! right to resolve and host a zone is decided by a leased lock keyed on
//! `("ZoneHost", zone_id)`, acquired before resolution and released when the
//! zone shuts down or fails to resolve.

use crate::config::MovementConfig;
use crate::error::ZoneError;
use crate::types::{NodeName, ZoneId};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Directory entry announcing that a node hosts a zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostedZone {
    pub zone_id: ZoneId,
    pub name: String,
}

/// How clients reach a cluster node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub name: NodeName,
    pub public_host: String,
    pub port: u16,
}

/// One node's published directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub info: NodeInfo,
    /// Hosted zones ordered by zone id
    pub hosted: Vec<HostedZone>,
}

/// Key of a cluster-wide lock.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockKey {
    pub name: &'static str,
    pub id: i32,
}

impl LockKey {
    /// The lock deciding which node hosts a zone.
    pub fn zone_host(zone_id: ZoneId) -> Self {
        Self {
            name: "ZoneHost",
            id: zone_id.0,
        }
    }
}

impl std::fmt::Display for LockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.name, self.id)
    }
}

/// Result of a single lock attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockOutcome {
    Acquired,
    HeldBy(NodeName),
}

/// Shared cluster state: per-node zone directories and leased locks.
///
/// Implementations need not offer read-after-write consistency across nodes.
#[async_trait]
pub trait ClusterStore: Send + Sync {
    /// Adds a node with an empty directory, or updates its contact info.
    async fn register_node(&self, info: NodeInfo) -> Result<(), ZoneError>;

    /// Removes a node together with its directory.
    async fn remove_node(&self, node: &NodeName) -> Result<(), ZoneError>;

    /// Adds or replaces a hosted zone in a node's directory.
    async fn publish(&self, node: &NodeName, zone: HostedZone) -> Result<(), ZoneError>;

    /// Removes a hosted zone from a node's directory.
    async fn retract(&self, node: &NodeName, zone_id: ZoneId) -> Result<bool, ZoneError>;

    /// All node records, ordered by node name.
    async fn snapshot(&self) -> Result<Vec<NodeRecord>, ZoneError>;

    /// Acquires or renews a lease on `key` for `node`.
    async fn try_acquire_lock(
        &self,
        key: &LockKey,
        node: &NodeName,
        lease: Duration,
    ) -> Result<LockOutcome, ZoneError>;

    /// Releases `key` if `node` holds it.
    async fn release_lock(&self, key: &LockKey, node: &NodeName) -> Result<bool, ZoneError>;
}

// ============================================================================
// In-memory cluster
// ============================================================================

#[derive(Debug)]
struct NodeEntry {
    info: NodeInfo,
    hosted: BTreeMap<ZoneId, HostedZone>,
}

#[derive(Debug)]
struct Lease {
    holder: NodeName,
    expires: Instant,
}

/// A [`ClusterStore`] shared by nodes running in one process.
#[derive(Debug, Default)]
pub struct InMemoryCluster {
    nodes: DashMap<NodeName, NodeEntry>,
    locks: DashMap<LockKey, Lease>,
}

impl InMemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current holder of a lock, ignoring expired leases.
    pub fn lock_holder(&self, key: &LockKey) -> Option<NodeName> {
        self.locks
            .get(key)
            .filter(|lease| lease.expires > Instant::now())
            .map(|lease| lease.holder.clone())
    }
}

#[async_trait]
impl ClusterStore for InMemoryCluster {
    async fn register_node(&self, info: NodeInfo) -> Result<(), ZoneError> {
        self.nodes
            .entry(info.name.clone())
            .and_modify(|entry| entry.info = info.clone())
            .or_insert_with(|| NodeEntry {
                info,
                hosted: BTreeMap::new(),
            });
        Ok(())
    }

    async fn remove_node(&self, node: &NodeName) -> Result<(), ZoneError> {
        self.nodes.remove(node);
        self.locks.retain(|_, lease| &lease.holder != node);
        Ok(())
    }

    async fn publish(&self, node: &NodeName, zone: HostedZone) -> Result<(), ZoneError> {
        let mut entry = self
            .nodes
            .get_mut(node)
            .ok_or_else(|| ZoneError::Internal(format!("node {node} is not registered")))?;
        entry.hosted.insert(zone.zone_id, zone);
        Ok(())
    }

    async fn retract(&self, node: &NodeName, zone_id: ZoneId) -> Result<bool, ZoneError> {
        Ok(self
            .nodes
            .get_mut(node)
            .map(|mut entry| entry.hosted.remove(&zone_id).is_some())
            .unwrap_or(false))
    }

    async fn snapshot(&self) -> Result<Vec<NodeRecord>, ZoneError> {
        let mut records: Vec<NodeRecord> = self
            .nodes
            .iter()
            .map(|entry| NodeRecord {
                info: entry.info.clone(),
                hosted: entry.hosted.values().cloned().collect(),
            })
            .collect();
        records.sort_by(|a, b| a.info.name.cmp(&b.info.name));
        Ok(records)
    }

    async fn try_acquire_lock(
        &self,
        key: &LockKey,
        node: &NodeName,
        lease: Duration,
    ) -> Result<LockOutcome, ZoneError> {
        let now = Instant::now();
        let mut current = self.locks.entry(key.clone()).or_insert_with(|| Lease {
            holder: node.clone(),
            expires: now,
        });

        if &current.holder == node || current.expires <= now {
            current.holder = node.clone();
            current.expires = now + lease;
            Ok(LockOutcome::Acquired)
        } else {
            Ok(LockOutcome::HeldBy(current.holder.clone()))
        }
    }

    async fn release_lock(&self, key: &LockKey, node: &NodeName) -> Result<bool, ZoneError> {
        Ok(self
            .locks
            .remove_if(key, |_, lease| &lease.holder == node)
            .is_some())
    }
}

// ============================================================================
// Peer manager
// ============================================================================

/// Outcome of claiming the right to host a zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZoneClaim {
    /// This node holds the zone host lock and may resolve the zone
    Acquired,
    /// Another node holds the lock and has published the zone
    HostedBy(NodeInfo),
}

/// This node's view of the cluster zone directory.
pub struct ZonePeerManager {
    local: NodeInfo,
    store: Arc<dyn ClusterStore>,
    config: MovementConfig,
}

impl ZonePeerManager {
    /// Registers this node with the cluster store.
    pub async fn join(
        local: NodeInfo,
        store: Arc<dyn ClusterStore>,
        config: MovementConfig,
    ) -> Result<Self, ZoneError> {
        store.register_node(local.clone()).await?;
        info!(
            "🌐 Node '{}' joined the cluster at {}:{}",
            local.name, local.public_host, local.port
        );
        Ok(Self {
            local,
            store,
            config,
        })
    }

    /// Removes this node and its directory from the cluster store.
    pub async fn leave(&self) -> Result<(), ZoneError> {
        self.store.remove_node(&self.local.name).await?;
        info!("👋 Node '{}' left the cluster", self.local.name);
        Ok(())
    }

    pub fn local_node(&self) -> &NodeInfo {
        &self.local
    }

    pub fn is_local(&self, node: &NodeName) -> bool {
        node == &self.local.name
    }

    /// Announces that this node now hosts a zone.
    pub async fn zone_did_startup(&self, zone_id: ZoneId, name: &str) -> Result<(), ZoneError> {
        self.store
            .publish(
                &self.local.name,
                HostedZone {
                    zone_id,
                    name: name.to_string(),
                },
            )
            .await?;
        info!("📣 Node '{}' now hosts zone {} '{}'", self.local.name, zone_id, name);
        Ok(())
    }

    /// Withdraws this node's announcement for a zone.
    pub async fn zone_did_shutdown(&self, zone_id: ZoneId) -> Result<(), ZoneError> {
        if self.store.retract(&self.local.name, zone_id).await? {
            info!("📴 Node '{}' no longer hosts zone {}", self.local.name, zone_id);
        } else {
            warn!(
                "⚠️ Zone {} shut down on node '{}' but was not published",
                zone_id, self.local.name
            );
        }
        Ok(())
    }

    /// Finds a node whose directory lists `zone_id`, this node included.
    ///
    /// `None` means the zone should be resolved locally, not that it does not exist.
    pub async fn get_zone_host(
        &self,
        zone_id: ZoneId,
    ) -> Result<Option<(NodeInfo, HostedZone)>, ZoneError> {
        let records = self.store.snapshot().await?;
        Ok(records.into_iter().find_map(|record| {
            let NodeRecord { info, hosted } = record;
            hosted
                .into_iter()
                .find(|zone| zone.zone_id == zone_id)
                .map(|zone| (info, zone))
        }))
    }

    /// Acquires (or renews) the zone host lock for this node.
    ///
    /// While another node holds the lock this polls until that node publishes
    /// the zone, the lease lapses, or `lock_wait` elapses.
    ///
    /// # Errors
    ///
    /// Returns [`ZoneError::LockTimeout`] if neither happens within `lock_wait`.
    pub async fn claim_zone(&self, zone_id: ZoneId) -> Result<ZoneClaim, ZoneError> {
        let key = LockKey::zone_host(zone_id);
        let deadline = Instant::now() + self.config.lock_wait;

        loop {
            let holder = match self
                .store
                .try_acquire_lock(&key, &self.local.name, self.config.lock_lease)
                .await?
            {
                LockOutcome::Acquired => return Ok(ZoneClaim::Acquired),
                LockOutcome::HeldBy(holder) => holder,
            };

            if let Some((node, _)) = self.get_zone_host(zone_id).await? {
                if node.name == holder {
                    return Ok(ZoneClaim::HostedBy(node));
                }
            }

            if Instant::now() >= deadline {
                warn!("⏰ Gave up waiting for {} held by '{}'", key, holder);
                return Err(ZoneError::LockTimeout(zone_id));
            }
            debug!("🔒 {} held by '{}', waiting", key, holder);
            tokio::time::sleep(self.config.lock_poll_interval).await;
        }
    }

    /// Releases this node's zone host lock.
    pub async fn release_zone(&self, zone_id: ZoneId) -> Result<bool, ZoneError> {
        let released = self
            .store
            .release_lock(&LockKey::zone_host(zone_id), &self.local.name)
            .await?;
        if released {
            debug!("🔓 Released zone host lock for {}", zone_id);
        }
        Ok(released)
    }

    /// Zones this node currently publishes.
    pub async fn local_zones(&self) -> Result<Vec<HostedZone>, ZoneError> {
        let records = self.store.snapshot().await?;
        Ok(records
            .into_iter()
            .find(|record| record.info.name == self.local.name)
            .map(|record| record.hosted)
            .unwrap_or_default())
    }
}

impl std::fmt::Debug for ZonePeerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZonePeerManager")
            .field("local", &self.local)
            .field("config", &self.config)
            .finish()
    }
}
