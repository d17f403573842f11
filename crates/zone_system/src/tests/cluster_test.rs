//! Zone hosting across two nodes sharing one cluster store.

use super::harness::*;
use crate::*;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_zone_hosted_elsewhere_requires_server_switch() {
    let cluster = Arc::new(InMemoryCluster::new());
    let alpha = node_fixture(cluster.clone(), "alpha", 4001).await;
    let beta = node_fixture(cluster.clone(), "beta", 4002).await;
    let alpha_manager = TestZoneManager::new();
    let beta_manager = TestZoneManager::new();
    alpha.registry.register_zone_manager(zone_type(1), alpha_manager.clone()).unwrap();
    beta.registry.register_zone_manager(zone_type(1), beta_manager.clone()).unwrap();

    let target = zone(1, 1);
    let first = ZonedBody::new(BodyId::new(), "alice");
    assert!(alpha.registry.move_to(&first, target, SCENE, 3).await.is_success());

    let second = ZonedBody::new(BodyId::new(), "bob");
    match beta.registry.move_to(&second, target, SCENE, 3).await {
        MoveResult::RequiresServerSwitch { node, host, port } => {
            assert_eq!(node, NodeName::new("alpha"));
            assert_eq!(host, "alpha.example");
            assert_eq!(port, 4001);
        }
        other => panic!("unexpected result: {other:?}"),
    }

    assert_eq!(beta_manager.resolve_calls(), 0);
    assert_eq!(second.zone_id(), None);
    assert_eq!(beta.locations.commit_count(), 0);
    assert_eq!(beta.registry.stats().server_switches, 1);
}

#[tokio::test]
async fn test_shutdown_hands_zone_to_another_node() {
    let cluster = Arc::new(InMemoryCluster::new());
    let alpha = node_fixture(cluster.clone(), "alpha", 4001).await;
    let beta = node_fixture(cluster.clone(), "beta", 4002).await;
    alpha.registry.register_zone_manager(zone_type(1), TestZoneManager::new()).unwrap();
    beta.registry.register_zone_manager(zone_type(1), TestZoneManager::new()).unwrap();

    let target = zone(1, 2);
    let body = ZonedBody::new(BodyId::new(), "cleo");
    assert!(alpha.registry.move_to(&body, target, SCENE, 3).await.is_success());
    assert_eq!(
        cluster.lock_holder(&LockKey::zone_host(target)),
        Some(NodeName::new("alpha"))
    );

    assert!(alpha.registry.shutdown_zone(target).await.unwrap());
    assert_eq!(cluster.lock_holder(&LockKey::zone_host(target)), None);

    let traveller = ZonedBody::new(BodyId::new(), "drew");
    assert!(beta.registry.move_to(&traveller, target, SCENE, 3).await.is_success());

    let peers = beta.registry.peers().unwrap();
    let (host, hosted) = peers.get_zone_host(target).await.unwrap().unwrap();
    assert_eq!(host.name, NodeName::new("beta"));
    assert_eq!(hosted.name, "Zone 2");
}

#[tokio::test]
async fn test_racing_nodes_resolve_zone_once() {
    let cluster = Arc::new(InMemoryCluster::new());
    let alpha = node_fixture(cluster.clone(), "alpha", 4001).await;
    let beta = node_fixture(cluster.clone(), "beta", 4002).await;
    let alpha_manager = TestZoneManager::with_delay(Duration::from_millis(40));
    let beta_manager = TestZoneManager::with_delay(Duration::from_millis(40));
    alpha.registry.register_zone_manager(zone_type(1), alpha_manager.clone()).unwrap();
    beta.registry.register_zone_manager(zone_type(1), beta_manager.clone()).unwrap();

    let target = zone(1, 3);
    let a = ZonedBody::new(BodyId::new(), "eli");
    let b = ZonedBody::new(BodyId::new(), "fay");
    let (ra, rb) = tokio::join!(
        alpha.registry.move_to(&a, target, SCENE, 3),
        beta.registry.move_to(&b, target, SCENE, 3)
    );

    assert_eq!(alpha_manager.resolve_calls() + beta_manager.resolve_calls(), 1);
    let successes = [&ra, &rb].iter().filter(|r| r.is_success()).count();
    let switches = [&ra, &rb]
        .iter()
        .filter(|r| matches!(r, MoveResult::RequiresServerSwitch { .. }))
        .count();
    assert_eq!(successes, 1, "results: {ra:?} / {rb:?}");
    assert_eq!(switches, 1, "results: {ra:?} / {rb:?}");
}

#[tokio::test]
async fn test_failed_resolution_releases_lock() {
    let cluster = Arc::new(InMemoryCluster::new());
    let alpha = node_fixture(cluster.clone(), "alpha", 4001).await;
    let manager = TestZoneManager::new();
    manager
        .fail_resolution
        .store(true, std::sync::atomic::Ordering::SeqCst);
    alpha.registry.register_zone_manager(zone_type(1), manager).unwrap();

    let target = zone(1, 4);
    let body = ZonedBody::new(BodyId::new(), "gail");
    let result = alpha.registry.move_to(&body, target, SCENE, 3).await;

    assert_eq!(result.failure_reason(), Some(INTERNAL_ERROR));
    assert_eq!(cluster.lock_holder(&LockKey::zone_host(target)), None);
    assert!(alpha
        .registry
        .peers()
        .unwrap()
        .get_zone_host(target)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_registry_shutdown_leaves_cluster() {
    let cluster = Arc::new(InMemoryCluster::new());
    let alpha = node_fixture(cluster.clone(), "alpha", 4001).await;
    let beta = node_fixture(cluster.clone(), "beta", 4002).await;
    alpha.registry.register_zone_manager(zone_type(1), TestZoneManager::new()).unwrap();

    let target = zone(1, 5);
    let body = ZonedBody::new(BodyId::new(), "hugo");
    assert!(alpha.registry.move_to(&body, target, SCENE, 3).await.is_success());

    alpha.registry.shutdown().await.unwrap();

    let records = cluster.snapshot().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].info.name, NodeName::new("beta"));
    assert!(beta
        .registry
        .peers()
        .unwrap()
        .get_zone_host(target)
        .await
        .unwrap()
        .is_none());
}
