// Include tests
#[cfg(test)]
mod tests {
    use crate::connection::ConnectionManager;
    use crate::messaging::{route_client_message, ServerMessage};
    use crate::*;
    use futures_util::{SinkExt, StreamExt};
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::broadcast;
    use tokio_tungstenite::{connect_async, tungstenite::Message};
    use crate::zones::ZONE_FULL;
    use zone_system::{
        BodyId, InMemoryCluster, NodeInfo, NodeName, SceneId, ShutdownState, ZoneId, ZoneRegistry,
        ZoneType, ZonedBody,
    };

    fn zone(tag: u8, local: i32) -> ZoneId {
        ZoneId::qualify(ZoneType::new(tag).unwrap(), local)
    }

    fn config(node: &str, capacity: Option<usize>) -> ServerConfig {
        ServerConfig {
            node: NodeInfo {
                name: NodeName::new(node),
                public_host: format!("{node}.example"),
                port: 4000,
            },
            zones: vec![ZoneDefinition {
                zone_type: 1,
                local_id: 1,
                name: "Docks".into(),
                default_scene: 101,
                capacity,
                scenes: Vec::new(),
            }],
            ..ServerConfig::default()
        }
    }

    fn move_message(zone_id: ZoneId, scene_id: i32, scene_version: i32) -> String {
        serde_json::json!({
            "namespace": "zone",
            "event": "move_to",
            "data": {
                "zone_id": zone_id.0,
                "scene_id": scene_id,
                "scene_version": scene_version
            }
        })
        .to_string()
    }

    async fn next_reply(
        receiver: &mut broadcast::Receiver<(usize, Vec<u8>)>,
        connection_id: usize,
    ) -> ServerMessage {
        loop {
            let (target, bytes) = tokio::time::timeout(Duration::from_secs(2), receiver.recv())
                .await
                .expect("no reply within timeout")
                .expect("outgoing channel closed");
            if target == connection_id {
                return serde_json::from_slice(&bytes).unwrap();
            }
        }
    }

    struct Client {
        connections: Arc<ConnectionManager>,
        registry: Arc<ZoneRegistry>,
        outgoing: broadcast::Receiver<(usize, Vec<u8>)>,
    }

    fn client(server: &ZoneServer) -> Client {
        let connections = Arc::new(ConnectionManager::new());
        let outgoing = connections.subscribe();
        Client {
            connections,
            registry: server.registry().clone(),
            outgoing,
        }
    }

    fn addr() -> SocketAddr {
        "127.0.0.1:6000".parse().unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_move_request_is_answered() {
        let server = ZoneServer::new(config("alpha", None)).await.unwrap();
        let mut client = client(&server);
        let (id, body) = client.connections.add_connection(addr()).await;

        route_client_message(&move_message(zone(1, 1), 101, 0), id, &client.connections, &client.registry)
            .await
            .unwrap();

        let reply = next_reply(&mut client.outgoing, id).await;
        assert_eq!(reply.namespace, "zone");
        assert_eq!(reply.event, "move_result");
        assert_eq!(reply.data["type"], "moved");
        assert_eq!(reply.data["zone"]["name"], "Docks");
        assert_eq!(body.zone_id(), Some(zone(1, 1)));
        assert!(server.locations().place_of(body.body_id()).is_some());

        route_client_message(
            r#"{"namespace":"zone","event":"leave_zone","data":null}"#,
            id,
            &client.connections,
            &client.registry,
        )
        .await
        .unwrap();
        let reply = next_reply(&mut client.outgoing, id).await;
        assert_eq!(reply.event, "left_zone");
        assert_eq!(body.zone_id(), None);
        assert!(server.locations().place_of(body.body_id()).is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unknown_zone_type_fails_with_reason() {
        let server = ZoneServer::new(config("alpha", None)).await.unwrap();
        let mut client = client(&server);
        let (id, body) = client.connections.add_connection(addr()).await;

        route_client_message(&move_message(zone(9, 1), 101, 0), id, &client.connections, &client.registry)
            .await
            .unwrap();

        let reply = next_reply(&mut client.outgoing, id).await;
        assert_eq!(reply.data["type"], "failed");
        assert_eq!(reply.data["reason"], zone_system::NO_SUCH_ZONE);
        assert_eq!(body.zone_id(), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_full_zone_vetoes_entry() {
        let server = ZoneServer::new(config("alpha", Some(1))).await.unwrap();
        let mut client = client(&server);
        let (first, _) = client.connections.add_connection(addr()).await;
        let (second, body) = client.connections.add_connection(addr()).await;

        route_client_message(&move_message(zone(1, 1), 101, 0), first, &client.connections, &client.registry)
            .await
            .unwrap();
        assert_eq!(next_reply(&mut client.outgoing, first).await.data["type"], "moved");

        route_client_message(&move_message(zone(1, 1), 101, 0), second, &client.connections, &client.registry)
            .await
            .unwrap();
        let reply = next_reply(&mut client.outgoing, second).await;
        assert_eq!(reply.data["type"], "failed");
        assert_eq!(reply.data["reason"], zones::ZONE_FULL);
        assert_eq!(body.zone_id(), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_racing_entries_respect_capacity() {
        let server = ZoneServer::new(config("alpha", Some(1))).await.unwrap();
        let registry = server.registry().clone();
        let first = ZonedBody::new(BodyId::new(), "first");
        let second = ZonedBody::new(BodyId::new(), "second");

        let (a, b) = tokio::join!(
            registry.move_to(&first, zone(1, 1), SceneId(101), 0),
            registry.move_to(&second, zone(1, 1), SceneId(101), 0)
        );
        assert_eq!(
            [a.is_success(), b.is_success()].iter().filter(|ok| **ok).count(),
            1
        );
        let (winner, loser, refused) = if a.is_success() {
            (&first, &second, b)
        } else {
            (&second, &first, a)
        };
        assert_eq!(refused.failure_reason(), Some(ZONE_FULL));
        assert_eq!(loser.zone_id(), None);

        registry.leave_occupied_zone(winner).await;
        let retry = registry.move_to(loser, zone(1, 1), SceneId(101), 0).await;
        assert!(retry.is_success(), "unexpected result: {retry:?}");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_repeated_moves_of_one_body_keep_occupancy_exact() {
        let server = ZoneServer::new(config("alpha", Some(1))).await.unwrap();
        let registry = server.registry().clone();
        let body = ZonedBody::new(BodyId::new(), "twice");

        let (a, b) = tokio::join!(
            registry.move_to(&body, zone(1, 1), SceneId(101), 0),
            registry.move_to(&body, zone(1, 1), SceneId(101), 0)
        );
        assert!(a.is_success());
        assert!(b.is_success());

        registry.leave_occupied_zone(&body).await;
        let next = ZonedBody::new(BodyId::new(), "next");
        let result = registry.move_to(&next, zone(1, 1), SceneId(101), 0).await;
        assert!(result.is_success(), "unexpected result: {result:?}");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_zone_hosted_elsewhere_switches_server() {
        let cluster = Arc::new(InMemoryCluster::new());
        let alpha = create_server_with_cluster(config("alpha", None), cluster.clone())
            .await
            .unwrap();
        let beta = create_server_with_cluster(config("beta", None), cluster)
            .await
            .unwrap();

        let mut on_alpha = client(&alpha);
        let (id, _) = on_alpha.connections.add_connection(addr()).await;
        route_client_message(&move_message(zone(1, 1), 101, 0), id, &on_alpha.connections, &on_alpha.registry)
            .await
            .unwrap();
        assert_eq!(next_reply(&mut on_alpha.outgoing, id).await.data["type"], "moved");

        let mut on_beta = client(&beta);
        let (id, body) = on_beta.connections.add_connection(addr()).await;
        route_client_message(&move_message(zone(1, 1), 101, 0), id, &on_beta.connections, &on_beta.registry)
            .await
            .unwrap();

        let reply = next_reply(&mut on_beta.outgoing, id).await;
        assert_eq!(reply.data["type"], "server_switch");
        assert_eq!(reply.data["node"], "alpha");
        assert_eq!(reply.data["host"], "alpha.example");
        assert_eq!(body.zone_id(), None);
        assert_eq!(beta.stats().server_switches, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_bad_messages_are_rejected() {
        let server = ZoneServer::new(config("alpha", None)).await.unwrap();
        let mut client = client(&server);
        let (id, _) = client.connections.add_connection(addr()).await;

        let err = route_client_message("not json", id, &client.connections, &client.registry)
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::Network(_)));

        let unknown = r#"{"namespace":"chat","event":"say","data":{}}"#;
        let err = route_client_message(unknown, id, &client.connections, &client.registry)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("chat:say"));

        let bad_move = r#"{"namespace":"zone","event":"move_to","data":{"zone_id":"x"}}"#;
        assert!(route_client_message(bad_move, id, &client.connections, &client.registry)
            .await
            .is_err());

        let err = route_client_message(&move_message(zone(1, 1), 101, 0), 999, &client.connections, &client.registry)
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::Internal(_)));

        route_client_message(
            r#"{"namespace":"system","event":"ping"}"#,
            id,
            &client.connections,
            &client.registry,
        )
        .await
        .unwrap();
        assert_eq!(next_reply(&mut client.outgoing, id).await.event, "pong");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_websocket_round_trip() {
        let server = Arc::new(ZoneServer::new(config("alpha", None)).await.unwrap());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let local_addr = listener.local_addr().unwrap();
        let shutdown_state = ShutdownState::new();

        let serving = {
            let server = server.clone();
            let shutdown_state = shutdown_state.clone();
            tokio::spawn(async move { server.serve(listener, shutdown_state).await })
        };

        let (mut socket, _) = connect_async(format!("ws://{local_addr}")).await.unwrap();
        socket
            .send(Message::Text(move_message(zone(1, 1), 101, 0).into()))
            .await
            .unwrap();

        let reply = loop {
            let frame = tokio::time::timeout(Duration::from_secs(2), socket.next())
                .await
                .expect("no reply within timeout")
                .expect("socket closed")
                .unwrap();
            if let Message::Text(text) = frame {
                break serde_json::from_str::<ServerMessage>(text.as_str()).unwrap();
            }
        };
        assert_eq!(reply.event, "move_result");
        assert_eq!(reply.data["type"], "moved");
        assert_eq!(server.connection_count().await, 1);

        socket.close(None).await.unwrap();
        shutdown_state.initiate_shutdown();
        serving.await.unwrap().unwrap();
    }
}
