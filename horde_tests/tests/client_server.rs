//! Full socket-based integration tests for client ↔ feed server.

use std::time::Duration;

use horde_client::{listener::ConnectionState, FeedClient};
use horde_shared::{
    config::HordeConfig,
    entity::{EntityAttrs, EntityCategory, RemoteEntitySnapshot},
    math::Vec3,
    net::{decode_from_bytes, encode_to_bytes, ClientId, FeedMsg, ReliableListener},
    scene::{RecordingScene, SceneCall},
};
use horde_tests::{connected_pair, init_tracing, step_until};

const WAIT: Duration = Duration::from_secs(2);

/// Unit-style test: a row with an unrecognised table survives the wire as
/// `Unknown` instead of failing to decode.
#[test]
fn unknown_table_decodes() -> anyhow::Result<()> {
    let raw = br#"{"Insert":{"id":7,"category":"boss_zombie","position":{"x":0.0,"y":0.0,"z":0.0}}}"#;
    match decode_from_bytes(raw)? {
        FeedMsg::Insert(row) => assert_eq!(row.category, EntityCategory::Unknown),
        other => panic!("unexpected {other:?}"),
    }

    let applied = FeedMsg::SubscriptionApplied;
    assert_eq!(decode_from_bytes(&encode_to_bytes(&applied)?)?, applied);
    Ok(())
}

/// A row from a table the client cannot name reaches the registry, which
/// skips and counts it instead of dropping it silently.
#[tokio::test]
async fn unknown_table_rows_are_counted_as_unsupported() -> anyhow::Result<()> {
    init_tracing();

    let tcp = ReliableListener::bind("127.0.0.1:0".parse()?).await?;
    let cfg = HordeConfig {
        server_addr: tcp.local_addr()?.to_string(),
        ..Default::default()
    };

    // Hand-driven feed: handshake, then one row from an unknown table.
    let feed = async {
        let mut conn = tcp.accept().await?;
        conn.recv().await?; // Hello
        conn.send(&FeedMsg::Welcome {
            client_id: ClientId::new_unique(),
        })
        .await?;
        conn.recv().await?; // PlayerReady
        conn.recv().await?; // Subscribe
        conn.send(&FeedMsg::Insert(RemoteEntitySnapshot::new(
            7,
            EntityCategory::Unknown,
            Vec3::ZERO,
        )))
        .await?;
        conn.send(&FeedMsg::SubscriptionApplied).await?;
        anyhow::Ok(conn)
    };
    let (conn, client) = tokio::join!(feed, FeedClient::connect(&cfg, RecordingScene::new()));
    let _conn = conn?;
    let mut client = client?;

    assert!(client.wait_until(WAIT, |c| c.subscription_applied()).await);
    assert!(client.registry().is_empty());
    assert_eq!(client.registry().stats().unsupported, 1);
    assert!(client.registry().scene().calls().is_empty());
    Ok(())
}

/// Initial rows, live updates, deletes and disconnect over a real socket.
#[tokio::test]
async fn feed_drives_registry() -> anyhow::Result<()> {
    init_tracing();

    let (mut server, mut client, _cfg) = connected_pair(20).await?;
    let zombie = server.world_mut().insert(
        EntityCategory::Zombie,
        Vec3::new(10.0, 0.0, 0.0),
        EntityAttrs::default(),
    );
    let aoe = server.world_mut().insert(
        EntityCategory::SpitterAoe,
        Vec3::new(-3.0, 0.0, 4.0),
        EntityAttrs::default(),
    );

    // The server picks up PlayerReady + Subscribe, then the zombie starts
    // chasing the new player.
    let synced = step_until(&mut server, &mut client, 0.05, WAIT, |_, c| {
        c.subscription_applied() && c.registry().stats().updated >= 1
    })
    .await?;
    assert!(synced);
    assert_eq!(client.listener().state(), ConnectionState::Connected);

    // Let the last published update arrive.
    let server_pos = server.world().get(zombie).expect("zombie row").position;
    assert!(
        client
            .wait_until(WAIT, |c| {
                c.registry()
                    .lookup(zombie)
                    .and_then(|v| v.motion())
                    .is_some_and(|m| m.interpolation().target_position == server_pos)
            })
            .await
    );

    // Zombie + marker; the player row lives in a table we never subscribed to.
    assert_eq!(client.registry().len(), 2);
    assert_eq!(client.registry().stats().unsupported, 0);
    assert_eq!(server.world().count(EntityCategory::Player), 1);

    let view = client.registry().lookup(zombie).expect("zombie view");
    assert_eq!(view.node_name(), format!("Zombie_{zombie}"));
    assert!(view.is_moving());

    // One full interpolation window lands on the server's position.
    client.frame(0.1, Vec3::ZERO).await?;
    let view = client.registry().lookup(zombie).expect("zombie view");
    assert_eq!(view.current_position(), server_pos);
    assert!(server_pos.x < 10.0);

    // Delete travels to the scene.
    server.world_mut().delete(aoe);
    let gone = step_until(&mut server, &mut client, 0.05, WAIT, |_, c| {
        c.registry().lookup(aoe).is_none()
    })
    .await?;
    assert!(gone);
    assert!(client
        .registry()
        .scene()
        .calls()
        .iter()
        .any(|call| matches!(call, SceneCall::Detach(id) if *id == aoe)));

    // Leaving removes our player, which empties the world.
    client.disconnect("test done").await?;
    assert!(!client.is_active());
    assert!(client.registry().is_empty());
    let cleared = step_until(&mut server, &mut client, 0.05, WAIT, |s, _| {
        s.client_count() == 0 && s.world().is_empty()
    })
    .await?;
    assert!(cleared);
    Ok(())
}

/// Position reports move the player row and the zombies follow it.
#[tokio::test]
async fn position_reports_reach_server() -> anyhow::Result<()> {
    init_tracing();

    let (mut server, mut client, _cfg) = connected_pair(20).await?;
    let synced = step_until(&mut server, &mut client, 0.05, WAIT, |_, c| {
        c.subscription_applied()
    })
    .await?;
    assert!(synced);

    // The second frame crosses the report interval.
    client.frame(0.05, Vec3::new(3.0, 0.0, 0.0)).await?;
    client.frame(0.05, Vec3::new(3.0, 0.0, 0.0)).await?;

    let moved = step_until(&mut server, &mut client, 0.05, WAIT, |s, _| {
        s.world()
            .rows()
            .any(|r| r.category == EntityCategory::Player && r.position == Vec3::new(3.0, 0.0, 0.0))
    })
    .await?;
    assert!(moved);
    Ok(())
}

/// A server that goes away marks the client disconnected and drops views.
#[tokio::test]
async fn server_shutdown_disconnects_client() -> anyhow::Result<()> {
    init_tracing();

    let (mut server, mut client, _cfg) = connected_pair(20).await?;
    server.world_mut().insert(
        EntityCategory::SpitterZombie,
        Vec3::new(0.0, 0.0, 30.0),
        EntityAttrs::default(),
    );
    let synced = step_until(&mut server, &mut client, 0.05, WAIT, |_, c| {
        c.registry().len() == 1
    })
    .await?;
    assert!(synced);

    drop(server);
    assert!(client.wait_until(WAIT, |c| !c.is_active()).await);
    assert!(client.registry().is_empty());
    assert_eq!(client.registry().scene().node_count(), 0);
    Ok(())
}
