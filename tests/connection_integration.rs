//! Connection lifecycle through the public API

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use trackcast::connection::{
    ChannelId, ChannelTarget, ConnectionEvent, EncryptionMode, GatewayEvent, GroupId,
};
use trackcast::testing::{MockConnector, MockEngineFactory, opus_streams, test_session};
use trackcast::transport::open_datagram;
use trackcast::{
    CastError, ConnectError, ConnectionConfig, ConnectionRegistry, ConnectionState,
    DisconnectReason, Platform, PlayerConfig, Track, TrackPlayer,
};

fn target(group: u64) -> ChannelTarget {
    ChannelTarget::new(GroupId(group), ChannelId(group * 10))
}

#[tokio::test(start_paused = true)]
async fn test_connect_times_out_after_configured_delay() {
    let config = ConnectionConfig::builder()
        .ready_timeout(Duration::from_secs(3))
        .build();
    let registry = ConnectionRegistry::new(MockConnector::new(), config);

    let started = Instant::now();
    let result = registry.connect(target(1)).await;

    assert!(matches!(
        result,
        Err(CastError::Connection(ConnectError::Timeout))
    ));
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(3));
    assert!(elapsed < Duration::from_millis(3100));
}

#[tokio::test(start_paused = true)]
async fn test_full_channel_is_rejected() {
    let connector = MockConnector::new();
    let registry = ConnectionRegistry::new(connector.clone(), ConnectionConfig::default());

    let result = registry.connect(target(1).with_access(true, true)).await;

    assert!(matches!(result, Err(CastError::ChannelFull)));
    assert_eq!(connector.opened(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_transport_rekeys_after_recoverable_close() {
    let first_key = [1u8; 32];
    let second_key = [2u8; 32];

    let connector = MockConnector::auto_ready(test_session(first_key, EncryptionMode::Lite, 11));
    let registry = ConnectionRegistry::new(connector.clone(), ConnectionConfig::default());
    let connection = registry.connect(target(1)).await.unwrap();
    let gateway = connector.gateway(GroupId(1)).unwrap();
    let mut events = connection.events();

    let engines = MockEngineFactory::new();
    let player = TrackPlayer::new(engines.clone(), PlayerConfig::default());
    player.subscribe(&connection).await.unwrap();
    player
        .play(Arc::new(
            Track::new(Platform::Youtube, "a").with_streams(opus_streams("https://cdn/a")),
        ))
        .unwrap();
    let engine = engines.wait_for_engine(1).await.unwrap();

    engine.packet(b"before");
    tokio::time::sleep(Duration::from_millis(1)).await;

    // The gateway rejoins on its own and reports a fresh session
    gateway.set_auto_ready(Some(test_session(second_key, EncryptionMode::Lite, 12)));
    gateway.emit(GatewayEvent::Disconnected(DisconnectReason::WebSocketClose {
        code: 4015,
    }));
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert!(connection.ready());

    engine.packet(b"after");
    tokio::time::sleep(Duration::from_millis(1)).await;

    let sent = gateway.sent();
    assert_eq!(sent.len(), 2);
    let (_, before) = open_datagram(&first_key, EncryptionMode::Lite, &sent[0]).unwrap();
    let (header, after) = open_datagram(&second_key, EncryptionMode::Lite, &sent[1]).unwrap();
    assert_eq!(before, b"before");
    assert_eq!(after, b"after");
    assert_eq!(header.ssrc, 12);
    assert!(open_datagram(&first_key, EncryptionMode::Lite, &sent[1]).is_err());

    assert_eq!(connection.stats().await.reconnects, 1);
    let mut errors = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, ConnectionEvent::Error { .. }) {
            errors += 1;
        }
    }
    assert_eq!(errors, 0);
}

#[tokio::test(start_paused = true)]
async fn test_fatal_close_destroys_connection() {
    let connector = MockConnector::auto_ready(test_session([3; 32], EncryptionMode::Normal, 1));
    let registry = ConnectionRegistry::new(connector.clone(), ConnectionConfig::default());
    let connection = registry.connect(target(1)).await.unwrap();
    let mut events = connection.events();

    connector
        .gateway(GroupId(1))
        .unwrap()
        .emit(GatewayEvent::Disconnected(DisconnectReason::WebSocketClose {
            code: 4014,
        }));
    let mut state = connection.state_changes();
    state
        .wait_for(ConnectionState::is_destroyed)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(1)).await;

    let mut error = None;
    while let Ok(event) = events.try_recv() {
        if let ConnectionEvent::Error { error: e } = event {
            error = Some(e);
        }
    }
    assert_eq!(
        error,
        Some(ConnectError::Disconnected(DisconnectReason::WebSocketClose {
            code: 4014
        }))
    );
    assert!(registry.get(GroupId(1)).await.is_none());

    // A later connect starts over with a new gateway
    let again = registry.connect(target(1)).await.unwrap();
    assert!(!Arc::ptr_eq(&connection, &again));
    assert_eq!(connector.opened(), 2);
}
