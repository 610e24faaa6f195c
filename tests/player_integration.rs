//! End-to-end playback: registry, player, mock engine and mock gateway

use std::sync::Arc;
use std::time::Duration;

use trackcast::connection::{ChannelId, ChannelTarget, EncryptionMode, GroupId};
use trackcast::testing::{MockConnector, MockEngineFactory, opus_streams, test_session};
use trackcast::transport::{SILENCE_FRAME, open_datagram};
use trackcast::{
    ConnectionConfig, ConnectionRegistry, Platform, PlayerConfig, PlayerEvent, PlayerState,
    Track, TrackPlayer,
};

const KEY: [u8; 32] = [0x5A; 32];

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn track(id: &str) -> Arc<Track> {
    Arc::new(Track::new(Platform::Youtube, id).with_streams(opus_streams("https://cdn/audio")))
}

#[tokio::test(start_paused = true)]
async fn test_playback_reaches_voice_channel() {
    init_tracing();

    let connector = MockConnector::auto_ready(test_session(KEY, EncryptionMode::Lite, 4242));
    let registry = ConnectionRegistry::new(connector.clone(), ConnectionConfig::default());
    let connection = registry
        .connect(ChannelTarget::new(GroupId(1), ChannelId(2)))
        .await
        .unwrap();
    let gateway = connector.gateway(GroupId(1)).unwrap();
    gateway.clear();

    let engines = MockEngineFactory::new();
    let player = TrackPlayer::new(engines.clone(), PlayerConfig::default());
    let mut events = player.events();
    player.subscribe(&connection).await.unwrap();
    player.play(track("song")).unwrap();

    let engine = engines.wait_for_engine(1).await.unwrap();
    for i in 0u8..10 {
        engine.packet(&[i; 40]);
    }
    tokio::time::sleep(Duration::from_millis(1)).await;

    let sent = gateway.sent();
    assert_eq!(sent.len(), 10);

    let mut previous = None;
    for (i, datagram) in sent.iter().enumerate() {
        let (header, frame) = open_datagram(&KEY, EncryptionMode::Lite, datagram).unwrap();
        assert_eq!(header.ssrc, 4242);
        assert_eq!(frame, vec![u8::try_from(i).unwrap(); 40]);

        let nonce = u32::from_be_bytes(datagram[datagram.len() - 4..].try_into().unwrap());
        if let Some((sequence, timestamp, last_nonce)) = previous {
            assert_eq!(header.sequence, u16::wrapping_add(sequence, 1));
            assert_eq!(header.timestamp, u32::wrapping_add(timestamp, 960));
            assert_eq!(nonce, u32::wrapping_add(last_nonce, 1));
        }
        previous = Some((header.sequence, header.timestamp, nonce));
    }

    // End of media: exactly one keepalive burst, then silence
    gateway.clear();
    engine.finish();
    tokio::time::sleep(Duration::from_secs(1)).await;

    let keepalive = gateway.sent();
    assert_eq!(keepalive.len(), 5);
    for datagram in &keepalive {
        let (_, frame) = open_datagram(&KEY, EncryptionMode::Lite, datagram).unwrap();
        assert_eq!(frame, SILENCE_FRAME);
    }
    assert_eq!(gateway.speaking_updates(), vec![false]);
    assert_eq!(player.state(), PlayerState::Idle);

    let mut packets = 0;
    let mut finished = false;
    while let Ok(event) = events.try_recv() {
        match event {
            PlayerEvent::Packet { .. } => packets += 1,
            PlayerEvent::Finish => finished = true,
            _ => {}
        }
    }
    assert_eq!(packets, 10);
    assert!(finished);

    let stats = connection.stats().await;
    assert_eq!(stats.packets_sent, 15);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_destroys_player() {
    init_tracing();

    let connector = MockConnector::auto_ready(test_session(KEY, EncryptionMode::Suffix, 1));
    let registry = ConnectionRegistry::new(connector, ConnectionConfig::default());
    let connection = registry
        .connect(ChannelTarget::new(GroupId(7), ChannelId(8)))
        .await
        .unwrap();

    let engines = MockEngineFactory::new();
    let player = TrackPlayer::new(engines.clone(), PlayerConfig::default());
    let mut state = player.state_changes();
    player.subscribe(&connection).await.unwrap();
    player.play(track("song")).unwrap();
    let engine = engines.wait_for_engine(1).await.unwrap();

    assert!(registry.disconnect(GroupId(7)).await);
    state
        .wait_for(|s| *s == PlayerState::Destroyed)
        .await
        .unwrap();

    assert!(engine.is_destroyed());
    assert!(registry.is_empty().await);
}

#[tokio::test(start_paused = true)]
async fn test_one_player_many_connections() {
    init_tracing();

    let connector = MockConnector::auto_ready(test_session(KEY, EncryptionMode::Normal, 9));
    let registry = ConnectionRegistry::new(connector.clone(), ConnectionConfig::default());
    let engines = MockEngineFactory::new();
    let player = TrackPlayer::new(engines.clone(), PlayerConfig::default());

    for group in 1..=3 {
        let connection = registry
            .connect(ChannelTarget::new(GroupId(group), ChannelId(100 + group)))
            .await
            .unwrap();
        player.subscribe(&connection).await.unwrap();
    }
    assert_eq!(player.subscription_count().await.unwrap(), 3);

    player.play(track("song")).unwrap();
    engines.wait_for_engine(1).await.unwrap().packet(b"shared frame");
    tokio::time::sleep(Duration::from_millis(1)).await;

    for group in 1..=3 {
        let sent = connector.gateway(GroupId(group)).unwrap().sent();
        assert_eq!(sent.len(), 1, "group {group}");
        let (_, frame) = open_datagram(&KEY, EncryptionMode::Normal, &sent[0]).unwrap();
        assert_eq!(frame, b"shared frame");
    }

    registry.disconnect_all().await;
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert!(player.is_destroyed());
}
