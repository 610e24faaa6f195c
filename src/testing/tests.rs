use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::connection::{
    ChannelId, ChannelTarget, EncryptionMode, GatewayConnector, GatewayEvent, GroupId,
    VoiceGateway,
};
use crate::error::CastError;
use crate::playback::{EngineEvent, EngineFactory, get_best_stream};
use crate::source::TrackResolver;
use crate::types::{ConnectionConfig, Platform, Track};

#[tokio::test]
async fn test_mock_gateway_records_calls() {
    let (gateway, _link) = MockGateway::new();
    let target = ChannelTarget::new(GroupId(1), ChannelId(2));
    let outbound = gateway.clone() as Arc<dyn VoiceGateway>;

    outbound
        .join(&target, &ConnectionConfig::default())
        .await
        .unwrap();
    outbound.set_speaking(true).await.unwrap();
    outbound.send(b"datagram").await.unwrap();
    outbound.leave().await.unwrap();

    assert_eq!(gateway.joins(), vec![target]);
    assert_eq!(gateway.speaking_updates(), vec![true]);
    assert_eq!(gateway.sent(), vec![b"datagram".to_vec()]);
    assert_eq!(gateway.leave_count(), 1);

    gateway.clear();
    assert!(gateway.calls().is_empty());
}

#[tokio::test]
async fn test_mock_gateway_auto_ready() {
    let (gateway, mut link) = MockGateway::new();
    gateway.set_auto_ready(Some(test_session([1; 32], EncryptionMode::Lite, 5)));

    link.gateway
        .join(
            &ChannelTarget::new(GroupId(1), ChannelId(2)),
            &ConnectionConfig::default(),
        )
        .await
        .unwrap();

    assert!(matches!(link.events.recv().await, Some(GatewayEvent::Connecting)));
    assert!(matches!(
        link.events.recv().await,
        Some(GatewayEvent::Ready(description)) if description.ssrc == 5
    ));
}

#[tokio::test]
async fn test_mock_gateway_fail_join() {
    let (gateway, link) = MockGateway::new();
    gateway.set_fail_join(true);

    let result = link
        .gateway
        .join(
            &ChannelTarget::new(GroupId(1), ChannelId(2)),
            &ConnectionConfig::default(),
        )
        .await;

    assert!(matches!(result, Err(CastError::Network { .. })));
}

#[test]
fn test_mock_connector_tracks_gateways() {
    let connector = MockConnector::new();
    assert_eq!(connector.opened(), 0);

    let _link = connector.open(GroupId(4));

    assert_eq!(connector.opened(), 1);
    assert!(connector.gateway(GroupId(4)).is_some());
    assert!(connector.gateway(GroupId(5)).is_none());
}

#[tokio::test]
async fn test_mock_engine_factory() {
    let factory = MockEngineFactory::new();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    let mut engine = factory.create(crate::playback::EngineEvents::new(3, tx));
    engine.set_url("https://cdn/a", false).unwrap();
    engine.destroy();

    let handle = factory.latest().unwrap();
    assert_eq!(factory.created(), 1);
    assert_eq!(handle.generation(), 3);
    assert_eq!(handle.url(), Some(("https://cdn/a".to_string(), false)));
    assert_eq!(handle.destroy_count(), 1);

    assert!(handle.finish());
    let message = rx.recv().await.unwrap();
    assert_eq!(message.generation, 3);
    assert!(matches!(message.event, EngineEvent::Finish));
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_engine() {
    let factory = MockEngineFactory::new();
    let waiter = {
        let factory = factory.clone();
        tokio::spawn(async move { factory.wait_for_engine(1).await.map(|e| e.generation()) })
    };
    tokio::time::sleep(Duration::from_millis(1)).await;

    let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
    let _engine = factory.create(crate::playback::EngineEvents::new(9, tx));

    assert_eq!(waiter.await.unwrap(), Some(9));
}

#[tokio::test(start_paused = true)]
async fn test_gated_resolver() {
    let resolver = GatedResolver::closed(opus_streams("https://cdn/a"));
    let track = Arc::new(Track::new(Platform::Youtube, "a"));

    let pending = {
        let resolver = resolver.clone();
        let track = track.clone();
        tokio::spawn(async move { resolver.get_streams(&track).await })
    };
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(resolver.calls(), 1);
    assert!(!pending.is_finished());

    resolver.push_error(CastError::unplayable("removed"));
    resolver.release(2);
    assert!(matches!(
        pending.await.unwrap(),
        Err(CastError::Unplayable { .. })
    ));
    assert_eq!(resolver.get_streams(&track).await.unwrap().len(), 1);
}

#[test]
fn test_opus_streams_select_their_stream() {
    let chosen = get_best_stream(&opus_streams("https://cdn/a")).unwrap();
    assert!(chosen.is_opus());
    assert!(chosen.default_audio);
}
