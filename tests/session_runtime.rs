use std::time::Duration;

use room_chat::common::{ChatError, DeliveryStatus, ParticipantId, Presence, RoomId, SessionEvent};
use room_chat::config::{ChatConfig, DeliveryMode};
use room_chat::session::{SessionHandle, spawn_session};
use tokio::sync::mpsc;

fn quiet_config() -> ChatConfig {
    let mut config = ChatConfig::default();
    config.history.clear();
    config.synth.seed = Some(42);
    config
}

async fn connected(config: &ChatConfig) -> (SessionHandle, mpsc::Receiver<SessionEvent>) {
    let (handle, mut events) = spawn_session(config).unwrap();
    assert_eq!(events.recv().await, Some(SessionEvent::Connected));
    (handle, events)
}

#[tokio::test(start_paused = true)]
async fn send_before_connect_is_rejected() {
    let (handle, mut events) = spawn_session(&quiet_config()).unwrap();
    assert_eq!(handle.send("too early").await, Err(ChatError::NotConnected));

    assert_eq!(events.recv().await, Some(SessionEvent::Connected));
    let message = handle.send("gm").await.unwrap();
    assert_eq!(message.status, DeliveryStatus::Sending);
    assert_eq!(message.room_id, RoomId::from("general"));
}

#[tokio::test(start_paused = true)]
async fn own_message_reaches_read() {
    let (handle, mut events) = connected(&quiet_config()).await;
    let message = handle.send("hello room").await.unwrap();

    let mut seen = Vec::new();
    while seen.len() < 3 {
        match events.recv().await {
            Some(SessionEvent::StatusChanged { id, status, .. }) if id == message.id => seen.push(status),
            Some(_) => {}
            None => panic!("event stream ended early"),
        }
    }
    assert_eq!(
        seen,
        [DeliveryStatus::Sent, DeliveryStatus::Delivered, DeliveryStatus::Read]
    );

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.current_room_messages.len(), 1);
    assert_eq!(snapshot.current_room_messages[0].status, DeliveryStatus::Read);
}

#[tokio::test(start_paused = true)]
async fn acknowledged_mode_waits_for_the_transport() {
    let mut config = quiet_config();
    config.delivery.mode = DeliveryMode::Acknowledged;
    let (handle, _events) = connected(&config).await;

    let id = handle.send("hello").await.unwrap().id;
    tokio::time::sleep(Duration::from_secs(10)).await;
    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.current_room_messages[0].status, DeliveryStatus::Sending);

    handle.acknowledge(id, DeliveryStatus::Sent).await.unwrap();
    assert!(matches!(
        handle.acknowledge(id, DeliveryStatus::Read).await,
        Err(ChatError::InvalidTransition { .. })
    ));
    handle.report_delivery_failure(id).await.unwrap();
    let retry = handle.resend(id).await.unwrap();
    assert_ne!(retry.id, id);
}

#[tokio::test(start_paused = true)]
async fn unread_counts_track_focus() {
    let (handle, _events) = connected(&quiet_config()).await;
    let alerts = RoomId::from("alerts");

    handle.inject_inbound("alerts", ParticipantId(2), "BTC 42k").await.unwrap();
    handle.inject_inbound("alerts", ParticipantId(3), "ETH spike").await.unwrap();
    assert_eq!(handle.snapshot().await.unwrap().unread_by_room[&alerts], 2);

    handle.switch_room("alerts").await.unwrap();
    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.unread_by_room[&alerts], 0);
    assert_eq!(snapshot.focused_room, alerts);
    assert_eq!(snapshot.current_room_messages.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn remote_typing_expires_without_a_stop() {
    let config = quiet_config();
    let (handle, _events) = connected(&config).await;

    handle.typing_start("general", ParticipantId(2)).await.unwrap();
    let typing: Vec<_> = handle
        .snapshot()
        .await
        .unwrap()
        .typing_others
        .into_iter()
        .map(|p| p.id)
        .collect();
    assert_eq!(typing, [ParticipantId(2)]);

    tokio::time::sleep(config.typing.remote_ttl() + Duration::from_millis(50)).await;
    assert!(handle.snapshot().await.unwrap().typing_others.is_empty());
}

#[tokio::test(start_paused = true)]
async fn presence_updates_are_applied_and_announced() {
    let (handle, mut events) = connected(&quiet_config()).await;
    handle.set_presence(ParticipantId(3), Presence::Away).await.unwrap();
    assert_eq!(
        events.recv().await,
        Some(SessionEvent::PresenceChanged {
            participant: ParticipantId(3),
            status: Presence::Away
        })
    );
    assert_eq!(
        handle.set_presence(ParticipantId(77), Presence::Away).await,
        Err(ChatError::UnknownParticipant(ParticipantId(77)))
    );
}

#[tokio::test(start_paused = true)]
async fn stopped_synthesizer_injects_nothing_more() {
    let mut config = quiet_config();
    config.synth.message_probability = 1.0;
    let (handle, mut events) = connected(&config).await;

    assert!(handle.start_synthesizer().await.unwrap());
    tokio::time::sleep(Duration::from_secs(30)).await;
    handle.stop_synthesizer().await.unwrap();
    while let Ok(event) = events.try_recv() {
        drop(event);
    }

    tokio::time::sleep(Duration::from_secs(120)).await;
    let mut late = Vec::new();
    while let Ok(event) = events.try_recv() {
        late.push(event);
    }
    assert!(
        !late
            .iter()
            .any(|event| matches!(event, SessionEvent::MessageAppended(_))),
        "unexpected events after stop: {late:?}"
    );
    assert!(!handle.snapshot().await.unwrap().synthesizer_running);
}

#[tokio::test(start_paused = true)]
async fn shutdown_closes_every_handle() {
    let (handle, mut events) = connected(&quiet_config()).await;
    let other = handle.clone();
    handle.shutdown().await.unwrap();

    assert_eq!(events.recv().await, Some(SessionEvent::Closed));
    assert_eq!(events.recv().await, None);
    assert_eq!(other.send("anyone?").await, Err(ChatError::SessionClosed));
    assert_eq!(handle.shutdown().await, Err(ChatError::SessionClosed));
}
