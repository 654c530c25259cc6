//! Integration tests for the WebSocket/STOMP link.
//!
//! Each test runs a scripted single-connection broker on a local port and
//! drives a real [`StompLink`] against it.

#![cfg(feature = "transport")]

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use huddle_client::{
    LinkHandle, LinkState,
    transport::{LinkConfig, LinkEvent, StompLink},
};
use huddle_proto::{
    Message, MsgType, OutboundFrame, SenderRef, StompCommand, StompFrame,
    stomp::{room_send_destination, room_topic},
};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::{mpsc, oneshot},
    time::timeout,
};
use tokio_tungstenite::{WebSocketStream, accept_async, tungstenite::Message as WsMessage};

type Broker = WebSocketStream<TcpStream>;

async fn listen() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/ws", listener.local_addr().unwrap());
    (listener, url)
}

async fn accept(listener: &TcpListener) -> Broker {
    let (stream, _) = listener.accept().await.unwrap();
    accept_async(stream).await.unwrap()
}

async fn read_frame(ws: &mut Broker) -> StompFrame {
    loop {
        match ws.next().await.unwrap().unwrap() {
            WsMessage::Text(text) => return StompFrame::decode(&text).unwrap(),
            _ => continue,
        }
    }
}

async fn write_frame(ws: &mut Broker, frame: StompFrame) {
    ws.send(WsMessage::Text(frame.encode())).await.unwrap();
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<LinkEvent>) -> LinkEvent {
    timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap()
}

fn chat(id: u64) -> Message {
    Message {
        id,
        room_id: 5,
        sender: SenderRef::human(7),
        content: format!("hello {id}"),
        created_at: 1_700_000_000_000,
        reply_to: None,
        msg_type: MsgType::Text,
    }
}

#[tokio::test]
async fn link_subscribes_receives_and_sends() {
    let (listener, url) = listen().await;
    let (sent_tx, sent_rx) = oneshot::channel();

    tokio::spawn(async move {
        let mut ws = accept(&listener).await;

        let connect = read_frame(&mut ws).await;
        assert_eq!(connect.command, StompCommand::Connect);
        assert_eq!(connect.header("Authorization"), Some("Bearer secret"));
        write_frame(&mut ws, StompFrame::new(StompCommand::Connected).with_header("version", "1.2"))
            .await;

        let subscribe = read_frame(&mut ws).await;
        assert_eq!(subscribe.command, StompCommand::Subscribe);
        assert_eq!(subscribe.header("destination"), Some(room_topic(5).as_str()));

        // Heart-beat, then garbage, then a real push
        ws.send(WsMessage::Text("\n".into())).await.unwrap();
        ws.send(WsMessage::Text("NOT A FRAME".into())).await.unwrap();
        let push = StompFrame::new(StompCommand::Message)
            .with_header("destination", room_topic(5))
            .with_body(chat(1).to_json().unwrap());
        write_frame(&mut ws, push).await;

        let send = read_frame(&mut ws).await;
        let _ = sent_tx.send(send);
    });

    let (events, mut rx) = mpsc::unbounded_channel();
    let link = StompLink::spawn(LinkConfig::new(url).with_token("secret"), 5, events);

    assert_eq!(next_event(&mut rx).await, LinkEvent::Up { room_id: 5 });
    assert_eq!(link.state(), LinkState::Connected);
    assert_eq!(next_event(&mut rx).await, LinkEvent::Message { room_id: 5, message: chat(1) });

    let frame = OutboundFrame {
        group_id: 5,
        sender_id: 7,
        content: "reply".into(),
        msg_type: MsgType::Text,
        create_time: 1,
        bot_id: None,
        reply_to_msg_id: Some(1),
    };
    link.transmit(&frame).unwrap();

    let sent = timeout(Duration::from_secs(5), sent_rx).await.unwrap().unwrap();
    assert_eq!(sent.command, StompCommand::Send);
    assert_eq!(sent.header("destination"), Some(room_send_destination(5).as_str()));
    assert_eq!(OutboundFrame::from_json(&sent.body).unwrap(), frame);

    assert!(matches!(next_event(&mut rx).await, LinkEvent::Down { room_id: 5, .. }));
    assert_eq!(link.state(), LinkState::Disconnected);
}

#[tokio::test]
async fn broker_error_reports_down() {
    let (listener, url) = listen().await;

    tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        let _ = read_frame(&mut ws).await;
        write_frame(&mut ws, StompFrame::new(StompCommand::Error).with_header("message", "denied"))
            .await;
        let _ = ws.next().await;
    });

    let (events, mut rx) = mpsc::unbounded_channel();
    let _link = StompLink::spawn(LinkConfig::new(url), 5, events);

    let LinkEvent::Down { reason, .. } = next_event(&mut rx).await else {
        unreachable!("expected down");
    };
    assert!(reason.contains("denied"), "reason: {reason}");
}

#[tokio::test]
async fn refused_connection_reports_down() {
    let (listener, url) = listen().await;
    drop(listener);

    let (events, mut rx) = mpsc::unbounded_channel();
    let link = StompLink::spawn(LinkConfig::new(url), 5, events);

    assert!(matches!(next_event(&mut rx).await, LinkEvent::Down { room_id: 5, .. }));
    assert_eq!(link.state(), LinkState::Disconnected);
}

#[tokio::test]
async fn close_disconnects_without_down() {
    let (listener, url) = listen().await;
    let (done_tx, done_rx) = oneshot::channel();

    tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        let _ = read_frame(&mut ws).await;
        write_frame(&mut ws, StompFrame::new(StompCommand::Connected)).await;
        let _ = read_frame(&mut ws).await;

        let mut commands = Vec::new();
        while let Some(Ok(WsMessage::Text(text))) = ws.next().await {
            commands.push(StompFrame::decode(&text).unwrap().command);
        }
        let _ = done_tx.send(commands);
    });

    let (events, mut rx) = mpsc::unbounded_channel();
    let link = StompLink::spawn(LinkConfig::new(url), 5, events);
    assert_eq!(next_event(&mut rx).await, LinkEvent::Up { room_id: 5 });

    link.close();
    assert_eq!(link.state(), LinkState::Disconnected);

    let commands = timeout(Duration::from_secs(5), done_rx).await.unwrap().unwrap();
    assert_eq!(commands, vec![StompCommand::Unsubscribe, StompCommand::Disconnect]);
    assert!(!matches!(timeout(Duration::from_millis(100), rx.recv()).await, Ok(Some(_))));
}
