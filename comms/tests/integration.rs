use std::time::Duration;

use comms::{
    msg::{Inbound, Outbound, ParameterPayload},
    ws::{self, WsReader, WsWriter},
};
use futures::{SinkExt, StreamExt};
use tokio::{
    io::{self, AsyncWriteExt, DuplexStream},
    time,
};
use tokio_tungstenite::{
    WebSocketStream,
    tungstenite::{Message, protocol::Role},
};

#[tokio::test]
async fn send_recv() {
    const SIZE: usize = 128;

    let msg = Outbound::JoinRequest {
        client_id: "abc".into(),
        password: "pw".into(),
    };

    let (one, two) = io::duplex(SIZE);
    let (rx, tx) = io::split(one);
    let (_, mut tx) = comms::channel(rx, tx);

    tx.send(&msg).await.unwrap();

    let (rx, tx) = io::split(two);
    let (mut rx, _) = comms::channel(rx, tx);

    let received: Outbound = rx.recv().await.unwrap();
    assert_eq!(received, msg);
}

#[tokio::test]
async fn frames_keep_message_boundaries() {
    let (one, two) = io::duplex(4096);
    let (one_rx, one_tx) = io::split(one);
    let (_, mut tx) = comms::channel(one_rx, one_tx);
    let (two_rx, two_tx) = io::split(two);
    let (mut rx, _) = comms::channel(two_rx, two_tx);

    for i in 0..3 {
        let msg = Inbound::ReceiveAggregatedLayer {
            parameters: vec![i as f32; i + 1],
        };
        tx.send(&msg).await.unwrap();
    }

    let mut buf = Vec::new();
    for i in 0..3 {
        let frame = rx.recv_into(&mut buf).await.unwrap().unwrap();
        let msg = Inbound::parse(frame).unwrap();
        assert_eq!(
            msg,
            Inbound::ReceiveAggregatedLayer {
                parameters: vec![i as f32; i + 1],
            }
        );
    }
}

#[tokio::test]
async fn clean_close_between_frames_is_not_an_error() {
    let (one, two) = io::duplex(4096);
    let (one_rx, one_tx) = io::split(one);
    let (_, mut tx) = comms::channel(one_rx, one_tx);
    let (two_rx, two_tx) = io::split(two);
    let (mut rx, _) = comms::channel(two_rx, two_tx);

    tx.send(&Inbound::Unknown).await.unwrap();
    tx.shutdown().await.unwrap();

    let mut buf = Vec::new();
    assert!(rx.recv_into(&mut buf).await.unwrap().is_some());
    assert!(rx.recv_into(&mut buf).await.unwrap().is_none());
}

#[tokio::test]
async fn close_inside_a_frame_is_an_error() {
    // A header announcing 10 bytes followed by only 3 of them.
    let mut truncated_body = 10u64.to_be_bytes().to_vec();
    truncated_body.extend_from_slice(b"{\"t");

    for bytes in [truncated_body, vec![0, 0, 0]] {
        let (mut one, two) = io::duplex(4096);
        one.write_all(&bytes).await.unwrap();
        drop(one);

        let (two_rx, two_tx) = io::split(two);
        let (mut rx, _) = comms::channel(two_rx, two_tx);

        let mut buf = Vec::new();
        let err = rx.recv_into(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
    }
}

#[tokio::test]
async fn oversized_frame_is_not_sent() {
    let (one, two) = io::duplex(4096);
    let (one_rx, one_tx) = io::split(one);
    let (_, mut tx) = comms::channel_with_limit(one_rx, one_tx, 16);

    let msg = Outbound::SendParameters {
        client_id: None,
        parameters: ParameterPayload::Unit(vec![0.5; 64]),
    };

    let err = tx.send(&msg).await.unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);

    // Nothing reached the wire, so the peer only sees the end of the stream.
    tx.shutdown().await.unwrap();
    let (two_rx, two_tx) = io::split(two);
    let (mut rx, _) = comms::channel(two_rx, two_tx);
    let mut buf = Vec::new();
    assert!(rx.recv_into(&mut buf).await.unwrap().is_none());
}

#[tokio::test]
async fn oversized_frame_is_rejected_on_receipt() {
    let (one, two) = io::duplex(4096);
    let (one_rx, one_tx) = io::split(one);
    let (_, mut tx) = comms::channel(one_rx, one_tx);
    let (two_rx, two_tx) = io::split(two);
    let (mut rx, _) = comms::channel_with_limit(two_rx, two_tx, 16);

    let msg = Inbound::ReceiveAggregatedLayer {
        parameters: vec![0.5; 64],
    };
    tx.send(&msg).await.unwrap();

    let mut buf = Vec::new();
    let err = rx.recv_into(&mut buf).await.unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
}

type Server = WebSocketStream<DuplexStream>;

/// A WebSocket connection over an in-memory pipe: the raw server end and the client's halves.
async fn ws_pair(
    max_frame_len: usize,
) -> (Server, (WsReader<DuplexStream>, WsWriter<DuplexStream>)) {
    let (client, server) = io::duplex(4096);
    let config = ws::config(max_frame_len);

    let client = WebSocketStream::from_raw_socket(client, Role::Client, Some(config)).await;
    let server = WebSocketStream::from_raw_socket(server, Role::Server, None).await;

    (server, ws::split(client))
}

async fn server_text(server: &mut Server) -> String {
    match server.next().await.unwrap().unwrap() {
        Message::Text(text) => text.as_str().to_owned(),
        other => panic!("expected a text frame, got {other:?}"),
    }
}

#[tokio::test]
async fn ws_messages_travel_as_text_frames() {
    let (mut server, (rx, tx)) = ws_pair(comms::DEFAULT_MAX_FRAME_LEN).await;
    let (mut rx, mut tx) = comms::channel(rx, tx);

    let msg = Outbound::HostSession {
        password: "pw".into(),
        total_clients: 2,
    };
    tx.send(&msg).await.unwrap();

    let text = server_text(&mut server).await;
    assert_eq!(serde_json::from_str::<Outbound>(&text).unwrap(), msg);

    let reply = r#"{"type":"hostRegistered","clientId":"abc"}"#;
    server.send(Message::text(reply.to_owned())).await.unwrap();

    let received: Inbound = rx.recv().await.unwrap();
    assert_eq!(
        received,
        Inbound::HostRegistered {
            client_id: "abc".into()
        }
    );
}

#[tokio::test]
async fn ws_pings_are_answered_and_skipped() {
    let (mut server, (rx, tx)) = ws_pair(comms::DEFAULT_MAX_FRAME_LEN).await;
    let (mut rx, _tx) = comms::channel(rx, tx);

    server.send(Message::Ping(vec![7u8, 7].into())).await.unwrap();
    server
        .send(Message::text(
            r#"{"type":"clientApproved","clientId":"x"}"#.to_owned(),
        ))
        .await
        .unwrap();

    let received: Inbound = rx.recv().await.unwrap();
    assert_eq!(
        received,
        Inbound::ClientApproved {
            client_id: "x".into()
        }
    );

    let pong = time::timeout(Duration::from_secs(1), server.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    match pong {
        Message::Pong(payload) => assert_eq!(&payload[..], &[7, 7]),
        other => panic!("expected a pong, got {other:?}"),
    }
}

#[tokio::test]
async fn ws_close_frame_ends_the_stream_cleanly() {
    let (mut server, (rx, tx)) = ws_pair(comms::DEFAULT_MAX_FRAME_LEN).await;
    let (mut rx, _tx) = comms::channel(rx, tx);

    server.close(None).await.unwrap();

    let mut buf = Vec::new();
    assert!(rx.recv_into(&mut buf).await.unwrap().is_none());
}

#[tokio::test]
async fn ws_oversized_message_is_rejected_on_receipt() {
    let (mut server, (rx, tx)) = ws_pair(16).await;
    let (mut rx, _tx) = comms::channel_with_limit(rx, tx, 16);

    let msg = serde_json::to_string(&Inbound::ReceiveAggregatedLayer {
        parameters: vec![0.5; 64],
    })
    .unwrap();
    server.send(Message::text(msg)).await.unwrap();

    let mut buf = Vec::new();
    let err = rx.recv_into(&mut buf).await.unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
}
