use std::time::Duration;

use comms::{
    FrameReceiver, FrameSender,
    msg::{Inbound, NestedArray, Outbound, ParameterPayload},
    ws,
};
use futures::{SinkExt, StreamExt};
use machine_learning::{
    Result, Tensor,
    training::{Evaluation, TrainResult, Trainer},
};
use ndarray::{ArrayD, IxDyn};
use participant::{
    ClientIdentity, ConnectionState, IdentityStore, JsonIdentityStore, Participant,
    RoundController, SessionManager, TransferMode, metrics::RoundMetrics,
};
use tokio::{
    io::{self, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf},
    task::JoinHandle,
    time,
};
use tokio_tungstenite::{
    WebSocketStream,
    tungstenite::{Message, protocol::Role},
};

type ServerRx = FrameReceiver<ReadHalf<DuplexStream>>;
type ServerTx = FrameSender<WriteHalf<DuplexStream>>;
type TestParticipant<S> = Participant<TestTrainer, S, Vec<RoundMetrics>>;

const EVAL: Evaluation = Evaluation {
    loss: 0.25,
    accuracy: 0.5,
};

/// Sends a 2x2 matrix and a one element vector every round, stopping after `rounds` aggregates.
struct TestTrainer {
    rounds: usize,
    received: Vec<Option<Vec<Tensor>>>,
}

impl TestTrainer {
    fn new(rounds: usize) -> Self {
        Self {
            rounds,
            received: Vec::new(),
        }
    }

    fn params() -> Vec<Tensor> {
        vec![
            ArrayD::from_shape_vec(IxDyn(&[2, 2]), vec![1.0, 2.0, 3.0, 4.0]).unwrap(),
            ArrayD::from_shape_vec(IxDyn(&[1]), vec![5.0]).unwrap(),
        ]
    }
}

impl Trainer for TestTrainer {
    fn train(&mut self, params: Option<Vec<Tensor>>) -> Result<TrainResult> {
        let priming = params.is_none();
        self.received.push(params);

        if priming {
            return Ok(TrainResult::proceed(Self::params(), None));
        }

        if self.received.len() > self.rounds {
            return Ok(TrainResult::finish(Some(EVAL)));
        }

        Ok(TrainResult::proceed(Self::params(), Some(EVAL)))
    }
}

fn build<S: IdentityStore>(
    identity: ClientIdentity,
    store: S,
    rounds: usize,
    mode: TransferMode,
) -> TestParticipant<S> {
    let session = SessionManager::new(identity, store);
    let rounds = RoundController::new(TestTrainer::new(rounds), Vec::new(), mode);
    Participant::new(session, rounds)
}

fn spawn<S>(
    mut participant: TestParticipant<S>,
) -> (
    JoinHandle<(TestParticipant<S>, participant::Result<()>)>,
    ServerRx,
    ServerTx,
)
where
    S: IdentityStore + Send + 'static,
{
    let (client, server) = io::duplex(4096);
    let (rx, tx) = io::split(client);
    let (server_rx, server_tx) = io::split(server);
    let (server_rx, server_tx) = comms::channel(server_rx, server_tx);

    let handle = tokio::spawn(async move {
        let ret = participant.run(rx, tx).await;
        (participant, ret)
    });

    (handle, server_rx, server_tx)
}

fn host() -> ClientIdentity {
    ClientIdentity {
        number_of_clients: 2,
        client_id: String::new(),
        password: "secret".into(),
    }
}

async fn expect_unit(rx: &mut ServerRx) -> Vec<f32> {
    match rx.recv::<Outbound>().await.unwrap() {
        Outbound::SendParameters {
            client_id: None,
            parameters: ParameterPayload::Unit(values),
        } => values,
        other => panic!("expected a chunked sendParameters, got {other:?}"),
    }
}

async fn expect_silence(rx: &mut ServerRx) {
    let next = time::timeout(Duration::from_millis(50), rx.recv::<Outbound>()).await;
    assert!(next.is_err(), "participant sent {next:?} out of turn");
}

async fn ack(tx: &mut ServerTx, values: Vec<f32>) {
    let msg = Inbound::ReceiveAggregatedLayer { parameters: values };
    tx.send(&msg).await.unwrap();
}

#[tokio::test]
async fn host_runs_chunked_rounds_until_trainer_stops() {
    let (handle, mut rx, mut tx) = spawn(build(host(), host(), 2, TransferMode::Chunked));

    assert_eq!(
        rx.recv::<Outbound>().await.unwrap(),
        Outbound::HostSession {
            password: "secret".into(),
            total_clients: 2
        }
    );

    let registered = Inbound::HostRegistered {
        client_id: "abc".into(),
    };
    tx.send(&registered).await.unwrap();

    for _ in 0..2 {
        assert_eq!(expect_unit(&mut rx).await, vec![1.0, 2.0]);
        expect_silence(&mut rx).await;
        ack(&mut tx, vec![10.0, 20.0]).await;

        assert_eq!(expect_unit(&mut rx).await, vec![3.0, 4.0]);
        expect_silence(&mut rx).await;
        ack(&mut tx, vec![30.0, 40.0]).await;

        assert_eq!(expect_unit(&mut rx).await, vec![5.0]);
        expect_silence(&mut rx).await;
        ack(&mut tx, vec![50.0]).await;
    }

    // The trainer stopped: the participant closes without sending anything else.
    let err = rx.recv::<Outbound>().await.unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    drop((rx, tx));

    let (participant, ret) = handle.await.unwrap();
    ret.unwrap();

    assert_eq!(participant.session().state(), ConnectionState::Closed);
    assert_eq!(participant.session().store().client_id, "abc");

    let rounds = participant.rounds();
    assert!(rounds.is_finished());
    assert_eq!(rounds.completed_rounds(), 2);

    let recorded: Vec<_> = rounds.metrics().iter().map(|m| m.round).collect();
    assert_eq!(recorded, vec![0, 1]);
    assert!(rounds.metrics().iter().all(|m| m.delay.is_some()));

    let aggregated = rounds.trainer().received[1].as_ref().unwrap();
    assert_eq!(
        aggregated[0],
        ArrayD::from_shape_vec(IxDyn(&[2, 2]), vec![10.0, 20.0, 30.0, 40.0]).unwrap()
    );
    assert_eq!(aggregated[1], ArrayD::from_elem(IxDyn(&[1]), 50.0));
}

#[tokio::test]
async fn member_joins_and_sends_whole_parameters() {
    let member = ClientIdentity {
        client_id: "member-1".into(),
        ..host()
    };
    let (handle, mut rx, mut tx) = spawn(build(
        member.clone(),
        member,
        1,
        TransferMode::Whole,
    ));

    assert_eq!(
        rx.recv::<Outbound>().await.unwrap(),
        Outbound::JoinRequest {
            client_id: "member-1".into(),
            password: "secret".into()
        }
    );

    let approved = Inbound::ClientApproved {
        client_id: "member-1".into(),
    };
    tx.send(&approved).await.unwrap();

    let Outbound::SendParameters {
        client_id,
        parameters: ParameterPayload::Tensors(tensors),
    } = rx.recv::<Outbound>().await.unwrap()
    else {
        panic!("expected a whole sendParameters");
    };
    assert_eq!(client_id.as_deref(), Some("member-1"));
    assert_eq!(tensors.len(), 2);
    assert_eq!(
        tensors[1],
        NestedArray::List(vec![NestedArray::Scalar(5.0)])
    );

    let aggregated = Inbound::ReceiveAggregatedParameters {
        parameters: tensors,
    };
    tx.send(&aggregated).await.unwrap();

    let err = rx.recv::<Outbound>().await.unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    drop((rx, tx));

    let (participant, ret) = handle.await.unwrap();
    ret.unwrap();

    assert_eq!(participant.session().store().client_id, "member-1");
    assert_eq!(participant.rounds().metrics().len(), 1);
    assert_eq!(
        participant.rounds().trainer().received[1].as_ref().unwrap(),
        &TestTrainer::params()
    );
}

#[tokio::test]
async fn bad_messages_are_dropped_and_the_connection_stays_open() {
    let (handle, mut rx, mut tx) = spawn(build(host(), host(), 5, TransferMode::Chunked));
    rx.recv::<Outbound>().await.unwrap();

    // Missing clientId.
    tx.send(&serde_json::json!({ "type": "hostRegistered" }))
        .await
        .unwrap();
    // A type this participant doesn't know.
    tx.send(&serde_json::json!({ "type": "sessionStats", "clients": 3 }))
        .await
        .unwrap();
    // Valid JSON, but not a message.
    tx.send(&"{ not json").await.unwrap();
    // Aggregates before the session is active.
    ack(&mut tx, vec![1.0, 2.0]).await;

    expect_silence(&mut rx).await;

    let registered = Inbound::HostRegistered {
        client_id: "abc".into(),
    };
    tx.send(&registered).await.unwrap();
    assert_eq!(expect_unit(&mut rx).await, vec![1.0, 2.0]);

    // A second registration while active is an illegal transition and changes nothing.
    let again = Inbound::HostRegistered {
        client_id: "xyz".into(),
    };
    tx.send(&again).await.unwrap();
    expect_silence(&mut rx).await;

    // A unit of the wrong length is dropped; the right one still advances the round.
    ack(&mut tx, vec![1.0]).await;
    expect_silence(&mut rx).await;
    ack(&mut tx, vec![1.0, 2.0]).await;
    assert_eq!(expect_unit(&mut rx).await, vec![3.0, 4.0]);

    drop((rx, tx));

    let (participant, ret) = handle.await.unwrap();
    ret.unwrap();

    assert_eq!(participant.session().state(), ConnectionState::Closed);
    assert_eq!(participant.session().identity().client_id, "abc");
    assert!(participant.rounds().metrics().is_empty());
    assert_eq!(participant.rounds().trainer().received.len(), 1);
}

#[tokio::test]
async fn assigned_identity_is_persisted_to_the_config_file() {
    let path = std::env::temp_dir().join(format!("participant-{}.json", std::process::id()));
    let _ = std::fs::remove_file(&path);

    let store = JsonIdentityStore::open_or_init(&path).unwrap();
    let identity = store.load_identity().unwrap();
    assert!(identity.is_host());

    let (handle, mut rx, mut tx) = spawn(build(identity, store, 5, TransferMode::Chunked));

    assert!(matches!(
        rx.recv::<Outbound>().await.unwrap(),
        Outbound::HostSession { .. }
    ));

    let registered = Inbound::HostRegistered {
        client_id: "abc".into(),
    };
    tx.send(&registered).await.unwrap();
    expect_unit(&mut rx).await;
    drop((rx, tx));

    let (_, ret) = handle.await.unwrap();
    ret.unwrap();

    let reloaded = JsonIdentityStore::new(&path).load_identity().unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(reloaded.client_id, "abc");
    assert_eq!(reloaded.password, "mypassword");
}

#[tokio::test]
async fn frame_cut_short_ends_the_run_as_a_transport_failure() {
    let mut participant = build(host(), host(), 5, TransferMode::Chunked);

    let (client, server) = io::duplex(4096);
    let (rx, tx) = io::split(client);
    let (server_rx, mut server_tx) = io::split(server);
    let (mut server_rx, _) = comms::channel(server_rx, io::sink());

    let handle = tokio::spawn(async move {
        let ret = participant.run(rx, tx).await;
        (participant, ret)
    });

    assert!(matches!(
        server_rx.recv::<Outbound>().await.unwrap(),
        Outbound::HostSession { .. }
    ));

    // Announces a 64 byte body but only delivers part of it.
    server_tx.write_all(&64u64.to_be_bytes()).await.unwrap();
    server_tx.write_all(br#"{"type":"host"#).await.unwrap();
    server_tx.shutdown().await.unwrap();

    let (participant, ret) = handle.await.unwrap();
    ret.unwrap();

    assert_eq!(participant.session().state(), ConnectionState::Closed);
    assert!(participant.rounds().round_index().is_none());
}

async fn server_recv(server: &mut WebSocketStream<DuplexStream>) -> Outbound {
    loop {
        match server.next().await.unwrap().unwrap() {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            Message::Pong(_) => continue,
            other => panic!("expected a text frame, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn runs_over_a_websocket() {
    let mut participant = build(host(), host(), 1, TransferMode::Whole);

    let (client, server) = io::duplex(4096);
    let config = ws::config(comms::DEFAULT_MAX_FRAME_LEN);
    let client = WebSocketStream::from_raw_socket(client, Role::Client, Some(config)).await;
    let mut server = WebSocketStream::from_raw_socket(server, Role::Server, None).await;
    let (rx, tx) = ws::split(client);

    let handle = tokio::spawn(async move {
        let ret = participant.run(rx, tx).await;
        (participant, ret)
    });

    assert_eq!(
        server_recv(&mut server).await,
        Outbound::HostSession {
            password: "secret".into(),
            total_clients: 2
        }
    );

    server.send(Message::Ping(vec![1u8].into())).await.unwrap();
    let registered = serde_json::to_string(&Inbound::HostRegistered {
        client_id: "abc".into(),
    })
    .unwrap();
    server.send(Message::text(registered)).await.unwrap();

    let Outbound::SendParameters {
        client_id,
        parameters: ParameterPayload::Tensors(tensors),
    } = server_recv(&mut server).await
    else {
        panic!("expected a whole sendParameters");
    };
    assert_eq!(client_id.as_deref(), Some("abc"));

    let aggregated = serde_json::to_string(&Inbound::ReceiveAggregatedParameters {
        parameters: tensors,
    })
    .unwrap();
    server.send(Message::text(aggregated)).await.unwrap();

    // The trainer stops after one aggregate and the participant closes the socket.
    loop {
        match server.next().await {
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(Message::Pong(_))) => continue,
            other => panic!("expected the socket to close, got {other:?}"),
        }
    }

    let (participant, ret) = handle.await.unwrap();
    ret.unwrap();

    assert_eq!(participant.session().state(), ConnectionState::Closed);
    assert_eq!(participant.rounds().completed_rounds(), 1);
}
