//! Raw socket framing against a running server

mod common;

use common::{orchestrator_with, start_server, wait_for};
use fluorite_ipc::error::INVALID_REQUEST;
use fluorite_ipc::ServerEvent;
use fluorite_services::testing::MockAdapter;
use serde_json::Value;
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

async fn read_frame(lines: &mut tokio::io::Lines<BufReader<tokio::net::tcp::OwnedReadHalf>>) -> Value {
    let line = tokio::time::timeout(Duration::from_secs(5), lines.next_line())
        .await
        .expect("no frame within five seconds")
        .unwrap()
        .expect("connection closed");
    serde_json::from_str(&line).unwrap()
}

#[tokio::test]
async fn test_two_requests_in_one_write_around_a_malformed_line() {
    let orchestrator = orchestrator_with(vec![MockAdapter::healthy("alpha", 1)]).await;
    let (server, port) = start_server(orchestrator, None).await;
    let mut events = server.subscribe();

    let stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    let payload = concat!(
        r#"{"jsonrpc":"2.0","id":1,"method":"system.ping"}"#,
        "\n",
        "{this is not json\n",
        r#"{"jsonrpc":"2.0","id":2,"method":"system.version"}"#,
        "\n",
    );
    writer.write_all(payload.as_bytes()).await.unwrap();

    let mut ids = BTreeSet::new();
    for _ in 0..2 {
        let frame = read_frame(&mut lines).await;
        assert!(frame.get("error").is_none(), "unexpected error {}", frame);
        ids.insert(frame["id"].as_i64().unwrap());
    }
    assert_eq!(ids, BTreeSet::from([1, 2]));

    let event = wait_for(&mut events, |e| matches!(e, ServerEvent::ParseError { .. })).await;
    if let ServerEvent::ParseError { line, .. } = event {
        assert_eq!(line, "{this is not json");
    }

    // The malformed line did not close the connection
    writer
        .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":3,\"method\":\"system.ping\"}\n")
        .await
        .unwrap();
    assert_eq!(read_frame(&mut lines).await["id"], 3);

    server.stop().await;
}

#[tokio::test]
async fn test_frame_split_across_writes() {
    let orchestrator = orchestrator_with(vec![MockAdapter::healthy("alpha", 1)]).await;
    let (server, port) = start_server(orchestrator, None).await;

    let stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    writer.write_all(b"{\"jsonrpc\":\"2.0\",\"id\":\"a\",").await.unwrap();
    writer.flush().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    writer.write_all(b"\"method\":\"system.ping\"}\r\n").await.unwrap();

    let frame = read_frame(&mut lines).await;
    assert_eq!(frame["id"], "a");
    assert_eq!(frame["result"]["pong"], true);

    server.stop().await;
}

#[tokio::test]
async fn test_invalid_request_is_answered() {
    let orchestrator = orchestrator_with(vec![MockAdapter::healthy("alpha", 1)]).await;
    let (server, port) = start_server(orchestrator, None).await;

    let stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    writer.write_all(b"{\"jsonrpc\":\"2.0\",\"id\":5}\n").await.unwrap();
    let frame = read_frame(&mut lines).await;
    assert_eq!(frame["id"], 5);
    assert_eq!(frame["error"]["code"], INVALID_REQUEST);

    server.stop().await;
}

#[tokio::test]
async fn test_chunk_frames_precede_final_response() {
    let orchestrator = orchestrator_with(vec![MockAdapter::healthy("alpha", 2)]).await;
    let (server, port) = start_server(orchestrator, None).await;

    let stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    writer
        .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":7,\"method\":\"dashboard.watch\",\"params\":{\"intervalMs\":10,\"count\":2}}\n")
        .await
        .unwrap();

    for _ in 0..2 {
        let chunk = read_frame(&mut lines).await;
        assert_eq!(chunk["method"], "dashboard.watch.chunk");
        assert_eq!(chunk["params"]["id"], 7);
        assert_eq!(chunk["params"]["data"]["aggregated"]["totalResources"], 2);
    }
    let done = read_frame(&mut lines).await;
    assert_eq!(done["id"], 7);
    assert_eq!(done["result"]["snapshots"], 2);

    server.stop().await;
}
