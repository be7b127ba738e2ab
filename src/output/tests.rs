//! Tests for the output module

use super::*;
use crate::auth::AuthConfig;
use crate::message::Message;
use crate::testing::{MockWriter, PublishScript};
use crate::transaction::{handoff, Response, Transaction, TransactionSender};
use bytes::Bytes;
use pretty_assertions::assert_eq;
use test_case::test_case;
use wiremock::matchers::{body_bytes, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn mock_output(writer: MockWriter) -> (WriterOutput<MockWriter>, Arc<MockWriter>) {
    let writer = Arc::new(writer);
    let output = WriterOutput::from_arc("mock", Arc::clone(&writer))
        .with_reconnect_interval(Duration::from_millis(10));
    (output, writer)
}

fn start(output: &WriterOutput<MockWriter>) -> TransactionSender {
    let (tx, rx) = handoff();
    output.start_receiving(rx).unwrap();
    tx
}

async fn submit(tx: &TransactionSender, parts: &[&'static str]) -> Response {
    let (ts, rx) = Transaction::new(Message::new(parts.iter().copied()));
    tx.send(ts).await.unwrap();
    rx.recv().await
}

async fn wait_for_state(output: &dyn Output, state: ConnectorState) {
    for _ in 0..400 {
        if output.state() == state {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("output never reached {state}, stuck in {}", output.state());
}

fn bytes(parts: &[&'static str]) -> Vec<Bytes> {
    parts.iter().map(|p| Bytes::from_static(p.as_bytes())).collect()
}

// ============================================================================
// Reconnect loop
// ============================================================================

#[tokio::test]
async fn test_connect_fails_twice_then_serves() {
    let (output, writer) = mock_output(MockWriter::new().fail_connects(2));
    let tx = start(&output);

    submit(&tx, &["hello"]).await.unwrap();

    let snap = output.metrics();
    assert_eq!(snap.reconnect_error, 2);
    assert_eq!(snap.reconnect_success, 1);
    assert_eq!(snap.count, 1);
    assert_eq!(snap.send_success, 1);
    assert_eq!(snap.running, 1);
    assert_eq!(writer.connect_attempts(), 3);
    assert_eq!(output.state(), ConnectorState::Connected);
}

#[tokio::test]
async fn test_transactions_processed_in_order() {
    let (output, writer) = mock_output(MockWriter::new());
    let tx = start(&output);

    for part in ["a", "b", "c"] {
        submit(&tx, &[part]).await.unwrap();
    }
    assert_eq!(writer.published(), bytes(&["a", "b", "c"]));
    assert_eq!(output.metrics().count, 3);
}

#[tokio::test]
async fn test_start_receiving_twice() {
    let (output, _) = mock_output(MockWriter::new());
    let _tx = start(&output);

    let (_tx2, rx2) = handoff();
    let err = output.start_receiving(rx2).unwrap_err();
    assert!(matches!(err, Error::AlreadyStarted));
}

#[tokio::test]
async fn test_upstream_closed_ends_loop() {
    let (output, writer) = mock_output(MockWriter::new());
    let tx = start(&output);
    submit(&tx, &["last"]).await.unwrap();
    drop(tx);

    output.wait_for_close(Duration::from_secs(1)).await.unwrap();
    assert_eq!(output.state(), ConnectorState::Closed);
    assert_eq!(output.metrics().running, 0);
    assert_eq!(writer.disconnects(), 1);
}

// ============================================================================
// Acknowledgment bridge
// ============================================================================

#[tokio::test]
async fn test_negative_confirmation_keeps_session() {
    let writer = MockWriter::new().with_script([PublishScript::Ack, PublishScript::Nack]);
    let (output, writer) = mock_output(writer);
    let tx = start(&output);

    let err = submit(&tx, &["a", "b", "c"]).await.unwrap_err();
    assert!(matches!(err, Error::NoAcknowledgment));
    assert_eq!(writer.published(), bytes(&["a", "b"]));
    assert_eq!(writer.disconnects(), 0);

    submit(&tx, &["d"]).await.unwrap();
    assert_eq!(writer.connects(), 1);
    assert_eq!(writer.published(), bytes(&["a", "b", "d"]));

    let snap = output.metrics();
    assert_eq!(snap.send_success, 2);
    assert_eq!(snap.send_error, 1);
}

#[test_case(0 ; "first part")]
#[test_case(1 ; "middle part")]
#[test_case(2 ; "last part")]
#[tokio::test]
async fn test_publish_failure_stops_remaining_parts(failing: usize) {
    let script = (0..failing)
        .map(|_| PublishScript::Ack)
        .chain(std::iter::once(PublishScript::Fail));
    let (output, writer) = mock_output(MockWriter::new().with_script(script));
    let tx = start(&output);

    let parts = ["p0", "p1", "p2"];
    let err = submit(&tx, &parts).await.unwrap_err();
    assert!(matches!(err, Error::PublishFailure { .. }));
    assert_eq!(writer.published(), bytes(&parts[..failing]));
    assert_eq!(writer.disconnects(), 1);

    submit(&tx, &["next"]).await.unwrap();
    assert_eq!(writer.connects(), 2);
    assert_eq!(output.metrics().reconnect_success, 2);
}

#[tokio::test]
async fn test_empty_message_is_success() {
    let (output, writer) = mock_output(MockWriter::new());
    let tx = start(&output);

    let (ts, rx) = Transaction::new(Message::empty());
    tx.send(ts).await.unwrap();
    rx.recv().await.unwrap();
    assert!(writer.published().is_empty());
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_close_while_connecting() {
    let (output, writer) = mock_output(MockWriter::new().fail_connects(usize::MAX));
    let _tx = start(&output);
    wait_for_state(&output, ConnectorState::Connecting).await;

    let err = output.wait_for_close(Duration::ZERO).await.unwrap_err();
    assert!(matches!(err, Error::Timeout { .. }));

    output.close_async();
    output.close_async();
    output.wait_for_close(Duration::from_secs(1)).await.unwrap();

    assert_eq!(output.state(), ConnectorState::Closed);
    assert_eq!(writer.connects(), 0);
    assert_eq!(output.metrics().reconnect_success, 0);
}

#[tokio::test]
async fn test_pending_confirmation_abandoned_on_close() {
    let (output, writer) = mock_output(MockWriter::new().with_script([PublishScript::Pending]));
    let tx = start(&output);

    let (ts, rx) = Transaction::new(Message::single("stuck"));
    tx.send(ts).await.unwrap();
    for _ in 0..400 {
        if !writer.published().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    output.close_async();
    assert!(matches!(rx.recv().await, Err(Error::ShuttingDown)));
    output.wait_for_close(Duration::from_secs(1)).await.unwrap();
    assert_eq!(writer.disconnects(), 1);
    assert_eq!(output.metrics().send_success, 0);
}

#[tokio::test]
async fn test_close_does_not_wait_for_unresponsive_peer() {
    let (output, writer) = mock_output(MockWriter::new().hang_on_close());
    let tx = start(&output);
    submit(&tx, &["hello"]).await.unwrap();

    output.close_async();
    output.wait_for_close(Duration::from_secs(3)).await.unwrap();
    assert_eq!(output.state(), ConnectorState::Closed);
    assert_eq!(writer.disconnects(), 1);
    assert_eq!(output.metrics().running, 0);
}

#[tokio::test]
async fn test_publish_failure_does_not_wait_for_unresponsive_peer() {
    let writer = MockWriter::new()
        .hang_on_close()
        .with_script([PublishScript::Fail]);
    let (output, writer) = mock_output(writer);
    let tx = start(&output);

    let err = submit(&tx, &["lost"]).await.unwrap_err();
    assert!(matches!(err, Error::PublishFailure { .. }));
    assert!(!writer.is_connected());

    let next = tokio::time::timeout(Duration::from_secs(1), submit(&tx, &["next"]))
        .await
        .unwrap();
    next.unwrap();
    assert_eq!(writer.connects(), 2);
}

#[tokio::test]
async fn test_close_before_start() {
    let (output, writer) = mock_output(MockWriter::new());
    output.close_async();
    output.wait_for_close(Duration::ZERO).await.unwrap();

    let (_tx, rx) = handoff();
    assert!(matches!(
        output.start_receiving(rx),
        Err(Error::ShuttingDown)
    ));
    assert_eq!(writer.connect_attempts(), 0);
}

// ============================================================================
// HTTP writer
// ============================================================================

fn http_writer(server: &MockServer, auth: AuthConfig) -> HttpWriter {
    HttpWriter::new(HttpWriterConfig {
        url: format!("{}/post", server.uri()),
        auth,
        ..HttpWriterConfig::default()
    })
    .unwrap()
}

#[tokio::test]
async fn test_http_writer_delivers_parts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/post"))
        .and(header("Authorization", "Bearer secret"))
        .and(body_bytes(b"hello".to_vec()))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let writer = http_writer(
        &server,
        AuthConfig::Bearer {
            token: "secret".to_string(),
        },
    );
    assert!(matches!(
        writer.publish(&Bytes::from_static(b"hello")).await,
        Err(Error::NotConnected)
    ));

    writer.connect().await.unwrap();
    let confirm = writer.publish(&Bytes::from_static(b"hello")).await.unwrap();
    confirm.await.unwrap();
}

#[tokio::test]
async fn test_http_writer_error_status_is_refusal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let writer = http_writer(&server, AuthConfig::None);
    writer.connect().await.unwrap();
    let confirm = writer.publish(&Bytes::from_static(b"x")).await.unwrap();
    assert!(matches!(confirm.await, Err(Error::NoAcknowledgment)));
    assert!(writer.is_connected());
}

#[tokio::test]
async fn test_http_writer_transport_error() {
    let writer = HttpWriter::new(HttpWriterConfig {
        url: "http://127.0.0.1:1/post".to_string(),
        timeout_ms: 500,
        ..HttpWriterConfig::default()
    })
    .unwrap();
    writer.connect().await.unwrap();

    let err = writer.publish(&Bytes::from_static(b"x")).await.err();
    assert!(matches!(err, Some(Error::PublishFailure { .. })));
}

#[test]
fn test_http_writer_rejects_bad_verb() {
    let err = HttpWriter::new(HttpWriterConfig {
        verb: "NOT A VERB".to_string(),
        ..HttpWriterConfig::default()
    })
    .unwrap_err();
    assert!(matches!(err, Error::Config { .. }));
}

#[tokio::test]
async fn test_http_output_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/post"))
        .respond_with(ResponseTemplate::new(204))
        .expect(2)
        .mount(&server)
        .await;

    let writer = HttpWriter::new(HttpWriterConfig {
        url: format!("{}/post", server.uri()),
        verb: "put".to_string(),
        rate_limit: Some(RateLimitConfig {
            requests_per_second: 100,
            burst_size: 10,
        }),
        ..HttpWriterConfig::default()
    })
    .unwrap();
    let output = WriterOutput::new("http", writer);
    let (tx, rx) = handoff();
    output.start_receiving(rx).unwrap();

    let (ts, response) = Transaction::new(Message::new(["one", "two"]));
    tx.send(ts).await.unwrap();
    response.recv().await.unwrap();

    output.close_async();
    output.wait_for_close(Duration::from_secs(1)).await.unwrap();
    assert_eq!(output.metrics().send_success, 2);
}
