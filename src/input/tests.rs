//! Tests for the input module

use super::*;
use crate::testing::{AckRecord, MockReader, ReadScript};
use pretty_assertions::assert_eq;

fn mock_input(reader: MockReader) -> (ReaderInput<MockReader>, Arc<MockReader>) {
    let reader = Arc::new(reader);
    let input = ReaderInput::from_arc("mock", Arc::clone(&reader))
        .with_reconnect_interval(Duration::from_millis(10));
    (input, reader)
}

async fn wait_for_acks(reader: &MockReader, n: usize) -> Vec<AckRecord> {
    for _ in 0..400 {
        let acks = reader.acks();
        if acks.len() >= n {
            return acks;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("expected {n} acknowledgments, got {:?}", reader.acks());
}

#[tokio::test]
async fn test_successful_delivery_is_acked() {
    let (input, reader) = mock_input(MockReader::new());
    let mut transactions = input.transaction_chan().unwrap();

    reader.push_message(Message::single("hello"));
    let ts = transactions.recv().await.unwrap();
    assert_eq!(ts.payload, Message::single("hello"));
    ts.response.send(Ok(()));

    assert_eq!(wait_for_acks(&reader, 1).await, vec![AckRecord::Ack]);
    let snap = input.metrics();
    assert_eq!(snap.count, 1);
    assert_eq!(snap.ack_success, 1);
    assert_eq!(snap.reconnect_success, 1);
}

#[tokio::test]
async fn test_failed_delivery_is_nacked() {
    let (input, reader) = mock_input(MockReader::new());
    let mut transactions = input.transaction_chan().unwrap();

    reader.push_message(Message::single("refused"));
    let ts = transactions.recv().await.unwrap();
    ts.response.send(Err(Error::NoAcknowledgment));

    reader.push_message(Message::single("garbage"));
    let ts = transactions.recv().await.unwrap();
    ts.response.send(Err(Error::processor("bad input")));

    assert_eq!(
        wait_for_acks(&reader, 2).await,
        vec![
            AckRecord::Nack { requeue: true },
            AckRecord::Nack { requeue: false }
        ]
    );
    assert_eq!(input.metrics().ack_error, 2);
}

#[tokio::test]
async fn test_dropped_response_requeues() {
    let (input, reader) = mock_input(MockReader::new());
    let mut transactions = input.transaction_chan().unwrap();

    reader.push_message(Message::single("orphan"));
    drop(transactions.recv().await.unwrap());

    assert_eq!(
        wait_for_acks(&reader, 1).await,
        vec![AckRecord::Nack { requeue: true }]
    );
}

#[tokio::test]
async fn test_reconnects_after_lost_session() {
    let (input, reader) = mock_input(MockReader::new().fail_connects(1));
    let mut transactions = input.transaction_chan().unwrap();

    reader.push(ReadScript::Drop);
    reader.push_message(Message::single("after"));

    let ts = transactions.recv().await.unwrap();
    assert_eq!(ts.payload, Message::single("after"));
    ts.response.send(Ok(()));
    wait_for_acks(&reader, 1).await;

    assert_eq!(reader.connects(), 2);
    let snap = input.metrics();
    assert_eq!(snap.reconnect_error, 1);
    assert_eq!(snap.reconnect_success, 2);
}

#[tokio::test]
async fn test_transaction_chan_twice() {
    let (input, _) = mock_input(MockReader::new());
    let _rx = input.transaction_chan().unwrap();
    assert!(matches!(
        input.transaction_chan(),
        Err(Error::AlreadyStarted)
    ));
}

#[tokio::test]
async fn test_close_while_reading() {
    let (input, reader) = mock_input(MockReader::new());
    let _transactions = input.transaction_chan().unwrap();

    for _ in 0..400 {
        if input.state() == ConnectorState::Connected {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    input.close_async();
    input.close_async();
    input.wait_for_close(Duration::from_secs(1)).await.unwrap();

    assert_eq!(input.state(), ConnectorState::Closed);
    assert!(reader.is_closed());
    assert_eq!(input.metrics().running, 0);
}

#[tokio::test]
async fn test_close_before_start() {
    let (input, reader) = mock_input(MockReader::new());
    input.close_async();
    input.wait_for_close(Duration::ZERO).await.unwrap();

    assert!(reader.is_closed());
    assert!(matches!(input.transaction_chan(), Err(Error::ShuttingDown)));
}

#[tokio::test]
async fn test_wait_for_close_times_out_while_connecting() {
    let (input, _) = mock_input(MockReader::new().fail_connects(usize::MAX));
    let _transactions = input.transaction_chan().unwrap();

    let err = input.wait_for_close(Duration::ZERO).await.unwrap_err();
    assert!(matches!(err, Error::Timeout { .. }));

    input.close_async();
    input.wait_for_close(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_downstream_gone_stops_input() {
    let (input, reader) = mock_input(MockReader::new());
    let transactions = input.transaction_chan().unwrap();
    drop(transactions);

    reader.push_message(Message::single("nobody listens"));
    input.wait_for_close(Duration::from_secs(1)).await.unwrap();
    assert!(reader.acks().is_empty());
}

#[tokio::test]
async fn test_close_still_acknowledges_handed_off_message() {
    let (input, reader) = mock_input(MockReader::new());
    let mut transactions = input.transaction_chan().unwrap();

    reader.push_message(Message::single("in flight"));
    let ts = transactions.recv().await.unwrap();

    input.close_async();
    assert!(input.wait_for_close(Duration::ZERO).await.is_err());
    assert!(!reader.is_closed());

    ts.response.send(Ok(()));
    input.wait_for_close(Duration::from_secs(1)).await.unwrap();
    assert_eq!(reader.acks(), vec![AckRecord::Ack]);
    assert!(reader.is_closed());
}

#[tokio::test]
async fn test_abort_stops_waiting_for_response() {
    let (input, reader) = mock_input(MockReader::new());
    let mut transactions = input.transaction_chan().unwrap();

    reader.push_message(Message::single("in flight"));
    let _ts = transactions.recv().await.unwrap();

    input.abort();
    input.wait_for_close(Duration::from_secs(1)).await.unwrap();
    assert!(reader.acks().is_empty());
    assert!(reader.is_closed());
}
