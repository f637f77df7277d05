//! Notification Sink Tests
//!
//! Fan-out, no replay for late subscribers, and drop-oldest overflow.

use std::time::Duration;

use offgrid_core::NotificationSink;
use tokio::time::timeout;
use tokio_test::{assert_pending, assert_ready_eq, block_on, task};

#[tokio::test]
async fn test_every_subscriber_sees_every_buffer() {
    let sink = NotificationSink::new(8);
    let mut first = sink.subscribe();
    let mut second = sink.subscribe();
    assert_eq!(sink.subscriber_count(), 2);

    for i in 0..3u8 {
        assert_eq!(sink.publish(vec![i]), 2);
    }

    for expected in 0..3u8 {
        assert_eq!(first.recv().await, Some(vec![expected]));
        assert_eq!(second.recv().await, Some(vec![expected]));
    }
}

#[tokio::test]
async fn test_late_subscriber_gets_no_replay() {
    let sink = NotificationSink::new(8);
    sink.publish(vec![1]);
    sink.publish(vec![2]);

    let mut late = sink.subscribe();
    assert!(late.try_recv().is_none());

    sink.publish(vec![3]);
    assert_eq!(late.recv().await, Some(vec![3]));
}

#[tokio::test]
async fn test_overflow_drops_oldest_without_blocking_producer() {
    let sink = NotificationSink::new(4);
    let mut slow = sink.subscribe();

    // Producer runs far ahead; publish must return immediately every time
    let produced = timeout(Duration::from_millis(500), async {
        for i in 0..10u8 {
            sink.publish(vec![i]);
        }
    })
    .await;
    assert!(produced.is_ok());

    let mut received = Vec::new();
    while let Some(buffer) = slow.try_recv() {
        received.push(buffer[0]);
    }

    assert_eq!(received, vec![6, 7, 8, 9]);
    assert!(received.len() <= sink.capacity());
    assert_eq!(slow.dropped(), 6);
}

#[tokio::test]
async fn test_capacity_that_is_not_a_power_of_two_is_exact() {
    let sink = NotificationSink::new(10);
    let mut slow = sink.subscribe();
    let mut fast = sink.subscribe();

    for i in 0..20u8 {
        sink.publish(vec![i]);
    }

    let mut received = Vec::new();
    while let Some(buffer) = slow.try_recv() {
        received.push(buffer[0]);
    }
    assert_eq!(received, (10..20).collect::<Vec<u8>>());
    assert_eq!(slow.dropped(), 10);

    // The waiting path applies the same bound
    assert_eq!(fast.recv().await, Some(vec![10]));
    assert_eq!(fast.dropped(), 10);
}

#[tokio::test]
async fn test_burst_while_waiting_is_bounded() {
    let sink = NotificationSink::new(3);
    let mut subscription = sink.subscribe();
    let mut next = task::spawn(subscription.recv());
    assert_pending!(next.poll());

    for i in 0..7u8 {
        sink.publish(vec![i]);
    }
    assert_ready_eq!(next.poll(), Some(vec![4]));
    drop(next);

    assert_eq!(subscription.try_recv(), Some(vec![5]));
    assert_eq!(subscription.try_recv(), Some(vec![6]));
    assert_eq!(subscription.try_recv(), None);
    assert_eq!(subscription.dropped(), 4);
}

#[tokio::test]
async fn test_dropping_subscription_cancels_it() {
    let sink = NotificationSink::new(4);
    let subscription = sink.subscribe();
    assert_eq!(sink.subscriber_count(), 1);
    drop(subscription);
    assert_eq!(sink.subscriber_count(), 0);
}

#[test]
fn test_recv_waits_for_next_publish() {
    let sink = NotificationSink::new(4);
    let mut subscription = sink.subscribe();
    let mut next = task::spawn(subscription.recv());

    assert_pending!(next.poll());
    sink.publish(vec![42]);
    assert!(next.is_woken());
    assert_ready_eq!(next.poll(), Some(vec![42]));
}

#[test]
fn test_recv_ends_when_sink_is_gone() {
    let sink = NotificationSink::new(4);
    let mut subscription = sink.subscribe();
    sink.publish(vec![1]);
    drop(sink);

    assert_eq!(block_on(subscription.recv()), Some(vec![1]));
    assert_eq!(block_on(subscription.recv()), None);
}
