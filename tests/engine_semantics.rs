//! End-to-end delay, redelivery, and reconciliation scenarios
//!
//! These run the full engine (façade + scanners) against the in-memory
//! store with real timers, so no external services are needed. Scanners
//! tick once a second; every wait below leaves at least a full tick of
//! slack. The same scenarios run against a live Redis in
//! `redis_integration.rs`.

use std::sync::Arc;
use std::time::Duration;

use delayq::{unix_now, Config, DelayQueue, DelayQueueError, Job, MemoryStore, RedisConfig};

fn test_config(block_timeout: u64) -> Config {
    Config {
        queue_block_timeout: block_timeout,
        redis: RedisConfig {
            read_timeout_ms: block_timeout * 1000 + 2000,
            ..RedisConfig::default()
        },
        ..Config::default()
    }
}

fn queue(block_timeout: u64) -> DelayQueue {
    DelayQueue::new(test_config(block_timeout), Arc::new(MemoryStore::new())).unwrap()
}

fn topics(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

async fn sleep_ms(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

// A job pushed with a 2-second delay is invisible early and delivered
// once the delay elapses.
#[tokio::test(flavor = "multi_thread")]
async fn scenario_basic_delay() {
    let queue = queue(1);
    queue.start_scanners().await;
    let now = unix_now();

    queue
        .push(Job::new("a", "t", now + 2, 60, "x"))
        .await
        .unwrap();

    // Too early: the one-second blocking pop times out empty.
    assert_eq!(queue.pop(&topics(&["t"])).await.unwrap(), None);

    // Well past the delay plus one scanner tick.
    sleep_ms(3500).await;
    let job = queue.pop(&topics(&["t"])).await.unwrap().unwrap();
    assert_eq!(job.id, "a");
    assert_eq!(job.body, "x");

    queue.remove("a").await.unwrap();
    queue.shutdown().await;
}

// A popped job that is never acknowledged comes back after its TTR.
#[tokio::test(flavor = "multi_thread")]
async fn scenario_ttr_redelivery() {
    let queue = queue(6);
    queue.start_scanners().await;
    let before_first_pop = unix_now();

    queue
        .push(Job::new("b", "t", before_first_pop, 2, "y"))
        .await
        .unwrap();

    let first = queue.pop(&topics(&["t"])).await.unwrap().unwrap();
    assert_eq!(first.id, "b");
    assert_eq!(first.body, "y");

    // No remove: the reservation must replay the job.
    let second = queue.pop(&topics(&["t"])).await.unwrap().unwrap();
    assert_eq!(second.id, "b");
    // Redelivery cannot happen before a full TTR has elapsed.
    assert!(unix_now() >= before_first_pop + 2);

    queue.shutdown().await;
}

// A removed (acknowledged) job is never redelivered.
#[tokio::test(flavor = "multi_thread")]
async fn scenario_ack_stops_redelivery() {
    let queue = queue(1);
    queue.start_scanners().await;
    let now = unix_now();

    queue.push(Job::new("k", "t", now, 2, "")).await.unwrap();

    sleep_ms(1500).await;
    let job = queue.pop(&topics(&["t"])).await.unwrap().unwrap();
    assert_eq!(job.id, "k");
    queue.remove("k").await.unwrap();

    // Past the TTR and a scanner sweep: the reservation must be collected,
    // not replayed.
    sleep_ms(4000).await;
    assert_eq!(queue.pop(&topics(&["t"])).await.unwrap(), None);

    let depths = queue.depths(&topics(&["t"])).await.unwrap();
    let indexed: u64 = depths.buckets.iter().map(|(_, n)| n).sum();
    assert_eq!(indexed, 0);

    queue.shutdown().await;
}

// Removing a job before its delay elapses means it is never delivered,
// and the scanner collects the orphaned bucket entry.
#[tokio::test(flavor = "multi_thread")]
async fn scenario_remove_before_due() {
    let queue = queue(1);
    queue.start_scanners().await;
    let now = unix_now();

    queue
        .push(Job::new("c", "t", now + 5, 60, ""))
        .await
        .unwrap();

    sleep_ms(1000).await;
    queue.remove("c").await.unwrap();

    assert_eq!(queue.pop(&topics(&["t"])).await.unwrap(), None);

    // One scanner sweep past the original due time.
    sleep_ms(6000).await;
    assert_eq!(queue.pop(&topics(&["t"])).await.unwrap(), None);

    let depths = queue.depths(&topics(&["t"])).await.unwrap();
    let indexed: u64 = depths.buckets.iter().map(|(_, n)| n).sum();
    assert_eq!(indexed, 0);
    assert_eq!(depths.topics, vec![("t".to_string(), 0)]);

    queue.shutdown().await;
}

// Re-pushing an id with a later delay postpones delivery to the new
// time, and the job is delivered exactly once.
#[tokio::test(flavor = "multi_thread")]
async fn scenario_overwrite_with_later_delay() {
    let queue = queue(1);
    queue.start_scanners().await;
    let now = unix_now();

    queue
        .push(Job::new("d", "t", now + 1, 60, ""))
        .await
        .unwrap();
    queue
        .push(Job::new("d", "t", now + 5, 60, ""))
        .await
        .unwrap();

    // After the first delay but before the second: nothing is deliverable.
    sleep_ms(1000).await;
    assert_eq!(queue.pop(&topics(&["t"])).await.unwrap(), None);

    // After the second delay: delivered exactly once.
    sleep_ms(4500).await;
    let job = queue.pop(&topics(&["t"])).await.unwrap().unwrap();
    assert_eq!(job.id, "d");
    assert_eq!(job.delay, now + 5);
    assert_eq!(queue.pop(&topics(&["t"])).await.unwrap(), None);

    queue.shutdown().await;
}

// Invariant violations are rejected on push.
#[tokio::test]
async fn scenario_invalid_jobs_are_rejected() {
    let queue = queue(1);

    let err = queue.push(Job::new("", "t", 0, 1, "")).await.unwrap_err();
    assert!(matches!(err, DelayQueueError::InvalidJob(_)));

    let err = queue.push(Job::new("e", "t", 0, 0, "")).await.unwrap_err();
    assert!(matches!(err, DelayQueueError::InvalidJob(_)));
}

// Hash routing is deterministic across engine instances.
// fnv32a("abc") = 0x1a47e90b, and 0x1a47e90b mod 3 + 1 = 3.
#[tokio::test]
async fn scenario_hash_routing_is_stable() {
    let first = delayq::BucketRouter::new(Arc::new(Config::default()));
    let second = delayq::BucketRouter::new(Arc::new(Config::default()));

    assert_eq!(first.bucket("abc"), "dq_bucket_3");
    assert_eq!(second.bucket("abc"), "dq_bucket_3");
    assert_eq!(first.bucket("abc"), first.bucket("abc"));
}

// A popped-but-unacknowledged job keeps coming back; each delivery observes
// the same payload (at-least-once, metadata untouched by delivery).
#[tokio::test(flavor = "multi_thread")]
async fn scenario_repeated_redelivery_preserves_payload() {
    let queue = queue(5);
    queue.start_scanners().await;
    let now = unix_now();

    queue
        .push(Job::new("r", "t", now, 1, "payload"))
        .await
        .unwrap();

    for _ in 0..2 {
        let job = queue.pop(&topics(&["t"])).await.unwrap().unwrap();
        assert_eq!(job.id, "r");
        assert_eq!(job.body, "payload");
    }

    queue.remove("r").await.unwrap();
    queue.shutdown().await;
}

// Jobs on different topics are delivered to the consumer listening on
// either topic, whichever list fills first.
#[tokio::test(flavor = "multi_thread")]
async fn scenario_pop_spans_topics() {
    let queue = queue(3);
    queue.start_scanners().await;
    let now = unix_now();

    queue
        .push(Job::new("m1", "emails", now, 60, ""))
        .await
        .unwrap();

    let job = queue
        .pop(&topics(&["orders", "emails"]))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.id, "m1");
    assert_eq!(job.topic, "emails");

    queue.remove("m1").await.unwrap();
    queue.shutdown().await;
}
