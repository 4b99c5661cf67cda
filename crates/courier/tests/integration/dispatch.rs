/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Outbox dispatch end to end: store, router, coordinator and transports.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use courier::config::CourierConfig;
use courier::transport::{InMemoryLogClient, LogTransport};
use courier::{
    BucketOutcome, InMemoryOutboxStore, NodeBuilder, OutboxStatus, PartitionRouter,
};

use crate::fixtures::{append, dispatcher, key_per_bucket, QueueHarness};

#[tokio::test]
async fn test_same_key_events_share_a_channel_in_id_order() {
    let store = Arc::new(InMemoryOutboxStore::new());
    let mut harness = QueueHarness::new(2);
    let first = append(&store, "A").await;
    let second = append(&store, "A").await;
    let third = append(&store, "B").await;

    let dispatcher = dispatcher(
        store.clone(),
        harness.transport.clone(),
        100,
        Duration::from_secs(5),
    );
    let outcome = dispatcher.dispatch_next_batch(100).await.unwrap();
    assert!(outcome.is_complete());
    assert_eq!(outcome.sent_count(), 3);

    let mut expected: BTreeMap<usize, Vec<i64>> = BTreeMap::new();
    for (id, key) in [(first, "A"), (second, "A"), (third, "B")] {
        expected
            .entry(PartitionRouter::route(key, 2))
            .or_default()
            .push(id);
    }
    for bucket in 0..2 {
        assert_eq!(
            harness.received(bucket),
            expected.get(&bucket).cloned().unwrap_or_default(),
            "bucket {}",
            bucket
        );
    }

    for event in store.events() {
        assert_eq!(event.status, OutboxStatus::Sent);
        assert!(event.sent_at.is_some());
    }
}

#[tokio::test]
async fn test_per_key_order_holds_across_cycles() {
    let store = Arc::new(InMemoryOutboxStore::new());
    let client = Arc::new(InMemoryLogClient::new(3));
    let transport = Arc::new(LogTransport::new(client.clone(), 3).with_max_in_flight(4));
    let dispatcher = dispatcher(store.clone(), transport, 3, Duration::from_secs(5));

    let keys = ["loan-1", "loan-2", "loan-3", "loan-4"];
    let mut appended: BTreeMap<&str, Vec<i64>> = BTreeMap::new();

    // Producers keep appending between small batches.
    for round in 0..5 {
        for key in keys.iter().skip(round % 2) {
            appended.entry(*key).or_default().push(append(&store, key).await);
        }
        dispatcher.dispatch_next_batch(3).await.unwrap();
    }
    while !dispatcher.dispatch_next_batch(3).await.unwrap().is_empty() {}

    assert_eq!(dispatcher.pending_count().await.unwrap(), 0);
    for key in keys {
        let partition = PartitionRouter::route(key, 3);
        let delivered: Vec<i64> = client
            .partition(partition)
            .into_iter()
            .filter(|message| message.routing_key == key)
            .map(|message| message.event_id)
            .collect();
        assert_eq!(&delivered, &appended[key], "key {}", key);
    }
}

#[tokio::test]
async fn test_failed_channel_keeps_events_pending_until_it_recovers() {
    let store = Arc::new(InMemoryOutboxStore::new());
    let mut harness = QueueHarness::new(2);
    let keys = key_per_bucket(2);

    let healthy = append(&store, &keys[0]).await;
    let blocked = append(&store, &keys[1]).await;
    harness.queues[1].set_failing();

    let dispatcher = dispatcher(
        store.clone(),
        harness.transport.clone(),
        100,
        Duration::from_secs(5),
    );
    let outcome = dispatcher.dispatch_next_batch(100).await.unwrap();

    assert!(!outcome.is_complete());
    assert_eq!(outcome.sent_event_ids(), vec![healthy]);
    let failed: Vec<usize> = outcome.unsent_buckets().map(|b| b.bucket).collect();
    assert_eq!(failed, vec![1]);

    // The other bucket of the same cycle is unaffected.
    assert_eq!(store.get(healthy).unwrap().status, OutboxStatus::Sent);
    assert_eq!(store.get(blocked).unwrap().status, OutboxStatus::Pending);
    assert!(store.get(blocked).unwrap().sent_at.is_none());

    // Retried on every cycle while the channel is down.
    let outcome = dispatcher.dispatch_next_batch(100).await.unwrap();
    assert_eq!(outcome.fetched, 1);
    assert_eq!(store.get(blocked).unwrap().status, OutboxStatus::Pending);

    harness.queues[1].recover();
    let outcome = dispatcher.dispatch_next_batch(100).await.unwrap();
    assert!(outcome.is_complete());
    assert_eq!(store.get(blocked).unwrap().status, OutboxStatus::Sent);

    assert_eq!(harness.received(0), vec![healthy]);
    assert_eq!(harness.received(1), vec![blocked]);
    assert!(dispatcher.dispatch_next_batch(100).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_slow_channel_times_out_without_holding_back_others() {
    let store = Arc::new(InMemoryOutboxStore::new());
    let mut harness = QueueHarness::new(2);
    let keys = key_per_bucket(2);

    let fast = append(&store, &keys[0]).await;
    let slow = append(&store, &keys[1]).await;
    harness.queues[1].set_send_delay(Some(Duration::from_millis(500)));

    let dispatcher = dispatcher(
        store.clone(),
        harness.transport.clone(),
        100,
        Duration::from_millis(50),
    );

    let started = Instant::now();
    let outcome = dispatcher.dispatch_next_batch(100).await.unwrap();
    assert!(started.elapsed() < Duration::from_millis(400));

    let outcomes: BTreeMap<usize, &BucketOutcome> = outcome
        .buckets
        .iter()
        .map(|report| (report.bucket, &report.outcome))
        .collect();
    assert_eq!(outcomes[&0], &BucketOutcome::Delivered);
    assert_eq!(outcomes[&1], &BucketOutcome::TimedOut);
    assert_eq!(store.get(fast).unwrap().status, OutboxStatus::Sent);
    assert_eq!(store.get(slow).unwrap().status, OutboxStatus::Pending);

    // The abandoned send still lands; the event is delivered again next
    // cycle because it was never marked sent.
    harness.queues[1].set_send_delay(None);
    tokio::time::sleep(Duration::from_millis(600)).await;
    let outcome = dispatcher.dispatch_next_batch(100).await.unwrap();
    assert!(outcome.is_complete());
    assert_eq!(harness.received(1), vec![slow, slow]);
}

#[tokio::test]
async fn test_node_dispatch_loop_delivers_recorded_events() {
    let mut config = CourierConfig::default();
    config.transport.log.enabled = true;
    config.dispatch.channel_count = 2;
    config.dispatch.poll_interval_ms = 20;
    config.events.types.insert("ClientCreateBusinessEvent".to_string(), false);

    let store = Arc::new(InMemoryOutboxStore::new());
    let client = Arc::new(InMemoryLogClient::new(2));
    let node = NodeBuilder::new(config)
        .outbox_store(store.clone())
        .log_client(client.clone())
        .build()
        .unwrap();
    let handle = node.spawn_dispatcher().unwrap();

    let recorder = node.recorder().unwrap();
    for i in 0..5 {
        recorder
            .record("LoanApprovedBusinessEvent", &format!("loan-{}", i), Vec::new())
            .await
            .unwrap();
    }
    let dropped = recorder
        .record("ClientCreateBusinessEvent", "client-1", Vec::new())
        .await
        .unwrap();
    assert!(dropped.is_none());

    let deadline = Instant::now() + Duration::from_secs(5);
    while store.events().iter().any(|e| e.is_pending()) {
        assert!(Instant::now() < deadline, "events were not dispatched");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(store.events().len(), 5);
    assert_eq!(
        client.partition_event_ids(0).len() + client.partition_event_ids(1).len(),
        5
    );

    node.shutdown();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
}
