//! Per-conversation ordering and cross-conversation parallelism.

use ai_gate_rust::{ConversationGate, ConversationKey};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tokio_test::{assert_pending, assert_ready};

#[tokio::test(start_paused = true)]
async fn same_key_runs_in_arrival_order() {
    let gate = Arc::new(ConversationGate::new());
    let key = ConversationKey::from_event("C1", Some("1700.1"), None, false);
    let order = Arc::new(Mutex::new(Vec::new()));

    // Hold the key so every task queues behind it.
    let permit = gate.acquire(&key).await;

    let mut handles = Vec::new();
    for i in 0..4 {
        let gate = gate.clone();
        let key = key.clone();
        let order = order.clone();
        handles.push(tokio::spawn(async move {
            gate.with_conversation(&key, || async {
                order.lock().await.push(i);
                // later arrivals must not overtake an in-progress reply
                sleep(Duration::from_millis(10)).await;
            })
            .await
        }));
        // let task i reach the queue before spawning i + 1
        sleep(Duration::from_millis(1)).await;
    }

    assert!(gate.is_busy(&key).await);
    drop(permit);
    join_all(handles).await;

    assert_eq!(*order.lock().await, vec![0, 1, 2, 3]);
    assert!(!gate.is_busy(&key).await);
}

#[tokio::test(start_paused = true)]
async fn different_keys_overlap() {
    let gate = Arc::new(ConversationGate::new());
    let started = Instant::now();

    let tasks = ["C1", "C2", "C3"].map(|channel| {
        let gate = gate.clone();
        tokio::spawn(async move {
            let key = ConversationKey::from_event(channel, None, None, false);
            gate.with_conversation(&key, || sleep(Duration::from_millis(100)))
                .await
        })
    });
    join_all(tasks).await;

    assert!(started.elapsed() < Duration::from_millis(150));
    assert_eq!(gate.len().await, 3);
}

#[tokio::test]
async fn second_acquire_waits_until_first_permit_drops() {
    let gate = ConversationGate::new();
    let key = ConversationKey::from_event("D1", None, Some("U1"), true);

    let first = gate.acquire(&key).await;
    let mut second = tokio_test::task::spawn(gate.acquire(&key));
    assert_pending!(second.poll());

    drop(first);
    assert!(second.is_woken());
    let permit = assert_ready!(second.poll());
    assert_eq!(permit.key(), &key);
}

#[tokio::test]
async fn dm_users_get_separate_conversations() {
    let gate = ConversationGate::new();
    let alice = ConversationKey::from_event("D1", None, Some("UA"), true);
    let bob = ConversationKey::from_event("D1", None, Some("UB"), true);

    let _held = gate.acquire(&alice).await;
    let mut other = tokio_test::task::spawn(gate.acquire(&bob));
    assert_ready!(other.poll());
}
