//! Integration tests for the priority queue and its heap.

use std::sync::Arc;
use std::time::Duration;

use admitq::model::*;
use admitq::queue::{PriorityQueue, WorkHeap};
use chrono::{TimeDelta, Utc};
use proptest::prelude::*;

fn item(id: &str, priority: u8) -> WorkItem {
    NewWorkItem::new(id).priority(priority).into_item(Utc::now())
}

// ---------------------------------------------------------------------------
// Ordering
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dequeue_returns_most_urgent_first() {
    let queue = PriorityQueue::new();
    for (id, p) in [("a", 5), ("b", 1), ("c", 50)] {
        assert!(queue.enqueue(item(id, p)).await);
    }

    let order: Vec<u8> = [
        queue.dequeue().await.unwrap().priority,
        queue.dequeue().await.unwrap().priority,
        queue.dequeue().await.unwrap().priority,
    ]
    .to_vec();
    assert_eq!(order, vec![1, 5, 50]);
    assert!(queue.dequeue().await.is_none());
}

#[tokio::test]
async fn duplicate_id_is_ignored() {
    let queue = PriorityQueue::new();
    assert!(queue.enqueue(item("a", 40)).await);
    assert!(!queue.enqueue(item("a", 1)).await);
    assert_eq!(queue.len(), 1);
    assert_eq!(queue.peek().unwrap().priority, 40);
}

#[tokio::test]
async fn claim_skips_claimed_items_in_priority_order() {
    let queue = PriorityQueue::new();
    for (id, p) in [("low", 80), ("urgent", 2), ("mid", 40)] {
        queue.enqueue(item(id, p)).await;
    }

    assert_eq!(queue.claim("w1").await.unwrap().id.as_str(), "urgent");
    assert_eq!(queue.claim("w2").await.unwrap().id.as_str(), "mid");
    assert_eq!(queue.claim("w3").await.unwrap().id.as_str(), "low");
    assert!(queue.claim("w4").await.is_none());
    assert_eq!(queue.len(), 3);
}

#[test]
fn equal_priority_claims_oldest_first() {
    let now = Utc::now();
    let mut heap = WorkHeap::new();
    heap.push(NewWorkItem::new("newer").priority(10).into_item(now));
    heap.push(
        NewWorkItem::new("older")
            .priority(10)
            .into_item(now - TimeDelta::seconds(5)),
    );

    assert_eq!(heap.claim("w1", now).unwrap().id.as_str(), "older");
    assert_eq!(heap.claim("w2", now).unwrap().id.as_str(), "newer");
}

// ---------------------------------------------------------------------------
// Claim / release protocol
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrent_claims_never_share_an_item() {
    let queue = Arc::new(PriorityQueue::new());
    for n in 0..50 {
        queue.enqueue(item(&format!("item-{n}"), (n % 100) as u8)).await;
    }

    let mut handles = Vec::new();
    for w in 0..10 {
        let queue = Arc::clone(&queue);
        handles.push(tokio::spawn(async move {
            let mut got = Vec::new();
            while let Some(item) = queue.claim(&format!("w{w}")).await {
                got.push(item.id);
            }
            got
        }));
    }

    let mut claimed = Vec::new();
    for h in handles {
        claimed.extend(h.await.unwrap());
    }
    claimed.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    let before = claimed.len();
    claimed.dedup();
    assert_eq!(before, 50);
    assert_eq!(claimed.len(), 50, "an item was claimed twice");
    assert!(queue.check_invariants().is_ok());
}

#[tokio::test]
async fn successful_release_removes_item() {
    let queue = PriorityQueue::new();
    queue.enqueue(item("a", 10)).await;
    queue.enqueue(item("b", 20)).await;
    let claimed = queue.claim("w1").await.unwrap();

    let done = queue.release(&claimed.id, true).await.unwrap();
    assert_eq!(done.id.as_str(), "a");
    assert!(queue.get(&claimed.id).is_none());
    assert_eq!(queue.len(), 1);
}

#[tokio::test]
async fn failed_release_degrades_and_unclaims() {
    let queue = PriorityQueue::new();
    queue.enqueue(item("near-cap", 95)).await;
    let claimed = queue.claim("w1").await.unwrap();

    let after = queue.release(&claimed.id, false).await.unwrap();
    assert_eq!(after.priority, MAX_PRIORITY);
    assert!(!after.is_claimed());
    assert_eq!(queue.get(&claimed.id).unwrap().priority, MAX_PRIORITY);
}

#[tokio::test]
async fn unknown_ids_are_noops() {
    let queue = PriorityQueue::new();
    queue.enqueue(item("a", 10)).await;
    let ghost = WorkId::from("ghost");

    assert!(queue.release(&ghost, true).await.is_none());
    assert!(queue.release(&ghost, false).await.is_none());
    assert!(!queue.update_priority(&ghost, 1).await);
    assert!(queue.remove(&ghost).await.is_none());
    assert_eq!(queue.len(), 1);
}

#[tokio::test]
async fn update_priority_moves_item_both_ways() {
    let queue = PriorityQueue::new();
    for (id, p) in [("a", 10), ("b", 20), ("c", 30)] {
        queue.enqueue(item(id, p)).await;
    }

    assert!(queue.update_priority(&WorkId::from("c"), 1).await);
    assert_eq!(queue.peek().unwrap().id.as_str(), "c");

    assert!(queue.update_priority(&WorkId::from("c"), 250).await);
    assert_eq!(queue.get(&WorkId::from("c")).unwrap().priority, MAX_PRIORITY);
    assert_eq!(queue.peek().unwrap().id.as_str(), "a");
    assert!(queue.check_invariants().is_ok());
}

#[tokio::test]
async fn remove_works_on_claimed_items() {
    let queue = PriorityQueue::new();
    queue.enqueue(item("a", 10)).await;
    queue.enqueue(item("b", 20)).await;
    let claimed = queue.claim("w1").await.unwrap();

    assert!(queue.remove(&claimed.id).await.is_some());
    assert_eq!(queue.len(), 1);
    assert_eq!(queue.peek().unwrap().id.as_str(), "b");
}

// ---------------------------------------------------------------------------
// Stale recovery and purge
// ---------------------------------------------------------------------------

#[test]
fn clear_stale_releases_only_claims_older_than_max_age() {
    let now = Utc::now();
    let mut heap = WorkHeap::new();
    heap.push(NewWorkItem::new("a").priority(10).into_item(now));
    heap.claim("w1", now - TimeDelta::milliseconds(5_000));

    // max_age >= claim age: untouched
    assert!(heap.clear_stale(Duration::from_millis(5_000), now).is_empty());
    assert!(heap.get(&WorkId::from("a")).unwrap().is_claimed());

    // max_age < claim age: claim cleared, item kept
    let cleared = heap.clear_stale(Duration::from_millis(4_999), now);
    assert_eq!(cleared, vec![WorkId::from("a")]);
    let a = heap.get(&WorkId::from("a")).unwrap();
    assert!(!a.is_claimed());
    assert_eq!(a.claimed_by(), None);
    assert_eq!(a.claimed_at(), None);
    assert_eq!(heap.len(), 1);
}

#[tokio::test]
async fn queue_clear_stale_counts_released_claims() {
    let queue = PriorityQueue::new();
    queue.enqueue(item("a", 10)).await;
    queue.enqueue(item("b", 20)).await;
    queue.claim("w1").await;
    queue.claim("w2").await;

    assert_eq!(queue.clear_stale(Duration::from_secs(60)).await, 0);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(queue.clear_stale(Duration::from_millis(1)).await, 2);
    assert!(queue.snapshot().iter().all(|i| !i.is_claimed()));
}

#[test]
fn purge_leaves_claimed_and_urgent_items() {
    let now = Utc::now();
    let mut heap = WorkHeap::new();
    heap.push(NewWorkItem::new("claimed-80").priority(80).into_item(now));
    heap.claim("w1", now);
    for (id, p) in [("p10", 10), ("p70", 70), ("p95", 95)] {
        heap.push(NewWorkItem::new(id).priority(p).into_item(now));
    }

    let mut purged: Vec<String> = heap
        .purge_unclaimed_above(60)
        .into_iter()
        .map(|i| i.id.to_string())
        .collect();
    purged.sort();

    assert_eq!(purged, vec!["p70", "p95"]);
    assert!(heap.contains(&WorkId::from("p10")));
    assert!(heap.contains(&WorkId::from("claimed-80")));
    assert!(heap.check_invariants().is_ok());
}

// ---------------------------------------------------------------------------
// End to end
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_item_is_reclaimed_with_penalty() {
    let queue = PriorityQueue::new();
    queue.enqueue(item("A", 20)).await;

    let first = queue.claim("w1").await.unwrap();
    assert_eq!(first.claimed_by(), Some("w1"));
    assert_eq!(first.attempts, 1);

    queue.release(&first.id, false).await;
    let requeued = queue.get(&first.id).unwrap();
    assert_eq!(requeued.priority, 30);
    assert!(!requeued.is_claimed());

    let second = queue.claim("w2").await.unwrap();
    assert_eq!(second.id.as_str(), "A");
    assert_eq!(second.claimed_by(), Some("w2"));
    assert_eq!(second.attempts, 2);
}

// ---------------------------------------------------------------------------
// Heap invariants under arbitrary operation sequences
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Op {
    Push(u8),
    Pop,
    Claim,
    Release(usize, bool),
    Update(usize, u8),
    Remove(usize),
    Purge(u8),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => any::<u8>().prop_map(Op::Push),
        1 => Just(Op::Pop),
        2 => Just(Op::Claim),
        2 => (any::<usize>(), any::<bool>()).prop_map(|(i, ok)| Op::Release(i, ok)),
        2 => (any::<usize>(), any::<u8>()).prop_map(|(i, p)| Op::Update(i, p)),
        1 => any::<usize>().prop_map(Op::Remove),
        1 => (0u8..100).prop_map(Op::Purge),
    ]
}

proptest! {
    #[test]
    fn heap_and_index_stay_consistent(ops in prop::collection::vec(op(), 1..200)) {
        let now = Utc::now();
        let mut heap = WorkHeap::new();
        let mut next = 0u32;

        for op in ops {
            // Pick an existing id by position so most operations hit.
            let pick = |heap: &WorkHeap, i: usize| -> Option<WorkId> {
                let items = heap.items();
                (!items.is_empty()).then(|| items[i % items.len()].id.clone())
            };
            match op {
                Op::Push(p) => {
                    next += 1;
                    heap.push(NewWorkItem::new(format!("i{next}")).priority(p).into_item(now));
                }
                Op::Pop => { heap.pop(); }
                Op::Claim => { heap.claim("w", now); }
                Op::Release(i, ok) => {
                    if let Some(id) = pick(&heap, i) { heap.release(&id, ok); }
                }
                Op::Update(i, p) => {
                    if let Some(id) = pick(&heap, i) { heap.update_priority(&id, p); }
                }
                Op::Remove(i) => {
                    if let Some(id) = pick(&heap, i) { heap.remove(&id); }
                }
                Op::Purge(max) => { heap.purge_unclaimed_above(max); }
            }
            prop_assert!(heap.check_invariants().is_ok(), "{:?}", heap.check_invariants());
            prop_assert!(heap.items().iter().all(|i| i.priority <= MAX_PRIORITY));
        }
    }

    #[test]
    fn claims_come_out_in_priority_order(priorities in prop::collection::vec(0u8..=99, 1..60)) {
        let now = Utc::now();
        let mut heap = WorkHeap::new();
        for (n, p) in priorities.iter().enumerate() {
            heap.push(NewWorkItem::new(format!("i{n}")).priority(*p).into_item(now));
        }

        let mut claimed = Vec::new();
        while let Some(item) = heap.claim("w", now) {
            claimed.push(item.priority);
        }
        let mut sorted = priorities.clone();
        sorted.sort_unstable();
        prop_assert_eq!(claimed, sorted);
    }
}
