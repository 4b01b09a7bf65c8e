mod common;

use common::test_helpers::{dm_event, guild_event};
use slashgate::rate_limit::PurgeTask;
use slashgate::{ManualClock, Permissions, RateLimitPolicy, RateLimitRegistry};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::time::Duration;

fn registry_at(start: u64) -> (Arc<RateLimitRegistry>, ManualClock) {
    let clock = ManualClock::new(start);
    (Arc::new(RateLimitRegistry::with_clock(Arc::new(clock.clone()))), clock)
}

#[test]
fn quota_then_limited_then_reset_after_window() {
    let (registry, clock) = registry_at(0);
    let policy = RateLimitPolicy::per_user(4, Duration::from_secs(30)).unwrap();
    let (event, _) = dm_event("roll", 1);

    for call in 0..4 {
        assert_eq!(registry.acquire(&policy, &event), None, "call {call} should pass");
    }
    let remaining = registry.acquire(&policy, &event).expect("fifth call is limited");
    assert!(remaining > Duration::ZERO);
    assert!(remaining <= Duration::from_secs(30));

    clock.advance(Duration::from_secs(30));
    for call in 0..4 {
        assert_eq!(registry.acquire(&policy, &event), None, "call {call} after reset should pass");
    }
    assert!(registry.acquire(&policy, &event).is_some());
}

#[test]
fn buckets_are_isolated_by_command_and_scope_id() {
    let (registry, _clock) = registry_at(0);
    let policy = RateLimitPolicy::per_user(1, Duration::from_secs(60)).unwrap();
    let (a_u1, _) = dm_event("alpha", 1);
    let (b_u1, _) = dm_event("beta", 1);
    let (a_u2, _) = dm_event("alpha", 2);

    assert_eq!(registry.acquire(&policy, &a_u1), None);
    assert!(registry.acquire(&policy, &a_u1).is_some());
    assert_eq!(registry.acquire(&policy, &b_u1), None);
    assert_eq!(registry.acquire(&policy, &a_u2), None);
    assert_eq!(registry.len(), 3);
}

#[test]
fn scopes_never_share_buckets() {
    let (registry, _clock) = registry_at(0);
    let (event, _) = guild_event("alpha", 1, Permissions::empty(), Permissions::empty());
    let window = Duration::from_secs(60);
    for policy in [
        RateLimitPolicy::per_user(1, window).unwrap(),
        RateLimitPolicy::per_channel(1, window).unwrap(),
        RateLimitPolicy::per_guild(1, window).unwrap(),
    ] {
        assert_eq!(registry.acquire(&policy, &event), None);
    }
    assert_eq!(registry.len(), 3);
}

#[test]
fn purge_removes_only_expired_buckets() {
    let (registry, clock) = registry_at(0);
    let short = RateLimitPolicy::per_user(1, Duration::from_secs(5)).unwrap();
    let long = RateLimitPolicy::per_user(1, Duration::from_secs(500)).unwrap();
    registry.acquire_key(&short, "A");
    registry.acquire_key(&long, "B");

    clock.advance(Duration::from_secs(6));
    assert_eq!(registry.purge_expired(), 1);
    let keys: Vec<String> = registry.snapshot().into_iter().map(|b| b.key).collect();
    assert_eq!(keys, vec!["B".to_owned()]);
}

#[test]
fn concurrent_callers_never_exceed_quota() {
    let (registry, _clock) = registry_at(0);
    let policy = RateLimitPolicy::per_user(5, Duration::from_secs(60)).unwrap();
    let admitted = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(100));

    let threads: Vec<_> = (0..100)
        .map(|_| {
            let registry = registry.clone();
            let admitted = admitted.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                barrier.wait();
                if registry.acquire_key(&policy, "U:1:roll").is_none() {
                    admitted.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();
    for t in threads {
        t.join().unwrap();
    }
    assert_eq!(admitted.load(Ordering::SeqCst), 5);
}

#[test]
fn purge_racing_acquire_loses_no_admissions() {
    let (registry, clock) = registry_at(0);
    let policy = RateLimitPolicy::per_user(3, Duration::from_secs(10)).unwrap();
    // Expire a first generation so purge and re-arm contend on the same key.
    registry.acquire_key(&policy, "U:1:roll");
    clock.advance(Duration::from_secs(10));

    let admitted = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(33));
    let mut threads = Vec::new();
    for _ in 0..32 {
        let registry = registry.clone();
        let admitted = admitted.clone();
        let barrier = barrier.clone();
        threads.push(std::thread::spawn(move || {
            barrier.wait();
            if registry.acquire_key(&policy, "U:1:roll").is_none() {
                admitted.fetch_add(1, Ordering::SeqCst);
            }
        }));
    }
    let purger = {
        let registry = registry.clone();
        let barrier = barrier.clone();
        std::thread::spawn(move || {
            barrier.wait();
            for _ in 0..50 {
                registry.purge_expired();
            }
        })
    };
    for t in threads {
        t.join().unwrap();
    }
    purger.join().unwrap();

    // Time is frozen inside the new window, so a re-armed bucket is never
    // purged and exactly one window's quota is admitted.
    assert_eq!(admitted.load(Ordering::SeqCst), 3);
    assert!(registry.contains_key("U:1:roll"));
}

#[tokio::test(start_paused = true)]
async fn purge_task_keeps_running_on_schedule() {
    let (registry, clock) = registry_at(0);
    let policy = RateLimitPolicy::per_user(1, Duration::from_secs(1)).unwrap();
    let runtime = tokio::runtime::Handle::current();
    let _task = PurgeTask::spawn(&runtime, &registry, Duration::from_secs(600));

    registry.acquire_key(&policy, "first");
    clock.advance(Duration::from_secs(2));
    tokio::time::sleep(Duration::from_secs(601)).await;
    assert!(registry.is_empty());

    registry.acquire_key(&policy, "second");
    clock.advance(Duration::from_secs(2));
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert!(registry.is_empty());
}
