use std::collections::HashMap;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use proptest::prelude::*;
use regpush_core::{Error, GateStats, RateGate};

/// Poll the gate until `cond` holds; panics after five seconds.
fn wait_for(gate: &RateGate, cond: impl Fn(&GateStats) -> bool) -> GateStats {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let stats = gate.stats();
        if cond(&stats) {
            return stats;
        }
        assert!(Instant::now() < deadline, "gate never reached state: {stats:?}");
        thread::sleep(Duration::from_millis(2));
    }
}

fn tally(windows: impl IntoIterator<Item = u64>) -> HashMap<u64, u32> {
    let mut per_window = HashMap::new();
    for w in windows {
        *per_window.entry(w).or_insert(0) += 1;
    }
    per_window
}

#[test]
fn three_per_second_with_seven_callers() {
    let started = Instant::now();
    let gate = Arc::new(RateGate::new(3, Duration::from_secs(1)).unwrap());
    let barrier = Arc::new(Barrier::new(7));

    let handles: Vec<_> = (0..7)
        .map(|_| {
            let gate = Arc::clone(&gate);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let admission = gate.acquire().unwrap();
                (admission.window, started.elapsed())
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let first: Vec<_> = results.iter().filter(|(w, _)| *w == 0).collect();
    assert_eq!(first.len(), 3);

    let later: Vec<_> = results.iter().filter(|(w, _)| *w >= 1).collect();
    assert_eq!(later.len(), 4);
    for (_, elapsed) in later {
        assert!(*elapsed >= Duration::from_secs(1), "admitted early at {elapsed:?}");
    }

    assert!(tally(results.iter().map(|(w, _)| *w)).values().all(|&n| n <= 3));
}

#[test]
fn limit_plus_k_callers_admit_exactly_limit_before_reset() {
    let gate = Arc::new(RateGate::new(4, Duration::from_secs(60)).unwrap());

    let handles: Vec<_> = (0..7)
        .map(|_| {
            let gate = Arc::clone(&gate);
            thread::spawn(move || gate.acquire())
        })
        .collect();

    let stats = wait_for(&gate, |s| s.waiting == 3);
    assert_eq!(stats.in_window, 4);
    assert_eq!(stats.total_admitted, 4);

    gate.shutdown();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let admitted = results.iter().filter(|r| matches!(r, Ok(a) if a.window == 0)).count();
    let closed = results.iter().filter(|r| matches!(r, Err(Error::Closed))).count();
    assert_eq!(admitted, 4);
    assert_eq!(closed, 3);
}

#[test]
fn zero_limit_blocks_until_shutdown() {
    let gate = Arc::new(RateGate::new(0, Duration::from_millis(20)).unwrap());

    let handles: Vec<_> = (0..3)
        .map(|_| {
            let gate = Arc::clone(&gate);
            thread::spawn(move || gate.acquire())
        })
        .collect();

    wait_for(&gate, |s| s.waiting == 3);
    // several resets go by without admitting anyone
    wait_for(&gate, |s| s.window_index >= 3);
    assert_eq!(gate.stats().total_admitted, 0);

    gate.shutdown();
    for h in handles {
        assert!(matches!(h.join().unwrap(), Err(Error::Closed)));
    }
    assert_eq!(gate.stats().waiting, 0);
}

#[test]
fn reset_restores_full_capacity() {
    let gate = RateGate::new(2, Duration::from_millis(300)).unwrap();
    gate.acquire().unwrap();
    gate.acquire().unwrap();
    assert_eq!(gate.try_acquire().unwrap(), None);

    wait_for(&gate, |s| s.window_index >= 1);
    let a = gate.try_acquire().unwrap().expect("room after reset");
    let b = gate.try_acquire().unwrap().expect("room after reset");
    assert!(a.window >= 1 && b.window >= 1);
}

#[test]
fn blocked_callers_wake_on_reset() {
    let gate = Arc::new(RateGate::new(1, Duration::from_millis(100)).unwrap());
    gate.acquire().unwrap();

    let waiter = {
        let gate = Arc::clone(&gate);
        thread::spawn(move || gate.acquire())
    };
    let admission = waiter.join().unwrap().unwrap();
    assert!(admission.window >= 1);
}

#[test]
fn sustained_contention_respects_the_bound() {
    let gate = Arc::new(RateGate::new(5, Duration::from_millis(30)).unwrap());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let gate = Arc::clone(&gate);
            thread::spawn(move || {
                (0..5)
                    .map(|_| gate.acquire().unwrap().window)
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let windows: Vec<u64> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    assert_eq!(windows.len(), 40);
    assert!(tally(windows).values().all(|&n| n <= 5));
    assert_eq!(gate.stats().total_admitted, 40);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn never_more_than_limit_per_window(
        limit in 1u32..4,
        extra in 1usize..5,
        delays in prop::collection::vec(0u64..15, 8),
    ) {
        let gate = Arc::new(RateGate::new(limit, Duration::from_millis(40)).unwrap());
        let callers = limit as usize + extra;

        let handles: Vec<_> = (0..callers)
            .map(|i| {
                let gate = Arc::clone(&gate);
                let delay = Duration::from_millis(delays[i]);
                thread::spawn(move || {
                    thread::sleep(delay);
                    gate.acquire().unwrap().window
                })
            })
            .collect();

        let per_window = tally(handles.into_iter().map(|h| h.join().unwrap()));
        prop_assert!(per_window.values().all(|&n| n <= limit), "{:?}", per_window);
        prop_assert_eq!(per_window.values().sum::<u32>() as usize, callers);
    }
}
