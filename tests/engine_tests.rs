//! Engine behavior across whole scrapes: instance churn, debounce,
//! retry bounds and the permanent-disable fail-safe.

mod common;

use std::time::{Duration, Instant};

use common::SharedChain;
use illumex::collectors::{cpu::CpuSysCollector, net::NetCollector, CollectorRegistry};
use illumex::config::DetailLevel;
use illumex::kstat::{
    ChainError, ChainHandle, RetryPolicy, Value, KERNEL_UPDATE_NS, MAX_CHAIN_FAILURES,
};

fn cpu_registry(chain: &SharedChain, mp: bool) -> CollectorRegistry {
    let mut registry = CollectorRegistry::new(ChainHandle::new(Box::new(chain.clone())), 12);
    registry.register(Box::new(CpuSysCollector::new(DetailLevel::Normal, mp, 4096)));
    registry
}

#[test]
fn hot_added_strand_appears_on_the_next_scrape() {
    let chain = SharedChain::new();
    chain.with(|sim| {
        sim.add_record("cpu", 0, "sys", 0, &[("syscall", Value::U64(100))]);
    });
    let mut registry = cpu_registry(&chain, true);

    let mut out = String::new();
    registry.scrape(&mut out, false, 1);
    assert!(out.contains("illumex_node_sys_syscall{cpu=\"0\"} 100\n"));
    assert!(!out.contains("cpu=\"1\""));

    chain.with(|sim| {
        sim.add_record("cpu", 1, "sys", 0, &[("syscall", Value::U64(7))]);
    });
    let mut out = String::new();
    registry.scrape(&mut out, false, 2);
    assert!(out.contains("illumex_node_sys_syscall{cpu=\"0\"} 100\n"));
    assert!(out.contains("illumex_node_sys_syscall{cpu=\"1\"} 7\n"));
    assert!(out.contains("illumex_node_sys_syscall{cpu=\"sum\"} 107\n"));
}

#[test]
fn unchanged_generation_never_rescans_the_chain() {
    let chain = SharedChain::new();
    chain.with(|sim| {
        sim.add_record("cpu", 0, "sys", 0, &[("syscall", Value::U64(1))]);
    });
    let mut registry = cpu_registry(&chain, false);

    let mut out = String::new();
    registry.scrape(&mut out, false, 1);
    let walks = chain.with(|sim| sim.walk_count());

    for now in 2..10 {
        let mut out = String::new();
        registry.scrape(&mut out, false, now);
    }
    assert_eq!(
        chain.with(|sim| sim.walk_count()),
        walks,
        "resolution must stay on the O(1) fast path while the generation holds"
    );
}

#[test]
fn offlined_strand_vanishes_from_the_output() {
    let chain = SharedChain::new();
    let first = chain.with(|sim| {
        let id = sim.add_record("cpu", 0, "sys", 0, &[("syscall", Value::U64(100))]);
        sim.add_record("cpu", 1, "sys", 0, &[("syscall", Value::U64(50))]);
        id
    });
    let mut registry = cpu_registry(&chain, true);

    let mut out = String::new();
    registry.scrape(&mut out, false, 1);
    assert!(out.contains("cpu=\"0\""));

    chain.with(|sim| sim.remove_record(first));
    let mut out = String::new();
    registry.scrape(&mut out, false, 2);
    assert!(!out.contains("cpu=\"0\""), "no stale data beyond the new count");
    assert!(out.contains("illumex_node_sys_syscall{cpu=\"1\"} 50\n"));
    assert!(out.contains("illumex_node_sys_syscall{cpu=\"sum\"} 50\n"));
}

#[test]
fn one_record_is_read_once_per_scrape_despite_many_fields() {
    let chain = SharedChain::new();
    chain.with(|sim| {
        sim.add_record(
            "net0",
            0,
            "link",
            1,
            &[
                ("rbytes64", Value::U64(1)),
                ("obytes64", Value::U64(2)),
                ("ipackets64", Value::U64(3)),
                ("opackets64", Value::U64(4)),
                ("ierrors", Value::U64(0)),
                ("oerrors", Value::U64(0)),
                ("ifspeed", Value::U64(10_000_000)),
                ("link_state", Value::U32(1)),
            ],
        );
    });
    let mut registry = CollectorRegistry::new(ChainHandle::new(Box::new(chain.clone())), 12);
    registry.register(Box::new(NetCollector::new(
        DetailLevel::Normal,
        None,
        None,
        4096,
    )));

    // the collector walks 8 series over the record; the debounce must
    // collapse that into one kernel read
    let mut out = String::new();
    registry.scrape(&mut out, false, KERNEL_UPDATE_NS / 2);
    assert!(out.contains("illumex_node_network_receive_bytes{nic=\"net0\"} 1\n"));
    assert_eq!(chain.with(|sim| sim.read_count()), 1);
}

#[test]
fn retry_budget_attempts_and_elapsed_time_are_bounded() {
    let chain = SharedChain::new();
    chain.with(|sim| sim.always_busy());

    let policy = RetryPolicy {
        wait: Duration::from_millis(5),
        timeout: Duration::from_millis(25),
    };
    let mut handle = ChainHandle::with_policy(Box::new(chain.clone()), policy);

    let start = Instant::now();
    let err = handle.open_or_refresh().unwrap_err();
    let elapsed = start.elapsed();

    // timeout/wait sleeps + the initial attempt, not one more, not one less
    assert_eq!(chain.with(|sim| sim.sync_count()), 6);
    match err {
        ChainError::Exhausted { attempts, .. } => assert_eq!(attempts, 6),
        other => panic!("expected Exhausted, got {other:?}"),
    }
    assert!(elapsed >= Duration::from_millis(25));
}

#[test]
fn broken_chain_disables_collectors_permanently() {
    let chain = SharedChain::new();
    chain.with(|sim| {
        sim.add_record("cpu", 0, "sys", 0, &[("syscall", Value::U64(1))]);
        sim.always_busy();
    });

    let policy = RetryPolicy {
        wait: Duration::from_millis(1),
        timeout: Duration::from_millis(2),
    };
    let mut registry =
        CollectorRegistry::new(ChainHandle::with_policy(Box::new(chain.clone()), policy), 12);
    registry.register(Box::new(CpuSysCollector::new(
        DetailLevel::Normal,
        false,
        4096,
    )));

    for _ in 0..=MAX_CHAIN_FAILURES {
        let mut out = String::new();
        registry.scrape(&mut out, false, 1);
    }
    assert!(!registry.is_disabled());
    let mut out = String::new();
    registry.scrape(&mut out, false, 1);
    assert!(registry.is_disabled());

    // even a recovered chain does not resurrect the collectors; the
    // handle was released, only a restart helps
    chain.with(|sim| sim.recover());
    let syncs = chain.with(|sim| sim.sync_count());
    let mut out = String::new();
    registry.scrape(&mut out, false, 2);
    assert!(out.is_empty());
    assert_eq!(chain.with(|sim| sim.sync_count()), syncs);
}
