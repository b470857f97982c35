//! Delta-state behavior through whole scrapes: first-sample suppression
//! and the documented rounding rule.

mod common;

use common::SharedChain;
use illumex::collectors::{rates::RatesCollector, CollectorRegistry};
use illumex::kstat::{per_tick, ChainHandle, DeltaTracker, Value, KERNEL_UPDATE_NS};

#[test]
fn per_tick_rounding_is_nearest_integer() {
    // (0.5 * 5 + 50) / 5 = 10.5, integer division truncates to 10
    assert_eq!(per_tick(50, 5), 10);
    // plain truncation would say 9 here; the half-tick term rounds up
    assert_eq!(per_tick(48, 5), 10);
    assert_eq!(per_tick(47, 5), 9);
    assert_eq!(per_tick(1, 2), 1);
    assert_eq!(per_tick(0, 100), 0);
}

#[test]
fn tracker_suppresses_until_history_exists() {
    let mut tracker: DeltaTracker<2> = DeltaTracker::new();
    assert!(tracker.update([100, 0], 10).is_none());
    assert_eq!(tracker.update([150, 4], 15), Some([10, 1]));
}

#[test]
fn first_scrape_emits_no_rate_metrics() {
    let chain = SharedChain::new();
    chain.with(|sim| {
        sim.add_record(
            "unix",
            0,
            "sysinfo",
            0,
            &[
                ("updates", Value::U32(100)),
                ("runque", Value::U32(640)),
                ("swpque", Value::U32(0)),
                ("waiting", Value::U32(12)),
            ],
        );
    });
    let mut registry = CollectorRegistry::new(ChainHandle::new(Box::new(chain.clone())), 12);
    registry.register(Box::new(RatesCollector::new()));

    let mut out = String::new();
    registry.scrape(&mut out, true, KERNEL_UPDATE_NS);
    assert!(
        !out.contains("illumex_node_procq"),
        "a bogus delta would be worse than none: {out}"
    );

    // ten kernel ticks later the run-queue accumulator grew by 55
    chain.with(|sim| {
        let id = 1; // the only record
        sim.set_value(id, "updates", Value::U32(110));
        sim.set_value(id, "runque", Value::U32(695));
        sim.set_snaptime(id, 10 * KERNEL_UPDATE_NS);
    });
    let mut out = String::new();
    registry.scrape(&mut out, true, 11 * KERNEL_UPDATE_NS);
    // (0.5 * 10 + 55) / 10 = 6.0 -> 6
    assert!(out.contains("illumex_node_procq_run 6\n"));
    assert!(out.contains("illumex_node_procq_wait 0\n"));
    assert!(out.contains("# TYPE illumex_node_procq_run gauge\n"));
}

#[test]
fn stalled_accumulator_reads_as_zero_rate() {
    let chain = SharedChain::new();
    chain.with(|sim| {
        sim.add_record(
            "unix",
            0,
            "sysinfo",
            0,
            &[
                ("updates", Value::U32(5)),
                ("runque", Value::U32(40)),
                ("swpque", Value::U32(0)),
                ("waiting", Value::U32(0)),
            ],
        );
    });
    let mut registry = CollectorRegistry::new(ChainHandle::new(Box::new(chain.clone())), 12);
    registry.register(Box::new(RatesCollector::new()));

    let mut out = String::new();
    registry.scrape(&mut out, false, KERNEL_UPDATE_NS);

    chain.with(|sim| {
        sim.set_value(1, "updates", Value::U32(8));
        sim.set_snaptime(1, 3 * KERNEL_UPDATE_NS);
    });
    let mut out = String::new();
    registry.scrape(&mut out, false, 4 * KERNEL_UPDATE_NS);
    assert!(out.contains("illumex_node_procq_run 0\n"));
}
