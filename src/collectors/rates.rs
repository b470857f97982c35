//! Scheduler-queue and swap-space averages (`unix:0:sysinfo`,
//! `unix:0:vminfo`).
//!
//! Both providers are accumulators the kernel adds to once per update tick;
//! a single read says nothing. The delta trackers keep the previous scrape's
//! raw values and emit the per-tick average between the two scrapes, using
//! the provider's own `updates` counter as the tick count. The first scrape
//! after start has no history and emits nothing for these groups.

use crate::kstat::{DeltaTracker, InstanceCache, RecordId, RecordSelector, Sample};
use crate::render::{MetricKind, Num};

use super::{Collector, ScrapeContext};

const PROCQ_FIELDS: [&str; 3] = ["runque", "swpque", "waiting"];
const PROCQ_METRICS: [(&str, &str); 3] = [
    (
        "illumex_node_procq_run",
        "Average number of runnable threads on the run queue.",
    ),
    (
        "illumex_node_procq_swap",
        "Average number of swapped-out threads wanting in.",
    ),
    (
        "illumex_node_procq_wait",
        "Average number of threads waiting for I/O.",
    ),
];

const SWAP_FIELDS: [&str; 5] = [
    "freemem",
    "swap_resv",
    "swap_alloc",
    "swap_avail",
    "swap_free",
];
const SWAP_METRICS: [(&str, &str); 5] = [
    (
        "illumex_node_mem_free_avg",
        "Average free memory in bytes over the last kernel update ticks.",
    ),
    (
        "illumex_node_swap_resv",
        "Average reserved swap in bytes over the last kernel update ticks.",
    ),
    (
        "illumex_node_swap_alloc",
        "Average allocated swap in bytes over the last kernel update ticks.",
    ),
    (
        "illumex_node_swap_avail",
        "Average swap in bytes available for reservation over the last kernel update ticks.",
    ),
    (
        "illumex_node_swap_free",
        "Average unallocated swap in bytes over the last kernel update ticks.",
    ),
];

pub struct RatesCollector {
    sysinfo_cache: InstanceCache,
    vminfo_cache: InstanceCache,
    procq: DeltaTracker<3>,
    swap: DeltaTracker<5>,
}

impl Default for RatesCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl RatesCollector {
    pub fn new() -> Self {
        Self {
            sysinfo_cache: InstanceCache::new(RecordSelector::new(
                Some("unix"),
                Some(0),
                Some("sysinfo"),
            )),
            vminfo_cache: InstanceCache::new(RecordSelector::new(
                Some("unix"),
                Some(0),
                Some("vminfo"),
            )),
            procq: DeltaTracker::new(),
            swap: DeltaTracker::new(),
        }
    }

    fn raw<const N: usize>(sample: &Sample, fields: &[&str; N]) -> Option<([u64; N], u64)> {
        let mut raw = [0u64; N];
        for (k, name) in fields.iter().enumerate() {
            raw[k] = sample.value_u64(name)?;
        }
        let ticks = sample.value_u64("updates")?;
        Some((raw, ticks))
    }
}

impl Collector for RatesCollector {
    fn name(&self) -> &'static str {
        "rates"
    }

    fn collect(&mut self, cx: &mut ScrapeContext<'_>) {
        // scheduler queues
        if self.sysinfo_cache.resolve(&*cx.chain) == 1 {
            let id = self.sysinfo_cache.records()[0].id;
            let raw = cx
                .reader
                .read(&mut *cx.chain, id, cx.now)
                .and_then(|s| Self::raw(s, &PROCQ_FIELDS));
            if let Some((raw, ticks)) = raw {
                if let Some(rates) = self.procq.update(raw, ticks) {
                    for (k, &(metric, desc)) in PROCQ_METRICS.iter().enumerate() {
                        cx.writer.help(metric, MetricKind::Gauge, desc);
                        cx.writer.sample(metric, &[], Num::U(rates[k]));
                    }
                }
            } else {
                self.procq.reset();
            }
        } else {
            // the provider went away; whatever history exists is stale
            self.procq.reset();
        }

        // memory / swap space
        if self.vminfo_cache.resolve(&*cx.chain) == 1 {
            let id = self.vminfo_cache.records()[0].id;
            let raw = cx
                .reader
                .read(&mut *cx.chain, id, cx.now)
                .and_then(|s| Self::raw(s, &SWAP_FIELDS));
            if let Some((raw, ticks)) = raw {
                if let Some(rates) = self.swap.update(raw, ticks) {
                    for (k, &(metric, desc)) in SWAP_METRICS.iter().enumerate() {
                        cx.writer.help(metric, MetricKind::Gauge, desc);
                        cx.writer
                            .sample(metric, &[], Num::U(rates[k] << cx.page_shift));
                    }
                }
            } else {
                self.swap.reset();
            }
        } else {
            self.swap.reset();
        }
    }

    fn record_ids(&self, out: &mut Vec<RecordId>) {
        out.extend(self.sysinfo_cache.records().iter().map(|r| r.id));
        out.extend(self.vminfo_cache.records().iter().map(|r| r.id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kstat::sim::SimChain;
    use crate::kstat::{SampleReader, Value, KERNEL_UPDATE_NS};
    use crate::render::MetricWriter;

    fn scrape(sim: &mut SimChain, collector: &mut RatesCollector, now: i64) -> String {
        let mut out = String::new();
        let mut reader = SampleReader::new();
        let mut cx = ScrapeContext {
            chain: sim,
            reader: &mut reader,
            writer: MetricWriter::new(&mut out, true),
            now,
            page_shift: 12,
        };
        collector.collect(&mut cx);
        out
    }

    fn sysinfo_values(updates: u32, runque: u32) -> Vec<(&'static str, Value)> {
        vec![
            ("updates", Value::U32(updates)),
            ("runque", Value::U32(runque)),
            ("swpque", Value::U32(0)),
            ("waiting", Value::U32(0)),
        ]
    }

    #[test]
    fn first_scrape_is_suppressed_second_emits_averages() {
        let mut sim = SimChain::new();
        let id = sim.add_record("unix", 0, "sysinfo", 0, &sysinfo_values(10, 100));

        let mut collector = RatesCollector::new();
        let out = scrape(&mut sim, &mut collector, KERNEL_UPDATE_NS);
        assert!(out.is_empty(), "no history yet, nothing to emit");

        // five kernel ticks later the queue accumulator grew by 50
        for (name, value) in sysinfo_values(15, 150) {
            sim.set_value(id, name, value);
        }
        sim.set_snaptime(id, 5 * KERNEL_UPDATE_NS);
        let out = scrape(&mut sim, &mut collector, 6 * KERNEL_UPDATE_NS);
        // (0.5 * 5 + 50) / 5 = 10.5, truncated
        assert!(out.contains("illumex_node_procq_run 10\n"));
        assert!(out.contains("illumex_node_procq_swap 0\n"));
        assert!(out.contains("illumex_node_procq_wait 0\n"));
    }

    #[test]
    fn swap_averages_are_page_shifted() {
        let mut sim = SimChain::new();
        let values = |updates: u64, resv: u64| {
            vec![
                ("updates", Value::U64(updates)),
                ("freemem", Value::U64(0)),
                ("swap_resv", Value::U64(resv)),
                ("swap_alloc", Value::U64(0)),
                ("swap_avail", Value::U64(0)),
                ("swap_free", Value::U64(0)),
            ]
        };
        let id = sim.add_record("unix", 0, "vminfo", 0, &values(1, 100));

        let mut collector = RatesCollector::new();
        assert!(scrape(&mut sim, &mut collector, KERNEL_UPDATE_NS).is_empty());

        for (name, value) in values(2, 300) {
            sim.set_value(id, name, value);
        }
        sim.set_snaptime(id, KERNEL_UPDATE_NS);
        let out = scrape(&mut sim, &mut collector, 2 * KERNEL_UPDATE_NS);
        // delta 200 over 1 tick, rounded: 200, then pages -> bytes
        assert!(out.contains("illumex_node_swap_resv 819200\n"));
    }

    #[test]
    fn vanishing_provider_resets_the_history() {
        let mut sim = SimChain::new();
        let id = sim.add_record("unix", 0, "sysinfo", 0, &sysinfo_values(10, 100));

        let mut collector = RatesCollector::new();
        scrape(&mut sim, &mut collector, KERNEL_UPDATE_NS);

        sim.remove_record(id);
        assert!(scrape(&mut sim, &mut collector, 2 * KERNEL_UPDATE_NS).is_empty());

        // record comes back: history must not bridge the discontinuity
        sim.add_record("unix", 0, "sysinfo", 0, &sysinfo_values(20, 500));
        let out = scrape(&mut sim, &mut collector, 3 * KERNEL_UPDATE_NS);
        assert!(out.is_empty(), "first sample after discontinuity is suppressed");
    }
}
