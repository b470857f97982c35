//! Load averages, CPU counts, process count and boot time
//! (`unix:0:system_misc`).

use crate::kstat::{InstanceCache, RecordId, RecordSelector, Sample};
use crate::render::{MetricKind, Num};

use super::{Collector, ScrapeContext};

/// Fixed-point scale of the kernel's avenrun values.
const FSCALE: f64 = 256.0;

pub struct LoadCollector {
    cache: InstanceCache,
    /// Configured strand count of the system, for the offline derivation.
    cpu_total: Option<u32>,
}

impl LoadCollector {
    pub fn new(cpu_total: Option<u32>) -> Self {
        Self {
            cache: InstanceCache::new(RecordSelector::new(
                Some("unix"),
                Some(0),
                Some("system_misc"),
            )),
            cpu_total,
        }
    }

    fn load_values(sample: &Sample) -> [Option<f64>; 3] {
        let scaled =
            |name: &str| sample.value_i64(name).map(|v| v as f64 / FSCALE);
        [
            scaled("avenrun_1min"),
            scaled("avenrun_5min"),
            scaled("avenrun_15min"),
        ]
    }
}

impl Collector for LoadCollector {
    fn name(&self) -> &'static str {
        "load"
    }

    fn collect(&mut self, cx: &mut ScrapeContext<'_>) {
        if self.cache.resolve(&*cx.chain) != 1 {
            return;
        }
        let id = self.cache.records()[0].id;
        let Some(sample) = cx.reader.read(&mut *cx.chain, id, cx.now) else {
            return;
        };

        let [load1, load5, load15] = Self::load_values(sample);
        let ncpus = sample.value_u64("ncpus");
        let nproc = sample.value_u64("nproc");
        let boot_time = sample.value_u64("boot_time");

        let w = &mut cx.writer;
        if let Some(v) = load1 {
            w.scalar(
                "illumex_node_load1",
                MetricKind::Gauge,
                "Number of processes in the system run queue as average over the last minute.",
                Num::F(v),
            );
        }
        if let Some(v) = load5 {
            w.scalar(
                "illumex_node_load5",
                MetricKind::Gauge,
                "Number of processes in the system run queue as average over the last 5 minutes.",
                Num::F(v),
            );
        }
        if let Some(v) = load15 {
            w.scalar(
                "illumex_node_load15",
                MetricKind::Gauge,
                "Number of processes in the system run queue as average over the last 15 minutes.",
                Num::F(v),
            );
        }
        if let Some(online) = ncpus {
            w.help(
                "illumex_node_cpus_total",
                MetricKind::Gauge,
                "Number of CPU strands alias hyperthreads in the system.",
            );
            w.sample(
                "illumex_node_cpus_total",
                &[("state", "online")],
                Num::U(online),
            );
            if let Some(total) = self.cpu_total {
                let offline = u64::from(total).saturating_sub(online);
                w.sample(
                    "illumex_node_cpus_total",
                    &[("state", "offline")],
                    Num::U(offline),
                );
            }
        }
        if let Some(v) = nproc {
            w.scalar(
                "illumex_node_procs",
                MetricKind::Gauge,
                "Number of processes in the system.",
                Num::U(v),
            );
        }
        if let Some(v) = boot_time {
            w.scalar(
                "illumex_node_boot_time_seconds",
                MetricKind::Gauge,
                "OS boot time, in seconds since the Epoch. Constant for the lifetime of the app.",
                Num::U(v),
            );
        }
    }

    fn record_ids(&self, out: &mut Vec<RecordId>) {
        out.extend(self.cache.records().iter().map(|r| r.id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kstat::sim::SimChain;
    use crate::kstat::{SampleReader, Value};
    use crate::render::MetricWriter;

    fn scrape(sim: &mut SimChain, collector: &mut LoadCollector) -> String {
        let mut out = String::new();
        let mut reader = SampleReader::new();
        let mut cx = ScrapeContext {
            chain: sim,
            reader: &mut reader,
            writer: MetricWriter::new(&mut out, true),
            now: 0,
            page_shift: 12,
        };
        collector.collect(&mut cx);
        out
    }

    #[test]
    fn emits_scaled_load_and_counts() {
        let mut sim = SimChain::new();
        sim.add_record(
            "unix",
            0,
            "system_misc",
            0,
            &[
                ("avenrun_1min", Value::I32(128)),
                ("avenrun_5min", Value::I32(64)),
                ("avenrun_15min", Value::I32(512)),
                ("ncpus", Value::U32(24)),
                ("nproc", Value::U32(211)),
                ("boot_time", Value::U32(1_741_802_979)),
            ],
        );

        let mut collector = LoadCollector::new(Some(24));
        let out = scrape(&mut sim, &mut collector);

        assert!(out.contains("illumex_node_load1 0.5\n"));
        assert!(out.contains("illumex_node_load5 0.25\n"));
        assert!(out.contains("illumex_node_load15 2\n"));
        assert!(out.contains("illumex_node_cpus_total{state=\"online\"} 24\n"));
        assert!(out.contains("illumex_node_cpus_total{state=\"offline\"} 0\n"));
        assert!(out.contains("illumex_node_procs 211\n"));
        assert!(out.contains("illumex_node_boot_time_seconds 1741802979\n"));
    }

    #[test]
    fn offline_count_needs_the_configured_total() {
        let mut sim = SimChain::new();
        sim.add_record("unix", 0, "system_misc", 0, &[("ncpus", Value::U32(8))]);

        let mut collector = LoadCollector::new(None);
        let out = scrape(&mut sim, &mut collector);
        assert!(out.contains("{state=\"online\"} 8\n"));
        assert!(!out.contains("offline"));
    }

    #[test]
    fn missing_record_emits_nothing() {
        let mut sim = SimChain::new();
        sim.add_record("cpu", 0, "sys", 0, &[]);
        let mut collector = LoadCollector::new(None);
        assert!(scrape(&mut sim, &mut collector).is_empty());
    }
}
