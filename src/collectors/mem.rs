//! System memory gauges (`unix:0:system_pages`).
//!
//! The kernel counts in pages; everything page-sized is shifted into bytes
//! here so dashboards never need to know the page size. Most of the names
//! follow the node-exporter vocabulary even where the kernel's terms
//! (lotsfree, desfree, minfree) leak through.

use crate::kstat::{InstanceCache, RecordId, RecordSelector};
use crate::render::{MetricKind, Num};

use super::{Collector, ScrapeContext};

struct PageField {
    kname: &'static str,
    metric: &'static str,
    kind: MetricKind,
    desc: &'static str,
    /// Page counts are shifted into bytes; call counters are not.
    page_scaled: bool,
}

const FIELDS: &[PageField] = &[
    PageField {
        kname: "physmem",
        metric: "illumex_node_mem_phys",
        kind: MetricKind::Gauge,
        desc: "Total physical RAM of the system in bytes.",
        page_scaled: true,
    },
    PageField {
        kname: "availrmem",
        metric: "illumex_node_mem_availr",
        kind: MetricKind::Gauge,
        desc: "Available resident (pageable, unreserved) physical memory in bytes.",
        page_scaled: true,
    },
    PageField {
        kname: "pageslocked",
        metric: "illumex_node_mem_locked",
        kind: MetricKind::Gauge,
        desc: "Physical memory in bytes locked through mlock or plock.",
        page_scaled: true,
    },
    PageField {
        kname: "freemem",
        metric: "illumex_node_mem_free",
        kind: MetricKind::Gauge,
        desc: "Currently re-usable memory in bytes. Includes page cache the scanner can reclaim.",
        page_scaled: true,
    },
    PageField {
        kname: "lotsfree",
        metric: "illumex_node_mem_lotsfree",
        kind: MetricKind::Gauge,
        desc: "Threshold when the paging scanner wakes up to reclaim memory. Default: physmem/64",
        page_scaled: true,
    },
    PageField {
        kname: "desfree",
        metric: "illumex_node_mem_desfree",
        kind: MetricKind::Gauge,
        desc: "Amount of memory desired free. Default: lotsfree/2",
        page_scaled: true,
    },
    PageField {
        kname: "minfree",
        metric: "illumex_node_mem_minfree",
        kind: MetricKind::Gauge,
        desc: "Minimal amount of free memory which is tolerable. Default: desfree/2",
        page_scaled: true,
    },
    PageField {
        kname: "desscan",
        metric: "illumex_node_mem_desscan",
        kind: MetricKind::Gauge,
        desc: "Desired memory in bytes scanned per second. Max. <= fastscan/4.",
        page_scaled: true,
    },
    PageField {
        kname: "slowscan",
        metric: "illumex_node_mem_slowscan",
        kind: MetricKind::Gauge,
        desc: "Memory in bytes scanned per second when free memory falls below lotsfree.",
        page_scaled: true,
    },
    PageField {
        kname: "fastscan",
        metric: "illumex_node_mem_fastscan",
        kind: MetricKind::Gauge,
        desc: "Memory in bytes scanned per second when free memory falls below minfree.",
        page_scaled: true,
    },
    PageField {
        kname: "nscan",
        metric: "illumex_node_mem_nscan",
        kind: MetricKind::Gauge,
        desc: "Memory in bytes scanned during the last second.",
        page_scaled: true,
    },
    PageField {
        kname: "pp_kernel",
        metric: "illumex_node_mem_kernel",
        kind: MetricKind::Gauge,
        desc: "Total physical memory in bytes used by the kernel since startup.",
        page_scaled: true,
    },
    PageField {
        kname: "nalloc_calls",
        metric: "illumex_node_mem_nalloc_calls",
        kind: MetricKind::Counter,
        desc: "Total number of memory allocation calls. Includes failed requests, too.",
        page_scaled: false,
    },
    PageField {
        kname: "nalloc",
        metric: "illumex_node_mem_nalloc_sz",
        kind: MetricKind::Counter,
        desc: "Total memory in bytes requested by allocation calls.",
        page_scaled: false,
    },
    PageField {
        kname: "nfree_calls",
        metric: "illumex_node_mem_free_calls",
        kind: MetricKind::Counter,
        desc: "Total number of calls to free allocated memory.",
        page_scaled: false,
    },
    PageField {
        kname: "nfree",
        metric: "illumex_node_mem_free_sz",
        kind: MetricKind::Counter,
        desc: "Total allocated memory freed in bytes.",
        page_scaled: false,
    },
];

pub struct MemCollector {
    cache: InstanceCache,
}

impl Default for MemCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MemCollector {
    pub fn new() -> Self {
        Self {
            cache: InstanceCache::new(RecordSelector::new(
                Some("unix"),
                Some(0),
                Some("system_pages"),
            )),
        }
    }
}

impl Collector for MemCollector {
    fn name(&self) -> &'static str {
        "sys_mem"
    }

    fn collect(&mut self, cx: &mut ScrapeContext<'_>) {
        if self.cache.resolve(&*cx.chain) != 1 {
            return;
        }
        let id = self.cache.records()[0].id;
        let Some(sample) = cx.reader.read(&mut *cx.chain, id, cx.now) else {
            return;
        };

        let mut values: Vec<(&'static PageField, u64)> = Vec::with_capacity(FIELDS.len());
        for field in FIELDS {
            if let Some(v) = sample.value_u64(field.kname) {
                let v = if field.page_scaled {
                    v << cx.page_shift
                } else {
                    v
                };
                values.push((field, v));
            }
        }

        let w = &mut cx.writer;
        w.scalar(
            "illumex_node_mem_pagesz",
            MetricKind::Gauge,
            "Size in bytes of system memory pages.",
            Num::U(1u64 << cx.page_shift),
        );
        for (field, v) in values {
            w.help(field.metric, field.kind, field.desc);
            w.sample(field.metric, &[], Num::U(v));
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

    #[test]
    fn pages_are_shifted_into_bytes() {
        let mut sim = SimChain::new();
        sim.add_record(
            "unix",
            0,
            "system_pages",
            0,
            &[
                ("physmem", Value::U64(1024)),
                ("freemem", Value::U64(100)),
                ("nalloc_calls", Value::U64(77)),
            ],
        );

        let mut out = String::new();
        let mut reader = SampleReader::new();
        let mut cx = ScrapeContext {
            chain: &mut sim,
            reader: &mut reader,
            writer: MetricWriter::new(&mut out, true),
            now: 0,
            page_shift: 12,
        };
        let mut collector = MemCollector::new();
        collector.collect(&mut cx);

        assert!(out.contains("illumex_node_mem_pagesz 4096\n"));
        assert!(out.contains("illumex_node_mem_phys 4194304\n"));
        assert!(out.contains("illumex_node_mem_free 409600\n"));
        // call counters stay unscaled
        assert!(out.contains("illumex_node_mem_nalloc_calls 77\n"));
        assert!(out.contains("# TYPE illumex_node_mem_nalloc_calls counter\n"));
        // absent fields stay absent, they do not render as zero
        assert!(!out.contains("illumex_node_mem_lotsfree"));
    }
}
