//! CPU system counters (`cpu:*:sys`).
//!
//! One record per CPU strand; the kernel adds and removes records as
//! strands come and go, which the instance cache tracks via the chain
//! generation. Values are summed over all strands into the `cpu="sum"`
//! series; per-strand series are emitted only in multi-processor mode.

use crate::config::DetailLevel;
use crate::kstat::{InstanceCache, RecordId, RecordSelector};

use super::{emit_strand_counter, Collector, FieldDef, ScrapeContext};

const NORMAL_FIELDS: &[FieldDef] = &[
    FieldDef {
        kname: "cpu_ticks_idle",
        metric: "illumex_node_sys_cpu_ticks_idle",
        desc: "Clock ticks the strand spent idle.",
    },
    FieldDef {
        kname: "cpu_ticks_kernel",
        metric: "illumex_node_sys_cpu_ticks_kernel",
        desc: "Clock ticks the strand spent in kernel mode.",
    },
    FieldDef {
        kname: "cpu_ticks_user",
        metric: "illumex_node_sys_cpu_ticks_user",
        desc: "Clock ticks the strand spent in user mode.",
    },
    FieldDef {
        kname: "cpu_ticks_wait",
        metric: "illumex_node_sys_cpu_ticks_wait",
        desc: "Clock ticks the strand spent waiting for I/O.",
    },
    FieldDef {
        kname: "intr",
        metric: "illumex_node_sys_intr",
        desc: "Interrupts taken.",
    },
    FieldDef {
        kname: "pswitch",
        metric: "illumex_node_sys_pswitch",
        desc: "Context switches.",
    },
    FieldDef {
        kname: "syscall",
        metric: "illumex_node_sys_syscall",
        desc: "System calls made.",
    },
    FieldDef {
        kname: "sysexec",
        metric: "illumex_node_sys_sysexec",
        desc: "execs made.",
    },
    FieldDef {
        kname: "sysfork",
        metric: "illumex_node_sys_sysfork",
        desc: "forks made.",
    },
    FieldDef {
        kname: "sysvfork",
        metric: "illumex_node_sys_sysvfork",
        desc: "vforks made.",
    },
    FieldDef {
        kname: "trap",
        metric: "illumex_node_sys_trap",
        desc: "Traps taken.",
    },
];

const EXTENDED_FIELDS: &[FieldDef] = &[
    FieldDef {
        kname: "inv_swtch",
        metric: "illumex_node_sys_inv_swtch",
        desc: "Involuntary context switches.",
    },
    FieldDef {
        kname: "namei",
        metric: "illumex_node_sys_namei",
        desc: "Pathname lookups.",
    },
    FieldDef {
        kname: "nthreads",
        metric: "illumex_node_sys_nthreads",
        desc: "Threads created.",
    },
    FieldDef {
        kname: "phread",
        metric: "illumex_node_sys_phread",
        desc: "Raw device reads.",
    },
    FieldDef {
        kname: "phwrite",
        metric: "illumex_node_sys_phwrite",
        desc: "Raw device writes.",
    },
    FieldDef {
        kname: "sysread",
        metric: "illumex_node_sys_sysread",
        desc: "read() plus readv() calls.",
    },
    FieldDef {
        kname: "syswrite",
        metric: "illumex_node_sys_syswrite",
        desc: "write() plus writev() calls.",
    },
    FieldDef {
        kname: "xcalls",
        metric: "illumex_node_sys_xcalls",
        desc: "Inter-processor cross-calls.",
    },
    // enough to simulate mpstat:
    FieldDef {
        kname: "intrthread",
        metric: "illumex_node_sys_intrthread",
        desc: "Interrupts handled as threads (below clock level).",
    },
    FieldDef {
        kname: "cpumigrate",
        metric: "illumex_node_sys_cpumigrate",
        desc: "Thread migrations to another strand.",
    },
    FieldDef {
        kname: "mutex_adenters",
        metric: "illumex_node_sys_mutex_adenters",
        desc: "Failed adaptive-mutex enters.",
    },
    FieldDef {
        kname: "rw_rdfails",
        metric: "illumex_node_sys_rw_rdfails",
        desc: "Failed reader-lock acquisitions.",
    },
    FieldDef {
        kname: "rw_wrfails",
        metric: "illumex_node_sys_rw_wrfails",
        desc: "Failed writer-lock acquisitions.",
    },
];

fn field_groups(level: DetailLevel) -> &'static [&'static [FieldDef]] {
    match level {
        DetailLevel::Off => &[],
        DetailLevel::Normal => &[NORMAL_FIELDS],
        DetailLevel::Extended | DetailLevel::All => &[NORMAL_FIELDS, EXTENDED_FIELDS],
    }
}

pub struct CpuSysCollector {
    cache: InstanceCache,
    level: DetailLevel,
    mp: bool,
}

impl CpuSysCollector {
    pub fn new(level: DetailLevel, mp: bool, max_instance_id: i32) -> Self {
        Self {
            cache: InstanceCache::with_max_instance(
                RecordSelector::new(Some("cpu"), None, Some("sys")),
                max_instance_id,
            ),
            level,
            mp,
        }
    }
}

impl Collector for CpuSysCollector {
    fn name(&self) -> &'static str {
        "cpu_sys"
    }

    fn collect(&mut self, cx: &mut ScrapeContext<'_>) {
        if self.level.is_off() {
            return;
        }
        let n = self.cache.resolve(&*cx.chain);
        if n == 0 {
            return;
        }
        // a single strand has nothing to break down
        let mp = self.mp && n > 1;

        let active: Vec<&FieldDef> = field_groups(self.level)
            .iter()
            .flat_map(|g| g.iter())
            .collect();
        let mut sum = vec![0u64; active.len()];
        let mut rows: Vec<(i32, Vec<u64>)> = Vec::with_capacity(n);
        for rec in self.cache.records() {
            let Some(sample) = cx.reader.read(&mut *cx.chain, rec.id, cx.now) else {
                continue;
            };
            let mut row = vec![0u64; active.len()];
            for (k, field) in active.iter().enumerate() {
                if let Some(v) = sample.value_u64(field.kname) {
                    row[k] = v;
                    sum[k] += v;
                }
            }
            rows.push((rec.instance, row));
        }
        if rows.is_empty() {
            return;
        }

        for (k, field) in active.iter().enumerate() {
            let per: Vec<(i32, u64)> = rows.iter().map(|(inst, row)| (*inst, row[k])).collect();
            emit_strand_counter(&mut cx.writer, field.metric, field.desc, &per, sum[k], mp);
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

    fn scrape(sim: &mut SimChain, collector: &mut CpuSysCollector) -> String {
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

    fn two_strand_chain() -> SimChain {
        let mut sim = SimChain::new();
        sim.add_record(
            "cpu",
            0,
            "sys",
            0,
            &[("syscall", Value::U64(140)), ("trap", Value::U64(3))],
        );
        sim.add_record(
            "cpu",
            1,
            "sys",
            0,
            &[("syscall", Value::U64(260)), ("trap", Value::U64(4))],
        );
        sim
    }

    #[test]
    fn summary_mode_emits_only_the_sum() {
        let mut sim = two_strand_chain();
        let mut collector = CpuSysCollector::new(DetailLevel::Normal, false, 4096);
        let out = scrape(&mut sim, &mut collector);

        assert!(out.contains("illumex_node_sys_syscall{cpu=\"sum\"} 400\n"));
        assert!(!out.contains("cpu=\"0\""));
        assert!(!out.contains("cpu=\"1\""));
    }

    #[test]
    fn mp_mode_emits_per_strand_and_sum() {
        let mut sim = two_strand_chain();
        let mut collector = CpuSysCollector::new(DetailLevel::Normal, true, 4096);
        let out = scrape(&mut sim, &mut collector);

        assert!(out.contains("illumex_node_sys_syscall{cpu=\"0\"} 140\n"));
        assert!(out.contains("illumex_node_sys_syscall{cpu=\"1\"} 260\n"));
        assert!(out.contains("illumex_node_sys_syscall{cpu=\"sum\"} 400\n"));
        assert!(out.contains("illumex_node_sys_trap{cpu=\"sum\"} 7\n"));
    }

    #[test]
    fn extended_level_adds_the_second_field_group() {
        let mut sim = SimChain::new();
        sim.add_record(
            "cpu",
            0,
            "sys",
            0,
            &[("syscall", Value::U64(1)), ("xcalls", Value::U64(9))],
        );

        let mut normal = CpuSysCollector::new(DetailLevel::Normal, false, 4096);
        let out = scrape(&mut sim, &mut normal);
        assert!(!out.contains("illumex_node_sys_xcalls"));

        let mut extended = CpuSysCollector::new(DetailLevel::Extended, false, 4096);
        let out = scrape(&mut sim, &mut extended);
        assert!(out.contains("illumex_node_sys_xcalls{cpu=\"sum\"} 9\n"));
    }

    #[test]
    fn off_level_emits_nothing() {
        let mut sim = two_strand_chain();
        let mut collector = CpuSysCollector::new(DetailLevel::Off, true, 4096);
        assert!(scrape(&mut sim, &mut collector).is_empty());
    }
}
