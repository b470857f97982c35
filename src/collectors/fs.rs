//! Per-filesystem-type vnode operation counters (`*:*:vopstats_<fstype>`).
//!
//! Every mounted filesystem type aggregates its vnode operations into a
//! `vopstats_<fstype>` record; zones add further instances of the same
//! name, which are summed here. Only the common types are selected, the
//! pseudo filesystems rarely say anything useful.

use crate::kstat::{InstanceCache, RecordId, RecordSelector};
use crate::render::{MetricKind, Num};

use super::{Collector, ScrapeContext};

const FSTYPES: &[(&str, &str)] = &[
    ("zfs", "vopstats_zfs"),
    ("nfs4", "vopstats_nfs4"),
    ("tmpfs", "vopstats_tmpfs"),
    ("lofs", "vopstats_lofs"),
    ("ufs", "vopstats_ufs"),
];

/// (kernel field, op label) for the operation-count series.
const OPS: &[(&str, &str)] = &[
    ("nread", "read"),
    ("nwrite", "write"),
    ("nlookup", "lookup"),
    ("ngetattr", "getattr"),
    ("nsetattr", "setattr"),
    ("ncreate", "create"),
    ("nremove", "remove"),
    ("nmkdir", "mkdir"),
    ("nrmdir", "rmdir"),
    ("nreaddir", "readdir"),
];

/// (kernel field, direction label) for the byte-count series.
const BYTES: &[(&str, &str)] = &[("read_bytes", "read"), ("write_bytes", "write")];

const OPS_METRIC: &str = "illumex_node_fs_ops";
const BYTES_METRIC: &str = "illumex_node_fs_bytes";

pub struct FsCollector {
    entries: Vec<(&'static str, InstanceCache)>,
}

impl Default for FsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl FsCollector {
    pub fn new() -> Self {
        let entries = FSTYPES
            .iter()
            .map(|&(fstype, record_name)| {
                (
                    fstype,
                    InstanceCache::new(RecordSelector::new(None, None, Some(record_name))),
                )
            })
            .collect();
        Self { entries }
    }
}

impl Collector for FsCollector {
    fn name(&self) -> &'static str {
        "fs"
    }

    fn collect(&mut self, cx: &mut ScrapeContext<'_>) {
        // (fstype, per-op sums, per-direction sums), only for types present
        let mut collected: Vec<(&'static str, Vec<u64>, Vec<u64>)> = Vec::new();
        for (fstype, cache) in &mut self.entries {
            if cache.resolve(&*cx.chain) == 0 {
                continue;
            }
            let mut ops = vec![0u64; OPS.len()];
            let mut bytes = vec![0u64; BYTES.len()];
            let mut seen = false;
            for rec in cache.records() {
                let Some(sample) = cx.reader.read(&mut *cx.chain, rec.id, cx.now) else {
                    continue;
                };
                seen = true;
                for (k, &(kname, _)) in OPS.iter().enumerate() {
                    ops[k] += sample.value_u64(kname).unwrap_or(0);
                }
                for (k, &(kname, _)) in BYTES.iter().enumerate() {
                    bytes[k] += sample.value_u64(kname).unwrap_or(0);
                }
            }
            if seen {
                collected.push((*fstype, ops, bytes));
            }
        }
        if collected.is_empty() {
            return;
        }

        let w = &mut cx.writer;
        w.help(
            OPS_METRIC,
            MetricKind::Counter,
            "Vnode operations per filesystem type.",
        );
        for &(fstype, ref ops, _) in &collected {
            for (k, &(_, op)) in OPS.iter().enumerate() {
                w.sample(OPS_METRIC, &[("fstype", fstype), ("op", op)], Num::U(ops[k]));
            }
        }
        w.help(
            BYTES_METRIC,
            MetricKind::Counter,
            "Bytes moved through vnode operations per filesystem type.",
        );
        for &(fstype, _, ref bytes) in &collected {
            for (k, &(_, direction)) in BYTES.iter().enumerate() {
                w.sample(
                    BYTES_METRIC,
                    &[("fstype", fstype), ("direction", direction)],
                    Num::U(bytes[k]),
                );
            }
        }
    }

    fn record_ids(&self, out: &mut Vec<RecordId>) {
        for (_, cache) in &self.entries {
            out.extend(cache.records().iter().map(|r| r.id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kstat::sim::SimChain;
    use crate::kstat::{SampleReader, Value};
    use crate::render::MetricWriter;

    #[test]
    fn zone_instances_are_summed_per_fstype() {
        let mut sim = SimChain::new();
        sim.add_record(
            "zfs",
            0,
            "vopstats_zfs",
            0,
            &[
                ("nread", Value::U64(10)),
                ("read_bytes", Value::U64(1000)),
                ("nlookup", Value::U64(5)),
            ],
        );
        // a zone's view of the same fstype
        sim.add_record(
            "zfs",
            1,
            "vopstats_zfs",
            0,
            &[("nread", Value::U64(4)), ("read_bytes", Value::U64(200))],
        );
        sim.add_record(
            "tmpfs",
            0,
            "vopstats_tmpfs",
            0,
            &[("nwrite", Value::U64(7)), ("write_bytes", Value::U64(70))],
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
        let mut collector = FsCollector::new();
        collector.collect(&mut cx);

        assert!(out.contains("illumex_node_fs_ops{fstype=\"zfs\",op=\"read\"} 14\n"));
        assert!(out.contains("illumex_node_fs_ops{fstype=\"zfs\",op=\"lookup\"} 5\n"));
        assert!(out.contains("illumex_node_fs_bytes{fstype=\"zfs\",direction=\"read\"} 1200\n"));
        assert!(out.contains("illumex_node_fs_ops{fstype=\"tmpfs\",op=\"write\"} 7\n"));
        assert!(out.contains("illumex_node_fs_bytes{fstype=\"tmpfs\",direction=\"write\"} 70\n"));
        // absent types render nothing
        assert!(!out.contains("fstype=\"ufs\""));
        assert_eq!(out.matches("# HELP illumex_node_fs_ops").count(), 1);
    }
}
