//! Per-strand paging counters (`cpu:*:vm`).
//!
//! Same shape as the CPU system counters: one record per strand, summed
//! into `cpu="sum"`, per-strand series only in multi-processor mode. The
//! `all` level exposes every field the record carries.

use crate::config::DetailLevel;
use crate::kstat::{InstanceCache, RecordId, RecordSelector};

use super::{emit_strand_counter, Collector, FieldDef, ScrapeContext};

macro_rules! vm_field {
    ($kname:literal, $desc:literal) => {
        FieldDef {
            kname: $kname,
            metric: concat!("illumex_node_vm_", $kname),
            desc: $desc,
        }
    };
}

const NORMAL_FIELDS: &[FieldDef] = &[
    vm_field!("swapin", "swapins"),
    vm_field!("swapout", "swapouts"),
    vm_field!("pgrec", "Total page reclaims (includes pageout)"),
    vm_field!("pgfrec", "Page reclaims from free list"),
    vm_field!("hat_fault", "Micro (hat) faults"),
    vm_field!("as_fault", "Minor (as) faults"),
    vm_field!("pgpgin", "Pages paged in"),
    vm_field!("pgpgout", "Pages paged out"),
    vm_field!("dfree", "Pages freed by daemon or auto"),
    vm_field!("scan", "Pages examined by pageout daemon"),
];

const EXTENDED_FIELDS: &[FieldDef] = &[
    vm_field!("execpgin", "Executable page-ins"),
    vm_field!("execpgout", "Executable page-outs"),
    vm_field!("execfree", "Executable page-frees"),
    vm_field!("anonpgin", "Anonymous page-ins"),
    vm_field!("anonpgout", "Anonymous page-outs"),
    vm_field!("anonfree", "Anonymous page-frees"),
    vm_field!("fspgin", "File system page-ins"),
    vm_field!("fspgout", "File system page-outs"),
    vm_field!("fsfree", "File system page-frees"),
];

const ALL_FIELDS: &[FieldDef] = &[
    vm_field!("pgin", "Page ins"),
    vm_field!("pgout", "Page outs"),
    vm_field!("pgswapin", "Pages swapped in"),
    vm_field!("pgswapout", "Pages swapped out"),
    vm_field!("maj_fault", "Major faults"),
    vm_field!("cow_fault", "Copy-on-write faults"),
    vm_field!("prot_fault", "Protection faults"),
    vm_field!("softlock", "Faults due to software locking requests"),
    vm_field!("kernel_asflt", "Minor (as) faults in kernel address space"),
    vm_field!("zfod", "Pages zero filled on demand"),
    vm_field!("rev", "Revolutions of the page daemon hand"),
    vm_field!("pgrrun", "Times the pager was scheduled"),
];

fn field_groups(level: DetailLevel) -> &'static [&'static [FieldDef]] {
    match level {
        DetailLevel::Off => &[],
        DetailLevel::Normal => &[NORMAL_FIELDS],
        DetailLevel::Extended => &[NORMAL_FIELDS, EXTENDED_FIELDS],
        DetailLevel::All => &[NORMAL_FIELDS, EXTENDED_FIELDS, ALL_FIELDS],
    }
}

pub struct VmStatCollector {
    cache: InstanceCache,
    level: DetailLevel,
    mp: bool,
}

impl VmStatCollector {
    pub fn new(level: DetailLevel, mp: bool, max_instance_id: i32) -> Self {
        Self {
            cache: InstanceCache::with_max_instance(
                RecordSelector::new(Some("cpu"), None, Some("vm")),
                max_instance_id,
            ),
            level,
            mp,
        }
    }
}

impl Collector for VmStatCollector {
    fn name(&self) -> &'static str {
        "vmstat"
    }

    fn collect(&mut self, cx: &mut ScrapeContext<'_>) {
        if self.level.is_off() {
            return;
        }
        let n = self.cache.resolve(&*cx.chain);
        if n == 0 {
            return;
        }
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
