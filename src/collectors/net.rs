//! NIC link statistics.
//!
//! Every datalink exposes a `::0:link` record whose module is the link
//! name; older illumos releases expose `link:0:<name>` instead, which is
//! kept as a fallback selector. Creating or destroying a VNIC and bringing
//! an interface up or down restructure the chain, so the export set and the
//! filter decisions are recomputed only when the generation moved.
//!
//! NOTE: zoned NICs usually have a second instance != 0 carrying the same
//! counters; only instance 0 is selected to avoid double counting.

use regex::Regex;
use tracing::info;

use crate::config::DetailLevel;
use crate::kstat::{InstanceCache, RecordId, RecordSelector};
use crate::render::{MetricKind, Num};

use super::{Collector, FieldDef, ScrapeContext};

const NORMAL_FIELDS: &[FieldDef] = &[
    FieldDef {
        kname: "rbytes64",
        metric: "illumex_node_network_receive_bytes",
        desc: "Bytes received.",
    },
    FieldDef {
        kname: "obytes64",
        metric: "illumex_node_network_transmit_bytes",
        desc: "Bytes transmitted.",
    },
    FieldDef {
        kname: "ipackets64",
        metric: "illumex_node_network_receive_packets",
        desc: "Packets received.",
    },
    FieldDef {
        kname: "opackets64",
        metric: "illumex_node_network_transmit_packets",
        desc: "Packets transmitted.",
    },
    FieldDef {
        kname: "ierrors",
        metric: "illumex_node_network_receive_errors",
        desc: "Receive errors.",
    },
    FieldDef {
        kname: "oerrors",
        metric: "illumex_node_network_transmit_errors",
        desc: "Transmit errors.",
    },
];

const EXTENDED_FIELDS: &[FieldDef] = &[
    FieldDef {
        kname: "multircv",
        metric: "illumex_node_network_receive_multicast",
        desc: "Multicast packets received.",
    },
    FieldDef {
        kname: "multixmt",
        metric: "illumex_node_network_transmit_multicast",
        desc: "Multicast packets transmitted.",
    },
    FieldDef {
        kname: "brdcstrcv",
        metric: "illumex_node_network_receive_broadcast",
        desc: "Broadcast packets received.",
    },
    FieldDef {
        kname: "brdcstxmt",
        metric: "illumex_node_network_transmit_broadcast",
        desc: "Broadcast packets transmitted.",
    },
    FieldDef {
        kname: "norcvbuf",
        metric: "illumex_node_network_receive_nobuf",
        desc: "Packets dropped for want of a receive buffer.",
    },
    FieldDef {
        kname: "noxmtbuf",
        metric: "illumex_node_network_transmit_nobuf",
        desc: "Packets dropped for want of a transmit buffer.",
    },
    FieldDef {
        kname: "collisions",
        metric: "illumex_node_network_collisions",
        desc: "Collisions seen.",
    },
];

fn field_groups(level: DetailLevel) -> &'static [&'static [FieldDef]] {
    match level {
        DetailLevel::Off => &[],
        DetailLevel::Normal => &[NORMAL_FIELDS],
        DetailLevel::Extended | DetailLevel::All => &[NORMAL_FIELDS, EXTENDED_FIELDS],
    }
}

pub struct NetCollector {
    link_cache: InstanceCache,
    fallback_cache: InstanceCache,
    use_fallback: bool,
    level: DetailLevel,
    include: Option<Regex>,
    exclude: Option<Regex>,
    exported: Vec<bool>,
}

impl NetCollector {
    pub fn new(
        level: DetailLevel,
        include: Option<Regex>,
        exclude: Option<Regex>,
        max_instance_id: i32,
    ) -> Self {
        Self {
            link_cache: InstanceCache::with_max_instance(
                RecordSelector::new(None, Some(0), Some("link")),
                max_instance_id,
            ),
            fallback_cache: InstanceCache::with_max_instance(
                RecordSelector::new(Some("link"), Some(0), None),
                max_instance_id,
            ),
            use_fallback: false,
            level,
            include,
            exclude,
            exported: Vec::new(),
        }
    }

    fn allowed(&self, name: &str) -> bool {
        if let Some(include) = &self.include {
            if !include.is_match(name) {
                return false;
            }
        }
        if let Some(exclude) = &self.exclude {
            if exclude.is_match(name) {
                return false;
            }
        }
        true
    }
}

impl Collector for NetCollector {
    fn name(&self) -> &'static str {
        "nicstat"
    }

    fn collect(&mut self, cx: &mut ScrapeContext<'_>) {
        if self.level.is_off() {
            return;
        }

        let changed = if self.use_fallback {
            !self.fallback_cache.is_current(&*cx.chain)
        } else {
            !self.link_cache.is_current(&*cx.chain)
        };

        let mut n = if self.use_fallback {
            0
        } else {
            self.link_cache.resolve(&*cx.chain)
        };
        if n == 0 {
            if !self.use_fallback {
                self.use_fallback = true;
            }
            n = self.fallback_cache.resolve(&*cx.chain);
        }
        if n == 0 {
            return;
        }

        let records = if self.use_fallback {
            self.fallback_cache.records()
        } else {
            self.link_cache.records()
        };
        if changed || self.exported.len() != n {
            let mut exported = Vec::with_capacity(n);
            let mut skipped: Vec<&str> = Vec::new();
            for rec in records {
                // in link mode the module carries the link name, in
                // fallback mode the record name does
                let nic = if self.use_fallback {
                    rec.name.as_str()
                } else {
                    rec.module.as_str()
                };
                let allow = self.allowed(nic);
                if !allow {
                    skipped.push(nic);
                }
                exported.push(allow);
            }
            if !skipped.is_empty() {
                info!("Excluding NIC metrics for: {}", skipped.join(", "));
            }
            self.exported = exported;
        }

        // gauges first, then the counter groups; one help per name, then
        // every exported link
        let gauges: &[FieldDef] = &[
            FieldDef {
                kname: "ifspeed",
                metric: "illumex_node_network_speed_bps",
                desc: "Link speed in bits per second.",
            },
            FieldDef {
                kname: "link_state",
                metric: "illumex_node_network_link_state",
                desc: "Link state (0: down, 1: up).",
            },
        ];
        for field in gauges {
            cx.writer.help(field.metric, MetricKind::Gauge, field.desc);
            for (idx, rec) in records.iter().enumerate() {
                if !self.exported[idx] {
                    continue;
                }
                let value = cx
                    .reader
                    .read(&mut *cx.chain, rec.id, cx.now)
                    .and_then(|s| s.value_u64(field.kname));
                if let Some(v) = value {
                    let nic = if self.use_fallback {
                        rec.name.as_str()
                    } else {
                        rec.module.as_str()
                    };
                    cx.writer.sample(field.metric, &[("nic", nic)], Num::U(v));
                }
            }
        }

        for group in field_groups(self.level) {
            for field in *group {
                cx.writer.help(field.metric, MetricKind::Counter, field.desc);
                for (idx, rec) in records.iter().enumerate() {
                    if !self.exported[idx] {
                        continue;
                    }
                    let value = cx
                        .reader
                        .read(&mut *cx.chain, rec.id, cx.now)
                        .and_then(|s| s.value_u64(field.kname));
                    if let Some(v) = value {
                        let nic = if self.use_fallback {
                            rec.name.as_str()
                        } else {
                            rec.module.as_str()
                        };
                        cx.writer.sample(field.metric, &[("nic", nic)], Num::U(v));
                    }
                }
            }
        }
    }

    fn record_ids(&self, out: &mut Vec<RecordId>) {
        out.extend(self.link_cache.records().iter().map(|r| r.id));
        out.extend(self.fallback_cache.records().iter().map(|r| r.id));
    }
}
