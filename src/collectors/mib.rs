//! Protocol-stack counters (mib2: `*:0:{ip,icmp,tcp,udp}`).
//!
//! Each protocol gets its own detail level so a host serving thousands of
//! connections can export tcp at length while leaving icmp at the basics,
//! or drop a protocol entirely.

use crate::config::{DetailLevel, MibLevels};
use crate::kstat::{InstanceCache, RecordId, RecordSelector};
use crate::render::{MetricKind, Num};

use super::{Collector, ScrapeContext};

struct MibField {
    kname: &'static str,
    metric: &'static str,
    kind: MetricKind,
    desc: &'static str,
}

macro_rules! mib_counter {
    ($kname:literal, $metric:literal, $desc:literal) => {
        MibField {
            kname: $kname,
            metric: $metric,
            kind: MetricKind::Counter,
            desc: $desc,
        }
    };
}

const IP_NORMAL: &[MibField] = &[
    mib_counter!(
        "ipInReceives",
        "illumex_node_mib_ip_in_receives",
        "Datagrams received, including those with errors."
    ),
    mib_counter!(
        "ipInDelivers",
        "illumex_node_mib_ip_in_delivers",
        "Datagrams delivered to upper-layer protocols."
    ),
    mib_counter!(
        "ipOutRequests",
        "illumex_node_mib_ip_out_requests",
        "Datagrams supplied by upper layers for transmission."
    ),
    mib_counter!(
        "ipForwDatagrams",
        "illumex_node_mib_ip_forw_datagrams",
        "Datagrams forwarded."
    ),
    mib_counter!(
        "ipInDiscards",
        "illumex_node_mib_ip_in_discards",
        "Inbound datagrams discarded without a problem of their own."
    ),
    mib_counter!(
        "ipOutDiscards",
        "illumex_node_mib_ip_out_discards",
        "Outbound datagrams discarded without a problem of their own."
    ),
];

const IP_EXTENDED: &[MibField] = &[
    mib_counter!(
        "ipInHdrErrors",
        "illumex_node_mib_ip_in_hdr_errors",
        "Datagrams dropped for header errors."
    ),
    mib_counter!(
        "ipInAddrErrors",
        "illumex_node_mib_ip_in_addr_errors",
        "Datagrams dropped for a bogus destination address."
    ),
    mib_counter!(
        "ipInCksumErrs",
        "illumex_node_mib_ip_in_cksum_errs",
        "Datagrams dropped for a bad checksum."
    ),
    mib_counter!(
        "ipReasmReqds",
        "illumex_node_mib_ip_reasm_reqds",
        "Fragments received needing reassembly."
    ),
    mib_counter!(
        "ipReasmOKs",
        "illumex_node_mib_ip_reasm_oks",
        "Datagrams successfully reassembled."
    ),
    mib_counter!(
        "ipReasmFails",
        "illumex_node_mib_ip_reasm_fails",
        "Reassembly failures."
    ),
    mib_counter!(
        "ipFragOKs",
        "illumex_node_mib_ip_frag_oks",
        "Datagrams successfully fragmented."
    ),
    mib_counter!(
        "ipFragFails",
        "illumex_node_mib_ip_frag_fails",
        "Datagrams needing fragmentation that could not be fragmented."
    ),
    mib_counter!(
        "ipOutNoRoutes",
        "illumex_node_mib_ip_out_no_routes",
        "Datagrams discarded for want of a route."
    ),
];

const ICMP_NORMAL: &[MibField] = &[
    mib_counter!(
        "icmpInMsgs",
        "illumex_node_mib_icmp_in_msgs",
        "ICMP messages received."
    ),
    mib_counter!(
        "icmpOutMsgs",
        "illumex_node_mib_icmp_out_msgs",
        "ICMP messages sent."
    ),
    mib_counter!(
        "icmpInErrors",
        "illumex_node_mib_icmp_in_errors",
        "ICMP messages received with errors."
    ),
    mib_counter!(
        "icmpOutErrors",
        "illumex_node_mib_icmp_out_errors",
        "ICMP messages not sent due to errors."
    ),
];

const ICMP_EXTENDED: &[MibField] = &[
    mib_counter!(
        "icmpInEchos",
        "illumex_node_mib_icmp_in_echos",
        "Echo requests received."
    ),
    mib_counter!(
        "icmpOutEchoReps",
        "illumex_node_mib_icmp_out_echo_reps",
        "Echo replies sent."
    ),
    mib_counter!(
        "icmpInDestUnreachs",
        "illumex_node_mib_icmp_in_dest_unreachs",
        "Destination-unreachable messages received."
    ),
    mib_counter!(
        "icmpOutDestUnreachs",
        "illumex_node_mib_icmp_out_dest_unreachs",
        "Destination-unreachable messages sent."
    ),
    mib_counter!(
        "icmpInTimeExcds",
        "illumex_node_mib_icmp_in_time_excds",
        "Time-exceeded messages received."
    ),
];

const TCP_NORMAL: &[MibField] = &[
    mib_counter!(
        "tcpActiveOpens",
        "illumex_node_mib_tcp_active_opens",
        "Transitions to SYN-SENT from CLOSED."
    ),
    mib_counter!(
        "tcpPassiveOpens",
        "illumex_node_mib_tcp_passive_opens",
        "Transitions to SYN-RCVD from LISTEN."
    ),
    mib_counter!(
        "tcpAttemptFails",
        "illumex_node_mib_tcp_attempt_fails",
        "Failed connection attempts."
    ),
    mib_counter!(
        "tcpEstabResets",
        "illumex_node_mib_tcp_estab_resets",
        "Resets out of ESTABLISHED or CLOSE-WAIT."
    ),
    MibField {
        kname: "tcpCurrEstab",
        metric: "illumex_node_mib_tcp_curr_estab",
        kind: MetricKind::Gauge,
        desc: "Connections currently in ESTABLISHED or CLOSE-WAIT.",
    },
    mib_counter!(
        "tcpInSegs",
        "illumex_node_mib_tcp_in_segs",
        "Segments received."
    ),
    mib_counter!(
        "tcpOutSegs",
        "illumex_node_mib_tcp_out_segs",
        "Segments sent."
    ),
    mib_counter!(
        "tcpRetransSegs",
        "illumex_node_mib_tcp_retrans_segs",
        "Segments retransmitted."
    ),
];

const TCP_EXTENDED: &[MibField] = &[
    mib_counter!(
        "tcpOutRsts",
        "illumex_node_mib_tcp_out_rsts",
        "RST segments sent."
    ),
    mib_counter!(
        "tcpListenDrop",
        "illumex_node_mib_tcp_listen_drop",
        "Connections refused because the listen backlog was full."
    ),
    mib_counter!(
        "tcpListenDropQ0",
        "illumex_node_mib_tcp_listen_drop_q0",
        "Connections refused from the half-open queue."
    ),
    mib_counter!(
        "tcpHalfOpenDrop",
        "illumex_node_mib_tcp_half_open_drop",
        "Connections dropped from the half-open queue."
    ),
    mib_counter!(
        "tcpTimRetransDrop",
        "illumex_node_mib_tcp_tim_retrans_drop",
        "Connections dropped by the retransmit timeout."
    ),
];

const UDP_NORMAL: &[MibField] = &[
    mib_counter!(
        "udpInDatagrams",
        "illumex_node_mib_udp_in_datagrams",
        "Datagrams delivered to UDP users."
    ),
    mib_counter!(
        "udpOutDatagrams",
        "illumex_node_mib_udp_out_datagrams",
        "Datagrams sent."
    ),
    mib_counter!(
        "udpInErrors",
        "illumex_node_mib_udp_in_errors",
        "Datagrams that could not be delivered for reasons other than a missing port."
    ),
];

const UDP_EXTENDED: &[MibField] = &[
    mib_counter!(
        "udpInOverflows",
        "illumex_node_mib_udp_in_overflows",
        "Datagrams dropped because the receive buffer was full."
    ),
    mib_counter!(
        "udpOutErrors",
        "illumex_node_mib_udp_out_errors",
        "Datagrams that could not be sent."
    ),
];

struct ProtoTable {
    record_name: &'static str,
    normal: &'static [MibField],
    extended: &'static [MibField],
}

const PROTOS: &[ProtoTable] = &[
    ProtoTable {
        record_name: "ip",
        normal: IP_NORMAL,
        extended: IP_EXTENDED,
    },
    ProtoTable {
        record_name: "icmp",
        normal: ICMP_NORMAL,
        extended: ICMP_EXTENDED,
    },
    ProtoTable {
        record_name: "tcp",
        normal: TCP_NORMAL,
        extended: TCP_EXTENDED,
    },
    ProtoTable {
        record_name: "udp",
        normal: UDP_NORMAL,
        extended: UDP_EXTENDED,
    },
];

pub struct MibCollector {
    entries: Vec<(InstanceCache, DetailLevel, &'static ProtoTable)>,
}

impl MibCollector {
    pub fn new(levels: MibLevels) -> Self {
        let level_of = |name: &str| match name {
            "ip" => levels.ip,
            "icmp" => levels.icmp,
            "tcp" => levels.tcp,
            _ => levels.udp,
        };
        let entries = PROTOS
            .iter()
            .map(|table| {
                (
                    InstanceCache::new(RecordSelector::new(
                        None,
                        Some(0),
                        Some(table.record_name),
                    )),
                    level_of(table.record_name),
                    table,
                )
            })
            .collect();
        Self { entries }
    }
}

impl Collector for MibCollector {
    fn name(&self) -> &'static str {
        "mib"
    }

    fn collect(&mut self, cx: &mut ScrapeContext<'_>) {
        for (cache, level, table) in &mut self.entries {
            if level.is_off() {
                continue;
            }
            if cache.resolve(&*cx.chain) == 0 {
                continue;
            }
            let id = cache.records()[0].id;
            let Some(sample) = cx.reader.read(&mut *cx.chain, id, cx.now) else {
                continue;
            };

            let groups: &[&[MibField]] = match level {
                DetailLevel::Off => &[],
                DetailLevel::Normal => &[table.normal],
                DetailLevel::Extended | DetailLevel::All => &[table.normal, table.extended],
            };
            let mut values: Vec<(&MibField, u64)> = Vec::new();
            for group in groups {
                for field in *group {
                    if let Some(v) = sample.value_u64(field.kname) {
                        values.push((field, v));
                    }
                }
            }

            for (field, v) in values {
                cx.writer.help(field.metric, field.kind, field.desc);
                cx.writer.sample(field.metric, &[], Num::U(v));
            }
        }
    }

    fn record_ids(&self, out: &mut Vec<RecordId>) {
        for (cache, _, _) in &self.entries {
            out.extend(cache.records().iter().map(|r| r.id));
        }
    }
}
