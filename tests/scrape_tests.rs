//! End-to-end collection passes over a simulated chain: the per-instance
//! plus aggregate rendering contract and a full multi-collector scrape.

mod common;

use common::SharedChain;
use illumex::collectors::{
    cpu::CpuSysCollector, load::LoadCollector, mem::MemCollector, mib::MibCollector,
    CollectorRegistry,
};
use illumex::config::{DetailLevel, MibLevels};
use illumex::kstat::{ChainHandle, Value, KERNEL_UPDATE_NS};

fn two_strand_chain(syscalls: [u64; 2]) -> SharedChain {
    let chain = SharedChain::new();
    chain.with(|sim| {
        sim.add_record("cpu", 0, "sys", 0, &[("syscall", Value::U64(syscalls[0]))]);
        sim.add_record("cpu", 1, "sys", 0, &[("syscall", Value::U64(syscalls[1]))]);
    });
    chain
}

#[test]
fn per_instance_mode_renders_strands_and_sum() {
    let chain = two_strand_chain([100, 200]);
    let mut registry = CollectorRegistry::new(ChainHandle::new(Box::new(chain.clone())), 12);
    registry.register(Box::new(CpuSysCollector::new(DetailLevel::Normal, true, 4096)));

    // one kernel tick later the counters moved on
    chain.with(|sim| {
        sim.set_value(1, "syscall", Value::U64(140));
        sim.set_value(2, "syscall", Value::U64(260));
        sim.tick(KERNEL_UPDATE_NS);
    });

    let mut out = String::new();
    registry.scrape(&mut out, true, 2 * KERNEL_UPDATE_NS);

    assert!(out.contains("illumex_node_sys_syscall{cpu=\"0\"} 140\n"));
    assert!(out.contains("illumex_node_sys_syscall{cpu=\"1\"} 260\n"));
    assert!(out.contains("illumex_node_sys_syscall{cpu=\"sum\"} 400\n"));
    // the strand lines come before the aggregate
    let pos_0 = out.find("{cpu=\"0\"}").unwrap();
    let pos_sum = out.find("{cpu=\"sum\"}").unwrap();
    assert!(pos_0 < pos_sum);
}

#[test]
fn summary_mode_renders_only_the_sum() {
    let chain = two_strand_chain([140, 260]);
    let mut registry = CollectorRegistry::new(ChainHandle::new(Box::new(chain.clone())), 12);
    registry.register(Box::new(CpuSysCollector::new(
        DetailLevel::Normal,
        false,
        4096,
    )));

    let mut out = String::new();
    registry.scrape(&mut out, true, 1);

    assert!(out.contains("illumex_node_sys_syscall{cpu=\"sum\"} 400\n"));
    assert!(!out.contains("{cpu=\"0\"}"));
    assert!(!out.contains("{cpu=\"1\"}"));
    // exactly one preamble for the one emitted series set
    assert_eq!(out.matches("# HELP illumex_node_sys_syscall ").count(), 1);
}

#[test]
fn multi_collector_scrape_renders_every_group_once() {
    let chain = SharedChain::new();
    chain.with(|sim| {
        sim.add_record("cpu", 0, "sys", 0, &[("syscall", Value::U64(10))]);
        sim.add_record(
            "unix",
            0,
            "system_misc",
            0,
            &[
                ("avenrun_1min", Value::I32(256)),
                ("ncpus", Value::U32(1)),
                ("nproc", Value::U32(77)),
                ("boot_time", Value::U32(1_700_000_000)),
            ],
        );
        sim.add_record(
            "unix",
            0,
            "system_pages",
            0,
            &[("physmem", Value::U64(2048)), ("freemem", Value::U64(512))],
        );
        sim.add_record("tcp", 0, "tcp", 0, &[("tcpActiveOpens", Value::U64(3))]);
    });

    let mut registry = CollectorRegistry::new(ChainHandle::new(Box::new(chain.clone())), 12);
    registry.register(Box::new(LoadCollector::new(Some(1))));
    registry.register(Box::new(MemCollector::new()));
    registry.register(Box::new(CpuSysCollector::new(
        DetailLevel::Normal,
        false,
        4096,
    )));
    registry.register(Box::new(MibCollector::new(MibLevels::default())));

    let mut out = String::new();
    registry.scrape(&mut out, true, 1);

    assert!(out.contains("illumex_node_load1 1\n"));
    assert!(out.contains("illumex_node_procs 77\n"));
    assert!(out.contains("illumex_node_boot_time_seconds 1700000000\n"));
    assert!(out.contains("illumex_node_mem_phys 8388608\n"));
    assert!(out.contains("illumex_node_sys_syscall{cpu=\"sum\"} 10\n"));
    assert!(out.contains("illumex_node_mib_tcp_active_opens 3\n"));

    // every HELP line appears exactly once
    for line in out.lines().filter(|l| l.starts_with("# HELP ")) {
        assert_eq!(
            out.matches(line).count(),
            1,
            "duplicated preamble: {line}"
        );
    }
}

#[test]
fn scrapes_are_repeatable_while_nothing_changes() {
    let chain = two_strand_chain([1, 2]);
    let mut registry = CollectorRegistry::new(ChainHandle::new(Box::new(chain.clone())), 12);
    registry.register(Box::new(CpuSysCollector::new(DetailLevel::Normal, true, 4096)));

    let mut first = String::new();
    registry.scrape(&mut first, true, 1);
    let mut second = String::new();
    registry.scrape(&mut second, true, 2);
    assert_eq!(first, second, "stable chain, stable output");
}
