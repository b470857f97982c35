//! illumex - Solaris/illumos kstat exporter library
//!
//! The reusable core of the exporter: the kstat chain-synchronization
//! engine (generation-checked instance caches, debounced reads, ping-pong
//! delta state), the Prometheus exposition writer, the concrete collectors
//! and the configuration layer. The binary in `main.rs` wires these into an
//! axum server; tests and downstream tooling can drive a
//! [`collectors::CollectorRegistry`] against any [`kstat::StatChain`]
//! implementation, including the deterministic [`kstat::sim::SimChain`].
//!
//! # Usage
//!
//! ```rust
//! use illumex::collectors::{CollectorRegistry, cpu::CpuSysCollector};
//! use illumex::config::DetailLevel;
//! use illumex::kstat::{sim::SimChain, ChainHandle, Value};
//!
//! let mut sim = SimChain::new();
//! sim.add_record("cpu", 0, "sys", 0, &[("syscall", Value::U64(42))]);
//!
//! let mut registry = CollectorRegistry::new(ChainHandle::new(Box::new(sim)), 12);
//! registry.register(Box::new(CpuSysCollector::new(DetailLevel::Normal, false, 4096)));
//!
//! let mut out = String::new();
//! registry.scrape(&mut out, true, 1);
//! assert!(out.contains("illumex_node_sys_syscall{cpu=\"sum\"} 42"));
//! ```

pub mod cli;
pub mod collectors;
pub mod config;
pub mod kstat;
pub mod render;
