//! Kernel statistics (kstat) access layer.
//!
//! This module contains the chain-synchronization engine shared by all
//! collectors: a versioned view of the kernel statistic chain, per
//! metric-group instance caches that revalidate lazily against the chain
//! generation, debounced/retrying record reads, and ping-pong delta state
//! for counters the kernel only accumulates.

pub mod cache;
pub mod chain;
pub mod delta;
pub mod reader;
pub mod sim;
pub mod source;

#[cfg(any(target_os = "illumos", target_os = "solaris"))]
pub mod ffi;

pub use cache::{InstanceCache, RecordSelector, ResolvedRecord, MAX_MATCHES};
pub use chain::{ChainHandle, RetryPolicy, MAX_CHAIN_FAILURES};
pub use delta::{per_tick, DeltaTracker};
pub use reader::{SampleReader, KERNEL_UPDATE_NS};
pub use source::{ChainError, Generation, RecordId, RecordInfo, Sample, StatChain, Value};

/// Current monotonic time in nanoseconds, comparable with record snap times.
#[cfg(any(target_os = "illumos", target_os = "solaris"))]
pub fn mono_now_ns() -> i64 {
    ffi::hrtime_now()
}

/// Current monotonic time in nanoseconds, comparable with record snap times.
///
/// Off illumos/Solaris there is no kernel chain, only the simulated one;
/// a process-relative monotonic clock matches its snap times well enough.
#[cfg(not(any(target_os = "illumos", target_os = "solaris")))]
pub fn mono_now_ns() -> i64 {
    use once_cell::sync::Lazy;
    use std::time::Instant;

    static EPOCH: Lazy<Instant> = Lazy::new(Instant::now);
    EPOCH.elapsed().as_nanos() as i64
}
