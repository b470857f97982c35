//! Metric collectors and the per-scrape collection pass.
//!
//! Every collector owns its record selectors, instance caches and any delta
//! state, so nothing about a metric group lives in globals; the
//! [`CollectorRegistry`] owns the chain handle, the sample reader and the
//! collectors and runs them in registration order once per scrape. A scrape
//! is strictly single-threaded: refreshing the chain invalidates records a
//! concurrent reader could still hold, so the registry must sit behind one
//! lock (see the application state).

pub mod cpu;
pub mod fs;
pub mod load;
pub mod mem;
pub mod mib;
pub mod net;
pub mod rates;
pub mod vm;

use tracing::{debug, warn};

use crate::kstat::{
    ChainHandle, Generation, RecordId, SampleReader, StatChain, MAX_CHAIN_FAILURES,
};
use crate::render::{MetricKind, MetricWriter, Num};

/// Everything a collector needs during one scrape. Reads go through the
/// reader (`cx.reader.read(&mut *cx.chain, id, cx.now)`) so the writer
/// stays borrowable while a sample is extracted.
pub struct ScrapeContext<'a> {
    pub chain: &'a mut dyn StatChain,
    pub reader: &'a mut SampleReader,
    pub writer: MetricWriter<'a>,
    pub now: i64,
    pub page_shift: u32,
}

pub trait Collector: Send {
    fn name(&self) -> &'static str;

    /// Resolve, read and render this collector's metric groups. Failures of
    /// single instances are skipped inside; a collector never aborts the
    /// scrape.
    fn collect(&mut self, cx: &mut ScrapeContext<'_>);

    /// Record ids currently resolved by this collector's caches. Drives
    /// snapshot pruning after the chain restructured.
    fn record_ids(&self, out: &mut Vec<RecordId>);
}

/// Owns chain handle, reader and collectors for the process lifetime.
pub struct CollectorRegistry {
    handle: ChainHandle,
    reader: SampleReader,
    collectors: Vec<Box<dyn Collector>>,
    page_shift: u32,
    fail_streak: u32,
    disabled: bool,
    last_generation: Option<Generation>,
}

impl CollectorRegistry {
    pub fn new(handle: ChainHandle, page_shift: u32) -> Self {
        Self {
            handle,
            reader: SampleReader::new(),
            collectors: Vec::new(),
            page_shift,
            fail_streak: 0,
            disabled: false,
            last_generation: None,
        }
    }

    pub fn register(&mut self, collector: Box<dyn Collector>) {
        self.collectors.push(collector);
    }

    /// Permanently out of service after repeated chain failures.
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Run one collection pass, appending exposition text to `out`.
    ///
    /// Chain open/refresh happens exactly once per pass. A failed pass
    /// renders nothing from the kstat collectors; more than
    /// [`MAX_CHAIN_FAILURES`] consecutive failures disable them for the
    /// rest of the process lifetime rather than spinning on a broken
    /// kernel interface forever.
    pub fn scrape(&mut self, out: &mut String, with_help: bool, now: i64) {
        if self.disabled || !self.handle.is_attached() {
            return;
        }
        match self.handle.open_or_refresh() {
            Ok(generation) => {
                self.fail_streak = 0;
                let restructured = self.last_generation != Some(generation);
                self.last_generation = Some(generation);

                let Self {
                    handle,
                    reader,
                    collectors,
                    page_shift,
                    ..
                } = self;
                let Some(chain) = handle.chain_mut() else {
                    return;
                };
                let mut cx = ScrapeContext {
                    chain,
                    reader: &mut *reader,
                    writer: MetricWriter::new(out, with_help),
                    now,
                    page_shift: *page_shift,
                };
                for collector in collectors.iter_mut() {
                    debug!("collect {} ...", collector.name());
                    collector.collect(&mut cx);
                    debug!("collect {} done", collector.name());
                }

                if restructured {
                    let mut live = Vec::new();
                    for collector in collectors.iter() {
                        collector.record_ids(&mut live);
                    }
                    reader.prune(|id| live.contains(&id));
                }
            }
            Err(e) => {
                self.fail_streak += 1;
                warn!(
                    "unable to open/update kstat chain: {e} ({}/{})",
                    self.fail_streak,
                    MAX_CHAIN_FAILURES + 1
                );
                if self.fail_streak > MAX_CHAIN_FAILURES {
                    warn!(
                        "kstat collectors disabled due to {} repeated errors. \
                         Restart the app if the problem got fixed.",
                        self.fail_streak
                    );
                    self.disabled = true;
                    self.handle.release();
                }
            }
        }
    }
}

/// One kernel field and the series it maps to.
pub(crate) struct FieldDef {
    pub kname: &'static str,
    pub metric: &'static str,
    pub desc: &'static str,
}

/// Per-strand counter rendering: one line per CPU strand when
/// multi-processor detail is on, always the `cpu="sum"` aggregate.
pub(crate) fn emit_strand_counter(
    writer: &mut MetricWriter<'_>,
    name: &'static str,
    desc: &str,
    rows: &[(i32, u64)],
    sum: u64,
    mp: bool,
) {
    writer.help(name, MetricKind::Counter, desc);
    if mp {
        for &(instance, value) in rows {
            let strand = instance.to_string();
            writer.sample(name, &[("cpu", strand.as_str())], Num::U(value));
        }
    }
    writer.sample(name, &[("cpu", "sum")], Num::U(sum));
}
