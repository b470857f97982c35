//! Debounced, retrying record reads.
//!
//! The kernel refreshes most statistic providers once per second, so a
//! snapshot younger than that cannot differ from what a re-read would
//! return. The reader keeps the last good snapshot per record and only goes
//! back to the chain when the snapshot has aged past the kernel's update
//! granularity. Transient read contention is retried a few times with a
//! short pause; any other failure skips the record for this scrape only.

use std::thread;
use std::time::Duration;

use ahash::AHashMap;
use tracing::{debug, warn};

use super::source::{ChainError, RecordId, Sample, StatChain};

/// The kernel's statistic update granularity in nanoseconds.
pub const KERNEL_UPDATE_NS: i64 = 1_000_000_000;

/// Attempts per record read while the source reports `Busy`.
pub const MAX_READ_TRIES: u32 = 5;

/// Pause before each retry after the first busy attempt.
pub const READ_RETRY_WAIT: Duration = Duration::from_millis(10);

pub struct SampleReader {
    snapshots: AHashMap<RecordId, Sample>,
    retry_wait: Duration,
}

impl Default for SampleReader {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleReader {
    pub fn new() -> Self {
        Self::with_retry_wait(READ_RETRY_WAIT)
    }

    pub fn with_retry_wait(retry_wait: Duration) -> Self {
        Self {
            snapshots: AHashMap::new(),
            retry_wait,
        }
    }

    /// Fetch the current values of `id`, or hand back the cached snapshot if
    /// it is younger than [`KERNEL_UPDATE_NS`]. `None` means the record is
    /// unreadable this scrape; callers must skip it, never treat it as zero.
    pub fn read(
        &mut self,
        chain: &mut dyn StatChain,
        id: RecordId,
        now: i64,
    ) -> Option<&Sample> {
        let fresh = self
            .snapshots
            .get(&id)
            .map(|s| {
                let age = now - s.snaptime;
                age > 0 && age < KERNEL_UPDATE_NS
            })
            .unwrap_or(false);
        if fresh {
            return self.snapshots.get(&id);
        }

        let mut tries = 0u32;
        loop {
            match chain.read(id) {
                Ok(sample) => {
                    self.snapshots.insert(id, sample);
                    return self.snapshots.get(&id);
                }
                Err(ChainError::Busy) => {
                    tries += 1;
                    if tries >= MAX_READ_TRIES {
                        debug!("record {id} still busy after {tries} attempts - skipped");
                        return None;
                    }
                    thread::sleep(self.retry_wait);
                }
                Err(e) => {
                    warn!("record {id} read error: {e}");
                    // whatever we held for this id describes a record that
                    // no longer answers; drop it
                    self.snapshots.remove(&id);
                    return None;
                }
            }
        }
    }

    /// Drop snapshots of records that are no longer resolved anywhere.
    /// Called after a chain rebuild so churn (links, zones) cannot grow the
    /// store without bound.
    pub fn prune(&mut self, live: impl Fn(RecordId) -> bool) {
        self.snapshots.retain(|id, _| live(*id));
    }

    pub fn cached(&self) -> usize {
        self.snapshots.len()
    }
}
