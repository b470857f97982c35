//! Chain handle with bounded open/refresh retries.
//!
//! The kernel reports transient contention while it rewrites the chain; the
//! handle absorbs that by sleeping a short fixed interval between attempts,
//! up to a small total budget. Anything other than the transient signal is
//! returned to the caller immediately.

use std::thread;
use std::time::Duration;

use tracing::debug;

use super::source::{ChainError, Generation, StatChain};

/// Pause between open/refresh attempts while the source reports `Busy`.
pub const CHAIN_RETRY_WAIT: Duration = Duration::from_millis(100);

/// Total time to keep retrying a busy open/refresh before giving up.
pub const CHAIN_RETRY_TIMEOUT: Duration = Duration::from_secs(2);

/// Consecutive failed scrapes after which all chain-backed collectors are
/// disabled for the rest of the process lifetime.
pub const MAX_CHAIN_FAILURES: u32 = 10;

/// Retry timing for [`ChainHandle::open_or_refresh`]. The sleep budget is
/// `timeout / wait` sleeps, i.e. `timeout / wait + 1` sync attempts total.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub wait: Duration,
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            wait: CHAIN_RETRY_WAIT,
            timeout: CHAIN_RETRY_TIMEOUT,
        }
    }
}

impl RetryPolicy {
    fn sleep_budget(&self) -> u32 {
        let wait_ms = self.wait.as_millis().max(1);
        (self.timeout.as_millis() / wait_ms).max(1) as u32
    }
}

/// Owns the chain backend for the process lifetime. `None` either means the
/// platform has no kernel chain or the handle was released after repeated
/// failures.
pub struct ChainHandle {
    chain: Option<Box<dyn StatChain>>,
    policy: RetryPolicy,
}

impl ChainHandle {
    pub fn new(chain: Box<dyn StatChain>) -> Self {
        Self::with_policy(chain, RetryPolicy::default())
    }

    pub fn with_policy(chain: Box<dyn StatChain>, policy: RetryPolicy) -> Self {
        Self {
            chain: Some(chain),
            policy,
        }
    }

    /// A handle without a backend; every scrape degrades to nothing.
    pub fn detached() -> Self {
        Self {
            chain: None,
            policy: RetryPolicy::default(),
        }
    }

    pub fn is_attached(&self) -> bool {
        self.chain.is_some()
    }

    /// Open the chain or re-synchronize its view of the kernel's record set,
    /// retrying transient contention within the policy's budget. Returns the
    /// post-refresh generation.
    pub fn open_or_refresh(&mut self) -> Result<Generation, ChainError> {
        let chain = self
            .chain
            .as_mut()
            .ok_or_else(|| ChainError::Unavailable("no chain backend".into()))?;

        let budget = self.policy.sleep_budget();
        let mut slept = 0u32;
        loop {
            match chain.sync() {
                Ok(()) => return Ok(chain.generation()),
                Err(ChainError::Busy) => {
                    if slept == budget {
                        return Err(ChainError::Exhausted {
                            attempts: slept + 1,
                            waited_ms: u64::from(slept) * self.policy.wait.as_millis() as u64,
                        });
                    }
                    debug!("kstat chain busy, retrying in {:?}", self.policy.wait);
                    thread::sleep(self.policy.wait);
                    slept += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub fn chain(&self) -> Option<&dyn StatChain> {
        self.chain.as_deref()
    }

    pub fn chain_mut(&mut self) -> Option<&mut (dyn StatChain + 'static)> {
        self.chain.as_deref_mut()
    }

    /// Drop the backend. Used by the fail-safe once the chain is considered
    /// permanently broken; subsequent scrapes are no-ops.
    pub fn release(&mut self) {
        self.chain = None;
    }
}
