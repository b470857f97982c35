//! Per metric-group resolution of chain records, cached by generation.
//!
//! Every collector describes the records it wants with a [`RecordSelector`]
//! and keeps an [`InstanceCache`] per selector. Resolution is O(1) while the
//! chain generation is unchanged; only a generation bump (CPUs onlined,
//! links created/destroyed, zones booted) triggers a single ordered walk.

use tracing::warn;

use super::source::{Generation, RecordId, RecordInfo, StatChain};

/// Upper bound on matches collected per selector. Exceeding it drops the
/// remaining instances for this group with a warning; it is not fatal.
pub const MAX_MATCHES: usize = 128;

/// Largest instance id considered sane. Matches above it are excluded so a
/// corrupted chain cannot blow up downstream per-instance tables.
pub const DEFAULT_MAX_INSTANCE: i32 = 4096;

/// What a metric group wants from the chain. `None` fields are wildcards;
/// at least one of module/name must be concrete.
#[derive(Debug, Clone, Copy)]
pub struct RecordSelector {
    pub module: Option<&'static str>,
    pub instance: Option<i32>,
    pub name: Option<&'static str>,
}

impl RecordSelector {
    pub fn new(
        module: Option<&'static str>,
        instance: Option<i32>,
        name: Option<&'static str>,
    ) -> Self {
        debug_assert!(module.is_some() || name.is_some());
        Self {
            module,
            instance,
            name,
        }
    }

    fn matches(&self, rec: &RecordInfo) -> bool {
        if let Some(m) = self.module {
            if m != rec.module {
                return false;
            }
        }
        if let Some(i) = self.instance {
            if i != rec.instance {
                return false;
            }
        }
        if let Some(n) = self.name {
            if n != rec.name {
                return false;
            }
        }
        true
    }

    fn is_concrete(&self) -> bool {
        self.module.is_some() && self.instance.is_some() && self.name.is_some()
    }
}

/// One resolved record: the stable chain id plus the identity fields the
/// collectors label their series with.
#[derive(Debug, Clone)]
pub struct ResolvedRecord {
    pub id: RecordId,
    pub instance: i32,
    pub module: String,
    pub name: String,
}

/// Cached resolution of one selector against the chain.
pub struct InstanceCache {
    selector: RecordSelector,
    last_generation: Option<Generation>,
    records: Vec<ResolvedRecord>,
    max_instance: i32,
}

impl InstanceCache {
    pub fn new(selector: RecordSelector) -> Self {
        Self::with_max_instance(selector, DEFAULT_MAX_INSTANCE)
    }

    pub fn with_max_instance(selector: RecordSelector, max_instance: i32) -> Self {
        Self {
            selector,
            last_generation: None,
            records: Vec::new(),
            max_instance,
        }
    }

    /// Resolve the current instance set. Fast path: generation unchanged,
    /// return the cached count without touching the chain list. Slow path:
    /// one walk in chain order, collecting every match of the selector up to
    /// [`MAX_MATCHES`].
    pub fn resolve(&mut self, chain: &dyn StatChain) -> usize {
        let generation = chain.generation();
        if self.last_generation == Some(generation) {
            return self.records.len();
        }

        let Self {
            selector,
            records,
            max_instance,
            ..
        } = self;
        records.clear();
        let mut truncated = false;
        let mut oversized = 0u32;
        chain.walk(&mut |rec| {
            if !selector.matches(rec) {
                return true;
            }
            if rec.instance > *max_instance {
                oversized += 1;
                return true;
            }
            if records.len() == MAX_MATCHES {
                truncated = true;
                return false;
            }
            records.push(ResolvedRecord {
                id: rec.id,
                instance: rec.instance,
                module: rec.module.clone(),
                name: rec.name.clone(),
            });
            // a fully concrete selector has exactly one possible match
            !selector.is_concrete()
        });

        if truncated {
            warn!(
                "max instances ({}) found for {:?} - skipping others",
                MAX_MATCHES, self.selector
            );
        }
        if oversized > 0 {
            warn!(
                "{} instances of {:?} above the supported id bound {} - ignored",
                oversized, self.selector, self.max_instance
            );
        }

        self.last_generation = Some(generation);
        self.records.len()
    }

    /// Valid entries only; slots beyond the last resolve's count are gone,
    /// never stale leftovers from a larger earlier epoch.
    pub fn records(&self) -> &[ResolvedRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether the cached set already reflects the chain's generation.
    pub fn is_current(&self, chain: &dyn StatChain) -> bool {
        self.last_generation == Some(chain.generation())
    }

    /// Force a rebuild on the next [`resolve`](Self::resolve).
    pub fn invalidate(&mut self) {
        self.last_generation = None;
    }
}
