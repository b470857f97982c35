//! The consumed kernel-statistics interface.
//!
//! A [`StatChain`] is the versioned list of statistic records the kernel
//! maintains. Records are addressed by `(module, instance, name)` and carry
//! named, typed values. The chain id (generation) bumps whenever records are
//! added or removed, which is what the instance caches key their fast path
//! on. `Busy` is the one well-defined transient error; everything else is
//! permanent for the failing operation.

use thiserror::Error;

/// Stable id of one record within the chain. Survives chain refreshes as
/// long as the underlying record stays on the chain.
pub type RecordId = u64;

/// Chain generation. Bumps whenever the record set changes.
pub type Generation = u64;

/// Errors reported by a chain backend.
#[derive(Debug, Error)]
pub enum ChainError {
    /// Transient contention (EAGAIN-equivalent); the operation may be retried.
    #[error("kernel statistics source busy, try again")]
    Busy,

    /// The addressed record is not (or no longer) on the chain.
    #[error("no such statistic record")]
    NotFound,

    /// The retry budget for a transient condition ran out.
    #[error("giving up after {attempts} attempts ({waited_ms} ms)")]
    Exhausted { attempts: u32, waited_ms: u64 },

    /// Permanent backend failure.
    #[error("kernel statistics source unavailable: {0}")]
    Unavailable(String),
}

impl ChainError {
    /// Only `Busy` may be retried; an exhausted retry budget is final.
    pub fn is_transient(&self) -> bool {
        matches!(self, ChainError::Busy)
    }
}

/// One named value of a record.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    Str(String),
}

impl Value {
    /// Numeric widening to u64; negative and string values map to `None`.
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Value::I32(v) if v >= 0 => Some(v as u64),
            Value::U32(v) => Some(v as u64),
            Value::I64(v) if v >= 0 => Some(v as u64),
            Value::U64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::I32(v) => Some(v as i64),
            Value::U32(v) => Some(v as i64),
            Value::I64(v) => Some(v),
            Value::U64(v) => i64::try_from(v).ok(),
            _ => None,
        }
    }
}

/// Identity of a record on the chain, in chain order.
#[derive(Debug, Clone)]
pub struct RecordInfo {
    pub id: RecordId,
    pub module: String,
    pub instance: i32,
    pub name: String,
}

/// A point-in-time read of one record: the kernel snap time plus the named
/// values. Lookup mirrors the kernel's by-name access and stays linear; the
/// field count per record is small.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub snaptime: i64,
    values: Vec<(String, Value)>,
}

impl Sample {
    pub fn new(snaptime: i64) -> Self {
        Self {
            snaptime,
            values: Vec::new(),
        }
    }

    pub fn put(&mut self, name: impl Into<String>, value: Value) {
        self.values.push((name.into(), value));
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn value_u64(&self, name: &str) -> Option<u64> {
        self.get(name).and_then(Value::as_u64)
    }

    pub fn value_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A versioned chain of kernel statistic records.
///
/// Implementations: the libkstat backend on illumos/Solaris and the
/// in-memory [`sim::SimChain`](crate::kstat::sim::SimChain).
pub trait StatChain: Send {
    /// Establish the chain on first call, re-synchronize the view of the
    /// kernel's record set afterwards. On success the generation reflects
    /// the post-refresh state.
    fn sync(&mut self) -> Result<(), ChainError>;

    /// Generation after the last successful [`sync`](Self::sync).
    fn generation(&self) -> Generation;

    /// Visit records in chain order until the visitor returns `false`.
    fn walk(&self, visit: &mut dyn FnMut(&RecordInfo) -> bool);

    /// Read the current values of one record.
    fn read(&mut self, id: RecordId) -> Result<Sample, ChainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_widening() {
        assert_eq!(Value::U32(7).as_u64(), Some(7));
        assert_eq!(Value::I32(-1).as_u64(), None);
        assert_eq!(Value::I64(-1).as_u64(), None);
        assert_eq!(Value::U64(u64::MAX).as_u64(), Some(u64::MAX));
        assert_eq!(Value::Str("x".into()).as_u64(), None);
        assert_eq!(Value::U64(u64::MAX).as_i64(), None);
    }

    #[test]
    fn sample_lookup_by_name() {
        let mut s = Sample::new(42);
        s.put("syscall", Value::U64(100));
        s.put("trap", Value::U64(5));
        assert_eq!(s.value_u64("syscall"), Some(100));
        assert_eq!(s.value_u64("intr"), None);
        assert_eq!(s.snaptime, 42);
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn only_busy_is_transient() {
        assert!(ChainError::Busy.is_transient());
        assert!(!ChainError::NotFound.is_transient());
        assert!(!ChainError::Exhausted {
            attempts: 3,
            waited_ms: 20
        }
        .is_transient());
        assert!(!ChainError::Unavailable("gone".into()).is_transient());
    }
}
