//! Shared test support: a cloneable handle around the simulated chain so a
//! test can keep mutating (and observing) the chain after moving it into a
//! registry.

use std::sync::{Arc, Mutex};

use illumex::kstat::sim::SimChain;
use illumex::kstat::{ChainError, Generation, RecordId, RecordInfo, Sample, StatChain};

#[derive(Clone, Default)]
pub struct SharedChain(Arc<Mutex<SimChain>>);

impl SharedChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut SimChain) -> R) -> R {
        f(&mut self.0.lock().unwrap())
    }
}

impl StatChain for SharedChain {
    fn sync(&mut self) -> Result<(), ChainError> {
        self.0.lock().unwrap().sync()
    }

    fn generation(&self) -> Generation {
        self.0.lock().unwrap().generation()
    }

    fn walk(&self, visit: &mut dyn FnMut(&RecordInfo) -> bool) {
        self.0.lock().unwrap().walk(visit)
    }

    fn read(&mut self, id: RecordId) -> Result<Sample, ChainError> {
        self.0.lock().unwrap().read(id)
    }
}
