//! Deterministic in-memory chain.
//!
//! Plays the kernel's role for tests and for development on machines
//! without a kstat chain: records can be added, removed and mutated, every
//! structural change bumps the generation, and failures (busy syncs, busy
//! reads, fatal syncs) can be injected. Call counters make cache fast paths
//! and debounce behavior observable from the outside.

use std::cell::Cell;

use super::source::{ChainError, Generation, RecordId, RecordInfo, Sample, StatChain, Value};

struct SimRecord {
    id: RecordId,
    module: String,
    instance: i32,
    name: String,
    snaptime: i64,
    values: Vec<(String, Value)>,
}

#[derive(Default)]
pub struct SimChain {
    records: Vec<SimRecord>,
    generation: Generation,
    next_id: RecordId,
    busy_syncs: u32,
    always_busy: bool,
    fatal_sync: Option<String>,
    busy_reads: u32,
    sync_calls: Cell<u64>,
    walk_calls: Cell<u64>,
    read_calls: Cell<u64>,
}

impl SimChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record in chain order. Bumps the generation, as the kernel
    /// does when an instance appears.
    pub fn add_record(
        &mut self,
        module: &str,
        instance: i32,
        name: &str,
        snaptime: i64,
        values: &[(&str, Value)],
    ) -> RecordId {
        self.next_id += 1;
        let id = self.next_id;
        self.records.push(SimRecord {
            id,
            module: module.to_string(),
            instance,
            name: name.to_string(),
            snaptime,
            values: values
                .iter()
                .map(|(n, v)| (n.to_string(), v.clone()))
                .collect(),
        });
        self.generation += 1;
        id
    }

    /// Remove a record. Bumps the generation.
    pub fn remove_record(&mut self, id: RecordId) {
        self.records.retain(|r| r.id != id);
        self.generation += 1;
    }

    /// Update (or add) one value of a record without touching the
    /// generation; value changes do not restructure the chain.
    pub fn set_value(&mut self, id: RecordId, name: &str, value: Value) {
        if let Some(rec) = self.records.iter_mut().find(|r| r.id == id) {
            match rec.values.iter_mut().find(|(n, _)| n == name) {
                Some((_, v)) => *v = value,
                None => rec.values.push((name.to_string(), value)),
            }
        }
    }

    pub fn set_snaptime(&mut self, id: RecordId, snaptime: i64) {
        if let Some(rec) = self.records.iter_mut().find(|r| r.id == id) {
            rec.snaptime = snaptime;
        }
    }

    /// Advance every record's snap time, as a kernel update tick would.
    pub fn tick(&mut self, ns: i64) {
        for rec in &mut self.records {
            rec.snaptime += ns;
        }
    }

    /// The next `n` syncs report `Busy`, then syncs succeed again.
    pub fn fail_next_syncs(&mut self, n: u32) {
        self.busy_syncs = n;
    }

    /// Every sync reports `Busy` from now on.
    pub fn always_busy(&mut self) {
        self.always_busy = true;
    }

    /// Every sync fails permanently with the given message.
    pub fn fail_sync_fatal(&mut self, msg: &str) {
        self.fatal_sync = Some(msg.to_string());
    }

    /// The next `n` reads report `Busy`, then reads succeed again.
    pub fn fail_next_reads(&mut self, n: u32) {
        self.busy_reads = n;
    }

    /// Clear every injected failure.
    pub fn recover(&mut self) {
        self.busy_syncs = 0;
        self.always_busy = false;
        self.fatal_sync = None;
        self.busy_reads = 0;
    }

    pub fn sync_count(&self) -> u64 {
        self.sync_calls.get()
    }

    pub fn walk_count(&self) -> u64 {
        self.walk_calls.get()
    }

    pub fn read_count(&self) -> u64 {
        self.read_calls.get()
    }
}

impl StatChain for SimChain {
    fn sync(&mut self) -> Result<(), ChainError> {
        self.sync_calls.set(self.sync_calls.get() + 1);
        if let Some(msg) = &self.fatal_sync {
            return Err(ChainError::Unavailable(msg.clone()));
        }
        if self.always_busy {
            return Err(ChainError::Busy);
        }
        if self.busy_syncs > 0 {
            self.busy_syncs -= 1;
            return Err(ChainError::Busy);
        }
        Ok(())
    }

    fn generation(&self) -> Generation {
        self.generation
    }

    fn walk(&self, visit: &mut dyn FnMut(&RecordInfo) -> bool) {
        self.walk_calls.set(self.walk_calls.get() + 1);
        for rec in &self.records {
            let info = RecordInfo {
                id: rec.id,
                module: rec.module.clone(),
                instance: rec.instance,
                name: rec.name.clone(),
            };
            if !visit(&info) {
                break;
            }
        }
    }

    fn read(&mut self, id: RecordId) -> Result<Sample, ChainError> {
        self.read_calls.set(self.read_calls.get() + 1);
        if self.busy_reads > 0 {
            self.busy_reads -= 1;
            return Err(ChainError::Busy);
        }
        let rec = self
            .records
            .iter()
            .find(|r| r.id == id)
            .ok_or(ChainError::NotFound)?;
        let mut sample = Sample::new(rec.snaptime);
        for (name, value) in &rec.values {
            sample.put(name.clone(), value.clone());
        }
        Ok(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_changes_bump_the_generation() {
        let mut sim = SimChain::new();
        let g0 = sim.generation();
        let id = sim.add_record("cpu", 0, "sys", 0, &[]);
        assert!(sim.generation() > g0);

        let g1 = sim.generation();
        sim.set_value(id, "syscall", Value::U64(1));
        sim.set_snaptime(id, 99);
        assert_eq!(sim.generation(), g1, "value changes keep the generation");

        sim.remove_record(id);
        assert!(sim.generation() > g1);
    }

    #[test]
    fn walk_yields_chain_order() {
        let mut sim = SimChain::new();
        sim.add_record("cpu", 1, "sys", 0, &[]);
        sim.add_record("cpu", 0, "sys", 0, &[]);

        let mut seen = Vec::new();
        sim.walk(&mut |rec| {
            seen.push(rec.instance);
            true
        });
        assert_eq!(seen, vec![1, 0], "insertion order, no sorting");
    }

    #[test]
    fn read_of_unknown_record_is_not_found() {
        let mut sim = SimChain::new();
        assert!(matches!(sim.read(12345), Err(ChainError::NotFound)));
    }
}
