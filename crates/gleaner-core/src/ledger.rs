use std::collections::HashSet;

use crate::record::{Identity, Record};

/// Process-scoped dedup state for one run.
///
/// Tracks every identity seen so far (seeded from a prior run's output,
/// grown as records are accepted this run) together with the ordered prior
/// and new record sequences. Invariant: no identity appears twice across
/// `prior ∪ new`, and every identity in either sequence is in the set.
#[derive(Debug, Default)]
pub struct Ledger {
    known: HashSet<Identity>,
    prior: Vec<Record>,
    new: Vec<Record>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the ledger from a prior run's records, kept verbatim so the
    /// final output is prior ∪ new rather than new-only. Records whose
    /// identity repeats within the prior file are dropped on load.
    pub fn seeded(prior: Vec<Record>) -> Self {
        let mut ledger = Self::new();
        for record in prior {
            if ledger.known.insert(record.identity()) {
                ledger.prior.push(record);
            }
        }
        ledger
    }

    /// True if this identity has already been seen this run or in the seed.
    pub fn contains(&self, identity: &Identity) -> bool {
        self.known.contains(identity)
    }

    /// Accept a record into the new sequence. Returns `false` (and keeps
    /// the ledger unchanged) if the identity is already known.
    pub fn accept(&mut self, record: Record) -> bool {
        if !self.known.insert(record.identity()) {
            return false;
        }
        self.new.push(record);
        true
    }

    pub fn prior_len(&self) -> usize {
        self.prior.len()
    }

    pub fn new_len(&self) -> usize {
        self.new.len()
    }

    pub fn known_len(&self) -> usize {
        self.known.len()
    }

    /// Merged output sequence: prior records in original order, then new
    /// records in discovery order. Deterministic for a given ledger state.
    pub fn merged(&self) -> Vec<Record> {
        let mut merged = Vec::with_capacity(self.prior.len() + self.new.len());
        merged.extend(self.prior.iter().cloned());
        merged.extend(self.new.iter().cloned());
        merged
    }
}
