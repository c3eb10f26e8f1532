//! Deferred verification checks
//!
//! Expensive proof verifications are packaged as closures and pushed onto a
//! caller-owned [`CheckQueue`]. Draining the queue runs every check on the
//! rayon pool and yields the logical AND of the results.

use crate::confidential_validation::AmountVerifier;
use crate::error::AmountError;
use crate::hashes::sha256;
use crate::types::Hash;
use log::debug;
use parking_lot::RwLock;
use rayon::prelude::*;
use std::collections::HashSet;

pub type CheckResult = std::result::Result<(), AmountError>;

/// A check that runs once against the verifier's context
pub type DeferredCheck = Box<dyn FnOnce(&AmountVerifier) -> CheckResult + Send>;

#[derive(Default)]
pub struct CheckQueue {
    checks: Vec<DeferredCheck>,
}

impl CheckQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, check: DeferredCheck) {
        self.checks.push(check);
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Run every queued check in parallel.
    ///
    /// All checks run even after a failure; the first failure in queue order
    /// is returned. The queue is left empty.
    pub fn drain(&mut self, verifier: &AmountVerifier) -> CheckResult {
        let checks = std::mem::take(&mut self.checks);
        debug!("draining {} deferred checks", checks.len());
        let results: Vec<CheckResult> = checks.into_par_iter().map(|check| check(verifier)).collect();
        results.into_iter().collect()
    }
}

impl std::fmt::Debug for CheckQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckQueue").field("len", &self.checks.len()).finish()
    }
}

/// Run a check inline, or hand it to the queue when one is supplied
pub(crate) fn queue_check(
    queue: &mut Option<&mut CheckQueue>,
    verifier: &AmountVerifier,
    check: DeferredCheck,
) -> CheckResult {
    match queue {
        Some(queue) => {
            queue.push(check);
            Ok(())
        }
        None => check(verifier),
    }
}

/// Remembers proofs that already verified successfully
pub struct ProofCache {
    entries: RwLock<HashSet<Hash>>,
    capacity: usize,
}

impl ProofCache {
    pub fn new(capacity: usize) -> Self {
        ProofCache { entries: RwLock::new(HashSet::new()), capacity }
    }

    /// Cache key over a domain tag and the verified material
    pub fn key(tag: u8, parts: &[&[u8]]) -> Hash {
        let mut buf = vec![tag];
        for part in parts {
            buf.extend_from_slice(&(part.len() as u32).to_le_bytes());
            buf.extend_from_slice(part);
        }
        sha256(&buf)
    }

    pub fn contains(&self, key: &Hash) -> bool {
        self.entries.read().contains(key)
    }

    /// Remember `key`. When full, an arbitrary entry is evicted first; keys
    /// are hashes and the set's hasher is randomly seeded, so the victim is
    /// unpredictable.
    pub fn insert(&self, key: Hash) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.write();
        if entries.contains(&key) {
            return;
        }
        if entries.len() >= self.capacity {
            if let Some(victim) = entries.iter().next().copied() {
                entries.remove(&victim);
            }
        }
        entries.insert(key);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
