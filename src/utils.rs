//! # Utilities Module
//!
//! ## Purpose
//! Common helpers used throughout the pipeline: operation timing and stable
//! content hashing for cache keys and reproducible identifiers.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Instant;
use uuid::Uuid;

/// Performance timer for measuring operation duration
pub struct Timer {
    start: Instant,
    name: String,
}

impl Timer {
    /// Start a new timer with a name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Get elapsed time in milliseconds
    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Stop timer and log duration
    pub fn stop(self) -> u64 {
        let elapsed = self.elapsed_ms();
        tracing::debug!("timer '{}' completed in {}ms", self.name, elapsed);
        elapsed
    }
}

/// Stable 64-bit hash of a string
///
/// `DefaultHasher::new()` uses fixed keys, so the value is reproducible across
/// runs; used for oracle cache keys and deterministic identifiers.
pub fn stable_hash(text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}

/// Deterministic UUID derived from an ordered list of parts
///
/// Re-running a stage over the same member set reproduces the same id, which
/// is what makes group ids stable across pipeline re-runs.
pub fn stable_uuid(parts: &[String]) -> Uuid {
    let joined = parts.join("\u{1f}");
    let hi = stable_hash(&format!("hi:{}", joined));
    let lo = stable_hash(&format!("lo:{}", joined));
    Uuid::from_u64_pair(hi, lo)
}

/// Disjoint-set forest with path compression and union by size
///
/// Used for duplicate clusters and transitive group merging.
pub struct UnionFind {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl UnionFind {
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            size: vec![1; n],
        }
    }

    pub fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    pub fn union(&mut self, a: usize, b: usize) {
        let (mut ra, mut rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        if self.size[ra] < self.size[rb] {
            std::mem::swap(&mut ra, &mut rb);
        }
        self.parent[rb] = ra;
        self.size[ra] += self.size[rb];
    }

    pub fn same_set(&mut self, a: usize, b: usize) -> bool {
        self.find(a) == self.find(b)
    }
}
