//! Identifier generation for sessions, matches and other server objects.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};

/// Produces unique identifiers of the form `<prefix>-<suffix>`.
///
/// Implementations must be safe to call concurrently and never hand out the
/// same id twice for the same prefix.
pub trait IdGenerator: Send + Sync + Debug {
    /// Returns a fresh identifier.
    fn next_id(&self, prefix: &str) -> String;
}

/// Random v4 UUID suffixes. The default for a running server.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&self, prefix: &str) -> String {
        format!("{prefix}-{}", uuid::Uuid::new_v4())
    }
}

/// Monotonic counter suffixes starting at 1. Deterministic, for tests and
/// reproducible logs.
#[derive(Debug, Default)]
pub struct SequentialGenerator {
    counter: AtomicU64,
}

impl SequentialGenerator {
    /// Creates a generator whose first id ends in `1`.
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGenerator for SequentialGenerator {
    fn next_id(&self, prefix: &str) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{prefix}-{n}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_sequential_ids_are_unique_across_threads() {
        let ids = Arc::new(SequentialGenerator::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ids = Arc::clone(&ids);
                std::thread::spawn(move || (0..500).map(|_| ids.next_id("sess")).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "duplicate id");
            }
        }
        assert_eq!(seen.len(), 4000);
    }

    #[test]
    fn test_uuid_ids_carry_prefix() {
        let id = UuidGenerator.next_id("game");
        assert!(id.starts_with("game-"));
        assert_eq!(id.len(), "game-".len() + 36);
    }
}
