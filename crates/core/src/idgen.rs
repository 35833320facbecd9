//! Connection ID generation

use crate::ConnectionId;
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe monotonically increasing connection ID generator
#[derive(Debug, Default)]
pub struct IdGenerator {
    next_id: AtomicU64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the next available ID
    pub fn next_id(&self) -> ConnectionId {
        ConnectionId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_generation() {
        let gen = IdGenerator::new();
        let id1 = gen.next_id();
        let id2 = gen.next_id();
        assert_ne!(id1, id2);
        assert_eq!(id1.get() + 1, id2.get());
    }
}
