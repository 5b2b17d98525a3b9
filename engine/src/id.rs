//! Process-unique 64-bit identifiers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque handle; `0` is reserved as invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Identifier(u64);

impl Identifier {
    pub const INVALID: Self = Self(0);

    /// Allocate a fresh identifier. Never returns `INVALID`.
    pub fn generate() -> Self {
        loop {
            let raw = NEXT_ID.fetch_add(1, Ordering::Relaxed);
            if raw != 0 {
                return Self(raw);
            }
        }
    }

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for Identifier {
    /// 16-char lowercase hex.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use parking_lot::Mutex;

    #[test]
    fn test_invalid_formats_as_zeroes() {
        assert_eq!(Identifier::INVALID.to_string(), "0000000000000000");
        assert!(!Identifier::INVALID.is_valid());
    }

    #[test]
    fn test_hex_format() {
        let id = Identifier::from_raw(0xabc);
        assert_eq!(id.to_string(), "0000000000000abc");
        assert_eq!(id.to_string().len(), 16);
    }

    #[test]
    fn test_generated_ids_are_unique_across_threads() {
        let seen = Arc::new(Mutex::new(HashSet::new()));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let seen = Arc::clone(&seen);
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        let id = Identifier::generate();
                        assert!(id.is_valid());
                        assert!(seen.lock().insert(id));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(seen.lock().len(), 4000);
    }

    #[test]
    fn test_equality_and_hash_agree() {
        let a = Identifier::from_raw(42);
        let b = Identifier::from_raw(42);
        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
        assert_eq!(a, b);
        assert!(Identifier::from_raw(1) < Identifier::from_raw(2));
    }
}
