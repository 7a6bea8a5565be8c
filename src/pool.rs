use bumpalo::Bump;

/// Scoped bump allocator for payload bytes produced while enriching one snapshot.
///
/// Allocations are never freed individually; everything is reclaimed when the
/// pool is dropped. Borrows handed out by the pool cannot outlive it, so any
/// value that must be kept is copied (see [`VariantRef`](crate::variant::VariantRef)).
/// A pool is `!Sync` and is meant to live on one thread for one operation.
pub struct MemoryPool {
    arena: Bump,
}

impl MemoryPool {
    pub const DEFAULT_CAPACITY: usize = 64 * 1024;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            arena: Bump::with_capacity(bytes),
        }
    }

    /// Returns a zeroed span of `size` bytes.
    #[allow(clippy::mut_from_ref)]
    pub fn allocate(&self, size: usize) -> &mut [u8] {
        self.arena.alloc_slice_fill_copy(size, 0_u8)
    }

    pub fn alloc_bytes(&self, bytes: &[u8]) -> &[u8] {
        self.arena.alloc_slice_copy(bytes)
    }

    pub fn alloc_str(&self, s: &str) -> &str {
        self.arena.alloc_str(s)
    }

    /// Bytes handed out so far, including alignment padding.
    pub fn allocated_bytes(&self) -> usize {
        self.arena.allocated_bytes()
    }
}

impl Default for MemoryPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn spans_stay_valid_for_the_pool_scope() {
        let pool = MemoryPool::with_capacity(16);
        let a = pool.alloc_str("a.c");
        let b = pool.alloc_bytes(&[1, 2, 3]);
        let zeroed = pool.allocate(4);
        zeroed[0] = 9;
        // Grows past the initial capacity without disturbing earlier spans.
        let big = pool.alloc_str(&"x".repeat(1024));

        assert_eq!(a, "a.c");
        assert_eq!(b, &[1, 2, 3]);
        assert_eq!(zeroed, &[9, 0, 0, 0]);
        assert_eq!(big.len(), 1024);
        assert!(pool.allocated_bytes() >= 1024);
    }
}
