//! Class-id allocation.
//!
//! Ids 1-127 belong to classes the user wrote explicitly in the query
//! syntax; the allocator issues compiler-internal ids from 128 upward.
//! One allocator per translation, threaded through the normalizer and
//! never shared across queries.

use koralq_core::{Group, QueryNode};

#[derive(Debug)]
pub struct ClassAllocator {
    next: u32,
}

impl ClassAllocator {
    /// First compiler-internal class id.
    pub const FIRST_INTERNAL: u32 = 128;

    pub fn new() -> Self {
        ClassAllocator { next: Self::FIRST_INTERNAL }
    }

    /// Next unused id; strictly increasing, never reset mid-translation.
    pub fn allocate(&mut self) -> u32 {
        let id = self.next;
        self.next += 1;
        id
    }

    /// Wrap `node` in a class group issuing a fresh id.
    pub fn wrap_fresh(&mut self, node: QueryNode) -> (u32, QueryNode) {
        let id = self.allocate();
        (id, Group::class(id, node).into())
    }
}

impl Default for ClassAllocator {
    fn default() -> Self {
        ClassAllocator::new()
    }
}
