// src/slab.rs
use crate::conn::{Conn, ConnState};
use std::time::Instant;

/// Fixed-capacity connection table. A connection's index doubles as its
/// readiness token.
pub struct ConnectionSlab {
    entries: Box<[Conn]>,
    head_free: i32,
    active_count: usize,
    high_water: usize,
}

impl ConnectionSlab {
    /// Allocate every slot once up front; buffers are grown lazily.
    pub fn new(capacity: usize) -> Self {
        let mut entries = Vec::with_capacity(capacity);
        for i in 0..capacity {
            let mut conn = Conn::empty();
            // While free, `fd` links to the next free slot; -1 ends the list.
            conn.fd = if i + 1 == capacity { -1 } else { (i + 1) as i32 };
            entries.push(conn);
        }

        Self {
            entries: entries.into_boxed_slice(),
            head_free: if capacity == 0 { -1 } else { 0 },
            active_count: 0,
            high_water: 0,
        }
    }

    /// O(1) allocation. Returns `None` when every slot is taken.
    #[inline]
    pub fn allocate(&mut self, new_fd: i32, now: Instant) -> Option<usize> {
        if self.head_free == -1 {
            return None;
        }

        let idx = self.head_free as usize;
        let conn = &mut self.entries[idx];
        self.head_free = conn.fd;
        conn.reset(new_fd, now);

        self.active_count += 1;
        self.high_water = self.high_water.max(idx + 1);
        Some(idx)
    }

    /// O(1) release back to the free list. Freeing a free slot is ignored.
    #[inline]
    pub fn free(&mut self, index: usize) {
        let Some(conn) = self.entries.get_mut(index) else {
            return;
        };
        if conn.state == ConnState::Free {
            return;
        }

        conn.fd = self.head_free;
        conn.state = ConnState::Free;
        self.head_free = index as i32;
        self.active_count -= 1;
    }

    /// The live connection at `index`, if any.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&Conn> {
        self.entries
            .get(index)
            .filter(|conn| conn.state != ConnState::Free)
    }

    #[inline]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Conn> {
        self.entries
            .get_mut(index)
            .filter(|conn| conn.state != ConnState::Free)
    }

    /// Indices of every live connection.
    pub fn active_indices(&self) -> Vec<usize> {
        self.entries[..self.high_water]
            .iter()
            .enumerate()
            .filter(|(_, conn)| conn.state != ConnState::Free)
            .map(|(idx, _)| idx)
            .collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.active_count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.active_count == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }
}
