//! Pooled media buffers
//!
//! Media payloads are fanned out to an arbitrary number of subscribers, so
//! allocating per packet per subscriber would dominate the hot path. The
//! pool hands out fixed-capacity allocations instead:
//!
//! 1. [`BufferPool::rent`] returns a [`RentedBuffer`] — uniquely owned and
//!    writable, filled exactly once by its producer.
//! 2. [`RentedBuffer::freeze`] converts it into a read-only
//!    [`SharedBuffer`]. Every consumer takes its own claim via
//!    [`SharedBuffer::claim`] and releases it by dropping the handle.
//! 3. When the last claim drops, the allocation returns to the pool.
//!
//! Because a claim is a handle rather than a counter the producer mutates,
//! releasing more claims than were taken is unrepresentable.

use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// Default capacity of pooled allocations (covers typical video messages)
pub const DEFAULT_BUFFER_CAPACITY: usize = 64 * 1024;

/// How many idle allocations the free list keeps before dropping extras
const MAX_POOLED: usize = 256;

struct PoolShared {
    capacity: usize,
    free: Mutex<Vec<Vec<u8>>>,
    rented: AtomicU64,
    recycled: AtomicU64,
}

impl PoolShared {
    fn take(&self, len: usize) -> Vec<u8> {
        self.rented.fetch_add(1, Ordering::Relaxed);

        if len <= self.capacity {
            if let Some(buf) = self.free.lock().expect("pool lock poisoned").pop() {
                self.recycled.fetch_add(1, Ordering::Relaxed);
                return buf;
            }
            Vec::with_capacity(self.capacity)
        } else {
            // Oversized messages get an exact allocation that is not
            // returned to the free list.
            Vec::with_capacity(len)
        }
    }

    fn put(&self, mut buf: Vec<u8>) {
        if buf.capacity() != self.capacity {
            return;
        }
        let mut free = self.free.lock().expect("pool lock poisoned");
        if free.len() < MAX_POOLED {
            buf.clear();
            free.push(buf);
        }
    }
}

/// Grow-on-demand pool of fixed-capacity byte buffers
///
/// Cheap to clone; all clones share the same free list.
#[derive(Clone)]
pub struct BufferPool {
    shared: Arc<PoolShared>,
}

impl BufferPool {
    /// Create a pool whose pooled allocations hold `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                capacity,
                free: Mutex::new(Vec::new()),
                rented: AtomicU64::new(0),
                recycled: AtomicU64::new(0),
            }),
        }
    }

    /// Rent a writable buffer able to hold at least `len` bytes
    ///
    /// The pool grows on demand; renting never fails.
    pub fn rent(&self, len: usize) -> RentedBuffer {
        let data = self.shared.take(len);
        RentedBuffer {
            pool: Arc::downgrade(&self.shared),
            data: Some(data),
        }
    }

    /// Total rents served since creation
    pub fn rented(&self) -> u64 {
        self.shared.rented.load(Ordering::Relaxed)
    }

    /// Rents served from the free list rather than a fresh allocation
    pub fn recycled(&self) -> u64 {
        self.shared.recycled.load(Ordering::Relaxed)
    }

    /// Allocations currently sitting idle in the free list
    pub fn idle(&self) -> usize {
        self.shared.free.lock().expect("pool lock poisoned").len()
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY)
    }
}

/// A writable buffer checked out from the pool
///
/// Owned by exactly one producer. Returns to the pool on drop unless it is
/// frozen into a [`SharedBuffer`] first.
pub struct RentedBuffer {
    pool: Weak<PoolShared>,
    data: Option<Vec<u8>>,
}

impl RentedBuffer {
    /// Bytes written so far
    pub fn len(&self) -> usize {
        self.data.as_ref().map_or(0, Vec::len)
    }

    /// True if nothing has been written yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append bytes to the buffer
    pub fn put_slice(&mut self, bytes: &[u8]) {
        self.data
            .as_mut()
            .expect("rented buffer already consumed")
            .extend_from_slice(bytes);
    }

    /// View of the bytes written so far
    pub fn as_slice(&self) -> &[u8] {
        self.data.as_deref().unwrap_or(&[])
    }

    /// Freeze into an immutable, claimable handle
    ///
    /// After this point the contents are read-only for every consumer.
    pub fn freeze(mut self) -> SharedBuffer {
        let data = self.data.take().expect("rented buffer already consumed");
        SharedBuffer {
            core: Arc::new(SharedCore {
                pool: self.pool.clone(),
                data,
            }),
        }
    }
}

impl Drop for RentedBuffer {
    fn drop(&mut self) {
        if let (Some(data), Some(pool)) = (self.data.take(), self.pool.upgrade()) {
            pool.put(data);
        }
    }
}

struct SharedCore {
    pool: Weak<PoolShared>,
    data: Vec<u8>,
}

impl Drop for SharedCore {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.upgrade() {
            pool.put(std::mem::take(&mut self.data));
        }
    }
}

/// Read-only, reference-counted view of a pooled buffer
///
/// Each handle is one claim. The underlying allocation returns to the pool
/// when the last claim is dropped.
pub struct SharedBuffer {
    core: Arc<SharedCore>,
}

impl SharedBuffer {
    /// Take an additional claim on the buffer
    pub fn claim(&self) -> SharedBuffer {
        SharedBuffer {
            core: Arc::clone(&self.core),
        }
    }

    /// Number of live claims
    pub fn claims(&self) -> usize {
        Arc::strong_count(&self.core)
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.core.data.len()
    }

    /// True for a zero-length payload
    pub fn is_empty(&self) -> bool {
        self.core.data.is_empty()
    }
}

impl Deref for SharedBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.core.data
    }
}

impl Clone for SharedBuffer {
    fn clone(&self) -> Self {
        self.claim()
    }
}

impl std::fmt::Debug for SharedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedBuffer")
            .field("len", &self.len())
            .field("claims", &self.claims())
            .finish()
    }
}
