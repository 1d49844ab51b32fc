//! Reusable capture buffers
//!
//! Capture buffers are borrowed from an [`ObjectPool`] at the start of a
//! request and handed back when the request is done. Borrowing yields a
//! [`Pooled`] guard which returns the item when dropped, so the buffer goes
//! back on every exit path: normal completion, early rejection, or a panic
//! further down the stack.
//!
//! A borrowed item belongs to exactly one request. Once the guard is dropped
//! the item is reset before anyone else can borrow it.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Default number of idle items kept by a pool
pub const DEFAULT_MAX_IDLE: usize = 256;

/// Buffers that grew past this capacity are dropped instead of pooled
pub const DEFAULT_MAX_RETAINED_CAPACITY: usize = 1024 * 1024;

/// Items that can be cleared and handed to another borrower
pub trait Reusable: Default + Send + 'static {
    /// Clear the item for its next borrower.
    ///
    /// Returns `false` when the item should be dropped rather than kept,
    /// e.g. because it holds on to an unusually large allocation.
    fn reset(&mut self, max_retained_capacity: usize) -> bool;
}

impl Reusable for Vec<u8> {
    fn reset(&mut self, max_retained_capacity: usize) -> bool {
        self.clear();
        self.capacity() <= max_retained_capacity
    }
}

/// Pool of capture buffers
pub type BufferPool = ObjectPool<Vec<u8>>;

/// Borrow/return counters of a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Items handed out so far
    pub borrowed: u64,
    /// Items given back so far
    pub returned: u64,
    /// Items currently waiting in the pool
    pub idle: usize,
}

impl PoolStats {
    /// Items borrowed and not yet returned
    pub fn outstanding(&self) -> u64 {
        self.borrowed.saturating_sub(self.returned)
    }
}

struct Shared<T> {
    idle: Mutex<Vec<T>>,
    max_idle: usize,
    max_retained_capacity: usize,
    borrowed: AtomicU64,
    returned: AtomicU64,
}

impl<T> Shared<T> {
    fn idle(&self) -> MutexGuard<'_, Vec<T>> {
        // The idle list stays consistent even if a holder panicked.
        self.idle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Thread-safe pool of reusable items
///
/// Cloning the pool is cheap and yields a handle to the same items.
pub struct ObjectPool<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Reusable> ObjectPool<T> {
    /// Create a pool with the default limits
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_IDLE, DEFAULT_MAX_RETAINED_CAPACITY)
    }

    /// Create a pool keeping at most `max_idle` items, each no larger than
    /// `max_retained_capacity`
    pub fn with_limits(max_idle: usize, max_retained_capacity: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                idle: Mutex::new(Vec::new()),
                max_idle,
                max_retained_capacity,
                borrowed: AtomicU64::new(0),
                returned: AtomicU64::new(0),
            }),
        }
    }

    /// Borrow an item, creating a fresh one when the pool is empty
    pub fn get(&self) -> Pooled<T> {
        let item = self.shared.idle().pop().unwrap_or_default();
        self.shared.borrowed.fetch_add(1, Ordering::Relaxed);
        Pooled {
            item: Some(item),
            shared: self.shared.clone(),
        }
    }

    /// Current borrow/return counters
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            borrowed: self.shared.borrowed.load(Ordering::Relaxed),
            returned: self.shared.returned.load(Ordering::Relaxed),
            idle: self.shared.idle().len(),
        }
    }
}

impl<T: Reusable> Default for ObjectPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for ObjectPool<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> fmt::Debug for ObjectPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectPool")
            .field("max_idle", &self.shared.max_idle)
            .field("max_retained_capacity", &self.shared.max_retained_capacity)
            .finish()
    }
}

/// An item on loan from an [`ObjectPool`]
///
/// Dereferences to the item. Dropping the guard resets the item and puts it
/// back into the pool.
pub struct Pooled<T: Reusable> {
    item: Option<T>,
    shared: Arc<Shared<T>>,
}

impl<T: Reusable> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Only `Drop` takes the item out.
        self.item.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl<T: Reusable> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.item.as_mut().unwrap_or_else(|| unreachable!())
    }
}

impl<T: Reusable + fmt::Debug> fmt::Debug for Pooled<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pooled").field(&self.item).finish()
    }
}

impl<T: Reusable> Drop for Pooled<T> {
    fn drop(&mut self) {
        let Some(mut item) = self.item.take() else {
            return;
        };
        self.shared.returned.fetch_add(1, Ordering::Relaxed);

        if !item.reset(self.shared.max_retained_capacity) {
            return;
        }
        let mut idle = self.shared.idle();
        if idle.len() < self.shared.max_idle {
            idle.push(item);
        }
    }
}
