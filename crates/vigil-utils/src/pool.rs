use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crossbeam::queue::ArrayQueue;
use once_cell::sync::Lazy;

/// Values that can be recycled through an [`ObjectPool`].
///
/// `reset` runs when a value is returned, so borrowers always see a clean
/// instance and never each other's data.
pub trait Reusable {
    fn reset(&mut self);
}

impl Reusable for Vec<u8> {
    fn reset(&mut self) {
        self.clear();
    }
}

impl Reusable for String {
    fn reset(&mut self) {
        self.clear();
    }
}

/// A factory-backed pool of reusable values.
///
/// `acquire` hands out a recycled value when one is available, otherwise a
/// freshly constructed one. The guard returns the value on drop, which makes
/// a double return unrepresentable. No guarantee is made about *which*
/// instance is returned.
pub struct ObjectPool<T: Reusable> {
    inner: Arc<PoolInner<T>>,
}

struct PoolInner<T> {
    slots: ArrayQueue<T>,
    factory: Box<dyn Fn() -> T + Send + Sync>,
}

impl<T: Reusable> ObjectPool<T> {
    /// The factory is mandatory; the pool holds at most `capacity` idle
    /// values and drops returns beyond that.
    pub fn new(capacity: usize, factory: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                slots: ArrayQueue::new(capacity.max(1)),
                factory: Box::new(factory),
            }),
        }
    }

    pub fn acquire(&self) -> PoolGuard<T> {
        let value = self
            .inner
            .slots
            .pop()
            .unwrap_or_else(|| (self.inner.factory)());
        PoolGuard {
            value: Some(value),
            pool: Arc::clone(&self.inner),
        }
    }

    /// Number of idle values currently held.
    pub fn idle(&self) -> usize {
        self.inner.slots.len()
    }
}

impl<T: Reusable> Clone for ObjectPool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// RAII guard; resets and returns the value to the pool on drop.
pub struct PoolGuard<T: Reusable> {
    value: Option<T>,
    pool: Arc<PoolInner<T>>,
}

impl<T: Reusable> PoolGuard<T> {
    /// Take the value out of the pool's custody permanently.
    pub fn detach(mut self) -> T {
        self.value.take().expect("pool guard already detached")
    }
}

impl<T: Reusable> Deref for PoolGuard<T> {
    type Target = T;
    fn deref(&self) -> &T {
        self.value.as_ref().expect("pool guard already detached")
    }
}

impl<T: Reusable> DerefMut for PoolGuard<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.value.as_mut().expect("pool guard already detached")
    }
}

impl<T: Reusable> Drop for PoolGuard<T> {
    fn drop(&mut self) {
        if let Some(mut value) = self.value.take() {
            value.reset();
            // If the pool is full the value is simply dropped.
            let _ = self.pool.slots.push(value);
        }
    }
}

pub type BufferPool = ObjectPool<Vec<u8>>;

const BUFFER_POOL_CAPACITY: usize = 64;
const BUFFER_INITIAL_SIZE: usize = 4 * 1024;

static BUFFERS: Lazy<BufferPool> = Lazy::new(|| {
    ObjectPool::new(BUFFER_POOL_CAPACITY, || {
        Vec::with_capacity(BUFFER_INITIAL_SIZE)
    })
});

/// The process-wide byte-buffer pool used for body cloning and
/// serialization scratch space.
pub fn buffer_pool() -> &'static BufferPool {
    &BUFFERS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_fresh_when_empty() {
        let pool: ObjectPool<Vec<u8>> = ObjectPool::new(4, || Vec::with_capacity(16));
        assert_eq!(pool.idle(), 0);
        let buf = pool.acquire();
        assert!(buf.is_empty());
        assert!(buf.capacity() >= 16);
    }

    #[test]
    fn test_return_and_reset_on_drop() {
        let pool: ObjectPool<Vec<u8>> = ObjectPool::new(4, Vec::new);
        {
            let mut buf = pool.acquire();
            buf.extend_from_slice(b"scratch");
        }
        assert_eq!(pool.idle(), 1);

        let recycled = pool.acquire();
        // Reset ran on return; no data leaks between borrowers.
        assert!(recycled.is_empty());
    }

    #[test]
    fn test_detach_does_not_return() {
        let pool: ObjectPool<Vec<u8>> = ObjectPool::new(4, Vec::new);
        let buf = pool.acquire();
        let owned = buf.detach();
        assert!(owned.is_empty());
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn test_capacity_bounds_idle_values() {
        let pool: ObjectPool<Vec<u8>> = ObjectPool::new(2, Vec::new);
        let a = pool.acquire();
        let b = pool.acquire();
        let c = pool.acquire();
        drop(a);
        drop(b);
        drop(c);
        assert_eq!(pool.idle(), 2);
    }

    #[test]
    fn test_clone_shares_slots() {
        let pool: ObjectPool<Vec<u8>> = ObjectPool::new(4, Vec::new);
        drop(pool.acquire());
        let second = pool.clone();
        assert_eq!(second.idle(), 1);
    }

    #[test]
    fn test_global_buffer_pool() {
        let mut buf = buffer_pool().acquire();
        buf.extend_from_slice(b"hello");
        assert_eq!(&buf[..], b"hello");
    }
}
