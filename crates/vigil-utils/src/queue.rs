use crossbeam::queue::SegQueue;

/// Unbounded MPMC FIFO queue.
///
/// Backed by crossbeam's segmented Michael-Scott queue: `head`/`tail` are
/// advanced with CAS, dequeued segments are released immediately, and no
/// operation blocks. Callers that need to wait for an element poll
/// externally.
pub struct MpmcQueue<T> {
    inner: SegQueue<T>,
}

impl<T> MpmcQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: SegQueue::new(),
        }
    }

    /// Publish `value` at the tail.
    pub fn enqueue(&self, value: T) {
        self.inner.push(value);
    }

    /// Take the element at the head, or `None` when empty.
    pub fn dequeue(&self) -> Option<T> {
        self.inner.pop()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl<T> Default for MpmcQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_fifo_order_single_thread() {
        let q = MpmcQueue::new();
        for i in 0..100 {
            q.enqueue(i);
        }
        assert_eq!(q.len(), 100);
        for i in 0..100 {
            assert_eq!(q.dequeue(), Some(i));
        }
        assert_eq!(q.dequeue(), None);
        assert!(q.is_empty());
    }

    #[test]
    fn test_empty_dequeue_is_none() {
        let q: MpmcQueue<u64> = MpmcQueue::new();
        assert_eq!(q.dequeue(), None);
        assert_eq!(q.len(), 0);
    }

    #[test]
    fn test_concurrent_producers_consumers_preserve_multiset() {
        const PRODUCERS: usize = 8;
        const PER_PRODUCER: usize = 500;

        let q = Arc::new(MpmcQueue::new());
        let mut handles = Vec::new();

        for p in 0..PRODUCERS {
            let q = Arc::clone(&q);
            handles.push(std::thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    q.enqueue(p * PER_PRODUCER + i);
                }
            }));
        }

        let consumed = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut consumers = Vec::new();
        for _ in 0..PRODUCERS {
            let q = Arc::clone(&q);
            let consumed = Arc::clone(&consumed);
            consumers.push(std::thread::spawn(move || {
                let mut local = Vec::new();
                while local.len() < PER_PRODUCER {
                    if let Some(v) = q.dequeue() {
                        local.push(v);
                    } else {
                        std::thread::yield_now();
                    }
                }
                consumed.lock().unwrap().extend(local);
            }));
        }

        for h in handles {
            h.join().unwrap();
        }
        for c in consumers {
            c.join().unwrap();
        }

        let consumed = consumed.lock().unwrap();
        assert_eq!(consumed.len(), PRODUCERS * PER_PRODUCER);
        let unique: HashSet<_> = consumed.iter().collect();
        assert_eq!(unique.len(), PRODUCERS * PER_PRODUCER);
        assert!(q.is_empty());
    }
}
