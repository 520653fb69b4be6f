//! Write batching
//!
//! [`Buffer`] collects elements and hands them to a sink as one batch, either
//! when the number of pending elements reaches the capacity or when
//! [`Buffer::flush`] is called.
//!
//! ## Concurrency
//!
//! A single `parking_lot::Mutex` guards both the queue and the sink. Push
//! (including a flush it triggers) and explicit flush are one critical
//! section each, so:
//! - no element reaches two sink calls
//! - no element is dropped between the threshold check and the flush
//! - a slow sink blocks every producer until it returns
//!
//! ## Failure
//!
//! The queue is taken before the sink runs. A sink error propagates to the
//! caller whose push or flush triggered it and the batch is dropped, not
//! re-queued.

use parking_lot::Mutex;
use std::fmt;
use tracing::debug;

/// Capacity used when none is given
pub const DEFAULT_CAPACITY: usize = 1000;

type Sink<T, E> = Box<dyn FnMut(Vec<T>) -> Result<(), E> + Send>;

struct Inner<T, E> {
    queue: Vec<T>,
    sink: Sink<T, E>,
}

/// Thread-safe accumulator that flushes full batches to a sink
pub struct Buffer<T, E> {
    capacity: usize,
    inner: Mutex<Inner<T, E>>,
}

impl<T, E> Buffer<T, E> {
    /// Create a buffer that flushes to `sink` every `capacity` elements.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new<F>(capacity: usize, sink: F) -> Self
    where
        F: FnMut(Vec<T>) -> Result<(), E> + Send + 'static,
    {
        assert!(capacity > 0, "buffer capacity must be positive");
        Buffer {
            capacity,
            inner: Mutex::new(Inner {
                queue: Vec::new(),
                sink: Box::new(sink),
            }),
        }
    }

    /// Create a buffer with [`DEFAULT_CAPACITY`]
    pub fn with_default_capacity<F>(sink: F) -> Self
    where
        F: FnMut(Vec<T>) -> Result<(), E> + Send + 'static,
    {
        Self::new(DEFAULT_CAPACITY, sink)
    }

    /// Batch size that triggers a flush
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append an element, flushing before returning if the batch is full
    pub fn push(&self, element: T) -> Result<(), E> {
        let mut inner = self.inner.lock();
        inner.queue.push(element);
        if inner.queue.len() >= self.capacity {
            Self::drain(&mut inner)
        } else {
            Ok(())
        }
    }

    /// Send pending elements to the sink. No-op when nothing is pending.
    pub fn flush(&self) -> Result<(), E> {
        let mut inner = self.inner.lock();
        Self::drain(&mut inner)
    }

    /// Whether unflushed elements are pending
    pub fn has_pending(&self) -> bool {
        !self.inner.lock().queue.is_empty()
    }

    /// Number of unflushed elements
    pub fn len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// True when nothing is pending
    pub fn is_empty(&self) -> bool {
        !self.has_pending()
    }

    fn drain(inner: &mut Inner<T, E>) -> Result<(), E> {
        if inner.queue.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut inner.queue);
        debug!(target: "elastic::buffer", size = batch.len(), "Flushing batch");
        (inner.sink)(batch)
    }
}

impl<T, E> fmt::Debug for Buffer<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("capacity", &self.capacity)
            .field("pending", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::{Arc, Barrier};
    use std::thread;

    type Batches = Arc<Mutex<Vec<Vec<u32>>>>;

    fn recording(capacity: usize) -> (Buffer<u32, String>, Batches) {
        let batches: Batches = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&batches);
        let buffer = Buffer::new(capacity, move |batch| {
            sink.lock().push(batch);
            Ok(())
        });
        (buffer, batches)
    }

    #[test]
    fn test_default_capacity() {
        let buffer: Buffer<u32, String> = Buffer::with_default_capacity(|_| Ok(()));
        assert_eq!(buffer.capacity(), 1000);
    }

    #[test]
    #[should_panic(expected = "buffer capacity must be positive")]
    fn test_zero_capacity_rejected() {
        let _: Buffer<u32, String> = Buffer::new(0, |_| Ok(()));
    }

    #[test]
    fn test_huge_capacity_only_flushes_by_hand() {
        let (buffer, batches) = recording(usize::MAX);
        buffer.push(1).unwrap();
        buffer.push(2).unwrap();
        assert!(buffer.has_pending());
        assert!(batches.lock().is_empty());

        buffer.flush().unwrap();
        assert_eq!(*batches.lock(), vec![vec![1, 2]]);
    }

    #[test]
    fn test_flush_on_empty_is_noop() {
        let (buffer, batches) = recording(3);
        buffer.flush().unwrap();
        assert!(batches.lock().is_empty());
        assert!(!buffer.has_pending());
    }

    #[test]
    fn test_push_flushes_at_capacity() {
        let (buffer, batches) = recording(2);
        buffer.push(1).unwrap();
        assert!(batches.lock().is_empty());
        assert!(buffer.has_pending());

        buffer.push(2).unwrap();
        assert_eq!(*batches.lock(), vec![vec![1, 2]]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_failing_sink_drops_batch() {
        let calls = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&calls);
        let buffer: Buffer<u32, String> = Buffer::new(2, move |_| {
            *counter.lock() += 1;
            Err("engine down".to_string())
        });

        buffer.push(1).unwrap();
        assert_eq!(buffer.push(2), Err("engine down".to_string()));
        assert_eq!(buffer.len(), 0);

        // Lock is released and the dropped batch is not retried.
        buffer.flush().unwrap();
        assert_eq!(*calls.lock(), 1);

        buffer.push(3).unwrap();
        assert_eq!(buffer.flush(), Err("engine down".to_string()));
        assert_eq!(*calls.lock(), 2);
    }

    #[test]
    fn test_concurrent_pushes_lose_and_duplicate_nothing() {
        const THREADS: u32 = 8;
        const PER_THREAD: u32 = 250;

        let (buffer, batches) = recording(7);
        let buffer = Arc::new(buffer);
        let barrier = Arc::new(Barrier::new(THREADS as usize));

        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let buffer = Arc::clone(&buffer);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for i in 0..PER_THREAD {
                        buffer.push(t * PER_THREAD + i).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        buffer.flush().unwrap();

        let batches = batches.lock();
        assert!(batches.iter().all(|b| !b.is_empty() && b.len() <= 7));

        let mut seen: Vec<u32> = batches.iter().flatten().copied().collect();
        seen.sort_unstable();
        let expected: Vec<u32> = (0..THREADS * PER_THREAD).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_per_thread_order_preserved() {
        let (buffer, batches) = recording(5);
        let buffer = Arc::new(buffer);

        let handles: Vec<_> = (0..4u32)
            .map(|t| {
                let buffer = Arc::clone(&buffer);
                thread::spawn(move || {
                    for i in 0..100 {
                        buffer.push(t * 1000 + i).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        buffer.flush().unwrap();

        let all: Vec<u32> = batches.lock().iter().flatten().copied().collect();
        for t in 0..4u32 {
            let mine: Vec<u32> = all.iter().copied().filter(|v| v / 1000 == t).collect();
            let expected: Vec<u32> = (0..100).map(|i| t * 1000 + i).collect();
            assert_eq!(mine, expected);
        }
    }

    proptest! {
        #[test]
        fn prop_below_capacity_never_flushes(capacity in 1usize..64) {
            let (buffer, batches) = recording(capacity);
            for i in 0..capacity - 1 {
                buffer.push(i as u32).unwrap();
            }
            prop_assert!(batches.lock().is_empty());
            prop_assert_eq!(buffer.len(), capacity - 1);
        }

        #[test]
        fn prop_nth_push_flushes_once_in_order(capacity in 1usize..64) {
            let (buffer, batches) = recording(capacity);
            for i in 0..capacity {
                buffer.push(i as u32).unwrap();
            }
            let expected: Vec<u32> = (0..capacity as u32).collect();
            prop_assert_eq!(batches.lock().clone(), vec![expected]);
            prop_assert!(!buffer.has_pending());
        }

        #[test]
        fn prop_manual_flush_sends_partial_batch(capacity in 2usize..64, k in 1usize..63) {
            prop_assume!(k < capacity);
            let (buffer, batches) = recording(capacity);
            for i in 0..k {
                buffer.push(i as u32).unwrap();
            }
            buffer.flush().unwrap();
            let expected: Vec<u32> = (0..k as u32).collect();
            prop_assert_eq!(batches.lock().clone(), vec![expected]);
        }

        #[test]
        fn prop_batches_partition_input(capacity in 1usize..32, n in 0usize..200) {
            let (buffer, batches) = recording(capacity);
            for i in 0..n {
                buffer.push(i as u32).unwrap();
            }
            buffer.flush().unwrap();

            let batches = batches.lock();
            let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
            let mut expected = vec![capacity; n / capacity];
            if n % capacity != 0 {
                expected.push(n % capacity);
            }
            prop_assert_eq!(sizes, expected);

            let flat: Vec<u32> = batches.iter().flatten().copied().collect();
            prop_assert_eq!(flat, (0..n as u32).collect::<Vec<_>>());
        }
    }
}
