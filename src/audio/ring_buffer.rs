//! Lock-free ring buffer for audio data
//!
//! Single-producer/single-consumer FIFO of f32 samples used to hand audio
//! between the capture/render callbacks and the processing thread.
//! Backpressure is expressed by `write`/`read` returning short counts, never
//! by blocking.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Fixed-capacity SPSC ring over `capacity + 1` floats.
///
/// The extra slot distinguishes full from empty. The producer publishes its
/// write index with release ordering after copying samples in; the consumer
/// publishes its read index with release ordering after copying samples out.
/// Each side observes the other's index with acquire ordering, so a reader
/// only ever sees fully written samples.
///
/// Invariant: `available_read() + available_write() == capacity`.
struct RingBuffer {
    storage: Box<[UnsafeCell<f32>]>,
    capacity: usize,
    write_pos: AtomicUsize,
    read_pos: AtomicUsize,
}

// SAFETY: the producer half only writes cells in [write_pos, write_pos + n)
// before releasing write_pos, and the consumer half only reads cells in
// [read_pos, read_pos + n) after acquiring write_pos. The split() API hands
// out exactly one producer and one consumer, so no cell is ever accessed
// concurrently from both sides.
unsafe impl Send for RingBuffer {}
unsafe impl Sync for RingBuffer {}

impl RingBuffer {
    fn new(capacity: usize) -> Self {
        let storage = (0..capacity + 1)
            .map(|_| UnsafeCell::new(0.0f32))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            storage,
            capacity,
            write_pos: AtomicUsize::new(0),
            read_pos: AtomicUsize::new(0),
        }
    }

    fn write(&self, src: &[f32]) -> usize {
        let write = self.write_pos.load(Ordering::Relaxed);
        let read = self.read_pos.load(Ordering::Acquire);
        let len = self.storage.len();

        let available = if write >= read {
            self.capacity - (write - read)
        } else {
            read - write - 1
        };

        let to_write = src.len().min(available);
        if to_write == 0 {
            return 0;
        }

        let first = to_write.min(len - write);
        // SAFETY: see the Send/Sync rationale; these cells are owned by the
        // producer until write_pos is released below.
        unsafe {
            for i in 0..first {
                *self.storage[write + i].get() = src[i];
            }
            for i in first..to_write {
                *self.storage[i - first].get() = src[i];
            }
        }

        self.write_pos
            .store((write + to_write) % len, Ordering::Release);
        to_write
    }

    fn read(&self, dst: &mut [f32]) -> usize {
        let read = self.read_pos.load(Ordering::Relaxed);
        let write = self.write_pos.load(Ordering::Acquire);
        let len = self.storage.len();

        let available = if write >= read {
            write - read
        } else {
            len - read + write
        };

        let to_read = dst.len().min(available);
        if to_read == 0 {
            return 0;
        }

        let first = to_read.min(len - read);
        // SAFETY: these cells were published by the producer before the
        // acquire load of write_pos above, and stay owned by the consumer
        // until read_pos is released below.
        unsafe {
            for i in 0..first {
                dst[i] = *self.storage[read + i].get();
            }
            for i in first..to_read {
                dst[i] = *self.storage[i - first].get();
            }
        }

        self.read_pos
            .store((read + to_read) % len, Ordering::Release);
        to_read
    }

    /// Advance the read index without copying, consumer side only.
    fn skip(&self, count: usize) -> usize {
        let read = self.read_pos.load(Ordering::Relaxed);
        let write = self.write_pos.load(Ordering::Acquire);
        let len = self.storage.len();

        let available = if write >= read {
            write - read
        } else {
            len - read + write
        };

        let to_skip = count.min(available);
        if to_skip > 0 {
            self.read_pos
                .store((read + to_skip) % len, Ordering::Release);
        }
        to_skip
    }

    fn available_read(&self) -> usize {
        let read = self.read_pos.load(Ordering::Acquire);
        let write = self.write_pos.load(Ordering::Acquire);
        if write >= read {
            write - read
        } else {
            self.storage.len() - read + write
        }
    }

    fn available_write(&self) -> usize {
        self.capacity - self.available_read()
    }

    /// Reset both indices. Only valid while neither side is active.
    fn clear(&self) {
        self.read_pos.store(0, Ordering::Release);
        self.write_pos.store(0, Ordering::Release);
    }
}

/// Owner handle used to create the producer/consumer pair.
pub struct AudioRingBuffer {
    inner: Arc<RingBuffer>,
}

impl AudioRingBuffer {
    /// Create a ring buffer holding up to `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RingBuffer::new(capacity)),
        }
    }

    /// Split into producer and consumer ends.
    pub fn split(self) -> (AudioProducer, AudioConsumer) {
        let dropped_count = Arc::new(AtomicU64::new(0));

        (
            AudioProducer {
                inner: Arc::clone(&self.inner),
                dropped_count: Arc::clone(&dropped_count),
            },
            AudioConsumer {
                inner: self.inner,
                last_sample: 0.0,
            },
        )
    }
}

/// Producer end of the ring buffer (single writer).
pub struct AudioProducer {
    inner: Arc<RingBuffer>,
    dropped_count: Arc<AtomicU64>,
}

impl AudioProducer {
    /// Write samples, returning how many fit. Samples that do not fit are
    /// dropped and counted.
    pub fn write(&mut self, samples: &[f32]) -> usize {
        let written = self.inner.write(samples);
        let dropped = samples.len() - written;
        if dropped > 0 {
            self.dropped_count
                .fetch_add(dropped as u64, Ordering::Relaxed);
        }
        written
    }

    /// Number of free slots.
    pub fn free_len(&self) -> usize {
        self.inner.available_write()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Shared handle to the dropped-sample counter.
    pub fn dropped_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.dropped_count)
    }

    /// Reset both ring indices. Only call while the consumer side is idle
    /// (e.g. between pipeline runs with the streams stopped).
    pub fn clear(&mut self) {
        self.inner.clear();
    }
}

/// Consumer end of the ring buffer (single reader).
pub struct AudioConsumer {
    inner: Arc<RingBuffer>,
    last_sample: f32,
}

impl AudioConsumer {
    /// Read up to `buffer.len()` samples, returning the actual count.
    pub fn read(&mut self, buffer: &mut [f32]) -> usize {
        let count = self.inner.read(buffer);
        if count > 0 {
            self.last_sample = buffer[count - 1];
        }
        count
    }

    /// Discard up to `count` of the oldest queued samples without copying.
    pub fn skip(&mut self, count: usize) -> usize {
        self.inner.skip(count)
    }

    /// Number of queued samples.
    pub fn len(&self) -> usize {
        self.inner.available_read()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Last sample handed out, used for fade-out interpolation on underrun.
    pub fn last_sample(&self) -> f32 {
        self.last_sample
    }

    /// Reset both ring indices. Only call while the producer side is idle.
    pub fn clear(&mut self) {
        self.inner.clear();
        self.last_sample = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_ring_buffer_write_read() {
        let rb = AudioRingBuffer::new(1024);
        let (mut producer, mut consumer) = rb.split();

        let data = vec![1.0f32, 2.0, 3.0, 4.0, 5.0];
        let written = producer.write(&data);
        assert_eq!(written, 5);

        let mut output = vec![0.0f32; 5];
        let read = consumer.read(&mut output);
        assert_eq!(read, 5);
        assert_eq!(output, data);
    }

    #[test]
    fn test_ring_buffer_overflow_drops_and_counts() {
        let rb = AudioRingBuffer::new(10);
        let (mut producer, mut consumer) = rb.split();

        let data = vec![1.0f32; 20];
        let written = producer.write(&data);
        assert_eq!(written, 10);
        assert_eq!(producer.dropped_counter().load(Ordering::Relaxed), 10);

        let mut output = vec![0.0f32; 20];
        let read = consumer.read(&mut output);
        assert_eq!(read, written);
    }

    #[test]
    fn test_ring_buffer_underflow() {
        let rb = AudioRingBuffer::new(1024);
        let (_producer, mut consumer) = rb.split();

        let mut output = vec![0.0f32; 10];
        assert_eq!(consumer.read(&mut output), 0);
    }

    #[test]
    fn test_ring_buffer_accounting() {
        let rb = AudioRingBuffer::new(100);
        let (mut producer, mut consumer) = rb.split();

        producer.write(&vec![0.5f32; 60]);
        assert_eq!(consumer.len(), 60);
        assert_eq!(producer.free_len(), 40);

        let mut out = vec![0.0f32; 25];
        consumer.read(&mut out);
        assert_eq!(consumer.len(), 35);
        assert_eq!(producer.free_len(), 65);
    }

    #[test]
    fn test_ring_buffer_skip() {
        let rb = AudioRingBuffer::new(16);
        let (mut producer, mut consumer) = rb.split();

        let data: Vec<f32> = (0..10).map(|i| i as f32).collect();
        producer.write(&data);

        assert_eq!(consumer.skip(4), 4);
        let mut out = vec![0.0f32; 2];
        consumer.read(&mut out);
        assert_eq!(out, vec![4.0, 5.0]);

        // Cannot skip past what is queued.
        assert_eq!(consumer.skip(100), 4);
        assert!(consumer.is_empty());
    }

    #[test]
    fn test_ring_buffer_wraparound_ordering() {
        let rb = AudioRingBuffer::new(7);
        let (mut producer, mut consumer) = rb.split();

        let mut next_write = 0u32;
        let mut next_read = 0u32;
        let mut out = vec![0.0f32; 5];

        // Many small writes/reads force index wraparound repeatedly.
        for _ in 0..200 {
            let chunk: Vec<f32> = (0..5).map(|i| (next_write + i) as f32).collect();
            let written = producer.write(&chunk);
            next_write += written as u32;

            let read = consumer.read(&mut out);
            for &value in &out[..read] {
                assert_eq!(value, next_read as f32);
                next_read += 1;
            }
        }
        assert_eq!(next_write - next_read, consumer.len() as u32);
    }

    /// Property check: concurrent producer/consumer must never duplicate,
    /// drop (except counted overflow), or reorder samples.
    #[test]
    fn test_ring_buffer_spsc_threads() {
        const TOTAL: u32 = 200_000;
        let rb = AudioRingBuffer::new(512);
        let (mut producer, mut consumer) = rb.split();

        let writer = thread::spawn(move || {
            let mut sent = 0u32;
            let mut chunk = Vec::with_capacity(64);
            while sent < TOTAL {
                chunk.clear();
                let end = (sent + 64).min(TOTAL);
                chunk.extend((sent..end).map(|v| v as f32));
                let mut offset = 0;
                while offset < chunk.len() {
                    let written = producer.write(&chunk[offset..]);
                    offset += written;
                    if written == 0 {
                        thread::yield_now();
                    }
                }
                sent = end;
            }
        });

        let mut expected = 0u32;
        let mut buf = vec![0.0f32; 97];
        while expected < TOTAL {
            let read = consumer.read(&mut buf);
            for &value in &buf[..read] {
                assert_eq!(value, expected as f32, "sample reordered or lost");
                expected += 1;
            }
            if read == 0 {
                thread::yield_now();
            }
        }

        writer.join().unwrap();
    }
}
