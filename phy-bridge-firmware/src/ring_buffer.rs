//! SPSC byte ring buffer handing bytes from the UARTE RX interrupt to the PCAPNG parser task.
//!
//! Capacity is fixed at a power of two so the read/write cursors can wrap with a mask instead of
//! a modulo. The producer (the UART RX interrupt) and the consumer (the PCAPNG task) each touch
//! only their own cursor, so no locking is needed for the single-writer/single-reader case.

use core::sync::atomic::{AtomicUsize, Ordering};

pub struct RingBuffer<const N: usize> {
    buf: [u8; N],
    head: AtomicUsize,
    tail: AtomicUsize,
}

impl<const N: usize> RingBuffer<N> {
    const MASK: usize = N - 1;

    pub const fn new() -> Self {
        assert!(N.is_power_of_two(), "ring buffer capacity must be a power of two");
        Self { buf: [0; N], head: AtomicUsize::new(0), tail: AtomicUsize::new(0) }
    }

    /// Pushes one byte. Returns `false` if the buffer is full.
    ///
    /// Call only from the producer (UART RX interrupt) context.
    pub fn put(&mut self, byte: u8) -> bool {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        if head.wrapping_sub(tail) == N {
            return false;
        }
        self.buf[head & Self::MASK] = byte;
        self.head.store(head.wrapping_add(1), Ordering::Release);
        true
    }

    /// Pops one byte, if any is queued.
    ///
    /// Call only from the consumer (PCAPNG task) context.
    pub fn get(&mut self) -> Option<u8> {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);
        if tail == head {
            return None;
        }
        let byte = self.buf[tail & Self::MASK];
        self.tail.store(tail.wrapping_add(1), Ordering::Release);
        Some(byte)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_and_preserves_order() {
        let mut rb: RingBuffer<4> = RingBuffer::new();
        assert_eq!(rb.get(), None);
        assert!(rb.put(1));
        assert!(rb.put(2));
        assert!(rb.put(3));
        assert!(rb.put(4));
        assert!(!rb.put(5), "full buffer must reject further puts");
        assert_eq!(rb.get(), Some(1));
        assert!(rb.put(5));
        assert_eq!(rb.get(), Some(2));
        assert_eq!(rb.get(), Some(3));
        assert_eq!(rb.get(), Some(4));
        assert_eq!(rb.get(), Some(5));
        assert_eq!(rb.get(), None);
    }
}
