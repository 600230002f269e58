//! An SPSC queue for unsolicited `PD-DATA.indication` frames.
//!
//! Received PSDUs are handed up from the radio's receive callback, which may run in interrupt
//! context, so they're queued to be encoded into an EPB and written to the UART from the
//! cooperative dispatcher task instead.
//!
//! This module defines:
//!
//! * The [`IndicationQueue`] trait, implemented by all types providing a frame queue. A type
//!   implementing this trait is needed to use [`crate::dispatcher::Dispatcher`].
//! * The [`Producer`] and [`Consumer`] traits, which define the queue functionality used after
//!   splitting an [`IndicationQueue`].
//! * [`SimpleQueue`], [`SimpleProducer`] and [`SimpleConsumer`], a minimal implementation of that
//!   interface.
//!
//! [`IndicationQueue`]: trait.IndicationQueue.html
//! [`Producer`]: trait.Producer.html
//! [`Consumer`]: trait.Consumer.html
//! [`SimpleQueue`]: struct.SimpleQueue.html

use crate::{bytes::*, Error};
use heapless::{
    consts::U1,
    spsc::{self, MultiCore},
};

/// Largest on-wire PHY primitive frame the queue must be able to hold: a `PD-DATA.indication`
/// carrying the maximum-size PSDU (`aMaxPHYPacketSize` = 127 octets).
pub const MAX_FRAME: usize = 2 /* type, length */ + 2 /* psduLength, ppduLinkQuality */ + 127;

/// A splittable SPSC queue for encoded PHY primitive frames.
///
/// Implementations of this trait must fit at least one frame with a total size of [`MAX_FRAME`]
/// bytes.
pub trait IndicationQueue {
    /// Producing (writing) half of the queue.
    type Producer: Producer;

    /// Consuming (reading) half of the queue.
    type Consumer: Consumer;

    /// Splits the queue into its producing and consuming ends.
    fn split(self) -> (Self::Producer, Self::Consumer);
}

/// The producing (writing) half of an indication queue.
pub trait Producer {
    /// Returns the largest frame size that can currently be enqueued.
    fn free_space(&self) -> u8;

    /// Enqueues a frame of known size using a closure.
    ///
    /// *This is an object-safe method complemented by its generic counterpart `produce_with`.
    /// Only this method needs to be implemented.*
    fn produce_dyn(
        &mut self,
        frame_len: u8,
        f: &mut dyn FnMut(&mut ByteWriter<'_>) -> Result<(), Error>,
    ) -> Result<(), Error>;

    /// Enqueues a frame of known size using a closure.
    fn produce_with(
        &mut self,
        frame_len: u8,
        mut f: impl FnMut(&mut ByteWriter<'_>) -> Result<(), Error>,
    ) -> Result<(), Error> {
        self.produce_dyn(frame_len, &mut f)
    }
}

/// The consuming (reading) half of an indication queue.
pub trait Consumer {
    /// Returns whether a frame is waiting to be consumed.
    fn has_data(&self) -> bool;

    /// Calls `f` with the next queued frame's bytes, if any.
    ///
    /// `f` returns a [`Consume`] wrapping its result and a flag for whether the frame should be
    /// removed from the queue. If the queue is empty, `f` is not called and `Error::Eof` is
    /// returned.
    fn consume_with<R>(&mut self, f: impl FnOnce(&[u8]) -> Consume<R>) -> Result<R, Error>;
}

/// The result of a [`Consumer`] callback, along with whether the consumed frame should be removed
/// from the queue.
pub struct Consume<T> {
    consume: bool,
    result: T,
}

impl<T> Consume<T> {
    /// Creates a `Consume` that carries `result` and removes the frame iff `consume` is `true`.
    pub fn new(consume: bool, result: T) -> Self {
        Self { consume, result }
    }

    /// Always removes the frame from the queue.
    pub fn always(result: T) -> Self {
        Self::new(true, result)
    }

    /// Never removes the frame from the queue (the frame will be seen again).
    pub fn never(result: T) -> Self {
        Self::new(false, result)
    }
}

impl<T, E> Consume<Result<T, E>> {
    /// Removes the frame iff `result` is `Ok`.
    pub fn on_success(result: Result<T, E>) -> Self {
        Self::new(result.is_ok(), result)
    }
}

/// A simple single-slot queue, backed by a `heapless::spsc::Queue` of fixed-size frames.
///
/// This type is compatible with cores that lack atomic operations beyond byte/word load-store,
/// and minimizes RAM usage: in addition to the raw buffer space, only minimal space is needed for
/// housekeeping.
pub struct SimpleQueue {
    inner: spsc::Queue<[u8; MAX_FRAME], U1, u8, MultiCore>,
}

impl SimpleQueue {
    /// Creates a new, empty queue.
    pub const fn new() -> Self {
        Self {
            inner: spsc::Queue(heapless::i::Queue::u8()),
        }
    }
}

impl<'a> IndicationQueue for &'a mut SimpleQueue {
    type Producer = SimpleProducer<'a>;
    type Consumer = SimpleConsumer<'a>;

    fn split(self) -> (Self::Producer, Self::Consumer) {
        let (p, c) = self.inner.split();
        (SimpleProducer { inner: p }, SimpleConsumer { inner: c })
    }
}

/// Producer (writer) half returned by `SimpleQueue::split`.
pub struct SimpleProducer<'a> {
    inner: spsc::Producer<'a, [u8; MAX_FRAME], U1, u8, MultiCore>,
}

impl<'a> Producer for SimpleProducer<'a> {
    fn free_space(&self) -> u8 {
        if self.inner.ready() {
            MAX_FRAME as u8
        } else {
            0
        }
    }

    fn produce_dyn(
        &mut self,
        frame_len: u8,
        f: &mut dyn FnMut(&mut ByteWriter<'_>) -> Result<(), Error>,
    ) -> Result<(), Error> {
        assert!(usize::from(frame_len) <= MAX_FRAME);

        if !self.inner.ready() {
            return Err(Error::Eof);
        }

        let mut buf = [0; MAX_FRAME];
        let mut writer = ByteWriter::new(&mut buf);
        f(&mut writer)?;

        self.inner.enqueue(buf).map_err(|_| ()).unwrap();
        Ok(())
    }
}

/// Consumer (reader) half returned by `SimpleQueue::split`.
pub struct SimpleConsumer<'a> {
    inner: spsc::Consumer<'a, [u8; MAX_FRAME], U1, u8, MultiCore>,
}

impl<'a> Consumer for SimpleConsumer<'a> {
    fn has_data(&self) -> bool {
        self.inner.ready()
    }

    fn consume_with<R>(&mut self, f: impl FnOnce(&[u8]) -> Consume<R>) -> Result<R, Error> {
        if let Some(frame) = self.inner.peek() {
            // Every frame is self-describing: byte 1 holds the total on-wire length.
            let len = usize::from(frame[1]).max(2).min(MAX_FRAME);
            let res = f(&frame[..len]);
            if res.consume {
                self.inner.dequeue().unwrap();
            }
            Ok(res.result)
        } else {
            Err(Error::Eof)
        }
    }
}

/// Runs the indication queue conformance suite against the given [`IndicationQueue`].
///
/// This can be used when implementing a custom queue. Create a `#[test]` function and call
/// `run_tests` from there; it panics on failure.
pub fn run_tests(queue: impl IndicationQueue) {
    fn assert_empty(c: &mut impl Consumer) {
        assert!(!c.has_data(), "empty queue `has_data()` returned true");

        let err = c
            .consume_with(|_| -> Consume<()> {
                unreachable!("`consume_with` on empty queue invoked the callback");
            })
            .unwrap_err();

        assert_eq!(err, Error::Eof);
    }

    let (mut p, mut c) = queue.split();
    assert_empty(&mut c);

    let free_space = p.free_space();
    assert!(free_space >= 4, "empty queue has no usable space");

    p.produce_with(5, |writer| -> Result<(), Error> {
        writer.write_u8(2)?; // type: PD-DATA.indication
        writer.write_u8(5)?; // length
        writer.write_u8(1)?; // psduLength
        writer.write_u8(0xAB)?; // ppduLinkQuality
        writer.write_u8(0x42)?; // psdu[0]
        Ok(())
    })
    .expect("enqueuing frame failed");

    assert!(c.has_data());

    c.consume_with(|frame| -> Consume<()> {
        assert_eq!(frame, &[2, 5, 1, 0xAB, 0x42]);
        Consume::never(())
    })
    .expect("consume_with failed when data is available");

    assert!(c.has_data(), "`Consume::never` must not remove the frame");

    c.consume_with(|_| Consume::always(())).unwrap();
    assert_empty(&mut c);
}

#[test]
fn simple_queue() {
    run_tests(&mut SimpleQueue::new());
}
