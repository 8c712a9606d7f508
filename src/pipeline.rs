//! Bounded single-producer single-consumer pipeline.
//!
//! The pipeline connects the socket listener (producer) to the response
//! sender (consumer) of one connection. It is a plain bounded FIFO with
//! close-on-drop semantics; the endpoints are deliberately not [`Clone`], so
//! there is exactly one producer and one consumer per pipeline. Response
//! ordering across a connection depends on that.
//!
//! Closing works in both directions: dropping the [`Producer`] lets the
//! consumer drain what's left and then observe the end of the stream, while
//! dropping the [`Consumer`] makes the next [`push`][Producer::push] fail
//! and hands the rejected item back to the caller.

use std::fmt;

use async_channel::{Receiver, Sender};

/// Creates a pipeline with room for `capacity` items.
///
/// A capacity of zero is bumped to one; a rendezvous channel would deadlock
/// a producer that is also responsible for noticing the consumer went away.
pub fn bounded<T>(capacity: usize) -> (Producer<T>, Consumer<T>) {
    let (sender, receiver) = async_channel::bounded(capacity.max(1));
    (Producer { sender }, Consumer { receiver })
}

/// The sending half of a pipeline.
pub struct Producer<T> {
    sender: Sender<T>,
}

impl<T> Producer<T> {
    /// Pushes an item, waiting for free capacity if the pipeline is full.
    ///
    /// Returns the item itself as the error when the consumer is gone, so
    /// the caller can dispose of it properly.
    pub async fn push(&self, item: T) -> Result<(), T> {
        self.sender.send(item).await.map_err(|err| err.0)
    }

    /// The number of items currently queued.
    pub fn len(&self) -> usize {
        self.sender.len()
    }

    /// Returns `true` if no items are queued.
    pub fn is_empty(&self) -> bool {
        self.sender.is_empty()
    }
}

impl<T> fmt::Debug for Producer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer").field("len", &self.len()).finish()
    }
}

/// The receiving half of a pipeline.
pub struct Consumer<T> {
    receiver: Receiver<T>,
}

impl<T> Consumer<T> {
    /// Pops the oldest item, waiting for one if the pipeline is empty.
    ///
    /// Returns `None` once the producer is gone and the queue is drained.
    pub async fn pop(&self) -> Option<T> {
        self.receiver.recv().await.ok()
    }

    /// The number of items currently queued.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Returns `true` if no items are queued.
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

impl<T> fmt::Debug for Consumer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer").field("len", &self.len()).finish()
    }
}
