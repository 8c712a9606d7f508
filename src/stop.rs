//! Cooperative stop signalling between the two halves of a connection.
//!
//! The signal rides on a channel that never carries a message: tripping the
//! source closes the channel, which every token observes immediately. That
//! gives us a cheap synchronous check plus an awaitable edge, with clone
//! semantics handled by the channel's own reference counting.

use async_channel::{Receiver, Sender};

/// The tripping side of a stop signal.
#[derive(Clone, Debug)]
pub(crate) struct StopSource {
    sender: Sender<()>,
    receiver: Receiver<()>,
}

impl StopSource {
    pub(crate) fn new() -> Self {
        let (sender, receiver) = async_channel::bounded(1);
        Self { sender, receiver }
    }

    /// Hands out a token observing this source.
    pub(crate) fn token(&self) -> StopToken {
        StopToken {
            receiver: self.receiver.clone(),
        }
    }

    /// Trips the signal. Idempotent.
    pub(crate) fn stop(&self) {
        self.sender.close();
    }
}

/// The observing side of a stop signal.
#[derive(Clone, Debug)]
pub(crate) struct StopToken {
    receiver: Receiver<()>,
}

impl StopToken {
    /// Synchronous check, usable between suspension points.
    pub(crate) fn is_stopped(&self) -> bool {
        self.receiver.is_closed()
    }

    /// Resolves once the signal has been tripped.
    pub(crate) async fn stopped(&self) {
        let _ = self.receiver.recv().await;
    }
}

/// Trips a [`StopSource`] when dropped, unless released first.
///
/// The socket listener holds one of these so that every exit path, including
/// being cancelled itself, winds down the response sender. Graceful exits
/// call [`release`][Stopper::release] and let the pipeline flush instead.
#[derive(Debug)]
pub(crate) struct Stopper {
    source: Option<StopSource>,
}

impl Stopper {
    pub(crate) fn new(source: StopSource) -> Self {
        Self {
            source: Some(source),
        }
    }

    /// Disarms the guard.
    pub(crate) fn release(&mut self) {
        self.source.take();
    }
}

impl Drop for Stopper {
    fn drop(&mut self) {
        if let Some(source) = self.source.take() {
            source.stop();
        }
    }
}
