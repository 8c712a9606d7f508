//! The socket listener half of a connection.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use async_std::future::{timeout, TimeoutError};
use async_std::io::Read;
use async_std::prelude::*;

use crate::error::recv_error_level;
use crate::handler::HandlerRegistry;
use crate::pipeline::Producer;
use crate::request::RequestSlot;
use crate::server::decode::{Decoded, RequestParser};
use crate::server::ConnectionConfig;
use crate::stats::Stats;
use crate::stop::Stopper;

/// Reads from the peer and turns bytes into queued request slots.
///
/// Runs until the peer half-closes, the byte stream turns out malformed, a
/// final request is decoded, the read times out, or the task is cancelled.
/// Every exit path except the graceful ones leaves `stopper` armed, which
/// winds down the response sender and cancels in-flight handlers.
pub(crate) async fn listen<IO>(
    mut io: IO,
    peer: String,
    config: ConnectionConfig,
    registry: Arc<HandlerRegistry>,
    stats: Arc<Stats>,
    producer: Producer<RequestSlot>,
    mut stopper: Stopper,
) where
    IO: Read + Unpin + Send + 'static,
{
    let mut parser = RequestParser::new(config.parser.clone(), stats.clone());
    let mut buf = vec![0u8; config.in_buffer_size];
    let mut is_accepting_requests = true;

    while is_accepting_requests {
        let read = match config.read_timeout {
            Some(limit) => match timeout(limit, io.read(&mut buf)).await {
                Ok(read) => read,
                Err(TimeoutError { .. }) => {
                    log::debug!("peer {} idle for {:?}, closing", peer, limit);
                    return;
                }
            },
            None => io.read(&mut buf).await,
        };
        let read = match read {
            Ok(0) => {
                // A half-closed peer is most likely gone for good; cancelling
                // whatever is still in flight beats computing responses
                // nobody will read.
                log::trace!("peer {} closed connection", peer);
                return;
            }
            Ok(read) => read,
            Err(err) => {
                log::log!(
                    recv_error_level(&err),
                    "i/o error while receiving from peer {}: {}",
                    peer,
                    err
                );
                return;
            }
        };
        log::trace!("received {} byte(s) from {}", read, peer);

        let fed = parser.feed(&buf[..read]);
        for decoded in fed.requests {
            if !is_accepting_requests {
                // tail of a read that already contained a final request
                continue;
            }
            if decoded.request.is_final() {
                is_accepting_requests = false;
            }
            if !enqueue(decoded, &registry, &stats, &producer).await {
                is_accepting_requests = false;
                break;
            }
        }
        if let Some(err) = fed.error {
            log::debug!("malformed request from {}: {}", peer, err);
            // Stop accepting new requests, send previous answers.
            is_accepting_requests = false;
        }
    }

    stopper.release();
    log::trace!("gracefully stopping request listener for {}", peer);
}

/// Starts the handler task and pushes the slot, honoring backpressure.
///
/// Returns `false` when the response sender is gone; the slot is closed out
/// right here in that case so the request still reaches a terminal state and
/// the counters stay balanced.
async fn enqueue(
    decoded: Decoded,
    registry: &HandlerRegistry,
    stats: &Stats,
    producer: &Producer<RequestSlot>,
) -> bool {
    stats.active_request_count.fetch_add(1, Ordering::Relaxed);
    let task = registry.start_request_task(decoded.payload);
    let slot = RequestSlot {
        request: decoded.request,
        task,
    };
    match producer.push(slot).await {
        Ok(()) => true,
        Err(slot) => {
            let RequestSlot { mut request, task } = slot;
            task.cancel().await;
            request.response_mut().set_send_failed(Instant::now());
            stats.active_request_count.fetch_sub(1, Ordering::Relaxed);
            false
        }
    }
}
