//! The response sender half of a connection.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use async_std::io::{Read, Write};
use async_std::task::JoinHandle;
use futures_lite::future;

use crate::error::send_error_level;
use crate::handler::HandlerTask;
use crate::pipeline::Consumer;
use crate::request::{Request, RequestSlot};
use crate::stop::StopToken;

use super::Connection;

/// What the wait for the next slot resolved to.
enum Next {
    Slot(RequestSlot),
    Closed,
    Interrupted,
}

/// Drives responses until the connection is done, then tears it down.
///
/// This task is never cancelled from the outside; it is only ever signalled
/// through the stop token, so it is guaranteed to drain the pipeline and run
/// the shutdown sequence no matter how the connection ends.
pub(crate) async fn send_responses<IO>(
    connection: Arc<Connection<IO>>,
    socket_listener: JoinHandle<()>,
    consumer: Consumer<RequestSlot>,
) where
    IO: Read + Write + Clone + Send + Sync + Unpin + 'static,
{
    let stop = connection.stop_token();
    let mut is_response_chain_valid = true;

    process_responses(&connection, &consumer, &stop, &mut is_response_chain_valid, true).await;

    // The listener exits on its own on half-close or malformed input; this
    // covers the stop() path and doubles as the join point either way.
    socket_listener.cancel().await;

    // Consume remaining requests.
    process_responses(&connection, &consumer, &stop, &mut is_response_chain_valid, false).await;

    debug_assert!(consumer.is_empty());
    connection.shutdown().await;
}

/// Pops slots in arrival order and answers each of them.
///
/// With `interruptible` set, a tripped stop token breaks the wait for the
/// next slot. Without it the loop only ends once the pipeline is closed and
/// drained, which is guaranteed after the listener is gone.
async fn process_responses<IO>(
    connection: &Arc<Connection<IO>>,
    consumer: &Consumer<RequestSlot>,
    stop: &StopToken,
    is_response_chain_valid: &mut bool,
    interruptible: bool,
) where
    IO: Read + Write + Clone + Send + Sync + Unpin + 'static,
{
    loop {
        let next = if interruptible {
            future::race(
                async {
                    match consumer.pop().await {
                        Some(slot) => Next::Slot(slot),
                        None => Next::Closed,
                    }
                },
                async {
                    stop.stopped().await;
                    Next::Interrupted
                },
            )
            .await
        } else {
            match consumer.pop().await {
                Some(slot) => Next::Slot(slot),
                None => Next::Closed,
            }
        };

        let slot = match next {
            Next::Slot(slot) => slot,
            Next::Closed | Next::Interrupted => return,
        };
        let RequestSlot { mut request, task } = slot;

        join_handler(&mut request, task, stop, is_response_chain_valid).await;

        // Now we must complete processing: nothing below waits on the stop
        // token, so a response that started going out finishes going out.
        send_response(connection, &mut request, *is_response_chain_valid).await;
    }
}

/// Waits for the slot's handler and settles the response slot.
async fn join_handler(
    request: &mut Request,
    task: HandlerTask,
    stop: &StopToken,
    is_response_chain_valid: &mut bool,
) {
    if stop.is_stopped() {
        // We could cancel all remaining handlers in parallel, but pipelining
        // is almost never deep enough for that to pay off.
        task.cancel().await;
        log::debug!("request processing interrupted");
        *is_response_chain_valid = false;
        return;
    }

    enum Joined {
        Finished(Result<http_types::Response, crate::handler::HandlerFailure>),
        Interrupted,
    }

    let mut task = task;
    let joined = future::race(
        async { Joined::Finished((&mut task).await) },
        async {
            stop.stopped().await;
            Joined::Interrupted
        },
    )
    .await;

    match joined {
        Joined::Finished(Ok(response)) => request.set_response(response),
        Joined::Finished(Err(failure)) => {
            log::warn!("request failed with unhandled {}", failure);
            request.mark_internal_server_error();
        }
        Joined::Interrupted => {
            task.cancel().await;
            log::debug!("request processing interrupted");
            *is_response_chain_valid = false;
        }
    }
}

/// Puts the response on the wire, or marks why it never got there.
async fn send_response<IO>(
    connection: &Arc<Connection<IO>>,
    request: &mut Request,
    is_response_chain_valid: bool,
) where
    IO: Read + Write + Clone + Send + Sync + Unpin + 'static,
{
    debug_assert!(!request.response().is_sent());
    request.set_start_send_time();

    if is_response_chain_valid {
        let mut io = connection.socket();
        if let Err(err) = request.response_mut().send(&mut io).await {
            log::log!(
                send_error_level(&err),
                "i/o error while sending data: {}",
                err
            );
            request.response_mut().set_send_failed(Instant::now());
        }
    } else {
        request.response_mut().set_send_failed(Instant::now());
    }

    request.set_finish_send_time();
    let stats = connection.stats();
    stats.active_request_count.fetch_sub(1, Ordering::Relaxed);
    stats
        .requests_processed_count
        .fetch_add(1, Ordering::Relaxed);

    request.write_access_logs(connection.peer_addr());
}
