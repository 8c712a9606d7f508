use std::io;
use std::time::{Instant, SystemTime};

use async_std::io::Write;
use http_types::{Method, StatusCode, Url, Version};

use crate::handler::HandlerTask;
use crate::server::encode;

/// Bookkeeping for one request travelling through the pipeline.
///
/// The parsed [`http_types::Request`] itself is handed to the handler task;
/// what stays behind is the data the response sender needs to put a response
/// on the wire and write access logs: the request line, the response slot
/// and the send timings.
#[derive(Debug)]
pub struct Request {
    method: Method,
    url: Url,
    version: Option<Version>,
    is_final: bool,
    received: Instant,
    start_send_time: Option<Instant>,
    finish_send_time: Option<Instant>,
    response: Response,
}

impl Request {
    pub(crate) fn new(method: Method, url: Url, version: Option<Version>, is_final: bool) -> Self {
        Self {
            method,
            url,
            version,
            is_final,
            received: Instant::now(),
            start_send_time: None,
            finish_send_time: None,
            response: Response::empty(),
        }
    }

    /// The request method.
    pub fn method(&self) -> Method {
        self.method
    }

    /// The request URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The HTTP version the request was made with.
    pub fn version(&self) -> Option<Version> {
        self.version
    }

    /// Whether this is the last request serviced on its connection.
    pub fn is_final(&self) -> bool {
        self.is_final
    }

    /// The response slot for this request.
    pub fn response(&self) -> &Response {
        &self.response
    }

    /// Mutable access to the response slot.
    pub fn response_mut(&mut self) -> &mut Response {
        &mut self.response
    }

    pub(crate) fn set_response(&mut self, response: http_types::Response) {
        self.response.inner = Some(response);
    }

    /// Replaces whatever is in the response slot with a generic 500.
    pub(crate) fn mark_internal_server_error(&mut self) {
        let mut response = http_types::Response::new(StatusCode::InternalServerError);
        response.set_body("internal server error");
        self.response.inner = Some(response);
    }

    pub(crate) fn set_start_send_time(&mut self) {
        self.start_send_time = Some(Instant::now());
    }

    pub(crate) fn set_finish_send_time(&mut self) {
        self.finish_send_time = Some(Instant::now());
    }

    /// Emits one plain and one tskv access log line for this request.
    pub(crate) fn write_access_logs(&self, peer: &str) {
        let status = match self.response.status() {
            Some(status) => u16::from(status).to_string(),
            None => "-".to_owned(),
        };
        let outcome = if self.response.is_sent() {
            "sent"
        } else {
            "failed"
        };
        let finished = self.finish_send_time.unwrap_or_else(Instant::now);
        let elapsed = finished.duration_since(self.received);

        log::info!(
            target: "h1_pipeline::access",
            "{} \"{} {}\" {} {} {}ms",
            peer,
            self.method,
            self.url.path(),
            status,
            outcome,
            elapsed.as_millis(),
        );
        log::info!(
            target: "h1_pipeline::access_tskv",
            "tskv\ttimestamp={}\tremote_addr={}\tmethod={}\tpath={}\tstatus={}\toutcome={}\trequest_time={}",
            httpdate::fmt_http_date(SystemTime::now()),
            peer,
            self.method,
            self.url.path(),
            status,
            outcome,
            elapsed.as_secs_f64(),
        );
    }
}

/// The response slot of a [`Request`].
///
/// Starts out empty, gets populated by the handler (or with a generic 500
/// when the handler fails) and ends up in exactly one of two terminal
/// states: sent, or marked as failed without touching the socket.
#[derive(Debug)]
pub struct Response {
    inner: Option<http_types::Response>,
    is_sent: bool,
    send_failed_at: Option<Instant>,
}

impl Response {
    pub(crate) fn empty() -> Self {
        Self {
            inner: None,
            is_sent: false,
            send_failed_at: None,
        }
    }

    /// Whether the response went out over the socket.
    pub fn is_sent(&self) -> bool {
        self.is_sent
    }

    /// Whether the response was abandoned without being written.
    pub fn send_failed(&self) -> bool {
        self.send_failed_at.is_some()
    }

    /// The status of the populated response, if any.
    pub fn status(&self) -> Option<StatusCode> {
        self.inner.as_ref().map(|response| response.status())
    }

    /// Records that this response will never be written.
    pub(crate) fn set_send_failed(&mut self, at: Instant) {
        debug_assert!(!self.is_sent);
        self.send_failed_at = Some(at);
    }

    /// Serializes the response onto `io` and marks it as sent.
    pub(crate) async fn send<IO>(&mut self, io: &mut IO) -> io::Result<()>
    where
        IO: Write + Unpin,
    {
        debug_assert!(!self.is_sent);
        let mut response = match self.inner.take() {
            Some(response) => response,
            None => {
                // nothing to put on the wire
                self.set_send_failed(Instant::now());
                return Ok(());
            }
        };
        encode::write_response(&mut response, io).await?;
        self.is_sent = true;
        Ok(())
    }
}

/// What travels through the pipeline: a request plus its running handler.
///
/// The response sender owns the slot exclusively while it waits on the
/// handler, so the request outlives the handler task on every path,
/// including cancellation.
#[derive(Debug)]
pub(crate) struct RequestSlot {
    pub(crate) request: Request,
    pub(crate) task: HandlerTask,
}
