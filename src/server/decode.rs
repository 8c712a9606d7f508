//! Incremental decoding of pipelined HTTP/1.1 requests.

use std::str::FromStr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use http_types::headers::{CONNECTION, CONTENT_LENGTH, TRANSFER_ENCODING};
use http_types::{Body, Method, Url, Version};

use crate::error::Error;
use crate::request::Request;
use crate::stats::Stats;
use crate::{MAX_HEADERS, MAX_HEAD_LENGTH};

/// The number returned from httparse when the request is HTTP 1.1
const HTTP_1_1_VERSION: u8 = 1;

/// Limits applied while decoding requests.
#[derive(Clone, Debug)]
pub struct ParserConfig {
    /// Maximum length of a request head, in bytes.
    pub max_head_length: usize,
    /// Maximum length of a request body, in bytes.
    pub max_body_length: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_head_length: MAX_HEAD_LENGTH,
            max_body_length: 1024 * 1024,
        }
    }
}

/// A request decoded off the wire, split into its two halves.
#[derive(Debug)]
pub(crate) struct Decoded {
    /// Bookkeeping that travels through the pipeline.
    pub(crate) request: Request,
    /// The parsed request, handed to the handler task.
    pub(crate) payload: http_types::Request,
}

/// Everything one call to [`RequestParser::feed`] produced.
///
/// A malformed tail does not invalidate the complete requests decoded before
/// it, so both fields can be populated at once.
#[derive(Debug)]
pub(crate) struct Feed {
    pub(crate) requests: Vec<Decoded>,
    pub(crate) error: Option<Error>,
}

enum ParsedHead {
    Complete(Decoded),
    NeedsBody(PendingBody),
    Partial,
}

struct PendingBody {
    request: Request,
    payload: http_types::Request,
    remaining: usize,
    bytes: Vec<u8>,
}

impl PendingBody {
    fn finish(mut self) -> Decoded {
        self.payload.set_body(Body::from_bytes(self.bytes));
        Decoded {
            request: self.request,
            payload: self.payload,
        }
    }
}

/// Push-style decoder for the request side of a connection.
///
/// Bytes go in as they arrive off the socket; complete requests come out in
/// the order they appeared on the wire, pipelining included. Body bytes are
/// buffered until the declared `content-length` is reached, so a request is
/// only ever surfaced whole.
pub(crate) struct RequestParser {
    config: ParserConfig,
    stats: Arc<Stats>,
    buf: Vec<u8>,
    body: Option<PendingBody>,
}

impl RequestParser {
    pub(crate) fn new(config: ParserConfig, stats: Arc<Stats>) -> Self {
        Self {
            config,
            stats,
            buf: Vec::new(),
            body: None,
        }
    }

    /// Feeds `data` into the parser, returning what became decodable.
    ///
    /// An error means the byte stream is beyond recovery; callers are
    /// expected to stop feeding and wind the connection down.
    pub(crate) fn feed(&mut self, data: &[u8]) -> Feed {
        self.buf.extend_from_slice(data);
        let mut requests = Vec::new();

        let error = loop {
            if let Some(mut pending) = self.body.take() {
                let take = pending.remaining.min(self.buf.len());
                pending.bytes.extend_from_slice(&self.buf[..take]);
                self.consume(take);
                pending.remaining -= take;
                if pending.remaining > 0 {
                    self.body = Some(pending);
                    break None;
                }
                self.stats.parser.requests_parsed.fetch_add(1, Ordering::Relaxed);
                requests.push(pending.finish());
                continue;
            }

            if self.buf.is_empty() {
                break None;
            }

            match self.parse_head() {
                Ok(ParsedHead::Complete(decoded)) => {
                    self.stats.parser.requests_parsed.fetch_add(1, Ordering::Relaxed);
                    requests.push(decoded);
                }
                Ok(ParsedHead::NeedsBody(pending)) => self.body = Some(pending),
                Ok(ParsedHead::Partial) => {
                    if self.buf.len() > self.config.max_head_length {
                        break Some(Error::HeadTooLarge);
                    }
                    break None;
                }
                Err(err) => break Some(err),
            }
        };

        if error.is_some() {
            self.stats.parser.parse_errors.fetch_add(1, Ordering::Relaxed);
        }
        Feed { requests, error }
    }

    fn parse_head(&mut self) -> Result<ParsedHead, Error> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut parsed = httparse::Request::new(&mut headers);

        let head_len = match parsed.parse(&self.buf)? {
            httparse::Status::Complete(head_len) => head_len,
            httparse::Status::Partial => return Ok(ParsedHead::Partial),
        };
        if head_len > self.config.max_head_length {
            return Err(Error::HeadTooLarge);
        }

        let method = parsed.method.ok_or(Error::MalformedHead("no method"))?;
        let method =
            Method::from_str(method).map_err(|_| Error::MalformedHead("unknown method"))?;
        let version = parsed.version.ok_or(Error::MalformedHead("no version"))?;
        if version != HTTP_1_1_VERSION {
            return Err(Error::Unsupported("only HTTP/1.1 is served here"));
        }
        let url = url_from_head(&parsed)?;

        let mut payload = http_types::Request::new(method, url.clone());
        payload.set_version(Some(Version::Http1_1));
        for header in parsed.headers.iter() {
            let value = std::str::from_utf8(header.value)
                .map_err(|_| Error::MalformedHead("header value is not utf-8"))?;
            payload.append_header(header.name, value);
        }

        if payload.header(TRANSFER_ENCODING).is_some() {
            return Err(Error::Unsupported("transfer-encoding"));
        }
        let content_length = match payload.header(CONTENT_LENGTH) {
            Some(values) => Some(
                values
                    .last()
                    .as_str()
                    .parse::<usize>()
                    .map_err(|_| Error::MalformedHead("invalid content-length"))?,
            ),
            None => None,
        };
        if let Some(len) = content_length {
            if len > self.config.max_body_length {
                return Err(Error::BodyTooLarge);
            }
        }

        let is_final = connection_close(&payload);
        let request = Request::new(method, url, Some(Version::Http1_1), is_final);
        self.consume(head_len);

        match content_length {
            Some(len) if len > 0 => Ok(ParsedHead::NeedsBody(PendingBody {
                request,
                payload,
                remaining: len,
                bytes: Vec::with_capacity(len),
            })),
            _ => Ok(ParsedHead::Complete(Decoded { request, payload })),
        }
    }

    fn consume(&mut self, amount: usize) {
        let rest = self.buf.split_off(amount);
        self.buf = rest;
    }
}

impl std::fmt::Debug for RequestParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestParser")
            .field("buffered", &self.buf.len())
            .field("in_body", &self.body.is_some())
            .finish()
    }
}

fn url_from_head(parsed: &httparse::Request<'_, '_>) -> Result<Url, Error> {
    let path = parsed.path.ok_or(Error::MalformedHead("no uri"))?;

    if path.starts_with("http://") || path.starts_with("https://") {
        return Url::parse(path).map_err(|_| Error::MalformedHead("invalid absolute uri"));
    }
    if !path.starts_with('/') {
        return Err(Error::MalformedHead("unexpected uri format"));
    }

    let host = parsed
        .headers
        .iter()
        .find(|header| header.name.eq_ignore_ascii_case("host"))
        .ok_or(Error::MalformedHead("mandatory host header missing"))?
        .value;
    let host = std::str::from_utf8(host).map_err(|_| Error::MalformedHead("invalid host"))?;

    Url::parse(&format!("http://{}/", host))
        .and_then(|base| base.join(path))
        .map_err(|_| Error::MalformedHead("invalid uri"))
}

/// Does the `connection` header ask for this request to be the last one?
///
/// The header is a comma-separated token list and tokens are
/// case-insensitive, so `Connection: Keep-Alive, Close` still closes.
fn connection_close(payload: &http_types::Request) -> bool {
    match payload.header(CONNECTION) {
        Some(values) => values.iter().any(|value| {
            value
                .as_str()
                .split(',')
                .any(|token| token.trim().eq_ignore_ascii_case("close"))
        }),
        None => false,
    }
}
