use std::sync::atomic::{AtomicU64, AtomicUsize};

/// Process-wide connection and request counters.
///
/// A single instance is shared by reference between all connections; both
/// halves of a connection update it, so everything in here is atomic. All
/// counters are monotonic except the `active_*` gauges.
#[derive(Debug, Default)]
pub struct Stats {
    /// Connections currently being serviced.
    pub active_connections: AtomicUsize,
    /// Connections accepted since startup.
    pub connections_created: AtomicU64,
    /// Connections torn down since startup.
    pub connections_closed: AtomicU64,
    /// Requests somewhere between being enqueued and having their response
    /// written (or marked as failed).
    pub active_request_count: AtomicUsize,
    /// Requests that went through the full pipeline.
    pub requests_processed_count: AtomicU64,
    /// Counters owned by the request parser.
    pub parser: ParserStats,
}

/// Counters the request parser updates while decoding.
#[derive(Debug, Default)]
pub struct ParserStats {
    /// Complete requests decoded from the byte stream.
    pub requests_parsed: AtomicU64,
    /// Byte streams rejected as malformed or unsupported.
    pub parse_errors: AtomicU64,
}
