//! Pipelined HTTP/1.1 connection servicing.
//!
//! This crate owns an accepted client socket and runs the request/response
//! pipeline for it: a socket listener task reads bytes and decodes pipelined
//! requests, each request's handler runs as its own task on the executor,
//! and a response sender task joins the handlers and writes responses back
//! in the exact order the requests arrived. Backpressure, graceful shutdown,
//! half-close handling and handler panic isolation are all part of the deal.
//!
//! ## Example
//!
//! ```no_run
//! use async_std::net::TcpListener;
//! use async_std::prelude::*;
//! use http_types::{Response, StatusCode};
//! use std::sync::Arc;
//!
//! use h1_pipeline::{Connection, ConnectionConfig, HandlerRegistry, Stats};
//!
//! async fn index(_req: http_types::Request) -> http_types::Result<Response> {
//!     let mut res = Response::new(StatusCode::Ok);
//!     res.set_body("hello chashu");
//!     Ok(res)
//! }
//!
//! fn main() -> http_types::Result<()> {
//!     async_std::task::block_on(async {
//!         let mut registry = HandlerRegistry::new();
//!         registry.at("/", index);
//!         let registry = Arc::new(registry);
//!         let stats = Arc::new(Stats::default());
//!
//!         let listener = TcpListener::bind(("127.0.0.1", 8080)).await?;
//!         let mut incoming = listener.incoming();
//!         while let Some(stream) = incoming.next().await {
//!             let stream = stream?;
//!             let peer = stream.peer_addr()?.to_string();
//!             let connection = Connection::create(
//!                 ConnectionConfig::default(),
//!                 stream,
//!                 peer,
//!                 registry.clone(),
//!                 stats.clone(),
//!             );
//!             connection.start();
//!         }
//!         Ok(())
//!     })
//! }
//! ```

#![forbid(unsafe_code, future_incompatible, rust_2018_idioms)]
#![deny(missing_debug_implementations, nonstandard_style)]
#![warn(missing_docs, unreachable_pub)]

/// The maximum amount of headers parsed on the server.
const MAX_HEADERS: usize = 100;

/// The maximum length of the head section we'll try to parse.
const MAX_HEAD_LENGTH: usize = 8 * 1024;

mod error;
mod handler;
mod request;
mod stats;
mod stop;

pub mod pipeline;
pub mod server;

pub use error::Error;
pub use handler::HandlerRegistry;
pub use request::{Request, Response};
pub use server::{Connection, ConnectionConfig, ParserConfig};
pub use stats::{ParserStats, Stats};

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
