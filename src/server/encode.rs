//! HTTP/1.1 response serialization.

use std::io;
use std::time::SystemTime;

use async_std::io::Write;
use async_std::prelude::*;

/// How much body we read per chunk when the length isn't known up front.
const CHUNK_SIZE: usize = 8 * 1024;

/// Writes `response` onto `io` and flushes it.
///
/// Bodies with a known length are sent with a `content-length` header;
/// everything else goes out chunked. The whole response is written before
/// this returns, which is what keeps pipelined responses from interleaving.
pub(crate) async fn write_response<IO>(
    response: &mut http_types::Response,
    io: &mut IO,
) -> io::Result<()>
where
    IO: Write + Unpin,
{
    let body_len = response.len();

    let mut head: Vec<u8> = Vec::with_capacity(256);
    let reason = response.status().canonical_reason();
    let status = response.status();
    std::io::Write::write_fmt(&mut head, format_args!("HTTP/1.1 {} {}\r\n", status, reason))?;

    match body_len {
        Some(len) => {
            std::io::Write::write_fmt(&mut head, format_args!("content-length: {}\r\n", len))?
        }
        None => std::io::Write::write_fmt(&mut head, format_args!("transfer-encoding: chunked\r\n"))?,
    }

    let date = httpdate::fmt_http_date(SystemTime::now());
    std::io::Write::write_fmt(&mut head, format_args!("date: {}\r\n", date))?;

    for (header, values) in response.iter() {
        for value in values.iter() {
            std::io::Write::write_fmt(&mut head, format_args!("{}: {}\r\n", header, value))?;
        }
    }
    head.extend_from_slice(b"\r\n");
    io.write_all(&head).await?;

    let mut body = response.take_body();
    match body_len {
        Some(_) => {
            async_std::io::copy(&mut body, &mut *io).await?;
        }
        None => {
            let mut chunk = vec![0u8; CHUNK_SIZE];
            loop {
                let read = body.read(&mut chunk).await?;
                if read == 0 {
                    io.write_all(b"0\r\n\r\n").await?;
                    break;
                }
                let mut frame = Vec::with_capacity(read + 16);
                std::io::Write::write_fmt(&mut frame, format_args!("{:X}\r\n", read))?;
                frame.extend_from_slice(&chunk[..read]);
                frame.extend_from_slice(b"\r\n");
                io.write_all(&frame).await?;
            }
        }
    }

    io.flush().await
}
