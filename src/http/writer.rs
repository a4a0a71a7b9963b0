use std::time::Duration;

use anyhow::Context;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::http::response::Response;

const HTTP_VERSION: &str = "HTTP/1.1";

/// Value of the `Server` header injected on every response.
pub const SERVER_NAME: &str = "CustomHTTPServer/1.0";

/// Serializes a response to wire bytes.
///
/// Caller-supplied headers are emitted verbatim, followed by the three
/// server-injected ones: `Content-Length`, `Connection: close` and `Server`.
pub fn serialize_response(resp: &Response) -> Vec<u8> {
    let mut buf = Vec::with_capacity(resp.body.len() + 256);

    let status_line = format!(
        "{} {} {}\r\n",
        HTTP_VERSION,
        resp.status.as_u16(),
        resp.status.reason_phrase()
    );
    buf.extend_from_slice(status_line.as_bytes());

    for (name, value) in &resp.headers {
        buf.extend_from_slice(name.as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(value.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }

    buf.extend_from_slice(format!("Content-Length: {}\r\n", resp.body.len()).as_bytes());
    buf.extend_from_slice(b"Connection: close\r\n");
    buf.extend_from_slice(format!("Server: {}\r\n", SERVER_NAME).as_bytes());

    buf.extend_from_slice(b"\r\n");
    buf.extend_from_slice(resp.body.as_bytes());

    buf
}

/// Writes a serialized response to a stream under a deadline.
pub struct ResponseWriter {
    buffer: Vec<u8>,
}

impl ResponseWriter {
    pub fn new(response: &Response) -> Self {
        Self {
            buffer: serialize_response(response),
        }
    }

    /// Writes the full response, failing if `deadline` elapses first.
    pub async fn write_to_stream(
        &self,
        stream: &mut TcpStream,
        deadline: Duration,
    ) -> anyhow::Result<()> {
        timeout(deadline, async {
            stream
                .write_all(&self.buffer)
                .await
                .context("writing response")?;
            stream.flush().await.context("flushing response")
        })
        .await
        .context("response write timed out")?
    }
}
