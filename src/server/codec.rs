//! `Content-Length` framing for JSON-RPC over stdio.

use anyhow::{Context, Result, bail};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Upper bound on a single message body.
const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

/// Upper bound on a single header line, terminator included.
const MAX_HEADER_LINE_BYTES: u64 = 8 * 1024;

/// Reads framed JSON messages from the server's stdout.
pub struct FrameReader<R> {
    inner: BufReader<R>,
    line: String,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            inner: BufReader::new(reader),
            line: String::new(),
        }
    }

    /// Next message, or `None` when the stream ends between messages.
    pub async fn next_message(&mut self) -> Result<Option<serde_json::Value>> {
        let Some(length) = self.read_header_block().await? else {
            return Ok(None);
        };

        if length > MAX_BODY_BYTES {
            bail!("message of {length} bytes exceeds limit of {MAX_BODY_BYTES}");
        }

        let mut body = vec![0u8; length];
        self.inner
            .read_exact(&mut body)
            .await
            .context("reading message body")?;

        serde_json::from_slice(&body).context("decoding message body")
    }

    async fn read_header_block(&mut self) -> Result<Option<usize>> {
        let mut length = None;
        let mut started = false;

        loop {
            self.line.clear();
            let read = (&mut self.inner)
                .take(MAX_HEADER_LINE_BYTES)
                .read_line(&mut self.line)
                .await
                .context("reading header")?;
            if read as u64 == MAX_HEADER_LINE_BYTES && !self.line.ends_with('\n') {
                bail!("header line exceeds limit of {MAX_HEADER_LINE_BYTES} bytes");
            }

            if read == 0 {
                if started {
                    bail!("stream ended inside a header block");
                }
                return Ok(None);
            }
            started = true;

            let header = self.line.trim();
            if header.is_empty() {
                break;
            }
            if let Some(value) = content_length(header)? {
                length = Some(value);
            }
        }

        length
            .map(Some)
            .context("header block without Content-Length")
    }
}

/// Parse a `Content-Length` header line. Other headers yield `None`.
fn content_length(header: &str) -> Result<Option<usize>> {
    let Some((name, value)) = header.split_once(':') else {
        return Ok(None);
    };
    if !name.trim().eq_ignore_ascii_case("content-length") {
        return Ok(None);
    }
    let value = value
        .trim()
        .parse()
        .with_context(|| format!("bad Content-Length '{}'", value.trim()))?;
    Ok(Some(value))
}

/// Writes framed JSON messages to the server's stdin.
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { inner: writer }
    }

    pub async fn send(&mut self, message: &serde_json::Value) -> Result<()> {
        let body = serde_json::to_vec(message).context("encoding message")?;
        let mut frame = format!("Content-Length: {}\r\n\r\n", body.len()).into_bytes();
        frame.extend_from_slice(&body);

        self.inner
            .write_all(&frame)
            .await
            .context("writing message")?;
        self.inner.flush().await.context("flushing message")
    }
}
