//! Newline-delimited JSON transport for the MCP server.
//!
//! MCP's stdio transport rules:
//!
//! - Messages are UTF-8 encoded JSON-RPC
//! - Messages are delimited by newlines and must not contain embedded newlines
//! - stdin receives messages from the client, stdout sends them back
//! - stderr may be used for logging (not MCP messages)
//!
//! [`Transport`] is generic over the byte streams so the server can be driven
//! from in-memory buffers; [`StdioTransport`] is the production instance.

use std::io;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

/// Line-oriented JSON-RPC transport over an arbitrary reader and writer.
pub struct Transport<R, W> {
    reader: BufReader<R>,
    writer: W,
}

/// The transport used in production: stdin in, stdout out.
pub type StdioTransport = Transport<tokio::io::Stdin, tokio::io::Stdout>;

impl StdioTransport {
    /// Creates a transport bound to the process's stdin and stdout.
    #[must_use]
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }
}

impl<R, W> Transport<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Creates a transport over the given streams.
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    /// The underlying writer.
    pub const fn writer(&self) -> &W {
        &self.writer
    }

    /// Reads the next message line.
    ///
    /// Returns `None` once the input is closed (EOF).
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails.
    pub async fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        let bytes_read = self.reader.read_line(&mut line).await?;

        if bytes_read == 0 {
            return Ok(None);
        }

        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }

        Ok(Some(line))
    }

    /// Serialises `message` as one newline-terminated JSON line.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation or writing fails.
    pub async fn write_message<T: Serialize>(&mut self, message: &T) -> io::Result<()> {
        let json = serde_json::to_string(message)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        debug_assert!(
            !json.contains('\n'),
            "JSON message must not contain embedded newlines"
        );

        self.writer.write_all(json.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;

        Ok(())
    }
}
