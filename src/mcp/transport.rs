//! Newline-delimited transport.
//!
//! One JSON-RPC payload per line in each direction. Replies are written as
//! compact JSON so they never contain an embedded newline. Logs go to stderr,
//! never to the output stream.
//!
//! The transport only moves lines. Parsing, batching and notification
//! suppression happen in [`crate::mcp::dispatcher`].

use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::mcp::dispatcher::DispatchOutput;

/// One line read from the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A line without its terminator.
    Line(String),
    /// A line whose bytes are not valid UTF-8.
    NotUtf8,
}

/// Line transport over any buffered reader and writer.
#[derive(Debug)]
pub struct LineTransport<R, W> {
    reader: R,
    writer: W,
}

/// The transport the server binary uses.
pub type StdioTransport = LineTransport<BufReader<tokio::io::Stdin>, tokio::io::Stdout>;

impl StdioTransport {
    /// Binds to the process's stdin and stdout.
    #[must_use]
    pub fn new() -> Self {
        Self::with_io(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl<R, W> LineTransport<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Wraps an arbitrary reader and writer.
    pub const fn with_io(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    /// Reads the next line without its terminator.
    ///
    /// Returns `None` at end of input. A line that is not UTF-8 is consumed
    /// and reported as [`Inbound::NotUtf8`] so the caller can keep reading.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails.
    pub async fn read_line(&mut self) -> io::Result<Option<Inbound>> {
        let mut bytes = Vec::new();
        if self.reader.read_until(b'\n', &mut bytes).await? == 0 {
            return Ok(None);
        }

        while matches!(bytes.last(), Some(b'\n' | b'\r')) {
            bytes.pop();
        }
        Ok(Some(String::from_utf8(bytes).map_or(Inbound::NotUtf8, Inbound::Line)))
    }

    /// Writes a single reply or a batch array as one line and flushes.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub async fn write_output(&mut self, output: &DispatchOutput) -> io::Result<()> {
        let mut line = output.to_json_string();
        debug_assert!(!line.contains('\n'), "reply must fit on one line");
        line.push('\n');

        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await
    }

    /// Gives back the writer.
    pub fn into_writer(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::protocol::{
        ErrorCode, JsonRpcError, JsonRpcErrorData, JsonRpcReply, JsonRpcResponse, RequestId,
    };
    use serde_json::json;

    fn line(text: &str) -> Option<Inbound> {
        Some(Inbound::Line(text.to_string()))
    }

    #[tokio::test]
    async fn reads_lines_and_strips_terminators() {
        let input: &[u8] = b"{\"a\":1}\r\n\n{\"b\":2}";
        let mut transport = LineTransport::with_io(input, Vec::new());

        assert_eq!(transport.read_line().await.unwrap(), line("{\"a\":1}"));
        assert_eq!(transport.read_line().await.unwrap(), line(""));
        assert_eq!(transport.read_line().await.unwrap(), line("{\"b\":2}"));
        assert_eq!(transport.read_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn non_utf8_line_is_skipped_not_fatal() {
        let input: &[u8] = b"\xff\xfe\n{\"ok\":true}\n";
        let mut transport = LineTransport::with_io(input, Vec::new());

        let first = tokio_test::assert_ok!(transport.read_line().await);
        assert_eq!(first, Some(Inbound::NotUtf8));
        assert_eq!(transport.read_line().await.unwrap(), line("{\"ok\":true}"));
        assert_eq!(transport.read_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn batch_written_on_one_line() {
        let output = DispatchOutput::Batch(vec![
            JsonRpcReply::from(JsonRpcResponse::success(
                RequestId::Number(1),
                json!({"text": "line one\nline two"}),
            )),
            JsonRpcReply::from(JsonRpcError::new(
                Some(RequestId::Number(2)),
                JsonRpcErrorData::from_code(ErrorCode::MethodNotFound),
            )),
        ]);

        let input: &[u8] = b"";
        let mut transport = LineTransport::with_io(input, Vec::new());
        transport.write_output(&output).await.unwrap();

        let written = String::from_utf8(transport.into_writer()).unwrap();
        assert_eq!(written.matches('\n').count(), 1);
        assert!(written.ends_with('\n'));

        let value: serde_json::Value = serde_json::from_str(written.trim_end()).unwrap();
        assert_eq!(value[0]["result"]["text"], "line one\nline two");
        assert_eq!(value[1]["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn consecutive_replies_are_separate_lines() {
        let input: &[u8] = b"";
        let mut transport = LineTransport::with_io(input, Vec::new());
        transport
            .write_output(&DispatchOutput::Single(JsonRpcError::parse_error().into()))
            .await
            .unwrap();
        transport
            .write_output(&DispatchOutput::Single(
                JsonRpcResponse::success(RequestId::from("x"), json!({})).into(),
            ))
            .await
            .unwrap();

        let written = String::from_utf8(transport.into_writer()).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("-32700"));
        assert!(lines[1].contains("\"id\":\"x\""));
    }
}
