//! Wire codec for the control channel.
//!
//! Requests are HTTP/1.1-shaped `POST`s with a fixed trailer of
//! `Content-Length` and `User-Agent`. Responses are read line by line: the
//! status line decides the outcome, header lines are drained and discarded,
//! and the first empty line ends the response. Response bodies are never
//! expected on this channel.

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{LinkError, LinkResult};
use crate::protocol_constants::{
    NOOP_PATH, PLAY_PATH, RESERVED_HEADERS, REVERSE_PATH, SUCCESS_PREFIX,
    SWITCHING_PROTOCOLS_PREFIX, UPGRADE_PROTOCOL, USER_AGENT,
};

// ─────────────────────────────────────────────────────────────────────────────
// Command
// ─────────────────────────────────────────────────────────────────────────────

/// A single control-channel request.
///
/// Headers keep insertion order and may repeat a name; each entry becomes
/// one header line on the wire.
///
/// # Example
/// ```
/// use atvlink_core::Command;
///
/// let cmd = Command::new("/scrub").header("X-Apple-Session-ID", "42");
/// assert_eq!(cmd.target(), "/scrub");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    target: String,
    headers: Vec<(String, String)>,
    body: Option<Bytes>,
}

impl Command {
    /// Creates a command for the given endpoint with no headers and no body.
    #[must_use]
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Appends a header line.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the request body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// The reverse-HTTP registration sent as the first command on every link.
    #[must_use]
    pub fn reverse_handshake() -> Self {
        Self::new(REVERSE_PATH)
            .header("Upgrade", UPGRADE_PROTOCOL)
            .header("Connection", "Upgrade")
    }

    /// The content-free command used for keep-alive traffic.
    #[must_use]
    pub fn noop() -> Self {
        Self::new(NOOP_PATH)
    }

    /// Asks the receiver to start playing the resource at `address` from the beginning.
    #[must_use]
    pub fn play(address: &str) -> Self {
        Self::new(PLAY_PATH).body(format!(
            "Content-Location: {}\r\nStart-Position: 0\r\n",
            address
        ))
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn body_bytes(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Returns true if this command carries a non-empty `Upgrade` header.
    ///
    /// Only such commands accept a `101` status as success.
    #[must_use]
    pub fn expects_upgrade(&self) -> bool {
        self.headers
            .iter()
            .any(|(name, value)| name.eq_ignore_ascii_case("Upgrade") && !value.is_empty())
    }

    /// Rejects headers the codec writes itself.
    ///
    /// # Errors
    /// Returns `LinkError::ReservedHeader` naming the first offending header.
    pub fn validate(&self) -> LinkResult<()> {
        for (name, _) in &self.headers {
            if RESERVED_HEADERS
                .iter()
                .any(|reserved| name.eq_ignore_ascii_case(reserved))
            {
                return Err(LinkError::ReservedHeader(name.clone()));
            }
        }
        Ok(())
    }

    /// Serializes the command into its on-wire request bytes.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let body = self.body.as_deref().unwrap_or_default();
        let mut buf = BytesMut::with_capacity(128 + body.len());

        buf.put_slice(format!("POST {} HTTP/1.1\r\n", self.target).as_bytes());
        for (name, value) in &self.headers {
            buf.put_slice(format!("{}: {}\r\n", name, value).as_bytes());
        }
        buf.put_slice(
            format!(
                "Content-Length: {}\r\nUser-Agent: {}\r\n\r\n",
                body.len(),
                USER_AGENT
            )
            .as_bytes(),
        );
        buf.put_slice(body);

        buf.freeze()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Request / Response I/O
// ─────────────────────────────────────────────────────────────────────────────

/// Writes the encoded command and flushes the writer.
pub async fn write_command<W>(writer: &mut W, command: &Command) -> LinkResult<()>
where
    W: AsyncWrite + Unpin,
{
    let encoded = command.encode();
    writer
        .write_all(&encoded)
        .await
        .map_err(LinkError::Write)?;
    writer.flush().await.map_err(LinkError::Write)
}

/// Reads one line, without its `\r\n` or `\n` terminator.
///
/// Returns `Ok(None)` at end-of-stream. An unterminated final line is returned
/// as a line. Not cancel-safe: a partially read line is lost if the future is
/// dropped.
///
/// # Errors
/// `LinkError::LineTooLong` if the line exceeds `limit` bytes,
/// `LinkError::Read` on socket errors.
pub async fn read_line<R>(reader: &mut R, limit: usize) -> LinkResult<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    loop {
        let available = reader.fill_buf().await.map_err(LinkError::Read)?;
        if available.is_empty() {
            if line.is_empty() {
                return Ok(None);
            }
            break;
        }

        match available.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                line.extend_from_slice(&available[..pos]);
                reader.consume(pos + 1);
                break;
            }
            None => {
                let len = available.len();
                line.extend_from_slice(available);
                reader.consume(len);
            }
        }

        // Allow one extra byte for a '\r' whose '\n' has not arrived yet.
        if line.len() > limit + 1 {
            return Err(LinkError::LineTooLong { limit });
        }
    }

    if line.last() == Some(&b'\r') {
        line.pop();
    }
    if line.len() > limit {
        return Err(LinkError::LineTooLong { limit });
    }

    Ok(Some(String::from_utf8_lossy(&line).into_owned()))
}

/// Reads and classifies one response.
///
/// A `101` status only counts as success when `expects_upgrade` is set.
/// Header lines are drained on failure as well, so the next response starts
/// at a status line.
///
/// # Errors
/// - `LinkError::NoStatusLine` if the stream ends before a status line
/// - `LinkError::Status` with the raw status line on a non-success status
/// - `LinkError::TruncatedResponse` if the stream ends inside the header block
/// - `LinkError::LineTooLong` / `LinkError::Read` from line reading
pub async fn read_response<R>(
    reader: &mut R,
    expects_upgrade: bool,
    max_line_len: usize,
) -> LinkResult<()>
where
    R: AsyncBufRead + Unpin,
{
    let status = read_line(reader, max_line_len)
        .await?
        .ok_or(LinkError::NoStatusLine)?;

    let upgraded = expects_upgrade && status.starts_with(SWITCHING_PROTOCOLS_PREFIX);
    let succeeded = upgraded || status.starts_with(SUCCESS_PREFIX);

    loop {
        match read_line(reader, max_line_len).await? {
            Some(line) if line.is_empty() => break,
            Some(_) => {}
            None => return Err(LinkError::TruncatedResponse),
        }
    }

    if succeeded {
        log::debug!("[Codec] Response OK: {}", status);
        Ok(())
    } else {
        Err(LinkError::Status(status))
    }
}
