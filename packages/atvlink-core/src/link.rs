//! Reverse-HTTP control link.
//!
//! A [`Link`] owns one TCP connection to a receiver. After dialing, it sends
//! the reverse registration (`POST /reverse` with `Upgrade: PTTH/1.0`); from
//! then on the controller keeps issuing commands on the same socket.
//!
//! All socket I/O happens on a single dispatcher task. Callers hand commands
//! to it through a FIFO queue and wait on a one-shot reply; the keep-alive
//! source competes for the same slot, so exactly one request/response round
//! trip is on the wire at any time. Between commands the dispatcher watches
//! the socket for a device hangup or unsolicited data and publishes what it
//! sees as a [`LinkStatus`].
//!
//! There are no per-operation deadlines: a receiver that stops answering
//! mid-response stalls the dispatcher, and every caller queued behind it.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::codec::{read_line, read_response, write_command, Command};
use crate::error::{LinkError, LinkResult};
use crate::keepalive::{IntervalKeepAlive, KeepAliveSource, NoKeepAlive};
use crate::protocol_constants::{KEEPALIVE_INTERVAL_SECS, MAX_LINE_LEN, REQUEST_QUEUE_CAPACITY};

/// Reason published when a keep-alive no-op finds the connection broken.
const KEEPALIVE_LOST: &str = "connection lost during keep-alive";

// ─────────────────────────────────────────────────────────────────────────────
// Configuration & Status
// ─────────────────────────────────────────────────────────────────────────────

/// Tunables for a [`Link`].
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Period between keep-alive no-ops. `None` disables them; the caller
    /// is then expected to call [`Link::noop`] itself.
    pub keepalive_interval: Option<Duration>,
    /// Longest response line accepted, in bytes.
    pub max_line_len: usize,
    /// Number of commands that may wait in the dispatcher queue.
    pub queue_capacity: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            keepalive_interval: Some(Duration::from_secs(KEEPALIVE_INTERVAL_SECS)),
            max_line_len: MAX_LINE_LEN,
            queue_capacity: REQUEST_QUEUE_CAPACITY,
        }
    }
}

/// What the dispatcher last observed about the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkStatus {
    /// Connection is up and the dispatcher is serving commands.
    Open,
    /// Receiver sent a line outside any request. The link stays up and keeps
    /// serving commands, but this stays the reported status until the link
    /// ends.
    Unsolicited(String),
    /// Receiver closed the connection cleanly. Terminal.
    Hangup,
    /// Dispatcher stopped after a fatal I/O or framing error. Terminal.
    Failed(String),
    /// Link was closed locally. Terminal.
    Closed,
}

impl LinkStatus {
    /// Returns true once the dispatcher has stopped.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Hangup | Self::Failed(_) | Self::Closed)
    }
}

/// A queued command and the slot its outcome is delivered to.
struct Request {
    command: Command,
    reply: oneshot::Sender<LinkResult<()>>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Link
// ─────────────────────────────────────────────────────────────────────────────

/// Control link to a single receiver.
///
/// `Link` is `Sync`; share it by reference or `Arc` to issue commands from
/// several tasks. Closing takes the link by value, so it cannot race with
/// commands issued through outstanding borrows.
pub struct Link {
    requests: mpsc::Sender<Request>,
    status: watch::Receiver<LinkStatus>,
    local_addr: SocketAddr,
    dispatcher: JoinHandle<()>,
}

impl Link {
    /// Dials the receiver and performs the reverse handshake.
    ///
    /// Keep-alive follows `config.keepalive_interval`.
    ///
    /// # Errors
    /// `LinkError::Dial` if the receiver is unreachable,
    /// `LinkError::Handshake` if the registration is rejected. In the latter
    /// case the connection is closed before returning.
    pub async fn connect<A>(addr: A, config: &LinkConfig) -> LinkResult<Self>
    where
        A: ToSocketAddrs,
    {
        match config.keepalive_interval {
            Some(period) => Self::connect_with(addr, config, IntervalKeepAlive::new(period)).await,
            None => Self::connect_with(addr, config, NoKeepAlive).await,
        }
    }

    /// Like [`Link::connect`], with an explicit keep-alive source.
    ///
    /// `config.keepalive_interval` is ignored.
    pub async fn connect_with<A, K>(addr: A, config: &LinkConfig, keepalive: K) -> LinkResult<Self>
    where
        A: ToSocketAddrs,
        K: KeepAliveSource,
    {
        let stream = TcpStream::connect(addr).await.map_err(LinkError::Dial)?;
        let local_addr = stream.local_addr().map_err(LinkError::Dial)?;
        match stream.peer_addr() {
            Ok(peer) => log::info!("[Link] Connected to {} from {}", peer, local_addr),
            Err(_) => log::info!("[Link] Connected from {}", local_addr),
        }

        let link = Self::start(stream, local_addr, config, keepalive);

        if let Err(e) = link.perform(Command::reverse_handshake()).await {
            log::warn!("[Link] Reverse handshake failed: {}", e);
            link.close().await;
            return Err(LinkError::Handshake(Box::new(e)));
        }

        log::info!("[Link] Reverse handshake complete");
        Ok(link)
    }

    /// Spawns the dispatcher over an already-connected stream.
    fn start<K>(stream: TcpStream, local_addr: SocketAddr, config: &LinkConfig, keepalive: K) -> Self
    where
        K: KeepAliveSource,
    {
        let (read_half, write_half) = stream.into_split();
        let (requests_tx, requests_rx) = mpsc::channel(config.queue_capacity.max(1));
        let (status_tx, status_rx) = watch::channel(LinkStatus::Open);

        let dispatcher = Dispatcher {
            reader: BufReader::new(read_half),
            writer: write_half,
            requests: requests_rx,
            keepalive,
            status: status_tx,
            max_line_len: config.max_line_len,
        };

        Self {
            requests: requests_tx,
            status: status_rx,
            local_addr,
            dispatcher: tokio::spawn(dispatcher.run()),
        }
    }

    /// Sends a command and waits for the receiver's answer.
    ///
    /// Commands from concurrent callers are served in queue order.
    ///
    /// # Errors
    /// `LinkError::ReservedHeader` before anything is queued if the command
    /// sets `Content-Length` or `User-Agent`; `LinkError::Closed` if the
    /// dispatcher has stopped; otherwise the write/decode failure.
    pub async fn perform(&self, command: Command) -> LinkResult<()> {
        command.validate()?;

        let (reply, outcome) = oneshot::channel();
        self.requests
            .send(Request { command, reply })
            .await
            .map_err(|_| LinkError::Closed)?;

        outcome.await.map_err(|_| LinkError::Closed)?
    }

    /// Asks the receiver to play the media at `address`, from the start.
    pub async fn play(&self, address: &str) -> LinkResult<()> {
        log::info!("[Link] Play: {}", address);
        self.perform(Command::play(address)).await
    }

    /// Sends a single no-op through the queue and returns its outcome.
    pub async fn noop(&self) -> LinkResult<()> {
        self.perform(Command::noop()).await
    }

    /// Waits until the receiver closes the connection.
    ///
    /// Unsolicited lines seen before this call are ignored.
    ///
    /// # Errors
    /// `LinkError::UnexpectedData` if the receiver sends anything while
    /// waiting, `LinkError::Terminated` if the dispatcher stopped on an error,
    /// `LinkError::Closed` if the link was closed locally.
    pub async fn idle(&self) -> LinkResult<()> {
        let mut status = self.status.clone();

        let current = status.borrow_and_update().clone();
        if current.is_terminal() {
            return Self::idle_outcome(current);
        }

        loop {
            if status.changed().await.is_err() {
                return Err(LinkError::Closed);
            }
            let current = status.borrow_and_update().clone();
            if current != LinkStatus::Open {
                return Self::idle_outcome(current);
            }
        }
    }

    fn idle_outcome(status: LinkStatus) -> LinkResult<()> {
        match status {
            LinkStatus::Hangup => {
                log::info!("[Link] Control EOF, idle done");
                Ok(())
            }
            LinkStatus::Unsolicited(line) => Err(LinkError::UnexpectedData(line)),
            LinkStatus::Failed(reason) => Err(LinkError::Terminated(reason)),
            LinkStatus::Open | LinkStatus::Closed => Err(LinkError::Closed),
        }
    }

    /// Current status as last published by the dispatcher.
    ///
    /// Only changes when something new is observed: after an unsolicited
    /// line it reports [`LinkStatus::Unsolicited`] until the link ends, even
    /// though commands keep working.
    #[must_use]
    pub fn status(&self) -> LinkStatus {
        self.status.borrow().clone()
    }

    /// Local address of the connection with the port zeroed.
    ///
    /// This is the interface the receiver can dial back to, e.g. to fetch
    /// media from a local HTTP server.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        let mut addr = self.local_addr;
        addr.set_port(0);
        addr
    }

    /// Closes the request queue, waits for the dispatcher to exit and
    /// releases the socket.
    ///
    /// A command already in flight is finished first.
    pub async fn close(self) {
        let Self {
            requests,
            dispatcher,
            ..
        } = self;

        drop(requests);
        if let Err(e) = dispatcher.await {
            log::error!("[Link] Dispatcher task failed: {}", e);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Dispatcher
// ─────────────────────────────────────────────────────────────────────────────

/// Sole owner of the socket. Runs until the queue closes or the
/// connection becomes unusable.
struct Dispatcher<K> {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    requests: mpsc::Receiver<Request>,
    keepalive: K,
    status: watch::Sender<LinkStatus>,
    max_line_len: usize,
}

impl<K: KeepAliveSource> Dispatcher<K> {
    async fn run(mut self) {
        let final_status = loop {
            tokio::select! {
                _ = self.keepalive.tick() => {
                    match self.round_trip(&Command::noop()).await {
                        Ok(()) => {}
                        Err(e) if e.is_fatal() => {
                            log::warn!("[KeepAlive] No-op failed, connection lost: {}", e);
                            // The no-op's own error stays in the log.
                            break match e {
                                LinkError::NoStatusLine => LinkStatus::Hangup,
                                _ => LinkStatus::Failed(KEEPALIVE_LOST.to_string()),
                            };
                        }
                        Err(e) => log::debug!("[KeepAlive] No-op failed: {}", e),
                    }
                }
                request = self.requests.recv() => {
                    let Some(Request { command, reply }) = request else {
                        log::info!("[Link] Request queue closed; leaving dispatcher");
                        break LinkStatus::Closed;
                    };

                    let outcome = self.round_trip(&command).await;
                    let ending = match &outcome {
                        Err(e) if e.is_fatal() => Some(ending_status(e)),
                        _ => None,
                    };
                    // The caller may have stopped waiting.
                    let _ = reply.send(outcome);

                    if let Some(status) = ending {
                        log::warn!("[Link] Connection lost during {}: {:?}", command.target(), status);
                        break status;
                    }
                }
                readable = has_pending_data(&mut self.reader) => {
                    match readable {
                        Ok(false) => {
                            log::info!("[Link] Receiver closed the connection");
                            break LinkStatus::Hangup;
                        }
                        Ok(true) => match read_line(&mut self.reader, self.max_line_len).await {
                            Ok(Some(line)) => {
                                log::warn!("[Link] Unsolicited data from receiver: {:?}", line);
                                self.status.send_replace(LinkStatus::Unsolicited(line));
                            }
                            Ok(None) => break LinkStatus::Hangup,
                            Err(e) => break LinkStatus::Failed(e.to_string()),
                        },
                        Err(e) => break LinkStatus::Failed(LinkError::Read(e).to_string()),
                    }
                }
            }
        };

        self.status.send_replace(final_status);
        if let Err(e) = self.writer.shutdown().await {
            log::debug!("[Link] Socket shutdown: {}", e);
        }
    }

    /// Writes one command and reads its response.
    async fn round_trip(&mut self, command: &Command) -> LinkResult<()> {
        log::debug!(
            "[Link] Control request: {} (headers: {}, body: {} bytes)",
            command.target(),
            command.headers().len(),
            command.body_bytes().map_or(0, |b| b.len())
        );

        write_command(&mut self.writer, command).await?;
        read_response(
            &mut self.reader,
            command.expects_upgrade(),
            self.max_line_len,
        )
        .await
    }
}

/// Status a fatal round-trip error leaves the link in. End-of-stream before
/// a status line is the receiver hanging up, not a broken connection.
fn ending_status(err: &LinkError) -> LinkStatus {
    match err {
        LinkError::NoStatusLine => LinkStatus::Hangup,
        other => LinkStatus::Failed(other.to_string()),
    }
}

/// Resolves once the socket has buffered data (`true`) or reached
/// end-of-stream (`false`). Cancel-safe: nothing is consumed.
async fn has_pending_data<R>(reader: &mut R) -> io::Result<bool>
where
    R: AsyncBufRead + Unpin,
{
    Ok(!reader.fill_buf().await?.is_empty())
}
