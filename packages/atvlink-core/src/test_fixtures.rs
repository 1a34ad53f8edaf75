//! Test fixtures: an in-process receiver and a hand-driven keep-alive source.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::keepalive::KeepAliveSource;

/// One request as the mock receiver parsed it off the wire.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    /// First value of the named header, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// How the mock receiver answers a request.
pub enum Reply {
    /// Status line followed by an empty header block.
    Status(&'static str),
    /// Bytes written verbatim, terminators included.
    Raw(String),
    /// Close the connection without answering.
    Hangup,
}

/// Answers `/reverse` with 101 and everything else with 200.
pub fn handshake_then_ok(req: &RecordedRequest) -> Reply {
    match req.target.as_str() {
        "/reverse" => Reply::Status("HTTP/1.1 101 Switching Protocols"),
        _ => Reply::Status("HTTP/1.1 200 OK"),
    }
}

enum Control {
    Push(String),
    HangUp,
}

#[derive(Default)]
struct Shared {
    requests: Mutex<Vec<RecordedRequest>>,
    overlapped: AtomicBool,
    peer_closed: AtomicBool,
}

type Responder = Box<dyn Fn(&RecordedRequest) -> Reply + Send + Sync>;

/// A receiver on a loopback port that accepts one connection.
///
/// Requests are parsed strictly by their framing, so bytes from two requests
/// mixed together fail to parse and show up as a broken exchange.
pub struct MockDevice {
    addr: SocketAddr,
    shared: Arc<Shared>,
    control: mpsc::UnboundedSender<Control>,
    task: JoinHandle<()>,
}

impl MockDevice {
    pub async fn spawn<F>(responder: F) -> Self
    where
        F: Fn(&RecordedRequest) -> Reply + Send + Sync + 'static,
    {
        Self::spawn_with_delay(responder, Duration::ZERO).await
    }

    /// Waits `delay` before answering each request, then flags any bytes the
    /// client wrote in the meantime.
    pub async fn spawn_with_delay<F>(responder: F, delay: Duration) -> Self
    where
        F: Fn(&RecordedRequest) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock device");
        let addr = listener.local_addr().expect("mock device addr");
        let shared = Arc::new(Shared::default());
        let (control, control_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(serve(
            listener,
            Box::new(responder),
            delay,
            Arc::clone(&shared),
            control_rx,
        ));

        Self {
            addr,
            shared,
            control,
            task,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.shared.requests.lock().clone()
    }

    pub fn targets(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.target).collect()
    }

    /// True if the client wrote before the previous request was answered.
    pub fn overlapped(&self) -> bool {
        self.shared.overlapped.load(Ordering::SeqCst)
    }

    /// Polls until at least `count` requests were recorded.
    pub async fn wait_for_requests(&self, count: usize) -> Vec<RecordedRequest> {
        for _ in 0..500 {
            let requests = self.requests();
            if requests.len() >= count {
                return requests;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "expected {} requests, got {:?}",
            count,
            self.targets()
        );
    }

    /// Polls until the client side closed the connection.
    pub async fn wait_peer_closed(&self) -> bool {
        for _ in 0..500 {
            if self.shared.peer_closed.load(Ordering::SeqCst) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    /// Writes raw bytes to the client outside any request.
    pub fn push(&self, data: &str) {
        let _ = self.control.send(Control::Push(data.to_string()));
    }

    /// Closes the connection from the receiver side.
    pub fn hang_up(&self) {
        let _ = self.control.send(Control::HangUp);
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(
    listener: TcpListener,
    responder: Responder,
    delay: Duration,
    shared: Arc<Shared>,
    mut control: mpsc::UnboundedReceiver<Control>,
) {
    let Ok((stream, _)) = listener.accept().await else {
        return;
    };
    let mut conn = BufReader::new(stream);

    loop {
        tokio::select! {
            action = control.recv() => match action {
                Some(Control::Push(data)) => {
                    if conn.get_mut().write_all(data.as_bytes()).await.is_err() {
                        break;
                    }
                }
                Some(Control::HangUp) | None => break,
            },
            readable = async { conn.fill_buf().await.map(|b| !b.is_empty()) } => {
                if !matches!(readable, Ok(true)) {
                    shared.peer_closed.store(true, Ordering::SeqCst);
                    break;
                }

                let request = match read_request(&mut conn).await {
                    Ok(request) => request,
                    Err(_) => break,
                };

                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                    if written_since(&mut conn).await {
                        shared.overlapped.store(true, Ordering::SeqCst);
                    }
                }

                let reply = responder(&request);
                shared.requests.lock().push(request);

                match reply {
                    Reply::Status(line) => {
                        let wire = format!("{}\r\n\r\n", line);
                        if conn.get_mut().write_all(wire.as_bytes()).await.is_err() {
                            break;
                        }
                    }
                    Reply::Raw(wire) => {
                        if conn.get_mut().write_all(wire.as_bytes()).await.is_err() {
                            break;
                        }
                    }
                    Reply::Hangup => break,
                }
            }
        }
    }
}

/// True if the client has sent more bytes than the request just parsed.
async fn written_since(conn: &mut BufReader<TcpStream>) -> bool {
    if !conn.buffer().is_empty() {
        return true;
    }
    matches!(
        tokio::time::timeout(Duration::from_millis(1), conn.fill_buf()).await,
        Ok(Ok(buf)) if !buf.is_empty()
    )
}

async fn read_request(conn: &mut BufReader<TcpStream>) -> io::Result<RecordedRequest> {
    let mut request_line = String::new();
    if conn.read_line(&mut request_line).await? == 0 {
        return Err(io::ErrorKind::UnexpectedEof.into());
    }

    let mut parts = request_line.split_whitespace();
    let (Some("POST"), Some(target), Some("HTTP/1.1"), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("bad request line: {:?}", request_line),
        ));
    };
    let target = target.to_string();

    let mut headers = Vec::new();
    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        if conn.read_line(&mut line).await? == 0 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        let line = line.trim_end_matches(&['\r', '\n'][..]);
        if line.is_empty() {
            break;
        }
        let Some((name, value)) = line.split_once(": ") else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("bad header line: {:?}", line),
            ));
        };
        if name.eq_ignore_ascii_case("Content-Length") {
            content_length = value
                .parse()
                .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "bad Content-Length"))?;
        }
        headers.push((name.to_string(), value.to_string()));
    }

    let mut body = vec![0u8; content_length];
    conn.read_exact(&mut body).await?;

    Ok(RecordedRequest {
        target,
        headers,
        body,
    })
}

/// Keep-alive source that fires once per message sent on its channel.
pub struct ManualKeepAlive {
    ticks: mpsc::UnboundedReceiver<()>,
}

impl ManualKeepAlive {
    pub fn new() -> (mpsc::UnboundedSender<()>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { ticks: rx })
    }
}

#[async_trait]
impl KeepAliveSource for ManualKeepAlive {
    async fn tick(&mut self) {
        if self.ticks.recv().await.is_none() {
            std::future::pending::<()>().await;
        }
    }
}
