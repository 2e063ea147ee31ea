// Line transport over TCP
//
// Every connection runs one task that reads newline-delimited lines and
// hands them to a `ConnectionHandler`, plus a writer task that drains an
// unbounded outbound queue. `send` and `close` never block; a close is
// queued behind any lines already sent, so a final error line still
// reaches the peer before the stream shuts down.
//
// Inbound bytes are decoded lossily. A line longer than `MAX_LINE_BYTES`
// is dropped up to its terminator and reading carries on.

use crate::chat::error::TransportError;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

const LINE_ENDINGS: &[char] = &['\n', '\r'];

/// Longest inbound line, terminator excluded, that is handed to a handler
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Identifies one connection for the life of the process
pub type ConnectionId = Uuid;

/// Callbacks invoked by a connection task.
///
/// Hooks for one connection run on that connection's task, but hooks of
/// different connections run concurrently.
pub trait ConnectionHandler: Send + Sync + 'static {
    /// The connection exists. Runs on the caller of `Connection::spawn`
    /// before the connection task starts, so before any line is read.
    fn on_connected(&self, _connection: &Connection) {}

    /// One line arrived, with its terminator stripped
    fn on_receive(&self, connection: &Connection, line: &str);

    /// The stream failed or the peer hung up without a local close
    fn on_transport_error(&self, connection: &Connection, error: &TransportError) {
        debug!(id = %connection.id(), %error, "transport error");
    }

    /// The connection task is about to end
    fn on_disconnected(&self, _connection: &Connection) {}
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Outbound {
    Line(String),
    Close,
}

/// Handle to one open connection. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    peer: Option<SocketAddr>,
    tx: mpsc::UnboundedSender<Outbound>,
    closing: CancellationToken,
    finished: CancellationToken,
}

impl Connection {
    fn new(peer: Option<SocketAddr>) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connection = Self {
            id: Uuid::new_v4(),
            peer,
            tx,
            closing: CancellationToken::new(),
            finished: CancellationToken::new(),
        };
        (connection, rx)
    }

    /// A connection with no socket behind it; the receiver sees what was sent
    #[cfg(test)]
    pub(crate) fn detached() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        Self::new(None)
    }

    /// Connect to `host:port` and start the connection task
    pub async fn open<H: ConnectionHandler>(
        host: &str,
        port: u16,
        handler: Arc<H>,
    ) -> Result<Self, TransportError> {
        let stream = TcpStream::connect((host, port))
            .await
            .map_err(|source| TransportError::Connect {
                host: host.to_string(),
                port,
                source,
            })?;

        info!("Connected to {}:{}", host, port);
        Ok(Self::spawn(stream, handler))
    }

    /// Start the connection task for an established stream.
    ///
    /// `on_connected` has returned by the time this does.
    pub fn spawn<H: ConnectionHandler>(stream: TcpStream, handler: Arc<H>) -> Self {
        let peer = stream.peer_addr().ok();
        let (connection, outgoing_rx) = Self::new(peer);
        let (read_half, write_half) = stream.into_split();

        handler.on_connected(&connection);

        let task_connection = connection.clone();
        tokio::spawn(async move {
            run_connection(task_connection, read_half, write_half, outgoing_rx, handler).await;
        });

        connection
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// False once either side closed the connection
    pub fn is_open(&self) -> bool {
        !self.closing.is_cancelled()
    }

    /// Queue one line for the peer
    pub fn send(&self, line: impl Into<String>) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::NotConnected);
        }

        self.tx
            .send(Outbound::Line(line.into()))
            .map_err(|_| TransportError::NotConnected)
    }

    /// Close the connection after any queued lines are written
    pub fn close(&self) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::NotConnected);
        }

        self.closing.cancel();
        self.tx
            .send(Outbound::Close)
            .map_err(|_| TransportError::NotConnected)
    }

    /// Resolves once the connection task has run `on_disconnected`
    pub async fn finished(&self) {
        self.finished.cancelled().await;
    }
}

async fn run_connection<H: ConnectionHandler>(
    connection: Connection,
    read_half: OwnedReadHalf,
    write_half: OwnedWriteHalf,
    outgoing_rx: mpsc::UnboundedReceiver<Outbound>,
    handler: Arc<H>,
) {
    let writer = tokio::spawn(write_lines(write_half, outgoing_rx));
    let read_failure = read_lines(&connection, read_half, handler.as_ref()).await;

    connection.closing.cancel();
    let _ = connection.tx.send(Outbound::Close);

    let write_failure = match writer.await {
        Ok(result) => result.err(),
        Err(e) => {
            warn!(id = %connection.id, "writer task failed: {}", e);
            None
        }
    };

    if let Some(error) = read_failure.or(write_failure) {
        handler.on_transport_error(&connection, &error);
    }

    handler.on_disconnected(&connection);
    connection.finished.cancel();
    debug!(id = %connection.id, "connection task finished");
}

/// Read lines until the connection is closed locally (`None`) or the
/// stream ends or fails (`Some`).
async fn read_lines<H: ConnectionHandler>(
    connection: &Connection,
    read_half: OwnedReadHalf,
    handler: &H,
) -> Option<TransportError> {
    let mut reader = BufReader::new(read_half);
    let mut buf = Vec::new();
    // Inside an oversized line, waiting for its terminator
    let mut discarding = false;

    loop {
        buf.clear();
        let limit = (MAX_LINE_BYTES + 1) as u64;
        let mut limited = (&mut reader).take(limit);

        tokio::select! {
            biased;
            _ = connection.closing.cancelled() => return None,
            read = limited.read_until(b'\n', &mut buf) => match read {
                Ok(0) => return Some(TransportError::PeerClosed),
                Ok(_) => {
                    let terminated = buf.ends_with(b"\n");
                    if discarding {
                        discarding = !terminated;
                        continue;
                    }
                    if !terminated && buf.len() > MAX_LINE_BYTES {
                        warn!(id = %connection.id, "dropping line longer than {} bytes", MAX_LINE_BYTES);
                        discarding = true;
                        continue;
                    }

                    let line = String::from_utf8_lossy(&buf);
                    let text = line.trim_end_matches(LINE_ENDINGS);
                    debug!(id = %connection.id, "received {:?}", text);
                    handler.on_receive(connection, text);
                }
                Err(e) => return Some(TransportError::Io(e)),
            }
        }
    }
}

async fn write_lines(
    mut writer: OwnedWriteHalf,
    mut outgoing_rx: mpsc::UnboundedReceiver<Outbound>,
) -> Result<(), TransportError> {
    while let Some(message) = outgoing_rx.recv().await {
        match message {
            Outbound::Line(line) => {
                let mut bytes = line.into_bytes();
                bytes.push(b'\n');
                writer.write_all(&bytes).await?;
            }
            Outbound::Close => break,
        }
    }

    // The peer may already be gone
    if let Err(e) = writer.shutdown().await {
        debug!("shutdown after close failed: {}", e);
    }

    Ok(())
}

/// A bound TCP listener accepting connections on its own task
pub struct Listener {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl Listener {
    /// Bind `host:port` and start accepting
    pub async fn bind<H: ConnectionHandler>(
        host: &str,
        port: u16,
        handler: Arc<H>,
    ) -> Result<Self, TransportError> {
        let listener = TcpListener::bind((host, port))
            .await
            .map_err(|source| TransportError::Bind {
                host: host.to_string(),
                port,
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(accept_loop(listener, handler, shutdown.clone()));

        info!("Server listening for connections on {}", local_addr);

        Ok(Self {
            local_addr,
            shutdown,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting. Connections already accepted stay open, and every
    /// one of them has been through `on_connected` once this returns.
    pub async fn stop(self) {
        self.shutdown.cancel();
        if let Err(e) = self.task.await {
            warn!("accept task failed: {}", e);
        }
        info!("Server has stopped listening for connections on {}", self.local_addr);
    }
}

async fn accept_loop<H: ConnectionHandler>(
    listener: TcpListener,
    handler: Arc<H>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        debug!("Accepted connection from {}", addr);
                        Connection::spawn(stream, handler.clone());
                    }
                    Err(e) => {
                        warn!("Accept error: {}", e);
                    }
                }
            }
        }
    }
}
