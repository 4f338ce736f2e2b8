//! Newline-delimited JSON over TCP. Each connection owns its own read
//! buffer; a bad line gets an error reply and the connection stays up.

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::codec::is_ping;
use super::response::Response;
use super::router::Router;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};

#[derive(Debug, Clone, Copy)]
struct ConnectionLimits {
    max_line: usize,
    read_timeout: Duration,
}

pub struct BridgeServer {
    config: BridgeConfig,
    router: Arc<Router>,
}

/// A running listener. Dropping the handle also stops accepting.
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl BridgeServer {
    pub fn new(config: BridgeConfig, router: Arc<Router>) -> Self {
        Self { config, router }
    }

    /// Binds and starts accepting. A port that is already bound fails
    /// with `PortInUse` before any listener is created.
    pub async fn start(self) -> BridgeResult<ServerHandle> {
        let addr = self.config.socket_addr().ok_or_else(|| {
            BridgeError::malformed(format!("Invalid bind address '{}'.", self.config.bind_addr()))
        })?;
        probe_port(addr)?;
        let listener = TcpListener::bind(addr).await.map_err(|err| match err.kind() {
            ErrorKind::AddrInUse => BridgeError::PortInUse { port: addr.port() },
            _ => BridgeError::Io(err),
        })?;
        let local_addr = listener.local_addr()?;
        let limits = ConnectionLimits {
            max_line: self.config.buffer_size,
            read_timeout: self.config.connection_timeout(),
        };
        let (shutdown, stop_rx) = watch::channel(false);
        let task = tokio::spawn(accept_loop(listener, self.router, limits, stop_rx));
        tracing::info!(%local_addr, "bridge listening");
        Ok(ServerHandle {
            local_addr,
            shutdown,
            task,
        })
    }
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Closes the listener. Open connections finish on their own.
    pub fn stop(&self) {
        if !self.shutdown.send_replace(true) {
            tracing::info!(addr = %self.local_addr, "bridge stopping");
        }
    }

    pub fn is_stopped(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Resolves once the accept loop has exited.
    pub async fn stopped(self) {
        let ServerHandle { shutdown, task, .. } = self;
        let _ = task.await;
        drop(shutdown);
    }
}

fn probe_port(addr: SocketAddr) -> BridgeResult<()> {
    if addr.port() == 0 {
        return Ok(());
    }
    match std::net::TcpListener::bind(addr) {
        Ok(probe) => {
            drop(probe);
            Ok(())
        }
        Err(err) if err.kind() == ErrorKind::AddrInUse => {
            Err(BridgeError::PortInUse { port: addr.port() })
        }
        Err(err) => Err(err.into()),
    }
}

async fn accept_loop(
    listener: TcpListener,
    router: Arc<Router>,
    limits: ConnectionLimits,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tracing::debug!(%peer, "client connected");
                    let router = router.clone();
                    tokio::spawn(async move {
                        match serve_connection(stream, router, limits).await {
                            Ok(()) => tracing::debug!(%peer, "client disconnected"),
                            Err(err) => tracing::warn!(%peer, error = %err, "connection dropped"),
                        }
                    });
                }
                Err(err) => tracing::warn!(error = %err, "accept failed"),
            }
        }
    }
    tracing::info!("bridge listener closed");
}

async fn serve_connection(
    stream: TcpStream,
    router: Arc<Router>,
    limits: ConnectionLimits,
) -> BridgeResult<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    loop {
        let frame = match tokio::time::timeout(
            limits.read_timeout,
            read_frame(&mut reader, limits.max_line),
        )
        .await
        {
            Ok(frame) => frame?,
            Err(_) => {
                tracing::debug!("connection idle past timeout");
                return Ok(());
            }
        };
        let response = match frame {
            Frame::Eof => return Ok(()),
            Frame::Oversized => Response::from_error(&BridgeError::malformed(format!(
                "Message exceeds {} bytes.",
                limits.max_line
            ))),
            Frame::Line(bytes) => match String::from_utf8(bytes) {
                Err(_) => Response::from_error(&BridgeError::malformed(
                    "Message is not valid UTF-8.",
                )),
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) if is_ping(&line) => Response::pong(),
                Ok(line) => handle_guarded(&router, line).await,
            },
        };
        write_half.write_all(response.to_line().as_bytes()).await?;
    }
}

/// Runs the request on its own task so a panicking handler costs one
/// error reply, not the connection.
async fn handle_guarded(router: &Arc<Router>, line: String) -> Response {
    let router = router.clone();
    match tokio::spawn(async move { router.handle_line(&line).await }).await {
        Ok(response) => response,
        Err(err) => {
            tracing::error!(error = %err, "request handler panicked");
            Response::from_error(&BridgeError::collaborator("Request handler panicked."))
        }
    }
}

#[derive(Debug, PartialEq)]
enum Frame {
    Line(Vec<u8>),
    Oversized,
    Eof,
}

/// Reads one `\n`-terminated line of at most `max_line` bytes. An
/// oversized line is consumed in full and reported once. A trailing `\r`
/// is dropped; a final line without terminator still counts.
async fn read_frame<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    max_line: usize,
) -> std::io::Result<Frame> {
    let mut line = Vec::new();
    let mut oversized = false;
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(match (oversized, line.is_empty()) {
                (true, _) => Frame::Oversized,
                (false, true) => Frame::Eof,
                (false, false) => Frame::Line(strip_cr(line)),
            });
        }
        let newline = available.iter().position(|b| *b == b'\n');
        let chunk = &available[..newline.unwrap_or(available.len())];
        if !oversized {
            if line.len() + chunk.len() > max_line {
                oversized = true;
                line = Vec::new();
            } else {
                line.extend_from_slice(chunk);
            }
        }
        let used = chunk.len() + usize::from(newline.is_some());
        reader.consume(used);
        if newline.is_some() {
            return Ok(if oversized {
                Frame::Oversized
            } else {
                Frame::Line(strip_cr(line))
            });
        }
    }
}

fn strip_cr(mut line: Vec<u8>) -> Vec<u8> {
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_split_on_newlines_and_flag_oversized_lines() {
        let input: &[u8] = b"ping\r\n0123456789ABCDEF\nlast";
        let mut reader = BufReader::with_capacity(4, input);
        assert_eq!(read_frame(&mut reader, 8).await.unwrap(), Frame::Line(b"ping".to_vec()));
        assert_eq!(read_frame(&mut reader, 8).await.unwrap(), Frame::Oversized);
        assert_eq!(read_frame(&mut reader, 8).await.unwrap(), Frame::Line(b"last".to_vec()));
        assert_eq!(read_frame(&mut reader, 8).await.unwrap(), Frame::Eof);
    }
}
