use std::net::SocketAddr;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};

/// Line-oriented client for the bridge protocol, used by tools and tests.
pub struct BridgeClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    read_timeout: Duration,
}

impl BridgeClient {
    /// Connects with the configured retry budget.
    pub async fn connect(addr: SocketAddr, config: &BridgeConfig) -> BridgeResult<Self> {
        let mut attempt = 0;
        let stream = loop {
            attempt += 1;
            match TcpStream::connect(addr).await {
                Ok(stream) => break stream,
                Err(err) if attempt < config.max_retries => {
                    tracing::debug!(%addr, attempt, error = %err, "connect failed, retrying");
                    tokio::time::sleep(config.retry_delay()).await;
                }
                Err(err) => return Err(err.into()),
            }
        };
        let (read_half, writer) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(read_half),
            writer,
            read_timeout: config.connection_timeout(),
        })
    }

    /// Sends one raw line and parses the reply line.
    pub async fn send_line(&mut self, line: &str) -> BridgeResult<Value> {
        self.writer.write_all(line.trim_end().as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        let mut reply = String::new();
        let read = tokio::time::timeout(self.read_timeout, self.reader.read_line(&mut reply))
            .await
            .map_err(|_| {
                BridgeError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "no reply from bridge",
                ))
            })??;
        if read == 0 {
            return Err(BridgeError::Io(std::io::ErrorKind::UnexpectedEof.into()));
        }
        Ok(serde_json::from_str(reply.trim_end())?)
    }

    pub async fn request(&mut self, domain: &str, params: Value) -> BridgeResult<Value> {
        let line = serde_json::to_string(&json!({ "type": domain, "params": params }))?;
        self.send_line(&line).await
    }

    pub async fn ping(&mut self) -> BridgeResult<Value> {
        self.send_line(super::codec::PING).await
    }
}
