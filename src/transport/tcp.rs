//! SCPI over the DS1000Z-E LAN socket.
//!
//! The instrument exposes a raw SCPI socket (port 5555). Commands and responses are
//! newline terminated. Writes are confirmed locally; the instrument does not
//! acknowledge non-query commands.

use super::ScpiTransport;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;

/// Default raw SCPI port.
pub const DEFAULT_PORT: u16 = 5555;

/// Default response timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 2000;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Line-oriented SCPI client over TCP.
pub struct TcpTransport {
    stream: Mutex<BufReader<TcpStream>>,
    peer: String,
    timeout: Duration,
}

impl TcpTransport {
    /// Connect to `host:port`.
    pub async fn connect(host: &str, port: u16) -> Result<Self> {
        let peer = format!("{}:{}", host, port);

        let stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(&peer))
            .await
            .with_context(|| format!("Connection timeout to {}", peer))?
            .with_context(|| format!("Failed to connect to {}", peer))?;

        // Commands are tiny and latency matters more than throughput
        stream.set_nodelay(true)?;

        tracing::info!("Connected to oscilloscope at {}", peer);

        Ok(Self {
            stream: Mutex::new(BufReader::new(stream)),
            peer,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        })
    }

    /// Override the response timeout.
    pub fn with_timeout(mut self, duration: Duration) -> Self {
        self.timeout = duration;
        self
    }

    async fn write_line(stream: &mut BufReader<TcpStream>, line: &str) -> Result<()> {
        let framed = format!("{}\n", line);
        stream
            .get_mut()
            .write_all(framed.as_bytes())
            .await
            .with_context(|| format!("Failed to write: {}", line))?;
        stream
            .get_mut()
            .flush()
            .await
            .context("Failed to flush stream")
    }

    /// Discard a late reply left behind by a query that timed out.
    async fn flush_input_buffer(stream: &mut BufReader<TcpStream>) {
        let buffered = stream.buffer().len();
        if buffered > 0 {
            tracing::debug!("Flushing {} bytes from buffer", buffered);
            stream.consume(buffered);
        }

        let mut discard = [0u8; 256];
        loop {
            match timeout(Duration::from_millis(10), stream.get_mut().peek(&mut discard)).await {
                Ok(Ok(0)) | Ok(Err(_)) | Err(_) => break,
                Ok(Ok(n)) => {
                    let mut consume_buf = vec![0u8; n];
                    if stream.get_mut().try_read(&mut consume_buf).is_err() {
                        break;
                    }
                    tracing::debug!("Flushed {} stale bytes from stream", n);
                }
            }
        }
    }
}

#[async_trait]
impl ScpiTransport for TcpTransport {
    async fn send(&self, command: &str) -> Result<bool> {
        let mut stream = self.stream.lock().await;
        tracing::debug!("SCPI write: {:?}", command);

        timeout(self.timeout, Self::write_line(&mut stream, command))
            .await
            .with_context(|| format!("Timeout writing: {}", command))??;
        Ok(true)
    }

    async fn query(&self, command: &str) -> Result<Option<String>> {
        let mut stream = self.stream.lock().await;
        tracing::debug!("SCPI query: {:?}", command);

        Self::flush_input_buffer(&mut stream).await;
        Self::write_line(&mut stream, command).await?;

        let mut response = String::new();
        match timeout(self.timeout, stream.read_line(&mut response)).await {
            Ok(Ok(0)) => anyhow::bail!("Connection closed by {}", self.peer),
            Ok(Ok(_)) => {
                let trimmed = response.trim().to_string();
                tracing::debug!("SCPI response: {:?}", trimmed);
                Ok((!trimmed.is_empty()).then_some(trimmed))
            }
            Ok(Err(e)) => Err(e).context("Failed to read response"),
            Err(_) => anyhow::bail!("Timeout waiting for response to: {}", command),
        }
    }

    fn describe(&self) -> String {
        format!("tcp://{}", self.peer)
    }
}
