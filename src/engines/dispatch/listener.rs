//! Request/reply channel between workers and the coordinator
//!
//! Every message is a 4-byte big-endian length followed by the payload. The
//! receiving side answers each message with [`ACK_TOKEN`] before looking at
//! its contents, so a worker knows delivery succeeded even when the payload
//! later turns out to be unusable.

use crate::error::{GridGaError, Result};
use crate::types::{ResultEnvelope, ACK_TOKEN};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Runtime;

/// Largest payload accepted in one message
pub const MAX_FRAME_LEN: usize = 1 << 20;

/// Time a connected peer gets to deliver its whole message
const FRAME_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Anything that can block for the next result payload.
pub trait MessageSource {
    /// Wait for one payload. `Ok(None)` means the deadline passed first.
    fn receive(&mut self, deadline: Instant) -> Result<Option<Vec<u8>>>;
}

pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> Result<()> {
    if payload.len() > MAX_FRAME_LEN {
        return Err(GridGaError::Protocol(format!(
            "Message of {} bytes exceeds the {} byte limit",
            payload.len(),
            MAX_FRAME_LEN
        )));
    }
    writer.write_all(&(payload.len() as u32).to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>> {
    let mut header = [0u8; 4];
    reader.read_exact(&mut header).await?;
    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_FRAME_LEN {
        return Err(GridGaError::Protocol(format!(
            "Announced message of {} bytes exceeds the {} byte limit",
            len, MAX_FRAME_LEN
        )));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

async fn receive_and_acknowledge(mut stream: TcpStream) -> Result<Vec<u8>> {
    let payload = read_frame(&mut stream).await?;
    stream.write_all(ACK_TOKEN).await?;
    stream.flush().await?;
    Ok(payload)
}

/// Coordinator end of the channel.
///
/// Owns a single-threaded runtime; callers stay synchronous and block in
/// [`MessageSource::receive`] until a message or the deadline arrives.
pub struct ResultListener {
    runtime: Runtime,
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl ResultListener {
    pub fn bind(address: &str) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let listener = runtime.block_on(TcpListener::bind(address)).map_err(|e| {
            GridGaError::Protocol(format!("Cannot listen for results on {}: {}", address, e))
        })?;
        let local_addr = listener.local_addr()?;
        log::info!("Listening for results on {}", local_addr);

        Ok(Self {
            runtime,
            listener,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl MessageSource for ResultListener {
    fn receive(&mut self, deadline: Instant) -> Result<Option<Vec<u8>>> {
        let deadline = tokio::time::Instant::from_std(deadline);
        let listener = &self.listener;

        self.runtime.block_on(async move {
            loop {
                let (stream, peer) = match tokio::time::timeout_at(deadline, listener.accept()).await {
                    Err(_) => return Ok(None),
                    Ok(Err(e)) => {
                        log::warn!("Failed to accept result connection: {}", e);
                        continue;
                    }
                    Ok(Ok(accepted)) => accepted,
                };

                let read_deadline = deadline.min(tokio::time::Instant::now() + FRAME_READ_TIMEOUT);
                match tokio::time::timeout_at(read_deadline, receive_and_acknowledge(stream)).await {
                    Ok(Ok(payload)) => {
                        log::debug!("Received {} bytes from {}", payload.len(), peer);
                        return Ok(Some(payload));
                    }
                    Ok(Err(e)) => log::warn!("Dropping message from {}: {}", peer, e),
                    Err(_) => log::warn!("Timed out reading message from {}", peer),
                }
            }
        })
    }
}

/// Worker end of the channel: delivers one result and waits for the
/// acknowledgement, retrying a fixed number of times.
#[derive(Debug, Clone)]
pub struct ResultSender {
    address: String,
    attempts: u32,
    retry_delay: Duration,
    reply_timeout: Duration,
}

impl ResultSender {
    pub const DEFAULT_ATTEMPTS: u32 = 10;
    pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(10);

    /// Accepts `host:port`, optionally prefixed with `tcp://`.
    pub fn new(address: &str) -> Self {
        let address = address.strip_prefix("tcp://").unwrap_or(address);
        Self {
            address: address.to_string(),
            attempts: Self::DEFAULT_ATTEMPTS,
            retry_delay: Self::DEFAULT_RETRY_DELAY,
            reply_timeout: Self::DEFAULT_RETRY_DELAY,
        }
    }

    pub fn with_retry(mut self, attempts: u32, retry_delay: Duration) -> Self {
        self.attempts = attempts.max(1);
        self.retry_delay = retry_delay;
        self
    }

    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn send(&self, envelope: &ResultEnvelope) -> Result<()> {
        let payload = serde_json::to_vec(envelope)?;
        self.send_payload(&payload)
    }

    pub fn send_payload(&self, payload: &[u8]) -> Result<()> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        for attempt in 1..=self.attempts {
            log::info!("Sending attempt {} to {}", attempt, self.address);
            let outcome = runtime.block_on(tokio::time::timeout(
                self.reply_timeout,
                exchange(&self.address, payload),
            ));
            match outcome {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(e)) => log::warn!("Attempt {} to {} failed: {}", attempt, self.address, e),
                Err(_) => log::warn!("No reply from {} on attempt {}", self.address, attempt),
            }
            if attempt < self.attempts {
                runtime.block_on(tokio::time::sleep(self.retry_delay));
            }
        }

        Err(GridGaError::Protocol(format!(
            "Could not deliver result to {} after {} attempts",
            self.address, self.attempts
        )))
    }
}

async fn exchange(address: &str, payload: &[u8]) -> Result<()> {
    let mut stream = TcpStream::connect(address).await?;
    write_frame(&mut stream, payload).await?;

    let mut reply = [0u8; 4];
    stream.read_exact(&mut reply).await?;
    if &reply != ACK_TOKEN {
        return Err(GridGaError::Protocol(format!(
            "Unexpected reply {:?}",
            String::from_utf8_lossy(&reply)
        )));
    }
    Ok(())
}
