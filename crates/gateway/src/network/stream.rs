//! One-directional byte stream to socket pump.

use futures::{Sink, SinkExt};
use protocol::Utf8Framer;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Bytes read from the source per chunk.
const CHUNK_SIZE: usize = 8192;

/// Errors that end a pump early.
#[derive(Debug, Error)]
pub enum StreamError {
    /// Reading the source failed.
    #[error("failed to read stream: {0}")]
    Read(#[from] std::io::Error),

    /// The sink stopped accepting frames.
    #[error("failed to send frame: {0}")]
    Sink(String),
}

/// Copies a byte stream into a sink of text frames.
///
/// Each chunk read from the source becomes one frame. A character split
/// across chunks is carried over to the next frame intact.
#[derive(Debug, Default)]
pub struct StreamAdapter {
    framer: Utf8Framer,
    frames: u64,
    bytes: u64,
}

impl StreamAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of frames sent so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Number of source bytes consumed so far.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Pumps `reader` into `sink` until the reader reaches end-of-stream.
    ///
    /// The sink is flushed but not closed.
    pub async fn pump<R, S>(&mut self, mut reader: R, sink: &mut S) -> Result<(), StreamError>
    where
        R: AsyncRead + Unpin,
        S: Sink<String> + Unpin,
        S::Error: std::fmt::Display,
    {
        let mut buffer = vec![0u8; CHUNK_SIZE];
        loop {
            let n = reader.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            self.bytes += n as u64;
            if let Some(text) = self.framer.push(&buffer[..n]) {
                self.send(sink, text).await?;
            }
        }

        if let Some(text) = self.framer.finish() {
            self.send(sink, text).await?;
        }
        sink.flush()
            .await
            .map_err(|e| StreamError::Sink(e.to_string()))
    }

    async fn send<S>(&mut self, sink: &mut S, text: String) -> Result<(), StreamError>
    where
        S: Sink<String> + Unpin,
        S::Error: std::fmt::Display,
    {
        sink.send(text)
            .await
            .map_err(|e| StreamError::Sink(e.to_string()))?;
        self.frames += 1;
        Ok(())
    }
}
