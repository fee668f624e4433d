//! Framed host connection.
//!
//! A reader task decodes inbound frames and hands them to the [`Dispatcher`];
//! a writer task drains a bounded queue of outbound frames. The connection's
//! `closed` token fires once the reader stops, whether from EOF, a decode
//! failure or an explicit [`HostConnection::close`].

use std::path::Path;
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::constants::OUTBOUND_QUEUE_DEPTH;
use crate::error::{Error, Result};
use crate::protocol::{Frame, FrameCodec};

use super::dispatch::Dispatcher;

/// Cloneable handle for queueing outbound frames.
#[derive(Clone)]
pub struct FrameSender {
    tx: mpsc::Sender<Frame>,
}

impl FrameSender {
    /// Queue a frame, waiting for room.
    pub async fn send(&self, frame: Frame) -> Result<()> {
        self.tx.send(frame).await.map_err(|_| Error::Connection {
            message: "host connection closed".to_string(),
        })
    }

    /// Queue a frame without waiting. Used from synchronous frame handlers.
    pub fn try_send(&self, frame: Frame) -> Result<()> {
        self.tx.try_send(frame).map_err(|e| Error::Connection {
            message: format!("outbound queue: {e}"),
        })
    }
}

/// A framed connection to the host.
pub struct HostConnection {
    dispatcher: Arc<Dispatcher>,
    sender: FrameSender,
    closed: CancellationToken,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl HostConnection {
    /// Connect to the host over a Unix domain socket.
    pub async fn connect_unix(path: &Path, dispatcher: Arc<Dispatcher>) -> Result<Self> {
        let stream = tokio::net::UnixStream::connect(path)
            .await
            .map_err(|e| Error::Connection {
                message: format!("{}: {e}", path.display()),
            })?;
        info!(path = %path.display(), "Connected to host transport");
        Ok(Self::spawn(stream, dispatcher))
    }

    /// Start reader and writer tasks over an established byte stream.
    pub fn spawn<S>(io: S, dispatcher: Arc<Dispatcher>) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(io);
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);
        let closed = CancellationToken::new();

        let reader = tokio::spawn(read_loop(read_half, Arc::clone(&dispatcher), closed.clone()));
        let writer = tokio::spawn(write_loop(write_half, rx, closed.clone()));

        Self {
            dispatcher,
            sender: FrameSender { tx },
            closed,
            reader,
            writer,
        }
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        Arc::clone(&self.dispatcher)
    }

    pub fn sender(&self) -> FrameSender {
        self.sender.clone()
    }

    /// Token cancelled when the connection goes away.
    pub fn closed(&self) -> CancellationToken {
        self.closed.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Stop both tasks.
    pub fn close(&self) {
        self.closed.cancel();
        self.reader.abort();
        self.writer.abort();
    }
}

impl Drop for HostConnection {
    fn drop(&mut self) {
        self.close();
    }
}

async fn read_loop<R>(mut reader: R, dispatcher: Arc<Dispatcher>, closed: CancellationToken)
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(8 * 1024);
    loop {
        loop {
            match FrameCodec::decode(&mut buf) {
                Ok(Some(frame)) => dispatcher.dispatch(frame),
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Host stream corrupt, closing");
                    closed.cancel();
                    return;
                }
            }
        }

        let read = tokio::select! {
            _ = closed.cancelled() => break,
            read = reader.read_buf(&mut buf) => read,
        };
        match read {
            Ok(0) => {
                debug!("Host transport EOF");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "Host transport read failed");
                break;
            }
        }
    }
    closed.cancel();
}

async fn write_loop<W>(mut writer: W, mut rx: mpsc::Receiver<Frame>, closed: CancellationToken)
where
    W: AsyncWrite + Unpin,
{
    loop {
        let frame = tokio::select! {
            _ = closed.cancelled() => break,
            frame = rx.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        let bytes = match FrameCodec::encode(&frame) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "Dropping unencodable outbound frame");
                continue;
            }
        };
        if let Err(e) = writer.write_all(&bytes).await {
            warn!(error = %e, "Host transport write failed");
            break;
        }
        if let Err(e) = writer.flush().await {
            warn!(error = %e, "Host transport flush failed");
            break;
        }
    }
    let _ = writer.shutdown().await;
}
