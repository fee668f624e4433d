//! In-memory host transport.

use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

use rexec_core::Result;
use rexec_core::protocol::{ControlFrame, Frame, FrameCodec};
use rexec_core::transport::{Dispatcher, HostConnection};

/// Host side of an in-memory host transport.
pub struct MockHost {
    /// Raw stream to the client connection.
    stream: DuplexStream,
    /// Bytes read but not yet decoded.
    buf: BytesMut,
}

/// Connect a [`HostConnection`] to an in-memory [`MockHost`].
pub fn host_transport_pair(dispatcher: Arc<Dispatcher>) -> (HostConnection, MockHost) {
    let (client, host) = tokio::io::duplex(64 * 1024);
    let conn = HostConnection::spawn(client, dispatcher);
    (
        conn,
        MockHost {
            stream: host,
            buf: BytesMut::new(),
        },
    )
}

impl MockHost {
    /// Send a frame to the client.
    pub async fn send(&mut self, frame: &Frame) -> Result<()> {
        let bytes = FrameCodec::encode(frame)?;
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Send a control frame to the client.
    pub async fn send_control(&mut self, control: ControlFrame) -> Result<()> {
        self.send(&Frame::control(&control)?).await
    }

    /// Send raw bytes, bypassing the codec.
    pub async fn send_raw(&mut self, data: &[u8]) -> Result<()> {
        self.stream.write_all(data).await?;
        Ok(())
    }

    /// Receive the next frame from the client. `None` on EOF.
    pub async fn recv(&mut self) -> Result<Option<Frame>> {
        loop {
            if let Some(frame) = FrameCodec::decode(&mut self.buf)? {
                return Ok(Some(frame));
            }
            if self.stream.read_buf(&mut self.buf).await? == 0 {
                return Ok(None);
            }
        }
    }

    /// Hang up.
    pub async fn shutdown(mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}
