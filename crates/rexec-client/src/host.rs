//! Host transport client.
//!
//! The host connection carries ordinary RPC traffic alongside session
//! control frames. Outside an intercepted session every inbound frame goes
//! to the [`RpcResponder`], which answers `ping` and logs everything else.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use rexec_core::error::Result;
use rexec_core::protocol::{Frame, FrameKind};
use rexec_core::transport::{Dispatcher, FrameHandler, FrameSender, HostConnection};

/// JSON body of a request frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub id: u64,
    pub method: String,
}

/// JSON body of a response frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub id: u64,
    pub result: String,
}

/// Default handler for RPC frames on the host connection.
pub struct RpcResponder {
    sender: FrameSender,
}

impl RpcResponder {
    pub fn new(sender: FrameSender) -> Self {
        Self { sender }
    }

    fn respond(&self, request: RpcRequest) {
        match request.method.as_str() {
            "ping" => {
                let response = RpcResponse {
                    id: request.id,
                    result: "pong".to_string(),
                };
                match serde_json::to_vec(&response) {
                    Ok(body) => {
                        if let Err(e) = self.sender.try_send(Frame::response(body)) {
                            warn!(error = %e, "Failed to queue ping response");
                        }
                    }
                    Err(e) => warn!(error = %e, "Failed to encode ping response"),
                }
            }
            method => debug!(id = request.id, method, "Ignoring RPC request"),
        }
    }
}

impl FrameHandler for RpcResponder {
    fn handle(&self, frame: &Frame) {
        match frame.kind() {
            FrameKind::Request => match serde_json::from_slice::<RpcRequest>(frame.payload()) {
                Ok(request) => self.respond(request),
                Err(e) => debug!(error = %e, "Unparseable RPC request"),
            },
            kind => debug!(?kind, len = frame.payload().len(), "Unhandled host frame"),
        }
    }
}

/// Connect to the host socket with the default RPC handler installed.
pub async fn connect_host(path: &Path) -> Result<HostConnection> {
    let dispatcher = Arc::new(Dispatcher::new());
    let conn = HostConnection::connect_unix(path, Arc::clone(&dispatcher)).await?;
    dispatcher.add_handler(Arc::new(RpcResponder::new(conn.sender())));
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rexec_test_utils::host_transport_pair;
    use tokio::net::UnixListener;

    fn ping(id: u64) -> Frame {
        Frame::request(serde_json::to_vec(&RpcRequest {
            id,
            method: "ping".to_string(),
        }).unwrap())
    }

    #[tokio::test]
    async fn ping_is_answered() {
        let dispatcher = Arc::new(Dispatcher::new());
        let (conn, mut host) = host_transport_pair(Arc::clone(&dispatcher));
        dispatcher.add_handler(Arc::new(RpcResponder::new(conn.sender())));

        host.send(&ping(7)).await.unwrap();
        let frame = host.recv().await.unwrap().unwrap();

        assert_eq!(frame.kind(), FrameKind::Response);
        let response: RpcResponse = serde_json::from_slice(frame.payload()).unwrap();
        assert_eq!(response, RpcResponse { id: 7, result: "pong".to_string() });
    }

    #[tokio::test]
    async fn unknown_methods_are_ignored() {
        let dispatcher = Arc::new(Dispatcher::new());
        let (conn, mut host) = host_transport_pair(Arc::clone(&dispatcher));
        dispatcher.add_handler(Arc::new(RpcResponder::new(conn.sender())));

        let other = Frame::request(&br#"{"id":1,"method":"status"}"#[..]);
        host.send(&other).await.unwrap();
        host.send(&ping(2)).await.unwrap();

        // Only the ping produces a response.
        let frame = host.recv().await.unwrap().unwrap();
        let response: RpcResponse = serde_json::from_slice(frame.payload()).unwrap();
        assert_eq!(response.id, 2);
    }

    #[tokio::test]
    async fn connects_over_unix_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("host.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let conn = connect_host(&path).await.unwrap();
        let (stream, _) = listener.accept().await.unwrap();
        assert!(!conn.is_closed());
        assert_eq!(conn.dispatcher().handler_count(), 1);

        drop(stream);
        tokio::time::timeout(std::time::Duration::from_secs(1), conn.closed().cancelled())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn missing_socket_is_connection_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = connect_host(&dir.path().join("absent.sock")).await.err().unwrap();
        assert!(matches!(err, rexec_core::Error::Connection { .. }));
    }
}
