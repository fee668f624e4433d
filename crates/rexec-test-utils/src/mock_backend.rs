//! Scripted cluster backend.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use rexec_core::Result;
use rexec_core::backend::{ClusterBackend, ExecChannel, ExecSpec};
use rexec_core::cluster::{ClusterId, ComputeUnit, Replica, ReplicaPhase};
use rexec_core::error::Error;

use crate::mock_tunnel::MockTunnel;

/// Build a replica in the `default` namespace with container `main`.
pub fn replica(pod: &str, cluster: ClusterId, phase: ReplicaPhase) -> Replica {
    Replica {
        pod: pod.to_string(),
        container: "main".to_string(),
        namespace: "default".to_string(),
        cluster,
        phase,
    }
}

/// Build a compute unit in the `default` namespace.
pub fn unit(name: &str, replicas: Vec<Replica>) -> ComputeUnit {
    ComputeUnit {
        name: name.to_string(),
        namespace: "default".to_string(),
        replicas,
    }
}

/// A cluster backend driven by the test.
pub struct MockBackend {
    /// Cluster this backend answers for.
    cluster: ClusterId,
    /// Known compute units by name.
    units: HashMap<String, ComputeUnit>,
    /// Discovery fails with a connection error carrying this message.
    discovery_error: Option<String>,
    /// Delay before discovery answers.
    discovery_delay: Option<Duration>,
    /// Exec is rejected with a remote exec error carrying this message.
    exec_rejection: Option<String>,
    /// Delay before exec answers.
    exec_delay: Option<Duration>,
    /// Every exec request, in order.
    exec_calls: Mutex<Vec<(Replica, ExecSpec)>>,
    /// Remote ends of opened channels.
    tunnels_tx: mpsc::UnboundedSender<MockTunnel>,
    tunnels_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<MockTunnel>>,
}

impl MockBackend {
    pub fn new(cluster: ClusterId) -> Self {
        let (tunnels_tx, tunnels_rx) = mpsc::unbounded_channel();
        Self {
            cluster,
            units: HashMap::new(),
            discovery_error: None,
            discovery_delay: None,
            exec_rejection: None,
            exec_delay: None,
            exec_calls: Mutex::new(Vec::new()),
            tunnels_tx,
            tunnels_rx: tokio::sync::Mutex::new(tunnels_rx),
        }
    }

    /// Serve a compute unit.
    pub fn with_unit(mut self, unit: ComputeUnit) -> Self {
        self.units.insert(unit.name.clone(), unit);
        self
    }

    /// Make every discovery fail.
    pub fn failing_discovery(mut self, message: &str) -> Self {
        self.discovery_error = Some(message.to_string());
        self
    }

    pub fn with_discovery_delay(mut self, delay: Duration) -> Self {
        self.discovery_delay = Some(delay);
        self
    }

    /// Reject every exec request.
    pub fn rejecting_exec(mut self, message: &str) -> Self {
        self.exec_rejection = Some(message.to_string());
        self
    }

    pub fn with_exec_delay(mut self, delay: Duration) -> Self {
        self.exec_delay = Some(delay);
        self
    }

    /// Exec requests received so far.
    pub fn exec_calls(&self) -> Vec<(Replica, ExecSpec)> {
        self.exec_calls.lock().unwrap().clone()
    }

    /// Wait for the next opened channel.
    pub async fn next_tunnel(&self) -> Option<MockTunnel> {
        self.tunnels_rx.lock().await.recv().await
    }
}

#[async_trait]
impl ClusterBackend for MockBackend {
    fn cluster(&self) -> ClusterId {
        self.cluster
    }

    async fn discover(&self, unit: &str) -> Result<Option<ComputeUnit>> {
        if let Some(delay) = self.discovery_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.discovery_error {
            return Err(Error::Connection {
                message: message.clone(),
            });
        }
        Ok(self.units.get(unit).cloned())
    }

    async fn exec(&self, replica: &Replica, spec: &ExecSpec) -> Result<ExecChannel> {
        self.exec_calls
            .lock()
            .unwrap()
            .push((replica.clone(), spec.clone()));

        if let Some(delay) = self.exec_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.exec_rejection {
            return Err(Error::RemoteExec {
                message: message.clone(),
            });
        }

        let (channel, tunnel) = MockTunnel::pair(replica.clone(), spec.clone());
        let _ = self.tunnels_tx.send(tunnel);
        Ok(channel)
    }
}
