//! Session configuration and the clusters inventory file.
//!
//! The inventory is a JSON object keyed by cluster id:
//!
//! ```json
//! {
//!   "us-east": {
//!     "units": [
//!       {
//!         "name": "web",
//!         "namespace": "prod",
//!         "replicas": [
//!           { "pod": "pod-a-1", "phase": "Running", "workdir": "/srv/web" }
//!         ]
//!       }
//!     ]
//!   }
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use rexec_core::backend::ClusterBackend;
use rexec_core::cluster::{ClusterId, ReplicaPhase};
use rexec_core::constants::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_DISCOVERY_TIMEOUT, OUTPUT_DRAIN_TIMEOUT, PUMP_BUFFER_SIZE,
};
use rexec_core::error::{Error, Result};

use crate::backend::LocalBackend;

/// Timeouts and buffer sizes for one session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Bound on tunnel establishment.
    pub connect_timeout: Duration,
    /// Bound on each per-cluster discovery query.
    pub discovery_timeout: Duration,
    /// How long output pumps may flush after the exit code resolves.
    pub drain_timeout: Duration,
    /// Byte pump buffer size.
    pub buffer_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
            drain_timeout: OUTPUT_DRAIN_TIMEOUT,
            buffer_size: PUMP_BUFFER_SIZE,
        }
    }
}

/// Inventory of one cluster.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClusterInventory {
    #[serde(default)]
    pub units: Vec<UnitConfig>,
}

/// A compute unit as configured.
#[derive(Debug, Clone, Deserialize)]
pub struct UnitConfig {
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub replicas: Vec<ReplicaConfig>,
}

/// A replica as configured.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplicaConfig {
    pub pod: String,
    #[serde(default = "default_container")]
    pub container: String,
    #[serde(default)]
    pub phase: ReplicaPhase,
    /// Working directory of processes started in this replica.
    #[serde(default)]
    pub workdir: Option<PathBuf>,
    /// Extra environment for processes started in this replica.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_container() -> String {
    "main".to_string()
}

/// Parsed clusters file.
#[derive(Debug, Clone, Default)]
pub struct ClustersConfig {
    pub clusters: BTreeMap<ClusterId, ClusterInventory>,
}

impl ClustersConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let clusters = serde_json::from_str(json).map_err(|e| Error::Config {
            message: format!("invalid clusters file: {}", e),
        })?;
        Ok(Self { clusters })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("cannot read {}: {}", path.display(), e),
        })?;
        let config = Self::from_json(&json)?;
        info!(
            path = %path.display(),
            clusters = config.clusters.len(),
            "Loaded clusters inventory"
        );
        Ok(config)
    }

    /// One local backend per configured cluster.
    pub fn backends(&self) -> BTreeMap<ClusterId, Arc<dyn ClusterBackend>> {
        self.clusters
            .iter()
            .map(|(id, inventory)| {
                debug!(cluster = %id, units = inventory.units.len(), "Configuring backend");
                let backend: Arc<dyn ClusterBackend> =
                    Arc::new(LocalBackend::new(*id, inventory.clone()));
                (*id, backend)
            })
            .collect()
    }
}
