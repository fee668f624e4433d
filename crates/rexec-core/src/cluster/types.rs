//! Cluster and replica types.

use serde::{Deserialize, Serialize};

/// Backend cluster identifier.
///
/// A closed set: every configured backend is keyed by one of these, and the
/// declaration order is the stable iteration order used for tie-breaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClusterId {
    UsEast,
    UsWest,
    EuCentral,
    ApSouth,
}

impl ClusterId {
    /// Every cluster, in iteration order.
    pub const ALL: [ClusterId; 4] = [
        ClusterId::UsEast,
        ClusterId::UsWest,
        ClusterId::EuCentral,
        ClusterId::ApSouth,
    ];

    /// Configuration key for this cluster.
    pub fn as_str(self) -> &'static str {
        match self {
            ClusterId::UsEast => "us-east",
            ClusterId::UsWest => "us-west",
            ClusterId::EuCentral => "eu-central",
            ClusterId::ApSouth => "ap-south",
        }
    }
}

impl std::fmt::Display for ClusterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ClusterId {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| crate::Error::Config {
                message: format!("unknown cluster: {}", s),
            })
    }
}

/// Lifecycle phase reported for a replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ReplicaPhase {
    Pending,
    Running,
    Failed,
    #[default]
    #[serde(other)]
    Unknown,
}

/// One concrete instance of a compute unit on a specific cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Replica {
    /// Pod identifier (what replica filters match against).
    pub pod: String,
    /// Container to exec into.
    pub container: String,
    /// Namespace the pod lives in.
    pub namespace: String,
    /// Owning cluster.
    pub cluster: ClusterId,
    /// Reported phase.
    pub phase: ReplicaPhase,
}

impl Replica {
    /// Whether the replica can accept exec requests.
    pub fn is_running(&self) -> bool {
        self.phase == ReplicaPhase::Running
    }
}

/// A logical workload with zero or more replicas across clusters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeUnit {
    pub name: String,
    pub namespace: String,
    pub replicas: Vec<Replica>,
}

impl ComputeUnit {
    /// Running replicas in discovery order.
    pub fn running(&self) -> impl Iterator<Item = &Replica> {
        self.replicas.iter().filter(|r| r.is_running())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cluster_order_is_declaration_order() {
        let mut ids = vec![ClusterId::ApSouth, ClusterId::UsEast, ClusterId::EuCentral];
        ids.sort();
        assert_eq!(ids, vec![ClusterId::UsEast, ClusterId::EuCentral, ClusterId::ApSouth]);
    }

    #[test]
    fn cluster_id_parsing() {
        assert_eq!("us-west".parse::<ClusterId>().unwrap(), ClusterId::UsWest);
        assert!("mars-north".parse::<ClusterId>().is_err());
        for id in ClusterId::ALL {
            assert_eq!(id.to_string().parse::<ClusterId>().unwrap(), id);
        }
    }

    #[test]
    fn cluster_id_serde_matches_display() {
        let json = serde_json::to_string(&ClusterId::EuCentral).unwrap();
        assert_eq!(json, "\"eu-central\"");
    }

    #[test]
    fn unknown_phase_strings_deserialize_to_unknown() {
        let phase: ReplicaPhase = serde_json::from_str("\"Succeeded\"").unwrap();
        assert_eq!(phase, ReplicaPhase::Unknown);
        let phase: ReplicaPhase = serde_json::from_str("\"Running\"").unwrap();
        assert_eq!(phase, ReplicaPhase::Running);
    }

    #[test]
    fn running_filters_other_phases() {
        let replica = |pod: &str, phase| Replica {
            pod: pod.into(),
            container: "app".into(),
            namespace: "default".into(),
            cluster: ClusterId::UsEast,
            phase,
        };
        let unit = ComputeUnit {
            name: "web".into(),
            namespace: "default".into(),
            replicas: vec![
                replica("web-1", ReplicaPhase::Pending),
                replica("web-2", ReplicaPhase::Running),
                replica("web-3", ReplicaPhase::Failed),
                replica("web-4", ReplicaPhase::Unknown),
            ],
        };
        let running: Vec<_> = unit.running().map(|r| r.pod.as_str()).collect();
        assert_eq!(running, vec!["web-2"]);
    }
}
