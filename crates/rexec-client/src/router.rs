//! Cluster router and replica selector.
//!
//! Discovery fans out to every configured cluster at once and tolerates
//! failure: a cluster that errors or times out is logged and left out. An
//! empty union is `NotFound`, even when every cluster failed.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use rexec_core::backend::ClusterBackend;
use rexec_core::cluster::{ClusterId, Replica};
use rexec_core::error::{Error, Result};

/// Routes discovery and exec requests to backend clusters.
pub struct ClusterRouter {
    backends: BTreeMap<ClusterId, Arc<dyn ClusterBackend>>,
    discovery_timeout: Duration,
}

impl ClusterRouter {
    /// Build a router. Every key must match its backend's cluster.
    pub fn new(
        backends: BTreeMap<ClusterId, Arc<dyn ClusterBackend>>,
        discovery_timeout: Duration,
    ) -> Result<Self> {
        if backends.is_empty() {
            return Err(Error::Config {
                message: "no clusters configured".to_string(),
            });
        }
        if let Some((id, backend)) = backends.iter().find(|(id, b)| b.cluster() != **id) {
            return Err(Error::Config {
                message: format!("backend for {} serves {}", id, backend.cluster()),
            });
        }
        Ok(Self {
            backends,
            discovery_timeout,
        })
    }

    /// Configured clusters, in iteration order.
    pub fn clusters(&self) -> impl Iterator<Item = ClusterId> + '_ {
        self.backends.keys().copied()
    }

    /// Backend owning a replica.
    pub fn backend_for(&self, replica: &Replica) -> Result<Arc<dyn ClusterBackend>> {
        self.backends
            .get(&replica.cluster)
            .cloned()
            .ok_or_else(|| Error::Config {
                message: format!("cluster {} is not configured", replica.cluster),
            })
    }

    /// Running replicas of `unit` across all clusters, in cluster order.
    pub async fn discover(&self, unit: &str, cancel: &CancellationToken) -> Result<Vec<Replica>> {
        let queries = self.backends.iter().map(|(id, backend)| async move {
            let result = match tokio::time::timeout(self.discovery_timeout, backend.discover(unit)).await {
                Ok(result) => result,
                Err(_) => Err(Error::Connection {
                    message: format!(
                        "{}: discovery timed out after {:?}",
                        id, self.discovery_timeout
                    ),
                }),
            };
            (*id, result)
        });

        let results = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(unit, "Discovery cancelled");
                return Err(Error::Aborted);
            }
            results = join_all(queries) => results,
        };

        let mut replicas = Vec::new();
        let mut answered = 0usize;
        let mut failed = 0usize;
        for (id, result) in results {
            match result {
                Ok(Some(found)) => {
                    answered += 1;
                    let running: Vec<_> = found.replicas.into_iter().filter(Replica::is_running).collect();
                    debug!(cluster = %id, unit, running = running.len(), "Cluster answered");
                    replicas.extend(running);
                }
                Ok(None) => {
                    answered += 1;
                    debug!(cluster = %id, unit, "Unit unknown to cluster");
                }
                Err(e) => {
                    warn!(cluster = %id, unit, error = %e, "Discovery failed");
                    failed += 1;
                }
            }
        }

        if replicas.is_empty() {
            if answered == 0 {
                warn!(unit, failed, "No cluster answered discovery");
            }
            return Err(Error::not_found(format!(
                "no running replica of compute unit '{}'",
                unit
            )));
        }

        info!(unit, replicas = replicas.len(), clusters = answered, "Discovery complete");
        Ok(replicas)
    }

    /// Discover and select in one step.
    pub async fn resolve(
        &self,
        unit: &str,
        filter: Option<&[String]>,
        cancel: &CancellationToken,
    ) -> Result<Replica> {
        let replicas = self.discover(unit, cancel).await?;
        select(replicas, filter)
    }
}

/// Apply a replica filter, keeping discovery order.
///
/// Without a filter every replica is a candidate.
pub fn candidates(replicas: Vec<Replica>, filter: Option<&[String]>) -> Result<Vec<Replica>> {
    let Some(filter) = filter else {
        return Ok(replicas);
    };
    let matched: Vec<_> = replicas
        .into_iter()
        .filter(|r| filter.iter().any(|pod| *pod == r.pod))
        .collect();
    if matched.is_empty() {
        return Err(Error::not_found(format!(
            "no running replica matches {}",
            filter.join(", ")
        )));
    }
    Ok(matched)
}

/// Pick the replica to attach to: the first candidate.
pub fn select(replicas: Vec<Replica>, filter: Option<&[String]>) -> Result<Replica> {
    let replica = candidates(replicas, filter)?
        .into_iter()
        .next()
        .ok_or_else(|| Error::not_found("no running replica"))?;
    info!(pod = %replica.pod, cluster = %replica.cluster, "Selected replica");
    Ok(replica)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rexec_core::cluster::ReplicaPhase::{Pending, Running};
    use rexec_test_utils::{MockBackend, replica, unit};

    fn router(backends: Vec<MockBackend>) -> ClusterRouter {
        let map = backends
            .into_iter()
            .map(|b| (b.cluster(), Arc::new(b) as Arc<dyn ClusterBackend>))
            .collect();
        ClusterRouter::new(map, Duration::from_millis(200)).unwrap()
    }

    fn pods(replicas: &[Replica]) -> Vec<&str> {
        replicas.iter().map(|r| r.pod.as_str()).collect()
    }

    #[test]
    fn empty_router_is_rejected() {
        let err = ClusterRouter::new(BTreeMap::new(), Duration::from_secs(1)).err().unwrap();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn mismatched_key_is_rejected() {
        let mut map: BTreeMap<ClusterId, Arc<dyn ClusterBackend>> = BTreeMap::new();
        map.insert(ClusterId::UsEast, Arc::new(MockBackend::new(ClusterId::UsWest)));
        assert!(ClusterRouter::new(map, Duration::from_secs(1)).is_err());
    }

    #[tokio::test]
    async fn discovery_is_union_of_running_in_cluster_order() {
        let router = router(vec![
            MockBackend::new(ClusterId::EuCentral).with_unit(unit(
                "web",
                vec![replica("pod-c-1", ClusterId::EuCentral, Running)],
            )),
            MockBackend::new(ClusterId::UsEast).with_unit(unit(
                "web",
                vec![
                    replica("pod-a-1", ClusterId::UsEast, Running),
                    replica("pod-a-2", ClusterId::UsEast, Pending),
                ],
            )),
        ]);

        let found = router.discover("web", &CancellationToken::new()).await.unwrap();
        assert_eq!(pods(&found), vec!["pod-a-1", "pod-c-1"]);
    }

    #[tokio::test]
    async fn no_running_replica_is_not_found() {
        let router = router(vec![MockBackend::new(ClusterId::UsEast).with_unit(unit(
            "worker",
            vec![replica("pod-w-1", ClusterId::UsEast, Pending)],
        ))]);

        let err = router.discover("worker", &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn partial_failure_is_tolerated() {
        let router = router(vec![
            MockBackend::new(ClusterId::UsEast).failing_discovery("connection refused"),
            MockBackend::new(ClusterId::UsWest)
                .with_unit(unit("web", vec![replica("pod-b-1", ClusterId::UsWest, Running)])),
        ]);

        let found = router.discover("web", &CancellationToken::new()).await.unwrap();
        assert_eq!(pods(&found), vec!["pod-b-1"]);
    }

    #[tokio::test]
    async fn total_failure_is_not_found() {
        let router = router(vec![
            MockBackend::new(ClusterId::UsEast).failing_discovery("refused"),
            MockBackend::new(ClusterId::UsWest).failing_discovery("reset"),
        ]);

        let err = router.discover("web", &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn slow_cluster_times_out_without_failing_discovery() {
        let router = router(vec![
            MockBackend::new(ClusterId::UsEast)
                .with_discovery_delay(Duration::from_secs(5))
                .with_unit(unit("web", vec![replica("pod-a-1", ClusterId::UsEast, Running)])),
            MockBackend::new(ClusterId::UsWest)
                .with_unit(unit("web", vec![replica("pod-b-1", ClusterId::UsWest, Running)])),
        ]);

        let found = router.discover("web", &CancellationToken::new()).await.unwrap();
        assert_eq!(pods(&found), vec!["pod-b-1"]);
    }

    #[tokio::test]
    async fn cancellation_aborts_discovery() {
        let router = router(vec![
            MockBackend::new(ClusterId::UsEast).with_discovery_delay(Duration::from_secs(5)),
        ]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = router.discover("web", &cancel).await.unwrap_err();
        assert!(matches!(err, Error::Aborted));
    }

    #[test]
    fn filter_intersection_keeps_discovery_order() {
        let discovered = vec![
            replica("pod-a-1", ClusterId::UsEast, Running),
            replica("pod-b-1", ClusterId::UsWest, Running),
            replica("pod-c-1", ClusterId::EuCentral, Running),
        ];
        let filter = vec!["pod-c-1".to_string(), "pod-a-1".to_string(), "pod-z-9".to_string()];

        let matched = candidates(discovered.clone(), Some(&filter)).unwrap();
        assert_eq!(pods(&matched), vec!["pod-a-1", "pod-c-1"]);

        let chosen = select(discovered, Some(&["pod-b-1".to_string()])).unwrap();
        assert_eq!(chosen.pod, "pod-b-1");
        assert_eq!(chosen.cluster, ClusterId::UsWest);
    }

    #[test]
    fn empty_intersection_is_not_found() {
        let discovered = vec![replica("pod-a-1", ClusterId::UsEast, Running)];
        let err = select(discovered, Some(&["pod-x".to_string()])).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn no_filter_picks_first() {
        let discovered = vec![
            replica("pod-a-1", ClusterId::UsEast, Running),
            replica("pod-b-1", ClusterId::UsWest, Running),
        ];
        assert_eq!(select(discovered, None).unwrap().pod, "pod-a-1");
    }
}
