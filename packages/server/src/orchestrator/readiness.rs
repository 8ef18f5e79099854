use std::time::Duration;

use common::InstanceStatus;
use tracing::{debug, warn};

use crate::config::SnapshotConfig;
use crate::platform::Platform;

/// Bounds of the wait before a post-initialisation snapshot.
#[derive(Debug, Clone, Copy)]
pub struct ReadinessPolicy {
    pub settle_delay: Duration,
    pub poll_interval: Duration,
    pub max_attempts: u32,
}

impl From<&SnapshotConfig> for ReadinessPolicy {
    fn from(config: &SnapshotConfig) -> Self {
        Self {
            settle_delay: Duration::from_secs(config.settle_delay_secs),
            poll_interval: Duration::from_secs(config.readiness_poll_secs),
            max_attempts: config.readiness_max_attempts,
        }
    }
}

/// Wait for the settle delay, then poll the compute unit until it reports
/// ready. Returns `false` when the attempts run out or the unit fails.
pub async fn wait_until_ready(
    platform: &dyn Platform,
    namespace: &str,
    compute: &str,
    policy: ReadinessPolicy,
) -> bool {
    tokio::time::sleep(policy.settle_delay).await;

    for attempt in 1..=policy.max_attempts {
        match platform.get_compute(namespace, compute).await {
            Ok(unit) => {
                let status =
                    InstanceStatus::from_phase(unit.phase.as_deref(), unit.ready, unit.deleting);
                match status {
                    InstanceStatus::Running => return true,
                    InstanceStatus::Failed | InstanceStatus::Deleting => {
                        warn!(compute, %status, "Compute unit will not become ready");
                        return false;
                    }
                    InstanceStatus::Pending => debug!(compute, attempt, "Compute unit not ready yet"),
                }
            }
            Err(e) if e.is_not_found() => {
                warn!(compute, "Compute unit disappeared while waiting for readiness");
                return false;
            }
            Err(e) => debug!(compute, attempt, error = %e, "Readiness poll failed"),
        }
        if attempt < policy.max_attempts {
            tokio::time::sleep(policy.poll_interval).await;
        }
    }

    warn!(
        compute,
        attempts = policy.max_attempts,
        "Compute unit did not become ready in time"
    );
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{ComputeSpec, InMemoryPlatform, instance_labels};
    use common::EngineType;

    const QUICK: ReadinessPolicy = ReadinessPolicy {
        settle_delay: Duration::ZERO,
        poll_interval: Duration::from_millis(1),
        max_attempts: 3,
    };

    async fn platform_with_unit() -> InMemoryPlatform {
        let platform = InMemoryPlatform::new();
        platform
            .create_compute(&ComputeSpec {
                name: "acme-shop-db1".into(),
                namespace: "devdb".into(),
                engine: EngineType::Postgres,
                image: "postgres:16".into(),
                port: 5432,
                env: vec![],
                volume: "acme-shop-db1-data".into(),
                labels: instance_labels("acme-shop", "db1"),
                restore: None,
            })
            .await
            .unwrap();
        platform
    }

    #[tokio::test]
    async fn ready_unit_returns_immediately() {
        let platform = platform_with_unit().await;
        assert!(wait_until_ready(&platform, "devdb", "acme-shop-db1", QUICK).await);
        assert_eq!(platform.calls("get_compute"), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let platform = platform_with_unit().await;
        platform.set_compute_ready(false);
        assert!(!wait_until_ready(&platform, "devdb", "acme-shop-db1", QUICK).await);
        assert_eq!(platform.calls("get_compute"), 3);
    }

    #[tokio::test]
    async fn missing_unit_stops_polling() {
        let platform = InMemoryPlatform::new();
        assert!(!wait_until_ready(&platform, "devdb", "acme-shop-db1", QUICK).await);
        assert_eq!(platform.calls("get_compute"), 1);
    }
}
