//! Startup recovery of creation flows interrupted by a crash.

use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::platform::{Platform, PlatformError, Removal, ResourceKind, remove_owned};
use crate::registry::{FlowJournal, FlowOutcome, FlowRecord, RegistryError};

/// Clean up every journaled flow still in progress and not touched for
/// `stale_after`. Returns the number of flows marked abandoned.
///
/// Flows updated more recently may belong to a live request on another
/// replica and are left alone.
pub async fn recover_abandoned_flows(
    journal: &FlowJournal,
    platform: &dyn Platform,
    stale_after: Duration,
) -> Result<usize, RegistryError> {
    let flows = journal.active().await?;
    if flows.is_empty() {
        return Ok(0);
    }

    let threshold = Utc::now()
        - chrono::Duration::from_std(stale_after).unwrap_or_else(|_| chrono::Duration::zero());

    info!(count = flows.len(), "Found unfinished creation flows");

    let mut abandoned = 0;
    for mut flow in flows {
        if flow.updated_at > threshold {
            info!(flow_id = %flow.id, project_id = %flow.project_id, "Flow recently active, skipping");
            continue;
        }

        if let Err(e) = release_resources(platform, &flow).await {
            error!(
                flow_id = %flow.id,
                project_id = %flow.project_id,
                instance = %flow.instance,
                error = %e,
                "Failed to clean up abandoned flow"
            );
            continue;
        }

        journal
            .finish(
                &mut flow,
                FlowOutcome::Abandoned,
                Some("interrupted before completion".into()),
            )
            .await?;
        warn!(
            flow_id = %flow.id,
            project_id = %flow.project_id,
            instance = %flow.instance,
            step = ?flow.step,
            "Abandoned interrupted flow"
        );
        abandoned += 1;
    }

    Ok(abandoned)
}

/// Delete what the flow recorded, newest resource first. A recorded name
/// held by another project's object is skipped.
async fn release_resources(platform: &dyn Platform, flow: &FlowRecord) -> Result<(), PlatformError> {
    let resources = &flow.resources;
    let recorded = [
        (ResourceKind::Endpoint, &resources.endpoint),
        (ResourceKind::Compute, &resources.compute),
        (ResourceKind::Volume, &resources.volume),
    ];
    for (kind, name) in recorded {
        let Some(name) = name else {
            continue;
        };
        let removal = remove_owned(
            platform,
            kind,
            &flow.namespace,
            name,
            &flow.project_id,
            &flow.instance,
        )
        .await?;
        if removal == Removal::Foreign {
            warn!(flow_id = %flow.id, kind = ?kind, name = %name, "Recorded name belongs to another project, skipped");
        }
    }
    Ok(())
}
