//! Rollout status classification
//!
//! Derives a [`DeployStatus`] from a live Deployment's conditions and
//! replica counts. Nothing is stored; every query re-reads the cluster.

use deckhand_common::kube_utils::{find_condition, HasConditionFields, STATUS_FALSE, STATUS_TRUE};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentCondition};
use serde::{Deserialize, Serialize};

/// Condition type set when pods cannot be created
pub const REPLICA_FAILURE: &str = "ReplicaFailure";

/// Condition type tracking rollout progress
pub const PROGRESSING: &str = "Progressing";

/// Reason on a false Progressing condition once the deadline has passed
pub const PROGRESS_DEADLINE_EXCEEDED: &str = "ProgressDeadlineExceeded";

/// Rollout verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeployStatus {
    /// All replicas run the new template and are available
    Success,
    /// The rollout has not converged yet
    InProgress,
    /// The rollout cannot complete without intervention
    Failed,
}

impl DeployStatus {
    /// Name as reported in the status view
    pub fn as_str(&self) -> &'static str {
        match self {
            DeployStatus::Success => "Success",
            DeployStatus::InProgress => "InProgress",
            DeployStatus::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for DeployStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serializable snapshot of a Deployment's rollout
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusView {
    /// Deployment name
    pub name: String,
    /// Desired replicas
    pub desired: i32,
    /// Replicas currently running, old and new
    pub current: i32,
    /// Replicas running the latest template
    pub up_to_date: i32,
    /// Replicas ready for at least minReadySeconds
    pub available: i32,
    /// Container names of the pod template
    pub containers: Vec<String>,
    /// Container images of the pod template
    pub images: Vec<String>,
    /// Verdict as text
    pub status: String,
    /// Why the verdict was reached
    pub reason: String,
}

fn failed_condition(conditions: Option<&[DeploymentCondition]>) -> Option<String> {
    if let Some(c) = find_condition(conditions, REPLICA_FAILURE) {
        if c.status_field() == STATUS_TRUE {
            return Some(
                c.message
                    .clone()
                    .or_else(|| c.reason.clone())
                    .unwrap_or_else(|| REPLICA_FAILURE.to_string()),
            );
        }
    }

    find_condition(conditions, PROGRESSING)
        .filter(|c| {
            c.status_field() == STATUS_FALSE
                && c.reason_field() == Some(PROGRESS_DEADLINE_EXCEEDED)
        })
        .map(|c| {
            c.message
                .clone()
                .unwrap_or_else(|| PROGRESS_DEADLINE_EXCEEDED.to_string())
        })
}

/// Classify a Deployment and explain the verdict
pub fn classify(deployment: &Deployment) -> (DeployStatus, String) {
    let status = deployment.status.clone().unwrap_or_default();

    if let Some(reason) = failed_condition(status.conditions.as_deref()) {
        return (DeployStatus::Failed, reason);
    }

    if let (Some(generation), Some(observed)) =
        (deployment.metadata.generation, status.observed_generation)
    {
        if observed < generation {
            return (
                DeployStatus::InProgress,
                "Waiting for deployment spec update to be observed".to_string(),
            );
        }
    }

    let desired = deployment
        .spec
        .as_ref()
        .and_then(|s| s.replicas)
        .unwrap_or(1);
    let updated = status.updated_replicas.unwrap_or(0);
    let total = status.replicas.unwrap_or(0);
    let available = status.available_replicas.unwrap_or(0);

    if updated < desired {
        return (
            DeployStatus::InProgress,
            format!(
                "{} out of {} new replicas have been updated",
                updated, desired
            ),
        );
    }
    if total > updated {
        return (
            DeployStatus::InProgress,
            format!(
                "{} old replicas are pending termination",
                total - updated
            ),
        );
    }
    if available < updated {
        return (
            DeployStatus::InProgress,
            format!(
                "{} of {} updated replicas are available",
                available, updated
            ),
        );
    }

    (
        DeployStatus::Success,
        "Deployment completed successfully".to_string(),
    )
}

/// Classify a Deployment and build its status view
pub fn status_view(deployment: &Deployment) -> (DeployStatus, StatusView) {
    let (verdict, reason) = classify(deployment);
    let status = deployment.status.clone().unwrap_or_default();
    let containers = deployment
        .spec
        .as_ref()
        .and_then(|s| s.template.spec.as_ref())
        .map(|p| p.containers.as_slice())
        .unwrap_or_default();

    let view = StatusView {
        name: deployment.metadata.name.clone().unwrap_or_default(),
        desired: deployment
            .spec
            .as_ref()
            .and_then(|s| s.replicas)
            .unwrap_or(1),
        current: status.replicas.unwrap_or(0),
        up_to_date: status.updated_replicas.unwrap_or(0),
        available: status.available_replicas.unwrap_or(0),
        containers: containers.iter().map(|c| c.name.clone()).collect(),
        images: containers.iter().filter_map(|c| c.image.clone()).collect(),
        status: verdict.to_string(),
        reason,
    };

    (verdict, view)
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::{DeploymentSpec, DeploymentStatus};
    use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn deployment(desired: i32, total: i32, updated: i32, available: i32) -> Deployment {
        Deployment {
            metadata: ObjectMeta {
                name: Some("appname".to_string()),
                namespace: Some("namespace".to_string()),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                replicas: Some(desired),
                template: PodTemplateSpec {
                    spec: Some(PodSpec {
                        containers: vec![Container {
                            name: "appname".to_string(),
                            image: Some("docker.hub/app:13".to_string()),
                            ..Default::default()
                        }],
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                ..Default::default()
            }),
            status: Some(DeploymentStatus {
                replicas: Some(total),
                updated_replicas: Some(updated),
                available_replicas: Some(available),
                ..Default::default()
            }),
        }
    }

    fn with_condition(
        mut deployment: Deployment,
        type_: &str,
        status: &str,
        reason: &str,
    ) -> Deployment {
        if let Some(s) = deployment.status.as_mut() {
            s.conditions = Some(vec![DeploymentCondition {
                type_: type_.to_string(),
                status: status.to_string(),
                reason: Some(reason.to_string()),
                ..Default::default()
            }]);
        }
        deployment
    }

    #[test]
    fn test_converged_rollout_is_success() {
        assert_eq!(classify(&deployment(2, 2, 2, 2)).0, DeployStatus::Success);
    }

    /// Story: a rollout is in progress until every count reaches the desired one
    #[test]
    fn story_unconverged_counts_are_in_progress() {
        // updated < desired
        assert_eq!(classify(&deployment(3, 3, 1, 1)).0, DeployStatus::InProgress);
        // old replicas still around
        assert_eq!(classify(&deployment(2, 3, 2, 2)).0, DeployStatus::InProgress);
        // new replicas not yet available
        assert_eq!(classify(&deployment(2, 2, 2, 1)).0, DeployStatus::InProgress);
    }

    #[test]
    fn test_no_ready_replicas_without_failure_is_in_progress() {
        assert_eq!(classify(&deployment(3, 0, 0, 0)).0, DeployStatus::InProgress);
    }

    #[test]
    fn test_replica_failure_is_failed() {
        let d = with_condition(deployment(2, 2, 2, 2), REPLICA_FAILURE, "True", "FailedCreate");
        let (status, reason) = classify(&d);
        assert_eq!(status, DeployStatus::Failed);
        assert_eq!(reason, "FailedCreate");
    }

    #[test]
    fn test_progress_deadline_exceeded_is_failed() {
        let d = with_condition(
            deployment(2, 2, 1, 1),
            PROGRESSING,
            "False",
            PROGRESS_DEADLINE_EXCEEDED,
        );
        assert_eq!(classify(&d).0, DeployStatus::Failed);
    }

    #[test]
    fn test_progressing_false_for_other_reason_is_not_failed() {
        let d = with_condition(deployment(2, 2, 2, 2), PROGRESSING, "False", "Paused");
        assert_eq!(classify(&d).0, DeployStatus::Success);

        let d = with_condition(deployment(2, 2, 2, 2), REPLICA_FAILURE, "False", "Ok");
        assert_eq!(classify(&d).0, DeployStatus::Success);
    }

    #[test]
    fn test_unobserved_generation_is_in_progress() {
        let mut d = deployment(2, 2, 2, 2);
        d.metadata.generation = Some(4);
        if let Some(s) = d.status.as_mut() {
            s.observed_generation = Some(3);
        }
        assert_eq!(classify(&d).0, DeployStatus::InProgress);
    }

    #[test]
    fn test_status_view_reports_counts_and_images() {
        let (status, view) = status_view(&deployment(3, 4, 2, 1));

        assert_eq!(status, DeployStatus::InProgress);
        assert_eq!(view.name, "appname");
        assert_eq!(view.desired, 3);
        assert_eq!(view.current, 4);
        assert_eq!(view.up_to_date, 2);
        assert_eq!(view.available, 1);
        assert_eq!(view.containers, vec!["appname".to_string()]);
        assert_eq!(view.images, vec!["docker.hub/app:13".to_string()]);
        assert_eq!(view.status, "InProgress");
        assert!(!view.reason.is_empty());
    }

    #[test]
    fn test_status_view_serializes_camel_case() {
        let (_, view) = status_view(&deployment(1, 1, 1, 1));
        let json = serde_json::to_value(&view).expect("serialize");
        assert_eq!(json["upToDate"], 1);
        assert_eq!(json["status"], "Success");
    }
}
