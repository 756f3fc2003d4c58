//! Reconciliation engine
//!
//! Applies the compiled objects of one deployment against the cluster. Each
//! kind follows get-then-decide: absent objects are created, present ones
//! are updated with platform-managed fields carried forward. What a kind may
//! do is fixed by its [`ObjectPolicy`]; kinds run strictly in
//! [`ObjectKind::RECONCILE_ORDER`] and the first cluster error aborts the
//! rest without rolling back.

use std::fmt;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::autoscaling::v1::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::{Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::ResourceExt;
use tracing::{debug, info, warn};

use crate::manifest::ApplicationManifest;
use crate::registry::ResolvedResource;
use crate::request::DeploymentRequest;
use crate::store::{ClusterObjectStore, ManagedObject};
use crate::workload::ObjectCompiler;
use crate::Error;

/// The object kinds deckhand manages for every application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectKind {
    /// apps/v1 Deployment
    Deployment,
    /// v1 Secret
    Secret,
    /// v1 Service
    Service,
    /// networking.k8s.io/v1 Ingress
    Ingress,
    /// autoscaling/v1 HorizontalPodAutoscaler
    Autoscaler,
}

/// What the reconciler may do with one kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectPolicy {
    /// Create the object when it does not exist
    pub can_create: bool,
    /// Replace the object when it exists
    pub can_update: bool,
}

impl ObjectKind {
    /// Order in which kinds are applied
    pub const RECONCILE_ORDER: [ObjectKind; 5] = [
        ObjectKind::Deployment,
        ObjectKind::Secret,
        ObjectKind::Service,
        ObjectKind::Ingress,
        ObjectKind::Autoscaler,
    ];

    /// Lowercase name used in result messages and errors
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Deployment => "deployment",
            ObjectKind::Secret => "secret",
            ObjectKind::Service => "service",
            ObjectKind::Ingress => "ingress",
            ObjectKind::Autoscaler => "autoscaler",
        }
    }

    /// Create/update policy for this kind
    pub fn policy(&self) -> ObjectPolicy {
        match self {
            // create-only: an existing ingress is never replaced
            ObjectKind::Ingress => ObjectPolicy {
                can_create: true,
                can_update: false,
            },
            _ => ObjectPolicy {
                can_create: true,
                can_update: true,
            },
        }
    }

    /// Whether an object of this kind is wanted for the given resources
    pub fn should_exist(&self, resources: &[ResolvedResource]) -> bool {
        match self {
            ObjectKind::Secret => resources.iter().any(ResolvedResource::has_secrets),
            _ => true,
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to an object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// The object did not exist and was created
    Created,
    /// The object existed and was replaced
    Updated,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Created => f.write_str("created"),
            Action::Updated => f.write_str("updated"),
        }
    }
}

/// One applied change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedAction {
    /// Kind of the object
    pub kind: ObjectKind,
    /// What was done
    pub action: Action,
}

/// Outcome of a deploy call
///
/// A kind is `None` when no object was needed or nothing was changed.
#[derive(Debug, Clone, Default)]
pub struct DeploymentResult {
    /// The Deployment as stored
    pub deployment: Option<Deployment>,
    /// The Secret as stored
    pub secret: Option<Secret>,
    /// The Service as stored
    pub service: Option<Service>,
    /// The Ingress as stored
    pub ingress: Option<Ingress>,
    /// The HorizontalPodAutoscaler as stored
    pub autoscaler: Option<HorizontalPodAutoscaler>,
    /// Applied changes in reconcile order
    pub actions: Vec<AppliedAction>,
    /// Compatibility and registration warnings
    pub warnings: Vec<String>,
}

impl DeploymentResult {
    fn record<T: ManagedObject>(&mut self, applied: Option<(T, Action)>) -> Option<T> {
        let (object, action) = applied?;
        self.actions.push(AppliedAction {
            kind: T::KIND,
            action,
        });
        Some(object)
    }

    /// Human-readable summary returned to the caller
    pub fn message(&self) -> String {
        let mut message = String::from("result: \n");
        for applied in &self.actions {
            message.push_str(&format!("- {} {}\n", applied.action, applied.kind));
        }
        if !self.warnings.is_empty() {
            message.push_str("\nWarnings:\n");
            for warning in &self.warnings {
                message.push_str(&format!("- {}\n", warning));
            }
        }
        message
    }
}

/// Get-then-decide for one object
async fn reconcile_object<T: ManagedObject>(
    store: &dyn ClusterObjectStore,
    mut desired: T,
) -> Result<Option<(T, Action)>, Error> {
    let kind = T::KIND;
    let policy = kind.policy();
    let name = desired.name_any();
    let namespace = desired.namespace().unwrap_or_default();

    match T::get(store, &name, &namespace).await? {
        None if policy.can_create => {
            let created = T::create(store, &desired).await?;
            info!(kind = %kind, name = %name, namespace = %namespace, "created object");
            Ok(Some((created, Action::Created)))
        }
        Some(existing) if policy.can_update => {
            desired.carry_forward(&existing);
            let updated = T::update(store, &desired).await?;
            info!(kind = %kind, name = %name, namespace = %namespace, "updated object");
            Ok(Some((updated, Action::Updated)))
        }
        Some(_) => {
            debug!(kind = %kind, name = %name, namespace = %namespace, "object exists and is create-only, leaving it untouched");
            Ok(None)
        }
        None => Ok(None),
    }
}

/// Reconcile all five object kinds for a merged request.
///
/// The returned result carries no warnings; the caller attaches its own. A
/// cluster failure after some kinds were applied comes back as
/// [`Error::PartiallyApplied`] holding those kinds.
pub async fn create_or_update_k8s_resources(
    store: &dyn ClusterObjectStore,
    request: &DeploymentRequest,
    manifest: &ApplicationManifest,
    resources: &[ResolvedResource],
    cluster_subdomain: &str,
) -> Result<DeploymentResult, Error> {
    let compiler = ObjectCompiler::new(request, manifest, resources, cluster_subdomain);
    let mut result = DeploymentResult::default();

    for kind in ObjectKind::RECONCILE_ORDER {
        if !kind.should_exist(resources) {
            debug!(kind = %kind, application = %request.application, "no object needed");
            continue;
        }

        if let Err(e) = apply_kind(store, &compiler, kind, &mut result).await {
            warn!(
                kind = %kind,
                application = %request.application,
                applied = result.actions.len(),
                "reconciliation aborted"
            );
            return Err(Error::partially_applied(result, e));
        }
    }

    Ok(result)
}

async fn apply_kind(
    store: &dyn ClusterObjectStore,
    compiler: &ObjectCompiler<'_>,
    kind: ObjectKind,
    result: &mut DeploymentResult,
) -> Result<(), Error> {
    match kind {
        ObjectKind::Deployment => {
            let applied = reconcile_object(store, compiler.compile_deployment()).await?;
            result.deployment = result.record(applied);
        }
        ObjectKind::Secret => {
            if let Some(secret) = compiler.compile_secret() {
                let applied = reconcile_object(store, secret).await?;
                result.secret = result.record(applied);
            }
        }
        ObjectKind::Service => {
            let applied = reconcile_object(store, compiler.compile_service()).await?;
            result.service = result.record(applied);
        }
        ObjectKind::Ingress => {
            let applied = reconcile_object(store, compiler.compile_ingress()).await?;
            result.ingress = result.record(applied);
        }
        ObjectKind::Autoscaler => {
            let applied = reconcile_object(store, compiler.compile_autoscaler()).await?;
            result.autoscaler = result.record(applied);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use k8s_openapi::api::autoscaling::v1::HorizontalPodAutoscalerSpec;
    use k8s_openapi::api::core::v1::ServiceSpec;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use k8s_openapi::ByteString;

    use super::*;
    use crate::store::MockClusterObjectStore;
    use crate::testing::InMemoryObjectStore;

    const APP: &str = "appname";
    const NAMESPACE: &str = "namespace";
    const RESOURCE_VERSION: &str = "12369";

    fn request() -> DeploymentRequest {
        DeploymentRequest {
            application: APP.to_string(),
            version: "13".to_string(),
            namespace: NAMESPACE.to_string(),
            ..Default::default()
        }
    }

    fn manifest() -> ApplicationManifest {
        ApplicationManifest::from_yaml("image: docker.hub/app\nport: 6900\n").expect("parse")
    }

    fn resources(with_secret: bool) -> Vec<ResolvedResource> {
        let secrets = if with_secret {
            BTreeMap::from([("secretKey".to_string(), b"secretValue".to_vec())])
        } else {
            BTreeMap::new()
        };
        vec![ResolvedResource {
            id: 1,
            name: "resourceName".to_string(),
            resource_type: "resourceType".to_string(),
            config: BTreeMap::from([("resourceKey".to_string(), "resource1Value".to_string())]),
            secrets,
            property_map: BTreeMap::new(),
        }]
    }

    fn existing_meta() -> ObjectMeta {
        ObjectMeta {
            name: Some(APP.to_string()),
            namespace: Some(NAMESPACE.to_string()),
            resource_version: Some(RESOURCE_VERSION.to_string()),
            ..Default::default()
        }
    }

    fn existing_service() -> Service {
        Service {
            metadata: existing_meta(),
            spec: Some(ServiceSpec {
                cluster_ip: Some("1.2.3.4".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_policy_table() {
        for kind in ObjectKind::RECONCILE_ORDER {
            let policy = kind.policy();
            assert!(policy.can_create, "{} should be creatable", kind);
            assert_eq!(policy.can_update, kind != ObjectKind::Ingress);
        }
        assert!(!ObjectKind::Secret.should_exist(&resources(false)));
        assert!(ObjectKind::Secret.should_exist(&resources(true)));
        assert!(ObjectKind::Service.should_exist(&[]));
    }

    /// Story: an empty cluster gets every object, in order
    #[tokio::test]
    async fn story_empty_cluster_creates_everything() {
        let store = InMemoryObjectStore::new();

        let result = create_or_update_k8s_resources(
            &store,
            &request(),
            &manifest(),
            &resources(true),
            "nais.example.yo",
        )
        .await
        .expect("reconcile should succeed");

        assert!(result.deployment.is_some());
        assert!(result.service.is_some());
        assert!(result.ingress.is_some());
        assert!(result.autoscaler.is_some());
        let secret = result.secret.as_ref().expect("secret should be created");
        assert!(secret.metadata.resource_version.is_none());

        assert_eq!(
            result.message(),
            "result: \n- created deployment\n- created secret\n- created service\n- created ingress\n- created autoscaler\n"
        );
    }

    /// Story: a pre-existing service keeps its version and cluster IP
    #[tokio::test]
    async fn story_existing_service_is_updated_in_place() {
        let store = InMemoryObjectStore::new().with_service(existing_service());

        let result = create_or_update_k8s_resources(
            &store,
            &request(),
            &manifest(),
            &resources(true),
            "nais.example.yo",
        )
        .await
        .expect("reconcile should succeed");

        let service = result.service.expect("service should be updated");
        assert_eq!(
            service.metadata.resource_version.as_deref(),
            Some(RESOURCE_VERSION)
        );
        let spec = service.spec.expect("spec");
        assert_eq!(spec.cluster_ip.as_deref(), Some("1.2.3.4"));
        assert_eq!(spec.ports.expect("ports")[0].port, 80);
        assert!(result.actions.contains(&AppliedAction {
            kind: ObjectKind::Service,
            action: Action::Updated,
        }));
    }

    #[tokio::test]
    async fn test_secret_omitted_without_secret_values() {
        let store = InMemoryObjectStore::new();

        let result = create_or_update_k8s_resources(
            &store,
            &request(),
            &manifest(),
            &resources(false),
            "nais.example.yo",
        )
        .await
        .expect("reconcile should succeed");

        assert!(result.secret.is_none());
        assert!(result.service.is_some());
        assert!(store.secret(APP, NAMESPACE).is_none());
        assert!(!result.message().contains("secret"));
    }

    /// Story: an existing ingress is never touched
    #[tokio::test]
    async fn story_existing_ingress_is_a_noop() {
        let existing = Ingress {
            metadata: existing_meta(),
            ..Default::default()
        };
        let store = InMemoryObjectStore::new().with_ingress(existing.clone());

        let result = create_or_update_k8s_resources(
            &store,
            &request(),
            &manifest(),
            &resources(true),
            "nais.example.yo",
        )
        .await
        .expect("reconcile should succeed");

        assert!(result.ingress.is_none());
        assert_eq!(store.ingress(APP, NAMESPACE), Some(existing));
        assert_eq!(
            result.message(),
            "result: \n- created deployment\n- created secret\n- created service\n- created autoscaler\n"
        );
    }

    #[tokio::test]
    async fn test_existing_deployment_gets_new_version() {
        let mut existing = ObjectCompiler::new(&request(), &manifest(), &[], "x").compile_deployment();
        existing.metadata.resource_version = Some(RESOURCE_VERSION.to_string());
        let store = InMemoryObjectStore::new().with_deployment(existing);

        let mut newer = request();
        newer.version = "14".to_string();
        let result =
            create_or_update_k8s_resources(&store, &newer, &manifest(), &resources(false), "x")
                .await
                .expect("reconcile should succeed");

        let deployment = result.deployment.expect("deployment should be updated");
        assert_eq!(
            deployment.metadata.resource_version.as_deref(),
            Some(RESOURCE_VERSION)
        );
        let container = &deployment
            .spec
            .and_then(|s| s.template.spec)
            .expect("pod spec")
            .containers[0];
        assert_eq!(container.image.as_deref(), Some("docker.hub/app:14"));
        assert_eq!(
            container.env.as_ref().expect("env")[0].value.as_deref(),
            Some("14")
        );
        assert_eq!(result.actions[0].action, Action::Updated);
    }

    /// Story: the first cluster failure stops the remaining kinds
    #[tokio::test]
    async fn story_cluster_failure_aborts_remaining_kinds() {
        let mut store = MockClusterObjectStore::new();
        store.expect_get_deployment().returning(|_, _| Ok(None));
        store
            .expect_create_deployment()
            .returning(|d| Ok(d.clone()));
        store.expect_get_secret().returning(|_, _| Ok(None));
        store.expect_create_secret().returning(|s| {
            Err(Error::cluster(
                "create",
                "secret",
                &s.name_any(),
                NAMESPACE,
                kube::Error::Api(kube::core::ErrorResponse {
                    status: "Failure".to_string(),
                    message: "quota exceeded".to_string(),
                    reason: "Forbidden".to_string(),
                    code: 403,
                }),
            ))
        });
        store.expect_get_service().never();
        store.expect_get_ingress().never();
        store.expect_get_autoscaler().never();

        let err = create_or_update_k8s_resources(
            &store,
            &request(),
            &manifest(),
            &resources(true),
            "nais.example.yo",
        )
        .await
        .expect_err("reconcile should fail");

        let Error::PartiallyApplied { applied, source } = &err else {
            panic!("Expected PartiallyApplied, got {:?}", err);
        };
        assert!(matches!(source.as_ref(), Error::Cluster { kind: "secret", .. }));
        assert!(applied.deployment.is_some());
        assert!(applied.secret.is_none());
        assert!(!err.is_client_error());
    }

    /// Story: objects applied before an ingress failure are reported back
    #[tokio::test]
    async fn story_ingress_failure_reports_applied_kinds() {
        let store = InMemoryObjectStore::new();
        store.fail_writes_for(ObjectKind::Ingress);

        let err = create_or_update_k8s_resources(
            &store,
            &request(),
            &manifest(),
            &resources(true),
            "nais.example.yo",
        )
        .await
        .expect_err("reconcile should fail");

        let applied = err.applied().expect("applied kinds should be kept");
        assert!(applied.deployment.is_some());
        assert!(applied.secret.is_some());
        assert!(applied.service.is_some());
        assert!(applied.ingress.is_none());
        assert!(applied.autoscaler.is_none());
        let kinds: Vec<ObjectKind> = applied.actions.iter().map(|a| a.kind).collect();
        assert_eq!(
            kinds,
            vec![ObjectKind::Deployment, ObjectKind::Secret, ObjectKind::Service]
        );
        assert!(err.to_string().starts_with("failed to create ingress namespace/appname"));
        assert!(err.to_string().ends_with(
            "result: \n- created deployment\n- created secret\n- created service\n"
        ));
        assert!(store.autoscaler(APP, NAMESPACE).is_none());
    }

    #[tokio::test]
    async fn test_failure_before_any_write_is_plain_error() {
        let store = InMemoryObjectStore::new();
        store.fail_writes_for(ObjectKind::Deployment);

        let err = create_or_update_k8s_resources(
            &store,
            &request(),
            &manifest(),
            &resources(true),
            "nais.example.yo",
        )
        .await
        .expect_err("reconcile should fail");

        assert!(matches!(err, Error::Cluster { kind: "deployment", .. }));
        assert!(store.writes().is_empty());
    }

    /// Story: an existing autoscaler takes the new bounds wholesale
    #[tokio::test]
    async fn story_existing_autoscaler_gets_new_bounds() {
        let existing = HorizontalPodAutoscaler {
            metadata: existing_meta(),
            spec: Some(HorizontalPodAutoscalerSpec {
                min_replicas: Some(1),
                max_replicas: 2,
                target_cpu_utilization_percentage: Some(3),
                ..Default::default()
            }),
            ..Default::default()
        };
        let store = InMemoryObjectStore::new().with_autoscaler(existing);
        let manifest = ApplicationManifest::from_yaml(
            "image: docker.hub/app\nport: 6900\nreplicas:\n  min: 6\n  max: 9\n  cpuThresholdPercentage: 69\n",
        )
        .expect("parse");

        let result =
            create_or_update_k8s_resources(&store, &request(), &manifest, &resources(false), "x")
                .await
                .expect("reconcile should succeed");

        let autoscaler = result.autoscaler.expect("autoscaler should be updated");
        assert_eq!(
            autoscaler.metadata.resource_version.as_deref(),
            Some(RESOURCE_VERSION)
        );
        let spec = autoscaler.spec.expect("spec");
        assert_eq!(spec.min_replicas, Some(6));
        assert_eq!(spec.max_replicas, 9);
        assert_eq!(spec.target_cpu_utilization_percentage, Some(69));
        assert_eq!(spec.scale_target_ref.name, APP);
        assert_eq!(store.autoscaler(APP, NAMESPACE).and_then(|a| a.spec), Some(spec));
        assert!(result.actions.contains(&AppliedAction {
            kind: ObjectKind::Autoscaler,
            action: Action::Updated,
        }));
    }

    /// Story: an existing secret is overwritten with the new values
    #[tokio::test]
    async fn story_existing_secret_gets_new_values() {
        let key = crate::env::binding_name(&resources(true)[0], "secretKey");
        let existing = Secret {
            metadata: existing_meta(),
            data: Some(BTreeMap::from([(
                key.clone(),
                ByteString(b"oldValue".to_vec()),
            )])),
            ..Default::default()
        };
        let store = InMemoryObjectStore::new().with_secret(existing);

        let result = create_or_update_k8s_resources(
            &store,
            &request(),
            &manifest(),
            &resources(true),
            "nais.example.yo",
        )
        .await
        .expect("reconcile should succeed");

        let secret = result.secret.clone().expect("secret should be updated");
        assert_eq!(
            secret.metadata.resource_version.as_deref(),
            Some(RESOURCE_VERSION)
        );
        let data = secret.data.expect("data");
        assert_eq!(data.len(), 1);
        assert_eq!(data.get(&key), Some(&ByteString(b"secretValue".to_vec())));
        assert_eq!(store.secret(APP, NAMESPACE).and_then(|s| s.data), Some(data));
        assert_eq!(
            result.message(),
            "result: \n- created deployment\n- updated secret\n- created service\n- created ingress\n- created autoscaler\n"
        );
    }

    #[test]
    fn test_message_appends_warnings() {
        let result = DeploymentResult {
            actions: vec![AppliedAction {
                kind: ObjectKind::Deployment,
                action: Action::Updated,
            }],
            warnings: vec![
                "Deployment request property 'environment' is deprecated. Use 'fasitEnvironment' instead"
                    .to_string(),
            ],
            ..Default::default()
        };

        assert_eq!(
            result.message(),
            "result: \n- updated deployment\n\nWarnings:\n- Deployment request property 'environment' is deprecated. Use 'fasitEnvironment' instead\n"
        );
    }
}
