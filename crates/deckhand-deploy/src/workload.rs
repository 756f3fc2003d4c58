//! Desired-state compilation for the five object kinds
//!
//! [`ObjectCompiler`] turns a merged request, its manifest and the resolved
//! resources into the Kubernetes objects deckhand manages:
//! - Deployment: the application's pods
//! - Secret: secret values of resolved resources (only when there are any)
//! - Service: cluster-internal port 80 in front of the container port
//! - Ingress: `{app}.{subdomain}` routed to the Service
//! - HorizontalPodAutoscaler: CPU-based scaling between the manifest bounds
//!
//! Every object is named after the application and lives in the request's
//! namespace. Compilation is pure; platform-managed fields are carried
//! forward by the reconciler.

use std::collections::BTreeMap;

use deckhand_common::kube_utils::{app_labels, object_meta};
use deckhand_common::LABEL_APP;
use k8s_openapi::api::apps::v1::{
    Deployment, DeploymentSpec, DeploymentStrategy, RollingUpdateDeployment,
};
use k8s_openapi::api::autoscaling::v1::{
    CrossVersionObjectReference, HorizontalPodAutoscaler, HorizontalPodAutoscalerSpec,
};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, HTTPGetAction, PodSpec, PodTemplateSpec, Probe,
    ResourceRequirements, Secret, Service, ServicePort, ServiceSpec,
};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use crate::env;
use crate::manifest::{ApplicationManifest, ResourceList};
use crate::registry::ResolvedResource;
use crate::request::DeploymentRequest;

/// Name of the container port, referenced by probes and Prometheus
pub const HTTP_PORT_NAME: &str = "http";

/// Port the Service and Ingress expose
pub const SERVICE_PORT: i32 = 80;

/// Delay before the first liveness and readiness probe
pub const PROBE_INITIAL_DELAY_SECONDS: i32 = 20;

/// Prometheus annotation enabling scraping
pub const PROMETHEUS_SCRAPE_ANNOTATION: &str = "prometheus.io/scrape";
/// Prometheus annotation for the metrics path
pub const PROMETHEUS_PATH_ANNOTATION: &str = "prometheus.io/path";
/// Prometheus annotation for the metrics port
pub const PROMETHEUS_PORT_ANNOTATION: &str = "prometheus.io/port";

/// Compiles desired objects for one deployment
#[derive(Debug, Clone, Copy)]
pub struct ObjectCompiler<'a> {
    request: &'a DeploymentRequest,
    manifest: &'a ApplicationManifest,
    resources: &'a [ResolvedResource],
    cluster_subdomain: &'a str,
}

impl<'a> ObjectCompiler<'a> {
    /// Create a compiler for a merged, validated request
    pub fn new(
        request: &'a DeploymentRequest,
        manifest: &'a ApplicationManifest,
        resources: &'a [ResolvedResource],
        cluster_subdomain: &'a str,
    ) -> Self {
        Self {
            request,
            manifest,
            resources,
            cluster_subdomain,
        }
    }

    fn name(&self) -> &'a str {
        &self.request.application
    }

    fn namespace(&self) -> &'a str {
        &self.request.namespace
    }

    fn selector(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(LABEL_APP.to_string(), self.name().to_string())])
    }

    /// Public host the Ingress answers on
    pub fn ingress_host(&self) -> String {
        format!("{}.{}", self.name(), self.cluster_subdomain)
    }

    /// Compile the Deployment
    pub fn compile_deployment(&self) -> Deployment {
        let name = self.name();
        let annotations = self.manifest.prometheus.enabled.then(|| {
            BTreeMap::from([
                (PROMETHEUS_SCRAPE_ANNOTATION.to_string(), "true".to_string()),
                (
                    PROMETHEUS_PATH_ANNOTATION.to_string(),
                    self.manifest.prometheus.path.clone(),
                ),
                (
                    PROMETHEUS_PORT_ANNOTATION.to_string(),
                    HTTP_PORT_NAME.to_string(),
                ),
            ])
        });

        Deployment {
            metadata: object_meta(name, self.namespace()),
            spec: Some(DeploymentSpec {
                replicas: Some(self.manifest.replicas.min),
                selector: LabelSelector {
                    match_labels: Some(self.selector()),
                    ..Default::default()
                },
                strategy: Some(DeploymentStrategy {
                    type_: Some("RollingUpdate".to_string()),
                    rolling_update: Some(RollingUpdateDeployment {
                        max_surge: Some(IntOrString::Int(1)),
                        max_unavailable: Some(IntOrString::Int(0)),
                    }),
                }),
                progress_deadline_seconds: Some(300),
                revision_history_limit: Some(10),
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        name: Some(name.to_string()),
                        labels: Some(app_labels(name)),
                        annotations,
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        containers: vec![self.compile_container()],
                        restart_policy: Some("Always".to_string()),
                        dns_policy: Some("ClusterFirst".to_string()),
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn compile_container(&self) -> Container {
        let manifest = self.manifest;
        Container {
            name: self.name().to_string(),
            image: Some(format!("{}:{}", manifest.image, self.request.version)),
            image_pull_policy: Some("IfNotPresent".to_string()),
            ports: Some(vec![ContainerPort {
                name: Some(HTTP_PORT_NAME.to_string()),
                container_port: manifest.port,
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            liveness_probe: Some(http_probe(&manifest.healthcheck.liveness.path)),
            readiness_probe: Some(http_probe(&manifest.healthcheck.readiness.path)),
            resources: Some(ResourceRequirements {
                requests: Some(quantities(&manifest.resources.requests)),
                limits: Some(quantities(&manifest.resources.limits)),
                ..Default::default()
            }),
            env: Some(env::project(
                self.name(),
                &self.request.version,
                self.resources,
            )),
            ..Default::default()
        }
    }

    /// Compile the Secret, or `None` when no resource has secret values
    pub fn compile_secret(&self) -> Option<Secret> {
        let data = env::secret_data(self.resources);
        if data.is_empty() {
            return None;
        }
        Some(Secret {
            metadata: object_meta(self.name(), self.namespace()),
            type_: Some("Opaque".to_string()),
            data: Some(data),
            ..Default::default()
        })
    }

    /// Compile the Service
    pub fn compile_service(&self) -> Service {
        Service {
            metadata: object_meta(self.name(), self.namespace()),
            spec: Some(ServiceSpec {
                type_: Some("ClusterIP".to_string()),
                selector: Some(self.selector()),
                ports: Some(vec![ServicePort {
                    name: Some(HTTP_PORT_NAME.to_string()),
                    protocol: Some("TCP".to_string()),
                    port: SERVICE_PORT,
                    target_port: Some(IntOrString::Int(self.manifest.port)),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Compile the Ingress
    pub fn compile_ingress(&self) -> Ingress {
        Ingress {
            metadata: object_meta(self.name(), self.namespace()),
            spec: Some(IngressSpec {
                rules: Some(vec![IngressRule {
                    host: Some(self.ingress_host()),
                    http: Some(HTTPIngressRuleValue {
                        paths: vec![HTTPIngressPath {
                            path: Some("/".to_string()),
                            path_type: "ImplementationSpecific".to_string(),
                            backend: IngressBackend {
                                service: Some(IngressServiceBackend {
                                    name: self.name().to_string(),
                                    port: Some(ServiceBackendPort {
                                        number: Some(SERVICE_PORT),
                                        ..Default::default()
                                    }),
                                }),
                                ..Default::default()
                            },
                        }],
                    }),
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Compile the HorizontalPodAutoscaler
    pub fn compile_autoscaler(&self) -> HorizontalPodAutoscaler {
        let replicas = &self.manifest.replicas;
        HorizontalPodAutoscaler {
            metadata: object_meta(self.name(), self.namespace()),
            spec: Some(HorizontalPodAutoscalerSpec {
                min_replicas: Some(replicas.min),
                max_replicas: replicas.max,
                target_cpu_utilization_percentage: Some(replicas.cpu_threshold_percentage),
                scale_target_ref: CrossVersionObjectReference {
                    api_version: Some("apps/v1".to_string()),
                    kind: "Deployment".to_string(),
                    name: self.name().to_string(),
                },
            }),
            ..Default::default()
        }
    }
}

fn http_probe(path: &str) -> Probe {
    Probe {
        http_get: Some(HTTPGetAction {
            path: Some(path.to_string()),
            port: IntOrString::String(HTTP_PORT_NAME.to_string()),
            ..Default::default()
        }),
        initial_delay_seconds: Some(PROBE_INITIAL_DELAY_SECONDS),
        ..Default::default()
    }
}

fn quantities(list: &ResourceList) -> BTreeMap<String, Quantity> {
    BTreeMap::from([
        ("cpu".to_string(), Quantity(list.cpu.clone())),
        ("memory".to_string(), Quantity(list.memory.clone())),
    ])
}
