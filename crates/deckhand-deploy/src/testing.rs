//! In-memory [`ClusterObjectStore`] for tests
//!
//! Stores objects as given: no resource versions or cluster IPs are
//! assigned, so tests can tell created objects from carried-forward ones.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::autoscaling::v1::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::{Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::ResourceExt;

use crate::reconcile::{Action, ObjectKind};
use crate::store::ClusterObjectStore;
use crate::Error;

type Key = (String, String);
type Objects<T> = Mutex<BTreeMap<Key, T>>;

fn key_of<T: ResourceExt>(object: &T) -> Key {
    (object.namespace().unwrap_or_default(), object.name_any())
}

fn key(name: &str, namespace: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

fn api_error(code: u16, reason: &str, message: String) -> kube::Error {
    kube::Error::Api(kube::core::ErrorResponse {
        status: "Failure".to_string(),
        message,
        reason: reason.to_string(),
        code,
    })
}

/// Cluster double backed by maps, one per object kind
#[derive(Default)]
pub struct InMemoryObjectStore {
    deployments: Objects<Deployment>,
    secrets: Objects<Secret>,
    services: Objects<Service>,
    ingresses: Objects<Ingress>,
    autoscalers: Objects<HorizontalPodAutoscaler>,
    failing: Mutex<Option<ObjectKind>>,
    writes: Mutex<Vec<(ObjectKind, Action)>>,
}

impl InMemoryObjectStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a Deployment
    pub fn with_deployment(self, deployment: Deployment) -> Self {
        Self::seed(&self.deployments, deployment);
        self
    }

    /// Seed a Secret
    pub fn with_secret(self, secret: Secret) -> Self {
        Self::seed(&self.secrets, secret);
        self
    }

    /// Seed a Service
    pub fn with_service(self, service: Service) -> Self {
        Self::seed(&self.services, service);
        self
    }

    /// Seed an Ingress
    pub fn with_ingress(self, ingress: Ingress) -> Self {
        Self::seed(&self.ingresses, ingress);
        self
    }

    /// Seed a HorizontalPodAutoscaler
    pub fn with_autoscaler(self, autoscaler: HorizontalPodAutoscaler) -> Self {
        Self::seed(&self.autoscalers, autoscaler);
        self
    }

    /// Make every create or update of `kind` fail with a 500
    pub fn fail_writes_for(&self, kind: ObjectKind) {
        *self.failing.lock().unwrap_or_else(|e| e.into_inner()) = Some(kind);
    }

    /// Writes performed so far, in order
    pub fn writes(&self) -> Vec<(ObjectKind, Action)> {
        self.writes.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Stored Deployment
    pub fn deployment(&self, name: &str, namespace: &str) -> Option<Deployment> {
        Self::read(&self.deployments, name, namespace)
    }

    /// Stored Secret
    pub fn secret(&self, name: &str, namespace: &str) -> Option<Secret> {
        Self::read(&self.secrets, name, namespace)
    }

    /// Stored Service
    pub fn service(&self, name: &str, namespace: &str) -> Option<Service> {
        Self::read(&self.services, name, namespace)
    }

    /// Stored Ingress
    pub fn ingress(&self, name: &str, namespace: &str) -> Option<Ingress> {
        Self::read(&self.ingresses, name, namespace)
    }

    /// Stored HorizontalPodAutoscaler
    pub fn autoscaler(&self, name: &str, namespace: &str) -> Option<HorizontalPodAutoscaler> {
        Self::read(&self.autoscalers, name, namespace)
    }

    fn seed<T: ResourceExt>(objects: &Objects<T>, object: T) {
        objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key_of(&object), object);
    }

    fn read<T: Clone>(objects: &Objects<T>, name: &str, namespace: &str) -> Option<T> {
        objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key(name, namespace))
            .cloned()
    }

    fn write<T: ResourceExt + Clone>(
        &self,
        kind: ObjectKind,
        action: Action,
        objects: &Objects<T>,
        object: &T,
    ) -> Result<T, Error> {
        let (namespace, name) = key_of(object);
        let verb = match action {
            Action::Created => "create",
            Action::Updated => "update",
        };

        if *self.failing.lock().unwrap_or_else(|e| e.into_inner()) == Some(kind) {
            return Err(Error::cluster(
                verb,
                kind.as_str(),
                &name,
                &namespace,
                api_error(500, "InternalError", "injected failure".to_string()),
            ));
        }

        let mut map = objects.lock().unwrap_or_else(|e| e.into_inner());
        let exists = map.contains_key(&key(&name, &namespace));
        match (action, exists) {
            (Action::Created, true) => {
                return Err(Error::cluster(
                    verb,
                    kind.as_str(),
                    &name,
                    &namespace,
                    api_error(409, "AlreadyExists", format!("{} already exists", name)),
                ))
            }
            (Action::Updated, false) => {
                return Err(Error::cluster(
                    verb,
                    kind.as_str(),
                    &name,
                    &namespace,
                    api_error(404, "NotFound", format!("{} not found", name)),
                ))
            }
            _ => {}
        }

        map.insert(key(&name, &namespace), object.clone());
        self.writes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((kind, action));
        Ok(object.clone())
    }
}

#[async_trait]
impl ClusterObjectStore for InMemoryObjectStore {
    async fn get_deployment(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<Deployment>, Error> {
        Ok(self.deployment(name, namespace))
    }
    async fn create_deployment(&self, deployment: &Deployment) -> Result<Deployment, Error> {
        self.write(ObjectKind::Deployment, Action::Created, &self.deployments, deployment)
    }
    async fn update_deployment(&self, deployment: &Deployment) -> Result<Deployment, Error> {
        self.write(ObjectKind::Deployment, Action::Updated, &self.deployments, deployment)
    }

    async fn get_secret(&self, name: &str, namespace: &str) -> Result<Option<Secret>, Error> {
        Ok(self.secret(name, namespace))
    }
    async fn create_secret(&self, secret: &Secret) -> Result<Secret, Error> {
        self.write(ObjectKind::Secret, Action::Created, &self.secrets, secret)
    }
    async fn update_secret(&self, secret: &Secret) -> Result<Secret, Error> {
        self.write(ObjectKind::Secret, Action::Updated, &self.secrets, secret)
    }

    async fn get_service(&self, name: &str, namespace: &str) -> Result<Option<Service>, Error> {
        Ok(self.service(name, namespace))
    }
    async fn create_service(&self, service: &Service) -> Result<Service, Error> {
        self.write(ObjectKind::Service, Action::Created, &self.services, service)
    }
    async fn update_service(&self, service: &Service) -> Result<Service, Error> {
        self.write(ObjectKind::Service, Action::Updated, &self.services, service)
    }

    async fn get_ingress(&self, name: &str, namespace: &str) -> Result<Option<Ingress>, Error> {
        Ok(self.ingress(name, namespace))
    }
    async fn create_ingress(&self, ingress: &Ingress) -> Result<Ingress, Error> {
        self.write(ObjectKind::Ingress, Action::Created, &self.ingresses, ingress)
    }
    async fn update_ingress(&self, ingress: &Ingress) -> Result<Ingress, Error> {
        self.write(ObjectKind::Ingress, Action::Updated, &self.ingresses, ingress)
    }

    async fn get_autoscaler(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<HorizontalPodAutoscaler>, Error> {
        Ok(self.autoscaler(name, namespace))
    }
    async fn create_autoscaler(
        &self,
        autoscaler: &HorizontalPodAutoscaler,
    ) -> Result<HorizontalPodAutoscaler, Error> {
        self.write(ObjectKind::Autoscaler, Action::Created, &self.autoscalers, autoscaler)
    }
    async fn update_autoscaler(
        &self,
        autoscaler: &HorizontalPodAutoscaler,
    ) -> Result<HorizontalPodAutoscaler, Error> {
        self.write(ObjectKind::Autoscaler, Action::Updated, &self.autoscalers, autoscaler)
    }
}
