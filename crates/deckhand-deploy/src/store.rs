//! Cluster object access
//!
//! [`ClusterObjectStore`] is the seam between the reconciliation engine and
//! the Kubernetes API: get, create and update per object kind, keyed by
//! `(name, namespace)`. [`KubeObjectStore`] is the kube-rs implementation.

use std::fmt::Debug;
use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use deckhand_common::kube_utils::is_not_found;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::autoscaling::v1::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::{Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, PostParams};
use kube::{Client, Resource, ResourceExt};
#[cfg(test)]
use mockall::automock;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::reconcile::ObjectKind;
use crate::Error;

/// Trait abstracting Kubernetes operations on the objects deckhand manages
///
/// `create_*` and `update_*` return the object as stored by the API server.
/// Namespaces are taken from the object's metadata.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterObjectStore: Send + Sync {
    /// Get a Deployment, `None` if it does not exist
    async fn get_deployment(&self, name: &str, namespace: &str)
        -> Result<Option<Deployment>, Error>;
    /// Create a Deployment
    async fn create_deployment(&self, deployment: &Deployment) -> Result<Deployment, Error>;
    /// Replace a Deployment
    async fn update_deployment(&self, deployment: &Deployment) -> Result<Deployment, Error>;

    /// Get a Secret, `None` if it does not exist
    async fn get_secret(&self, name: &str, namespace: &str) -> Result<Option<Secret>, Error>;
    /// Create a Secret
    async fn create_secret(&self, secret: &Secret) -> Result<Secret, Error>;
    /// Replace a Secret
    async fn update_secret(&self, secret: &Secret) -> Result<Secret, Error>;

    /// Get a Service, `None` if it does not exist
    async fn get_service(&self, name: &str, namespace: &str) -> Result<Option<Service>, Error>;
    /// Create a Service
    async fn create_service(&self, service: &Service) -> Result<Service, Error>;
    /// Replace a Service
    async fn update_service(&self, service: &Service) -> Result<Service, Error>;

    /// Get an Ingress, `None` if it does not exist
    async fn get_ingress(&self, name: &str, namespace: &str) -> Result<Option<Ingress>, Error>;
    /// Create an Ingress
    async fn create_ingress(&self, ingress: &Ingress) -> Result<Ingress, Error>;
    /// Replace an Ingress
    async fn update_ingress(&self, ingress: &Ingress) -> Result<Ingress, Error>;

    /// Get a HorizontalPodAutoscaler, `None` if it does not exist
    async fn get_autoscaler(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<HorizontalPodAutoscaler>, Error>;
    /// Create a HorizontalPodAutoscaler
    async fn create_autoscaler(
        &self,
        autoscaler: &HorizontalPodAutoscaler,
    ) -> Result<HorizontalPodAutoscaler, Error>;
    /// Replace a HorizontalPodAutoscaler
    async fn update_autoscaler(
        &self,
        autoscaler: &HorizontalPodAutoscaler,
    ) -> Result<HorizontalPodAutoscaler, Error>;
}

/// Boxed future returned by [`ClusterObjectStore`] methods
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, Error>> + Send + 'a>>;

/// A Kubernetes object kind the reconciler drives through a [`ClusterObjectStore`]
pub trait ManagedObject: Resource + Clone + Send + Sync + Sized {
    /// Which kind this is
    const KIND: ObjectKind;

    /// Fetch the existing object
    fn get<'a>(
        store: &'a dyn ClusterObjectStore,
        name: &'a str,
        namespace: &'a str,
    ) -> StoreFuture<'a, Option<Self>>;

    /// Create the object
    fn create<'a>(store: &'a dyn ClusterObjectStore, object: &'a Self) -> StoreFuture<'a, Self>;

    /// Replace the object
    fn update<'a>(store: &'a dyn ClusterObjectStore, object: &'a Self) -> StoreFuture<'a, Self>;

    /// Copy platform-managed fields from the existing object onto this desired one
    fn carry_forward(&mut self, existing: &Self) {
        self.meta_mut().resource_version = existing.meta().resource_version.clone();
    }
}

impl ManagedObject for Deployment {
    const KIND: ObjectKind = ObjectKind::Deployment;

    fn get<'a>(
        store: &'a dyn ClusterObjectStore,
        name: &'a str,
        namespace: &'a str,
    ) -> StoreFuture<'a, Option<Self>> {
        store.get_deployment(name, namespace)
    }
    fn create<'a>(store: &'a dyn ClusterObjectStore, object: &'a Self) -> StoreFuture<'a, Self> {
        store.create_deployment(object)
    }
    fn update<'a>(store: &'a dyn ClusterObjectStore, object: &'a Self) -> StoreFuture<'a, Self> {
        store.update_deployment(object)
    }
}

impl ManagedObject for Secret {
    const KIND: ObjectKind = ObjectKind::Secret;

    fn get<'a>(
        store: &'a dyn ClusterObjectStore,
        name: &'a str,
        namespace: &'a str,
    ) -> StoreFuture<'a, Option<Self>> {
        store.get_secret(name, namespace)
    }
    fn create<'a>(store: &'a dyn ClusterObjectStore, object: &'a Self) -> StoreFuture<'a, Self> {
        store.create_secret(object)
    }
    fn update<'a>(store: &'a dyn ClusterObjectStore, object: &'a Self) -> StoreFuture<'a, Self> {
        store.update_secret(object)
    }
}

impl ManagedObject for Service {
    const KIND: ObjectKind = ObjectKind::Service;

    fn get<'a>(
        store: &'a dyn ClusterObjectStore,
        name: &'a str,
        namespace: &'a str,
    ) -> StoreFuture<'a, Option<Self>> {
        store.get_service(name, namespace)
    }
    fn create<'a>(store: &'a dyn ClusterObjectStore, object: &'a Self) -> StoreFuture<'a, Self> {
        store.create_service(object)
    }
    fn update<'a>(store: &'a dyn ClusterObjectStore, object: &'a Self) -> StoreFuture<'a, Self> {
        store.update_service(object)
    }

    /// The cluster IP is assigned by the API server and immutable
    fn carry_forward(&mut self, existing: &Self) {
        self.metadata.resource_version = existing.metadata.resource_version.clone();
        if let (Some(spec), Some(existing_spec)) = (self.spec.as_mut(), existing.spec.as_ref()) {
            spec.cluster_ip = existing_spec.cluster_ip.clone();
            spec.cluster_ips = existing_spec.cluster_ips.clone();
        }
    }
}

impl ManagedObject for Ingress {
    const KIND: ObjectKind = ObjectKind::Ingress;

    fn get<'a>(
        store: &'a dyn ClusterObjectStore,
        name: &'a str,
        namespace: &'a str,
    ) -> StoreFuture<'a, Option<Self>> {
        store.get_ingress(name, namespace)
    }
    fn create<'a>(store: &'a dyn ClusterObjectStore, object: &'a Self) -> StoreFuture<'a, Self> {
        store.create_ingress(object)
    }
    fn update<'a>(store: &'a dyn ClusterObjectStore, object: &'a Self) -> StoreFuture<'a, Self> {
        store.update_ingress(object)
    }
}

impl ManagedObject for HorizontalPodAutoscaler {
    const KIND: ObjectKind = ObjectKind::Autoscaler;

    fn get<'a>(
        store: &'a dyn ClusterObjectStore,
        name: &'a str,
        namespace: &'a str,
    ) -> StoreFuture<'a, Option<Self>> {
        store.get_autoscaler(name, namespace)
    }
    fn create<'a>(store: &'a dyn ClusterObjectStore, object: &'a Self) -> StoreFuture<'a, Self> {
        store.create_autoscaler(object)
    }
    fn update<'a>(store: &'a dyn ClusterObjectStore, object: &'a Self) -> StoreFuture<'a, Self> {
        store.update_autoscaler(object)
    }
}

/// Real Kubernetes implementation of [`ClusterObjectStore`]
#[derive(Clone)]
pub struct KubeObjectStore {
    client: Client,
}

impl KubeObjectStore {
    /// Create a store wrapping the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn get<K>(&self, kind: ObjectKind, name: &str, namespace: &str) -> Result<Option<K>, Error>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        K::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        match api.get(name).await {
            Ok(object) => Ok(Some(object)),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(Error::cluster("get", kind.as_str(), name, namespace, e)),
        }
    }

    async fn create<K>(&self, kind: ObjectKind, object: &K) -> Result<K, Error>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Serialize + Debug,
        K::DynamicType: Default,
    {
        let name = object.name_any();
        let namespace = object.namespace().unwrap_or_default();
        let api: Api<K> = Api::namespaced(self.client.clone(), &namespace);
        api.create(&PostParams::default(), object)
            .await
            .map_err(|e| Error::cluster("create", kind.as_str(), &name, &namespace, e))
    }

    async fn update<K>(&self, kind: ObjectKind, object: &K) -> Result<K, Error>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Serialize + Debug,
        K::DynamicType: Default,
    {
        let name = object.name_any();
        let namespace = object.namespace().unwrap_or_default();
        let api: Api<K> = Api::namespaced(self.client.clone(), &namespace);
        api.replace(&name, &PostParams::default(), object)
            .await
            .map_err(|e| Error::cluster("update", kind.as_str(), &name, &namespace, e))
    }
}

#[async_trait]
impl ClusterObjectStore for KubeObjectStore {
    async fn get_deployment(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<Deployment>, Error> {
        self.get(ObjectKind::Deployment, name, namespace).await
    }
    async fn create_deployment(&self, deployment: &Deployment) -> Result<Deployment, Error> {
        self.create(ObjectKind::Deployment, deployment).await
    }
    async fn update_deployment(&self, deployment: &Deployment) -> Result<Deployment, Error> {
        self.update(ObjectKind::Deployment, deployment).await
    }

    async fn get_secret(&self, name: &str, namespace: &str) -> Result<Option<Secret>, Error> {
        self.get(ObjectKind::Secret, name, namespace).await
    }
    async fn create_secret(&self, secret: &Secret) -> Result<Secret, Error> {
        self.create(ObjectKind::Secret, secret).await
    }
    async fn update_secret(&self, secret: &Secret) -> Result<Secret, Error> {
        self.update(ObjectKind::Secret, secret).await
    }

    async fn get_service(&self, name: &str, namespace: &str) -> Result<Option<Service>, Error> {
        self.get(ObjectKind::Service, name, namespace).await
    }
    async fn create_service(&self, service: &Service) -> Result<Service, Error> {
        self.create(ObjectKind::Service, service).await
    }
    async fn update_service(&self, service: &Service) -> Result<Service, Error> {
        self.update(ObjectKind::Service, service).await
    }

    async fn get_ingress(&self, name: &str, namespace: &str) -> Result<Option<Ingress>, Error> {
        self.get(ObjectKind::Ingress, name, namespace).await
    }
    async fn create_ingress(&self, ingress: &Ingress) -> Result<Ingress, Error> {
        self.create(ObjectKind::Ingress, ingress).await
    }
    async fn update_ingress(&self, ingress: &Ingress) -> Result<Ingress, Error> {
        self.update(ObjectKind::Ingress, ingress).await
    }

    async fn get_autoscaler(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<HorizontalPodAutoscaler>, Error> {
        self.get(ObjectKind::Autoscaler, name, namespace).await
    }
    async fn create_autoscaler(
        &self,
        autoscaler: &HorizontalPodAutoscaler,
    ) -> Result<HorizontalPodAutoscaler, Error> {
        self.create(ObjectKind::Autoscaler, autoscaler).await
    }
    async fn update_autoscaler(
        &self,
        autoscaler: &HorizontalPodAutoscaler,
    ) -> Result<HorizontalPodAutoscaler, Error> {
        self.update(ObjectKind::Autoscaler, autoscaler).await
    }
}
