//! Resource resolution
//!
//! Expands the manifest's declared resources, plus the platform trust store,
//! into [`ResolvedResource`]s. One unresolved resource fails the whole set.

use tracing::{debug, info};

use crate::manifest::UsedResource;
use crate::registry::{RegistryCredentials, ResolvedResource, ResourceRegistry, ResourceScope};
use crate::request::DeploymentRequest;
use crate::Error;

/// Alias of the trust store every application receives
pub const TRUSTSTORE_ALIAS: &str = "nav_truststore";

/// Registry type of the trust store
pub const TRUSTSTORE_TYPE: &str = "certificate";

/// File attached to the trust store resource, folded into its secrets
pub const KEYSTORE_FILE_KEY: &str = "keystore";

/// Registry credentials taken from a merged request
pub fn credentials_for(request: &DeploymentRequest) -> RegistryCredentials {
    RegistryCredentials {
        username: request.fasit_username.clone(),
        password: request.fasit_password.clone(),
    }
}

fn scope_for(request: &DeploymentRequest, alias: &str, resource_type: &str) -> ResourceScope {
    ResourceScope {
        alias: alias.to_string(),
        resource_type: resource_type.to_string(),
        environment: request.fasit_environment.clone(),
        application: request.application.clone(),
        zone: request.zone.clone(),
    }
}

async fn resolve_one(
    registry: &dyn ResourceRegistry,
    request: &DeploymentRequest,
    credentials: &RegistryCredentials,
    alias: &str,
    resource_type: &str,
) -> Result<ResolvedResource, Error> {
    let scope = scope_for(request, alias, resource_type);
    registry
        .resolve(&scope, credentials)
        .await?
        .ok_or_else(|| Error::ResourceNotFound {
            alias: alias.to_string(),
            resource_type: resource_type.to_string(),
        })
}

/// Resolve every declared resource and then the trust store.
///
/// Declared resources keep manifest order and carry their property
/// overrides. The trust store is always last, with its keystore file stored
/// as the `keystore` secret.
pub async fn resolve_resources(
    registry: &dyn ResourceRegistry,
    used: &[UsedResource],
    request: &DeploymentRequest,
) -> Result<Vec<ResolvedResource>, Error> {
    let credentials = credentials_for(request);
    let mut resolved = Vec::with_capacity(used.len() + 1);

    for declared in used {
        let mut resource = resolve_one(
            registry,
            request,
            &credentials,
            &declared.alias,
            &declared.resource_type,
        )
        .await?;
        resource.property_map = declared.property_map.clone();
        debug!(
            alias = %declared.alias,
            resource_type = %declared.resource_type,
            id = resource.id,
            "resolved resource"
        );
        resolved.push(resource);
    }

    let mut truststore = resolve_one(
        registry,
        request,
        &credentials,
        TRUSTSTORE_ALIAS,
        TRUSTSTORE_TYPE,
    )
    .await?;
    let keystore = registry
        .fetch_file(truststore.id, KEYSTORE_FILE_KEY)
        .await?
        .ok_or_else(|| Error::ResourceNotFound {
            alias: TRUSTSTORE_ALIAS.to_string(),
            resource_type: TRUSTSTORE_TYPE.to_string(),
        })?;
    truststore
        .secrets
        .insert(KEYSTORE_FILE_KEY.to_string(), keystore);
    resolved.push(truststore);

    info!(
        application = %request.application,
        count = resolved.len(),
        "resolved external resources"
    );
    Ok(resolved)
}
