//! Environment projection
//!
//! Turns resolved resources into container environment variables and the
//! matching Secret data. Plaintext config becomes literal values; secret
//! entries become references into the application's Secret under the same
//! name as the variable.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{EnvVar, EnvVarSource, SecretKeySelector};
use k8s_openapi::ByteString;

use crate::registry::ResolvedResource;

/// First variable of every container, carrying the deployed version
pub const VERSION_ENV_VAR: &str = "APP_VERSION";

/// Replace every character outside `[A-Za-z0-9_]` with `_`
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Variable name for one entry of a resource
///
/// A property override from the manifest replaces the whole name.
pub fn binding_name(resource: &ResolvedResource, key: &str) -> String {
    match resource.property_map.get(key) {
        Some(custom) => sanitize(custom),
        None => sanitize(&format!("{}_{}", resource.name, key)),
    }
}

/// Build the container environment for an application
///
/// Order: the version variable, then for each resource its config entries
/// followed by its secret entries, each group sorted by key.
pub fn project(application: &str, version: &str, resources: &[ResolvedResource]) -> Vec<EnvVar> {
    let mut env = vec![EnvVar {
        name: VERSION_ENV_VAR.to_string(),
        value: Some(version.to_string()),
        value_from: None,
    }];

    for resource in resources {
        for (key, value) in &resource.config {
            env.push(EnvVar {
                name: binding_name(resource, key),
                value: Some(value.clone()),
                value_from: None,
            });
        }
        for key in resource.secrets.keys() {
            let name = binding_name(resource, key);
            env.push(EnvVar {
                value_from: Some(secret_ref(application, &name)),
                name,
                value: None,
            });
        }
    }

    env
}

fn secret_ref(application: &str, key: &str) -> EnvVarSource {
    EnvVarSource {
        secret_key_ref: Some(SecretKeySelector {
            name: application.to_string(),
            key: key.to_string(),
            optional: None,
        }),
        ..Default::default()
    }
}

/// Secret data for all resources, keyed by variable name
pub fn secret_data(resources: &[ResolvedResource]) -> BTreeMap<String, ByteString> {
    resources
        .iter()
        .flat_map(|resource| {
            resource
                .secrets
                .iter()
                .map(move |(key, value)| (binding_name(resource, key), ByteString(value.clone())))
        })
        .collect()
}
