//! Deployment requests: wire format, deprecated-field merge and validation

use serde::{Deserialize, Serialize};

/// Zones an application may be deployed to
pub const ALLOWED_ZONES: [&str; 3] = ["fss", "sbs", "iapp"];

/// A request to deploy one version of an application into a namespace
///
/// Every field defaults to empty so that a partially filled request still
/// decodes and can be reported on exhaustively by [`DeploymentRequest::validate`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeploymentRequest {
    /// Application name; also the name of every object created
    pub application: String,
    /// Image tag to deploy
    pub version: String,
    /// Registry environment resources are scoped to
    pub fasit_environment: String,
    /// Deprecated alias of `fasitEnvironment`
    pub environment: String,
    /// Network zone
    pub zone: String,
    /// Target namespace
    pub namespace: String,
    /// Location of the application manifest
    pub manifest_url: String,
    /// Deprecated alias of `manifestUrl`
    pub app_config_url: String,
    /// Registry username
    pub fasit_username: String,
    /// Registry password
    #[serde(skip_serializing_if = "String::is_empty")]
    pub fasit_password: String,
    /// Deprecated alias of `fasitUsername`
    pub username: String,
    /// Deprecated alias of `fasitPassword`
    #[serde(skip_serializing_if = "String::is_empty")]
    pub password: String,
}

/// Warning text for a deprecated request property
pub fn deprecation_warning(old: &str, new: &str) -> String {
    format!(
        "Deployment request property '{}' is deprecated. Use '{}' instead",
        old, new
    )
}

impl DeploymentRequest {
    /// Fold deprecated fields into their canonical counterparts.
    ///
    /// A non-empty deprecated field wins over the canonical one and yields a
    /// warning. The returned request has its deprecated fields cleared.
    pub fn merge_deprecated(mut self) -> (Self, Vec<String>) {
        let mut warnings = Vec::new();

        let fields = [
            (
                &mut self.environment,
                &mut self.fasit_environment,
                "environment",
                "fasitEnvironment",
            ),
            (
                &mut self.app_config_url,
                &mut self.manifest_url,
                "appConfigUrl",
                "manifestUrl",
            ),
            (
                &mut self.username,
                &mut self.fasit_username,
                "username",
                "fasitUsername",
            ),
            (
                &mut self.password,
                &mut self.fasit_password,
                "password",
                "fasitPassword",
            ),
        ];

        for (deprecated, canonical, old, new) in fields {
            if !deprecated.is_empty() {
                *canonical = std::mem::take(deprecated);
                warnings.push(deprecation_warning(old, new));
            }
        }

        (self, warnings)
    }

    /// Check every required field and collect all violations.
    ///
    /// Reads the canonical fields, so call this on a merged request. An
    /// empty result means the request is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        let required = [
            ("application", &self.application),
            ("version", &self.version),
            ("environment", &self.fasit_environment),
            ("zone", &self.zone),
            ("namespace", &self.namespace),
            ("username", &self.fasit_username),
            ("password", &self.fasit_password),
        ];

        for (field, value) in required {
            if value.is_empty() {
                errors.push(format!("{} is required and is empty", field));
            }
            if field == "zone" && !value.is_empty() && !ALLOWED_ZONES.contains(&value.as_str()) {
                errors.push("zone can only be fss, sbs or iapp".to_string());
            }
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_request() -> DeploymentRequest {
        DeploymentRequest {
            application: "appname".to_string(),
            version: "123".to_string(),
            fasit_environment: "t1".to_string(),
            zone: "fss".to_string(),
            namespace: "default".to_string(),
            manifest_url: "http://repo.com/app".to_string(),
            fasit_username: "user".to_string(),
            fasit_password: "password".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_request_has_no_errors() {
        assert!(valid_request().validate().is_empty());
    }

    /// Story: an empty request reports every missing field at once
    #[test]
    fn story_validation_is_exhaustive() {
        let errors = DeploymentRequest::default().validate();

        for field in [
            "application",
            "version",
            "environment",
            "zone",
            "namespace",
            "username",
            "password",
        ] {
            let expected = format!("{} is required and is empty", field);
            assert!(errors.contains(&expected), "missing: {}", expected);
        }
        assert_eq!(errors.len(), 7);
        assert!(!errors.contains(&"zone can only be fss, sbs or iapp".to_string()));
    }

    #[test]
    fn test_unknown_zone_is_rejected() {
        let request = DeploymentRequest {
            zone: "zone".to_string(),
            ..valid_request()
        };
        assert_eq!(
            request.validate(),
            vec!["zone can only be fss, sbs or iapp".to_string()]
        );
    }

    #[test]
    fn test_all_allowed_zones_pass() {
        for zone in ALLOWED_ZONES {
            let request = DeploymentRequest {
                zone: zone.to_string(),
                ..valid_request()
            };
            assert!(request.validate().is_empty(), "zone {} rejected", zone);
        }
    }

    /// Story: legacy clients keep working but are told to migrate
    #[test]
    fn story_deprecated_fields_override_and_warn() {
        let legacy = DeploymentRequest {
            fasit_environment: String::new(),
            environment: "q1".to_string(),
            fasit_username: String::new(),
            username: "legacy-user".to_string(),
            fasit_password: String::new(),
            password: "legacy-pass".to_string(),
            ..valid_request()
        };

        let (merged, warnings) = legacy.merge_deprecated();

        assert_eq!(merged.fasit_environment, "q1");
        assert_eq!(merged.fasit_username, "legacy-user");
        assert_eq!(merged.fasit_password, "legacy-pass");
        assert!(merged.environment.is_empty());
        assert_eq!(
            warnings,
            vec![
                "Deployment request property 'environment' is deprecated. Use 'fasitEnvironment' instead",
                "Deployment request property 'username' is deprecated. Use 'fasitUsername' instead",
                "Deployment request property 'password' is deprecated. Use 'fasitPassword' instead",
            ]
        );
        assert!(merged.validate().is_empty());
    }

    #[test]
    fn test_app_config_url_is_deprecated_alias() {
        let legacy = DeploymentRequest {
            manifest_url: String::new(),
            app_config_url: "http://repo.com/legacy".to_string(),
            ..valid_request()
        };

        let (merged, warnings) = legacy.merge_deprecated();
        assert_eq!(merged.manifest_url, "http://repo.com/legacy");
        assert_eq!(
            warnings,
            vec![deprecation_warning("appConfigUrl", "manifestUrl")]
        );
    }

    #[test]
    fn test_canonical_fields_produce_no_warnings() {
        let (merged, warnings) = valid_request().merge_deprecated();
        assert!(warnings.is_empty());
        assert_eq!(merged, valid_request());
    }

    #[test]
    fn test_decodes_camel_case_with_missing_fields() {
        let request: DeploymentRequest = serde_json::from_str(
            r#"{"application":"appname","fasitEnvironment":"t1","manifestUrl":"http://x/y"}"#,
        )
        .expect("request should decode");
        assert_eq!(request.application, "appname");
        assert_eq!(request.fasit_environment, "t1");
        assert_eq!(request.manifest_url, "http://x/y");
        assert!(request.version.is_empty());
    }
}
