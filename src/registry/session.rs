//! Authenticated session against the restricted registry

use crate::config::{DEFAULT_RESTRICTED_NAMESPACE, DEFAULT_RESTRICTED_REGISTRY, HARDENED_MARKER};
use crate::image::ImageReference;
use crate::log::EventSink;
use crate::registry::credentials::Credentials;
use crate::tool::ContainerTool;
use crate::{OicError, Result};

/// Where hardened images live and which images count as hardened
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestrictedRegistry {
    /// Registry host
    pub host: String,
    /// Namespace prefix substituted for the original one
    pub namespace: String,
    /// Images whose `repository:tag` contains this marker are pulled from here
    pub marker: String,
}

impl Default for RestrictedRegistry {
    fn default() -> Self {
        Self {
            host: DEFAULT_RESTRICTED_REGISTRY.to_string(),
            namespace: DEFAULT_RESTRICTED_NAMESPACE.to_string(),
            marker: HARDENED_MARKER.to_string(),
        }
    }
}

/// Logged-in session; rewrites hardened image references
#[derive(Debug, Clone)]
pub struct RegistrySession {
    target: RestrictedRegistry,
    username: String,
}

impl RegistrySession {
    /// Log in through the container tool. Failure is fatal for the run.
    pub async fn authenticate(
        tool: &dyn ContainerTool,
        target: RestrictedRegistry,
        credentials: &Credentials,
        sink: &dyn EventSink,
    ) -> Result<Self> {
        if credentials.username.trim().is_empty() || credentials.secret.is_empty() {
            let err = OicError::Auth(format!("username and secret are required for {}", target.host));
            sink.error(&err.to_string());
            return Err(err);
        }

        sink.info(&format!("Authenticating to {} as {}.", target.host, credentials.username));
        if let Err(e) = tool
            .login(&target.host, &credentials.username, &credentials.secret)
            .await
        {
            let err = OicError::Auth(format!("login to {} failed: {}", target.host, e));
            sink.error(&err.to_string());
            return Err(err);
        }
        sink.info(&format!("Successfully logged into {}.", target.host));

        Ok(Self {
            target,
            username: credentials.username.clone(),
        })
    }

    pub fn target(&self) -> &RestrictedRegistry {
        &self.target
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Only hardened-variant images are served by the restricted registry
    pub fn applies_to(&self, image: &ImageReference) -> bool {
        !self.target.marker.is_empty() && image.name_and_tag().contains(&self.target.marker)
    }

    /// Same repository and tag under the restricted registry's host and namespace
    pub fn rewrite(&self, image: &ImageReference) -> ImageReference {
        image.relocated(&self.target.host, &self.target.namespace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::RunLog;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingTool {
        reject: bool,
        logins: Mutex<Vec<(String, String, String)>>,
    }

    #[async_trait]
    impl ContainerTool for RecordingTool {
        fn name(&self) -> &str {
            "fake"
        }

        async fn pull(&self, _image: &ImageReference) -> Result<()> {
            Ok(())
        }

        async fn save(&self, _image: &ImageReference, _dest: &Path) -> Result<()> {
            Ok(())
        }

        async fn login(&self, registry: &str, username: &str, secret: &str) -> Result<()> {
            self.logins.lock().unwrap().push((
                registry.to_string(),
                username.to_string(),
                secret.to_string(),
            ));
            if self.reject {
                Err(OicError::Tool {
                    program: "fake".to_string(),
                    command: "login".to_string(),
                    code: Some(1),
                    stderr: "unauthorized".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_authenticate_and_rewrite() {
        let log = RunLog::in_memory();
        let tool = RecordingTool::default();
        let session = RegistrySession::authenticate(
            &tool,
            RestrictedRegistry::default(),
            &Credentials::new("user", "secret"),
            &log,
        )
        .await
        .unwrap();

        assert_eq!(
            tool.logins.lock().unwrap().as_slice(),
            &[(
                "registry1.dso.mil".to_string(),
                "user".to_string(),
                "secret".to_string()
            )]
        );
        assert_eq!(session.username(), "user");

        let image = ImageReference::parse("blackducksoftware/blackduck-webapp:2024.7.0-ubi").unwrap();
        assert!(session.applies_to(&image));
        assert_eq!(
            session.rewrite(&image).to_string(),
            "registry1.dso.mil/ironbank/synopsys/blackduck/blackduck-webapp:2024.7.0-ubi"
        );

        let core = ImageReference::parse("blackducksoftware/blackduck-webapp:2024.7.0").unwrap();
        assert!(!session.applies_to(&core));
    }

    #[tokio::test]
    async fn test_rejected_login_is_auth_error() {
        let log = RunLog::in_memory();
        let tool = RecordingTool {
            reject: true,
            ..Default::default()
        };
        let err = RegistrySession::authenticate(
            &tool,
            RestrictedRegistry::default(),
            &Credentials::new("user", "wrong"),
            &log,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, OicError::Auth(_)));
        assert!(log.entries().iter().any(|e| e.message.contains("login to registry1.dso.mil failed")));
    }

    #[tokio::test]
    async fn test_empty_credentials_skip_login() {
        let log = RunLog::in_memory();
        let tool = RecordingTool::default();
        let err = RegistrySession::authenticate(
            &tool,
            RestrictedRegistry::default(),
            &Credentials::new("", ""),
            &log,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, OicError::Auth(_)));
        assert!(tool.logins.lock().unwrap().is_empty());
    }
}
