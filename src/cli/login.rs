//! `oic login` command implementation

use crate::config::{
    DEFAULT_CONTAINER_TOOL, DEFAULT_RESTRICTED_NAMESPACE, DEFAULT_RESTRICTED_REGISTRY,
    HARDENED_MARKER, SECRET_ENV,
};
use crate::log::{EventSink, RunLog};
use crate::registry::{CredentialStore, Credentials, RegistrySession, RestrictedRegistry};
use crate::tool::DockerCli;
use crate::{OicError, Result};
use clap::Args;
use std::path::PathBuf;

/// Restricted registry location and credentials
#[derive(Args, Debug, Clone)]
pub struct RegistryArgs {
    /// Restricted registry serving the hardened images
    #[arg(long, default_value = DEFAULT_RESTRICTED_REGISTRY)]
    pub registry: String,

    /// Namespace of the hardened images on the restricted registry
    #[arg(long, default_value = DEFAULT_RESTRICTED_NAMESPACE)]
    pub namespace: String,

    /// Registry username
    #[arg(short, long, env = "OIC_REGISTRY_USERNAME")]
    pub username: Option<String>,

    /// Registry secret (CLI secret or password)
    #[arg(long, env = SECRET_ENV, hide_env_values = true)]
    pub secret: Option<String>,

    /// Credential file (default: ~/.oic/auth.json)
    #[arg(long, env = "OIC_CREDENTIALS_FILE")]
    pub credentials_file: Option<PathBuf>,
}

impl RegistryArgs {
    pub fn target(&self) -> RestrictedRegistry {
        RestrictedRegistry {
            host: self.registry.clone(),
            namespace: self.namespace.clone(),
            marker: HARDENED_MARKER.to_string(),
        }
    }

    pub fn store(&self) -> Result<CredentialStore> {
        match self.credentials_file {
            Some(ref path) => Ok(CredentialStore::new(path)),
            None => CredentialStore::default_path(),
        }
    }

    /// Credentials given on the command line or in the environment
    pub fn given(&self) -> Option<Credentials> {
        match (&self.username, &self.secret) {
            (Some(username), Some(secret)) => Some(Credentials::new(username.clone(), secret.clone())),
            _ => None,
        }
    }

    /// Given credentials win; otherwise the stored entry for the registry
    pub fn credentials(&self, sink: &dyn EventSink) -> Result<Credentials> {
        if let Some(credentials) = self.given() {
            return Ok(credentials);
        }
        let store = self.store()?;
        match store.get(&self.registry)? {
            Some(credentials) => {
                sink.info(&format!(
                    "Using stored credentials for {} from {}.",
                    self.registry,
                    store.path().display()
                ));
                Ok(credentials)
            }
            None => Err(OicError::Auth(format!(
                "no credentials for {}; pass --username and --secret or run `oic login`",
                self.registry
            ))),
        }
    }
}

/// Arguments for the `login` command
#[derive(Args)]
pub struct LoginArgs {
    #[command(flatten)]
    pub registry: RegistryArgs,

    /// Container CLI used to log in
    #[arg(long, env = "OIC_CONTAINER_TOOL", default_value = DEFAULT_CONTAINER_TOOL)]
    pub container_tool: String,
}

/// Execute the `login` command
pub async fn execute(args: LoginArgs) -> anyhow::Result<()> {
    let log = RunLog::in_memory();
    let credentials = args.registry.given().ok_or_else(|| {
        anyhow::anyhow!("--username and --secret (or ${}) are required", SECRET_ENV)
    })?;

    let tool = DockerCli::new(&args.container_tool);
    RegistrySession::authenticate(&tool, args.registry.target(), &credentials, &log).await?;

    let store = args.registry.store()?;
    store.store(&args.registry.registry, &credentials)?;

    println!("Login Succeeded");
    println!("Credentials stored in {}", store.path().display());
    Ok(())
}
