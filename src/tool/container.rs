//! Container CLI adapter (docker, podman, ...)

use crate::image::ImageReference;
use crate::{OicError, Result};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Operations the pipeline needs from a container tool
#[async_trait]
pub trait ContainerTool: Send + Sync {
    /// Program name, for messages
    fn name(&self) -> &str;

    /// Pull an image into the local image store
    async fn pull(&self, image: &ImageReference) -> Result<()>;

    /// Serialize a local image to a tar archive at `dest`
    async fn save(&self, image: &ImageReference, dest: &Path) -> Result<()>;

    /// Log in to a registry; the secret never appears on the command line
    async fn login(&self, registry: &str, username: &str, secret: &str) -> Result<()>;
}

/// Docker-compatible command line client
#[derive(Debug, Clone)]
pub struct DockerCli {
    program: String,
}

impl DockerCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Run the program, feeding `stdin` if given, and fail on a non-zero exit
    async fn run(&self, args: &[&str], stdin: Option<&str>) -> Result<()> {
        let mut cmd = Command::new(&self.program);
        cmd.args(args);
        cmd.stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                OicError::MissingTool(self.program.clone())
            } else {
                OicError::Io(e)
            }
        })?;

        if let Some(input) = stdin {
            if let Some(mut pipe) = child.stdin.take() {
                let written = async {
                    pipe.write_all(input.as_bytes()).await?;
                    pipe.write_all(b"\n").await
                }
                .await;
                // A child that exits without reading closes the pipe early;
                // its exit status decides the outcome.
                if let Err(e) = written {
                    if e.kind() != std::io::ErrorKind::BrokenPipe {
                        return Err(e.into());
                    }
                }
            }
        }

        let output = child.wait_with_output().await?;
        if output.status.success() {
            return Ok(());
        }

        Err(OicError::Tool {
            program: self.program.clone(),
            command: args.join(" "),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_CONTAINER_TOOL)
    }
}

#[async_trait]
impl ContainerTool for DockerCli {
    fn name(&self) -> &str {
        &self.program
    }

    async fn pull(&self, image: &ImageReference) -> Result<()> {
        let name = image.full_name();
        self.run(&["image", "pull", &name], None).await
    }

    async fn save(&self, image: &ImageReference, dest: &Path) -> Result<()> {
        let name = image.full_name();
        let dest = dest.to_string_lossy();
        self.run(&["image", "save", &name, "-o", &dest], None).await
    }

    async fn login(&self, registry: &str, username: &str, secret: &str) -> Result<()> {
        self.run(
            &["login", "-u", username, "--password-stdin", registry],
            Some(secret),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_program_is_reported() {
        let tool = DockerCli::new("oic-test-no-such-container-tool");
        let image = ImageReference::parse("alpine:3.18").unwrap();
        let err = tool.pull(&image).await.unwrap_err();
        assert!(matches!(err, OicError::MissingTool(ref p) if p == "oic-test-no-such-container-tool"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_is_a_tool_error() {
        let tool = DockerCli::new("false");
        let image = ImageReference::parse("alpine:3.18").unwrap();
        match tool.pull(&image).await {
            Err(OicError::Tool { program, command, code, .. }) => {
                assert_eq!(program, "false");
                assert_eq!(command, "image pull alpine:3.18");
                assert_eq!(code, Some(1));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_secret_goes_through_stdin() {
        // `true` ignores its arguments and stdin, so a closed pipe must not fail
        let tool = DockerCli::new("true");
        tool.login("registry.example.com", "user", "s3cret")
            .await
            .unwrap();
    }
}
