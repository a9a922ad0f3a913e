//! Presence checks for the external tools a run depends on

use crate::log::EventSink;
use crate::{OicError, Result};
use std::process::Stdio;
use tokio::process::Command;

/// External tool a run may need
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tool {
    /// Container CLI (docker, podman, ...)
    Container(String),
    /// git, for manifest checkouts
    Git,
    /// 7-Zip, when selected as the archive tool
    SevenZip,
}

impl Tool {
    pub fn program(&self) -> &str {
        match self {
            Self::Container(program) => program,
            Self::Git => "git",
            Self::SevenZip => "7z",
        }
    }

    fn probe_args(&self) -> &'static [&'static str] {
        match self {
            // 7z has no --version; without arguments it prints its banner
            Self::SevenZip => &[],
            _ => &["--version"],
        }
    }

    /// Text the probe output must contain, when the exit status is not enough
    fn banner(&self) -> Option<&'static str> {
        match self {
            Self::SevenZip => Some("7-Zip"),
            _ => None,
        }
    }
}

/// Result of probing a set of tools
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolReport {
    pub available: Vec<String>,
    pub missing: Vec<String>,
}

impl ToolReport {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    /// Fail with every missing tool named
    pub fn require(&self) -> Result<()> {
        if self.is_complete() {
            Ok(())
        } else {
            Err(OicError::MissingTool(self.missing.join(", ")))
        }
    }
}

/// Check whether a single tool can be run
pub async fn probe(tool: &Tool) -> bool {
    let output = Command::new(tool.program())
        .args(tool.probe_args())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await;

    match output {
        Ok(output) => match tool.banner() {
            Some(banner) => {
                String::from_utf8_lossy(&output.stdout).contains(banner)
                    || String::from_utf8_lossy(&output.stderr).contains(banner)
            }
            None => output.status.success(),
        },
        Err(_) => false,
    }
}

/// Probe every tool in order, logging each result
pub async fn check(tools: &[Tool], sink: &dyn EventSink) -> ToolReport {
    let mut report = ToolReport::default();
    for tool in tools {
        let program = tool.program().to_string();
        if probe(tool).await {
            sink.info(&format!("{} is installed.", program));
            report.available.push(program);
        } else {
            report.missing.push(program);
        }
    }

    if report.is_complete() {
        sink.info("All required command-line tools are installed.");
    } else {
        sink.error(&format!(
            "Missing required tools: {}. Please install them and try again.",
            report.missing.join(", ")
        ));
    }
    report
}
