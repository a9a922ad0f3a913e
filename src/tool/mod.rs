//! External tools: the container CLI and presence checks

pub mod container;
pub mod probe;

pub use container::{ContainerTool, DockerCli};
pub use probe::{Tool, ToolReport};
