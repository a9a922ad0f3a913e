//! On-disk layout of a run

pub mod paths;

pub use paths::WorkPaths;
