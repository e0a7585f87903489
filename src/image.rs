// Build and push collaborators
//
// The push orchestrator only sequences these calls; how an image is built or
// transferred is up to the implementation (see `docker.rs`).

use clap::ValueEnum;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::project::Project;
use crate::registry::PushFailure;
use crate::settings::LABEL_NAMESPACE;

/// Annotation carrying the per-push build id
pub fn push_id_annotation() -> String {
    format!("{}push_id", LABEL_NAMESPACE)
}

/// Build progress output mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ProgressOutput {
    #[default]
    Auto,
    Plain,
    Tty,
}

impl ProgressOutput {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressOutput::Auto => "auto",
            ProgressOutput::Plain => "plain",
            ProgressOutput::Tty => "tty",
        }
    }
}

/// Build options taken from the command line
#[derive(Debug, Clone, Default)]
pub struct BuildFlags {
    /// Secrets in `id=<name>,src=<path>` form
    pub secrets: Vec<String>,
    pub no_cache: bool,
    pub separate_weights: bool,
    /// `auto`, `true` or `false`
    pub use_cuda_base_image: String,
    pub progress: ProgressOutput,
    pub schema_file: Option<PathBuf>,
    pub dockerfile: Option<PathBuf>,
    /// `None` when the flag was not given on the command line
    pub use_cog_base_image: Option<bool>,
    pub strip: bool,
    pub precompile: bool,
}

/// Everything a builder needs for one image
#[derive(Debug)]
pub struct BuildRequest<'a> {
    pub project: &'a Project,
    pub image: &'a str,
    pub flags: &'a BuildFlags,
    pub fast: bool,
    pub annotations: &'a BTreeMap<String, String>,
    pub local_image: bool,
    pub pipeline: bool,
}

/// Metadata from the build step handed to the push step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildInfo {
    pub duration: Duration,
    pub build_id: Option<String>,
    pub pipeline: bool,
}

pub trait ImageBuilder {
    fn build(&self, request: &BuildRequest<'_>) -> anyhow::Result<()>;
}

pub trait ImagePusher {
    fn push(
        &self,
        image: &str,
        fast: bool,
        project: &Project,
        info: &BuildInfo,
    ) -> Result<(), PushFailure>;
}
