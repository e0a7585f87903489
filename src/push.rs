// Push orchestration: resolve, check, build, push, report
//
// Steps run strictly in order and each one gates the next. The telemetry
// session is opened before anything else and closed on every return path.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::ModelRegistry;
use crate::error::CliError;
use crate::image::{
    push_id_annotation, BuildFlags, BuildInfo, BuildRequest, ImageBuilder, ImagePusher,
};
use crate::project::load_project;
use crate::registry::{classify, not_found_error, resolve, ResolvedImage};
use crate::settings::Settings;
use crate::telemetry::{PushLifecycle, PushSession, Telemetry};

const MISSING_IMAGE: &str = "To push images, you must either set the 'image' option in ssy.yaml \
     or pass an image name as an argument. For example, 'ssy push your-username/hotdog-detector'";

/// Options for one `ssy push`
#[derive(Debug, Clone, Default)]
pub struct PushOptions {
    /// Image from the command line; falls back to `image` in ssy.yaml
    pub image: Option<String>,
    pub config_file: String,
    pub build: BuildFlags,
    pub fast: bool,
    pub local_image: bool,
    pub pipeline: bool,
}

/// Result of a successful push
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushOutcome {
    pub image: String,
    pub ecosystem: Option<String>,
    /// Public model page, for first-party registries only
    pub model_url: Option<String>,
}

impl fmt::Display for PushOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Image '{}' pushed", self.image)?;
        if let (Some(ecosystem), Some(url)) = (&self.ecosystem, &self.model_url) {
            write!(f, "\n\nRun your model on {}:\n    {}", ecosystem, url)?;
        }
        Ok(())
    }
}

/// Generates the time-ordered build id attached to each push attempt
pub type BuildIdGenerator = fn() -> anyhow::Result<Uuid>;

fn new_build_id() -> anyhow::Result<Uuid> {
    Ok(Uuid::now_v7())
}

pub struct Pusher<'a> {
    settings: &'a Settings,
    registry: &'a dyn ModelRegistry,
    builder: &'a dyn ImageBuilder,
    pusher: &'a dyn ImagePusher,
    telemetry: &'a dyn Telemetry,
    build_ids: BuildIdGenerator,
}

impl<'a> Pusher<'a> {
    pub fn new(
        settings: &'a Settings,
        registry: &'a dyn ModelRegistry,
        builder: &'a dyn ImageBuilder,
        pusher: &'a dyn ImagePusher,
        telemetry: &'a dyn Telemetry,
    ) -> Self {
        Self {
            settings,
            registry,
            builder,
            pusher,
            telemetry,
            build_ids: new_build_id,
        }
    }

    pub fn with_build_ids(mut self, build_ids: BuildIdGenerator) -> Self {
        self.build_ids = build_ids;
        self
    }

    /// Build and push the project found from `work_dir`.
    pub async fn push(
        &self,
        options: &PushOptions,
        work_dir: &Path,
    ) -> Result<PushOutcome, CliError> {
        let mut session = PushSession::start(self.telemetry, options.local_image);
        let result = self.run(options, work_dir, session.lifecycle_mut()).await;
        session.close(&result);
        result
    }

    async fn run(
        &self,
        options: &PushOptions,
        work_dir: &Path,
        lifecycle: &mut PushLifecycle,
    ) -> Result<PushOutcome, CliError> {
        let project = load_project(&options.config_file, work_dir)?;

        let fast = options.fast || project.config.build.fast;
        lifecycle.fast = fast;
        lifecycle.pipeline = options.pipeline;

        let image_name = options
            .image
            .as_deref()
            .or(project.config.image.as_deref())
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| CliError::config(MISSING_IMAGE))?;

        let target = resolve(image_name, self.settings);
        debug!(
            "Image name: {}, full image name: {}",
            image_name, target.full_ref
        );

        if options.local_image && !target.is_first_party() {
            return Err(CliError::config(
                "Unable to push a local image model to a non Shengsuan host, \
                 please disable the local image flag before pushing to this host.",
            ));
        }

        if target.is_first_party() {
            self.verify_ownership(&target).await?;
        } else if !target.is_known_registry() {
            debug!(
                "{} is not a known registry, skipping ownership check",
                target.full_ref
            );
        }

        let mut annotations = BTreeMap::new();
        let build_id = match (self.build_ids)() {
            Ok(id) => {
                annotations.insert(push_id_annotation(), id.to_string());
                Some(id.to_string())
            }
            Err(e) => {
                warn!("Failed to create build ID, continuing without it: {:#}", e);
                None
            }
        };
        lifecycle.build_id = build_id.clone();

        let request = BuildRequest {
            project: &project,
            image: &target.full_ref,
            flags: &options.build,
            fast,
            annotations: &annotations,
            local_image: options.local_image,
            pipeline: options.pipeline,
        };

        let started = Instant::now();
        let built = self.builder.build(&request);
        let duration = started.elapsed();
        lifecycle.build_duration = Some(duration);
        built.map_err(CliError::Build)?;

        info!("Pushing image '{}'...", target.full_ref);
        if fast {
            info!("Fast push enabled.");
        }

        let build_info = BuildInfo {
            duration,
            build_id,
            pipeline: options.pipeline,
        };
        self.pusher
            .push(&target.full_ref, fast, &project, &build_info)
            .map_err(|failure| classify(failure, &target, self.settings))?;

        Ok(PushOutcome {
            image: target.full_ref.clone(),
            ecosystem: target.ecosystem().map(|e| e.to_string()),
            model_url: target.website_url(),
        })
    }

    async fn verify_ownership(&self, target: &ResolvedImage) -> Result<(), CliError> {
        let (owner, model) = target.owner_and_model()?;
        debug!("Verifying that {} owns model {}", owner, model);

        match self.registry.verify_ownership(&owner, &model).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(not_found_error(target, self.settings)),
            Err(source) => Err(CliError::Verification {
                image: target.full_ref.clone(),
                source,
            }),
        }
    }
}
