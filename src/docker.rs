// Container CLI integration: registry login, image build and push

use anyhow::{bail, Context, Result};
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::{debug, info, warn};

use crate::image::{BuildInfo, BuildRequest, ImageBuilder, ImagePusher};
use crate::login::CredentialStore;
use crate::project::Project;
use crate::registry::PushFailure;
use crate::settings::LABEL_NAMESPACE;

/// Docker or Podman, driven through its command line
pub struct DockerCli {
    container_cli: String,
}

impl DockerCli {
    pub fn new(container_cli: impl Into<String>) -> Self {
        Self {
            container_cli: container_cli.into(),
        }
    }

    fn ensure_available(&self) -> Result<()> {
        if Command::new(&self.container_cli)
            .arg("--version")
            .output()
            .is_err()
        {
            bail!(
                "{} CLI not found. Please install Docker or Podman.",
                self.container_cli
            );
        }
        Ok(())
    }

    fn dockerfile_path(request: &BuildRequest<'_>) -> Result<PathBuf> {
        let path = match &request.flags.dockerfile {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => request.project.dir.join(path),
            None => request.project.dir.join("Dockerfile"),
        };
        if !path.is_file() {
            bail!(
                "Dockerfile '{}' not found. Pass --dockerfile to point at one.",
                path.display()
            );
        }
        Ok(path)
    }

    /// Assemble the `build` invocation for `request`
    pub(crate) fn build_command(&self, request: &BuildRequest<'_>) -> Result<Command> {
        let flags = request.flags;
        let ignored = [
            (flags.separate_weights, "--separate-weights"),
            (flags.strip, "--x-strip"),
            (flags.precompile, "--x-precompile"),
            (flags.schema_file.is_some(), "--openapi-schema"),
            (flags.use_cog_base_image.is_some(), "--use-cog-base-image"),
            (
                !flags.use_cuda_base_image.is_empty() && flags.use_cuda_base_image != "auto",
                "--use-cuda-base-image",
            ),
            (request.fast, "--x-fast"),
        ];
        for (set, flag) in ignored {
            if set {
                warn!("{} is ignored by the {} build backend", flag, self.container_cli);
            }
        }

        let dockerfile = Self::dockerfile_path(request)?;
        let config_json = serde_json::to_string(&request.project.config)
            .context("Failed to serialize project config")?;

        let mut cmd = Command::new(&self.container_cli);
        cmd.arg("build")
            .arg("-t")
            .arg(request.image)
            .arg("--platform")
            .arg("linux/amd64")
            .arg("--progress")
            .arg(flags.progress.as_str())
            .arg("-f")
            .arg(&dockerfile);

        if flags.no_cache {
            cmd.arg("--no-cache");
        }
        for secret in &flags.secrets {
            cmd.arg("--secret").arg(secret);
        }
        for (key, value) in request.annotations {
            cmd.arg("--label").arg(format!("{}={}", key, value));
        }
        cmd.arg("--label")
            .arg(format!("{}config={}", LABEL_NAMESPACE, config_json));
        if request.local_image {
            cmd.arg("--label").arg(format!("{}local_image=true", LABEL_NAMESPACE));
        }
        if request.pipeline {
            cmd.arg("--label").arg(format!("{}pipeline=true", LABEL_NAMESPACE));
        }

        cmd.arg(&request.project.dir);
        // --secret needs BuildKit
        cmd.env("DOCKER_BUILDKIT", "1");

        Ok(cmd)
    }
}

impl ImageBuilder for DockerCli {
    fn build(&self, request: &BuildRequest<'_>) -> Result<()> {
        self.ensure_available()?;
        info!(
            "Building image '{}' from '{}'",
            request.image,
            request.project.dir.display()
        );

        let mut cmd = self.build_command(request)?;
        debug!("Executing command: {:?}", cmd);

        let status = cmd
            .status()
            .with_context(|| format!("Failed to execute {} build", self.container_cli))?;

        if !status.success() {
            bail!("{} build failed with status: {}", self.container_cli, status);
        }

        Ok(())
    }
}

impl ImagePusher for DockerCli {
    fn push(
        &self,
        image: &str,
        fast: bool,
        _project: &Project,
        info: &BuildInfo,
    ) -> Result<(), PushFailure> {
        if fast {
            warn!(
                "Fast push is not supported by {}; pushing all layers",
                self.container_cli
            );
        }
        debug!(
            build_id = info.build_id.as_deref().unwrap_or("-"),
            build_ms = info.duration.as_millis() as u64,
            pipeline = info.pipeline,
            "Pushing image to registry: {}",
            image
        );

        let mut cmd = Command::new(&self.container_cli);
        cmd.arg("push")
            .arg(image)
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped());

        debug!("Executing command: {:?}", cmd);

        let output = cmd.output().map_err(|e| {
            PushFailure::Transport(
                anyhow::Error::new(e)
                    .context(format!("Failed to execute {} push", self.container_cli)),
            )
        })?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        eprint!("{}", stderr);
        if stderr.trim().is_empty() {
            return Err(PushFailure::Other(anyhow::anyhow!(
                "{} push failed with status: {}",
                self.container_cli,
                output.status
            )));
        }
        Err(PushFailure::from_output(&stderr))
    }
}

impl CredentialStore for DockerCli {
    fn save_login_token(&self, registry_host: &str, identity: &str, secret: &str) -> Result<()> {
        debug!(
            "Executing: {} login {} --username {} --password-stdin",
            self.container_cli, registry_host, identity
        );

        let status = Command::new(&self.container_cli)
            .arg("login")
            .arg(registry_host)
            .arg("--username")
            .arg(identity)
            .arg("--password-stdin")
            .stdin(Stdio::piped())
            .spawn()
            .and_then(|mut child| {
                if let Some(mut stdin) = child.stdin.take() {
                    stdin.write_all(secret.as_bytes())?;
                }
                child.wait()
            })
            .with_context(|| format!("Failed to execute {} login", self.container_cli))?;

        if !status.success() {
            bail!("{} login failed with status: {}", self.container_cli, status);
        }

        Ok(())
    }
}
