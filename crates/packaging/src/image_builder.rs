use polio_models::PolioError;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{error, info, instrument, warn};

use crate::context::BuildContext;
use crate::descriptor::ContainerDescriptor;

pub const CONTEXT_LABEL: &str = "polio.context-sha256";
pub const DESCRIPTOR_LABEL: &str = "polio.descriptor";

#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    pub no_cache: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltImage {
    pub tag: String,
    pub context_fingerprint: String,
    pub missing_entrypoint: Option<String>,
}

/// Runs `docker build` for a descriptor. Any failed step aborts the build;
/// nothing is retried.
pub struct ImageBuilder {
    docker_bin: String,
}

impl Default for ImageBuilder {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl ImageBuilder {
    pub fn new(docker_bin: impl Into<String>) -> Self {
        Self { docker_bin: docker_bin.into() }
    }

    #[instrument(skip(self, descriptor, context), fields(descriptor_name = %descriptor.name, context_root = %context.root().display()))]
    pub async fn build_image(
        &self,
        descriptor: &ContainerDescriptor,
        context: &BuildContext,
        tag: &str,
        options: &BuildOptions,
    ) -> Result<BuiltImage, PolioError> {
        descriptor.validate()?;
        let report = descriptor.validate_context(context)?;
        if let Some(entrypoint) = &report.missing_entrypoint {
            warn!("{} is missing from the build context; the container will exit at start", entrypoint);
        }

        // The Dockerfile lives outside the context so writing it does not
        // change what COPY sees.
        let temp_dir = tempfile::tempdir().map_err(|e| PolioError::InternalError { reason: e.to_string() })?;
        let dockerfile_path = temp_dir.path().join("Dockerfile");
        tokio::fs::write(&dockerfile_path, descriptor.render())
            .await
            .map_err(|e| PolioError::InternalError { reason: e.to_string() })?;

        info!("Building Docker image: {}", tag);
        info!("Build context: {:?} ({} files, {})", context.root(), report.files, report.fingerprint);

        let mut command = Command::new(&self.docker_bin);
        command
            .arg("build")
            .arg("-t")
            .arg(tag)
            .arg("-f")
            .arg(&dockerfile_path)
            .arg("--label")
            .arg(format!("{}={}", CONTEXT_LABEL, report.fingerprint))
            .arg("--label")
            .arg(format!("{}={}", DESCRIPTOR_LABEL, descriptor.name));
        if options.no_cache {
            command.arg("--no-cache");
        }
        command.arg(context.root());

        let build_result = command
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| PolioError::DockerError { message: e.to_string() })?;

        if !build_result.status.success() {
            let stdout = String::from_utf8_lossy(&build_result.stdout);
            let stderr = String::from_utf8_lossy(&build_result.stderr);
            error!("Docker build failed - stdout: {}", stdout);
            error!("Docker build failed - stderr: {}", stderr);
            return Err(PolioError::DockerError {
                message: format!("Docker build failed: {}", stderr.trim()),
            });
        }

        info!("Built Docker image: {}", tag);
        Ok(BuiltImage {
            tag: tag.to_string(),
            context_fingerprint: report.fingerprint,
            missing_entrypoint: report.missing_entrypoint,
        })
    }
}
