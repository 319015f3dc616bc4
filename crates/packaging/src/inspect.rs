use bollard::models::ImageInspect;
use bollard::Docker;
use polio_models::PolioError;
use std::collections::{BTreeSet, HashMap};
use tracing::{info, instrument};

use crate::descriptor::RuntimeContract;

/// The parts of an image's configuration a container start depends on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageContract {
    pub working_dir: Option<String>,
    /// `KEY=value` entries, base image variables included.
    pub env: Vec<String>,
    /// Docker's `<port>/<proto>` form.
    pub exposed_ports: BTreeSet<String>,
    pub cmd: Vec<String>,
    pub labels: HashMap<String, String>,
}

impl From<&ImageInspect> for ImageContract {
    fn from(image: &ImageInspect) -> Self {
        let Some(config) = image.config.as_ref() else {
            return Self::default();
        };
        Self {
            working_dir: config.working_dir.clone().filter(|dir| !dir.is_empty()),
            env: config.env.clone().unwrap_or_default(),
            exposed_ports: config
                .exposed_ports
                .as_ref()
                .map(|ports| ports.keys().cloned().collect())
                .unwrap_or_default(),
            cmd: config.cmd.clone().unwrap_or_default(),
            labels: config.labels.clone().unwrap_or_default(),
        }
    }
}

impl ImageContract {
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .rev()
            .find_map(|entry| entry.strip_prefix(key)?.strip_prefix('='))
    }
}

impl RuntimeContract {
    /// Every difference between what the descriptor declares and what the
    /// image carries, or `Ok` when there are none.
    pub fn verify(&self, image: &ImageContract) -> Result<(), PolioError> {
        let mut mismatches = Vec::new();

        let working_dir = image.working_dir.as_deref().unwrap_or("/");
        if working_dir != self.working_dir {
            mismatches.push(format!(
                "working dir: expected {}, found {}",
                self.working_dir, working_dir
            ));
        }

        for (key, expected) in &self.env {
            match image.env_value(key) {
                Some(found) if found == expected => {}
                Some(found) => mismatches.push(format!("env {key}: expected {expected}, found {found}")),
                None => mismatches.push(format!("env {key}: missing")),
            }
        }

        for port in &self.exposed_ports {
            let port = format!("{port}/tcp");
            if !image.exposed_ports.contains(&port) {
                mismatches.push(format!("port {port}: not exposed"));
            }
        }

        if image.cmd != self.cmd {
            mismatches.push(format!("cmd: expected {:?}, found {:?}", self.cmd, image.cmd));
        }

        if mismatches.is_empty() {
            Ok(())
        } else {
            Err(PolioError::ImageContractMismatch { mismatches })
        }
    }
}

/// Reads image configuration through the Docker API.
pub struct ImageInspector {
    docker: Docker,
}

impl ImageInspector {
    pub fn connect() -> Result<Self, PolioError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| PolioError::DockerError { message: e.to_string() })?;
        Ok(Self { docker })
    }

    #[instrument(skip(self))]
    pub async fn inspect(&self, tag: &str) -> Result<ImageContract, PolioError> {
        let image = self
            .docker
            .inspect_image(tag)
            .await
            .map_err(|e| PolioError::DockerError { message: e.to_string() })?;
        let contract = ImageContract::from(&image);
        info!(tag, working_dir = ?contract.working_dir, ports = ?contract.exposed_ports, "Inspected image");
        Ok(contract)
    }
}
