//! Container backend (§4.7): shells out to a container runtime binary
//! (`docker`/`podman`-compatible CLI) rather than linking against a client
//! library, mirroring how the rest of this workspace treats external
//! collaborators (the snapshot tool, package installers) as subprocesses.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use hopbox_proto::ServiceDef;

use crate::error::ServiceError;

pub struct ContainerBackend {
    /// Name of the container runtime binary (`docker`, `podman`, ...).
    runtime: String,
}

impl ContainerBackend {
    pub fn new(runtime: impl Into<String>) -> Self {
        Self {
            runtime: runtime.into(),
        }
    }
}

impl Default for ContainerBackend {
    fn default() -> Self {
        Self::new("docker")
    }
}

#[async_trait]
impl super::ServiceBackend for ContainerBackend {
    async fn start(&self, def: &ServiceDef) -> Result<(), ServiceError> {
        let mut cmd = Command::new(&self.runtime);
        cmd.args(["run", "--rm", "-d", "--name", &def.name]);

        for mapping in &def.ports {
            let container_port = mapping.container.unwrap_or(mapping.host);
            cmd.arg("-p").arg(format!("{}:{}", mapping.host, container_port));
        }
        for path in &def.data_paths {
            cmd.arg("-v").arg(path);
        }
        for (key, value) in &def.env {
            cmd.arg("-e").arg(format!("{key}={value}"));
        }
        cmd.arg(&def.image_or_command);

        debug!(service = %def.name, runtime = %self.runtime, "starting container service");
        let output = cmd.output().await?;
        if !output.status.success() {
            return Err(ServiceError::StartFailed(
                def.name.clone(),
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(())
    }

    async fn stop(&self, name: &str) -> Result<(), ServiceError> {
        let output = Command::new(&self.runtime)
            .args(["rm", "-f", name])
            .output()
            .await?;
        if !output.status.success() {
            warn!(
                service = %name,
                stderr = %String::from_utf8_lossy(&output.stderr),
                "container stop reported a non-zero exit (treated as best-effort)"
            );
        }
        Ok(())
    }

    async fn is_running(&self, name: &str) -> bool {
        let output = Command::new(&self.runtime)
            .args(["ps", "--filter", &format!("name=^{name}$"), "--format", "{{.Names}}"])
            .output()
            .await;
        match output {
            Ok(out) => String::from_utf8_lossy(&out.stdout)
                .lines()
                .any(|line| line.trim() == name),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_docker() {
        let backend = ContainerBackend::default();
        assert_eq!(backend.runtime, "docker");
    }
}
