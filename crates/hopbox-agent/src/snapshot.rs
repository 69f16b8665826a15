//! `snap.create` / `snap.restore` / `snap.list` (§4.6): delegates to an
//! external backup tool. Snapshot tool invocation is an out-of-core
//! collaborator (§1) — this module wraps whatever binary the manifest's
//! `backup_target` names, shelling out the same way the container backend
//! shells out to a runtime binary.

use tokio::process::Command;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("failed to spawn {0}: {1}")]
    Spawn(String, std::io::Error),
    #[error("{0} {1} failed: {2}")]
    CommandFailed(String, String, String),
}

pub struct SnapshotTool {
    /// Path/name of the external backup binary.
    binary: String,
}

impl SnapshotTool {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }

    pub async fn create(&self, target: &str, name: &str, data_paths: &[String]) -> Result<String, SnapshotError> {
        let mut args = vec!["create".to_string(), "--target".to_string(), target.to_string(), "--name".to_string(), name.to_string()];
        for path in data_paths {
            args.push("--path".to_string());
            args.push(path.clone());
        }
        self.run(&args).await
    }

    pub async fn restore(&self, target: &str, name: &str) -> Result<String, SnapshotError> {
        let args = vec!["restore".to_string(), "--target".to_string(), target.to_string(), "--name".to_string(), name.to_string()];
        self.run(&args).await
    }

    pub async fn list(&self, target: &str) -> Result<String, SnapshotError> {
        let args = vec!["list".to_string(), "--target".to_string(), target.to_string()];
        self.run(&args).await
    }

    async fn run(&self, args: &[String]) -> Result<String, SnapshotError> {
        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .map_err(|e| SnapshotError::Spawn(self.binary.clone(), e))?;

        if !output.status.success() {
            return Err(SnapshotError::CommandFailed(
                self.binary.clone(),
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builds_create_args_with_every_data_path() {
        // `echo` stands in for the real backup binary; it just echoes argv
        // back so the test can assert on what would have been passed.
        let tool = SnapshotTool::new("echo");
        let out = tool
            .create("s3://bucket", "nightly", &["/data/a".to_string(), "/data/b".to_string()])
            .await
            .unwrap();
        assert!(out.contains("--target s3://bucket"));
        assert!(out.contains("--name nightly"));
        assert!(out.contains("--path /data/a"));
        assert!(out.contains("--path /data/b"));
    }

    #[tokio::test]
    async fn nonzero_exit_surfaces_stderr() {
        let tool = SnapshotTool::new("false");
        let err = tool.list("s3://bucket").await.unwrap_err();
        assert!(matches!(err, SnapshotError::CommandFailed(_, _, _)));
    }
}
