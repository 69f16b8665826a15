//! Shared-mutable configuration (§9): the services map, scripts map, and
//! backup-target string are read by the RPC dispatcher on every request and
//! replaced wholesale by `workspace.sync`. Modeled as a single immutable
//! [`Workspace`] behind an `Arc`, swapped under a writer lock — readers
//! clone the `Arc`, never the fields, so an in-flight RPC keeps the
//! manifest (and service manager) it looked up even if a sync lands
//! mid-request.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::RwLock;

use hopbox_proto::Manifest;

use crate::supervisor::ServiceSupervisor;

/// One atomically-swapped snapshot of "everything workspace.sync replaces".
pub struct Workspace {
    pub manifest: Arc<Manifest>,
    /// `None` until a manifest declaring at least the intent to run
    /// services has been synced — before that, `services.*` RPCs 503.
    pub supervisor: Option<Arc<ServiceSupervisor>>,
}

pub struct WorkspaceStore {
    current: RwLock<Arc<Workspace>>,
    log_dir: PathBuf,
    container_runtime: String,
}

impl WorkspaceStore {
    pub fn new(manifest: Manifest, log_dir: PathBuf, container_runtime: String) -> Self {
        let supervisor = if manifest.services.is_empty() {
            None
        } else {
            Some(Arc::new(ServiceSupervisor::new(&manifest, log_dir.clone(), &container_runtime)))
        };
        let workspace = Workspace {
            manifest: Arc::new(manifest),
            supervisor,
        };
        Self {
            current: RwLock::new(Arc::new(workspace)),
            log_dir,
            container_runtime,
        }
    }

    pub async fn current(&self) -> Arc<Workspace> {
        self.current.read().await.clone()
    }

    /// Builds a new supervisor from `manifest` and swaps the whole snapshot
    /// in one write-lock acquisition. The manifest has already been parsed
    /// successfully by the caller — a parse failure never reaches here, so
    /// the prior snapshot is untouched (§4.6, §8 property 8).
    pub async fn replace(&self, manifest: Manifest) -> Arc<Workspace> {
        let supervisor = Arc::new(ServiceSupervisor::new(&manifest, self.log_dir.clone(), &self.container_runtime));
        let workspace = Arc::new(Workspace {
            manifest: Arc::new(manifest),
            supervisor: Some(supervisor),
        });
        *self.current.write().await = workspace.clone();
        workspace
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hopbox_proto::manifest::{BackendKind, ServiceDef};
    use std::collections::HashMap;

    #[tokio::test]
    async fn readers_keep_old_snapshot_across_a_replace() {
        let store = WorkspaceStore::new(Manifest::default(), std::env::temp_dir(), "docker".to_string());
        let before = store.current().await;
        assert!(before.supervisor.is_none());

        let mut replacement = Manifest::default();
        replacement.backup_target = Some("s3://bucket".to_string());
        replacement.services.push(ServiceDef {
            name: "db".to_string(),
            backend: BackendKind::Native,
            image_or_command: "true".to_string(),
            env: HashMap::new(),
            ports: vec![],
            data_paths: vec![],
            depends_on: vec![],
            health: None,
        });
        store.replace(replacement).await;

        assert!(before.manifest.backup_target.is_none());
        let after = store.current().await;
        assert_eq!(after.manifest.backup_target.as_deref(), Some("s3://bucket"));
        assert!(after.supervisor.is_some());
    }

    #[tokio::test]
    async fn empty_manifest_starts_with_no_service_manager() {
        let store = WorkspaceStore::new(Manifest::default(), std::env::temp_dir(), "docker".to_string());
        assert!(store.current().await.supervisor.is_none());
    }
}
