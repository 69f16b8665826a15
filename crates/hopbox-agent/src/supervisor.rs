//! Service supervisor (§4.7): owns the registered services, computes a
//! topological start order over the dependency DAG, and drives each
//! backend's lifecycle plus its declared health probe.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::info;

use hopbox_proto::manifest::{BackendKind, HealthProbe};
use hopbox_proto::{Manifest, ServiceDef, ServiceRunState, ServiceStatus};

use crate::backend::{ContainerBackend, NativeBackend, ServiceBackend};
use crate::error::ServiceError;

pub struct ServiceSupervisor {
    services: HashMap<String, ServiceDef>,
    container_backend: Arc<ContainerBackend>,
    native_backend: Arc<NativeBackend>,
    http_client: reqwest::Client,
    state: Mutex<HashMap<String, ServiceRunState>>,
}

impl ServiceSupervisor {
    pub fn new(manifest: &Manifest, log_dir: std::path::PathBuf, container_runtime: &str) -> Self {
        let services = manifest
            .services
            .iter()
            .map(|s| (s.name.clone(), s.clone()))
            .collect();
        let state = manifest
            .services
            .iter()
            .map(|s| (s.name.clone(), ServiceRunState::Stopped))
            .collect();
        Self {
            services,
            container_backend: Arc::new(ContainerBackend::new(container_runtime)),
            native_backend: Arc::new(NativeBackend::new(log_dir)),
            http_client: reqwest::Client::new(),
            state: Mutex::new(state),
        }
    }

    fn backend_for(&self, def: &ServiceDef) -> Arc<dyn ServiceBackend> {
        match def.backend {
            BackendKind::Container => self.container_backend.clone(),
            BackendKind::Native => self.native_backend.clone(),
        }
    }

    /// Kahn's algorithm over `depends_on`, ties broken lexicographically for
    /// determinism (§4.7, §8 property 7).
    pub fn topological_order(&self) -> Result<Vec<String>, ServiceError> {
        let mut indegree: HashMap<&str, usize> = HashMap::new();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

        for def in self.services.values() {
            indegree.entry(&def.name).or_insert(0);
            for dep in &def.depends_on {
                if !self.services.contains_key(dep) {
                    return Err(ServiceError::UnknownDependency(dep.clone(), def.name.clone()));
                }
                *indegree.entry(&def.name).or_insert(0) += 1;
                dependents.entry(dep).or_default().push(&def.name);
            }
        }

        let mut ready: Vec<&str> = indegree
            .iter()
            .filter(|(_, &count)| count == 0)
            .map(|(&name, _)| name)
            .collect();
        ready.sort_unstable();
        let mut queue: VecDeque<&str> = ready.into();

        let mut order = Vec::with_capacity(self.services.len());
        while let Some(name) = queue.pop_front() {
            order.push(name.to_string());
            if let Some(children) = dependents.get(name) {
                let mut newly_ready = Vec::new();
                for &child in children {
                    let entry = indegree.get_mut(child).unwrap();
                    *entry -= 1;
                    if *entry == 0 {
                        newly_ready.push(child);
                    }
                }
                newly_ready.sort_unstable();
                for child in newly_ready {
                    // Insertion position doesn't need to preserve global sort
                    // order across batches; only the initial ready set and
                    // each batch are sorted, which is sufficient for a
                    // deterministic order given a fixed dependency graph.
                    queue.push_back(child);
                }
            }
        }

        if order.len() != self.services.len() {
            let stuck: Vec<String> = self
                .services
                .keys()
                .filter(|name| !order.contains(name))
                .cloned()
                .collect();
            return Err(ServiceError::Cycle(stuck));
        }

        Ok(order)
    }

    /// Starts every service in dependency order. Aborts on the first
    /// failure; later services are never attempted (§4.7, §7).
    pub async fn start_all(&self) -> Result<(), ServiceError> {
        let order = self.topological_order()?;
        for name in order {
            self.start_one(&name).await?;
        }
        Ok(())
    }

    async fn start_one(&self, name: &str) -> Result<(), ServiceError> {
        let def = self.services.get(name).expect("name came from topological_order");
        let backend = self.backend_for(def);

        if backend.is_running(name).await {
            return Ok(());
        }

        self.set_state(name, ServiceRunState::Starting).await;
        if let Err(e) = backend.start(def).await {
            self.set_state(name, ServiceRunState::Failed).await;
            return Err(e);
        }

        if let Some(probe) = &def.health {
            if let Err(e) = self.wait_healthy(name, probe).await {
                self.set_state(name, ServiceRunState::Failed).await;
                return Err(e);
            }
        }

        self.set_state(name, ServiceRunState::Running).await;
        info!(service = name, "service started");
        Ok(())
    }

    async fn wait_healthy(&self, name: &str, probe: &HealthProbe) -> Result<(), ServiceError> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(probe.timeout_secs);
        let mut interval = tokio::time::interval(Duration::from_secs(probe.interval_secs));
        loop {
            interval.tick().await;
            let result = self
                .http_client
                .get(&probe.url)
                .timeout(Duration::from_secs(probe.request_timeout_secs))
                .send()
                .await;
            if let Ok(resp) = result {
                if resp.status().is_success() {
                    return Ok(());
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(ServiceError::HealthTimeout(name.to_string(), probe.timeout_secs));
            }
        }
    }

    pub async fn restart(&self, name: &str) -> Result<(), ServiceError> {
        let def = self
            .services
            .get(name)
            .ok_or_else(|| ServiceError::UnknownDependency(name.to_string(), String::new()))?;
        let backend = self.backend_for(def);
        backend.stop(name).await?;
        self.start_one(name).await
    }

    pub async fn stop(&self, name: &str) -> Result<(), ServiceError> {
        let def = self
            .services
            .get(name)
            .ok_or_else(|| ServiceError::UnknownDependency(name.to_string(), String::new()))?;
        let backend = self.backend_for(def);
        backend.stop(name).await?;
        self.set_state(name, ServiceRunState::Stopped).await;
        Ok(())
    }

    pub async fn is_running(&self, name: &str) -> bool {
        match self.services.get(name) {
            Some(def) => self.backend_for(def).is_running(name).await,
            None => false,
        }
    }

    pub async fn list(&self) -> Vec<ServiceStatus> {
        let state = self.state.lock().await;
        let mut names: Vec<&String> = self.services.keys().collect();
        names.sort();
        let mut out = Vec::with_capacity(names.len());
        for name in names {
            let restart_count = match self.services[name].backend {
                BackendKind::Native => self.native_backend.restart_count(name).await,
                BackendKind::Container => 0,
            };
            out.push(ServiceStatus {
                name: name.clone(),
                state: state.get(name).cloned().unwrap_or(ServiceRunState::Stopped),
                restart_count,
            });
        }
        out
    }

    pub fn data_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .services
            .values()
            .flat_map(|s| s.data_paths.iter().cloned())
            .collect();
        paths.sort();
        paths.dedup();
        paths
    }

    pub fn has_service(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }

    async fn set_state(&self, name: &str, new_state: ServiceRunState) {
        self.state.lock().await.insert(name.to_string(), new_state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hopbox_proto::manifest::BackendKind;
    use std::collections::HashMap as Map;

    fn svc(name: &str, deps: &[&str]) -> ServiceDef {
        ServiceDef {
            name: name.to_string(),
            backend: BackendKind::Native,
            image_or_command: "true".to_string(),
            env: Map::new(),
            ports: vec![],
            data_paths: vec![],
            depends_on: deps.iter().map(|s| s.to_string()).collect(),
            health: None,
        }
    }

    fn supervisor_for(services: Vec<ServiceDef>) -> ServiceSupervisor {
        let manifest = Manifest {
            services,
            scripts: Map::new(),
            backup_target: None,
        };
        ServiceSupervisor::new(&manifest, std::env::temp_dir(), "docker")
    }

    #[test]
    fn topological_order_respects_dependencies() {
        let supervisor = supervisor_for(vec![
            svc("api", &["db", "cache"]),
            svc("db", &[]),
            svc("cache", &[]),
        ]);
        let order = supervisor.topological_order().unwrap();
        let index = |n: &str| order.iter().position(|x| x == n).unwrap();
        assert!(index("db") < index("api"));
        assert!(index("cache") < index("api"));
    }

    #[test]
    fn cycle_is_rejected() {
        let supervisor = supervisor_for(vec![svc("a", &["b"]), svc("b", &["a"])]);
        let err = supervisor.topological_order().unwrap_err();
        assert!(matches!(err, ServiceError::Cycle(_)));
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let supervisor = supervisor_for(vec![svc("api", &["ghost"])]);
        let err = supervisor.topological_order().unwrap_err();
        assert!(matches!(err, ServiceError::UnknownDependency(_, _)));
    }

    #[test]
    fn independent_services_are_lexicographically_ordered() {
        let supervisor = supervisor_for(vec![svc("zeta", &[]), svc("alpha", &[])]);
        let order = supervisor.topological_order().unwrap();
        assert_eq!(order, vec!["alpha".to_string(), "zeta".to_string()]);
    }
}
