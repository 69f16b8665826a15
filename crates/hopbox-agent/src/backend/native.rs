//! Native process backend (§4.7): runs a service as a child process group
//! via a shell, logs to `<logdir>/<name>.log` in append mode, and restarts
//! it on unexpected exit with doubling backoff, the same exponential-backoff
//! shape this workspace's connection-retry code uses elsewhere.

use std::collections::HashMap;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tokio::fs::OpenOptions;
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use hopbox_proto::ServiceDef;

use crate::error::ServiceError;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);
const STABLE_AFTER: Duration = Duration::from_secs(60);
const STOP_GRACE: Duration = Duration::from_secs(5);

struct RunningService {
    pgid: Pid,
    stopped: Arc<AtomicBool>,
    restart_count: Arc<AtomicU32>,
    supervisor: tokio::task::JoinHandle<()>,
}

pub struct NativeBackend {
    log_dir: PathBuf,
    running: Mutex<HashMap<String, RunningService>>,
}

impl NativeBackend {
    pub fn new(log_dir: PathBuf) -> Self {
        Self {
            log_dir,
            running: Mutex::new(HashMap::new()),
        }
    }

    pub async fn restart_count(&self, name: &str) -> u32 {
        self.running
            .lock()
            .await
            .get(name)
            .map(|r| r.restart_count.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

}

async fn spawn_once(log_dir: &PathBuf, def: &ServiceDef) -> Result<tokio::process::Child, ServiceError> {
    let log_path = log_dir.join(format!("{}.log", def.name));
    if let Some(parent) = log_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .await?;
    let stdout_file = log_file.into_std().await;
    let stderr_file = stdout_file.try_clone()?;

    let mut cmd = Command::new("sh");
    cmd.args(["-c", &def.image_or_command])
        .envs(&def.env)
        .stdin(Stdio::null())
        .stdout(stdout_file)
        .stderr(stderr_file);

    // SAFETY: `setsid` only affects the forked child before exec, making
    // it the leader of a new process group we can signal as a unit.
    unsafe {
        cmd.pre_exec(|| {
            nix::unistd::setsid().map_err(|e| std::io::Error::from_raw_os_error(e as i32))?;
            Ok(())
        });
    }

    Ok(cmd.spawn()?)
}

#[async_trait]
impl super::ServiceBackend for NativeBackend {
    async fn start(&self, def: &ServiceDef) -> Result<(), ServiceError> {
        let mut running = self.running.lock().await;
        if running.contains_key(&def.name) {
            return Ok(());
        }

        let child = spawn_once(&self.log_dir, def).await.map_err(|e| {
            ServiceError::StartFailed(def.name.clone(), e.to_string())
        })?;
        let pgid = Pid::from_raw(
            child
                .id()
                .ok_or_else(|| ServiceError::StartFailed(def.name.clone(), "child exited immediately".to_string()))?
                as i32,
        );

        let stopped = Arc::new(AtomicBool::new(false));
        let restart_count = Arc::new(AtomicU32::new(0));

        let name = def.name.clone();
        let def = def.clone();
        let log_dir = self.log_dir.clone();
        let stopped_task = stopped.clone();
        let restart_count_task = restart_count.clone();
        let supervisor = tokio::spawn(supervise(def, log_dir, child, stopped_task, restart_count_task));

        running.insert(
            name,
            RunningService {
                pgid,
                stopped,
                restart_count,
                supervisor,
            },
        );
        Ok(())
    }

    async fn stop(&self, name: &str) -> Result<(), ServiceError> {
        let entry = self.running.lock().await.remove(name);
        let Some(entry) = entry else { return Ok(()) };

        entry.stopped.store(true, Ordering::SeqCst);
        let _ = killpg(entry.pgid, Signal::SIGTERM);

        let waited = tokio::time::timeout(STOP_GRACE, async {
            // The supervisor task exits once the child is reaped; join it.
            let _ = entry.supervisor.await;
        })
        .await;

        if waited.is_err() {
            warn!(service = name, "native service did not exit within grace period, sending SIGKILL");
            let _ = killpg(entry.pgid, Signal::SIGKILL);
        }
        Ok(())
    }

    async fn is_running(&self, name: &str) -> bool {
        self.running.lock().await.contains_key(name)
    }
}

async fn supervise(
    def: ServiceDef,
    log_dir: PathBuf,
    child: tokio::process::Child,
    stopped: Arc<AtomicBool>,
    restart_count: Arc<AtomicU32>,
) {
    // The delay used for the *next* restart. Starts at 1s; doubles whenever
    // the just-exited instance died before outliving `STABLE_AFTER`, resets
    // to 1s once one has proven itself stable.
    let mut backoff = INITIAL_BACKOFF;
    let mut current_child = child;

    loop {
        let started_at = Instant::now();
        let status = current_child.wait().await;

        if stopped.load(Ordering::SeqCst) {
            debug!(service = %def.name, "native service stopped explicitly");
            return;
        }

        let alive_for = started_at.elapsed();
        match status {
            Ok(status) => {
                warn!(service = %def.name, code = ?status.code(), signal = ?status.signal(), "native service exited unexpectedly");
            }
            Err(e) => {
                warn!(service = %def.name, "failed to wait on native service: {e}");
                return;
            }
        }
        restart_count.fetch_add(1, Ordering::Relaxed);

        info!(service = %def.name, backoff_secs = backoff.as_secs(), "restarting native service");
        tokio::time::sleep(backoff).await;

        backoff = if alive_for >= STABLE_AFTER {
            INITIAL_BACKOFF
        } else {
            (backoff * 2).min(MAX_BACKOFF)
        };

        if stopped.load(Ordering::SeqCst) {
            return;
        }

        match spawn_once(&log_dir, &def).await {
            Ok(child) => current_child = child,
            Err(e) => {
                warn!(service = %def.name, "failed to respawn native service: {e}");
                return;
            }
        }
    }
}
