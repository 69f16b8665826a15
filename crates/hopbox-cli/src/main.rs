//! `hop` — the client-side CLI front-end.
//!
//! Deliberately thin (§1 Non-goals: the CLI surface itself is an external
//! collaborator, not specified by the core). This binary owns exactly three
//! things: picking the host a command applies to, finding or spawning that
//! host's `hopbox-daemon`, and forwarding one request to its control socket.
//! All the business logic (tunnel lifecycle, monitor, forwarder, bridges)
//! lives in `hopbox-daemon`.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use hopbox_ipc::IpcClient;
use hopbox_proto::{paths, ControlRequest, ControlResponse, GlobalConfig, HostRecord};

#[derive(Parser, Debug)]
#[command(name = "hop", about = "Bring up, inspect, or tear down a hopbox workspace tunnel")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Bring the tunnel to `host` up, spawning its daemon if not already running.
    Up {
        host: Option<String>,
    },
    /// Tear the tunnel to `host` down via its control socket.
    Down {
        host: Option<String>,
    },
    /// Print the daemon's last-known connectivity status for `host`.
    Status {
        host: Option<String>,
    },
    /// Exec into an interactive shell on `host` over SSH, once the tunnel is up.
    Ssh {
        host: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .without_time()
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("hop: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Up { host } => cmd_up(&resolve_host(host)?).await,
        Commands::Down { host } => cmd_down(&resolve_host(host)?).await,
        Commands::Status { host } => cmd_status(&resolve_host(host)?).await,
        Commands::Ssh { host } => cmd_ssh(&resolve_host(host)?),
    }
}

/// Resolves the host to operate on: the name given on the command line, or
/// else `default_host` from the global config (§6). Either way the result
/// is validated against `[A-Za-z0-9][A-Za-z0-9_-]*` before it ever reaches
/// a path-join — host names become file/socket names under trusted
/// directories (`paths::host_record_path` and friends), so a value like
/// `../../etc/cron.d/x` must be rejected here, not further down the line.
fn resolve_host(explicit: Option<String>) -> Result<String> {
    let host = match explicit {
        Some(host) => host,
        None => {
            let path = paths::global_config_path();
            let config = match std::fs::read_to_string(&path) {
                Ok(text) => GlobalConfig::from_yaml(&text).with_context(|| format!("parsing {}", path.display()))?,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => GlobalConfig::default(),
                Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
            };
            config
                .default_host
                .context("no host given and no default_host set in config.yaml")?
        }
    };
    hopbox_proto::validate_host_name(&host).with_context(|| format!("invalid host name {host:?}"))?;
    Ok(host)
}

fn load_host_record(host: &str) -> Result<HostRecord> {
    let path = paths::host_record_path(host);
    let text = std::fs::read_to_string(&path).with_context(|| format!("reading host record at {}", path.display()))?;
    HostRecord::from_yaml(&text).with_context(|| format!("parsing host record at {}", path.display()))
}

async fn cmd_up(host: &str) -> Result<()> {
    // Validate the host record exists up front so a typo fails before spawning anything.
    load_host_record(host)?;

    let socket_path = paths::control_socket_path(host);
    if control_request(&socket_path, ControlRequest::Status).await.is_ok() {
        println!("{host}: already up");
        return Ok(());
    }

    spawn_daemon(host)?;
    wait_for_control_socket(&socket_path).await?;
    println!("{host}: up");
    Ok(())
}

async fn cmd_down(host: &str) -> Result<()> {
    let socket_path = paths::control_socket_path(host);
    let response = control_request(&socket_path, ControlRequest::Shutdown)
        .await
        .with_context(|| format!("{host} does not appear to be running"))?;
    if !response.ok {
        bail!(response.error.unwrap_or_else(|| "shutdown failed".to_string()));
    }
    println!("{host}: down");
    Ok(())
}

async fn cmd_status(host: &str) -> Result<()> {
    let socket_path = paths::control_socket_path(host);
    let response = control_request(&socket_path, ControlRequest::Status)
        .await
        .with_context(|| format!("{host} does not appear to be running"))?;
    let state = response.state.context("daemon returned no status")?;
    println!(
        "{host}: {} (pid {}, interface {}, started {})",
        if state.connected { "connected" } else { "disconnected" },
        state.pid,
        state.interface,
        state.started_at,
    );
    if let Some(last_healthy) = state.last_healthy {
        println!("  last healthy: {last_healthy}");
    }
    if !state.bridges.is_empty() {
        println!("  bridges: {}", state.bridges.join(", "));
    }
    Ok(())
}

fn cmd_ssh(host: &str) -> Result<()> {
    use std::os::unix::process::CommandExt;

    let record = load_host_record(host)?;
    let err = std::process::Command::new("ssh")
        .arg("-p")
        .arg(record.ssh_port.to_string())
        .arg(format!("{}@{}", record.ssh_user, record.ssh_host))
        .exec();
    // `exec` only returns on failure; a successful exec replaces this process.
    Err(err).context("failed to exec ssh")
}

async fn control_request(socket_path: &std::path::Path, request: ControlRequest) -> Result<ControlResponse> {
    let mut client = IpcClient::<ControlRequest, ControlResponse>::connect(socket_path)
        .await
        .with_context(|| format!("connecting to {}", socket_path.display()))?;
    client.request(&request).await.context("control socket request failed")
}

/// Polls the control socket until it answers `status` or `timeout` elapses,
/// the way the CLI waits out the daemon's tunnel-up handshake before
/// reporting success.
async fn wait_for_control_socket(socket_path: &std::path::Path) -> Result<()> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(15);
    loop {
        if control_request(socket_path, ControlRequest::Status).await.is_ok() {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            bail!("daemon did not become ready within 15s");
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

/// Spawns `hopbox-daemon --host <host>` detached from this process's
/// controlling terminal so it survives the CLI exiting.
fn spawn_daemon(host: &str) -> Result<()> {
    let binary = daemon_binary_path()?;
    let mut command = std::process::Command::new(binary);
    command.arg("--host").arg(host);
    command
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null());

    // Detach into a new session so a SIGHUP from the terminal closing
    // doesn't reach the daemon (the daemon also ignores SIGHUP itself,
    // belt-and-suspenders against whichever shell spawned `hop`).
    unsafe {
        use std::os::unix::process::CommandExt;
        command.pre_exec(|| {
            nix::unistd::setsid().map_err(|e| std::io::Error::from_raw_os_error(e as i32))?;
            Ok(())
        });
    }

    command.spawn().context("failed to spawn hopbox-daemon")?;
    Ok(())
}

/// Looks for `hopbox-daemon` next to this executable first (the common case
/// for a packaged install), falling back to `$PATH`.
fn daemon_binary_path() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("resolving current executable path")?;
    if let Some(dir) = exe.parent() {
        let candidate = dir.join("hopbox-daemon");
        if candidate.is_file() {
            return Ok(candidate);
        }
    }
    Ok(PathBuf::from("hopbox-daemon"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn resolve_host_prefers_explicit_argument() {
        let host = resolve_host(Some("mybox".to_string())).unwrap();
        assert_eq!(host, "mybox");
    }

    #[test]
    fn resolve_host_rejects_path_traversal() {
        let err = resolve_host(Some("../../etc/cron.d/x".to_string())).unwrap_err();
        assert!(err.to_string().contains("invalid host name"));
    }

    #[test]
    fn global_config_roundtrips_default_host() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        let config = GlobalConfig {
            default_host: Some("devbox".to_string()),
        };
        std::fs::write(&path, config.to_yaml().unwrap()).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let parsed = GlobalConfig::from_yaml(&text).unwrap();
        assert_eq!(parsed.default_host.as_deref(), Some("devbox"));
    }
}
