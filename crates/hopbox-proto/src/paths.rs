//! Filesystem layout shared by every Hopbox process (§3, §6).

use std::path::PathBuf;

/// `~/.config/hopbox` (or platform equivalent) — host records, the default-host
/// pointer, and daemon log files live here.
pub fn user_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("hopbox")
}

/// `~/.local/state/hopbox` (or platform equivalent) — daemon state files and
/// the per-host control/helper socket directory live here.
pub fn user_run_dir() -> PathBuf {
    dirs::state_dir()
        .or_else(dirs::cache_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("hopbox")
}

pub fn host_record_path(host: &str) -> PathBuf {
    user_config_dir().join("hosts").join(format!("{host}.yaml"))
}

pub fn daemon_state_path(host: &str) -> PathBuf {
    user_run_dir().join(format!("{host}.state.json"))
}

pub fn control_socket_path(host: &str) -> PathBuf {
    user_run_dir().join(format!("{host}.control.sock"))
}

pub fn helper_socket_path() -> PathBuf {
    PathBuf::from("/var/run/hopbox-helper.sock")
}

pub fn daemon_log_path(host: &str) -> PathBuf {
    user_config_dir().join("log").join(format!("{host}.log"))
}

/// The global default-host pointer (§6): `<user-config-base>/config.yaml`.
pub fn global_config_path() -> PathBuf {
    user_config_dir().join("config.yaml")
}
