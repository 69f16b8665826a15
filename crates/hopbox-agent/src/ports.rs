//! Listening-port discovery (§6): parses `/proc/net/tcp` for rows in state
//! `0A` (LISTEN), then resolves each port's owning program by scanning every
//! process's open file descriptors for the matching socket inode.
//!
//! Non-Linux targets return an empty list rather than erroring, matching
//! §4.6's `ports.list`.

use serde::{Deserialize, Serialize};

const TCP_STATE_LISTEN: &str = "0A";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortEntry {
    pub port: u16,
    pub program: String,
}

#[cfg(target_os = "linux")]
pub async fn list_listening_ports() -> std::io::Result<Vec<PortEntry>> {
    let tcp = tokio::fs::read_to_string("/proc/net/tcp").await?;
    let tcp6 = tokio::fs::read_to_string("/proc/net/tcp6").await.unwrap_or_default();

    let mut inode_to_port = std::collections::HashMap::new();
    for line in tcp.lines().chain(tcp6.lines()) {
        if let Some((port, inode)) = parse_listen_row(line) {
            inode_to_port.insert(inode, port);
        }
    }

    if inode_to_port.is_empty() {
        return Ok(Vec::new());
    }

    let mut port_to_program = std::collections::HashMap::new();
    let mut procs = tokio::fs::read_dir("/proc").await?;
    while let Some(entry) = procs.next_entry().await? {
        let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok()) else {
            continue;
        };
        for inode in socket_inodes_of_pid(pid).await {
            if let Some(&port) = inode_to_port.get(&inode) {
                if let Some(program) = program_name_of_pid(pid).await {
                    port_to_program.entry(port).or_insert(program);
                }
            }
        }
    }

    let mut out: Vec<PortEntry> = inode_to_port
        .values()
        .map(|&port| PortEntry {
            port,
            program: port_to_program.get(&port).cloned().unwrap_or_default(),
        })
        .collect();
    out.sort_by_key(|e| e.port);
    out.dedup_by_key(|e| e.port);
    Ok(out)
}

/// Parses one `/proc/net/tcp{,6}` data row, returning `(port, inode)` when the
/// connection state is `LISTEN`. Column layout: `sl local_address rem_address
/// st ... inode`.
fn parse_listen_row(line: &str) -> Option<(u16, u64)> {
    let mut fields = line.split_whitespace();
    let _sl = fields.next()?;
    let local_address = fields.next()?;
    let _rem_address = fields.next()?;
    let state = fields.next()?;
    if state != TCP_STATE_LISTEN {
        return None;
    }
    // fields: tx_queue:rx_queue, tr:tm->when, retrnsmt, uid, timeout, inode
    let inode = fields.nth(5)?;

    let (_, hex_port) = local_address.rsplit_once(':')?;
    let port = u16::from_str_radix(hex_port, 16).ok()?;
    let inode: u64 = inode.parse().ok()?;
    Some((port, inode))
}

async fn socket_inodes_of_pid(pid: u32) -> Vec<u64> {
    let fd_dir = format!("/proc/{pid}/fd");
    let Ok(mut entries) = tokio::fs::read_dir(&fd_dir).await else {
        return Vec::new();
    };
    let mut inodes = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        if let Ok(target) = tokio::fs::read_link(entry.path()).await {
            if let Some(inode) = parse_socket_link(&target.to_string_lossy()) {
                inodes.push(inode);
            }
        }
    }
    inodes
}

fn parse_socket_link(link: &str) -> Option<u64> {
    let inner = link.strip_prefix("socket:[")?.strip_suffix(']')?;
    inner.parse().ok()
}

async fn program_name_of_pid(pid: u32) -> Option<String> {
    let cmdline = tokio::fs::read(format!("/proc/{pid}/cmdline")).await.ok()?;
    let first_arg = cmdline.split(|&b| b == 0).next()?;
    let arg0 = String::from_utf8_lossy(first_arg);
    if arg0.is_empty() {
        return None;
    }
    std::path::Path::new(arg0.as_ref())
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
}

#[cfg(not(target_os = "linux"))]
pub async fn list_listening_ports() -> std::io::Result<Vec<PortEntry>> {
    Ok(Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_listen_rows_and_skips_others() {
        let synthetic = "\
  sl  local_address rem_address   st tx_queue:rx_queue tr:tm->when retrnsmt   uid  timeout inode
   0: 00000000:1F90 00000000:0000 0A 00000000:00000000 00:00000000 00000000     0        0 11000 1 0000000000000000 100 0 0 10 0
   1: 00000000:0050 00000000:0000 0A 00000000:00000000 00:00000000 00000000     0        0 12000 1 0000000000000000 100 0 0 10 0
   2: 0100007F:8E43 00000000:0000 01 00000000:00000000 00:00000000 00000000     0        0 13000 1 0000000000000000 100 0 0 10 0";
        let ports: std::collections::HashSet<u16> = synthetic
            .lines()
            .filter_map(parse_listen_row)
            .map(|(port, _)| port)
            .collect();
        assert_eq!(ports, [8080u16, 80u16].into_iter().collect());
    }

    #[test]
    fn parse_socket_link_extracts_inode() {
        assert_eq!(parse_socket_link("socket:[12345]"), Some(12345));
        assert_eq!(parse_socket_link("/dev/null"), None);
    }

    #[test]
    fn header_row_is_not_a_match() {
        let header = "  sl  local_address rem_address   st tx_queue:rx_queue tr:tm->when retrnsmt   uid  timeout inode";
        assert_eq!(parse_listen_row(header), None);
    }
}
