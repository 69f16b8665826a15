//! `/etc/hosts` managed-block mutation (§4.1).
//!
//! All writes go through [`add_host`]/[`remove_host`], which rewrite the
//! whole file with the managed block recomputed. Callers serialize access
//! with a single mutex (see `main.rs`) since the kernel gives no file-level
//! locking guarantee across processes here.

use std::fmt::Write as _;
use thiserror::Error;

pub const BLOCK_START: &str = "# --- hopbox managed start ---";
pub const BLOCK_END: &str = "# --- hopbox managed end ---";

#[derive(Debug, Error)]
pub enum HostsError {
    #[error("io error reading/writing hosts file: {0}")]
    Io(#[from] std::io::Error),
}

/// Adds or replaces a managed entry for `hostname`, then returns the full
/// file contents to write back.
pub fn add_host(contents: &str, ip: &str, hostname: &str) -> String {
    let (prefix, mut entries, suffix) = split_managed_block(contents);
    entries.retain(|(_, h)| h != hostname);
    entries.push((ip.to_string(), hostname.to_string()));
    render(&prefix, &entries, &suffix)
}

/// Removes the managed entry for `hostname`. If the block becomes empty,
/// both markers are dropped too.
pub fn remove_host(contents: &str, hostname: &str) -> String {
    let (prefix, mut entries, suffix) = split_managed_block(contents);
    entries.retain(|(_, h)| h != hostname);
    render(&prefix, &entries, &suffix)
}

/// Splits `contents` into (everything before the managed block, the parsed
/// `ip hostname` entries inside it, everything after). Absent a managed
/// block, returns the whole file as prefix and no entries.
fn split_managed_block(contents: &str) -> (String, Vec<(String, String)>, String) {
    let lines: Vec<&str> = contents.lines().collect();
    let start = lines.iter().position(|l| l.trim_end() == BLOCK_START);
    let end = lines.iter().position(|l| l.trim_end() == BLOCK_END);

    match (start, end) {
        (Some(s), Some(e)) if e > s => {
            let prefix = join_with_trailing_newline(&lines[..s]);
            let suffix = join_with_trailing_newline(&lines[e + 1..]);
            let entries = lines[s + 1..e]
                .iter()
                .filter_map(|line| {
                    let mut parts = line.split_whitespace();
                    let ip = parts.next()?;
                    let hostname = parts.next()?;
                    Some((ip.to_string(), hostname.to_string()))
                })
                .collect();
            (prefix, entries, suffix)
        }
        _ => (join_with_trailing_newline(&lines), Vec::new(), String::new()),
    }
}

fn join_with_trailing_newline(lines: &[&str]) -> String {
    if lines.is_empty() {
        return String::new();
    }
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn render(prefix: &str, entries: &[(String, String)], suffix: &str) -> String {
    let mut out = prefix.to_string();
    if !entries.is_empty() {
        let _ = writeln!(out, "{BLOCK_START}");
        for (ip, hostname) in entries {
            let _ = writeln!(out, "{ip} {hostname}");
        }
        let _ = writeln!(out, "{BLOCK_END}");
    }
    out.push_str(suffix);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_to_empty_file_creates_block() {
        let out = add_host("127.0.0.1 localhost\n", "10.10.0.2", "myhost.hop");
        assert_eq!(
            out,
            "127.0.0.1 localhost\n# --- hopbox managed start ---\n10.10.0.2 myhost.hop\n# --- hopbox managed end ---\n"
        );
    }

    #[test]
    fn adding_same_ip_hostname_twice_is_idempotent() {
        let once = add_host("", "10.10.0.2", "myhost.hop");
        let twice = add_host(&once, "10.10.0.2", "myhost.hop");
        assert_eq!(once, twice);
    }

    #[test]
    fn readding_hostname_with_new_ip_replaces_line() {
        let once = add_host("", "10.10.0.2", "myhost.hop");
        let replaced = add_host(&once, "10.10.0.3", "myhost.hop");
        assert!(replaced.contains("10.10.0.3 myhost.hop"));
        assert!(!replaced.contains("10.10.0.2 myhost.hop"));
    }

    #[test]
    fn remove_empties_block_and_drops_markers() {
        let with_entry = add_host("127.0.0.1 localhost\n", "10.10.0.2", "myhost.hop");
        let removed = remove_host(&with_entry, "myhost.hop");
        assert_eq!(removed, "127.0.0.1 localhost\n");
    }

    #[test]
    fn remove_preserves_other_entries_and_non_managed_content() {
        let mut contents = add_host("127.0.0.1 localhost\n", "10.10.0.2", "a.hop");
        contents = add_host(&contents, "10.10.0.3", "b.hop");
        let removed = remove_host(&contents, "a.hop");
        assert!(removed.contains("127.0.0.1 localhost"));
        assert!(removed.contains("10.10.0.3 b.hop"));
        assert!(!removed.contains("a.hop"));
        assert!(removed.contains(BLOCK_START));
    }
}
