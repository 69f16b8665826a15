//! `run.script` (§4.6): executes a named shell command from the manifest's
//! `scripts` map and returns its combined stdout/stderr.

use hopbox_proto::manifest::Manifest;
use hopbox_proto::rpc::RunScriptResult;
use tokio::process::Command;

use crate::error::AgentError;

/// Output is capped the same way the RPC body itself is capped (§4.6): past
/// this many bytes the tail is dropped and `truncated` is set, rather than
/// growing the response without bound.
const MAX_OUTPUT_BYTES: usize = 1024 * 1024;

pub async fn run(manifest: &Manifest, name: &str) -> Result<RunScriptResult, AgentError> {
    let command = manifest
        .scripts
        .get(name)
        .ok_or_else(|| AgentError::ScriptNotFound(name.to_string()))?;

    let output = Command::new("sh")
        .args(["-c", command])
        .output()
        .await
        .map_err(|e| AgentError::Internal(format!("failed to spawn script {name:?}: {e}")))?;

    let mut combined = Vec::with_capacity(output.stdout.len() + output.stderr.len());
    combined.extend_from_slice(&output.stdout);
    combined.extend_from_slice(&output.stderr);

    let truncated = combined.len() > MAX_OUTPUT_BYTES;
    combined.truncate(MAX_OUTPUT_BYTES);

    Ok(RunScriptResult {
        output: String::from_utf8_lossy(&combined).into_owned(),
        truncated,
        exit_code: output.status.code(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest_with(name: &str, command: &str) -> Manifest {
        let mut manifest = Manifest::default();
        manifest.scripts.insert(name.to_string(), command.to_string());
        manifest
    }

    #[tokio::test]
    async fn runs_the_named_script_and_captures_output() {
        let manifest = manifest_with("greet", "echo hello");
        let result = run(&manifest, "greet").await.unwrap();
        assert_eq!(result.output.trim(), "hello");
        assert_eq!(result.exit_code, Some(0));
        assert!(!result.truncated);
    }

    #[tokio::test]
    async fn unknown_script_is_not_found() {
        let manifest = Manifest::default();
        let err = run(&manifest, "ghost").await.unwrap_err();
        assert!(matches!(err, AgentError::ScriptNotFound(name) if name == "ghost"));
    }

    #[tokio::test]
    async fn nonzero_exit_is_reported_not_errored() {
        let manifest = manifest_with("fail", "exit 7");
        let result = run(&manifest, "fail").await.unwrap();
        assert_eq!(result.exit_code, Some(7));
    }
}
