//! `packages.install` (§4.6): delegates to whichever system package
//! installer is configured. Package installers (apt/nix/static) are
//! external collaborators out of this spec's core (§1) — this module is
//! the thin shell-out boundary the RPC dispatcher calls through, not a
//! package-manager abstraction.

use tokio::process::Command;

use hopbox_proto::rpc::{PackageFailure, PackagesInstallResult};

/// Installs packages one at a time (rather than a single batch invocation)
/// so a failure on one package doesn't hide whether the others succeeded.
pub struct PackageInstaller {
    /// Argv template; `{pkg}` is substituted with one package name per
    /// invocation. Defaults to `apt-get install -y {pkg}`.
    argv_template: Vec<String>,
}

impl PackageInstaller {
    pub fn new(argv_template: Vec<String>) -> Self {
        assert!(!argv_template.is_empty(), "argv template must name a program");
        Self { argv_template }
    }

    pub async fn install(&self, packages: &[String]) -> PackagesInstallResult {
        let mut installed = Vec::new();
        let mut failed = Vec::new();

        for package in packages {
            match self.install_one(package).await {
                Ok(()) => installed.push(package.clone()),
                Err(error) => failed.push(PackageFailure {
                    package: package.clone(),
                    error,
                }),
            }
        }

        PackagesInstallResult { installed, failed }
    }

    async fn install_one(&self, package: &str) -> Result<(), String> {
        let argv: Vec<String> = self
            .argv_template
            .iter()
            .map(|arg| arg.replace("{pkg}", package))
            .collect();

        let (program, args) = argv.split_first().expect("non-empty template enforced at construction");
        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| format!("failed to spawn {program}: {e}"))?;

        if !output.status.success() {
            return Err(String::from_utf8_lossy(&output.stderr).trim().to_string());
        }
        Ok(())
    }
}

impl Default for PackageInstaller {
    fn default() -> Self {
        Self::new(vec![
            "apt-get".to_string(),
            "install".to_string(),
            "-y".to_string(),
            "{pkg}".to_string(),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reports_per_package_success_and_failure() {
        // `true` and `false` stand in for a real installer so the test
        // doesn't need root or a package cache.
        let installer = PackageInstaller::new(vec!["sh".to_string(), "-c".to_string(), "[ {pkg} = good ]".to_string()]);
        let result = installer.install(&["good".to_string(), "bad".to_string()]).await;
        assert_eq!(result.installed, vec!["good".to_string()]);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].package, "bad");
    }
}
