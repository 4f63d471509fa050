use anyhow::{bail, Context};
use bluegreen_core::naming::VersionToken;
use chrono::Utc;
use std::path::Path;
use std::process::Command;

/// Derive a version token from the source checkout: the committed HEAD
/// revision plus the current time. Uncommitted changes only get a warning —
/// image packing reads the repository, not the work tree.
pub fn version_token_from_git(source: &Path) -> anyhow::Result<VersionToken> {
    let dirty = git(source, &["status", "--porcelain"])?;
    if !dirty.trim().is_empty() {
        tracing::warn!(
            source = %source.display(),
            "work tree has uncommitted changes; the deployment uses the committed revision"
        );
    }

    let head = git(source, &["rev-parse", "HEAD"])?;
    Ok(VersionToken::new(head.trim(), Utc::now())?)
}

fn git(dir: &Path, args: &[&str]) -> anyhow::Result<String> {
    let output = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(args)
        .output()
        .with_context(|| format!("failed to run git {}", args.join(" ")))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("git {} failed: {}", args.join(" "), stderr.trim());
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn non_repository_fails_with_git_error() {
        let dir = TempDir::new().unwrap();
        let err = version_token_from_git(dir.path()).unwrap_err();
        assert!(err.to_string().contains("git"));
    }
}
