use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "bluegreen.yaml";

/// Resolve the config file path.
///
/// Priority:
/// 1. `--config` flag / `BLUEGREEN_CONFIG` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for `bluegreen.yaml`
/// 3. Fall back to `cwd/bluegreen.yaml` (load reports it missing)
pub fn resolve_config(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    let mut dir = cwd.clone();
    loop {
        let candidate = dir.join(CONFIG_FILE);
        if candidate.is_file() {
            return candidate;
        }
        match dir.parent() {
            Some(p) => dir = p.to_path_buf(),
            None => break,
        }
    }

    cwd.join(CONFIG_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn explicit_config_wins() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("other.yaml");
        let result = resolve_config(Some(&path));
        assert_eq!(result, path);
    }

    #[test]
    fn fallback_names_the_conventional_file() {
        let result = resolve_config(None);
        assert!(result.ends_with(CONFIG_FILE));
    }
}
