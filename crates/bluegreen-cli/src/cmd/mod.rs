pub mod delete_old_stacks;
pub mod delete_stack;
pub mod deploy;
pub mod list_machines;
pub mod list_stacks;
pub mod switch_dns;

use anyhow::Context;
use bluegreen_core::environment::{EnvName, Environment, Registry};
use std::path::{Path, PathBuf};

/// Load the registry and pick one environment out of it.
pub(crate) fn load_environment(config: &Path, env: &str) -> anyhow::Result<Environment> {
    let name: EnvName = env.parse()?;
    let registry = load_registry(config)?;
    Ok(registry.get(name)?.clone())
}

pub(crate) fn load_registry(config: &Path) -> anyhow::Result<Registry> {
    let registry = Registry::load(config)
        .with_context(|| format!("failed to load {}", config.display()))?;
    for warning in registry.validate() {
        tracing::warn!("{}", warning.message);
    }
    Ok(registry)
}

/// Template paths in the config are relative to the config file itself.
pub(crate) fn read_template(config: &Path, template: &Path) -> anyhow::Result<String> {
    let path: PathBuf = if template.is_absolute() {
        template.to_path_buf()
    } else {
        config
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(template)
    };
    std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read template {}", path.display()))
}
