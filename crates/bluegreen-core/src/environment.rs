use crate::error::{DeployError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// EnvName
// ---------------------------------------------------------------------------

/// The closed set of deployment targets. Everything else in the registry is
/// keyed by one of these.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvName {
    #[default]
    Dev,
    Prod,
}

impl EnvName {
    pub fn all() -> &'static [EnvName] {
        &[EnvName::Dev, EnvName::Prod]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EnvName::Dev => "dev",
            EnvName::Prod => "prod",
        }
    }

    /// Non-production environments carry their own database credentials as
    /// stack parameters; production reads them from the existing stack.
    pub fn is_production(self) -> bool {
        matches!(self, EnvName::Prod)
    }
}

impl fmt::Display for EnvName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EnvName {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "dev" => Ok(EnvName::Dev),
            "prod" => Ok(EnvName::Prod),
            _ => Err(DeployError::UnknownEnvironment(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// ServiceRule / DownstreamServices
// ---------------------------------------------------------------------------

/// One fixed downstream service the web tier must be able to reach: a
/// security group to punch ingress into, on a protocol/port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRule {
    pub security_group_id: String,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    pub port: u16,
}

fn default_protocol() -> String {
    "tcp".to_string()
}

/// The three shared services every web stack is wired into. These are
/// configured constants per environment, never discovered dynamically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownstreamServices {
    pub database: ServiceRule,
    pub log_pipeline: ServiceRule,
    pub cache: ServiceRule,
}

impl DownstreamServices {
    /// Stable iteration order, labels used in wiring reports.
    pub fn entries(&self) -> [(&'static str, &ServiceRule); 3] {
        [
            ("database", &self.database),
            ("log-pipeline", &self.log_pipeline),
            ("cache", &self.cache),
        ]
    }
}

// ---------------------------------------------------------------------------
// TemplatePaths
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplatePaths {
    #[serde(default = "default_web_template")]
    pub web: PathBuf,
    #[serde(default = "default_database_template")]
    pub database: PathBuf,
}

fn default_web_template() -> PathBuf {
    PathBuf::from("templates/web.json")
}

fn default_database_template() -> PathBuf {
    PathBuf::from("templates/database.json")
}

impl Default for TemplatePaths {
    fn default() -> Self {
        Self {
            web: default_web_template(),
            database: default_database_template(),
        }
    }
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    /// Populated from the registry map key on load.
    #[serde(skip)]
    pub name: EnvName,
    /// Product token used as the stack and load-balancer name prefix.
    /// Lowercase alphanumeric, no dashes, so names stay parseable.
    pub product: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Hosted zone that owns the environment's DNS record.
    pub zone: String,
    /// The record the cutover repoints, e.g. `test.example.org`.
    pub dns_name: String,
    /// EC2 key pair name; defaults to `{product}-{env}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_name: Option<String>,
    #[serde(default)]
    pub templates: TemplatePaths,
    pub downstream: DownstreamServices,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

impl Environment {
    pub fn key_name(&self) -> String {
        self.key_name
            .clone()
            .unwrap_or_else(|| format!("{}-{}", self.product, self.name))
    }

    /// Name prefix shared by this environment's load balancers and stacks.
    pub fn lb_prefix(&self) -> String {
        format!("{}-{}", self.product, self.name)
    }
}

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Maps each environment name to its constants. Loaded once from
/// `bluegreen.yaml`; nothing here is mutated at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registry {
    pub environments: BTreeMap<EnvName, Environment>,
}

impl Registry {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(DeployError::ConfigNotFound(path.to_path_buf()));
        }
        let data = std::fs::read_to_string(path)?;
        let mut registry: Registry = serde_yaml::from_str(&data)?;
        for (name, env) in registry.environments.iter_mut() {
            env.name = *name;
        }
        Ok(registry)
    }

    pub fn get(&self, name: EnvName) -> Result<&Environment> {
        self.environments
            .get(&name)
            .ok_or_else(|| DeployError::UnknownEnvironment(name.to_string()))
    }

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        for (name, env) in &self.environments {
            let product_ok = !env.product.is_empty()
                && env
                    .product
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
            if !product_ok {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!(
                        "{name}: product '{}' must be lowercase alphanumeric with no dashes",
                        env.product
                    ),
                });
            }
            if env.zone.is_empty() || env.dns_name.is_empty() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("{name}: zone and dns_name are required"),
                });
            } else if !env.dns_name.ends_with(env.zone.trim_end_matches('.')) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!(
                        "{name}: dns_name '{}' is outside zone '{}'",
                        env.dns_name, env.zone
                    ),
                });
            }
            for (label, rule) in env.downstream.entries() {
                if !rule.security_group_id.starts_with("sg-") {
                    warnings.push(ConfigWarning {
                        level: WarnLevel::Warning,
                        message: format!(
                            "{name}: {label} security group '{}' does not look like an sg- id",
                            rule.security_group_id
                        ),
                    });
                }
                if rule.port == 0 {
                    warnings.push(ConfigWarning {
                        level: WarnLevel::Error,
                        message: format!("{name}: {label} port must be nonzero"),
                    });
                }
            }
        }
        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
environments:
  dev:
    product: fc
    zone: example.org
    dns_name: test.example.org
    downstream:
      database:
        security_group_id: sg-13fd9e77
        port: 5432
      log_pipeline:
        security_group_id: sg-f1ce248e
        port: 5043
      cache:
        security_group_id: sg-8163f8e6
        port: 11211
  prod:
    product: fc
    zone: example.org
    dns_name: example.org
    key_name: fc-prod-deploy
    downstream:
      database:
        security_group_id: sg-13fd9e77
        port: 5432
      log_pipeline:
        security_group_id: sg-f1ce248e
        port: 5043
      cache:
        security_group_id: sg-8163f8e6
        port: 11211
"#;

    pub(crate) fn sample_registry() -> Registry {
        let mut registry: Registry = serde_yaml::from_str(SAMPLE).unwrap();
        for (name, env) in registry.environments.iter_mut() {
            env.name = *name;
        }
        registry
    }

    #[test]
    fn load_populates_names_and_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bluegreen.yaml");
        std::fs::write(&path, SAMPLE).unwrap();

        let registry = Registry::load(&path).unwrap();
        let dev = registry.get(EnvName::Dev).unwrap();
        assert_eq!(dev.name, EnvName::Dev);
        assert_eq!(dev.region, "us-east-1");
        assert_eq!(dev.downstream.database.protocol, "tcp");
        assert_eq!(dev.key_name(), "fc-dev");
        assert_eq!(dev.lb_prefix(), "fc-dev");

        let prod = registry.get(EnvName::Prod).unwrap();
        assert_eq!(prod.key_name(), "fc-prod-deploy");
    }

    #[test]
    fn missing_config_is_a_distinct_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nope.yaml");
        assert!(matches!(
            Registry::load(&path),
            Err(DeployError::ConfigNotFound(_))
        ));
    }

    #[test]
    fn env_name_roundtrip() {
        use std::str::FromStr;
        for env in EnvName::all() {
            assert_eq!(EnvName::from_str(env.as_str()).unwrap(), *env);
        }
        assert!(EnvName::from_str("staging").is_err());
    }

    #[test]
    fn validate_flags_bad_product() {
        let mut registry = sample_registry();
        registry
            .environments
            .get_mut(&EnvName::Dev)
            .unwrap()
            .product = "Fire-Cares".to_string();
        let warnings = registry.validate();
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Error && w.message.contains("product")));
    }

    #[test]
    fn validate_clean_sample_has_no_errors() {
        let registry = sample_registry();
        assert!(registry
            .validate()
            .iter()
            .all(|w| w.level != WarnLevel::Error));
    }

    #[test]
    fn downstream_iteration_order_is_stable() {
        let registry = sample_registry();
        let dev = registry.get(EnvName::Dev).unwrap();
        let labels: Vec<_> = dev.downstream.entries().map(|(l, _)| l).to_vec();
        assert_eq!(labels, ["database", "log-pipeline", "cache"]);
    }
}
