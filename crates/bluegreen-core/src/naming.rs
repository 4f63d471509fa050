use crate::environment::EnvName;
use crate::error::{DeployError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

// ---------------------------------------------------------------------------
// VersionToken
// ---------------------------------------------------------------------------

/// `{short-rev}-{YYYYMMDD}-{HHMM}`: deterministic from the source revision
/// plus the moment the deployment was cut. Doubles as the correlation key
/// between a packed machine image and the stack that deploys it, and as the
/// uniqueness discriminator in web stack names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct VersionToken(String);

impl VersionToken {
    /// Build a token from a revision identifier (at least 6 hex chars, e.g.
    /// a git commit hash) and a timestamp.
    pub fn new(revision: &str, at: DateTime<Utc>) -> Result<Self> {
        let rev = revision.trim().to_ascii_lowercase();
        if rev.len() < 6 || !rev.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(DeployError::InvalidVersionToken(revision.to_string()));
        }
        let short = &rev[..6];
        Ok(VersionToken(format!("{short}-{}", at.format("%Y%m%d-%H%M"))))
    }

    pub fn parse(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('-').collect();
        let valid = match parts.as_slice() {
            [rev, date, time] => {
                (6..=40).contains(&rev.len())
                    && rev.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
                    && date.len() == 8
                    && date.chars().all(|c| c.is_ascii_digit())
                    && time.len() == 4
                    && time.chars().all(|c| c.is_ascii_digit())
            }
            _ => false,
        };
        if !valid {
            return Err(DeployError::InvalidVersionToken(s.to_string()));
        }
        Ok(VersionToken(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The short revision segment, for image correlation.
    pub fn revision(&self) -> &str {
        self.0.split('-').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for VersionToken {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self> {
        VersionToken::parse(s)
    }
}

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Web,
    Db,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Web => "web",
            Role::Db => "db",
        })
    }
}

// ---------------------------------------------------------------------------
// StackName
// ---------------------------------------------------------------------------

/// The single source of truth for the stack naming convention:
///
/// - web tier:      `{product}-{env}-web-{versionToken}`
/// - database tier: `{product}-{env}`
///
/// `product` and `env` are dash-free, so `parse` recovers exactly the triple
/// that `format` was given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackName {
    product: String,
    environment: EnvName,
    role: Role,
    token: Option<VersionToken>,
}

impl StackName {
    pub fn web(product: &str, environment: EnvName, token: VersionToken) -> Self {
        StackName {
            product: product.to_string(),
            environment,
            role: Role::Web,
            token: Some(token),
        }
    }

    pub fn db(product: &str, environment: EnvName) -> Self {
        StackName {
            product: product.to_string(),
            environment,
            role: Role::Db,
            token: None,
        }
    }

    pub fn parse(name: &str) -> Result<Self> {
        let invalid = || DeployError::InvalidStackName(name.to_string());

        let mut parts = name.splitn(3, '-');
        let product = parts.next().filter(|p| !p.is_empty()).ok_or_else(invalid)?;
        let env: EnvName = parts
            .next()
            .ok_or_else(invalid)?
            .parse()
            .map_err(|_| invalid())?;

        match parts.next() {
            None => Ok(StackName::db(product, env)),
            Some(rest) => {
                let token = rest.strip_prefix("web-").ok_or_else(invalid)?;
                Ok(StackName::web(product, env, VersionToken::parse(token)?))
            }
        }
    }

    /// Prefix shared by every web stack of an environment, used for
    /// candidate filtering in pruning and live-stack lookup.
    pub fn web_prefix(product: &str, environment: EnvName) -> String {
        format!("{product}-{environment}-web-")
    }

    pub fn environment(&self) -> EnvName {
        self.environment
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn token(&self) -> Option<&VersionToken> {
        self.token.as_ref()
    }
}

impl fmt::Display for StackName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.role, &self.token) {
            (Role::Web, Some(token)) => {
                write!(f, "{}-{}-web-{token}", self.product, self.environment)
            }
            _ => write!(f, "{}-{}", self.product, self.environment),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn token() -> VersionToken {
        VersionToken::parse("abcdef-20200101-1200").unwrap()
    }

    #[test]
    fn token_from_revision_and_timestamp() {
        let at = Utc.with_ymd_and_hms(2020, 1, 1, 12, 0, 0).unwrap();
        let token = VersionToken::new("abcdef0123456789", at).unwrap();
        assert_eq!(token.as_str(), "abcdef-20200101-1200");
        assert_eq!(token.revision(), "abcdef");
    }

    #[test]
    fn token_rejects_short_or_non_hex_revisions() {
        let at = Utc::now();
        assert!(VersionToken::new("abc", at).is_err());
        assert!(VersionToken::new("not-hex!", at).is_err());
    }

    #[test]
    fn token_parse_rejects_malformed() {
        for bad in [
            "",
            "abcdef",
            "abcdef-2020-1200",
            "abcdef-20200101",
            "ABCDEF-20200101-1200",
            "xyzxyz-20200101-1200",
            "abcdef-20200101-12000",
        ] {
            assert!(VersionToken::parse(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn web_name_roundtrip() {
        let name = StackName::web("fc", EnvName::Dev, token());
        let formatted = name.to_string();
        assert_eq!(formatted, "fc-dev-web-abcdef-20200101-1200");

        let parsed = StackName::parse(&formatted).unwrap();
        assert_eq!(parsed, name);
        assert_eq!(parsed.environment(), EnvName::Dev);
        assert_eq!(parsed.role(), Role::Web);
        assert_eq!(parsed.token(), Some(&token()));
    }

    #[test]
    fn db_name_roundtrip() {
        let name = StackName::db("fc", EnvName::Prod);
        assert_eq!(name.to_string(), "fc-prod");

        let parsed = StackName::parse("fc-prod").unwrap();
        assert_eq!(parsed, name);
        assert_eq!(parsed.role(), Role::Db);
        assert!(parsed.token().is_none());
    }

    #[test]
    fn parse_rejects_foreign_names() {
        for bad in [
            "",
            "fc",
            "fc-staging",
            "fc-dev-web",
            "fc-dev-web-",
            "fc-dev-beat-abcdef-20200101-1200",
            "fc-dev-web-notatoken",
        ] {
            assert!(StackName::parse(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn web_prefix_matches_formatted_names() {
        let name = StackName::web("fc", EnvName::Dev, token()).to_string();
        assert!(name.starts_with(&StackName::web_prefix("fc", EnvName::Dev)));
        assert!(!name.starts_with(&StackName::web_prefix("fc", EnvName::Prod)));
    }
}
