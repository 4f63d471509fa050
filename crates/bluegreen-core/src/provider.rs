use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Stack output key holding the web tier's security group id. Absence means
/// the stack has no downstream wiring to perform.
pub const OUTPUT_WEB_SECURITY_GROUP: &str = "WebServerSecurityGroup";
/// Stack output key holding the web tier's load balancer DNS name.
pub const OUTPUT_LOAD_BALANCER_DNS: &str = "LoadBalancerDnsName";
/// Stack output key holding the machine image the stack was built from.
pub const OUTPUT_MACHINE_IMAGE: &str = "MachineImage";

// ---------------------------------------------------------------------------
// ProviderError
// ---------------------------------------------------------------------------

/// Provider failures as a taxonomy rather than a string soup. Callers branch
/// on the variant: `NotFound`/`AlreadyExists`/`AlreadyUpToDate` are expected
/// idempotency signals on re-runs, `Throttled` is retryable, `Api` is not.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("already up to date: {0}")]
    AlreadyUpToDate(String),

    #[error("throttled by provider: {0}")]
    Throttled(String),

    #[error("provider api error: {0}")]
    Api(String),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Throttled(_))
    }
}

// ---------------------------------------------------------------------------
// StackStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StackStatus {
    CreateInProgress,
    CreateComplete,
    CreateFailed,
    RollbackInProgress,
    RollbackComplete,
    UpdateInProgress,
    UpdateComplete,
    UpdateRollbackComplete,
    DeleteInProgress,
    DeleteComplete,
    DeleteFailed,
    #[serde(untagged)]
    Other(String),
}

impl StackStatus {
    pub fn from_provider(s: &str) -> Self {
        match s {
            "CREATE_IN_PROGRESS" => StackStatus::CreateInProgress,
            "CREATE_COMPLETE" => StackStatus::CreateComplete,
            "CREATE_FAILED" => StackStatus::CreateFailed,
            "ROLLBACK_IN_PROGRESS" => StackStatus::RollbackInProgress,
            "ROLLBACK_COMPLETE" => StackStatus::RollbackComplete,
            "UPDATE_IN_PROGRESS" => StackStatus::UpdateInProgress,
            "UPDATE_COMPLETE" => StackStatus::UpdateComplete,
            "UPDATE_ROLLBACK_COMPLETE" => StackStatus::UpdateRollbackComplete,
            "DELETE_IN_PROGRESS" => StackStatus::DeleteInProgress,
            "DELETE_COMPLETE" => StackStatus::DeleteComplete,
            "DELETE_FAILED" => StackStatus::DeleteFailed,
            other => StackStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            StackStatus::CreateInProgress => "CREATE_IN_PROGRESS",
            StackStatus::CreateComplete => "CREATE_COMPLETE",
            StackStatus::CreateFailed => "CREATE_FAILED",
            StackStatus::RollbackInProgress => "ROLLBACK_IN_PROGRESS",
            StackStatus::RollbackComplete => "ROLLBACK_COMPLETE",
            StackStatus::UpdateInProgress => "UPDATE_IN_PROGRESS",
            StackStatus::UpdateComplete => "UPDATE_COMPLETE",
            StackStatus::UpdateRollbackComplete => "UPDATE_ROLLBACK_COMPLETE",
            StackStatus::DeleteInProgress => "DELETE_IN_PROGRESS",
            StackStatus::DeleteComplete => "DELETE_COMPLETE",
            StackStatus::DeleteFailed => "DELETE_FAILED",
            StackStatus::Other(s) => s,
        }
    }
}

impl fmt::Display for StackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Stack / StackEvent / Parameter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct Stack {
    pub name: String,
    pub status: StackStatus,
    pub created_at: DateTime<Utc>,
    pub outputs: BTreeMap<String, String>,
}

impl Stack {
    pub fn output(&self, key: &str) -> Option<&str> {
        self.outputs.get(key).map(String::as_str)
    }

    pub fn web_security_group(&self) -> Option<&str> {
        self.output(OUTPUT_WEB_SECURITY_GROUP)
    }
}

/// One stack event, newest-first in `StackClient::events`.
#[derive(Debug, Clone, Serialize)]
pub struct StackEvent {
    pub resource_status: String,
    pub reason: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parameter {
    pub key: String,
    pub value: String,
}

impl Parameter {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Parameter {
            key: key.into(),
            value: value.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Security groups / load balancers / DNS
// ---------------------------------------------------------------------------

/// A directed permission edge: `source_group_id` may reach `group_id` on
/// `protocol`/`port`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct IngressRule {
    pub group_id: String,
    pub source_group_id: String,
    pub protocol: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadBalancer {
    pub name: String,
    pub dns_name: String,
    /// The balancer's own canonical hosted zone, used as the alias target
    /// zone on cutover.
    pub hosted_zone_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AliasTarget {
    pub dns_name: String,
    pub hosted_zone_id: String,
}

// ---------------------------------------------------------------------------
// Client traits
// ---------------------------------------------------------------------------

/// Stack-management API. Implementations are injected so tests can run
/// against in-memory doubles; nothing holds a process-wide connection.
#[async_trait]
pub trait StackClient: Send + Sync {
    async fn create(
        &self,
        name: &str,
        template_body: &str,
        parameters: &[Parameter],
    ) -> Result<(), ProviderError>;

    async fn describe(&self, name: &str) -> Result<Stack, ProviderError>;

    async fn list(&self) -> Result<Vec<Stack>, ProviderError>;

    async fn update(
        &self,
        name: &str,
        template_body: &str,
        parameters: &[Parameter],
    ) -> Result<(), ProviderError>;

    async fn delete(&self, name: &str) -> Result<(), ProviderError>;

    /// Events for a stack, newest first.
    async fn events(&self, name: &str) -> Result<Vec<StackEvent>, ProviderError>;
}

#[async_trait]
pub trait SecurityGroupClient: Send + Sync {
    /// Fails with `AlreadyExists` when the rule is already live.
    async fn authorize_ingress(&self, rule: &IngressRule) -> Result<(), ProviderError>;

    /// Fails with `NotFound` when the rule was already revoked.
    async fn revoke_ingress(&self, rule: &IngressRule) -> Result<(), ProviderError>;
}

#[async_trait]
pub trait LoadBalancerClient: Send + Sync {
    async fn list(&self) -> Result<Vec<LoadBalancer>, ProviderError>;
}

#[async_trait]
pub trait DnsClient: Send + Sync {
    async fn zone_id(&self, zone_name: &str) -> Result<Option<String>, ProviderError>;

    /// Upsert a single alias A-record as one atomic change batch. Readers
    /// never observe zero or two records for the name.
    async fn upsert_alias(
        &self,
        zone_id: &str,
        record_name: &str,
        target: &AliasTarget,
    ) -> Result<(), ProviderError>;

    /// The alias DNS name the record currently points at, if any.
    async fn resolve_alias(
        &self,
        zone_id: &str,
        record_name: &str,
    ) -> Result<Option<String>, ProviderError>;
}

/// Instance lookups backing `list-machines`.
#[async_trait]
pub trait MachineClient: Send + Sync {
    /// Physical resource id for a logical resource in a stack.
    async fn stack_resource(
        &self,
        stack_name: &str,
        logical_id: &str,
    ) -> Result<Option<String>, ProviderError>;

    async fn group_instance_ids(&self, group_id: &str) -> Result<Vec<String>, ProviderError>;

    async fn instance_public_dns(
        &self,
        instance_ids: &[String],
    ) -> Result<Vec<String>, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_roundtrip() {
        for s in [
            "CREATE_IN_PROGRESS",
            "CREATE_COMPLETE",
            "UPDATE_COMPLETE",
            "DELETE_IN_PROGRESS",
        ] {
            assert_eq!(StackStatus::from_provider(s).as_str(), s);
        }
    }

    #[test]
    fn unknown_status_is_preserved() {
        let status = StackStatus::from_provider("REVIEW_IN_PROGRESS");
        assert_eq!(status, StackStatus::Other("REVIEW_IN_PROGRESS".to_string()));
        assert_eq!(status.as_str(), "REVIEW_IN_PROGRESS");
    }

    #[test]
    fn only_throttling_is_transient() {
        assert!(ProviderError::Throttled("rate exceeded".into()).is_transient());
        assert!(!ProviderError::NotFound("fc-dev".into()).is_transient());
        assert!(!ProviderError::Api("boom".into()).is_transient());
    }
}
