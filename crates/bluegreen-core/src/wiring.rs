use crate::environment::Environment;
use crate::provider::{
    IngressRule, Parameter, ProviderError, SecurityGroupClient, StackClient,
};
use serde::Serialize;

/// Database stack parameter that carries the web tier's security group.
pub const DB_PARAM_WEB_SECURITY_GROUP: &str = "WebServerSG";

// ---------------------------------------------------------------------------
// WireOutcome
// ---------------------------------------------------------------------------

/// Tagged result of one wiring sub-operation. `AlreadySatisfied` is what
/// makes re-running a deployment safe: a rule or parameter that is already
/// in place is success, not an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WireOutcome {
    Applied,
    AlreadySatisfied,
    Failed(String),
}

impl WireOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, WireOutcome::Failed(_))
    }

    fn from_authorize(result: Result<(), ProviderError>) -> Self {
        match result {
            Ok(()) => WireOutcome::Applied,
            Err(ProviderError::AlreadyExists(_)) => WireOutcome::AlreadySatisfied,
            Err(err) => WireOutcome::Failed(err.to_string()),
        }
    }

    fn from_revoke(result: Result<(), ProviderError>) -> Self {
        match result {
            Ok(()) => WireOutcome::Applied,
            Err(ProviderError::NotFound(_)) => WireOutcome::AlreadySatisfied,
            Err(err) => WireOutcome::Failed(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceOutcome {
    pub service: &'static str,
    pub outcome: WireOutcome,
}

/// Per-step outcomes of a wiring pass. Failures are enumerated distinctly
/// from successes; one failed service never blocks the others.
#[derive(Debug, Clone, Serialize)]
pub struct WiringReport {
    pub security_group: String,
    pub database_update: WireOutcome,
    pub services: Vec<ServiceOutcome>,
}

impl WiringReport {
    pub fn failures(&self) -> Vec<String> {
        let mut out = Vec::new();
        if let WireOutcome::Failed(reason) = &self.database_update {
            out.push(format!("database parameter update: {reason}"));
        }
        for entry in &self.services {
            if let WireOutcome::Failed(reason) = &entry.outcome {
                out.push(format!("{}: {reason}", entry.service));
            }
        }
        out
    }

    pub fn has_failures(&self) -> bool {
        !self.failures().is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UnwiringReport {
    pub security_group: String,
    pub services: Vec<ServiceOutcome>,
}

// ---------------------------------------------------------------------------
// DatabaseUpdate
// ---------------------------------------------------------------------------

/// The in-place update applied to the environment's database stack so it
/// admits the new web tier. Parameters here are the base set; wiring appends
/// the web security group itself.
#[derive(Debug, Clone)]
pub struct DatabaseUpdate {
    pub stack_name: String,
    pub template_body: String,
    pub parameters: Vec<Parameter>,
}

// ---------------------------------------------------------------------------
// wire / unwire
// ---------------------------------------------------------------------------

fn ingress_rules(env: &Environment, web_sg: &str) -> [(&'static str, IngressRule); 3] {
    env.downstream.entries().map(|(service, rule)| {
        (
            service,
            IngressRule {
                group_id: rule.security_group_id.clone(),
                source_group_id: web_sg.to_string(),
                protocol: rule.protocol.clone(),
                port: rule.port,
            },
        )
    })
}

/// Register a web security group with the database stack and authorize its
/// ingress on the fixed downstream services. Idempotent: a second pass over
/// the same group reports `AlreadySatisfied` everywhere and changes nothing.
pub async fn wire(
    stacks: &dyn StackClient,
    groups: &dyn SecurityGroupClient,
    env: &Environment,
    web_sg: &str,
    db: &DatabaseUpdate,
) -> WiringReport {
    tracing::info!(
        stack = %db.stack_name,
        "updating database stack with ingress from {web_sg}"
    );
    let mut parameters = db.parameters.clone();
    parameters.push(Parameter::new(DB_PARAM_WEB_SECURITY_GROUP, web_sg));

    let database_update = match stacks
        .update(&db.stack_name, &db.template_body, &parameters)
        .await
    {
        Ok(()) => WireOutcome::Applied,
        Err(ProviderError::AlreadyUpToDate(_)) => {
            tracing::info!(stack = %db.stack_name, "database stack already up to date");
            WireOutcome::AlreadySatisfied
        }
        Err(err) => {
            tracing::warn!(stack = %db.stack_name, "database stack update failed: {err}");
            WireOutcome::Failed(err.to_string())
        }
    };

    let mut services = Vec::new();
    for (service, rule) in ingress_rules(env, web_sg) {
        tracing::info!(%service, port = rule.port, "authorizing ingress from {web_sg}");
        let outcome = WireOutcome::from_authorize(groups.authorize_ingress(&rule).await);
        if let WireOutcome::Failed(reason) = &outcome {
            tracing::warn!(%service, "ingress authorization failed: {reason}");
        }
        services.push(ServiceOutcome { service, outcome });
    }

    WiringReport {
        security_group: web_sg.to_string(),
        database_update,
        services,
    }
}

/// Revoke the downstream ingress a web security group was granted. Rules
/// that are already gone count as satisfied.
pub async fn unwire(
    groups: &dyn SecurityGroupClient,
    env: &Environment,
    web_sg: &str,
) -> UnwiringReport {
    let mut services = Vec::new();
    for (service, rule) in ingress_rules(env, web_sg) {
        tracing::info!(%service, port = rule.port, "revoking ingress from {web_sg}");
        let outcome = WireOutcome::from_revoke(groups.revoke_ingress(&rule).await);
        if let WireOutcome::Failed(reason) = &outcome {
            tracing::warn!(%service, "ingress revocation failed: {reason}");
        }
        services.push(ServiceOutcome { service, outcome });
    }
    UnwiringReport {
        security_group: web_sg.to_string(),
        services,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_env, FakeSecurityGroups, FakeStacks};

    fn db_update() -> DatabaseUpdate {
        DatabaseUpdate {
            stack_name: "fc-dev".to_string(),
            template_body: "{}".to_string(),
            parameters: vec![Parameter::new("KeyName", "fc-dev")],
        }
    }

    #[tokio::test]
    async fn wiring_is_idempotent() {
        let env = test_env();
        let stacks = FakeStacks::default();
        let groups = FakeSecurityGroups::default();

        let first = wire(&stacks, &groups, &env, "sg-new", &db_update()).await;
        assert!(!first.has_failures());
        assert!(first
            .services
            .iter()
            .all(|s| s.outcome == WireOutcome::Applied));
        let links_after_first = groups.links();

        let second = wire(&stacks, &groups, &env, "sg-new", &db_update()).await;
        assert!(!second.has_failures());
        assert!(second
            .services
            .iter()
            .all(|s| s.outcome == WireOutcome::AlreadySatisfied));
        assert_eq!(groups.links(), links_after_first);
    }

    #[tokio::test]
    async fn database_already_up_to_date_is_not_fatal() {
        let env = test_env();
        let stacks = FakeStacks::default();
        stacks.fail_update_with(ProviderError::AlreadyUpToDate("fc-dev".into()));
        let groups = FakeSecurityGroups::default();

        let report = wire(&stacks, &groups, &env, "sg-new", &db_update()).await;
        assert_eq!(report.database_update, WireOutcome::AlreadySatisfied);
        // Downstream authorization still ran.
        assert_eq!(groups.links().len(), 3);
    }

    #[tokio::test]
    async fn one_failed_service_does_not_block_the_others() {
        let env = test_env();
        let stacks = FakeStacks::default();
        let groups = FakeSecurityGroups::default();
        groups.fail_group(&env.downstream.log_pipeline.security_group_id);

        let report = wire(&stacks, &groups, &env, "sg-new", &db_update()).await;
        assert!(report.has_failures());
        assert_eq!(report.failures().len(), 1);
        assert!(report.failures()[0].contains("log-pipeline"));
        // The other two rules landed.
        assert_eq!(groups.links().len(), 2);
    }

    #[tokio::test]
    async fn unwire_tolerates_missing_rules() {
        let env = test_env();
        let stacks = FakeStacks::default();
        let groups = FakeSecurityGroups::default();

        wire(&stacks, &groups, &env, "sg-old", &db_update()).await;
        let report = unwire(&groups, &env, "sg-old").await;
        assert!(report
            .services
            .iter()
            .all(|s| s.outcome == WireOutcome::Applied));
        assert!(groups.links().is_empty());

        // Second unwire: everything already gone, still success.
        let again = unwire(&groups, &env, "sg-old").await;
        assert!(again
            .services
            .iter()
            .all(|s| s.outcome == WireOutcome::AlreadySatisfied));
    }

    #[tokio::test]
    async fn database_update_carries_the_security_group_parameter() {
        let env = test_env();
        let stacks = FakeStacks::default();
        let groups = FakeSecurityGroups::default();

        wire(&stacks, &groups, &env, "sg-new", &db_update()).await;

        let calls = stacks.update_calls();
        assert_eq!(calls.len(), 1);
        let (name, params) = &calls[0];
        assert_eq!(name, "fc-dev");
        assert!(params
            .iter()
            .any(|p| p.key == DB_PARAM_WEB_SECURITY_GROUP && p.value == "sg-new"));
        assert!(params.iter().any(|p| p.key == "KeyName"));
    }
}
