use crate::environment::Environment;
use crate::error::{DeployError, Result};
use crate::naming::StackName;
use crate::provider::{
    Parameter, ProviderError, SecurityGroupClient, Stack, StackClient, StackStatus,
};
use crate::retry::{with_retry, RetryPolicy};
use crate::wiring::{self, DatabaseUpdate, UnwiringReport, WiringReport};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// PollConfig
// ---------------------------------------------------------------------------

/// Polling cadence for stack creation. The wait is bounded: hitting
/// `max_wait` surfaces a distinct timeout error instead of hanging the run.
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_wait: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            max_wait: Duration::from_secs(30 * 60),
        }
    }
}

// ---------------------------------------------------------------------------
// DeployPhase
// ---------------------------------------------------------------------------

/// Observed states of one web-tier deployment. `Creating` repeats once per
/// poll observation, so a report reads as the actual transition history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployPhase {
    Requested,
    Creating,
    Ready,
    Wired,
    Failed,
}

impl fmt::Display for DeployPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeployPhase::Requested => "requested",
            DeployPhase::Creating => "creating",
            DeployPhase::Ready => "ready",
            DeployPhase::Wired => "wired",
            DeployPhase::Failed => "failed",
        })
    }
}

// ---------------------------------------------------------------------------
// DeployRequest / DeployReport / TeardownReport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DeployRequest {
    pub stack_name: StackName,
    pub template_body: String,
    pub parameters: Vec<Parameter>,
    pub database: DatabaseUpdate,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeployReport {
    pub stack_name: String,
    pub phases: Vec<DeployPhase>,
    pub security_group: Option<String>,
    pub wiring: Option<WiringReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TeardownReport {
    pub stack_name: String,
    pub unwiring: Option<UnwiringReport>,
}

// ---------------------------------------------------------------------------
// LifecycleController
// ---------------------------------------------------------------------------

/// Drives one web-tier stack through create → poll-until-ready → validate →
/// wire, and the matching teardown (unwire → delete). Clients are injected;
/// re-running a partially completed deployment is safe because every wiring
/// step tolerates already-satisfied state.
pub struct LifecycleController {
    stacks: Arc<dyn StackClient>,
    groups: Arc<dyn SecurityGroupClient>,
    poll: PollConfig,
    retry: RetryPolicy,
}

impl LifecycleController {
    pub fn new(stacks: Arc<dyn StackClient>, groups: Arc<dyn SecurityGroupClient>) -> Self {
        Self {
            stacks,
            groups,
            poll: PollConfig::default(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn describe(&self, name: &str) -> std::result::Result<Stack, ProviderError> {
        with_retry(&self.retry, || self.stacks.describe(name)).await
    }

    /// Run the full deployment state machine for one web stack.
    pub async fn deploy(
        &self,
        env: &Environment,
        request: &DeployRequest,
        cancel: &CancellationToken,
    ) -> Result<DeployReport> {
        let name = request.stack_name.to_string();
        let mut phases = vec![DeployPhase::Requested];

        // Create, or resume polling if a previous run already created it.
        match self.describe(&name).await {
            Ok(stack) => {
                tracing::info!(stack = %name, status = %stack.status, "stack already exists, resuming");
            }
            Err(ProviderError::NotFound(_)) => {
                tracing::info!(stack = %name, "creating stack");
                self.stacks
                    .create(&name, &request.template_body, &request.parameters)
                    .await?;
            }
            Err(err) => return Err(err.into()),
        }

        let stack = self.wait_until_created(&name, cancel, &mut phases).await?;

        if cancel.is_cancelled() {
            return Err(DeployError::Cancelled { name });
        }

        // The database stack holds durable state and is updated in place;
        // refusing to wire against a stack in any other state is the gate
        // that keeps a broken migration from taking traffic.
        let db_stack = self.describe(&request.database.stack_name).await?;
        if db_stack.status != StackStatus::UpdateComplete {
            phases.push(DeployPhase::Failed);
            return Err(DeployError::DatabaseNotReady {
                name: db_stack.name,
                status: db_stack.status.to_string(),
            });
        }

        let security_group = stack.web_security_group().map(str::to_string);
        let wiring = match &security_group {
            None => {
                tracing::info!(stack = %name, "no web security group output, nothing to wire");
                None
            }
            Some(sg) => {
                let report = wiring::wire(
                    self.stacks.as_ref(),
                    self.groups.as_ref(),
                    env,
                    sg,
                    &request.database,
                )
                .await;
                phases.push(DeployPhase::Wired);
                Some(report)
            }
        };

        Ok(DeployReport {
            stack_name: name,
            phases,
            security_group,
            wiring,
        })
    }

    async fn wait_until_created(
        &self,
        name: &str,
        cancel: &CancellationToken,
        phases: &mut Vec<DeployPhase>,
    ) -> Result<Stack> {
        let started = Instant::now();
        loop {
            let stack = self.describe(name).await?;
            match stack.status {
                StackStatus::CreateInProgress => {
                    phases.push(DeployPhase::Creating);
                    tracing::info!(stack = %name, "stack creation in progress, waiting");
                }
                StackStatus::CreateComplete => {
                    phases.push(DeployPhase::Ready);
                    return Ok(stack);
                }
                other => {
                    phases.push(DeployPhase::Failed);
                    return Err(DeployError::CreateFailed {
                        name: name.to_string(),
                        status: other.to_string(),
                    });
                }
            }

            let waited = started.elapsed();
            if waited >= self.poll.max_wait {
                return Err(DeployError::DeployTimeout {
                    name: name.to_string(),
                    waited_secs: waited.as_secs(),
                });
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(DeployError::Cancelled { name: name.to_string() });
                }
                _ = tokio::time::sleep(self.poll.interval) => {}
            }
        }
    }

    /// Revoke downstream ingress for a stack's security group, then delete
    /// the stack. Deletion is fire-and-forget: the provider finishes it
    /// asynchronously and we do not poll to GONE.
    pub async fn teardown(&self, env: &Environment, stack: &Stack) -> Result<TeardownReport> {
        let unwiring = match stack.web_security_group() {
            Some(sg) => Some(wiring::unwire(self.groups.as_ref(), env, sg).await),
            None => None,
        };

        tracing::info!(stack = %stack.name, "deleting stack");
        self.stacks.delete(&stack.name).await?;

        Ok(TeardownReport {
            stack_name: stack.name.clone(),
            unwiring,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
