use crate::output::print_json;
use crate::revision;
use anyhow::Context;
use bluegreen_core::aws;
use bluegreen_core::lifecycle::{DeployRequest, LifecycleController};
use bluegreen_core::naming::{StackName, VersionToken};
use bluegreen_core::provider::{Parameter, StackClient};
use bluegreen_core::retention;
use bluegreen_core::retry::{with_retry, RetryPolicy};
use bluegreen_core::wiring::DatabaseUpdate;
use chrono::Utc;
use clap::Args;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Args)]
pub struct DeployArgs {
    /// Environment (dev|prod)
    #[arg(long, default_value = "dev")]
    pub env: String,

    /// Base machine image for the web tier
    #[arg(long)]
    pub ami: String,

    /// Machine image for the auxiliary worker node
    #[arg(long)]
    pub worker_ami: Option<String>,

    /// Revision to deploy; defaults to HEAD of --source
    #[arg(long)]
    pub commit: Option<String>,

    /// Source checkout used to derive the version token
    #[arg(long, default_value = ".")]
    pub source: PathBuf,

    /// Database user (non-production only)
    #[arg(long)]
    pub db_user: Option<String>,

    /// Database password (non-production only)
    #[arg(long)]
    pub db_pass: Option<String>,

    /// Allowed CORS origins passed to the database stack
    #[arg(long, default_value = "*")]
    pub cors: String,

    /// Number of stacks to keep after deploying, including this one
    #[arg(long, default_value_t = retention::MIN_KEEP)]
    pub keep: usize,
}

pub async fn run(
    config: &Path,
    args: DeployArgs,
    json: bool,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let env = super::load_environment(config, &args.env)?;

    let token = match &args.commit {
        Some(commit) => VersionToken::new(commit, Utc::now())?,
        None => revision::version_token_from_git(&args.source)?,
    };
    let stack_name = StackName::web(&env.product, env.name, token.clone());
    tracing::info!(stack = %stack_name, "deploying version {token}");

    let mut parameters = vec![
        Parameter::new("KeyName", env.key_name()),
        Parameter::new("BaseAmi", &args.ami),
        Parameter::new("Environment", env.name.as_str()),
        Parameter::new("Version", token.as_str()),
    ];
    if let Some(worker_ami) = &args.worker_ami {
        parameters.push(Parameter::new("WorkerAmi", worker_ami));
    }

    let mut db_parameters = vec![
        Parameter::new("KeyName", env.key_name()),
        Parameter::new("Environment", env.name.as_str()),
        Parameter::new("CorsAllowedOrigins", &args.cors),
    ];
    if !env.name.is_production() {
        if let Some(user) = &args.db_user {
            db_parameters.push(Parameter::new("DBUser", user));
        }
        if let Some(pass) = &args.db_pass {
            db_parameters.push(Parameter::new("DBPassword", pass));
        }
    }

    let request = DeployRequest {
        stack_name,
        template_body: super::read_template(config, &env.templates.web)?,
        parameters,
        database: DatabaseUpdate {
            stack_name: StackName::db(&env.product, env.name).to_string(),
            template_body: super::read_template(config, &env.templates.database)?,
            parameters: db_parameters,
        },
    };

    let clients = aws::connect(&env.region).await;
    let stacks = Arc::new(clients.stacks);
    let groups = Arc::new(clients.security_groups);
    let controller = LifecycleController::new(stacks.clone(), groups.clone());

    let report = controller
        .deploy(&env, &request, cancel)
        .await
        .context("deployment failed")?;

    if let Some(wiring) = &report.wiring {
        for failure in wiring.failures() {
            tracing::warn!("wiring step failed: {failure}");
        }
    }

    let all = with_retry(&RetryPolicy::default(), || stacks.list()).await?;
    let plan = retention::plan(all, &env, Some(&token), args.keep);
    let prune = retention::prune(&controller, &env, &plan).await;

    if json {
        print_json(&json!({ "deploy": report, "prune": prune }))?;
        return Ok(());
    }

    println!("Deployed {}", report.stack_name);
    match &report.security_group {
        Some(sg) => println!("Wired security group {sg} into downstream services"),
        None => println!("Stack has no web security group output, nothing to wire"),
    }
    if !prune.deleted.is_empty() {
        println!("Pruned: {}", prune.deleted.join(", "));
    }
    for failure in &prune.failed {
        println!("Failed to prune {}: {}", failure.stack, failure.reason);
    }
    println!("Next: bluegreen switch-dns --env {}", env.name);
    Ok(())
}
