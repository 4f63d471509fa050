use crate::output::print_json;
use bluegreen_core::aws;
use bluegreen_core::lifecycle::LifecycleController;
use bluegreen_core::naming::VersionToken;
use bluegreen_core::provider::StackClient;
use bluegreen_core::retention;
use bluegreen_core::retry::{with_retry, RetryPolicy};
use clap::Args;
use std::path::Path;
use std::sync::Arc;

#[derive(Args)]
pub struct PruneArgs {
    /// Environment (dev|prod)
    #[arg(long, default_value = "dev")]
    pub env: String,

    /// Number of newest stacks to keep (minimum 2)
    #[arg(long, default_value_t = retention::MIN_KEEP)]
    pub keep: usize,

    /// Version token of the current deployment, excluded from deletion
    #[arg(long)]
    pub version: Option<String>,
}

pub async fn run(config: &Path, args: PruneArgs, json: bool) -> anyhow::Result<()> {
    let env = super::load_environment(config, &args.env)?;
    let exclude = args
        .version
        .as_deref()
        .map(VersionToken::parse)
        .transpose()?;

    let clients = aws::connect(&env.region).await;
    let stacks = Arc::new(clients.stacks);
    let groups = Arc::new(clients.security_groups);

    let all = with_retry(&RetryPolicy::default(), || stacks.list()).await?;
    let plan = retention::plan(all, &env, exclude.as_ref(), args.keep);

    let controller = LifecycleController::new(stacks, groups);
    let report = retention::prune(&controller, &env, &plan).await;

    if json {
        print_json(&report)?;
        return Ok(());
    }

    for name in &report.deleted {
        println!("Deleted {name}");
    }
    for failure in &report.failed {
        println!("Failed to delete {}: {}", failure.stack, failure.reason);
    }
    println!(
        "Done: {} deleted, {} failed, {} kept",
        report.deleted.len(),
        report.failed.len(),
        plan.keep.len()
    );
    Ok(())
}
