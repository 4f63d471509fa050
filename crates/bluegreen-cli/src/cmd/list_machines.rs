use crate::output::print_json;
use anyhow::Context;
use bluegreen_core::aws;
use bluegreen_core::dns;
use bluegreen_core::error::DeployError;
use bluegreen_core::naming::StackName;
use bluegreen_core::provider::{MachineClient, Stack, StackClient};
use bluegreen_core::retry::{with_retry, RetryPolicy};
use clap::Args;
use serde_json::json;
use std::path::Path;

/// Logical resource ids inside the web template.
const WEB_AUTOSCALE_GROUP: &str = "WebserverAutoScale";
const WORKER_INSTANCE: &str = "WorkerInstance";

#[derive(Args)]
pub struct MachinesArgs {
    /// Environment (dev|prod)
    #[arg(long, default_value = "dev")]
    pub env: String,

    /// Only the web autoscaling instances
    #[arg(long, conflicts_with = "only_worker")]
    pub only_web: bool,

    /// Only the auxiliary worker instance
    #[arg(long)]
    pub only_worker: bool,
}

pub async fn run(config: &Path, args: MachinesArgs, json: bool) -> anyhow::Result<()> {
    let env = super::load_environment(config, &args.env)?;

    let clients = aws::connect(&env.region).await;
    let retry = RetryPolicy::default();

    let prefix = StackName::web_prefix(&env.product, env.name);
    let stacks: Vec<Stack> = with_retry(&retry, || clients.stacks.list())
        .await?
        .into_iter()
        .filter(|s| s.name.starts_with(&prefix))
        .collect();

    let alias = dns::live_alias(&env, &clients.dns)
        .await?
        .ok_or_else(|| DeployError::NoLiveStack(env.name.to_string()))?;
    let live = dns::live_stack(&stacks, &alias)
        .ok_or_else(|| DeployError::NoLiveStack(env.name.to_string()))?;

    let verbose = !args.only_web && !args.only_worker;

    let mut web = Vec::new();
    if args.only_web || verbose {
        if let Some(group_id) = clients
            .machines
            .stack_resource(&live.name, WEB_AUTOSCALE_GROUP)
            .await?
        {
            let ids = clients.machines.group_instance_ids(&group_id).await?;
            web = clients
                .machines
                .instance_public_dns(&ids)
                .await
                .context("failed to resolve web instance DNS names")?;
        }
    }

    let mut worker = None;
    if args.only_worker || verbose {
        if let Some(instance_id) = clients
            .machines
            .stack_resource(&live.name, WORKER_INSTANCE)
            .await?
        {
            worker = clients
                .machines
                .instance_public_dns(&[instance_id])
                .await
                .context("failed to resolve worker instance DNS name")?
                .into_iter()
                .next();
        }
    }

    if json {
        print_json(&json!({
            "stack": live.name,
            "web": (args.only_web || verbose).then_some(&web),
            "worker": worker,
        }))?;
        return Ok(());
    }

    if args.only_web || verbose {
        let label = if verbose { "web: " } else { "" };
        println!("{label}{}", web.join(","));
    }
    if let Some(worker) = &worker {
        let label = if verbose { "worker: " } else { "" };
        println!("{label}{worker}");
    }
    Ok(())
}
