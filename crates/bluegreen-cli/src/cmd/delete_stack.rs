use crate::output::print_json;
use anyhow::{bail, Context};
use bluegreen_core::aws;
use bluegreen_core::lifecycle::LifecycleController;
use bluegreen_core::naming::StackName;
use bluegreen_core::provider::StackClient;
use bluegreen_core::retry::{with_retry, RetryPolicy};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

pub async fn run(config: &Path, name: &str, yes: bool, json: bool) -> anyhow::Result<()> {
    let parsed = StackName::parse(name)?;
    let env = super::load_environment(config, parsed.environment().as_str())?;
    if !name.starts_with(&env.lb_prefix()) {
        bail!(
            "stack '{name}' does not belong to the configured product '{}'",
            env.product
        );
    }

    if !yes && !confirm(&format!("Delete stack {name} and revoke its ingress?"))? {
        println!("Aborted.");
        return Ok(());
    }

    let clients = aws::connect(&env.region).await;
    let stacks = Arc::new(clients.stacks);
    let groups = Arc::new(clients.security_groups);

    let stack = with_retry(&RetryPolicy::default(), || stacks.describe(name))
        .await
        .with_context(|| format!("failed to describe stack '{name}'"))?;

    let controller = LifecycleController::new(stacks, groups);
    let report = controller.teardown(&env, &stack).await?;

    if json {
        print_json(&report)?;
        return Ok(());
    }

    if let Some(unwiring) = &report.unwiring {
        println!("Revoked ingress for {}", unwiring.security_group);
    }
    println!("Deletion of {} requested", report.stack_name);
    Ok(())
}

fn confirm(prompt: &str) -> anyhow::Result<bool> {
    print!("{prompt} [y/N] ");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(matches!(line.trim(), "y" | "Y" | "yes"))
}
