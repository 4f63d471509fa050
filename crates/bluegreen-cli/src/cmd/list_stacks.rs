use crate::output::{print_json, print_table};
use bluegreen_core::aws;
use bluegreen_core::dns;
use bluegreen_core::environment::{EnvName, Environment};
use bluegreen_core::provider::{Stack, StackClient, StackEvent};
use bluegreen_core::retry::{with_retry, RetryPolicy};
use serde_json::json;
use std::collections::BTreeSet;
use std::path::Path;

pub async fn run(config: &Path, env_filter: Option<&str>, json: bool) -> anyhow::Result<()> {
    let registry = super::load_registry(config)?;
    let selected: Vec<Environment> = match env_filter {
        Some(name) => vec![registry.get(name.parse::<EnvName>()?)?.clone()],
        None => registry.environments.values().cloned().collect(),
    };

    let mut rows = Vec::new();
    let mut entries = Vec::new();
    for env in &selected {
        let clients = aws::connect(&env.region).await;
        let retry = RetryPolicy::default();

        let prefix = env.lb_prefix();
        let stacks: Vec<Stack> = with_retry(&retry, || clients.stacks.list())
            .await?
            .into_iter()
            .filter(|s| s.name.starts_with(&prefix))
            .collect();

        let live_name = match dns::live_alias(env, &clients.dns).await {
            Ok(Some(alias)) => dns::live_stack(&stacks, &alias).map(|s| s.name.clone()),
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(environment = %env.name, "live record lookup failed: {err}");
                None
            }
        };

        for stack in &stacks {
            let live_at = (live_name.as_deref() == Some(stack.name.as_str()))
                .then(|| env.dns_name.clone())
                .unwrap_or_default();
            let errors = failure_summary(&clients.stacks, &stack.name).await;

            entries.push(json!({
                "name": stack.name,
                "status": stack.status,
                "created_at": stack.created_at,
                "live_at": (!live_at.is_empty()).then_some(&live_at),
                "errors": (!errors.is_empty()).then_some(&errors),
            }));
            rows.push(vec![
                stack.name.clone(),
                stack.status.to_string(),
                stack.created_at.to_rfc3339(),
                live_at,
                errors,
            ]);
        }
    }

    if json {
        print_json(&entries)?;
        return Ok(());
    }

    if rows.is_empty() {
        println!("No stacks.");
        return Ok(());
    }
    print_table(&["NAME", "STATUS", "CREATED AT", "LIVE @", "ERRORS"], rows);
    Ok(())
}

async fn failure_summary(stacks: &dyn StackClient, name: &str) -> String {
    match stacks.events(name).await {
        Ok(events) => summarize_failures(&events),
        Err(err) => {
            tracing::debug!(stack = %name, "event lookup failed: {err}");
            String::new()
        }
    }
}

/// Distinct failure reasons among a stack's ten most recent events.
fn summarize_failures(events: &[StackEvent]) -> String {
    let mut seen = BTreeSet::new();
    events
        .iter()
        .take(10)
        .filter(|e| e.resource_status.ends_with("FAILED"))
        .filter_map(|e| e.reason.as_deref())
        .filter(|reason| seen.insert(reason.to_string()))
        .collect::<Vec<_>>()
        .join(" | ")
}
