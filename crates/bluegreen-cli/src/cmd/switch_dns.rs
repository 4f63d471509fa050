use crate::output::print_json;
use bluegreen_core::aws;
use bluegreen_core::dns;
use bluegreen_core::retry::RetryPolicy;
use std::path::Path;

pub async fn run(config: &Path, env: &str, json: bool) -> anyhow::Result<()> {
    let env = super::load_environment(config, env)?;

    let clients = aws::connect(&env.region).await;
    let report = dns::switch(&env, &clients.balancers, &clients.dns, &RetryPolicy::default())
        .await?;

    if json {
        print_json(&report)?;
        return Ok(());
    }

    println!(
        "Set {} ALIAS to {} ({})",
        report.record, report.target.dns_name, report.target.hosted_zone_id
    );
    if report.sole_balancer {
        println!("WARNING: only one load balancer in place, switch may have no effect");
    }
    Ok(())
}
