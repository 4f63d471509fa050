use crate::environment::Environment;
use crate::error::{DeployError, Result};
use crate::provider::{AliasTarget, DnsClient, LoadBalancer, LoadBalancerClient, Stack};
use crate::retry::{with_retry, RetryPolicy};
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Balancer selection
// ---------------------------------------------------------------------------

/// Pick the cutover target among an environment's load balancers: the
/// lexicographically-last name carrying the `{product}-{env}` prefix. Zero
/// matches is a fatal precondition; exactly one is accepted but flagged,
/// since a single balancer means the switch may have no effect.
pub fn select_balancer(
    env: &Environment,
    balancers: Vec<LoadBalancer>,
) -> Result<(LoadBalancer, bool)> {
    let prefix = env.lb_prefix();
    let mut matches: Vec<LoadBalancer> = balancers
        .into_iter()
        .filter(|lb| lb.name.starts_with(&prefix))
        .collect();

    if matches.is_empty() {
        return Err(DeployError::NoLoadBalancer {
            environment: env.name.to_string(),
            prefix,
        });
    }

    let sole = matches.len() == 1;
    if sole {
        tracing::warn!(
            environment = %env.name,
            "only one load balancer in place, switch may have no effect"
        );
    }

    matches.sort_by(|a, b| a.name.cmp(&b.name));
    Ok((matches.pop().expect("non-empty"), sole))
}

// ---------------------------------------------------------------------------
// Cutover
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct CutoverReport {
    pub record: String,
    pub balancer: String,
    pub target: AliasTarget,
    /// True when only one balancer matched; the operator should know there
    /// is no redundancy behind the switch.
    pub sole_balancer: bool,
}

/// Repoint the environment's DNS record at its newest load balancer. The
/// upsert is a single change batch: readers never observe a window with no
/// record or two conflicting ones.
pub async fn switch(
    env: &Environment,
    balancers: &dyn LoadBalancerClient,
    dns: &dyn DnsClient,
    retry: &RetryPolicy,
) -> Result<CutoverReport> {
    let all = with_retry(retry, || balancers.list()).await?;
    let (target_lb, sole_balancer) = select_balancer(env, all)?;

    let zone_id = dns
        .zone_id(&env.zone)
        .await?
        .ok_or_else(|| DeployError::ZoneNotFound(env.zone.clone()))?;

    let target = AliasTarget {
        dns_name: format!("dualstack.{}.", target_lb.dns_name.to_lowercase()),
        hosted_zone_id: target_lb.hosted_zone_id.clone(),
    };
    dns.upsert_alias(&zone_id, &env.dns_name, &target).await?;

    tracing::info!(
        record = %env.dns_name,
        alias = %target.dns_name,
        "switched DNS alias to {}",
        target_lb.name
    );

    Ok(CutoverReport {
        record: env.dns_name.clone(),
        balancer: target_lb.name,
        target,
        sole_balancer,
    })
}

/// The alias DNS name the environment's record currently points at.
pub async fn live_alias(env: &Environment, dns: &dyn DnsClient) -> Result<Option<String>> {
    let Some(zone_id) = dns.zone_id(&env.zone).await? else {
        return Ok(None);
    };
    Ok(dns.resolve_alias(&zone_id, &env.dns_name).await?)
}

// ---------------------------------------------------------------------------
// Live-stack detection
// ---------------------------------------------------------------------------

fn alias_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^dualstack\.[a-z0-9]+-(?:dev|prod)-(.+?)-\d+\.[a-z0-9-]+\.elb\.amazonaws\.com\.?$")
            .expect("alias regex")
    })
}

/// Extract the balancer-specific root from a provider alias DNS name, e.g.
/// `dualstack.fc-dev-abcdef-1234567890.us-east-1.elb.amazonaws.com.` →
/// `abcdef`.
pub fn alias_root(alias_dns: &str) -> Option<String> {
    alias_re()
        .captures(alias_dns)
        .map(|c| c[1].to_string())
}

/// Which of the given stacks is live behind the alias. Display-only glue:
/// the alias root is matched by containment, as the balancer name embeds a
/// fragment of the stack name rather than the full version token.
pub fn live_stack<'a>(stacks: &'a [Stack], alias_dns: &str) -> Option<&'a Stack> {
    let root = alias_root(alias_dns)?;
    stacks.iter().find(|s| s.name.contains(&root))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::StackStatus;
    use crate::test_support::{stack, test_env, FakeBalancers, FakeDns};

    #[test]
    fn selects_last_matching_balancer_for_the_environment() {
        let balancers = vec![
            LoadBalancer {
                name: "fc-dev-1900x".into(),
                dns_name: "fc-dev-1900x-111.us-east-1.elb.amazonaws.com".into(),
                hosted_zone_id: "Z1".into(),
            },
            LoadBalancer {
                name: "fc-dev-1901x".into(),
                dns_name: "fc-dev-1901x-222.us-east-1.elb.amazonaws.com".into(),
                hosted_zone_id: "Z1".into(),
            },
            LoadBalancer {
                name: "fc-prod-2000x".into(),
                dns_name: "fc-prod-2000x-333.us-east-1.elb.amazonaws.com".into(),
                hosted_zone_id: "Z1".into(),
            },
        ];

        let (selected, sole) = select_balancer(&test_env(), balancers).unwrap();
        assert_eq!(selected.name, "fc-dev-1901x");
        assert!(!sole);
    }

    #[test]
    fn zero_matches_is_fatal() {
        let balancers = vec![LoadBalancer {
            name: "fc-prod-2000x".into(),
            dns_name: "fc-prod-2000x-333.us-east-1.elb.amazonaws.com".into(),
            hosted_zone_id: "Z1".into(),
        }];
        let err = select_balancer(&test_env(), balancers).unwrap_err();
        assert!(matches!(err, DeployError::NoLoadBalancer { .. }));
        assert!(err.to_string().contains("fc-dev"));
    }

    #[test]
    fn single_match_is_accepted_but_flagged() {
        let balancers = vec![LoadBalancer {
            name: "fc-dev-1900x".into(),
            dns_name: "fc-dev-1900x-111.us-east-1.elb.amazonaws.com".into(),
            hosted_zone_id: "Z1".into(),
        }];
        let (selected, sole) = select_balancer(&test_env(), balancers).unwrap();
        assert_eq!(selected.name, "fc-dev-1900x");
        assert!(sole);
    }

    #[tokio::test]
    async fn switch_upserts_one_atomic_alias_record() {
        let env = test_env();
        let balancers = FakeBalancers::with_names(&["fc-dev-1900x", "fc-dev-1901x"]);
        let dns = FakeDns::with_zone("example.org", "ZONE1");

        let report = switch(&env, &balancers, &dns, &RetryPolicy::none())
            .await
            .unwrap();

        assert_eq!(report.balancer, "fc-dev-1901x");
        assert_eq!(
            report.target.dns_name,
            "dualstack.fc-dev-1901x-1234567890.us-east-1.elb.amazonaws.com."
        );
        // Alias zone is the balancer's own canonical hosted zone.
        assert_eq!(report.target.hosted_zone_id, "Z35SXDOTRQ7X7K");
        assert_eq!(dns.batches().len(), 1);
        assert_eq!(dns.record_count("ZONE1", "test.example.org"), 1);

        // A second switch is one more batch, still exactly one record.
        switch(&env, &balancers, &dns, &RetryPolicy::none())
            .await
            .unwrap();
        assert_eq!(dns.batches().len(), 2);
        assert_eq!(dns.record_count("ZONE1", "test.example.org"), 1);
    }

    #[tokio::test]
    async fn switch_requires_a_known_zone() {
        let env = test_env();
        let balancers = FakeBalancers::with_names(&["fc-dev-1900x"]);
        let dns = FakeDns::default();

        let err = switch(&env, &balancers, &dns, &RetryPolicy::none())
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::ZoneNotFound(_)));
    }

    #[test]
    fn alias_root_parses_provider_names() {
        assert_eq!(
            alias_root("dualstack.fc-dev-abcdef-1234567890.us-east-1.elb.amazonaws.com.").as_deref(),
            Some("abcdef")
        );
        assert_eq!(
            alias_root("dualstack.fc-prod-19x-42.eu-west-1.elb.amazonaws.com").as_deref(),
            Some("19x")
        );
        assert!(alias_root("fc-dev-abcdef.example.org").is_none());
    }

    #[test]
    fn live_stack_matches_by_alias_root() {
        let stacks = vec![
            stack(
                "fc-dev-web-abcdef-20200101-1200",
                StackStatus::CreateComplete,
                1,
            ),
            stack(
                "fc-dev-web-012345-20200102-1200",
                StackStatus::CreateComplete,
                2,
            ),
        ];
        let live = live_stack(
            &stacks,
            "dualstack.fc-dev-012345-1234567890.us-east-1.elb.amazonaws.com.",
        );
        assert_eq!(live.unwrap().name, "fc-dev-web-012345-20200102-1200");

        assert!(live_stack(
            &stacks,
            "dualstack.fc-dev-zzz-1.us-east-1.elb.amazonaws.com."
        )
        .is_none());
    }
}
