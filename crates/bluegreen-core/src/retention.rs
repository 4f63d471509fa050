use crate::environment::Environment;
use crate::lifecycle::LifecycleController;
use crate::naming::{StackName, VersionToken};
use crate::provider::Stack;
use serde::Serialize;

/// Retained stacks never drop below this, so there is always a previous
/// deployment to roll back to.
pub const MIN_KEEP: usize = 2;

// ---------------------------------------------------------------------------
// RetentionPlan
// ---------------------------------------------------------------------------

/// Partition of an environment's web stacks into keep and retire, newest
/// first. Computed fresh on every invocation, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct RetentionPlan {
    pub keep: Vec<Stack>,
    pub retire: Vec<Stack>,
}

/// Compute which stacks are safe to delete. Candidates are the stacks whose
/// names parse under the web naming convention for this environment;
/// `exclude` drops the just-created stack by exact version-token equality
/// (substring matching could misfire if one token ever prefixes another).
/// `keep` is coerced up to [`MIN_KEEP`].
pub fn plan(
    stacks: Vec<Stack>,
    env: &Environment,
    exclude: Option<&VersionToken>,
    keep: usize,
) -> RetentionPlan {
    let keep = keep.max(MIN_KEEP);
    let prefix = StackName::web_prefix(&env.product, env.name);

    let mut candidates: Vec<Stack> = stacks
        .into_iter()
        .filter(|s| s.name.starts_with(&prefix))
        .filter(|s| match StackName::parse(&s.name) {
            Ok(parsed) => exclude.is_none() || parsed.token() != exclude,
            Err(_) => false,
        })
        .collect();

    candidates.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    let cut = keep.min(candidates.len());
    let retire = candidates.split_off(cut);
    RetentionPlan {
        keep: candidates,
        retire,
    }
}

// ---------------------------------------------------------------------------
// Pruning
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct PruneFailure {
    pub stack: String,
    pub reason: String,
}

/// Outcome of a pruning pass; failures are reported distinctly from
/// deletions and never abort the batch.
#[derive(Debug, Clone, Serialize)]
pub struct PruneReport {
    pub deleted: Vec<String>,
    pub failed: Vec<PruneFailure>,
}

/// Tear down every stack in the retire set, sequentially, continuing past
/// individual failures — one stuck stack must not block the rest.
pub async fn prune(
    controller: &LifecycleController,
    env: &Environment,
    plan: &RetentionPlan,
) -> PruneReport {
    tracing::info!(count = plan.retire.len(), "deleting superseded stacks");
    let mut report = PruneReport {
        deleted: Vec::new(),
        failed: Vec::new(),
    };
    for stack in &plan.retire {
        tracing::info!(stack = %stack.name, "deleting");
        match controller.teardown(env, stack).await {
            Ok(_) => report.deleted.push(stack.name.clone()),
            Err(err) => {
                tracing::warn!(stack = %stack.name, "deletion failed: {err}");
                report.failed.push(PruneFailure {
                    stack: stack.name.clone(),
                    reason: err.to_string(),
                });
            }
        }
    }
    report
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{StackClient, StackStatus};
    use crate::retry::RetryPolicy;
    use crate::test_support::{stack, test_env, FakeSecurityGroups, FakeStacks};
    use std::sync::Arc;

    fn web(token_day: u32) -> Stack {
        // Day doubles as the uniqueness discriminator and the age.
        stack(
            &format!("fc-dev-web-abc{token_day:03x}-202001{token_day:02}-1200"),
            StackStatus::CreateComplete,
            token_day,
        )
    }

    fn candidates() -> Vec<Stack> {
        vec![
            web(1),
            web(2),
            web(3),
            web(4),
            stack("fc-prod-web-abcdef-20200101-1200", StackStatus::CreateComplete, 1),
            stack("fc-dev", StackStatus::UpdateComplete, 1),
            stack("unrelated-stack", StackStatus::CreateComplete, 1),
        ]
    }

    #[test]
    fn keeps_the_newest_and_retires_the_rest() {
        let plan = plan(candidates(), &test_env(), None, 2);
        let kept: Vec<_> = plan.keep.iter().map(|s| s.name.as_str()).collect();
        let retired: Vec<_> = plan.retire.iter().map(|s| s.name.as_str()).collect();

        assert_eq!(
            kept,
            vec![
                "fc-dev-web-abc004-20200104-1200",
                "fc-dev-web-abc003-20200103-1200"
            ]
        );
        assert_eq!(
            retired,
            vec![
                "fc-dev-web-abc002-20200102-1200",
                "fc-dev-web-abc001-20200101-1200"
            ]
        );
    }

    #[test]
    fn never_retires_more_than_candidates_minus_keep() {
        for keep in 2..=6 {
            let plan = plan(candidates(), &test_env(), None, keep);
            assert!(plan.retire.len() <= 4usize.saturating_sub(keep));
            assert_eq!(plan.keep.len() + plan.retire.len(), 4);
        }
    }

    #[test]
    fn keep_below_minimum_is_coerced_up() {
        for low in [0, 1] {
            let plan = plan(candidates(), &test_env(), None, low);
            assert_eq!(plan.keep.len(), MIN_KEEP);
            assert_eq!(plan.retire.len(), 2);
        }
    }

    #[test]
    fn excluded_token_is_never_a_candidate() {
        let current = VersionToken::parse("abc001-20200101-1200").unwrap();
        let plan = plan(candidates(), &test_env(), Some(&current), 2);

        let all: Vec<_> = plan
            .keep
            .iter()
            .chain(plan.retire.iter())
            .map(|s| s.name.as_str())
            .collect();
        assert!(!all.contains(&"fc-dev-web-abc001-20200101-1200"));
        // Remaining candidates partition as usual.
        assert_eq!(plan.keep.len(), 2);
        assert_eq!(
            plan.retire.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            vec!["fc-dev-web-abc002-20200102-1200"]
        );
    }

    #[test]
    fn exclusion_is_exact_match_on_the_token() {
        let stacks = vec![
            stack("fc-dev-web-abcdef-20200101-1200", StackStatus::CreateComplete, 1),
            stack("fc-dev-web-abcdef0-20200101-1200", StackStatus::CreateComplete, 2),
        ];
        let current = VersionToken::parse("abcdef-20200101-1200").unwrap();
        let plan = plan(stacks, &test_env(), Some(&current), 2);

        // The longer token shares a prefix with the excluded one but stays.
        assert_eq!(plan.keep.len(), 1);
        assert_eq!(plan.keep[0].name, "fc-dev-web-abcdef0-20200101-1200");
    }

    #[test]
    fn foreign_and_unparseable_names_are_ignored() {
        let stacks = vec![
            stack("fc-dev-web-bogus", StackStatus::CreateComplete, 1),
            stack("fc-dev-web-", StackStatus::CreateComplete, 1),
            web(1),
        ];
        let plan = plan(stacks, &test_env(), None, 2);
        assert_eq!(plan.keep.len(), 1);
        assert!(plan.retire.is_empty());
    }

    #[tokio::test]
    async fn prune_continues_past_individual_failures() {
        let env = test_env();
        let stacks = Arc::new(FakeStacks::default());
        let groups = Arc::new(FakeSecurityGroups::default());
        for day in 1..=5 {
            let s = web(day);
            stacks.insert_ready(&s.name, StackStatus::CreateComplete, &[]);
        }
        stacks.fail_delete("fc-dev-web-abc002-20200102-1200");

        let controller = LifecycleController::new(stacks.clone(), groups.clone())
            .with_retry(RetryPolicy::none());
        let listed = stacks.list().await.unwrap();
        let plan = plan(listed, &env, None, 2);
        assert_eq!(plan.retire.len(), 3);

        let report = prune(&controller, &env, &plan).await;
        assert_eq!(report.deleted.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].stack, "fc-dev-web-abc002-20200102-1200");
        // The stuck stack did not block the others.
        assert!(report.deleted.contains(&"fc-dev-web-abc001-20200101-1200".to_string()));
        assert!(report.deleted.contains(&"fc-dev-web-abc003-20200103-1200".to_string()));
    }
}
