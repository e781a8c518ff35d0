use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{info, warn};

use scaledown_actuation::{GroupDeletionScheduler, NodeDeletionBatcher};
use scaledown_core::{
    DeletionError, NodeDeleteResult, NodeDeleteResultType, NodeGroup, NodeGroupView,
    ScaleDownConfig, StaticNodeGroup,
};
use scaledown_tracker::NodeDeletionTracker;

use crate::plan::{Plan, Step};

/// Outcome of a simulated scale-down pass.
#[derive(Debug, Serialize)]
pub struct Report {
    pub results: BTreeMap<String, NodeDeleteResult>,
    pub deleted: usize,
    pub failed: usize,
    /// Nodes still being deleted when the wait timed out.
    pub pending: Vec<String>,
    /// Members left in each group after the pass.
    pub remaining: BTreeMap<String, Vec<String>>,
}

pub async fn simulate(
    plan_path: &Path,
    config_path: Option<&Path>,
    format: &str,
    timeout_secs: u64,
) -> anyhow::Result<()> {
    let plan = Plan::from_file(plan_path)?;
    let config = match config_path {
        Some(path) => ScaleDownConfig::from_file(path)?,
        None => ScaleDownConfig::default(),
    };

    let report = run_plan(&plan, &config, Duration::from_secs(timeout_secs)).await?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => {
            println!("{}", format_report(&report));
        }
    }

    Ok(())
}

/// Run every step of `plan` through a fresh scheduler, batcher, and tracker.
pub async fn run_plan(
    plan: &Plan,
    config: &ScaleDownConfig,
    timeout: Duration,
) -> anyhow::Result<Report> {
    plan.validate()?;

    let tracker = NodeDeletionTracker::new();
    let batcher = Arc::new(NodeDeletionBatcher::new(
        tracker.clone(),
        config.delete_interval()?,
    )?);
    let scheduler = Arc::new(GroupDeletionScheduler::new(
        tracker.clone(),
        batcher,
        config.eviction_settings()?,
    ));

    // Group sizes are read once, at the start of the pass.
    let mut groups: HashMap<String, (Arc<StaticNodeGroup>, usize)> = HashMap::new();
    for g in &plan.groups {
        let mut group = StaticNodeGroup::sized(g.id.clone(), g.size, g.atomic);
        if g.fail_deletes {
            group = group.with_failing_deletes();
        }
        let size = group.target_size()?;
        groups.insert(g.id.clone(), (Arc::new(group), size));
    }

    for (i, step) in plan.steps.iter().enumerate() {
        let Some((group, size)) = groups.get(step.group()).cloned() else {
            anyhow::bail!("step {i}: unknown node group {:?}", step.group());
        };
        info!(step = i, group = %group.id(), nodes = step.nodes().len(), "running plan step");

        let view = NodeGroupView::new(
            group.clone(),
            step.nodes().iter().map(|&index| group.node(index)).collect(),
        );

        let mut workers = JoinSet::new();
        for node in view.nodes {
            let group = view.group.clone();
            let scheduler = scheduler.clone();
            let drain = match step {
                Step::Schedule { drain, .. } | Step::Abort { drain, .. } => *drain,
            };
            if drain {
                tracker.start_deletion_with_drain(group.id(), &node.name);
            } else {
                tracker.start_deletion(group.id(), &node.name);
            }

            match step {
                Step::Schedule { .. } => {
                    workers.spawn(async move {
                        scheduler.schedule_deletion(node, group, size, drain);
                    });
                }
                Step::Abort { reason, .. } => {
                    let reason = reason.clone();
                    workers.spawn(async move {
                        let result = NodeDeleteResult::failed(
                            NodeDeleteResultType::ErrorFailedToEvictPods,
                            DeletionError::Drain(reason.clone()),
                        );
                        scheduler.abort_node_deletion(&node, group.id(), drain, &reason, result);
                    });
                }
            }
        }
        while let Some(joined) = workers.join_next().await {
            joined?;
        }
    }

    let settled = tokio::time::timeout(timeout, wait_until_idle(&tracker)).await;
    if settled.is_err() {
        warn!(timeout_secs = timeout.as_secs(), "timed out waiting for deletions to finish");
    }

    let (results, _) = tracker.deletion_results();
    let results: BTreeMap<_, _> = results.into_iter().collect();
    let deleted = results.values().filter(|r| r.is_ok()).count();
    let failed = results.len() - deleted;
    let (mut pending, drained) = tracker.deletions_in_progress();
    pending.extend(drained);
    pending.sort();
    let remaining = groups
        .iter()
        .map(|(id, (group, _))| (id.clone(), group.members()))
        .collect();

    info!(deleted, failed, pending = pending.len(), "simulation finished");
    Ok(Report {
        results,
        deleted,
        failed,
        pending,
        remaining,
    })
}

async fn wait_until_idle(tracker: &NodeDeletionTracker) {
    loop {
        let (empty, drained) = tracker.deletions_in_progress();
        if empty.is_empty() && drained.is_empty() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub fn format_report(report: &Report) -> String {
    let mut out = String::new();
    for (node, result) in &report.results {
        let status = if result.is_ok() { "✓" } else { "✗" };
        match &result.err {
            Some(err) => out.push_str(&format!("{status} {node} {:?}: {err}\n", result.result_type)),
            None => out.push_str(&format!("{status} {node}\n")),
        }
    }
    for node in &report.pending {
        out.push_str(&format!("… {node} still being deleted\n"));
    }
    out.push_str(&format!(
        "\n{} deleted, {} failed, {} pending",
        report.deleted,
        report.failed,
        report.pending.len()
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn run(plan: &str, config: &str) -> Report {
        let plan = Plan::parse(plan).unwrap();
        let config: ScaleDownConfig = toml::from_str(config).unwrap();
        run_plan(&plan, &config, Duration::from_secs(5)).await.unwrap()
    }

    #[tokio::test]
    async fn aborted_atomic_group_is_isolated() {
        let report = run(
            r#"
[[groups]]
id = "atomic-4"
atomic = true
size = 4

[[groups]]
id = "atomic-2"
atomic = true
size = 2

[[steps]]
action = "schedule"
group = "atomic-4"
nodes = [0, 1]

[[steps]]
action = "schedule"
group = "atomic-2"
nodes = [0, 1]

[[steps]]
action = "abort"
group = "atomic-4"
nodes = [2]

[[steps]]
action = "schedule"
group = "atomic-4"
nodes = [3]
"#,
            "",
        )
        .await;

        assert_eq!(report.deleted, 2);
        assert_eq!(report.failed, 4);
        assert!(report.pending.is_empty());
        assert!(report.remaining["atomic-2"].is_empty());
        assert_eq!(report.remaining["atomic-4"].len(), 4);
    }

    #[tokio::test]
    async fn batched_regular_group_with_failing_cloud() {
        let report = run(
            r#"
[[groups]]
id = "flaky"
size = 2
fail_deletes = true

[[groups]]
id = "test"
size = 3

[[steps]]
action = "schedule"
group = "test"
nodes = [0, 1, 2]
drain = true

[[steps]]
action = "schedule"
group = "flaky"
nodes = [0, 1]
"#,
            "[batcher]\ndelete_interval = \"20ms\"\n",
        )
        .await;

        assert_eq!(report.deleted, 3);
        assert_eq!(report.failed, 2);
        let flaky = &report.results["flaky-node-0"];
        assert_eq!(flaky.result_type, NodeDeleteResultType::ErrorFailedToDelete);
        assert!(report.remaining["test"].is_empty());

        let text = format_report(&report);
        assert!(text.contains("3 deleted, 2 failed, 0 pending"));
    }
}
