//! Deletion plan files.
//!
//! A plan declares in-memory node groups and an ordered list of steps that
//! schedule or abort members of those groups by index.

use std::collections::HashSet;
use std::path::Path;

use anyhow::bail;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub groups: Vec<GroupPlan>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupPlan {
    pub id: String,
    #[serde(default)]
    pub atomic: bool,
    /// Members are named `{id}-node-{i}` for `i` in `0..size`.
    pub size: usize,
    #[serde(default)]
    pub fail_deletes: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    Schedule {
        group: String,
        nodes: Vec<usize>,
        #[serde(default)]
        drain: bool,
    },
    Abort {
        group: String,
        nodes: Vec<usize>,
        #[serde(default)]
        drain: bool,
        #[serde(default = "default_reason")]
        reason: String,
    },
}

fn default_reason() -> String {
    "simulated abort".to_string()
}

impl Step {
    pub fn group(&self) -> &str {
        match self {
            Step::Schedule { group, .. } | Step::Abort { group, .. } => group,
        }
    }

    pub fn nodes(&self) -> &[usize] {
        match self {
            Step::Schedule { nodes, .. } | Step::Abort { nodes, .. } => nodes,
        }
    }
}

impl Plan {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let plan: Plan = toml::from_str(content)?;
        plan.validate()?;
        Ok(plan)
    }

    /// Reject unknown groups, duplicate group ids, and out-of-range nodes.
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut seen = HashSet::new();
        for group in &self.groups {
            if !seen.insert(group.id.as_str()) {
                bail!("duplicate node group {:?}", group.id);
            }
        }

        for (i, step) in self.steps.iter().enumerate() {
            let Some(group) = self.groups.iter().find(|g| g.id == step.group()) else {
                bail!("step {i}: unknown node group {:?}", step.group());
            };
            if let Some(index) = step.nodes().iter().find(|&&n| n >= group.size) {
                bail!(
                    "step {i}: node index {index} out of range for group {:?} of size {}",
                    group.id,
                    group.size
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN: &str = r#"
[[groups]]
id = "atomic-4"
atomic = true
size = 4

[[groups]]
id = "test"
size = 3
fail_deletes = true

[[steps]]
action = "schedule"
group = "atomic-4"
nodes = [0, 1]

[[steps]]
action = "abort"
group = "atomic-4"
nodes = [2]
drain = true
"#;

    #[test]
    fn parse_plan() {
        let plan = Plan::parse(PLAN).unwrap();
        assert_eq!(plan.groups.len(), 2);
        assert!(plan.groups[0].atomic);
        assert!(!plan.groups[1].atomic);
        assert!(plan.groups[1].fail_deletes);

        assert_eq!(plan.steps[0].nodes(), &[0, 1]);
        match &plan.steps[1] {
            Step::Abort { drain, reason, .. } => {
                assert!(*drain);
                assert_eq!(reason, "simulated abort");
            }
            other => panic!("expected abort step, got {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_group() {
        let err = Plan::parse(
            r#"
[[steps]]
action = "schedule"
group = "missing"
nodes = [0]
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown node group"));
    }

    #[test]
    fn rejects_out_of_range_node() {
        let err = Plan::parse(
            r#"
[[groups]]
id = "ng"
size = 2

[[steps]]
action = "schedule"
group = "ng"
nodes = [2]
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn rejects_duplicate_groups() {
        let err = Plan::parse(
            r#"
[[groups]]
id = "ng"
size = 1

[[groups]]
id = "ng"
size = 2
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn from_file_reads_plan() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.toml");
        std::fs::write(&path, PLAN).unwrap();
        assert_eq!(Plan::from_file(&path).unwrap().steps.len(), 2);
    }
}
