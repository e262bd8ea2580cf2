use std::fmt;
use std::sync::Arc;

use crate::metrics::{Counter, MetricsSink};

/// How a stage's rule outcomes decide whether the pipeline continues.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum StageMatch {
    /// Every rule must match.
    #[default]
    All,
    /// At least one rule must match.
    Either,
    /// The stage always passes.
    Pass,
}

impl StageMatch {
    /// Whether a stage with `total` rules of which `matched` matched passes.
    /// A stage without rules passes under every policy.
    #[must_use]
    pub fn passes(self, matched: usize, total: usize) -> bool {
        match self {
            StageMatch::All => matched == total,
            StageMatch::Either => total == 0 || matched > 0,
            StageMatch::Pass => true,
        }
    }
}

impl fmt::Display for StageMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StageMatch::All => "all",
            StageMatch::Either => "either",
            StageMatch::Pass => "pass",
        })
    }
}

/// A numbered step of a pipeline: rule references plus a match policy.
///
/// Rules are referenced by name and resolved when the pipeline is loaded
/// into a [`ProcessingState`](crate::ProcessingState).
#[derive(Debug, Clone)]
pub struct Stage {
    stage: i32,
    match_policy: StageMatch,
    rule_refs: Vec<String>,
    executed: Arc<Counter>,
}

impl Stage {
    #[must_use]
    pub fn new(stage: i32, match_policy: StageMatch) -> Self {
        Self {
            stage,
            match_policy,
            rule_refs: Vec::new(),
            executed: Arc::default(),
        }
    }

    #[must_use]
    pub fn rule(mut self, name: &str) -> Self {
        self.rule_refs.push(name.to_owned());
        self
    }

    #[must_use]
    pub fn rules<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.rule_refs.extend(names.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn stage(&self) -> i32 {
        self.stage
    }

    #[must_use]
    pub fn match_policy(&self) -> StageMatch {
        self.match_policy
    }

    #[must_use]
    pub fn rule_refs(&self) -> &[String] {
        &self.rule_refs
    }

    #[must_use]
    pub fn executed_count(&self) -> u64 {
        self.executed.get()
    }

    pub(crate) fn register_metrics(&mut self, sink: &dyn MetricsSink, pipeline_id: &str) {
        self.executed = sink.counter(&format!("pipeline.{pipeline_id}.stage.{}.executed", self.stage));
    }

    pub(crate) fn detach_metrics(&mut self) {
        self.executed = Arc::default();
    }

    pub(crate) fn mark_executed(&self) {
        self.executed.increment();
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "stage {} match {}", self.stage, self.match_policy)?;
        for name in &self.rule_refs {
            writeln!(f, "  rule {name:?};")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_requires_every_rule() {
        assert!(!StageMatch::All.passes(1, 2));
        assert!(StageMatch::All.passes(2, 2));
    }

    #[test]
    fn either_requires_one_rule() {
        assert!(StageMatch::Either.passes(1, 2));
        assert!(!StageMatch::Either.passes(0, 2));
    }

    #[test]
    fn empty_stage_passes() {
        for policy in [StageMatch::All, StageMatch::Either, StageMatch::Pass] {
            assert!(policy.passes(0, 0), "{policy}");
        }
        assert!(StageMatch::Pass.passes(0, 3));
    }

    #[test]
    fn display() {
        let stage = Stage::new(1, StageMatch::Either).rules(["a", "b"]);
        assert_eq!(
            stage.to_string(),
            "stage 1 match either\n  rule \"a\";\n  rule \"b\";\n"
        );
    }
}
