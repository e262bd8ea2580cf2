use std::fmt;
use std::time::Duration;

use super::stage::StageMatch;

/// What happened in one stage of one pipeline for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct StageReport {
    stage: i32,
    policy: StageMatch,
    passed: bool,
    matched: Vec<String>,
    failed: Vec<String>,
}

impl StageReport {
    pub(crate) fn new(
        stage: i32,
        policy: StageMatch,
        passed: bool,
        matched: Vec<String>,
        failed: Vec<String>,
    ) -> Self {
        Self {
            stage,
            policy,
            passed,
            matched,
            failed,
        }
    }

    #[must_use]
    pub fn stage(&self) -> i32 {
        self.stage
    }

    #[must_use]
    pub fn policy(&self) -> StageMatch {
        self.policy
    }

    #[must_use]
    pub fn passed(&self) -> bool {
        self.passed
    }

    /// Names of rules whose condition matched, in stage order.
    #[must_use]
    pub fn matched(&self) -> &[String] {
        &self.matched
    }

    /// Names of rules whose condition or statements failed.
    #[must_use]
    pub fn failed(&self) -> &[String] {
        &self.failed
    }
}

/// How a pipeline run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum PipelineOutcome {
    /// Every stage passed.
    Completed,
    /// The stage did not pass; later stages were skipped.
    Halted { stage: i32 },
    /// The evaluation budget ran out before this stage.
    BudgetExceeded { stage: i32 },
}

impl fmt::Display for PipelineOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineOutcome::Completed => f.write_str("completed"),
            PipelineOutcome::Halted { stage } => write!(f, "halted at stage {stage}"),
            PipelineOutcome::BudgetExceeded { stage } => {
                write!(f, "budget exceeded before stage {stage}")
            }
        }
    }
}

/// Per-pipeline result of processing one message.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[must_use]
pub struct PipelineReport {
    id: Option<String>,
    name: String,
    stages: Vec<StageReport>,
    outcome: PipelineOutcome,
}

impl PipelineReport {
    pub(crate) fn new(id: Option<String>, name: String) -> Self {
        Self {
            id,
            name,
            stages: Vec::new(),
            outcome: PipelineOutcome::Completed,
        }
    }

    pub(crate) fn push_stage(&mut self, stage: StageReport) {
        if !stage.passed {
            self.outcome = PipelineOutcome::Halted { stage: stage.stage };
        }
        self.stages.push(stage);
    }

    pub(crate) fn exceed_budget(&mut self, stage: i32) {
        self.outcome = PipelineOutcome::BudgetExceeded { stage };
    }

    pub(crate) fn is_running(&self) -> bool {
        self.outcome == PipelineOutcome::Completed
    }

    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stages that ran, in execution order.
    #[must_use]
    pub fn stages(&self) -> &[StageReport] {
        &self.stages
    }

    #[must_use]
    pub fn outcome(&self) -> PipelineOutcome {
        self.outcome
    }

    /// `true` when every stage passed. A pipeline without stages passes.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.outcome == PipelineOutcome::Completed
    }

    /// Names of every matched rule across all stages.
    pub fn matched_rules(&self) -> impl Iterator<Item = &str> {
        self.stages
            .iter()
            .flat_map(|s| s.matched.iter().map(String::as_str))
    }
}

impl fmt::Display for PipelineReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.outcome)?;
        for stage in &self.stages {
            write!(
                f,
                ", stage {} ({}): [{}]",
                stage.stage,
                if stage.passed { "passed" } else { "failed" },
                stage.matched.join(", ")
            )?;
        }
        Ok(())
    }
}

/// Result of running a set of pipelines over one message.
#[derive(Debug, Clone)]
#[must_use]
pub struct ProcessingReport {
    pipelines: Vec<PipelineReport>,
    duration: Duration,
}

impl ProcessingReport {
    pub(crate) fn new(pipelines: Vec<PipelineReport>, duration: Duration) -> Self {
        Self {
            pipelines,
            duration,
        }
    }

    #[must_use]
    pub fn pipelines(&self) -> &[PipelineReport] {
        &self.pipelines
    }

    /// Report for the pipeline with the given id or name.
    #[must_use]
    pub fn pipeline(&self, key: &str) -> Option<&PipelineReport> {
        self.pipelines
            .iter()
            .find(|p| p.id.as_deref() == Some(key) || p.name == key)
    }

    /// Wall-clock duration of the run.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }
}

impl fmt::Display for ProcessingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for pipeline in &self.pipelines {
            writeln!(f, "{pipeline}")?;
        }
        write!(f, "duration: {:?}", self.duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(n: i32, passed: bool, matched: &[&str]) -> StageReport {
        StageReport::new(
            n,
            StageMatch::All,
            passed,
            matched.iter().map(|s| (*s).to_owned()).collect(),
            vec![],
        )
    }

    #[test]
    fn failing_stage_halts() {
        let mut report = PipelineReport::new(Some("p1".into()), "p".into());
        report.push_stage(stage(0, true, &["a"]));
        assert!(report.is_running());
        report.push_stage(stage(1, false, &[]));
        assert_eq!(report.outcome(), PipelineOutcome::Halted { stage: 1 });
        assert!(!report.passed());
        assert_eq!(report.matched_rules().collect::<Vec<_>>(), vec!["a"]);
    }

    #[test]
    fn display() {
        let mut report = PipelineReport::new(None, "p".into());
        report.push_stage(stage(0, true, &["a", "b"]));
        assert_eq!(report.to_string(), "p: completed, stage 0 (passed): [a, b]");

        let processing = ProcessingReport::new(vec![report], Duration::from_nanos(500));
        let s = processing.to_string();
        assert!(s.contains("p: completed"));
        assert!(s.contains("duration: 500ns"));
        assert!(processing.pipeline("p").is_some());
        assert!(processing.pipeline("q").is_none());
    }

    #[test]
    fn budget_outcome_display() {
        assert_eq!(
            PipelineOutcome::BudgetExceeded { stage: 3 }.to_string(),
            "budget exceeded before stage 3"
        );
    }
}
