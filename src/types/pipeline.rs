use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use super::error::DefinitionError;
use super::stage::Stage;
use crate::metrics::{Counter, MetricsSink, name_segment};

/// A named, ordered set of [`Stage`]s.
///
/// Stages are kept sorted by stage number; two stages with the same number
/// are rejected when the pipeline is built.
///
/// # Example
///
/// ```
/// use rulepipe::{Pipeline, Stage, StageMatch};
///
/// let pipeline = Pipeline::builder("routing")
///     .stage(Stage::new(10, StageMatch::Either).rule("tag"))
///     .stage(Stage::new(0, StageMatch::All).rule("parse"))
///     .build()
///     .unwrap();
/// let numbers: Vec<i32> = pipeline.stages().iter().map(Stage::stage).collect();
/// assert_eq!(numbers, vec![0, 10]);
/// ```
#[derive(Debug, Clone)]
pub struct Pipeline {
    id: Option<String>,
    name: String,
    stages: Vec<Stage>,
    executed: Arc<Counter>,
}

impl Pipeline {
    pub fn builder(name: &str) -> PipelineBuilder {
        PipelineBuilder {
            name: name.to_owned(),
            id: None,
            stages: Vec::new(),
        }
    }

    /// A pipeline without stages. Running it passes and changes nothing.
    #[must_use]
    pub fn empty(name: &str) -> Self {
        Self {
            id: None,
            name: name.to_owned(),
            stages: Vec::new(),
            executed: Arc::default(),
        }
    }

    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stages in ascending stage-number order.
    #[must_use]
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Id if persisted, name otherwise.
    #[must_use]
    pub fn key(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.name)
    }

    /// Copy of this pipeline under a persisted id. Counters start detached.
    #[must_use]
    pub fn with_id(&self, id: &str) -> Self {
        Self {
            id: Some(id.to_owned()),
            name: self.name.clone(),
            stages: self
                .stages
                .iter()
                .map(|s| {
                    let mut s = s.clone();
                    s.detach_metrics();
                    s
                })
                .collect(),
            executed: Arc::default(),
        }
    }

    /// Attach `pipeline.<id>.executed` and one `pipeline.<id>.stage.<n>.executed`
    /// counter per stage. Does nothing without an id.
    pub fn register_metrics(&mut self, sink: &dyn MetricsSink) {
        let Some(id) = &self.id else {
            return;
        };
        let id = name_segment(id);
        self.executed = sink.counter(&format!("pipeline.{id}.executed"));
        for stage in &mut self.stages {
            stage.register_metrics(sink, &id);
        }
    }

    #[must_use]
    pub fn metrics_filter(&self) -> Option<String> {
        self.id
            .as_deref()
            .map(|id| format!("pipeline.{}.", name_segment(id)))
    }

    pub fn unregister_metrics(&self, sink: &dyn MetricsSink) {
        if let Some(filter) = self.metrics_filter() {
            sink.remove_matching(&filter);
        }
    }

    #[must_use]
    pub fn executed_count(&self) -> u64 {
        self.executed.get()
    }

    pub(crate) fn mark_executed(&self) {
        self.executed.increment();
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "pipeline {:?}", self.name)?;
        for stage in &self.stages {
            write!(f, "{stage}")?;
        }
        f.write_str("end")
    }
}

/// Builder for [`Pipeline`].
#[derive(Debug)]
#[must_use]
pub struct PipelineBuilder {
    name: String,
    id: Option<String>,
    stages: Vec<Stage>,
}

impl PipelineBuilder {
    pub fn id(mut self, id: &str) -> Self {
        self.id = Some(id.to_owned());
        self
    }

    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    /// # Errors
    ///
    /// Returns [`DefinitionError::DuplicateStage`] if two stages share a number.
    pub fn build(mut self) -> Result<Pipeline, DefinitionError> {
        let mut seen = BTreeSet::new();
        for stage in &self.stages {
            if !seen.insert(stage.stage()) {
                return Err(DefinitionError::DuplicateStage {
                    pipeline: self.name,
                    stage: stage.stage(),
                });
            }
        }
        self.stages.sort_by_key(Stage::stage);
        Ok(Pipeline {
            id: self.id,
            name: self.name,
            stages: self.stages,
            executed: Arc::default(),
        })
    }
}
