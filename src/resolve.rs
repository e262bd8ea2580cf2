use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tracing::warn;

use crate::config::InterpreterConfig;
use crate::error::RulepipeError;
use crate::metrics::MetricsSink;
use crate::types::{FunctionRegistry, Pipeline, Rule, Stage};

/// A stage with its rule references replaced by rule instances.
#[derive(Debug, Clone)]
pub struct ResolvedStage {
    stage: Stage,
    rules: Vec<Rule>,
}

impl ResolvedStage {
    #[must_use]
    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    /// Rules in reference order. Unresolved references are always-false rules.
    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }
}

/// A pipeline ready to run: every stage holds its own rule instances with
/// their own counters.
#[derive(Debug, Clone)]
pub struct ResolvedPipeline {
    pipeline: Pipeline,
    stages: Vec<ResolvedStage>,
    config: Arc<InterpreterConfig>,
}

impl ResolvedPipeline {
    /// Resolve `pipeline` against `rules` by name.
    ///
    /// With duplicate rule names the last one wins. A reference to an unknown
    /// rule becomes [`Rule::always_false`], so an `all` stage holding it never
    /// passes.
    #[must_use]
    pub fn resolve(
        pipeline: &Pipeline,
        rules: &[Rule],
        config: &InterpreterConfig,
        sink: Option<&dyn MetricsSink>,
    ) -> Self {
        let by_name = index_rules(rules);
        Self::resolve_indexed(pipeline, &by_name, &Arc::new(config.clone()), sink)
    }

    fn resolve_indexed(
        pipeline: &Pipeline,
        rules: &HashMap<&str, &Rule>,
        config: &Arc<InterpreterConfig>,
        sink: Option<&dyn MetricsSink>,
    ) -> Self {
        let mut pipeline = pipeline.clone();
        if let Some(sink) = sink {
            pipeline.register_metrics(sink);
        }
        let stages = pipeline
            .stages()
            .iter()
            .map(|stage| {
                let rules = stage
                    .rule_refs()
                    .iter()
                    .map(|name| resolve_rule(&pipeline, stage, name, rules, config, sink))
                    .collect();
                ResolvedStage {
                    stage: stage.clone(),
                    rules,
                }
            })
            .collect();
        Self {
            pipeline,
            stages,
            config: Arc::clone(config),
        }
    }

    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    #[must_use]
    pub fn stages(&self) -> &[ResolvedStage] {
        &self.stages
    }

    /// Config the pipeline was resolved with; the interpreter runs it under
    /// the same settings.
    #[must_use]
    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    pub(crate) fn stage(&self, number: i32) -> Option<&ResolvedStage> {
        self.stages
            .binary_search_by_key(&number, |s| s.stage.stage())
            .ok()
            .map(|idx| &self.stages[idx])
    }
}

fn index_rules(rules: &[Rule]) -> HashMap<&str, &Rule> {
    let mut by_name = HashMap::with_capacity(rules.len());
    for rule in rules {
        if by_name.insert(rule.name(), rule).is_some() {
            warn!(rule = rule.name(), rule_id = ?rule.id(), "duplicate rule name, using the last definition");
        }
    }
    by_name
}

fn resolve_rule(
    pipeline: &Pipeline,
    stage: &Stage,
    name: &str,
    rules: &HashMap<&str, &Rule>,
    config: &InterpreterConfig,
    sink: Option<&dyn MetricsSink>,
) -> Rule {
    let Some(rule) = rules.get(name) else {
        warn!(
            rule = name,
            pipeline = pipeline.name(),
            stage = stage.stage(),
            "unresolved rule reference, substituting an always-false rule"
        );
        return Rule::always_false(&format!("Unresolved rule {name}"));
    };
    let mut rule = rule.invokable_copy();
    if config.generate_code && !rule.has_generated_code() {
        rule = rule.with_generated_code();
    }
    if config.rule_metrics
        && let Some(sink) = sink
    {
        rule.register_metrics(sink, pipeline.id(), Some(stage.stage()));
    }
    rule
}

/// Rules and pipelines loaded together and resolved against each other.
///
/// Immutable and `Send + Sync`; share it behind `Arc` across worker threads.
#[derive(Debug, Clone, Default)]
pub struct ProcessingState {
    pipelines: Vec<Arc<ResolvedPipeline>>,
    by_key: HashMap<String, usize>,
    config: Arc<InterpreterConfig>,
}

impl ProcessingState {
    pub fn builder() -> ProcessingStateBuilder {
        ProcessingStateBuilder::default()
    }

    /// Pipeline by id, or by name when it has no id.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Arc<ResolvedPipeline>> {
        self.by_key.get(key).map(|&idx| &self.pipelines[idx])
    }

    /// The single config shared by every pipeline of this state.
    #[must_use]
    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    /// Pipelines in load order.
    #[must_use]
    pub fn pipelines(&self) -> &[Arc<ResolvedPipeline>] {
        &self.pipelines
    }

    /// Parse rule and pipeline sources and resolve them into a state.
    ///
    /// # Errors
    ///
    /// Returns [`RulepipeError::Parse`] when either source fails to parse.
    pub fn from_sources(
        rules: &str,
        pipelines: &str,
        registry: &FunctionRegistry,
        config: InterpreterConfig,
    ) -> Result<Self, RulepipeError> {
        let rules = crate::parse::parse_rules(rules, registry)?;
        let pipelines = crate::parse::parse_pipelines(pipelines)?;
        Ok(Self::builder()
            .rules(rules)
            .pipelines(pipelines)
            .config(config)
            .build())
    }

    /// Read a rule file and a pipeline file and resolve them into a state.
    ///
    /// # Errors
    ///
    /// Returns [`RulepipeError`] on I/O or parse failure.
    pub fn from_files(
        rules: impl AsRef<Path>,
        pipelines: impl AsRef<Path>,
        registry: &FunctionRegistry,
        config: InterpreterConfig,
    ) -> Result<Self, RulepipeError> {
        let rules = std::fs::read_to_string(rules)?;
        let pipelines = std::fs::read_to_string(pipelines)?;
        Self::from_sources(&rules, &pipelines, registry, config)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }
}

/// Builder for [`ProcessingState`].
#[derive(Debug, Default)]
#[must_use]
pub struct ProcessingStateBuilder {
    rules: Vec<Rule>,
    pipelines: Vec<Pipeline>,
    config: InterpreterConfig,
    sink: Option<Arc<dyn MetricsSink>>,
}

impl ProcessingStateBuilder {
    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(mut self, rules: impl IntoIterator<Item = Rule>) -> Self {
        self.rules.extend(rules);
        self
    }

    pub fn pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipelines.push(pipeline);
        self
    }

    pub fn pipelines(mut self, pipelines: impl IntoIterator<Item = Pipeline>) -> Self {
        self.pipelines.extend(pipelines);
        self
    }

    pub fn config(mut self, config: InterpreterConfig) -> Self {
        self.config = config;
        self
    }

    /// Register rule, stage and pipeline counters in `sink`.
    pub fn metrics(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Resolve every pipeline. A later pipeline with the same key replaces
    /// an earlier one.
    pub fn build(self) -> ProcessingState {
        let by_name = index_rules(&self.rules);
        let sink = self.sink.as_deref();
        let mut state = ProcessingState {
            config: Arc::new(self.config),
            ..ProcessingState::default()
        };
        for pipeline in &self.pipelines {
            let resolved = ResolvedPipeline::resolve_indexed(pipeline, &by_name, &state.config, sink);
            let key = pipeline.key().to_owned();
            let resolved = Arc::new(resolved);
            match state.by_key.get(&key) {
                Some(&idx) => {
                    warn!(pipeline = pipeline.name(), "duplicate pipeline, using the last definition");
                    state.pipelines[idx] = resolved;
                }
                None => {
                    state.by_key.insert(key, state.pipelines.len());
                    state.pipelines.push(resolved);
                }
            }
        }
        state
    }
}
