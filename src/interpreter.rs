use std::collections::BTreeSet;
use std::time::Instant;

use tracing::{debug, warn};

use crate::config::{ErrorPolicy, InterpreterConfig};
use crate::listener::{InterpreterListener, NoopListener};
use crate::resolve::{ProcessingState, ResolvedPipeline, ResolvedStage};
use crate::types::{
    EvalError, Message, PipelineReport, ProcessingReport, Rule, StageReport, Value,
};

/// Runs resolved pipelines over messages.
///
/// Holds no state: error policy, budget and the processing-error field come
/// from the [`InterpreterConfig`] the pipelines were resolved with, so one
/// interpreter can serve any number of threads and states. Nothing a rule
/// does can make processing fail: evaluation errors are logged, counted on
/// the rule and recorded on the message.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineInterpreter;

impl PipelineInterpreter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Run one pipeline over `message`.
    pub fn run(&self, pipeline: &ResolvedPipeline, message: &mut dyn Message) -> PipelineReport {
        self.run_with_listener(pipeline, message, &mut NoopListener)
    }

    pub fn run_with_listener(
        &self,
        pipeline: &ResolvedPipeline,
        message: &mut dyn Message,
        listener: &mut dyn InterpreterListener,
    ) -> PipelineReport {
        let report = self.execute(pipeline.config(), &[pipeline], message, listener);
        match report.pipelines() {
            [single] => single.clone(),
            _ => PipelineReport::new(
                pipeline.pipeline().id().map(str::to_owned),
                pipeline.pipeline().name().to_owned(),
            ),
        }
    }

    /// Run the pipelines with the given ids (or names) over `message`.
    /// Unknown keys are skipped.
    pub fn process(
        &self,
        state: &ProcessingState,
        message: &mut dyn Message,
        pipeline_keys: &[&str],
    ) -> ProcessingReport {
        self.process_with_listener(state, message, pipeline_keys, &mut NoopListener)
    }

    pub fn process_with_listener(
        &self,
        state: &ProcessingState,
        message: &mut dyn Message,
        pipeline_keys: &[&str],
        listener: &mut dyn InterpreterListener,
    ) -> ProcessingReport {
        let mut pipelines: Vec<&ResolvedPipeline> = Vec::with_capacity(pipeline_keys.len());
        for key in pipeline_keys {
            match state.get(key) {
                Some(p) if !pipelines.iter().any(|q| std::ptr::eq(*q, p.as_ref())) => {
                    pipelines.push(p);
                }
                Some(_) => {}
                None => debug!(pipeline = key, "no such pipeline, skipping"),
            }
        }
        self.execute(state.config(), &pipelines, message, listener)
    }

    /// Run every pipeline of `state` over `message`.
    pub fn process_all(&self, state: &ProcessingState, message: &mut dyn Message) -> ProcessingReport {
        let pipelines: Vec<&ResolvedPipeline> = state.pipelines().iter().map(|p| &**p).collect();
        self.execute(state.config(), &pipelines, message, &mut NoopListener)
    }

    /// Stage numbers are walked in ascending order across all pipelines, so
    /// stage 0 of every pipeline runs before any stage 1.
    fn execute(
        &self,
        config: &InterpreterConfig,
        pipelines: &[&ResolvedPipeline],
        message: &mut dyn Message,
        listener: &mut dyn InterpreterListener,
    ) -> ProcessingReport {
        let started = Instant::now();
        let deadline = config.message_budget().map(|budget| started + budget);
        listener.start_processing();

        let mut reports: Vec<PipelineReport> = pipelines
            .iter()
            .map(|p| {
                p.pipeline().mark_executed();
                PipelineReport::new(
                    p.pipeline().id().map(str::to_owned),
                    p.pipeline().name().to_owned(),
                )
            })
            .collect();

        let stage_numbers: BTreeSet<i32> = pipelines
            .iter()
            .flat_map(|p| p.stages().iter().map(|s| s.stage().stage()))
            .collect();

        for number in stage_numbers {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                warn!(stage = number, "message evaluation budget exceeded");
                for report in reports.iter_mut().filter(|r| r.is_running()) {
                    report.exceed_budget(number);
                }
                break;
            }
            for (pipeline, report) in pipelines.iter().zip(reports.iter_mut()) {
                if !report.is_running() {
                    continue;
                }
                let Some(stage) = pipeline.stage(number) else {
                    continue;
                };
                let stage_report = self.run_stage(config, pipeline, stage, message, listener);
                let passed = stage_report.passed();
                report.push_stage(stage_report);
                if passed {
                    listener.continue_pipeline(pipeline.pipeline(), stage.stage());
                } else {
                    debug!(
                        pipeline = pipeline.pipeline().name(),
                        stage = number,
                        "stage did not pass, halting pipeline"
                    );
                    listener.stop_pipeline(pipeline.pipeline(), stage.stage());
                }
            }
        }

        listener.finish_processing();
        ProcessingReport::new(reports, started.elapsed())
    }

    /// Evaluate every condition of the stage, then run the statements of the
    /// matched rules, both in declaration order.
    fn run_stage(
        &self,
        config: &InterpreterConfig,
        pipeline: &ResolvedPipeline,
        stage: &ResolvedStage,
        message: &mut dyn Message,
        listener: &mut dyn InterpreterListener,
    ) -> StageReport {
        let p = pipeline.pipeline();
        let number = stage.stage().stage();
        stage.stage().mark_executed();
        listener.enter_stage(p, stage.stage());

        let mut matched: Vec<&Rule> = Vec::new();
        let mut failed: Vec<String> = Vec::new();
        for rule in stage.rules() {
            listener.evaluate_rule(rule, p);
            match rule.check_when(message) {
                Ok(true) => {
                    debug!(rule = rule.name(), pipeline = p.name(), stage = number, "rule matched");
                    listener.satisfy_rule(rule, p);
                    matched.push(rule);
                }
                Ok(false) => {
                    debug!(rule = rule.name(), pipeline = p.name(), stage = number, "rule did not match");
                    listener.dissatisfy_rule(rule, p);
                }
                Err(error) => {
                    warn!(
                        rule = rule.name(),
                        rule_id = ?rule.id(),
                        pipeline = p.name(),
                        stage = number,
                        %error,
                        "rule condition failed"
                    );
                    listener.fail_evaluate_rule(rule, p, &error);
                    record_error(config, message, rule, &error);
                    failed.push(rule.name().to_owned());
                }
            }
        }

        let passed = stage.stage().match_policy().passes(matched.len(), stage.rules().len());
        let stop_on_error = config.on_statement_error != ErrorPolicy::Continue;
        for rule in &matched {
            listener.execute_rule(rule, p);
            let errors = rule.run_actions(message, stop_on_error);
            if errors.is_empty() {
                listener.finish_execute_rule(rule, p);
                continue;
            }
            for error in &errors {
                warn!(
                    rule = rule.name(),
                    rule_id = ?rule.id(),
                    pipeline = p.name(),
                    stage = number,
                    %error,
                    "rule statement failed"
                );
                listener.fail_execute_rule(rule, p, error);
                record_error(config, message, rule, error);
            }
            failed.push(rule.name().to_owned());
            if config.on_statement_error == ErrorPolicy::AbortStage {
                break;
            }
        }

        listener.exit_stage(p, stage.stage());
        StageReport::new(
            number,
            stage.stage().match_policy(),
            passed,
            matched.iter().map(|r| r.name().to_owned()).collect(),
            failed,
        )
    }

}

fn record_error(config: &InterpreterConfig, message: &mut dyn Message, rule: &Rule, error: &EvalError) {
    let Some(field) = &config.processing_error_field else {
        return;
    };
    let entry = format!("For rule '{}': {error}", rule.name());
    let value = match message.get(field).and_then(Value::as_str) {
        Some(existing) if !existing.is_empty() => format!("{existing}, {entry}"),
        _ => entry,
    };
    message.set(field, Value::String(value));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        FunctionRegistry, MemoryMessage, Pipeline, PipelineOutcome, Stage, StageMatch, Statement,
        lit, message_field,
    };

    fn rule(name: &str, when: bool) -> Rule {
        Rule::builder(name).when(lit(when)).build().unwrap()
    }

    fn setter(name: &str, field: &str, value: crate::Expr) -> Rule {
        let functions = FunctionRegistry::with_builtins();
        let call = functions.call("set_field", vec![lit(field), value]).unwrap();
        Rule::builder(name)
            .then(Statement::try_from(call).unwrap())
            .build()
            .unwrap()
    }

    fn resolve(pipeline: Pipeline, rules: &[Rule]) -> ResolvedPipeline {
        ResolvedPipeline::resolve(&pipeline, rules, &InterpreterConfig::default(), None)
    }

    fn single_stage(policy: StageMatch) -> ResolvedPipeline {
        let pipeline = Pipeline::builder("p")
            .stage(Stage::new(0, policy).rules(["yes", "no"]))
            .stage(Stage::new(1, StageMatch::All).rule("mark"))
            .build()
            .unwrap();
        resolve(
            pipeline,
            &[rule("yes", true), rule("no", false), setter("mark", "reached", lit(true))],
        )
    }

    #[test]
    fn all_policy_halts_on_partial_match() {
        let mut msg = MemoryMessage::new();
        let report = PipelineInterpreter::default().run(&single_stage(StageMatch::All), &mut msg);
        assert_eq!(report.outcome(), PipelineOutcome::Halted { stage: 0 });
        assert_eq!(msg.get("reached"), None);
    }

    #[test]
    fn either_policy_continues() {
        let mut msg = MemoryMessage::new();
        let report = PipelineInterpreter::default().run(&single_stage(StageMatch::Either), &mut msg);
        assert!(report.passed());
        assert_eq!(report.stages()[0].matched(), &["yes"]);
        assert_eq!(msg.get("reached"), Some(&Value::Bool(true)));
    }

    #[test]
    fn matched_rules_run_even_when_stage_fails() {
        let pipeline = Pipeline::builder("p")
            .stage(Stage::new(0, StageMatch::All).rules(["set", "no"]))
            .build()
            .unwrap();
        let resolved = resolve(pipeline, &[setter("set", "x", lit(1_i64)), rule("no", false)]);
        let mut msg = MemoryMessage::new();
        let report = PipelineInterpreter::default().run(&resolved, &mut msg);
        assert!(!report.passed());
        assert_eq!(msg.get("x"), Some(&Value::Long(1)));
    }

    #[test]
    fn conditions_see_message_before_statements_run() {
        let pipeline = Pipeline::builder("p")
            .stage(Stage::new(0, StageMatch::Either).rules(["set", "check"]))
            .build()
            .unwrap();
        let check = Rule::builder("check")
            .when(message_field("x").equals(lit(1_i64)))
            .build()
            .unwrap();
        let resolved = resolve(pipeline, &[setter("set", "x", lit(1_i64)), check]);
        let mut msg = MemoryMessage::new();
        let report = PipelineInterpreter::default().run(&resolved, &mut msg);
        assert_eq!(report.stages()[0].matched(), &["set"]);
    }

    #[test]
    fn empty_pipeline_passes_untouched() {
        let resolved = resolve(Pipeline::empty("x"), &[]);
        let mut msg = MemoryMessage::new().with("a", 1_i64);
        let before = msg.clone();
        let report = PipelineInterpreter::default().run(&resolved, &mut msg);
        assert!(report.passed());
        assert!(report.stages().is_empty());
        assert_eq!(msg, before);
    }

    #[test]
    fn errors_are_recorded_on_message() {
        let pipeline = Pipeline::builder("p")
            .stage(Stage::new(0, StageMatch::All).rules(["bad", "worse"]))
            .build()
            .unwrap();
        let worse = Rule::builder("worse")
            .when((lit(1_i64) % lit(0_i64)).equals(lit(0_i64)))
            .build()
            .unwrap();
        let resolved = resolve(pipeline, &[setter("bad", "x", lit(1_i64) / lit(0_i64)), worse]);
        let mut msg = MemoryMessage::new();
        let report = PipelineInterpreter::default().run(&resolved, &mut msg);
        assert_eq!(report.stages()[0].failed(), &["worse", "bad"]);
        assert_eq!(
            msg.get("processing_error").and_then(Value::as_str),
            Some(
                "For rule 'worse': arithmetic error: division by zero, \
                 For rule 'bad': arithmetic error: division by zero"
            )
        );
    }

    #[test]
    fn abort_stage_skips_remaining_actions() {
        let pipeline = Pipeline::builder("p")
            .stage(Stage::new(0, StageMatch::Pass).rules(["bad", "good"]))
            .build()
            .unwrap();
        let config = InterpreterConfig::default()
            .with_statement_error_policy(ErrorPolicy::AbortStage)
            .with_processing_error_field(None);
        let resolved = ResolvedPipeline::resolve(
            &pipeline,
            &[setter("bad", "x", lit(1_i64) / lit(0_i64)), setter("good", "y", lit(1_i64))],
            &config,
            None,
        );
        assert_eq!(resolved.config(), &config);
        let mut msg = MemoryMessage::new();
        PipelineInterpreter::new().run(&resolved, &mut msg);
        assert!(msg.is_empty());
    }

    #[test]
    fn state_config_drives_every_pipeline() {
        let pipeline = Pipeline::builder("p")
            .stage(Stage::new(0, StageMatch::Pass).rules(["bad", "good"]))
            .build()
            .unwrap();
        let state = ProcessingState::builder()
            .rules([setter("bad", "x", lit(1_i64) / lit(0_i64)), setter("good", "y", lit(1_i64))])
            .pipeline(pipeline)
            .config(
                InterpreterConfig::default()
                    .with_statement_error_policy(ErrorPolicy::AbortStage)
                    .with_processing_error_field(Some("errors")),
            )
            .build();
        assert_eq!(state.config().on_statement_error, ErrorPolicy::AbortStage);
        assert!(std::ptr::eq(state.config(), state.pipelines()[0].config()));

        let mut msg = MemoryMessage::new();
        PipelineInterpreter::new().process_all(&state, &mut msg);
        assert_eq!(msg.get("y"), None);
        assert!(msg.get("errors").is_some());
        assert_eq!(msg.get("processing_error"), None);
    }

    #[test]
    fn stages_interleave_across_pipelines() {
        let a = Pipeline::builder("a")
            .stage(Stage::new(0, StageMatch::All).rule("a0"))
            .stage(Stage::new(1, StageMatch::All).rule("a1"))
            .build()
            .unwrap();
        let b = Pipeline::builder("b")
            .stage(Stage::new(0, StageMatch::All).rule("b0"))
            .build()
            .unwrap();
        let functions = FunctionRegistry::with_builtins();
        let append = |name: &str, tag: &str| {
            let value = functions
                .call(
                    "concat",
                    vec![
                        functions.call("to_string", vec![message_field("trail"), lit("")]).unwrap(),
                        lit(tag),
                    ],
                )
                .unwrap();
            setter(name, "trail", value)
        };
        let state = ProcessingState::builder()
            .rules([append("a0", "a0;"), append("a1", "a1;"), append("b0", "b0;")])
            .pipelines([a, b])
            .build();
        let mut msg = MemoryMessage::new();
        let report = PipelineInterpreter::default().process_all(&state, &mut msg);
        assert_eq!(msg.get("trail").and_then(Value::as_str), Some("a0;b0;a1;"));
        assert!(report.pipelines().iter().all(PipelineReport::passed));
    }

    #[test]
    fn unknown_pipeline_keys_are_skipped() {
        let state = ProcessingState::builder().pipeline(Pipeline::empty("x")).build();
        let mut msg = MemoryMessage::new();
        let report = PipelineInterpreter::default().process(&state, &mut msg, &["x", "y", "x"]);
        assert_eq!(report.pipelines().len(), 1);
    }
}
