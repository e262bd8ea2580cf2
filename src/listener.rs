use crate::types::{EvalError, Pipeline, Rule, Stage};

/// Callbacks fired while the interpreter processes one message.
///
/// Every method has an empty default, so implementors override only the
/// events they care about. Used for tracing rule decisions and in tests.
#[allow(unused_variables)]
pub trait InterpreterListener {
    fn start_processing(&mut self) {}

    fn finish_processing(&mut self) {}

    fn enter_stage(&mut self, pipeline: &Pipeline, stage: &Stage) {}

    fn exit_stage(&mut self, pipeline: &Pipeline, stage: &Stage) {}

    fn evaluate_rule(&mut self, rule: &Rule, pipeline: &Pipeline) {}

    fn satisfy_rule(&mut self, rule: &Rule, pipeline: &Pipeline) {}

    fn dissatisfy_rule(&mut self, rule: &Rule, pipeline: &Pipeline) {}

    fn fail_evaluate_rule(&mut self, rule: &Rule, pipeline: &Pipeline, error: &EvalError) {}

    fn execute_rule(&mut self, rule: &Rule, pipeline: &Pipeline) {}

    fn fail_execute_rule(&mut self, rule: &Rule, pipeline: &Pipeline, error: &EvalError) {}

    fn finish_execute_rule(&mut self, rule: &Rule, pipeline: &Pipeline) {}

    fn continue_pipeline(&mut self, pipeline: &Pipeline, stage: &Stage) {}

    fn stop_pipeline(&mut self, pipeline: &Pipeline, stage: &Stage) {}
}

/// Listener that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopListener;

impl InterpreterListener for NoopListener {}
