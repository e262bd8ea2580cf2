//! Message-processing pipelines built from `when`/`then` rules.
//!
//! Rules are parsed from source text (or built by hand), grouped into
//! numbered stages of pipelines, resolved into a [`ProcessingState`] and run
//! against messages by a [`PipelineInterpreter`].

mod check;
mod compile;
mod config;
mod error;
mod evaluate;
mod execute;
mod functions;
mod interpreter;
mod listener;
mod metrics;
mod parse;
mod resolve;
mod types;

pub use check::check_expr;
pub use compile::{GeneratedRule, RuleInvocation};
#[cfg(feature = "serde")]
pub use config::ConfigError;
pub use config::{ErrorPolicy, InterpreterConfig};
pub use error::RulepipeError;
pub use functions::{GrokMatch, GrokPatterns};
pub use interpreter::PipelineInterpreter;
pub use listener::{InterpreterListener, NoopListener};
pub use metrics::{Counter, MetricsRegistry, MetricsSink, RuleMetrics, RuleMetricsSnapshot};
pub use parse::{
    ParseError, SyntaxError, SyntaxErrorKind, parse_pipeline, parse_pipelines, parse_rule,
    parse_rules,
};
pub use resolve::{ProcessingState, ProcessingStateBuilder, ResolvedPipeline, ResolvedStage};
pub use types::{
    ArithOp, CallArgs, CheckError, CompareOp, DefinitionError, EvalError, EvaluationContext, Expr,
    Function, FunctionArgs, FunctionCall, FunctionDescriptor, FunctionRegistry,
    FunctionRegistryBuilder, MemoryMessage, Message, ParameterDescriptor, Pipeline,
    PipelineBuilder, PipelineOutcome, PipelineReport, ProcessingReport, Rule, RuleBuilder, Stage,
    StageMatch, StageReport, Statement, Transform, Value, ValueType, lit, message_field, var,
};
