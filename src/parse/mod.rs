//! Rule and pipeline source text.
//!
//! ```text
//! rule "tag internal traffic"
//! when has_field("src_addr") && $message.src_addr != "10.0.0.1"
//! then
//!   let tag = concat("seen-", to_string($message.source));
//!   set_field("tag", tag);
//! end
//!
//! pipeline "main"
//! stage 0 match either
//!   rule "tag internal traffic";
//! end
//! ```

mod ast;
mod build;
mod error;
mod grammar;

use winnow::Parser;
use winnow::error::ContextError;

pub use error::{ParseError, SyntaxError, SyntaxErrorKind};

use self::build::AstBuilder;
use crate::types::{FunctionRegistry, Pipeline, Rule};

fn grammar_error(source: &str, err: &winnow::error::ParseError<&str, ContextError>) -> ParseError {
    let message = err.inner().to_string();
    let message = if message.is_empty() {
        "unexpected input".to_owned()
    } else {
        message.replace('\n', " ")
    };
    ParseError::new(vec![SyntaxError::at(
        source,
        err.offset(),
        SyntaxErrorKind::Grammar(message),
    )])
}

fn exactly_one<T>(source: &str, items: Vec<T>, what: &str) -> Result<T, ParseError> {
    <[T; 1]>::try_from(items).map(|[item]| item).map_err(|items| {
        ParseError::new(vec![SyntaxError::at(
            source,
            0,
            SyntaxErrorKind::Grammar(format!("expected exactly one {what}, found {}", items.len())),
        )])
    })
}

/// Parse every rule in `source`, resolving function calls against `registry`.
///
/// # Errors
///
/// Returns [`ParseError`] with the first grammar error, or with every name
/// resolution and type error when the text itself is well formed.
pub fn parse_rules(source: &str, registry: &FunctionRegistry) -> Result<Vec<Rule>, ParseError> {
    let raw = grammar::rules
        .parse(source)
        .map_err(|e| grammar_error(source, &e))?;
    let mut builder = AstBuilder::new(source, Some(registry));
    let rules: Vec<Rule> = raw.into_iter().filter_map(|r| builder.rule(r)).collect();
    builder.finish(rules)
}

/// Parse a source holding exactly one rule.
///
/// # Example
///
/// ```
/// use rulepipe::{FunctionRegistry, MemoryMessage, Message, Value, parse_rule};
///
/// let registry = FunctionRegistry::with_builtins();
/// let rule = parse_rule(
///     r#"rule "flag" when has_field("src_addr") then set_field("src_addr_seen", true); end"#,
///     &registry,
/// )
/// .unwrap();
///
/// let mut msg = MemoryMessage::new().with("src_addr", "10.0.0.1");
/// assert!(rule.evaluate_when(&mut msg));
/// assert!(rule.execute_then(&mut msg));
/// assert_eq!(msg.get("src_addr_seen"), Some(&Value::Bool(true)));
/// ```
///
/// # Errors
///
/// Returns [`ParseError`] as [`parse_rules`] does, or when the source holds
/// no rule or more than one.
pub fn parse_rule(source: &str, registry: &FunctionRegistry) -> Result<Rule, ParseError> {
    exactly_one(source, parse_rules(source, registry)?, "rule")
}

/// Parse every pipeline in `source`.
///
/// # Errors
///
/// Returns [`ParseError`] with the first grammar error, or with every
/// duplicate stage number.
pub fn parse_pipelines(source: &str) -> Result<Vec<Pipeline>, ParseError> {
    let raw = grammar::pipelines
        .parse(source)
        .map_err(|e| grammar_error(source, &e))?;
    let mut builder = AstBuilder::new(source, None);
    let pipelines: Vec<Pipeline> = raw.into_iter().filter_map(|p| builder.pipeline(p)).collect();
    builder.finish(pipelines)
}

/// Parse a source holding exactly one pipeline.
///
/// # Errors
///
/// Returns [`ParseError`] as [`parse_pipelines`] does, or when the source
/// holds no pipeline or more than one.
pub fn parse_pipeline(source: &str) -> Result<Pipeline, ParseError> {
    exactly_one(source, parse_pipelines(source)?, "pipeline")
}
