use std::fmt;
use std::sync::Arc;

use tracing::warn;

use super::error::{CheckError, EvalError};
use super::expr::Expr;
use super::message::Message;
use super::statement::Statement;
use super::value::write_quoted;
use crate::compile::GeneratedRule;
use crate::metrics::{MetricsSink, RuleMetrics, RuleMetricsSnapshot, name_segment};

#[derive(Debug)]
struct RuleBody {
    when: Expr,
    then: Vec<Statement>,
}

/// A named `when`/`then` unit.
///
/// Immutable once built: [`with_id()`](Self::with_id) and
/// [`invokable_copy()`](Self::invokable_copy) return new values sharing the
/// condition and statements. Each rule carries its own counters; they only
/// become visible in a [`MetricsSink`] after
/// [`register_metrics()`](Self::register_metrics).
///
/// # Example
///
/// ```
/// use rulepipe::{FunctionRegistry, MemoryMessage, Message, Rule, Statement, Value, lit};
///
/// let functions = FunctionRegistry::with_builtins();
/// let seen = functions.call("set_field", vec![lit("seen"), lit(true)]).unwrap();
/// let rule = Rule::builder("mark")
///     .when(functions.call("has_field", vec![lit("src_addr")]).unwrap())
///     .then(Statement::try_from(seen).unwrap())
///     .build()
///     .unwrap();
///
/// let mut msg = MemoryMessage::new().with("src_addr", "10.0.0.1");
/// if rule.evaluate_when(&mut msg) {
///     rule.execute_then(&mut msg);
/// }
/// assert_eq!(msg.get("seen"), Some(&Value::Bool(true)));
/// ```
#[derive(Debug, Clone)]
pub struct Rule {
    id: Option<String>,
    name: String,
    body: Arc<RuleBody>,
    generated: Option<Arc<GeneratedRule>>,
    metrics: RuleMetrics,
    local_metrics: Option<RuleMetrics>,
}

impl Rule {
    pub fn builder(name: &str) -> RuleBuilder {
        RuleBuilder {
            name: name.to_owned(),
            id: None,
            when: None,
            then: Vec::new(),
        }
    }

    /// A rule that never matches, standing in for a reference that could not
    /// be resolved.
    #[must_use]
    pub fn always_false(name: &str) -> Self {
        Self::from_parts(None, name.to_owned(), Expr::Bool(false), Vec::new())
    }

    fn from_parts(id: Option<String>, name: String, when: Expr, then: Vec<Statement>) -> Self {
        Self {
            id,
            name,
            body: Arc::new(RuleBody { when, then }),
            generated: None,
            metrics: RuleMetrics::detached(),
            local_metrics: None,
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

    #[must_use]
    pub fn when(&self) -> &Expr {
        &self.body.when
    }

    #[must_use]
    pub fn then(&self) -> &[Statement] {
        &self.body.then
    }

    /// Copy of this rule under a persisted id. Counters start detached.
    #[must_use]
    pub fn with_id(&self, id: &str) -> Self {
        Self {
            id: Some(id.to_owned()),
            metrics: RuleMetrics::detached(),
            local_metrics: None,
            ..self.clone()
        }
    }

    /// Copy used by one pipeline stage: shares condition, statements and
    /// generated code, with its own counters.
    #[must_use]
    pub fn invokable_copy(&self) -> Self {
        Self {
            metrics: RuleMetrics::detached(),
            local_metrics: None,
            ..self.clone()
        }
    }

    /// Compile the condition and statements into closures.
    #[must_use]
    pub fn with_generated_code(mut self) -> Self {
        let generated = GeneratedRule::generate(&self.body.when, &self.body.then);
        self.generated = Some(Arc::new(generated));
        self
    }

    #[must_use]
    pub fn has_generated_code(&self) -> bool {
        self.generated.is_some()
    }

    pub(crate) fn generated(&self) -> Option<&Arc<GeneratedRule>> {
        self.generated.as_ref()
    }

    /// Attach the counters to `sink` as `rule.<id>.*`, and as
    /// `rule.<id>.<pipeline>.<stage>.*` when a pipeline and stage are given.
    /// Dots in ids are escaped (see `metrics_filter`). Does nothing for a
    /// rule without an id.
    pub fn register_metrics(
        &mut self,
        sink: &dyn MetricsSink,
        pipeline_id: Option<&str>,
        stage: Option<i32>,
    ) {
        let Some(id) = &self.id else {
            return;
        };
        let id = name_segment(id);
        self.metrics = RuleMetrics::registered(sink, &format!("rule.{id}"));
        if let (Some(pipeline), Some(stage)) = (pipeline_id, stage) {
            let pipeline = name_segment(pipeline);
            self.local_metrics = Some(RuleMetrics::registered(
                sink,
                &format!("rule.{id}.{pipeline}.{stage}"),
            ));
        }
    }

    /// Prefix matching every counter this rule registers.
    #[must_use]
    pub fn metrics_filter(&self) -> Option<String> {
        self.id
            .as_deref()
            .map(|id| format!("rule.{}.", name_segment(id)))
    }

    /// Remove this rule's counters from `sink`.
    pub fn unregister_metrics(&self, sink: &dyn MetricsSink) {
        if let Some(filter) = self.metrics_filter() {
            sink.remove_matching(&filter);
        }
    }

    #[must_use]
    pub fn metrics(&self) -> RuleMetricsSnapshot {
        self.metrics.snapshot()
    }

    #[must_use]
    pub fn local_metrics(&self) -> Option<RuleMetricsSnapshot> {
        self.local_metrics.as_ref().map(RuleMetrics::snapshot)
    }

    /// Evaluate the condition. A failing condition is logged, counted as a
    /// failure and reported as not matching.
    pub fn evaluate_when(&self, message: &mut dyn Message) -> bool {
        match self.check_when(message) {
            Ok(matched) => matched,
            Err(error) => {
                warn!(rule = %self.name, rule_id = ?self.id, %error, "rule condition failed");
                false
            }
        }
    }

    /// Run every statement of the `then` block. Returns `false` if any failed.
    pub fn execute_then(&self, message: &mut dyn Message) -> bool {
        let errors = self.run_actions(message, false);
        for error in &errors {
            warn!(rule = %self.name, rule_id = ?self.id, %error, "rule statement failed");
        }
        errors.is_empty()
    }

    pub(crate) fn check_when(&self, message: &mut dyn Message) -> Result<bool, EvalError> {
        let result = crate::execute::run_when(self, message);
        match result {
            Ok(true) => self.mark(RuleMetrics::mark_matched),
            Ok(false) => self.mark(RuleMetrics::mark_not_matched),
            Err(_) => self.mark(RuleMetrics::mark_failed),
        }
        result
    }

    pub(crate) fn run_actions(&self, message: &mut dyn Message, stop_on_error: bool) -> Vec<EvalError> {
        self.mark(RuleMetrics::mark_executed);
        let errors = crate::execute::run_then(self, message, stop_on_error);
        if !errors.is_empty() {
            self.mark(RuleMetrics::mark_failed);
        }
        errors
    }

    fn mark(&self, op: fn(&RuleMetrics)) {
        op(&self.metrics);
        if let Some(local) = &self.local_metrics {
            op(local);
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("rule ")?;
        write_quoted(f, &self.name)?;
        writeln!(f)?;
        writeln!(f, "when {}", self.body.when)?;
        writeln!(f, "then")?;
        for statement in &self.body.then {
            writeln!(f, "  {statement}")?;
        }
        f.write_str("end")
    }
}

/// Builder for [`Rule`]. The rule is type-checked on [`build()`](Self::build).
#[derive(Debug)]
#[must_use]
pub struct RuleBuilder {
    name: String,
    id: Option<String>,
    when: Option<Expr>,
    then: Vec<Statement>,
}

impl RuleBuilder {
    pub fn id(mut self, id: &str) -> Self {
        self.id = Some(id.to_owned());
        self
    }

    /// Set the condition. A rule without one always matches.
    pub fn when(mut self, condition: Expr) -> Self {
        self.when = Some(condition);
        self
    }

    /// Append a statement to the `then` block.
    pub fn then(mut self, statement: Statement) -> Self {
        self.then.push(statement);
        self
    }

    pub fn statements(mut self, statements: impl IntoIterator<Item = Statement>) -> Self {
        self.then.extend(statements);
        self
    }

    /// # Errors
    ///
    /// Returns every [`CheckError`] found in the condition and statements.
    pub fn build(self) -> Result<Rule, Vec<CheckError>> {
        let when = self.when.unwrap_or(Expr::Bool(true));
        let errors = crate::check::check_rule(&self.name, &when, &self.then);
        if !errors.is_empty() {
            return Err(errors);
        }
        Ok(Rule::from_parts(self.id, self.name, when, self.then))
    }
}
