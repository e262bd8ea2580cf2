use std::collections::HashMap;

use super::error::EvalError;
use super::message::Message;
use super::value::Value;

/// Per-rule evaluation state: the message being processed, variables bound
/// by `let` statements, and the errors captured so far.
///
/// A context is created for one rule evaluation of one message and dropped
/// afterwards; it is never shared between threads.
pub struct EvaluationContext<'m> {
    message: &'m mut dyn Message,
    vars: HashMap<String, Value>,
    errors: Vec<EvalError>,
}

impl<'m> EvaluationContext<'m> {
    pub fn new(message: &'m mut dyn Message) -> Self {
        Self {
            message,
            vars: HashMap::new(),
            errors: Vec::new(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &dyn Message {
        &*self.message
    }

    pub fn message_mut(&mut self) -> &mut dyn Message {
        &mut *self.message
    }

    /// Bind a variable, replacing an earlier binding of the same name.
    pub fn define(&mut self, name: &str, value: Value) {
        self.vars.insert(name.to_owned(), value);
    }

    /// Remove a binding, used when a `let` evaluates to undefined.
    pub fn undefine(&mut self, name: &str) {
        self.vars.remove(name);
    }

    #[must_use]
    pub fn var(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn add_error(&mut self, error: EvalError) {
        self.errors.push(error);
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    #[must_use]
    pub fn errors(&self) -> &[EvalError] {
        &self.errors
    }

    #[must_use]
    pub fn last_error(&self) -> Option<&EvalError> {
        self.errors.last()
    }
}

impl std::fmt::Debug for EvaluationContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvaluationContext")
            .field("vars", &self.vars)
            .field("errors", &self.errors)
            .finish_non_exhaustive()
    }
}
