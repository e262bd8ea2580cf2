//! Built-in functions available to every rule.

mod conversion;
mod grok;
mod message;
mod string;

use std::fmt;
use std::sync::Arc;

use crate::types::{EvalError, EvaluationContext, Function, FunctionArgs, FunctionDescriptor, Value};

pub use grok::{GrokMatch, GrokPatterns};

type Body = fn(&FunctionArgs<'_>, &mut EvaluationContext<'_>) -> Result<Option<Value>, EvalError>;

/// A stateless function: a descriptor plus a plain function body.
pub(crate) struct Builtin {
    descriptor: FunctionDescriptor,
    body: Body,
}

impl Builtin {
    pub(crate) fn new(descriptor: FunctionDescriptor, body: Body) -> Arc<dyn Function> {
        Arc::new(Self { descriptor, body })
    }
}

impl fmt::Debug for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Builtin({})", self.descriptor)
    }
}

impl Function for Builtin {
    fn descriptor(&self) -> &FunctionDescriptor {
        &self.descriptor
    }

    fn evaluate(
        &self,
        args: &FunctionArgs<'_>,
        ctx: &mut EvaluationContext<'_>,
    ) -> Result<Option<Value>, EvalError> {
        (self.body)(args, ctx)
    }
}

pub(crate) fn builtins() -> Vec<Arc<dyn Function>> {
    let mut functions = Vec::new();
    functions.extend(message::functions());
    functions.extend(conversion::functions());
    functions.extend(string::functions());
    functions.push(Arc::new(GrokMatch::new(GrokPatterns::default())) as Arc<dyn Function>);
    functions
}
